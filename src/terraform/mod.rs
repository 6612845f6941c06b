//! Provisioning tool adapter
//!
//! The engine talks to terraform only through the [`Provisioner`] trait, so
//! the scheduler can be driven by a scripted implementation in tests.

mod executor;
mod outputs;
mod state;

pub use executor::{split_command, suggest_fixes, TerraformCli};
pub use outputs::parse_outputs;
pub use state::parse_state;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result};
use crate::inventory::ActualResource;
use crate::value::OutputSnapshot;

/// Runs provisioning commands and exposes the resulting state
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Run a single command, returning its combined output
    ///
    /// A non-zero exit is [`Error::CommandFailed`], which carries the output.
    /// Cancellation kills the command and yields [`Error::Cancelled`].
    async fn run_command(&self, command: &str, cancel: &CancellationToken) -> Result<String>;

    /// Run commands in order, stopping at the first failure
    async fn run_commands(&self, commands: &[String], cancel: &CancellationToken) -> Result<String> {
        let total = commands.len();
        let mut all_output = String::new();
        for (i, command) in commands.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tracing::debug!("Command {}/{}: {}", i + 1, total, command);
            let output = self
                .run_command(command, cancel)
                .await
                .map_err(|e| Error::CommandInSequence {
                    index: i + 1,
                    total,
                    source: Box::new(e),
                })?;
            all_output.push_str(&output);
            all_output.push('\n');
        }
        Ok(all_output)
    }

    /// Managed resources currently in state
    async fn get_state(&self, cancel: &CancellationToken) -> Result<Vec<ActualResource>>;

    /// Current output values
    async fn get_outputs(&self, cancel: &CancellationToken) -> Result<OutputSnapshot>;
}
