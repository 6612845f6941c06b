//! Flow definition and execution
//!
//! A flow is a YAML document describing an ordered list of steps: terraform
//! commands, inventory checks against terraform state, and HTTP checks.

pub mod cleanup;
pub mod config;
pub mod executor;
pub mod interpolate;

pub use cleanup::{Coordinator, InterruptHandle, Supervised, EXIT_INTERRUPTED};
pub use config::{parse_flow, Flow, Step, StepKind, When};
pub use executor::{Scheduler, SchedulerOptions, StepResult};
