//! Terraform CLI execution

use std::path::PathBuf;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{parse_outputs, parse_state, Provisioner};
use crate::common::{Error, Result};
use crate::inventory::ActualResource;
use crate::ui::Console;
use crate::value::OutputSnapshot;

/// Environment variables worth showing in debug output
const RELEVANT_ENV: &[&str] = &[
    "AWS_ENDPOINT_URL",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_DEFAULT_REGION",
    "AWS_REGION",
    "TF_IN_AUTOMATION",
    "TF_LOG",
];

/// Runs the terraform binary in a working directory
pub struct TerraformCli {
    binary: PathBuf,
    working_dir: PathBuf,
    env: Vec<(String, String)>,
    console: Console,
}

impl TerraformCli {
    pub fn new(binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            console: Console::plain(),
        }
    }

    /// Extra environment variables for every subprocess
    pub fn with_env(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    fn has_env(&self, key: &str) -> bool {
        self.env.iter().any(|(k, _)| k == key) || std::env::var_os(key).is_some()
    }

    /// Spawn terraform with `args` and wait for it, killing it on cancellation
    async fn spawn(&self, args: &[&str], cancel: &CancellationToken) -> Result<Output> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::TerraformNotFound
                } else {
                    Error::Io(e)
                }
            })?;

        tokio::select! {
            output = child.wait_with_output() => Ok(output?),
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled terraform {}", args.join(" "));
                Err(Error::Cancelled)
            }
        }
    }

    fn print_debug_header(&self, command_line: &str) {
        if !self.console.debug {
            return;
        }
        self.console.debug(&format!("Executing: {}", command_line));
        self.console.debug(&format!("Working directory: {}", self.working_dir.display()));
        for key in RELEVANT_ENV {
            let value = self
                .env
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .or_else(|| std::env::var(key).ok());
            if let Some(value) = value {
                let shown = if key.contains("SECRET") { "***hidden***" } else { value.as_str() };
                self.console.debug(&format!("  {}={}", key, shown));
            }
        }
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn run_command(&self, command: &str, cancel: &CancellationToken) -> Result<String> {
        let args = split_command(command);
        if args.is_empty() {
            return Err(Error::Config("empty command".into()));
        }
        let command_line = format!("terraform {}", args.join(" "));
        self.print_debug_header(&command_line);
        tracing::debug!(command = %command_line, "Running terraform");

        let output = self.spawn(&args, cancel).await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            tracing::warn!(command = %command_line, exit_code, "terraform command failed");
            let working_dir = self.working_dir.display().to_string();
            self.console
                .command_failure(&command_line, &working_dir, exit_code, &combined);
            let fixes = suggest_fixes(&combined, &working_dir, self.has_env("AWS_ENDPOINT_URL"));
            self.console.suggestions(&fixes);
            return Err(Error::CommandFailed {
                command: command_line,
                exit_code,
                output: combined,
            });
        }

        if self.console.debug && !combined.is_empty() {
            self.console.debug("Command succeeded");
            self.console.dimmed(&abbreviate(&combined));
        }
        Ok(combined)
    }

    async fn get_state(&self, cancel: &CancellationToken) -> Result<Vec<ActualResource>> {
        let output = self.spawn(&["show", "-json"], cancel).await?;
        if !output.status.success() {
            return Err(Error::ToolOutput {
                what: "state",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_state(&String::from_utf8_lossy(&output.stdout))
    }

    async fn get_outputs(&self, cancel: &CancellationToken) -> Result<OutputSnapshot> {
        let output = self.spawn(&["output", "-json"], cancel).await?;
        if !output.status.success() {
            return Err(Error::ToolOutput {
                what: "outputs",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_outputs(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Split a command on whitespace, dropping a leading `terraform`
pub fn split_command(command: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = command.split_whitespace().collect();
    if parts.first() == Some(&"terraform") {
        parts.remove(0);
    }
    parts
}

/// Keep long output readable: first and last five lines
fn abbreviate(output: &str) -> String {
    if output.len() < 500 {
        return output.trim_end().to_string();
    }
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= 10 {
        return output.trim_end().to_string();
    }
    format!(
        "{}\n... (output truncated) ...\n{}",
        lines[..5].join("\n"),
        lines[lines.len() - 5..].join("\n")
    )
}

/// Suggested fixes for a failed command, keyed on common error patterns
///
/// Each entry is a title and the hints printed under it. There is always at
/// least one entry.
pub fn suggest_fixes(output: &str, working_dir: &str, localstack: bool) -> Vec<(String, Vec<String>)> {
    let lower = output.to_lowercase();
    let has = |s: &str| lower.contains(s);
    let mut fixes = Vec::new();

    if has("terraform") && has("not found") && !has("provider") && !has("plan file") {
        fixes.push((
            "Install Terraform:".to_string(),
            vec![
                "• macOS: brew install terraform".to_string(),
                "• Linux: https://developer.hashicorp.com/terraform/install".to_string(),
                "• Windows: https://www.terraform.io/downloads".to_string(),
            ],
        ));
    }
    if has("authentication") || has("credentials") {
        fixes.push((
            "Configure AWS credentials:".to_string(),
            vec![
                "• Run: aws configure".to_string(),
                "• Or set: AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".to_string(),
                "• Or use: --localstack flag for local testing".to_string(),
            ],
        ));
    }
    if has("provider") && has("not found") {
        fixes.push((
            "Initialize Terraform providers:".to_string(),
            vec![format!("cd {}", working_dir), "terraform init".to_string()],
        ));
    }
    if has("state") && has("lock") {
        fixes.push((
            "Unlock Terraform state:".to_string(),
            vec![
                format!("cd {}", working_dir),
                "terraform force-unlock <lock-id>".to_string(),
                "(Find lock-id in the error message above)".to_string(),
            ],
        ));
    }
    if has("permission denied") || has("access denied") {
        fixes.push((
            "Check permissions:".to_string(),
            vec![
                "• Verify AWS IAM permissions".to_string(),
                "• Check file/directory permissions".to_string(),
            ],
        ));
    }
    if localstack && (has("localstack") || has("connection refused")) {
        fixes.push((
            "Start LocalStack:".to_string(),
            vec![
                "docker run -d -p 4566:4566 localstack/localstack".to_string(),
                "curl http://localhost:4566/_localstack/health".to_string(),
            ],
        ));
    }
    if has("plan file") && has("not found") {
        fixes.push((
            "Regenerate plan:".to_string(),
            vec![format!("cd {}", working_dir), "terraform plan -out=plan.tfplan".to_string()],
        ));
    }

    if fixes.is_empty() {
        fixes.push((
            "Review the error output above".to_string(),
            vec![
                "• Terraform documentation: https://www.terraform.io/docs".to_string(),
                "• More detail: infratest run <flow.yaml> --debug".to_string(),
            ],
        ));
    }
    fixes
}
