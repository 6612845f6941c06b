//! CLI command handling
//!
//! Wires the flow file, configuration, terraform adapter, scheduler and
//! cleanup coordinator together and turns the outcome into an exit code.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::error::ErrorCategory;
use crate::common::{Error, Result};
use crate::flow::{
    parse_flow, Coordinator, Flow, Scheduler, SchedulerOptions, StepResult, Supervised,
    EXIT_INTERRUPTED,
};
use crate::localstack;
use crate::report::{self, ReportContext};
use crate::terraform::TerraformCli;
use crate::ui::{format_duration, Console};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            flow,
            debug,
            localstack,
            localstack_endpoint,
            cleanup_timeout,
            no_color,
        } => {
            let console = if no_color {
                Console::new(false, debug)
            } else {
                Console::detect(debug)
            };
            let options = RunOptions {
                localstack,
                localstack_endpoint,
                cleanup_timeout,
            };
            run_flow(&flow, options, console).await
        }
    }
}

struct RunOptions {
    localstack: bool,
    localstack_endpoint: Option<String>,
    cleanup_timeout: Option<Duration>,
}

async fn run_flow(path: &Path, options: RunOptions, console: Console) -> Result<i32> {
    let config = Config::load()?;

    let Some(terraform) = config.terraform_binary() else {
        print_install_terraform(&console);
        return Err(Error::TerraformNotFound);
    };
    console.debug(&format!("Terraform found at: {}", terraform.display()));

    let flow = parse_flow(path)?;
    console.flow_header(&flow.name, flow.description.as_deref());
    console.info(&format!("📁 Working directory: {}", flow.working_dir.display()));
    console.info(&format!("📊 Steps: {}", flow.steps.len()));
    console.blank();

    if !flow.working_dir.is_dir() {
        return Err(Error::WorkingDirMissing(flow.working_dir.display().to_string()));
    }

    let mut env = Vec::new();
    if options.localstack {
        let endpoint = options
            .localstack_endpoint
            .clone()
            .or_else(|| flow.environment.endpoint.clone())
            .unwrap_or_else(|| config.localstack.endpoint.clone());
        if let Err(e) = localstack::check_health(&endpoint).await {
            console.warning(&format!("⚠️  LocalStack not detected at {}", endpoint));
            localstack::print_start_instructions(&console, &endpoint);
            return Err(e);
        }
        env = localstack::env_vars(&endpoint);
        console.info(&format!("🔧 LocalStack mode enabled (endpoint: {})", endpoint));
    }

    let cleanup_timeout = options
        .cleanup_timeout
        .unwrap_or_else(|| config.cleanup_timeout());
    if console.debug {
        console.debug(&format!("Flow file: {}", path.display()));
        console.debug(&format!("Total steps: {}", flow.steps.len()));
        console.debug(&format!("LocalStack: {}", options.localstack));
        console.debug(&format!("Cleanup timeout: {}", format_duration(cleanup_timeout)));
    }

    let provisioner = TerraformCli::new(terraform, &flow.working_dir)
        .with_env(env)
        .with_console(console);
    let mut scheduler = Scheduler::new(
        Arc::new(flow),
        Arc::new(provisioner),
        SchedulerOptions::from_config(&config, console),
    )?;

    let mut coordinator = Coordinator::new(cleanup_timeout, console);
    coordinator.start();

    console.info("🚀 Starting flow execution...");
    console.blank();
    let outcome = coordinator.supervise(&mut scheduler).await;
    let exit_code = outcome.exit_code();

    let result = match outcome {
        Supervised::Completed(Ok(())) => {
            console.blank();
            console.info("📄 Generating reports...");
            write_reports(&console, &scheduler)?;
            console.blank();
            console.success("✅ Flow executed successfully!");
            Ok(exit_code)
        }
        Supervised::Completed(Err(e)) => {
            console.failure(&format!("❌ Flow execution failed: {}", e));
            show_error_details(&console, &e, scheduler.flow(), scheduler.results());
            if let Err(report_err) = write_reports(&console, &scheduler) {
                console.error(&format!("Failed to generate report: {}", report_err));
            }
            // Manual recovery instructions are printed by the pass itself
            if let Err(cleanup_err) = coordinator.run_cleanup(&mut scheduler).await {
                tracing::warn!("Cleanup failed: {}", cleanup_err);
            }
            if coordinator.is_interrupted() {
                console.warning("Flow interrupted during cleanup");
            }
            failure_exit(e, coordinator.is_interrupted())
        }
        Supervised::Interrupted { signal, run, .. } => {
            if let Err(e) = run {
                tracing::debug!("Run ended with: {}", e);
            }
            if let Err(report_err) = write_reports(&console, &scheduler) {
                console.error(&format!("Failed to generate report: {}", report_err));
            }
            console.warning(&format!("Flow interrupted by {}", signal));
            Ok(exit_code)
        }
    };

    coordinator.stop();
    result
}

fn write_reports(console: &Console, scheduler: &Scheduler) -> Result<()> {
    let ctx = ReportContext {
        flow: scheduler.flow(),
        results: scheduler.results(),
        outputs: scheduler.outputs(),
        generated: Local::now(),
    };
    for path in report::generate(&ctx)? {
        console.info(&format!("   Report written: {}", path.display()));
    }
    Ok(())
}

/// A signal during the cleanup that follows a failure still ends the
/// process as interrupted
fn failure_exit(error: Error, interrupted: bool) -> Result<i32> {
    if interrupted {
        Ok(EXIT_INTERRUPTED)
    } else {
        Err(error)
    }
}

fn failure_banner(error: &Error) -> &'static str {
    match error.category() {
        ErrorCategory::Configuration => "❌ FLOW CONFIGURATION ERROR",
        ErrorCategory::Execution => "❌ FLOW EXECUTION FAILED",
        ErrorCategory::Assertion => "❌ FLOW ASSERTIONS FAILED",
        ErrorCategory::Infrastructure => "❌ FLOW ABORTED",
    }
}

/// Status of a declared step after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineStatus {
    Passed(Duration),
    Failed(Duration),
    NotExecuted,
}

/// One entry per declared step, using the step's latest result
pub fn timeline(flow: &Flow, results: &[StepResult]) -> Vec<(String, TimelineStatus)> {
    flow.steps
        .iter()
        .map(|step| {
            let status = match results.iter().rev().find(|r| r.step_name == step.name) {
                Some(r) if r.success => TimelineStatus::Passed(r.duration),
                Some(r) => TimelineStatus::Failed(r.duration),
                None => TimelineStatus::NotExecuted,
            };
            (step.name.clone(), status)
        })
        .collect()
}

/// Timeline of every step followed by the details of failed ones
fn show_error_details(console: &Console, error: &Error, flow: &Flow, results: &[StepResult]) {
    const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

    console.blank();
    console.failure(RULE);
    console.failure(&format!("  {}", failure_banner(error)));
    console.failure(RULE);
    console.blank();
    console.info("Execution Timeline:");
    console.blank();

    let entries = timeline(flow, results);
    let total = entries.len();
    for (i, (name, status)) in entries.iter().enumerate() {
        let label = format!("Step {}/{}: {}", i + 1, total, name);
        match status {
            TimelineStatus::Passed(d) => {
                println!("  {} {} [{}]", console.ok(), label, format_duration(*d));
            }
            TimelineStatus::Failed(d) => {
                println!("  {} {} [{}]", console.fail(), label, format_duration(*d));
            }
            TimelineStatus::NotExecuted => {
                console.dimmed(&format!("  ⊘ {} [not executed]", label));
            }
        }
    }
    console.blank();

    for r in results.iter().filter(|r| !r.success) {
        console.failure(&format!("Failed Step: {}", r.step_name));
        console.warning(&format!("Type: {}", r.step_type));
        if let Some(error) = &r.error {
            console.blank();
            console.failure(&format!("Error: {}", error));
        }
        // Terraform output was already shown when the command failed
        if r.step_type != "terraform" && !r.output.is_empty() {
            console.blank();
            console.warning("Output:");
            for line in r.output.lines() {
                println!("    {}", line);
            }
        }
        console.blank();
    }
}

fn print_install_terraform(console: &Console) {
    console.error("Terraform binary not found in PATH");
    eprintln!();
    eprintln!("Please install Terraform:");
    eprintln!("  - Visit: https://www.terraform.io/downloads");
    eprintln!("  - Or use a package manager:");
    eprintln!("    • macOS: brew install terraform");
    eprintln!("    • Linux: https://developer.hashicorp.com/terraform/install");
    eprintln!();
    eprintln!("After installation, ensure 'terraform' is in your PATH, or set");
    eprintln!("[terraform] binary in the infratest config file.");
}
