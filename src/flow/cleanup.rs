//! Cleanup and signal coordination
//!
//! The [`Coordinator`] owns the cancellation token a run executes under. A
//! listener task turns SIGINT/SIGTERM into a cancellation plus a one-shot
//! cleanup request; the main path picks the request up once the run has
//! unwound, runs the `always` steps that never got to execute, and reports
//! an interrupt.
//!
//! The cleanup pass runs under its own token and deadline, so an interrupt
//! that cancelled the run doesn't also cancel the teardown.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::executor::Scheduler;
use crate::common::{Error, Result};
use crate::ui::{format_duration, Console};

/// Exit code after an interrupt
pub const EXIT_INTERRUPTED: i32 = 130;

/// How long a cleanup step may take to wind down once its budget is spent
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// How a supervised run ended
#[derive(Debug)]
pub enum Supervised {
    /// The run finished on its own, successfully or not
    Completed(Result<()>),
    /// A signal cancelled the run; cleanup has already been attempted
    Interrupted {
        signal: &'static str,
        run: Result<()>,
        cleanup: Result<()>,
    },
}

impl Supervised {
    pub fn exit_code(&self) -> i32 {
        match self {
            Supervised::Completed(Ok(())) => 0,
            Supervised::Completed(Err(_)) => 1,
            Supervised::Interrupted { .. } => EXIT_INTERRUPTED,
        }
    }
}

/// Triggers the interrupt path; cloned into the signal listener
#[derive(Clone)]
pub struct InterruptHandle {
    interrupted: Arc<AtomicBool>,
    token: CancellationToken,
    request: Arc<Mutex<Option<oneshot::Sender<&'static str>>>>,
    console: Console,
}

impl InterruptHandle {
    /// Mark the run interrupted, cancel it and ask the main path for cleanup
    ///
    /// Only the first call has an effect.
    pub fn trigger(&self, signal: &'static str) {
        if self.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!("Received signal: {}", signal);
        self.console.blank();
        self.console
            .warning(&format!("⚠️  Received signal: {}", signal));
        self.console
            .warning("Cancelling operations and running cleanup...");

        // Request before cancelling, so the run never unwinds without it
        let sender = self.request.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            let _ = sender.send(signal);
        }
        self.token.cancel();
    }
}

/// Runs a scheduler under signal handling and guarantees a cleanup pass
pub struct Coordinator {
    token: CancellationToken,
    interrupted: Arc<AtomicBool>,
    cleanup_started: AtomicBool,
    request_tx: Arc<Mutex<Option<oneshot::Sender<&'static str>>>>,
    request_rx: oneshot::Receiver<&'static str>,
    listener: Option<JoinHandle<()>>,
    timeout: Duration,
    console: Console,
}

impl Coordinator {
    pub fn new(timeout: Duration, console: Console) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            token: CancellationToken::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
            cleanup_started: AtomicBool::new(false),
            request_tx: Arc::new(Mutex::new(Some(tx))),
            request_rx: rx,
            listener: None,
            timeout,
            console,
        }
    }

    /// The token runs execute under
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            interrupted: Arc::clone(&self.interrupted),
            token: self.token.clone(),
            request: Arc::clone(&self.request_tx),
            console: self.console,
        }
    }

    /// Start listening for termination signals
    pub fn start(&mut self) {
        if self.listener.is_some() {
            return;
        }
        let handle = self.interrupt_handle();
        self.listener = Some(tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(signal) => handle.trigger(signal),
                Err(e) => tracing::warn!("Failed to listen for signals: {}", e),
            }
        }));
    }

    /// Stop listening for signals
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    /// Run the scheduler to completion
    ///
    /// If a signal arrives, the run is cancelled and the cleanup pass runs
    /// here before returning. A panic during the run triggers the cleanup
    /// pass and is then resumed.
    pub async fn supervise(&mut self, scheduler: &mut Scheduler) -> Supervised {
        let token = self.token();
        let run = AssertUnwindSafe(scheduler.run(&token)).catch_unwind().await;

        let run = match run {
            Ok(result) => result,
            Err(panic) => {
                self.console
                    .error(&format!("⚠️  Panic occurred: {}", panic_message(panic.as_ref())));
                self.console.warning("Attempting cleanup after panic...");
                if let Err(e) = self.run_cleanup(scheduler).await {
                    self.console
                        .error(&format!("Cleanup after panic failed: {}", e));
                }
                self.stop();
                std::panic::resume_unwind(panic);
            }
        };

        match self.request_rx.try_recv() {
            Ok(signal) => {
                let cleanup = self.run_cleanup(scheduler).await;
                if let Err(e) = &cleanup {
                    self.console.error(&format!("Cleanup failed: {}", e));
                }
                Supervised::Interrupted {
                    signal,
                    run,
                    cleanup,
                }
            }
            Err(_) => Supervised::Completed(run),
        }
    }

    /// Run `always` steps that haven't executed yet
    ///
    /// Steps run in declared order under a fresh token, bounded as a whole by
    /// the cleanup timeout. When the budget runs out the token is cancelled,
    /// so the step in flight records a cancelled attempt; one that ignores
    /// cancellation is dropped after a short grace period. Individual
    /// failures don't stop the pass. Only the first call does anything.
    pub async fn run_cleanup(&self, scheduler: &mut Scheduler) -> Result<()> {
        if self.cleanup_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Cleanup already ran, skipping");
            return Ok(());
        }

        let console = self.console;
        console.blank();
        if self.is_interrupted() {
            console.warning("⚠️  Cleanup triggered by interrupt (SIGINT/SIGTERM), attempting destroy...");
            console.warning(&format!("   Cleanup timeout: {}", format_duration(self.timeout)));
        } else {
            console.info("🧹 Running cleanup steps...");
            console.info(&format!("   Cleanup timeout: {}", format_duration(self.timeout)));
        }

        let flow = scheduler.shared_flow();
        let pending: Vec<_> = flow
            .steps
            .iter()
            .filter(|s| s.is_always() && !scheduler.was_executed(&s.name))
            .collect();
        if pending.is_empty() {
            console.info("No cleanup steps to run");
            return Ok(());
        }

        let cleanup_token = CancellationToken::new();
        let deadline = Instant::now() + self.timeout;
        let mut errors = Vec::new();
        let mut completed = 0;

        for step in pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.cleanup_timed_out(&flow.working_dir, &errors));
            }
            console.info(&format!(
                "  Running cleanup step: {} ({} remaining)",
                step.name,
                format_duration(remaining)
            ));

            let outcome = {
                let attempt = scheduler.execute_step(step, &cleanup_token);
                tokio::pin!(attempt);
                let finished = tokio::select! {
                    result = &mut attempt => Some(result),
                    _ = tokio::time::sleep_until(deadline) => None,
                };
                match finished {
                    Some(result) => Ok(result),
                    None => {
                        // Let the step observe cancellation and record its attempt
                        cleanup_token.cancel();
                        Err(tokio::time::timeout(CANCEL_GRACE, &mut attempt).await.is_ok())
                    }
                }
            };

            match outcome {
                Ok(Ok(())) => completed += 1,
                Ok(Err(e)) => {
                    let message = format!("Cleanup step '{}' failed: {}", step.name, e);
                    console.error(&message);
                    errors.push(message);
                }
                Err(recorded) => {
                    if !recorded {
                        tracing::warn!("Cleanup step {} ignored cancellation, abandoning it", step.name);
                    }
                    console.blank();
                    errors.push(format!("Cleanup step '{}' timed out", step.name));
                    return Err(self.cleanup_timed_out(&flow.working_dir, &errors));
                }
            }
        }

        if !errors.is_empty() {
            console.blank();
            console.warning(&format!("⚠️  Cleanup completed with {} error(s)", errors.len()));
            print_manual_destroy(&console, &flow.working_dir, &errors);
            return Err(Error::CleanupFailed(errors.len()));
        }

        console.success(&format!("✓ Cleanup completed successfully ({} step(s))", completed));
        Ok(())
    }

    fn cleanup_timed_out(&self, working_dir: &Path, errors: &[String]) -> Error {
        tracing::error!("Cleanup timeout after {:?}", self.timeout);
        self.console
            .error(&format!("Cleanup timeout after {}", format_duration(self.timeout)));
        print_manual_destroy(&self.console, working_dir, errors);
        Error::CleanupTimeout(self.timeout)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Instructions for tearing down by hand after a failed cleanup
pub fn manual_destroy_instructions(working_dir: &Path) -> Vec<String> {
    let dir = working_dir.display();
    vec![
        format!("cd {}", dir),
        "terraform destroy -auto-approve".to_string(),
        format!("cd {}", dir),
        "AWS_ENDPOINT_URL=http://localhost:4566 terraform destroy -auto-approve".to_string(),
    ]
}

fn print_manual_destroy(console: &Console, working_dir: &Path, errors: &[String]) {
    const RULE: &str = "═══════════════════════════════════════════════════════════";
    let lines = manual_destroy_instructions(working_dir);

    console.blank();
    console.warning(RULE);
    console.warning("⚠️  CLEANUP FAILED - Manual intervention required");
    console.warning(RULE);
    console.blank();

    if !errors.is_empty() {
        console.failure("Failed cleanup steps:");
        for (i, err) in errors.iter().enumerate() {
            println!("  {}. {}", i + 1, err);
        }
        console.blank();
    }

    console.info("To manually destroy resources, run:");
    println!("  {}", lines[0]);
    println!("  {}", lines[1]);
    console.blank();
    console.info("Or if using LocalStack:");
    println!("  {}", lines[2]);
    println!("  {}", lines[3]);
    console.blank();
    console.warning(RULE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Supervised::Completed(Ok(())).exit_code(), 0);
        assert_eq!(Supervised::Completed(Err(Error::Cancelled)).exit_code(), 1);
        let interrupted = Supervised::Interrupted {
            signal: "SIGINT",
            run: Err(Error::Cancelled),
            cleanup: Ok(()),
        };
        assert_eq!(interrupted.exit_code(), 130);
    }

    #[test]
    fn test_manual_instructions_name_working_dir() {
        let lines = manual_destroy_instructions(Path::new("/work/tf"));
        assert_eq!(lines[0], "cd /work/tf");
        assert_eq!(lines[1], "terraform destroy -auto-approve");
        assert!(lines[3].starts_with("AWS_ENDPOINT_URL=http://localhost:4566"));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }

    #[tokio::test]
    async fn test_interrupt_handle_is_one_shot() {
        let coordinator = Coordinator::new(Duration::from_secs(1), Console::plain());
        let handle = coordinator.interrupt_handle();
        let token = coordinator.token();
        handle.trigger("SIGINT");
        handle.trigger("SIGTERM");
        assert!(coordinator.is_interrupted());
        assert!(token.is_cancelled());
        let mut coordinator = coordinator;
        assert_eq!(coordinator.request_rx.try_recv().ok(), Some("SIGINT"));
    }
}
