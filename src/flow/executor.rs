//! Step scheduler
//!
//! Runs the steps of a [`Flow`] in declared order. `when` gates each step on
//! whether anything has failed so far, `after` requires a named step to have
//! been attempted, and the first failure of a step that isn't `always` ends
//! the run.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::config::{CommandSpec, Flow, HttpCheck, InventoryCheck, Step, StepKind, When};
use super::interpolate::interpolate;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::http::HttpChecker;
use crate::inventory::{ActualResource, CountViolation, MatchOutcome, Matcher};
use crate::terraform::Provisioner;
use crate::ui::Console;
use crate::value::OutputSnapshot;

/// Outcome of one executed step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub step_type: &'static str,
    pub success: bool,
    /// Command output, or a summary for inventory and http steps
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    /// Resources selected by an inventory step
    pub resources: Vec<ActualResource>,
    pub http_status: Option<u16>,
}

/// Settings the scheduler takes from configuration
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub console: Console,
    /// Retries for http steps that don't set `retries`
    pub default_retries: u32,
    /// Delay for http steps that don't set `delay`
    pub default_delay: Duration,
    pub http_request_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), Console::plain())
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &Config, console: Console) -> Self {
        Self {
            console,
            default_retries: config.http.default_retries,
            default_delay: config.http_default_delay(),
            http_request_timeout: config.http_request_timeout(),
        }
    }
}

/// What a step produced besides success or failure
#[derive(Default)]
struct StepReport {
    output: String,
    resources: Vec<ActualResource>,
    http_status: Option<u16>,
}

/// Executes a flow against a provisioner
pub struct Scheduler {
    flow: Arc<Flow>,
    provisioner: Arc<dyn Provisioner>,
    http: HttpChecker,
    options: SchedulerOptions,
    results: Vec<StepResult>,
    executed: HashSet<String>,
    failed: bool,
    outputs: OutputSnapshot,
}

impl Scheduler {
    pub fn new(
        flow: Arc<Flow>,
        provisioner: Arc<dyn Provisioner>,
        options: SchedulerOptions,
    ) -> Result<Self> {
        let http = HttpChecker::new(options.http_request_timeout)?;
        Ok(Self {
            flow,
            provisioner,
            http,
            options,
            results: Vec::new(),
            executed: HashSet::new(),
            failed: false,
            outputs: OutputSnapshot::new(),
        })
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Shared handle to the flow, for iterating steps while executing them
    pub fn shared_flow(&self) -> Arc<Flow> {
        Arc::clone(&self.flow)
    }

    /// Results in execution order
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Latest output snapshot
    pub fn outputs(&self) -> &OutputSnapshot {
        &self.outputs
    }

    /// Whether an attempt of `step` has completed
    pub fn was_executed(&self, step: &str) -> bool {
        self.executed.contains(step)
    }

    pub fn has_failure(&self) -> bool {
        self.failed
    }

    /// Run every step in order
    ///
    /// Returns the first failure of a step that isn't `always`, wrapped with
    /// the step name.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        let flow = self.shared_flow();
        let total = flow.steps.len();

        for (i, step) in flow.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if let Some(reason) = self.skip_reason(step) {
                tracing::debug!("Skipping step {} ({})", step.name, reason);
                self.options
                    .console
                    .step_skipped(i + 1, total, &step.name, reason);
                continue;
            }

            if let Err(e) = self.execute_step(step, cancel).await {
                self.failed = true;
                if step.is_always() && !e.is_cancelled() {
                    tracing::warn!("Step {} failed but continuing (when: always): {}", step.name, e);
                    continue;
                }
                return Err(Error::step(&step.name, e));
            }
        }

        Ok(())
    }

    fn skip_reason(&self, step: &Step) -> Option<&'static str> {
        match step.when {
            When::OnSuccess if self.failed => Some("when: on-success, but a previous step failed"),
            When::OnFailure if !self.failed => Some("when: on-failure, but no previous failure"),
            _ => None,
        }
    }

    /// Execute a single step and record its result
    ///
    /// Used by the run loop and by cleanup. The returned error is not
    /// wrapped with the step name.
    pub async fn execute_step(&mut self, step: &Step, cancel: &CancellationToken) -> Result<()> {
        let number = self.flow.position(&step.name).unwrap_or(1);
        let total = self.flow.steps.len();
        let console = self.options.console;

        console.step_start(number, total, &step.name);
        tracing::debug!("Executing step: {} (type: {})", step.name, step.type_name());

        let start = Instant::now();
        let outcome = match &step.after {
            Some(after) if !self.executed.contains(after) => {
                Err((Error::dependency(&step.name, after), StepReport::default()))
            }
            _ => self.dispatch(step, cancel).await,
        };
        let duration = start.elapsed();

        let (report, error) = match outcome {
            Ok(report) => (report, None),
            Err((e, report)) => (report, Some(e)),
        };

        self.results.push(StepResult {
            step_name: step.name.clone(),
            step_type: step.type_name(),
            success: error.is_none(),
            output: report.output,
            error: error.as_ref().map(ToString::to_string),
            duration,
            resources: report.resources,
            http_status: report.http_status,
        });

        // An interrupted attempt doesn't count, so cleanup can retry it
        let cancelled = error.as_ref().is_some_and(Error::is_cancelled);
        if !cancelled {
            self.executed.insert(step.name.clone());
        }

        match error {
            None => {
                console.step_ok(duration);
                Ok(())
            }
            Some(e) => {
                console.step_fail(duration);
                Err(e)
            }
        }
    }

    async fn dispatch(
        &mut self,
        step: &Step,
        cancel: &CancellationToken,
    ) -> std::result::Result<StepReport, (Error, StepReport)> {
        match &step.kind {
            StepKind::Command(spec) => self.run_command_step(spec, cancel).await,
            StepKind::Inventory(check) => self
                .run_inventory_step(check, cancel)
                .await
                .map_err(|e| (e, StepReport::default())),
            StepKind::Http(check) => self.run_http_step(check, cancel).await,
        }
    }

    /// Best-effort refresh of the output snapshot; failures keep the old one
    async fn refresh_outputs(&mut self, cancel: &CancellationToken) {
        match self.provisioner.get_outputs(cancel).await {
            Ok(outputs) => {
                if self.options.console.debug {
                    for (name, value) in &outputs {
                        tracing::debug!("  output {} = {}", name, value);
                    }
                }
                self.outputs = outputs;
            }
            Err(e) => tracing::debug!("Failed to refresh outputs: {}", e),
        }
    }

    async fn run_command_step(
        &mut self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> std::result::Result<StepReport, (Error, StepReport)> {
        self.refresh_outputs(cancel).await;

        let result = match spec {
            CommandSpec::Single(command) => {
                let command = interpolate(command, &self.outputs);
                self.provisioner.run_command(&command, cancel).await
            }
            CommandSpec::Sequence(commands) => {
                let commands: Vec<String> = commands
                    .iter()
                    .map(|c| interpolate(c, &self.outputs))
                    .collect();
                self.provisioner.run_commands(&commands, cancel).await
            }
        };

        match result {
            Ok(output) => Ok(StepReport {
                output,
                ..Default::default()
            }),
            Err(e) => {
                let output = e.command_output().unwrap_or_default().to_string();
                Err((
                    e,
                    StepReport {
                        output,
                        ..Default::default()
                    },
                ))
            }
        }
    }

    async fn run_inventory_step(
        &mut self,
        check: &InventoryCheck,
        cancel: &CancellationToken,
    ) -> Result<StepReport> {
        if check.patterns.is_empty() {
            return Err(Error::Config("expected resources not specified".into()));
        }

        let resources = self.provisioner.get_state(cancel).await?;
        tracing::debug!("Found {} managed resources in state", resources.len());
        for r in &resources {
            tracing::debug!("  - {} (id: {})", r.address, r.id);
        }

        let (outcomes, _) = Matcher::new(&resources).match_patterns(&check.patterns);
        let failures = inventory_failures(check, &resources, &outcomes);

        let output = outcomes
            .iter()
            .map(|(key, outcome)| format!("{}: {} found", key, outcome.count))
            .collect::<Vec<_>>()
            .join("\n");

        if !failures.is_empty() {
            return Err(Error::Inventory(failures));
        }

        let mut seen = BTreeSet::new();
        let found = outcomes
            .into_iter()
            .flat_map(|(_, outcome)| outcome.resources)
            .filter(|r| seen.insert(r.address.clone()))
            .collect();

        Ok(StepReport {
            output,
            resources: found,
            http_status: None,
        })
    }

    async fn run_http_step(
        &mut self,
        check: &HttpCheck,
        cancel: &CancellationToken,
    ) -> std::result::Result<StepReport, (Error, StepReport)> {
        self.refresh_outputs(cancel).await;

        let url = interpolate(&check.url, &self.outputs);
        tracing::debug!("URL template: {}", check.url);
        tracing::debug!("Interpolated URL: {}", url);

        let retries = check.retries.unwrap_or(self.options.default_retries);
        let delay = check.delay.unwrap_or(self.options.default_delay);

        match self
            .http
            .check_with_retry(&url, check.expected_status, retries, delay, cancel)
            .await
        {
            Ok(outcome) => Ok(StepReport {
                output: format!(
                    "GET {} -> {} after {} attempt(s)",
                    url, outcome.status, outcome.attempts
                ),
                resources: Vec::new(),
                http_status: Some(outcome.status),
            }),
            Err(e) => Err((
                e,
                StepReport {
                    output: format!("GET {}", url),
                    ..Default::default()
                },
            )),
        }
    }
}

/// Apply the failure policy to match outcomes
///
/// Exact-count and attribute mismatches always fail. Missing resources fail
/// only with `fail_on_missing`, surplus and unexpected resources only with
/// `fail_on_extra`.
pub fn inventory_failures(
    check: &InventoryCheck,
    resources: &[ActualResource],
    outcomes: &[(String, MatchOutcome)],
) -> Vec<String> {
    let mut failures = Vec::new();

    for ((key, outcome), (_, pattern)) in outcomes.iter().zip(&check.patterns) {
        for violation in &outcome.count_violations {
            let fails = match violation {
                CountViolation::Exact { .. } => true,
                CountViolation::Min { .. } => check.fail_on_missing,
                CountViolation::Max { .. } => check.fail_on_extra,
            };
            if fails {
                failures.push(format!("{}: {} resources, found {}", key, violation, outcome.count));
            }
        }

        let unbounded =
            pattern.count.is_none() && pattern.min_count.is_none() && pattern.max_count.is_none();
        if unbounded && outcome.count == 0 && check.fail_on_missing {
            failures.push(format!("{}: expected but not found", key));
        }

        failures.extend(outcome.mismatches.iter().map(|m| format!("{}: {}", key, m)));
    }

    if check.fail_on_extra {
        let named: HashSet<&str> = check
            .patterns
            .iter()
            .map(|(_, p)| p.resource_type.as_str())
            .collect();
        for r in resources {
            if !named.contains(r.resource_type.as_str()) {
                failures.push(format!("unexpected resource found: {} (id: {})", r.address, r.id));
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ResourceMatchPattern;
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn resource(resource_type: &str, name: &str) -> ActualResource {
        ActualResource {
            resource_type: resource_type.into(),
            name: name.into(),
            id: format!("{}-id", name),
            address: format!("{}.{}", resource_type, name),
            attributes: BTreeMap::from([("cidr".to_string(), Value::from("10.0.0.0/16"))]),
        }
    }

    fn check(
        patterns: Vec<(&str, ResourceMatchPattern)>,
        fail_on_missing: bool,
        fail_on_extra: bool,
    ) -> InventoryCheck {
        InventoryCheck {
            patterns: patterns
                .into_iter()
                .map(|(k, p)| (k.to_string(), p))
                .collect(),
            fail_on_missing,
            fail_on_extra,
        }
    }

    fn pattern(t: &str, min: Option<usize>, max: Option<usize>) -> ResourceMatchPattern {
        ResourceMatchPattern {
            resource_type: t.into(),
            name: "*".into(),
            min_count: min,
            max_count: max,
            ..Default::default()
        }
    }

    fn failures(check: &InventoryCheck, resources: &[ActualResource]) -> Vec<String> {
        let (outcomes, _) = Matcher::new(resources).match_patterns(&check.patterns);
        inventory_failures(check, resources, &outcomes)
    }

    #[test]
    fn test_min_violation_needs_fail_on_missing() {
        let resources = vec![resource("aws_subnet", "a")];
        let lenient = check(vec![("aws_subnet", pattern("aws_subnet", Some(2), None))], false, false);
        assert!(failures(&lenient, &resources).is_empty());

        let strict = check(vec![("aws_subnet", pattern("aws_subnet", Some(2), None))], true, false);
        assert_eq!(
            failures(&strict, &resources),
            vec!["aws_subnet: expected at least 2 resources, found 1"]
        );
    }

    #[test]
    fn test_max_violation_needs_fail_on_extra() {
        let resources = vec![resource("aws_subnet", "a"), resource("aws_subnet", "b")];
        let lenient = check(vec![("aws_subnet", pattern("aws_subnet", None, Some(1)))], true, false);
        assert!(failures(&lenient, &resources).is_empty());

        let strict = check(vec![("aws_subnet", pattern("aws_subnet", None, Some(1)))], false, true);
        assert_eq!(failures(&strict, &resources).len(), 1);
    }

    #[test]
    fn test_exact_count_and_attributes_always_fail() {
        let resources = vec![resource("aws_vpc", "main")];
        let mut vpc = pattern("aws_vpc", None, None);
        vpc.count = Some(2);
        vpc.attributes.insert("cidr".into(), Value::from("192.168.0.0/16"));
        let lenient = check(vec![("aws_vpc.main", vpc)], false, false);

        let found = failures(&lenient, &resources);
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("expected exactly 2 resources, found 1"));
        assert!(found[1].contains("attribute cidr mismatch"));
    }

    #[test]
    fn test_zero_count_without_bounds() {
        let silent = check(vec![("aws_vpc", pattern("aws_vpc", None, None))], false, false);
        assert!(failures(&silent, &[]).is_empty());

        let strict = check(vec![("aws_vpc", pattern("aws_vpc", None, None))], true, false);
        assert_eq!(failures(&strict, &[]), vec!["aws_vpc: expected but not found"]);
    }

    #[test]
    fn test_unexpected_types_with_fail_on_extra() {
        let resources = vec![resource("aws_vpc", "main"), resource("aws_s3_bucket", "logs")];
        let strict = check(vec![("aws_vpc", pattern("aws_vpc", None, None))], false, true);
        assert_eq!(
            failures(&strict, &resources),
            vec!["unexpected resource found: aws_s3_bucket.logs (id: logs-id)"]
        );
    }

    #[test]
    fn test_all_violations_aggregated() {
        let resources = vec![resource("aws_subnet", "a"), resource("aws_iam_role", "r")];
        let strict = check(
            vec![
                ("aws_subnet", pattern("aws_subnet", Some(2), None)),
                ("aws_vpc", pattern("aws_vpc", Some(1), None)),
            ],
            true,
            true,
        );
        assert_eq!(failures(&strict, &resources).len(), 3);
    }
}
