//! Flow definition types
//!
//! The YAML document is deserialized into loosely-typed `Raw*` structs and
//! then validated into [`Flow`]. Validation is where every structural rule
//! lives: required fields, unique step names, `after` ordering, step types,
//! count bounds and both inventory expectation formats.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::common::{paths, Error, Result};
use crate::inventory::ResourceMatchPattern;
use crate::value::Value;

/// A validated test flow
#[derive(Debug, Clone)]
pub struct Flow {
    /// Name of the flow
    pub name: String,
    /// Optional description of what the flow verifies
    pub description: Option<String>,
    /// Terraform working directory, resolved relative to the flow file
    pub working_dir: PathBuf,
    pub environment: Environment,
    /// Steps in declared order
    pub steps: Vec<Step>,
    pub reporting: Reporting,
}

/// Environment hints for the flow
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Environment {
    /// Cloud provider name, informational only
    pub provider: Option<String>,
    /// Endpoint override for the LocalStack backend
    pub endpoint: Option<String>,
}

/// Report output configuration
#[derive(Debug, Clone, Default)]
pub struct Reporting {
    /// Output path template; supports `${name}`, `${module}`, a date token
    /// and `${output.*}` placeholders
    pub output: Option<String>,
    pub formats: Vec<ReportFormat>,
}

/// Report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Json,
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            other => Err(Error::UnsupportedReportFormat(other.to_string())),
        }
    }
}

/// A single step of the flow
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step name
    pub name: String,
    /// Name of a step that must have executed before this one
    pub after: Option<String>,
    pub when: When,
    pub kind: StepKind,
}

impl Step {
    /// The step type as written in flow files
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_always(&self) -> bool {
        self.when == When::Always
    }
}

/// Conditional execution of a step, evaluated against prior failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum When {
    /// Run whenever reached
    #[default]
    Unconditional,
    /// Skip once any earlier step has failed
    OnSuccess,
    /// Run only after an earlier failure
    OnFailure,
    /// Run even after failures; a failure here does not stop the flow, and
    /// the step is picked up by cleanup if it never ran
    Always,
}

impl When {
    fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(When::Unconditional),
            Some("always") => Ok(When::Always),
            Some("on-success") => Ok(When::OnSuccess),
            Some("on-failure") => Ok(When::OnFailure),
            Some(other) => Err(Error::Config(format!(
                "Unknown 'when' condition '{}'. Supported: always, on-success, on-failure",
                other
            ))),
        }
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            When::Unconditional => "unconditional",
            When::OnSuccess => "on-success",
            When::OnFailure => "on-failure",
            When::Always => "always",
        })
    }
}

/// Type-specific step payload
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Run terraform command(s)
    Command(CommandSpec),
    /// Check resources in terraform state
    Inventory(InventoryCheck),
    /// Poll a URL for an expected status
    Http(HttpCheck),
}

impl StepKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Command(_) => "terraform",
            StepKind::Inventory(_) => "terraform-inventory",
            StepKind::Http(_) => "http",
        }
    }
}

/// Commands of a terraform step
#[derive(Debug, Clone)]
pub enum CommandSpec {
    Single(String),
    /// Run in order, stopping at the first failure
    Sequence(Vec<String>),
}

/// Inventory expectations, normalized from either the legacy list or the
/// keyed map format
#[derive(Debug, Clone, Default)]
pub struct InventoryCheck {
    /// `(pattern key, pattern)` in declared order
    pub patterns: Vec<(String, ResourceMatchPattern)>,
    pub fail_on_missing: bool,
    pub fail_on_extra: bool,
}

/// HTTP check settings
#[derive(Debug, Clone)]
pub struct HttpCheck {
    /// URL template, may contain `${output.*}` placeholders
    pub url: String,
    /// Expected status; 0 accepts any response
    pub expected_status: u16,
    /// Retries after the first attempt; config default when unset
    pub retries: Option<u32>,
    /// Wait between attempts; config default when unset
    pub delay: Option<Duration>,
}

// === Raw document shapes ===

#[derive(Deserialize, Debug)]
struct RawFlow {
    name: Option<String>,
    description: Option<String>,
    working_dir: Option<PathBuf>,
    #[serde(default)]
    environment: Environment,
    #[serde(default)]
    steps: Vec<RawStep>,
    #[serde(default)]
    reporting: RawReporting,
}

#[derive(Deserialize, Debug, Default)]
struct RawReporting {
    output: Option<String>,
    #[serde(default)]
    formats: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct RawStep {
    name: Option<String>,
    #[serde(rename = "type")]
    step_type: Option<String>,
    after: Option<String>,
    when: Option<String>,

    // terraform
    command: Option<String>,
    commands: Option<Vec<String>>,

    // terraform-inventory
    expected: Option<RawExpected>,
    expected_resources: Option<serde_yaml::Mapping>,
    #[serde(default)]
    fail_on_missing: bool,
    #[serde(default)]
    fail_on_extra: bool,

    // http
    url: Option<String>,
    #[serde(default)]
    expected_status: u16,
    retries: Option<u32>,
    delay: Option<String>,
}

/// Legacy `expected.resources` list
#[derive(Deserialize, Debug)]
struct RawExpected {
    #[serde(default)]
    resources: Vec<RawExpectedResource>,
}

#[derive(Deserialize, Debug)]
struct RawExpectedResource {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    min_count: usize,
    #[serde(default)]
    max_count: usize,
}

/// One entry of the keyed `expected_resources` map
#[derive(Deserialize, Debug, Default)]
struct RawResourceMatch {
    count: Option<usize>,
    min_count: Option<usize>,
    max_count: Option<usize>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

/// Read and validate a flow file
pub fn parse_flow(path: &Path) -> Result<Flow> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let base = path.parent().unwrap_or(Path::new("."));
    Flow::from_yaml(&content, base).map_err(|e| match e {
        Error::FlowParse { .. } => e,
        other => Error::flow_parse(path, other.to_string()),
    })
}

impl Flow {
    /// Parse a flow document; relative `working_dir` is resolved against
    /// `base_dir`
    pub fn from_yaml(content: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawFlow = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse YAML: {}", e)))?;

        let name = non_empty(raw.name).ok_or_else(|| Error::Config("flow name is required".into()))?;
        let working_dir = raw
            .working_dir
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::Config("working_dir is required".into()))?;
        if raw.steps.is_empty() {
            return Err(Error::Config("at least one step is required".into()));
        }

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(raw.steps.len());
        for (i, raw_step) in raw.steps.into_iter().enumerate() {
            let step = convert_step(raw_step, i + 1)?;
            if let Some(after) = &step.after {
                if !seen.contains(after.as_str()) {
                    return Err(Error::Config(format!(
                        "step '{}' has after: '{}', which is not declared before it",
                        step.name, after
                    )));
                }
            }
            if !seen.insert(step.name.clone()) {
                return Err(Error::Config(format!("duplicate step name '{}'", step.name)));
            }
            steps.push(step);
        }

        let formats = raw
            .reporting
            .formats
            .iter()
            .map(|f| f.parse())
            .collect::<Result<Vec<ReportFormat>>>()?;

        Ok(Flow {
            name,
            description: non_empty(raw.description),
            working_dir: paths::resolve_relative(base_dir, &working_dir),
            environment: raw.environment,
            steps,
            reporting: Reporting {
                output: non_empty(raw.reporting.output),
                formats,
            },
        })
    }

    /// 1-based position of a step, for progress display
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name).map(|i| i + 1)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn convert_step(raw: RawStep, number: usize) -> Result<Step> {
    let name = non_empty(raw.name)
        .ok_or_else(|| Error::Config(format!("step {} is missing a name", number)))?;
    let when = When::parse(raw.when.as_deref())
        .map_err(|e| Error::Config(format!("step '{}': {}", name, e)))?;
    let step_type = raw
        .step_type
        .ok_or_else(|| Error::Config(format!("step '{}' is missing a type", name)))?;

    let kind = match step_type.as_str() {
        "terraform" | "provisioning-command" => {
            let spec = match (non_empty(raw.command), raw.commands) {
                (Some(_), Some(_)) => {
                    return Err(Error::Config(format!(
                        "step '{}': set either 'command' or 'commands', not both",
                        name
                    )))
                }
                (Some(cmd), None) => CommandSpec::Single(cmd),
                (None, Some(cmds)) if !cmds.is_empty() => CommandSpec::Sequence(cmds),
                _ => {
                    return Err(Error::Config(format!(
                        "no command or commands specified for terraform step '{}'",
                        name
                    )))
                }
            };
            StepKind::Command(spec)
        }
        "terraform-inventory" | "inventory-check" => {
            let mut patterns = Vec::new();
            if let Some(expected) = raw.expected {
                patterns.extend(expected.resources.into_iter().map(legacy_pattern));
            }
            if let Some(map) = raw.expected_resources {
                for (key, value) in map {
                    patterns.push(keyed_pattern(&name, key, value)?);
                }
            }
            for (key, pattern) in &patterns {
                if let (Some(min), Some(max)) = (pattern.min_count, pattern.max_count) {
                    if min > max {
                        return Err(Error::Config(format!(
                            "step '{}': pattern '{}' has min_count {} greater than max_count {}",
                            name, key, min, max
                        )));
                    }
                }
            }
            StepKind::Inventory(InventoryCheck {
                patterns,
                fail_on_missing: raw.fail_on_missing,
                fail_on_extra: raw.fail_on_extra,
            })
        }
        "http" | "http-check" => {
            let url = non_empty(raw.url)
                .ok_or_else(|| Error::Config(format!("http step '{}' is missing a url", name)))?;
            let delay = raw
                .delay
                .as_deref()
                .map(crate::common::parse_duration)
                .transpose()
                .map_err(|e| Error::Config(format!("step '{}': {}", name, e)))?;
            StepKind::Http(HttpCheck {
                url,
                expected_status: raw.expected_status,
                retries: raw.retries,
                delay,
            })
        }
        other => return Err(Error::UnknownStepType(other.to_string())),
    };

    Ok(Step {
        name,
        after: non_empty(raw.after),
        when,
        kind,
    })
}

/// Legacy entries match every resource of the type; zero bounds mean unset
fn legacy_pattern(raw: RawExpectedResource) -> (String, ResourceMatchPattern) {
    let pattern = ResourceMatchPattern {
        resource_type: raw.resource_type.clone(),
        name: "*".to_string(),
        count: None,
        min_count: (raw.min_count > 0).then_some(raw.min_count),
        max_count: (raw.max_count > 0).then_some(raw.max_count),
        attributes: BTreeMap::new(),
    };
    (raw.resource_type, pattern)
}

/// Keyed entries are `"<type>.<name pattern>"`; a bare type matches any name
fn keyed_pattern(
    step: &str,
    key: serde_yaml::Value,
    value: serde_yaml::Value,
) -> Result<(String, ResourceMatchPattern)> {
    let key = key
        .as_str()
        .ok_or_else(|| Error::Config(format!("step '{}': expected_resources keys must be strings", step)))?
        .to_string();
    let raw: RawResourceMatch = if value.is_null() {
        RawResourceMatch::default()
    } else {
        serde_yaml::from_value(value)
            .map_err(|e| Error::Config(format!("step '{}': pattern '{}': {}", step, key, e)))?
    };

    let (resource_type, name) = match key.split_once('.') {
        Some((t, n)) => (t.to_string(), n.to_string()),
        None => (key.clone(), "*".to_string()),
    };
    if resource_type.is_empty() {
        return Err(Error::Config(format!(
            "step '{}': pattern '{}' is missing a resource type",
            step, key
        )));
    }

    Ok((
        key,
        ResourceMatchPattern {
            resource_type,
            name,
            count: raw.count,
            min_count: raw.min_count,
            max_count: raw.max_count,
            attributes: raw.attributes,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
name: test-flow
description: Test flow
working_dir: ./terraform
environment:
  provider: aws
steps:
  - name: init
    type: terraform
    command: terraform init
  - name: apply
    type: terraform
    after: init
    commands:
      - terraform plan -out=plan.tfplan
      - terraform apply plan.tfplan
  - name: health
    type: http
    url: http://${output.alb_dns}/health
    expected_status: 200
    retries: 5
    delay: 2s
  - name: destroy
    type: terraform
    when: always
    command: terraform destroy -auto-approve
reporting:
  output: ./reports/${name}.html
  formats: [html, json]
"#;

    #[test]
    fn test_parse_basic_flow() {
        let flow = Flow::from_yaml(BASIC, Path::new("/flows")).unwrap();
        assert_eq!(flow.name, "test-flow");
        assert_eq!(flow.description.as_deref(), Some("Test flow"));
        assert_eq!(flow.working_dir, PathBuf::from("/flows/terraform"));
        assert_eq!(flow.environment.provider.as_deref(), Some("aws"));
        assert_eq!(flow.steps.len(), 4);
        assert_eq!(flow.reporting.formats, vec![ReportFormat::Html, ReportFormat::Json]);

        assert!(matches!(
            &flow.steps[0].kind,
            StepKind::Command(CommandSpec::Single(c)) if c == "terraform init"
        ));
        assert_eq!(flow.steps[1].after.as_deref(), Some("init"));
        assert!(matches!(
            &flow.steps[1].kind,
            StepKind::Command(CommandSpec::Sequence(c)) if c.len() == 2
        ));
        match &flow.steps[2].kind {
            StepKind::Http(http) => {
                assert_eq!(http.expected_status, 200);
                assert_eq!(http.retries, Some(5));
                assert_eq!(http.delay, Some(Duration::from_secs(2)));
            }
            other => panic!("Expected http step, got {:?}", other),
        }
        assert_eq!(flow.steps[3].when, When::Always);
        assert_eq!(flow.position("destroy"), Some(4));
    }

    #[test]
    fn test_parse_advanced_inventory() {
        let yaml = r#"
name: advanced-test
working_dir: ./terraform
steps:
  - name: inventory-check
    type: terraform-inventory
    fail_on_missing: true
    expected_resources:
      aws_vpc.main:
        count: 1
        attributes:
          cidr_block: "10.0.0.0/16"
          tags.Name: main
      aws_subnet.*:
        min_count: 2
"#;
        let flow = Flow::from_yaml(yaml, Path::new(".")).unwrap();
        let StepKind::Inventory(check) = &flow.steps[0].kind else {
            panic!("Expected inventory step");
        };
        assert!(check.fail_on_missing);
        assert_eq!(check.patterns.len(), 2);

        let (key, vpc) = &check.patterns[0];
        assert_eq!(key, "aws_vpc.main");
        assert_eq!(vpc.resource_type, "aws_vpc");
        assert_eq!(vpc.name, "main");
        assert_eq!(vpc.count, Some(1));
        assert_eq!(vpc.attributes.get("cidr_block"), Some(&Value::from("10.0.0.0/16")));

        let (key, subnet) = &check.patterns[1];
        assert_eq!(key, "aws_subnet.*");
        assert_eq!(subnet.name, "*");
        assert_eq!(subnet.min_count, Some(2));
        assert_eq!(subnet.max_count, None);
    }

    #[test]
    fn test_parse_legacy_inventory() {
        let yaml = r#"
name: legacy
working_dir: tf
steps:
  - name: inventory
    type: terraform-inventory
    fail_on_extra: true
    expected:
      resources:
        - type: aws_vpc
          min_count: 1
          max_count: 1
        - type: aws_subnet
"#;
        let flow = Flow::from_yaml(yaml, Path::new(".")).unwrap();
        let StepKind::Inventory(check) = &flow.steps[0].kind else {
            panic!("Expected inventory step");
        };
        assert!(check.fail_on_extra);
        let (_, vpc) = &check.patterns[0];
        assert_eq!((vpc.min_count, vpc.max_count), (Some(1), Some(1)));
        let (key, subnet) = &check.patterns[1];
        assert_eq!(key, "aws_subnet");
        assert_eq!(subnet.name, "*");
        assert_eq!((subnet.min_count, subnet.max_count), (None, None));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            ("working_dir: x\nsteps: [{name: a, type: terraform, command: init}]", "name is required"),
            ("name: f\nsteps: [{name: a, type: terraform, command: init}]", "working_dir is required"),
            ("name: f\nworking_dir: x\nsteps: []", "at least one step"),
            (
                "name: f\nworking_dir: x\nsteps: [{name: a, type: terraform, command: init}, {name: a, type: terraform, command: plan}]",
                "duplicate step name",
            ),
            (
                "name: f\nworking_dir: x\nsteps: [{name: a, type: terraform, command: init, after: b}, {name: b, type: terraform, command: plan}]",
                "not declared before",
            ),
            ("name: f\nworking_dir: x\nsteps: [{name: a, type: terraform}]", "no command"),
            ("name: f\nworking_dir: x\nsteps: [{name: a, type: http}]", "missing a url"),
            (
                "name: f\nworking_dir: x\nsteps: [{name: a, type: terraform, command: init, when: sometimes}]",
                "Unknown 'when'",
            ),
            (
                "name: f\nworking_dir: x\nsteps: [{name: a, type: terraform-inventory, expected_resources: {aws_vpc.main: {min_count: 3, max_count: 1}}}]",
                "greater than max_count",
            ),
        ];
        for (yaml, expected) in cases {
            let err = Flow::from_yaml(yaml, Path::new(".")).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected '{}' in error for:\n{}\ngot: {}",
                expected,
                yaml,
                err
            );
        }
    }

    #[test]
    fn test_unknown_step_type_and_format() {
        let err = Flow::from_yaml(
            "name: f\nworking_dir: x\nsteps: [{name: a, type: ansible}]",
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownStepType(t) if t == "ansible"));

        let err = Flow::from_yaml(
            "name: f\nworking_dir: x\nsteps: [{name: a, type: terraform, command: init}]\nreporting: {output: r.html, formats: [pdf]}",
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedReportFormat(f) if f == "pdf"));
    }

    #[test]
    fn test_parse_flow_file_resolves_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        std::fs::write(&path, BASIC).unwrap();

        let flow = parse_flow(&path).unwrap();
        assert_eq!(flow.working_dir, dir.path().join("terraform"));
        assert_eq!(flow.steps.len(), 4);

        let missing = parse_flow(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, Error::FileRead { .. }));
    }
}
