//! Resource pattern matching
//!
//! Matches declared [`ResourceMatchPattern`]s against the resources found in
//! terraform state. Every violation is reported, not just the first: count
//! checks run independently of each other, and attribute assertions are
//! evaluated for every selected resource.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::value::Value;

/// A resource from terraform state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub id: String,
    /// Fully qualified address, e.g. `aws_vpc.main` or `module.net.aws_vpc.main`
    pub address: String,
    pub attributes: BTreeMap<String, Value>,
}

/// Expected resources of one type, selected by name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceMatchPattern {
    pub resource_type: String,
    /// Literal name, or a pattern where `*` matches any sequence.
    /// Empty matches every name.
    pub name: String,
    /// Exact number of matching resources
    pub count: Option<usize>,
    pub min_count: Option<usize>,
    pub max_count: Option<usize>,
    /// Dotted attribute path -> expected value
    pub attributes: BTreeMap<String, Value>,
}

/// Which cardinality rule a count issue violates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountViolation {
    Exact { expected: usize },
    Min { expected: usize },
    Max { expected: usize },
}

impl fmt::Display for CountViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountViolation::Exact { expected } => write!(f, "expected exactly {}", expected),
            CountViolation::Min { expected } => write!(f, "expected at least {}", expected),
            CountViolation::Max { expected } => write!(f, "expected at most {}", expected),
        }
    }
}

/// An attribute assertion that didn't hold
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMismatch {
    /// Key of the pattern that declared the assertion
    pub pattern: String,
    /// Address of the offending resource
    pub resource: String,
    pub attribute: String,
    pub expected: Value,
    /// `None` when the attribute path couldn't be resolved
    pub actual: Option<Value>,
}

impl fmt::Display for AttributeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(
                f,
                "{}: attribute {} mismatch - expected {}, got {}",
                self.resource, self.attribute, self.expected, actual
            ),
            None => write!(f, "{}: attribute {} not found", self.resource, self.attribute),
        }
    }
}

/// Outcome of matching a single pattern
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    /// Number of resources selected by type and name
    pub count: usize,
    pub resources: Vec<ActualResource>,
    pub count_violations: Vec<CountViolation>,
    pub mismatches: Vec<AttributeMismatch>,
    /// Human-readable description of every violation
    pub issues: Vec<String>,
}

/// Matches resources against expected patterns
pub struct Matcher<'a> {
    resources: &'a [ActualResource],
}

impl<'a> Matcher<'a> {
    pub fn new(resources: &'a [ActualResource]) -> Self {
        Self { resources }
    }

    /// Match every pattern; outcomes keep the input order, and the issue list
    /// aggregates the issues of all patterns that failed
    pub fn match_patterns(
        &self,
        patterns: &[(String, ResourceMatchPattern)],
    ) -> (Vec<(String, MatchOutcome)>, Vec<String>) {
        let mut outcomes = Vec::with_capacity(patterns.len());
        let mut issues = Vec::new();

        for (key, pattern) in patterns {
            let outcome = self.match_pattern(key, pattern);
            if !outcome.matched {
                issues.extend(
                    outcome
                        .issues
                        .iter()
                        .map(|issue| format!("{}: {}", key, issue)),
                );
            }
            outcomes.push((key.clone(), outcome));
        }

        (outcomes, issues)
    }

    /// Match a single pattern
    pub fn match_pattern(&self, key: &str, pattern: &ResourceMatchPattern) -> MatchOutcome {
        let name_matcher = NameMatcher::new(&pattern.name);
        let selected: Vec<&ActualResource> = self
            .resources
            .iter()
            .filter(|r| r.resource_type == pattern.resource_type && name_matcher.is_match(&r.name))
            .collect();
        let count = selected.len();

        let mut count_violations = Vec::new();
        if let Some(expected) = pattern.count {
            if count != expected {
                count_violations.push(CountViolation::Exact { expected });
            }
        }
        if let Some(expected) = pattern.min_count {
            if count < expected {
                count_violations.push(CountViolation::Min { expected });
            }
        }
        if let Some(expected) = pattern.max_count {
            if count > expected {
                count_violations.push(CountViolation::Max { expected });
            }
        }

        let mut issues: Vec<String> = count_violations
            .iter()
            .map(|v| format!("{} resources, found {}", v, count))
            .collect();

        let mut mismatches = Vec::new();
        for resource in &selected {
            for (path, expected) in &pattern.attributes {
                match resolve_attribute(&resource.attributes, path) {
                    Ok(actual) if expected.matches(actual) => {}
                    Ok(actual) => {
                        let mismatch = AttributeMismatch {
                            pattern: key.to_string(),
                            resource: resource.address.clone(),
                            attribute: path.clone(),
                            expected: expected.clone(),
                            actual: Some(actual.clone()),
                        };
                        issues.push(mismatch.to_string());
                        mismatches.push(mismatch);
                    }
                    Err(reason) => {
                        issues.push(format!(
                            "{}: attribute {} not found ({})",
                            resource.address, path, reason
                        ));
                        mismatches.push(AttributeMismatch {
                            pattern: key.to_string(),
                            resource: resource.address.clone(),
                            attribute: path.clone(),
                            expected: expected.clone(),
                            actual: None,
                        });
                    }
                }
            }
        }

        MatchOutcome {
            matched: issues.is_empty() && count_violations.is_empty(),
            count,
            resources: selected.into_iter().cloned().collect(),
            count_violations,
            mismatches,
            issues,
        }
    }
}

/// Name selection: exact, or a `*` wildcard compiled to an anchored regex
enum NameMatcher {
    Any,
    Exact(String),
    Pattern(Regex),
}

impl NameMatcher {
    fn new(pattern: &str) -> Self {
        if pattern.is_empty() || pattern == "*" {
            return NameMatcher::Any;
        }
        if !pattern.contains('*') {
            return NameMatcher::Exact(pattern.to_string());
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^{}$", body)) {
            Ok(re) => NameMatcher::Pattern(re),
            // Escaped input always compiles; fall back to literal comparison
            Err(_) => NameMatcher::Exact(pattern.to_string()),
        }
    }

    fn is_match(&self, name: &str) -> bool {
        match self {
            NameMatcher::Any => true,
            NameMatcher::Exact(expected) => expected == name,
            NameMatcher::Pattern(re) => re.is_match(name),
        }
    }
}

/// Resolve a dotted attribute path such as `tags.Name`
fn resolve_attribute<'v>(
    attributes: &'v BTreeMap<String, Value>,
    path: &str,
) -> std::result::Result<&'v Value, String> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = attributes;

    for (i, part) in parts.iter().enumerate() {
        let value = current
            .get(*part)
            .ok_or_else(|| format!("missing segment '{}'", part))?;
        if i == parts.len() - 1 {
            return Ok(value);
        }
        current = value.as_object().ok_or_else(|| {
            format!(
                "{} is a {}, not a map",
                parts[..=i].join("."),
                value.type_name()
            )
        })?;
    }

    Err(format!("empty attribute path '{}'", path))
}
