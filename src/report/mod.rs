//! Run reports
//!
//! After a run (successful or not) the results are written in every format
//! listed under `reporting.formats`. The HTML report goes to the templated
//! `reporting.output` path, the JSON report next to it with a `.json`
//! extension.

mod html;
mod json;

pub use html::{escape_html, render_html};
pub use json::render_json;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::common::{paths, Error, Result};
use crate::flow::config::ReportFormat;
use crate::flow::interpolate::interpolate;
use crate::flow::{Flow, StepResult};
use crate::value::OutputSnapshot;

/// Everything a report is rendered from
pub struct ReportContext<'a> {
    pub flow: &'a Flow,
    pub results: &'a [StepResult],
    pub outputs: &'a OutputSnapshot,
    pub generated: DateTime<Local>,
}

/// Step counts and total duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub total_steps: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration: Duration,
}

impl ReportContext<'_> {
    pub fn summary(&self) -> Summary {
        let successful = self.results.iter().filter(|r| r.success).count();
        Summary {
            total_steps: self.results.len(),
            successful,
            failed: self.results.len() - successful,
            total_duration: self.results.iter().map(|r| r.duration).sum(),
        }
    }
}

/// Expand `${output.*}`, `${name}`, `${module}` and the
/// `$(date +%Y%m%d-%H%M%S)` token in a report path
pub fn resolve_output_path(
    template: &str,
    flow: &Flow,
    outputs: &OutputSnapshot,
    now: DateTime<Local>,
) -> PathBuf {
    let path = interpolate(template, outputs)
        .replace("${name}", &flow.name)
        .replace("${module}", &paths::module_name(&flow.working_dir))
        .replace("$(date +%Y%m%d-%H%M%S)", &now.format("%Y%m%d-%H%M%S").to_string());
    PathBuf::from(path)
}

/// Write all configured reports, returning the files written
///
/// Nothing is written when no output path or no format is configured.
pub fn generate(ctx: &ReportContext<'_>) -> Result<Vec<PathBuf>> {
    let reporting = &ctx.flow.reporting;
    let Some(template) = reporting.output.as_deref() else {
        tracing::debug!("Reporting not configured, skipping report generation");
        return Ok(Vec::new());
    };
    if reporting.formats.is_empty() {
        tracing::debug!("No report formats configured, skipping report generation");
        return Ok(Vec::new());
    }

    let path = resolve_output_path(template, ctx.flow, ctx.outputs, ctx.generated);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Config(format!("failed to create report directory {}: {}", dir.display(), e))
        })?;
    }

    let mut written = Vec::new();
    for format in &reporting.formats {
        match format {
            ReportFormat::Html => {
                write_report(&path, &render_html(ctx))?;
                written.push(path.clone());
            }
            ReportFormat::Json => {
                let json_path = path.with_extension("json");
                write_report(&json_path, &render_json(ctx)?)?;
                written.push(json_path);
            }
        }
    }
    Ok(written)
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    tracing::debug!("Writing report {}", path.display());
    std::fs::write(path, content)
        .map_err(|e| Error::Config(format!("failed to write report {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use chrono::TimeZone;

    fn flow(output: &str, formats: &str) -> Flow {
        let yaml = format!(
            "name: vpc-test\nworking_dir: ./terraform/vpc\nsteps:\n  - name: init\n    type: terraform\n    command: init\nreporting:\n  output: {}\n  formats: [{}]\n",
            output, formats
        );
        Flow::from_yaml(&yaml, Path::new("/flows")).unwrap()
    }

    fn result(name: &str, success: bool, millis: u64) -> StepResult {
        StepResult {
            step_name: name.to_string(),
            step_type: "terraform",
            success,
            output: String::new(),
            error: (!success).then(|| "boom".to_string()),
            duration: Duration::from_millis(millis),
            resources: Vec::new(),
            http_status: None,
        }
    }

    #[test]
    fn test_path_templating() {
        let flow = flow("reports/${module}/${name}-$(date +%Y%m%d-%H%M%S)-${output.env}.html", "html");
        let outputs = OutputSnapshot::from([("env".to_string(), Value::from("dev"))]);
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let path = resolve_output_path(flow.reporting.output.as_deref().unwrap(), &flow, &outputs, now);
        assert_eq!(path, PathBuf::from("reports/vpc/vpc-test-20240305-140709-dev.html"));
    }

    #[test]
    fn test_summary() {
        let flow = flow("r.html", "html");
        let results = vec![result("a", true, 1500), result("b", false, 500)];
        let outputs = OutputSnapshot::new();
        let ctx = ReportContext {
            flow: &flow,
            results: &results,
            outputs: &outputs,
            generated: Local::now(),
        };
        let summary = ctx.summary();
        assert_eq!(summary.total_steps, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_duration, Duration::from_secs(2));
    }

    #[test]
    fn test_generate_writes_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("out/${name}.html");
        let flow = flow(&template.display().to_string(), "html, json");
        let results = vec![result("init", true, 10)];
        let outputs = OutputSnapshot::new();
        let ctx = ReportContext {
            flow: &flow,
            results: &results,
            outputs: &outputs,
            generated: Local::now(),
        };

        let written = generate(&ctx).unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("out/vpc-test.html"),
                dir.path().join("out/vpc-test.json")
            ]
        );
        let html = std::fs::read_to_string(&written[0]).unwrap();
        assert!(html.contains("Infratest Report: vpc-test"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(json["summary"]["total_steps"], 1);
    }

    #[test]
    fn test_unconfigured_reporting_writes_nothing() {
        let yaml = "name: f\nworking_dir: .\nsteps:\n  - name: init\n    type: terraform\n    command: init\n";
        let flow = Flow::from_yaml(yaml, Path::new(".")).unwrap();
        let outputs = OutputSnapshot::new();
        let ctx = ReportContext {
            flow: &flow,
            results: &[],
            outputs: &outputs,
            generated: Local::now(),
        };
        assert!(generate(&ctx).unwrap().is_empty());
    }
}
