//! JSON report

use serde::Serialize;

use super::ReportContext;
use crate::common::Result;

#[derive(Serialize)]
struct Report<'a> {
    flow: FlowInfo<'a>,
    summary: Summary,
    steps: Vec<StepReport<'a>>,
    /// RFC 3339
    generated: String,
}

#[derive(Serialize)]
struct FlowInfo<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    working_dir: String,
}

#[derive(Serialize)]
struct Summary {
    total_steps: usize,
    successful: usize,
    failed: usize,
    /// Seconds
    total_duration: f64,
}

#[derive(Serialize)]
struct StepReport<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    step_type: &'a str,
    success: bool,
    /// Seconds
    duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resources: Vec<Resource<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_status: Option<u16>,
}

#[derive(Serialize)]
struct Resource<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
    id: &'a str,
}

/// Render the JSON report, pretty-printed
pub fn render_json(ctx: &ReportContext<'_>) -> Result<String> {
    let summary = ctx.summary();
    let report = Report {
        flow: FlowInfo {
            name: &ctx.flow.name,
            description: ctx.flow.description.as_deref(),
            working_dir: ctx.flow.working_dir.display().to_string(),
        },
        summary: Summary {
            total_steps: summary.total_steps,
            successful: summary.successful,
            failed: summary.failed,
            total_duration: summary.total_duration.as_secs_f64(),
        },
        steps: ctx
            .results
            .iter()
            .map(|r| StepReport {
                name: &r.step_name,
                step_type: r.step_type,
                success: r.success,
                duration: r.duration.as_secs_f64(),
                error: r.error.as_deref(),
                output: (!r.output.is_empty()).then_some(r.output.as_str()),
                resources: r
                    .resources
                    .iter()
                    .map(|res| Resource {
                        resource_type: &res.resource_type,
                        id: &res.id,
                    })
                    .collect(),
                http_status: r.http_status,
            })
            .collect(),
        generated: ctx.generated.to_rfc3339(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Flow, StepResult};
    use crate::inventory::ActualResource;
    use crate::value::OutputSnapshot;
    use chrono::Local;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn test_report_shape() {
        let yaml = "name: f\ndescription: checks\nworking_dir: tf\nsteps:\n  - name: inv\n    type: terraform-inventory\n    expected_resources:\n      aws_vpc.main: {count: 1}\n";
        let flow = Flow::from_yaml(yaml, Path::new("/base")).unwrap();
        let results = vec![
            StepResult {
                step_name: "inv".into(),
                step_type: "terraform-inventory",
                success: true,
                output: String::new(),
                error: None,
                duration: Duration::from_millis(250),
                resources: vec![ActualResource {
                    resource_type: "aws_vpc".into(),
                    name: "main".into(),
                    id: "vpc-1".into(),
                    address: "aws_vpc.main".into(),
                    attributes: Default::default(),
                }],
                http_status: None,
            },
            StepResult {
                step_name: "health".into(),
                step_type: "http",
                success: false,
                output: "GET http://x".into(),
                error: Some("expected status 200, got 500".into()),
                duration: Duration::from_secs(1),
                resources: Vec::new(),
                http_status: None,
            },
        ];
        let outputs = OutputSnapshot::new();
        let ctx = ReportContext {
            flow: &flow,
            results: &results,
            outputs: &outputs,
            generated: Local::now(),
        };

        let json: serde_json::Value = serde_json::from_str(&render_json(&ctx).unwrap()).unwrap();
        assert_eq!(json["flow"]["name"], "f");
        assert_eq!(json["flow"]["working_dir"], "/base/tf");
        assert_eq!(json["summary"]["successful"], 1);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["summary"]["total_duration"], 1.25);
        assert_eq!(json["steps"][0]["resources"][0]["id"], "vpc-1");
        assert!(json["steps"][0].get("error").is_none());
        assert!(json["steps"][0].get("output").is_none());
        assert_eq!(json["steps"][1]["type"], "http");
        assert_eq!(json["steps"][1]["error"], "expected status 200, got 500");
        assert!(json["generated"].is_string());
    }
}
