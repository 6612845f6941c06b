//! HTML report

use std::fmt::Write;

use super::ReportContext;
use crate::ui::format_duration;
use crate::value::Value;

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; margin: 20px; background: #f5f5f5; }
        .container { max-width: 1200px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        h1 { color: #333; border-bottom: 3px solid #4CAF50; padding-bottom: 10px; }
        h2 { color: #555; margin-top: 30px; }
        .summary { background: #f9f9f9; padding: 15px; border-radius: 5px; margin: 20px 0; }
        .step { margin: 15px 0; padding: 15px; border-left: 4px solid #ddd; background: #fafafa; border-radius: 4px; }
        .step.success { border-left-color: #4CAF50; }
        .step.failure { border-left-color: #f44336; }
        .step-header { font-weight: bold; font-size: 1.1em; margin-bottom: 10px; }
        .step-meta { color: #666; font-size: 0.9em; }
        .error { color: #f44336; background: #ffebee; padding: 10px; border-radius: 4px; margin-top: 10px; white-space: pre-wrap; }
        .output { background: #263238; color: #aed581; padding: 10px; border-radius: 4px; font-family: monospace; font-size: 0.9em; overflow-x: auto; margin-top: 10px; white-space: pre-wrap; }
        .resource { display: inline-block; background: #e3f2fd; padding: 5px 10px; margin: 5px; border-radius: 3px; font-size: 0.9em; }
        .badge { display: inline-block; padding: 3px 8px; border-radius: 3px; font-size: 0.85em; font-weight: bold; margin-left: 10px; color: white; }
        .badge.success { background: #4CAF50; }
        .badge.failure { background: #f44336; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 10px; text-align: left; border: 1px solid #ddd; }
        th { background: #f0f0f0; }
        td.value { font-family: monospace; }
"#;

/// Escape text for inclusion in HTML content or attributes
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Strings as-is, everything else as JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::Value::from(other.clone()).to_string(),
    }
}

/// Render the HTML report
pub fn render_html(ctx: &ReportContext<'_>) -> String {
    let flow = ctx.flow;
    let summary = ctx.summary();
    let mut html = String::new();

    // Writing to a String can't fail
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Infratest Report - {name}</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <h1>Infratest Report: {name}</h1>
        <div class="summary">
            <p><strong>Description:</strong> {description}</p>
            <p><strong>Working Directory:</strong> {working_dir}</p>
            <p><strong>Generated:</strong> {generated}</p>
        </div>
        <h2>Summary</h2>
        <div class="summary">
            <p><strong>Total Steps:</strong> {total}</p>
            <p><strong>Successful:</strong> <span style="color: #4CAF50;">{successful}</span></p>
            <p><strong>Failed:</strong> <span style="color: #f44336;">{failed}</span></p>
            <p><strong>Total Duration:</strong> {duration}</p>
        </div>
        <h2>Terraform Outputs</h2>
"#,
        name = escape_html(&flow.name),
        style = STYLE,
        description = escape_html(flow.description.as_deref().unwrap_or_default()),
        working_dir = escape_html(&flow.working_dir.display().to_string()),
        generated = ctx.generated.to_rfc3339(),
        total = summary.total_steps,
        successful = summary.successful,
        failed = summary.failed,
        duration = format_duration(summary.total_duration),
    );

    if ctx.outputs.is_empty() {
        html.push_str("        <div class=\"summary\"><p><em>No outputs available</em></p></div>\n");
    } else {
        html.push_str(
            "        <div class=\"summary\">\n            <table>\n                <thead><tr><th>Output Name</th><th>Value</th></tr></thead>\n                <tbody>\n",
        );
        for (name, value) in ctx.outputs {
            let _ = writeln!(
                html,
                "                    <tr><td><strong>{}</strong></td><td class=\"value\">{}</td></tr>",
                escape_html(name),
                escape_html(&display_value(value))
            );
        }
        html.push_str("                </tbody>\n            </table>\n        </div>\n");
    }

    html.push_str("        <h2>Step Results</h2>\n");
    for result in ctx.results {
        let status = if result.success { "success" } else { "failure" };
        let badge = if result.success { "SUCCESS" } else { "FAILED" };
        let _ = write!(
            html,
            r#"        <div class="step {status}">
            <div class="step-header">{name} <span class="badge {status}">{badge}</span></div>
            <div class="step-meta">Type: {step_type}</div>
            <div class="step-meta">Duration: {duration}</div>
"#,
            name = escape_html(&result.step_name),
            step_type = escape_html(result.step_type),
            duration = format_duration(result.duration),
        );

        match &result.error {
            Some(error) => {
                let _ = writeln!(html, "            <div class=\"error\">Error: {}</div>", escape_html(error));
            }
            None if !result.success => {
                html.push_str("            <div class=\"error\">Step failed</div>\n");
            }
            None => {}
        }
        if !result.output.is_empty() {
            let _ = writeln!(html, "            <div class=\"output\">{}</div>", escape_html(&result.output));
        }
        if !result.resources.is_empty() {
            html.push_str("            <div class=\"resources\">");
            for r in &result.resources {
                let _ = write!(
                    html,
                    "<span class=\"resource\">{}: {}</span>",
                    escape_html(&r.resource_type),
                    escape_html(&r.id)
                );
            }
            html.push_str("</div>\n");
        }
        if let Some(status) = result.http_status {
            let _ = writeln!(html, "            <div>HTTP Status: {}</div>", status);
        }
        html.push_str("        </div>\n");
    }

    html.push_str("    </div>\n</body>\n</html>\n");
    html
}
