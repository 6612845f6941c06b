//! LocalStack backend support
//!
//! In LocalStack mode terraform's AWS provider is pointed at a local
//! endpoint with dummy credentials. The variables are handed to the
//! terraform adapter; the runner's own environment is left alone.

use std::time::Duration;

use crate::common::{Error, Result};
use crate::ui::Console;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Environment for terraform subprocesses talking to LocalStack
pub fn env_vars(endpoint: &str) -> Vec<(String, String)> {
    [
        ("AWS_ENDPOINT_URL", endpoint),
        ("AWS_ACCESS_KEY_ID", "test"),
        ("AWS_SECRET_ACCESS_KEY", "test"),
        ("AWS_DEFAULT_REGION", "us-east-1"),
        ("AWS_REGION", "us-east-1"),
        ("TF_IN_AUTOMATION", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// `<endpoint>/_localstack/health`
pub fn health_url(endpoint: &str) -> String {
    format!("{}/_localstack/health", endpoint.trim_end_matches('/'))
}

/// Probe the LocalStack health endpoint
pub async fn check_health(endpoint: &str) -> Result<()> {
    let unavailable = |message: String| Error::LocalStackUnavailable {
        endpoint: endpoint.to_string(),
        message,
    };

    let client = reqwest::Client::builder()
        .timeout(HEALTH_TIMEOUT)
        .build()
        .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
    let response = client
        .get(health_url(endpoint))
        .send()
        .await
        .map_err(|e| unavailable(format!("cannot connect to LocalStack: {}", e)))?;

    if !response.status().is_success() {
        return Err(unavailable(format!(
            "LocalStack health check returned status {}",
            response.status().as_u16()
        )));
    }
    Ok(())
}

/// How to get LocalStack running
pub fn print_start_instructions(console: &Console, endpoint: &str) {
    console.blank();
    console.info("To start LocalStack, run one of the following:");
    console.blank();
    console.info("Option 1: Docker (Recommended)");
    println!("  docker run -d -p 4566:4566 localstack/localstack");
    console.blank();
    console.info("Option 2: LocalStack CLI");
    println!("  localstack start");
    console.blank();
    console.info("After starting LocalStack, verify it's running:");
    println!("  curl {}", health_url(endpoint));
    console.blank();
    console.warning("Note: If LocalStack is running on a different endpoint, use:");
    println!("  --localstack-endpoint <your-endpoint>");
    console.blank();
}
