//! CLI command definitions
//!
//! Defines the clap commands for infratest.

use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::parse_duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an infrastructure test flow
    Run {
        /// Path to the flow YAML file
        flow: PathBuf,

        /// Enable debug output
        #[arg(long)]
        debug: bool,

        /// Use LocalStack for AWS (development)
        #[arg(long)]
        localstack: bool,

        /// LocalStack endpoint URL (only used with --localstack)
        #[arg(long, value_name = "URL")]
        localstack_endpoint: Option<String>,

        /// Timeout for cleanup operations, e.g. 300s or 5m
        #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
        cleanup_timeout: Option<Duration>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "infratest",
            "run",
            "flows/vpc.yaml",
            "--localstack",
            "--localstack-endpoint",
            "http://127.0.0.1:4567",
            "--cleanup-timeout",
            "2m",
        ])
        .unwrap();
        let Commands::Run {
            flow,
            debug,
            localstack,
            localstack_endpoint,
            cleanup_timeout,
            no_color,
        } = cli.command;
        assert_eq!(flow, PathBuf::from("flows/vpc.yaml"));
        assert!(!debug);
        assert!(localstack);
        assert_eq!(localstack_endpoint.as_deref(), Some("http://127.0.0.1:4567"));
        assert_eq!(cleanup_timeout, Some(Duration::from_secs(120)));
        assert!(!no_color);
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let result = Cli::try_parse_from(["infratest", "run", "f.yaml", "--cleanup-timeout", "soon"]);
        assert!(result.is_err());
    }
}
