//! infratest - infrastructure test flows
//!
//! A flow is a YAML file listing terraform commands, resource inventory
//! checks and HTTP checks. This library parses flows, runs them against a
//! [`terraform::Provisioner`], supervises cleanup on failure or interrupt,
//! and renders HTML/JSON reports.

pub mod cli;
pub mod commands;
pub mod common;
pub mod flow;
pub mod http;
pub mod inventory;
pub mod localstack;
pub mod report;
pub mod terraform;
pub mod ui;
pub mod value;

pub use common::{Error, Result};
