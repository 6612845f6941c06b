//! `terraform output -json` parsing

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::value::{OutputSnapshot, Value};

#[derive(Deserialize, Debug)]
struct OutputEntry {
    value: Option<Value>,
}

/// Extract `name -> value` from `terraform output -json`
///
/// Entries without a `value` field are dropped.
pub fn parse_outputs(json: &str) -> Result<OutputSnapshot> {
    if json.trim().is_empty() {
        return Ok(OutputSnapshot::new());
    }
    let raw: BTreeMap<String, OutputEntry> =
        serde_json::from_str(json).map_err(|e| Error::ToolOutput {
            what: "outputs",
            message: e.to_string(),
        })?;

    Ok(raw
        .into_iter()
        .filter_map(|(name, entry)| entry.value.map(|v| (name, v)))
        .collect())
}
