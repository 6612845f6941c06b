//! `terraform show -json` parsing

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::inventory::ActualResource;
use crate::value::Value;

#[derive(Deserialize, Debug, Default)]
struct State {
    #[serde(default)]
    values: Option<StateValues>,
}

#[derive(Deserialize, Debug, Default)]
struct StateValues {
    #[serde(default)]
    root_module: Module,
}

#[derive(Deserialize, Debug, Default)]
struct Module {
    #[serde(default)]
    resources: Vec<StateResource>,
    #[serde(default)]
    child_modules: Vec<Module>,
}

#[derive(Deserialize, Debug)]
struct StateResource {
    #[serde(default)]
    address: String,
    /// "managed" or "data"
    #[serde(default)]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    values: Option<BTreeMap<String, Value>>,
}

/// Extract managed resources from `terraform show -json` output
///
/// Data sources are skipped. An empty document (no state yet) yields no
/// resources.
pub fn parse_state(json: &str) -> Result<Vec<ActualResource>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let state: State = serde_json::from_str(json).map_err(|e| Error::ToolOutput {
        what: "state",
        message: e.to_string(),
    })?;

    let mut resources = Vec::new();
    if let Some(values) = state.values {
        collect(values.root_module, &mut resources);
    }
    Ok(resources)
}

fn collect(module: Module, out: &mut Vec<ActualResource>) {
    for resource in module.resources {
        if resource.mode != "managed" {
            continue;
        }
        let attributes = resource.values.unwrap_or_default();
        let id = attributes
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let address = if resource.address.is_empty() {
            format!("{}.{}", resource.resource_type, resource.name)
        } else {
            resource.address
        };
        out.push(ActualResource {
            resource_type: resource.resource_type,
            name: resource.name,
            id,
            address,
            attributes,
        });
    }
    for child in module.child_modules {
        collect(child, out);
    }
}
