//! `${output.PATH}` substitution
//!
//! Supported paths:
//! - `${output.key}` simple key
//! - `${output.key[0]}` array index
//! - `${output.key.nested.path}` nested map access
//!
//! Placeholders that don't resolve are left untouched so the command or URL
//! fails visibly downstream instead of silently losing a segment.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::value::{OutputSnapshot, Value};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{output\.([^}]+)\}").expect("placeholder regex is valid"))
}

/// Replace every `${output.PATH}` in `template` with its rendered value
pub fn interpolate(template: &str, outputs: &OutputSnapshot) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| match resolve(outputs, &caps[1]) {
            Some(value) => value.render(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Resolve an output path against a snapshot
pub fn resolve<'a>(outputs: &'a OutputSnapshot, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let (key, indices) = split_indices(segments.next()?)?;
    let mut current = index_into(outputs.get(key)?, &indices)?;

    for segment in segments {
        let (key, indices) = split_indices(segment)?;
        let next = current.as_object()?.get(key)?;
        current = index_into(next, &indices)?;
    }

    Some(current)
}

/// Split `name[1][2]` into `("name", [1, 2])`
fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let (name, mut rest) = match segment.find('[') {
        Some(pos) => segment.split_at(pos),
        None => (segment, ""),
    };
    if name.is_empty() {
        return None;
    }

    let mut indices = Vec::new();
    while !rest.is_empty() {
        let close = rest.find(']')?;
        if !rest.starts_with('[') {
            return None;
        }
        indices.push(rest[1..close].trim().parse().ok()?);
        rest = &rest[close + 1..];
    }
    Some((name, indices))
}

fn index_into<'a>(mut value: &'a Value, indices: &[usize]) -> Option<&'a Value> {
    for &index in indices {
        value = value.as_array()?.get(index)?;
    }
    Some(value)
}
