//! Differ - Compare desired attributes with the current state
//!
//! Update handlers use the changed attribute list to decide which API calls
//! are needed.

use std::collections::HashMap;

use crate::resource::Value;

/// Find changed attributes between desired and current state
///
/// Only attributes present in `desired` are compared; computed attributes
/// that exist only in the current state are ignored. The result is sorted.
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Returns the subset of `changed` that appears in `keys`
pub fn changed_among<'a>(changed: &'a [String], keys: &[&str]) -> Vec<&'a str> {
    changed
        .iter()
        .map(String::as_str)
        .filter(|c| keys.contains(c))
        .collect()
}
