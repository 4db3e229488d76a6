// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Drift detection between a desired object and its live counterpart.
//!
//! [`compare`] decides whether the live object already satisfies the desired one
//! and, if not, produces the object to submit as an update:
//!
//! 1. Strip `status` from the live object and normalize it: `null`, `{}` and `[]`
//!    are treated as absent.
//! 2. Run the kind's cleanup hook so server-assigned fields are copied from the
//!    live object into a processed copy of the desired object.
//! 3. Starting from the live object, replace every top-level field the desired
//!    object sets, except `apiVersion`, `kind`, `metadata` and `status`.
//! 4. Merge metadata: labels and annotations per key, owner references replaced,
//!    finalizers unioned so other controllers' finalizers survive.
//! 5. Normalize again and compare with the normalized live object.
//!
//! A match returns the live object untouched so that no write is issued.

use crate::cleanup::SpecCleanup;
use crate::constants::{CORE_API_VERSION, KIND_SECRET};
use crate::errors::CleanupError;
use kube::core::GroupVersionKind;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Top-level fields never taken from the desired object.
const IDENTITY_FIELDS: &[&str] = &["apiVersion", "kind", "metadata", "status"];

/// Fields of a Secret whose values must not appear in diffs.
const SECRET_PAYLOAD_FIELDS: &[&str] = &["data", "stringData"];

const REDACTED: &str = "<redacted>";

/// Result of comparing a desired object against a live one.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Live object when `matches`, otherwise the object to submit as an update
    pub merged: Value,
    /// Whether the live object already satisfies the desired one
    pub matches: bool,
    /// One line per differing path, secret payloads redacted
    pub diff: Vec<String>,
}

/// Compare `desired` against `actual`.
///
/// # Errors
///
/// Returns the cleanup hook's error.
pub fn compare(
    cleanup: &dyn SpecCleanup,
    gvk: &GroupVersionKind,
    desired: &Value,
    actual: &Value,
) -> Result<Comparison, CleanupError> {
    let mut live = actual.clone();
    strip_status(&mut live);
    normalize(&mut live);

    let processed = cleanup.cleanup(gvk, desired, &live)?;

    let mut merged = live.clone();
    if let (Some(target), Some(source)) = (merged.as_object_mut(), processed.as_object()) {
        for (field, value) in source {
            if !IDENTITY_FIELDS.contains(&field.as_str()) {
                target.insert(field.clone(), value.clone());
            }
        }
        if let Some(desired_meta) = source.get("metadata").and_then(Value::as_object) {
            let meta = target
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(meta) = meta.as_object_mut() {
                merge_metadata(meta, desired_meta);
            }
        }
    }
    strip_status(&mut merged);
    normalize(&mut merged);

    if merged == live {
        return Ok(Comparison {
            merged: actual.clone(),
            matches: true,
            diff: Vec::new(),
        });
    }

    let redact = gvk.group.is_empty() && gvk.version == CORE_API_VERSION && gvk.kind == KIND_SECRET;
    let mut lines = Vec::new();
    diff_values("", &live, &merged, redact, &mut lines);

    Ok(Comparison {
        merged,
        matches: false,
        diff: lines,
    })
}

fn merge_metadata(meta: &mut Map<String, Value>, desired: &Map<String, Value>) {
    for field in ["labels", "annotations"] {
        let Some(entries) = desired.get(field).and_then(Value::as_object) else {
            continue;
        };
        let target = meta
            .entry(field)
            .or_insert_with(|| Value::Object(Map::new()));
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        if let Some(target) = target.as_object_mut() {
            for (k, v) in entries {
                target.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(owners) = desired.get("ownerReferences").and_then(Value::as_array) {
        if !owners.is_empty() {
            meta.insert("ownerReferences".to_string(), Value::Array(owners.clone()));
        }
    }

    if let Some(wanted) = desired.get("finalizers").and_then(Value::as_array) {
        let mut finalizers = meta
            .get("finalizers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for f in wanted {
            if !finalizers.contains(f) {
                finalizers.push(f.clone());
            }
        }
        meta.insert("finalizers".to_string(), Value::Array(finalizers));
    }
}

/// Remove the `status` sub-resource.
pub fn strip_status(value: &mut Value) {
    if let Some(map) = value.as_object_mut() {
        map.remove("status");
    }
}

/// Drop `null`, empty objects and empty arrays from maps, recursively.
///
/// Array elements are normalized in place but never removed, so indices are stable.
pub fn normalize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                normalize(v);
            }
            map.retain(|_, v| !is_empty(v));
        }
        Value::Array(items) => {
            for item in items {
                normalize(item);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => false,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn render(path: &str, value: &Value, redact: bool) -> String {
    let top = path.split(['.', '[']).next().unwrap_or_default();
    if redact && SECRET_PAYLOAD_FIELDS.contains(&top) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

fn diff_values(path: &str, old: &Value, new: &Value, redact: bool, out: &mut Vec<String>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = join(path, key);
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => diff_values(&child, x, y, redact, out),
                    (Some(x), None) => out.push(format!("- {child}: {}", render(&child, x, redact))),
                    (None, Some(y)) => out.push(format!("+ {child}: {}", render(&child, y, redact))),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                diff_values(&format!("{path}[{i}]"), x, y, redact, out);
            }
        }
        _ if old == new => {}
        _ => out.push(format!(
            "~ {path}: {} -> {}",
            render(path, old, redact),
            render(path, new, redact)
        )),
    }
}

#[cfg(test)]
#[path = "drift_tests.rs"]
mod drift_tests;
