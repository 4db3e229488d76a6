// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kind-specific cleanup applied before drift comparison.
//!
//! The API server fills in fields the template does not set: allocated addresses,
//! node ports, defaults. A cleanup hook copies those from the live object into a
//! copy of the desired object so that they do not register as drift.
//!
//! # Built-in hooks
//!
//! - core `Service`: `clusterIP`, `clusterIPs`, `healthCheckNodePort`, IP family
//!   settings, defaulted `type`/`sessionAffinity`/`internalTrafficPolicy`, and per
//!   port `nodePort`, `protocol`, `targetPort`
//! - core `Secret`: folds `stringData` into base64 `data` the way the server does,
//!   and keeps the defaulted `type`

use crate::constants::{KIND_SECRET, KIND_SERVICE};
use crate::errors::CleanupError;
use base64::Engine;
use kube::core::GroupVersionKind;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Hook signature: `(desired, actual) -> processed desired`.
pub type CleanupFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, CleanupError> + Send + Sync>;

/// Applies per-kind cleanup to a desired object.
pub trait SpecCleanup: Send + Sync {
    /// Return a processed copy of `desired`. Kinds without a hook are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`CleanupError`] when `desired` cannot be processed.
    fn cleanup(
        &self,
        gvk: &GroupVersionKind,
        desired: &Value,
        actual: &Value,
    ) -> Result<Value, CleanupError>;
}

/// Registration table built at startup.
#[derive(Clone, Default)]
pub struct CleanupTable {
    hooks: HashMap<(String, String), CleanupFn>,
}

impl CleanupTable {
    /// Table with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in core hooks.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with("", KIND_SERVICE, Arc::new(service_cleanup))
            .with("", KIND_SECRET, Arc::new(secret_cleanup))
    }

    /// Register a hook for `group`/`kind` (any version).
    #[must_use]
    pub fn with(mut self, group: &str, kind: &str, hook: CleanupFn) -> Self {
        self.hooks.insert((group.to_string(), kind.to_string()), hook);
        self
    }
}

impl SpecCleanup for CleanupTable {
    fn cleanup(
        &self,
        gvk: &GroupVersionKind,
        desired: &Value,
        actual: &Value,
    ) -> Result<Value, CleanupError> {
        match self.hooks.get(&(gvk.group.clone(), gvk.kind.clone())) {
            Some(hook) => hook(desired, actual),
            None => Ok(desired.clone()),
        }
    }
}

fn object_mut<'a>(
    value: &'a mut Value,
    kind: &str,
    what: &str,
) -> Result<&'a mut Map<String, Value>, CleanupError> {
    value.as_object_mut().ok_or_else(|| CleanupError {
        kind: kind.to_string(),
        message: format!("{what} is not an object"),
    })
}

fn copy_missing(target: &mut Map<String, Value>, source: &Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if !target.contains_key(*field) {
            if let Some(v) = source.get(*field) {
                target.insert((*field).to_string(), v.clone());
            }
        }
    }
}

const SERVICE_ALLOCATED_FIELDS: &[&str] = &[
    "clusterIP",
    "clusterIPs",
    "healthCheckNodePort",
    "ipFamilies",
    "ipFamilyPolicy",
    "type",
    "sessionAffinity",
    "internalTrafficPolicy",
];

/// Copy server-allocated Service fields from `actual` into `desired`.
///
/// # Errors
///
/// Returns a [`CleanupError`] when `desired` or its `spec` is not an object.
pub fn service_cleanup(desired: &Value, actual: &Value) -> Result<Value, CleanupError> {
    let mut out = desired.clone();
    let Some(actual_spec) = actual.get("spec").and_then(Value::as_object) else {
        return Ok(out);
    };

    let root = object_mut(&mut out, KIND_SERVICE, "object")?;
    let spec = root
        .entry("spec")
        .or_insert_with(|| Value::Object(Map::new()));
    let spec = object_mut(spec, KIND_SERVICE, "spec")?;
    copy_missing(spec, actual_spec, SERVICE_ALLOCATED_FIELDS);

    let actual_ports = actual_spec
        .get("ports")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    if let Some(ports) = spec.get_mut("ports").and_then(Value::as_array_mut) {
        for port in ports.iter_mut().filter_map(Value::as_object_mut) {
            let protocol = port
                .get("protocol")
                .and_then(Value::as_str)
                .unwrap_or("TCP")
                .to_string();
            let matched = actual_ports.iter().filter_map(Value::as_object).find(|p| {
                p.get("port") == port.get("port")
                    && p.get("protocol").and_then(Value::as_str).unwrap_or("TCP") == protocol
            });
            if let Some(live) = matched {
                copy_missing(port, live, &["nodePort", "protocol", "targetPort"]);
            }
        }
    }

    Ok(out)
}

/// Fold `stringData` into `data` and keep the defaulted Secret `type`.
///
/// # Errors
///
/// Returns a [`CleanupError`] when a `stringData` value is not a string.
pub fn secret_cleanup(desired: &Value, actual: &Value) -> Result<Value, CleanupError> {
    let mut out = desired.clone();
    let root = object_mut(&mut out, KIND_SECRET, "object")?;

    if let Some(string_data) = root.remove("stringData") {
        let string_data = string_data.as_object().cloned().ok_or_else(|| CleanupError {
            kind: KIND_SECRET.to_string(),
            message: "stringData is not an object".to_string(),
        })?;
        let data = root
            .entry("data")
            .or_insert_with(|| Value::Object(Map::new()));
        let data = object_mut(data, KIND_SECRET, "data")?;
        for (key, value) in string_data {
            let text = value.as_str().ok_or_else(|| CleanupError {
                kind: KIND_SECRET.to_string(),
                message: format!("stringData.{key} is not a string"),
            })?;
            data.insert(
                key,
                Value::String(base64::engine::general_purpose::STANDARD.encode(text)),
            );
        }
    }

    if let Some(actual_root) = actual.as_object() {
        copy_missing(root, actual_root, &["type"]);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod cleanup_tests;
