// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Readiness predicates keyed by kind.
//!
//! The reconciler asks [`ReadinessChecker::is_ready`] after every create or update.
//! [`ReadinessTable`] looks up a predicate registered for the object's kind and
//! falls back to [`generic_readiness`] for everything else.

use crate::errors::ReadinessError;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Kind-specific readiness predicate.
pub type ReadinessFn = Arc<dyn Fn(&DynamicObject) -> Result<bool, ReadinessError> + Send + Sync>;

/// Decides whether a live object has converged.
pub trait ReadinessChecker: Send + Sync {
    /// `Ok(true)` when ready, `Ok(false)` while converging, `Err` on failure.
    ///
    /// # Errors
    ///
    /// Returns a [`ReadinessError`] when the object reports a failure.
    fn is_ready(&self, gvk: &GroupVersionKind, obj: &DynamicObject) -> Result<bool, ReadinessError>;
}

/// Registration table built at startup.
#[derive(Clone, Default)]
pub struct ReadinessTable {
    predicates: HashMap<(String, String), ReadinessFn>,
}

impl ReadinessTable {
    /// Empty table; every kind uses the generic check.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate for `group`/`kind` (any version).
    #[must_use]
    pub fn with(mut self, group: &str, kind: &str, predicate: ReadinessFn) -> Self {
        self.predicates
            .insert((group.to_string(), kind.to_string()), predicate);
        self
    }
}

impl ReadinessChecker for ReadinessTable {
    fn is_ready(&self, gvk: &GroupVersionKind, obj: &DynamicObject) -> Result<bool, ReadinessError> {
        match self
            .predicates
            .get(&(gvk.group.clone(), gvk.kind.clone()))
        {
            Some(predicate) => predicate(obj),
            None => generic_readiness(obj),
        }
    }
}

fn condition_status<'a>(conditions: &'a [Value], condition_type: &str) -> Option<&'a Value> {
    conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
}

/// Readiness derived from conventional status fields.
///
/// - not ready while `status.observedGeneration` lags `metadata.generation`
/// - terminal error while a `Failed` condition is `True`
/// - not ready while a `Ready` or `Available` condition is not `True`
/// - ready otherwise, including objects without status
///
/// # Errors
///
/// Returns a non-retriable [`ReadinessError`] when a `Failed` condition is `True`.
pub fn generic_readiness(obj: &DynamicObject) -> Result<bool, ReadinessError> {
    let Some(status) = obj.data.get("status") else {
        return Ok(true);
    };

    if let (Some(generation), Some(observed)) = (
        obj.metadata.generation,
        status.get("observedGeneration").and_then(Value::as_i64),
    ) {
        if observed < generation {
            return Ok(false);
        }
    }

    let conditions = status
        .get("conditions")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    if let Some(failed) = condition_status(conditions, "Failed") {
        if failed.get("status").and_then(Value::as_str) == Some("True") {
            let message = failed
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("object reports Failed=True");
            return Err(ReadinessError {
                message: message.to_string(),
                retriable: false,
            });
        }
    }

    for condition_type in ["Ready", "Available"] {
        if let Some(condition) = condition_status(conditions, condition_type) {
            if condition.get("status").and_then(Value::as_str) != Some("True") {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod readiness_tests;
