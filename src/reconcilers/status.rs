// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for `Bundle` resources.
//!
//! Kubernetes conditions follow a standard format:
//! - `type`: The aspect being reported (`Ready`, `InProgress`, ...)
//! - `status`: "True" or "False"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp of the last status flip
//!
//! # Example
//!
//! ```rust,no_run
//! use conductor::reconcilers::status::create_condition;
//!
//! let condition = create_condition("Ready", "True", "AllReady", "3 resource(s) ready");
//! assert_eq!(condition.r#type, "Ready");
//! ```

use crate::crd::{Bundle, BundleStatus, Condition, ObjectToDelete, ResourceStatus};
use crate::errors::ClientError;
use crate::store::ClusterClient;
use chrono::Utc;
use kube::ResourceExt;
use tracing::debug;

/// Create a new Kubernetes condition with the current timestamp.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g., "Ready", "InProgress")
/// * `status` - "True" or "False"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// Preserves `lastTransitionTime` if the status hasn't changed, or sets a new
/// timestamp if it has.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Compare two condition lists, ignoring `lastTransitionTime`.
///
/// Returns `true` when both lists carry the same type/status/reason/message set.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    for new_cond in new {
        match current.iter().find(|c| c.r#type == new_cond.r#type) {
            None => return false,
            Some(curr_cond) => {
                if curr_cond.status != new_cond.status
                    || curr_cond.reason != new_cond.reason
                    || curr_cond.message != new_cond.message
                {
                    return false;
                }
            }
        }
    }

    true
}

fn resource_statuses_equal(current: &[ResourceStatus], new: &[ResourceStatus]) -> bool {
    current.len() == new.len()
        && current
            .iter()
            .zip(new)
            .all(|(a, b)| a.name == b.name && conditions_equal(&a.conditions, &b.conditions))
}

/// Collects every status change of one pass and writes them in a single call.
///
/// Resource statuses are rebuilt from scratch each pass, in the order they are set;
/// transition times are carried over from the previous status of the same resource.
/// Nothing is written when the result is semantically equal to the current status.
///
/// # Example
///
/// ```rust,ignore
/// let mut updater = BundleStatusUpdater::new(&bundle);
/// updater.set_resource_condition("db", "Ready", "True", "Ready", "");
/// updater.set_condition("Ready", "True", "AllReady", "1 resource(s) ready");
/// updater.apply(client.as_ref()).await?;
/// ```
pub struct BundleStatusUpdater {
    bundle: Bundle,
    current_status: Option<BundleStatus>,
    new_status: BundleStatus,
}

impl BundleStatusUpdater {
    /// Start from the Bundle's current status.
    #[must_use]
    pub fn new(bundle: &Bundle) -> Self {
        let current_status = bundle.status.clone();
        let previous = current_status.clone().unwrap_or_default();
        let new_status = BundleStatus {
            conditions: previous.conditions,
            resource_statuses: Vec::new(),
            objects_to_delete: previous.objects_to_delete,
            observed_generation: previous.observed_generation,
        };

        Self {
            bundle: bundle.clone(),
            current_status,
            new_status,
        }
    }

    /// Update or add a Bundle-level condition.
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: &str,
        reason: &str,
        message: &str,
    ) {
        update_condition_in_memory(
            &mut self.new_status.conditions,
            condition_type,
            status,
            reason,
            message,
        );
    }

    /// Update or add a condition of one resource.
    pub fn set_resource_condition(
        &mut self,
        resource: &str,
        condition_type: &str,
        status: &str,
        reason: &str,
        message: &str,
    ) {
        let index = match self
            .new_status
            .resource_statuses
            .iter()
            .position(|r| r.name == resource)
        {
            Some(index) => index,
            None => {
                let seeded = self
                    .current_status
                    .as_ref()
                    .and_then(|s| s.resource_statuses.iter().find(|r| r.name == resource))
                    .cloned()
                    .unwrap_or_else(|| ResourceStatus {
                        name: resource.to_string(),
                        conditions: Vec::new(),
                    });
                self.new_status.resource_statuses.push(seeded);
                self.new_status.resource_statuses.len() - 1
            }
        };

        update_condition_in_memory(
            &mut self.new_status.resource_statuses[index].conditions,
            condition_type,
            status,
            reason,
            message,
        );
    }

    /// Replace the list of owned objects awaiting garbage collection.
    pub fn set_objects_to_delete(&mut self, mut objects: Vec<ObjectToDelete>) {
        objects.sort();
        self.new_status.objects_to_delete = objects;
    }

    /// Record the spec generation this status was computed from.
    pub fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.new_status.observed_generation = generation;
    }

    /// Whether the collected status differs from the current one.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match &self.current_status {
            None => true,
            Some(current) => {
                current.observed_generation != self.new_status.observed_generation
                    || current.objects_to_delete != self.new_status.objects_to_delete
                    || !conditions_equal(&current.conditions, &self.new_status.conditions)
                    || !resource_statuses_equal(
                        &current.resource_statuses,
                        &self.new_status.resource_statuses,
                    )
            }
        }
    }

    /// The status that [`BundleStatusUpdater::apply`] would write.
    #[must_use]
    pub fn status(&self) -> &BundleStatus {
        &self.new_status
    }

    /// Write the collected status if it changed.
    ///
    /// Returns the updated Bundle, or `None` when the write was skipped.
    ///
    /// # Errors
    ///
    /// Returns the client error of the status write; a stale `resourceVersion`
    /// surfaces as [`ClientError::Conflict`].
    pub async fn apply(&self, client: &dyn ClusterClient) -> Result<Option<Bundle>, ClientError> {
        if !self.has_changes() {
            debug!(
                bundle = %self.bundle.name_any(),
                namespace = %self.bundle.namespace().unwrap_or_default(),
                "Bundle status unchanged, skipping update"
            );
            return Ok(None);
        }

        let mut updated = self.bundle.clone();
        updated.status = Some(self.new_status.clone());
        let written = client.update_bundle_status(&updated).await?;

        debug!(
            bundle = %self.bundle.name_any(),
            namespace = %self.bundle.namespace().unwrap_or_default(),
            conditions = self.new_status.conditions.len(),
            resources = self.new_status.resource_statuses.len(),
            "Updated Bundle status"
        );
        Ok(Some(written))
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
