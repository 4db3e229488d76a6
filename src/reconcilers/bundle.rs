// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Bundle reconciliation.
//!
//! One pass over a Bundle:
//!
//! 1. Deleting Bundles are torn down and their finalizer released.
//! 2. A missing finalizer is added and the pass ends; the resulting watch event
//!    starts the next pass.
//! 3. The spec is validated. Structural errors end the pass with `InvalidBundle`.
//! 4. Resources are processed one at a time in dependency order.
//! 5. Owned objects no longer declared are deleted once every resource is `Ready`,
//!    otherwise they are listed in `status.objectsToDelete`.
//! 6. Per-resource and Bundle-level conditions are written when they changed.

use crate::context::Context;
use crate::crd::{Bundle, ObjectToDelete, Resource};
use crate::errors::{BundleError, ClientError};
use crate::labels::FINALIZER_BUNDLE;
use crate::metrics::record_resource_state;
use crate::objects::{is_controlled_by, ObjectRef};
use crate::reconcilers::finalizers::{delete_owned_object, ensure_finalizer, handle_deletion};
use crate::reconcilers::resource::{process_resource, ResourceInfo, ResourceState};
use crate::reconcilers::status::BundleStatusUpdater;
use crate::reconcilers::validation::validate;
use crate::status_reasons::{
    CONDITION_TYPE_BLOCKED, CONDITION_TYPE_ERROR, CONDITION_TYPE_IN_PROGRESS,
    CONDITION_TYPE_READY, REASON_ALL_READY, REASON_BLOCKED_BY_ERROR,
    REASON_CONCURRENT_MODIFICATION, REASON_DEPENDENCIES_NOT_READY, REASON_INVALID_BUNDLE,
    REASON_PROGRESSING, REASON_READY, REASON_RETRIABLE_ERROR, REASON_TERMINAL_ERROR,
    STATUS_FALSE, STATUS_TRUE,
};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// What a completed pass asks of the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Every resource is `Ready` and garbage collection finished.
    pub ready: bool,
    /// Whether the Bundle still exists and should be resynced.
    pub requeue: bool,
}

impl PassSummary {
    fn finished() -> Self {
        Self {
            ready: false,
            requeue: false,
        }
    }
}

/// Run one reconciliation pass for the Bundle `namespace/name`.
///
/// # Errors
///
/// - [`BundleError::Invalid`] for structural errors in the spec
/// - [`BundleError::ResourcesFailed`] when at least one resource ended in `Error`
/// - [`BundleError::Client`] when reading the Bundle, writing its status or
///   garbage collection failed
pub async fn reconcile_bundle(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<PassSummary, BundleError> {
    let Some(bundle) = ctx.store.get_bundle(namespace, name).await? else {
        debug!(bundle = %name, namespace = %namespace, "Bundle no longer exists");
        return Ok(PassSummary::finished());
    };

    if bundle.metadata.deletion_timestamp.is_some() {
        handle_deletion(
            ctx.store.as_ref(),
            ctx.client.as_ref(),
            &bundle,
            FINALIZER_BUNDLE,
        )
        .await?;
        return Ok(PassSummary::finished());
    }

    if ensure_finalizer(ctx.client.as_ref(), &bundle, FINALIZER_BUNDLE).await? {
        return Ok(PassSummary {
            ready: false,
            requeue: true,
        });
    }

    info!(
        bundle = %name,
        namespace = %namespace,
        generation = bundle.metadata.generation.unwrap_or_default(),
        resources = bundle.spec.resources.len(),
        "Reconciling Bundle"
    );

    let order = match validate(&bundle, &ctx.plugins) {
        Ok(order) => order,
        Err(e) => {
            warn!(bundle = %name, namespace = %namespace, error = %e, "Bundle spec is invalid");
            let message = e.to_string();
            let mut updater = BundleStatusUpdater::new(&bundle);
            updater.set_condition(CONDITION_TYPE_READY, STATUS_FALSE, REASON_INVALID_BUNDLE, "");
            updater.set_condition(CONDITION_TYPE_IN_PROGRESS, STATUS_FALSE, REASON_INVALID_BUNDLE, "");
            updater.set_condition(CONDITION_TYPE_ERROR, STATUS_TRUE, REASON_INVALID_BUNDLE, &message);
            updater.set_observed_generation(bundle.metadata.generation);
            updater.apply(ctx.client.as_ref()).await?;
            return Err(BundleError::Invalid(e));
        }
    };

    let resources: HashMap<&str, &Resource> = bundle
        .spec
        .resources
        .iter()
        .map(|r| (r.name.as_str(), r))
        .collect();
    let mut processed: BTreeMap<String, ResourceInfo> = BTreeMap::new();
    for resource_name in &order {
        let Some(resource) = resources.get(resource_name.as_str()) else {
            continue;
        };
        let info = process_resource(ctx, &bundle, resource, &processed).await;
        debug!(bundle = %name, resource = %resource_name, state = ?info.state, "Processed resource");
        record_resource_state(info.state.label());
        processed.insert(resource_name.clone(), info);
    }

    let all_ready = processed.values().all(|info| info.state.is_ready());
    let collection = collect_garbage(ctx, &bundle, &processed, all_ready).await;

    let outcome = Outcome::of(&order, &processed, collection.error.as_ref());
    let mut updater = BundleStatusUpdater::new(&bundle);
    for resource_name in &order {
        if let Some(info) = processed.get(resource_name) {
            set_resource_conditions(&mut updater, resource_name, &info.state);
        }
    }
    outcome.set_bundle_conditions(&mut updater, order.len());
    updater.set_objects_to_delete(collection.pending);
    updater.set_observed_generation(bundle.metadata.generation);
    updater.apply(ctx.client.as_ref()).await?;

    info!(
        bundle = %name,
        namespace = %namespace,
        ready = outcome.ready,
        failed = outcome.failed.len(),
        "Finished Bundle pass"
    );

    if !outcome.failed.is_empty() {
        return Err(BundleError::ResourcesFailed {
            failed: outcome.failed,
            retriable: outcome.any_retriable,
        });
    }
    if let Some(e) = collection.error {
        return Err(BundleError::Client(e));
    }
    Ok(PassSummary {
        ready: outcome.ready,
        requeue: true,
    })
}

/// Result of the garbage-collection step.
struct Collection {
    /// Owned objects still awaiting deletion
    pending: Vec<ObjectToDelete>,
    /// First error hit while listing or deleting
    error: Option<ClientError>,
}

/// Delete owned objects that are no longer declared, but only when the whole Bundle is `Ready`.
async fn collect_garbage(
    ctx: &Context,
    bundle: &Bundle,
    processed: &BTreeMap<String, ResourceInfo>,
    all_ready: bool,
) -> Collection {
    let namespace = bundle.namespace().unwrap_or_default();
    let Some(bundle_uid) = bundle.metadata.uid.as_deref() else {
        return Collection {
            pending: Vec::new(),
            error: None,
        };
    };

    let declared: HashSet<(&str, &str, &str)> = processed
        .values()
        .filter_map(|info| info.object_ref.as_ref())
        .map(ObjectRef::group_kind_name)
        .collect();

    let owned = match ctx.store.objects_owned_by(&namespace, bundle_uid).await {
        Ok(owned) => owned,
        Err(e) => {
            warn!(bundle = %bundle.name_any(), error = %e, "Failed to list owned objects");
            let previous = bundle
                .status
                .as_ref()
                .map(|s| s.objects_to_delete.clone())
                .unwrap_or_default();
            return Collection {
                pending: previous,
                error: Some(e),
            };
        }
    };

    let mut seen_uids = HashSet::new();
    let mut stale: Vec<(ObjectRef, Option<String>)> = owned
        .iter()
        .filter(|obj| is_controlled_by(obj, bundle_uid))
        .filter(|obj| match &obj.metadata.uid {
            Some(uid) => seen_uids.insert(uid.clone()),
            None => true,
        })
        .filter_map(|obj| ObjectRef::from_object(obj).map(|r| (r, obj.metadata.uid.clone())))
        .filter(|(reference, _)| !declared.contains(&reference.group_kind_name()))
        .collect();
    stale.sort();

    if !all_ready {
        if !stale.is_empty() {
            debug!(
                bundle = %bundle.name_any(),
                count = stale.len(),
                "Deferring deletion of undeclared objects until all resources are ready"
            );
        }
        return Collection {
            pending: stale.into_iter().map(|(r, _)| r.into()).collect(),
            error: None,
        };
    }

    let mut pending = Vec::new();
    let mut error = None;
    for (reference, uid) in stale {
        if let Err(e) = delete_owned_object(ctx.client.as_ref(), &namespace, &reference, uid).await {
            warn!(bundle = %bundle.name_any(), object = %reference, error = %e, "Failed to delete undeclared object");
            pending.push(reference.into());
            error.get_or_insert(e);
        }
    }
    Collection { pending, error }
}

/// Set all four resource conditions; only the one matching `state` is `True`.
fn set_resource_conditions(updater: &mut BundleStatusUpdater, resource: &str, state: &ResourceState) {
    let (active, reason, message) = match state {
        ResourceState::DependenciesNotReady(deps) => (
            CONDITION_TYPE_BLOCKED,
            REASON_DEPENDENCIES_NOT_READY,
            format!("waiting for: {}", deps.join(", ")),
        ),
        ResourceState::BlockedByError(deps) => (
            CONDITION_TYPE_BLOCKED,
            REASON_BLOCKED_BY_ERROR,
            format!("dependencies failed: {}", deps.join(", ")),
        ),
        ResourceState::InProgress => (
            CONDITION_TYPE_IN_PROGRESS,
            REASON_PROGRESSING,
            "waiting for the object to become ready".to_string(),
        ),
        ResourceState::Ready => (CONDITION_TYPE_READY, REASON_READY, String::new()),
        ResourceState::Error(e) => (CONDITION_TYPE_ERROR, e.reason, e.message.clone()),
    };

    for condition_type in [
        CONDITION_TYPE_BLOCKED,
        CONDITION_TYPE_IN_PROGRESS,
        CONDITION_TYPE_READY,
        CONDITION_TYPE_ERROR,
    ] {
        if condition_type == active {
            updater.set_resource_condition(resource, condition_type, STATUS_TRUE, reason, &message);
        } else {
            updater.set_resource_condition(resource, condition_type, STATUS_FALSE, reason, "");
        }
    }
}

/// Bundle-level summary of a pass.
struct Outcome {
    ready: bool,
    failed: Vec<String>,
    any_retriable: bool,
    any_terminal: bool,
    not_ready: Vec<String>,
    error_message: Option<String>,
}

impl Outcome {
    fn of(
        order: &[String],
        processed: &BTreeMap<String, ResourceInfo>,
        gc_error: Option<&ClientError>,
    ) -> Self {
        let mut failed = Vec::new();
        let mut messages = Vec::new();
        let mut not_ready = Vec::new();
        let mut any_retriable = false;
        let mut any_terminal = false;

        for name in order {
            let Some(info) = processed.get(name) else {
                continue;
            };
            match &info.state {
                ResourceState::Ready => {}
                ResourceState::Error(e) => {
                    failed.push(name.clone());
                    messages.push(format!("{name}: {}", e.message));
                    any_retriable |= e.retriable;
                    any_terminal |= e.reason == REASON_TERMINAL_ERROR;
                    not_ready.push(name.clone());
                }
                _ => not_ready.push(name.clone()),
            }
        }
        if let Some(e) = gc_error {
            messages.push(format!("garbage collection: {e}"));
            any_retriable |= e.is_retriable();
            any_terminal |= !e.is_retriable() && !e.is_race();
        }

        Self {
            ready: not_ready.is_empty() && gc_error.is_none(),
            failed,
            any_retriable,
            any_terminal,
            not_ready,
            error_message: (!messages.is_empty()).then(|| messages.join("; ")),
        }
    }

    fn error_reason(&self) -> &'static str {
        if self.any_retriable {
            REASON_RETRIABLE_ERROR
        } else if self.any_terminal {
            REASON_TERMINAL_ERROR
        } else {
            REASON_CONCURRENT_MODIFICATION
        }
    }

    fn set_bundle_conditions(&self, updater: &mut BundleStatusUpdater, total: usize) {
        if self.ready {
            let message = format!("all {total} resources are ready");
            updater.set_condition(CONDITION_TYPE_READY, STATUS_TRUE, REASON_ALL_READY, &message);
            updater.set_condition(CONDITION_TYPE_IN_PROGRESS, STATUS_FALSE, REASON_ALL_READY, "");
            updater.set_condition(CONDITION_TYPE_ERROR, STATUS_FALSE, REASON_ALL_READY, "");
            return;
        }

        let ready_count = total - self.not_ready.len();
        let message = format!("{ready_count} of {total} resources ready");
        updater.set_condition(CONDITION_TYPE_READY, STATUS_FALSE, REASON_PROGRESSING, &message);

        if self.any_terminal {
            updater.set_condition(CONDITION_TYPE_IN_PROGRESS, STATUS_FALSE, REASON_TERMINAL_ERROR, "");
        } else {
            let waiting = if self.not_ready.is_empty() {
                "waiting for undeclared objects to be deleted".to_string()
            } else {
                format!("waiting for: {}", self.not_ready.join(", "))
            };
            updater.set_condition(CONDITION_TYPE_IN_PROGRESS, STATUS_TRUE, REASON_PROGRESSING, &waiting);
        }

        match &self.error_message {
            Some(message) => {
                updater.set_condition(CONDITION_TYPE_ERROR, STATUS_TRUE, self.error_reason(), message);
            }
            None => updater.set_condition(CONDITION_TYPE_ERROR, STATUS_FALSE, REASON_PROGRESSING, ""),
        }
    }
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod bundle_tests;
