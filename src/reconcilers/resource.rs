// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-resource state machine.
//!
//! [`process_resource`] takes one resource of a Bundle through:
//!
//! 1. **Gating**: every declared dependency must be `Ready`. An errored or blocked
//!    dependency yields `BlockedByError`; any other unready dependency yields
//!    `DependenciesNotReady`. No side effects happen in either case.
//! 2. **Fetch**: the live object must not be pending deletion and, if present,
//!    must be controlled by this Bundle.
//! 3. **Evaluate**: tokens are resolved against the dependencies (or the plugin is
//!    run), then the namespace, managed labels and owner references are stamped.
//! 4. **Write**: create when absent, update when drifted. Races are reported as a
//!    non-retriable `ConcurrentModification` error.
//! 5. **Consistency**: the written object must satisfy the desired one.
//! 6. **Readiness**: the kind's readiness predicate decides `Ready` or `InProgress`.

use crate::constants::{
    CORE_API_VERSION, KIND_SECRET, KIND_SERVICE_BINDING, MODIFIER_BIND_SECRET,
    SERVICE_CATALOG_GROUP,
};
use crate::context::Context;
use crate::crd::{Bundle, Resource};
use crate::errors::ClientError;
use crate::metrics::record_object_write;
use crate::objects::{
    bundle_owner_reference, dependency_owner_reference, gvk_of_template, is_controlled_by,
    managed_labels, ObjectRef,
};
use crate::plugins::{PluginContext, PluginRegistry};
use crate::reconcilers::drift::compare;
use crate::references::{Dependency, Resolver};
use crate::status_reasons::{
    REASON_CONCURRENT_MODIFICATION, REASON_RETRIABLE_ERROR, REASON_TERMINAL_ERROR,
};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Why a resource failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
    /// Human-readable description
    pub message: String,
    /// Whether a later pass may succeed without a spec change
    pub retriable: bool,
    /// Condition reason reported on the resource
    pub reason: &'static str,
}

impl ResourceError {
    /// A failure that needs a spec change or manual intervention.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: false,
            reason: REASON_TERMINAL_ERROR,
        }
    }

    /// A transient failure.
    pub fn retriable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: true,
            reason: REASON_RETRIABLE_ERROR,
        }
    }

    /// Classify a failed API call against `reference`.
    #[must_use]
    pub fn from_client(action: &str, reference: &ObjectRef, err: &ClientError) -> Self {
        if err.is_race() {
            Self {
                message: format!(
                    "{action} {reference} raced with another writer ({err}); a later watch event will retrigger reconciliation"
                ),
                retriable: false,
                reason: REASON_CONCURRENT_MODIFICATION,
            }
        } else if err.is_retriable() {
            Self::retriable(format!("{action} {reference}: {err}"))
        } else {
            Self::terminal(format!("{action} {reference}: {err}"))
        }
    }
}

/// Outcome of processing one resource in a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Listed dependencies are not `Ready` yet.
    DependenciesNotReady(Vec<String>),
    /// Listed dependencies failed, directly or transitively.
    BlockedByError(Vec<String>),
    /// Written, but not ready yet.
    InProgress,
    /// Written and ready.
    Ready,
    /// Processing failed.
    Error(ResourceError),
}

impl ResourceState {
    /// Whether dependents may proceed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether dependents must be blocked with `BlockedByError`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error(_) | Self::BlockedByError(_))
    }

    /// Metric label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::DependenciesNotReady(_) | Self::BlockedByError(_) => "blocked",
            Self::InProgress => "in_progress",
            Self::Ready => "ready",
            Self::Error(_) => "error",
        }
    }
}

/// Per-pass record of a processed resource, consumed by its dependents.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Identity of the produced object, when it could be determined
    pub object_ref: Option<ObjectRef>,
    /// Live object after this pass's write
    pub actual: Option<DynamicObject>,
    /// Auxiliary objects exposed to references, keyed by modifier
    pub facets: BTreeMap<String, Value>,
    /// Outcome
    pub state: ResourceState,
}

impl ResourceInfo {
    fn with_state(object_ref: Option<ObjectRef>, state: ResourceState) -> Self {
        Self {
            object_ref,
            actual: None,
            facets: BTreeMap::new(),
            state,
        }
    }
}

/// Group-version-kind and object name a resource produces.
///
/// # Errors
///
/// Returns a terminal error when the template lacks literal identity fields or the
/// plugin is not registered.
pub fn target_identity(
    resource: &Resource,
    plugins: &PluginRegistry,
) -> Result<(GroupVersionKind, String), ResourceError> {
    if let Some(template) = &resource.spec.object {
        let gvk = gvk_of_template(template).ok_or_else(|| {
            ResourceError::terminal("object template has no literal apiVersion and kind")
        })?;
        let name = template
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| ResourceError::terminal("object template has no literal metadata.name"))?;
        return Ok((gvk, name.to_string()));
    }
    if let Some(plugin) = &resource.spec.plugin {
        let found = plugins
            .get(&plugin.name)
            .ok_or_else(|| ResourceError::terminal(format!("plugin '{}' is not registered", plugin.name)))?;
        return Ok((found.describe().gvk, plugin.object_name.clone()));
    }
    Err(ResourceError::terminal(
        "resource must set exactly one of spec.object or spec.plugin",
    ))
}

/// Process one resource. Never fails: every outcome is a [`ResourceState`].
///
/// `processed` holds the results of the resources visited earlier in this pass.
pub async fn process_resource(
    ctx: &Context,
    bundle: &Bundle,
    resource: &Resource,
    processed: &BTreeMap<String, ResourceInfo>,
) -> ResourceInfo {
    let mut failed = Vec::new();
    let mut not_ready = Vec::new();
    for dep in &resource.depends_on {
        match processed.get(dep).map(|info| &info.state) {
            Some(state) if state.is_ready() => {}
            Some(state) if state.is_failed() => failed.push(dep.clone()),
            _ => not_ready.push(dep.clone()),
        }
    }

    let identity = target_identity(resource, &ctx.plugins);
    let object_ref = identity
        .as_ref()
        .ok()
        .map(|(gvk, name)| ObjectRef::new(gvk, name));

    if !failed.is_empty() {
        debug!(resource = %resource.name, failed = ?failed, "Blocked by failed dependencies");
        return ResourceInfo::with_state(object_ref, ResourceState::BlockedByError(failed));
    }
    if !not_ready.is_empty() {
        debug!(resource = %resource.name, pending = ?not_ready, "Dependencies not ready");
        return ResourceInfo::with_state(object_ref, ResourceState::DependenciesNotReady(not_ready));
    }

    let (gvk, name) = match identity {
        Ok(identity) => identity,
        Err(e) => return ResourceInfo::with_state(None, ResourceState::Error(e)),
    };

    match converge(ctx, bundle, resource, processed, &gvk, &name).await {
        Ok((actual, facets, state)) => ResourceInfo {
            object_ref,
            actual: Some(actual),
            facets,
            state,
        },
        Err(e) => {
            warn!(
                bundle = %bundle.name_any(),
                resource = %resource.name,
                kind = %gvk.kind,
                retriable = e.retriable,
                error = %e.message,
                "Resource failed"
            );
            ResourceInfo::with_state(object_ref, ResourceState::Error(e))
        }
    }
}

type Converged = (DynamicObject, BTreeMap<String, Value>, ResourceState);

async fn converge(
    ctx: &Context,
    bundle: &Bundle,
    resource: &Resource,
    processed: &BTreeMap<String, ResourceInfo>,
    gvk: &GroupVersionKind,
    name: &str,
) -> Result<Converged, ResourceError> {
    let namespace = bundle.namespace().unwrap_or_default();
    let bundle_uid = bundle.metadata.uid.clone().unwrap_or_default();
    let reference = ObjectRef::new(gvk, name);

    let existing = ctx
        .store
        .get(gvk, &namespace, name)
        .await
        .map_err(|e| ResourceError::from_client("get", &reference, &e))?;
    if let Some(live) = &existing {
        if live.metadata.deletion_timestamp.is_some() {
            return Err(ResourceError::terminal(format!("{reference} is being deleted")));
        }
        if !is_controlled_by(live, &bundle_uid) {
            return Err(ResourceError::terminal(format!(
                "{reference} already exists and is not owned by this Bundle"
            )));
        }
    }

    let dependencies = dependency_views(resource, processed)?;
    let evaluated = evaluate(ctx, bundle, resource, &dependencies, name)?;
    let desired = stamp(evaluated, bundle, resource, processed, &namespace)?;

    let written = match existing {
        None => {
            let obj = to_dynamic(&desired)?;
            let created = ctx
                .client
                .create(&obj)
                .await
                .map_err(|e| ResourceError::from_client("create", &reference, &e))?;
            record_object_write("create", &gvk.kind);
            info!(bundle = %bundle.name_any(), resource = %resource.name, object = %reference, "Created object");
            check_consistency(ctx, gvk, &desired, &created, &reference)?;
            created
        }
        Some(live) => {
            let live_value = to_value(&live)?;
            let comparison = compare(ctx.cleanup.as_ref(), gvk, &desired, &live_value)
                .map_err(|e| ResourceError::terminal(e.to_string()))?;
            if comparison.matches {
                debug!(resource = %resource.name, object = %reference, "Object up to date");
                live
            } else {
                info!(
                    bundle = %bundle.name_any(),
                    resource = %resource.name,
                    object = %reference,
                    diff = %comparison.diff.join("; "),
                    "Updating drifted object"
                );
                let obj = to_dynamic(&comparison.merged)?;
                let updated = ctx
                    .client
                    .update(&obj)
                    .await
                    .map_err(|e| ResourceError::from_client("update", &reference, &e))?;
                record_object_write("update", &gvk.kind);
                check_consistency(ctx, gvk, &desired, &updated, &reference)?;
                updated
            }
        }
    };

    let ready = ctx.readiness.is_ready(gvk, &written).map_err(|e| ResourceError {
        message: format!("{reference}: {}", e.message),
        retriable: e.retriable,
        reason: if e.retriable {
            REASON_RETRIABLE_ERROR
        } else {
            REASON_TERMINAL_ERROR
        },
    })?;
    if !ready {
        return Ok((written, BTreeMap::new(), ResourceState::InProgress));
    }

    match facets_of(ctx, gvk, &written, &namespace).await? {
        Some(facets) => Ok((written, facets, ResourceState::Ready)),
        None => Ok((written, BTreeMap::new(), ResourceState::InProgress)),
    }
}

fn to_value(obj: &DynamicObject) -> Result<Value, ResourceError> {
    serde_json::to_value(obj).map_err(|e| ResourceError::terminal(format!("serialize object: {e}")))
}

fn to_dynamic(value: &Value) -> Result<DynamicObject, ResourceError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ResourceError::terminal(format!("desired object is malformed: {e}")))
}

fn dependency_views(
    resource: &Resource,
    processed: &BTreeMap<String, ResourceInfo>,
) -> Result<BTreeMap<String, Dependency>, ResourceError> {
    let mut views = BTreeMap::new();
    for dep in &resource.depends_on {
        let Some(info) = processed.get(dep) else {
            continue;
        };
        let Some(actual) = &info.actual else {
            continue;
        };
        views.insert(
            dep.clone(),
            Dependency {
                object: to_value(actual)?,
                facets: info.facets.clone(),
            },
        );
    }
    Ok(views)
}

fn evaluate(
    ctx: &Context,
    bundle: &Bundle,
    resource: &Resource,
    dependencies: &BTreeMap<String, Dependency>,
    name: &str,
) -> Result<Value, ResourceError> {
    let mut resolver = Resolver::new(&resource.name, &resource.depends_on, dependencies);

    if let Some(template) = &resource.spec.object {
        return resolver
            .resolve(template)
            .map_err(|e| ResourceError::terminal(e.to_string()));
    }

    let Some(plugin) = &resource.spec.plugin else {
        return Err(ResourceError::terminal(
            "resource must set exactly one of spec.object or spec.plugin",
        ));
    };
    let spec = resolver
        .resolve_map(&plugin.spec)
        .map_err(|e| ResourceError::terminal(e.to_string()))?;
    let plugin_ctx = PluginContext {
        namespace: bundle.namespace().unwrap_or_default(),
        bundle: bundle.name_any(),
        dependencies: dependencies.clone(),
    };
    let mut object = ctx
        .plugins
        .process(&plugin.name, &spec, &plugin_ctx)
        .map_err(|e| ResourceError::terminal(e.to_string()))?;
    set_metadata(&mut object, "name", Value::String(name.to_string()))?;
    Ok(object)
}

fn metadata_mut(object: &mut Value) -> Result<&mut Map<String, Value>, ResourceError> {
    let root = object
        .as_object_mut()
        .ok_or_else(|| ResourceError::terminal("desired object is not a JSON object"))?;
    let meta = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        return Err(ResourceError::terminal("metadata is not an object"));
    }
    meta.as_object_mut()
        .ok_or_else(|| ResourceError::terminal("metadata is not an object"))
}

fn set_metadata(object: &mut Value, field: &str, value: Value) -> Result<(), ResourceError> {
    metadata_mut(object)?.insert(field.to_string(), value);
    Ok(())
}

/// Force the Bundle namespace and add managed labels and owner references.
fn stamp(
    mut desired: Value,
    bundle: &Bundle,
    resource: &Resource,
    processed: &BTreeMap<String, ResourceInfo>,
    namespace: &str,
) -> Result<Value, ResourceError> {
    let mut owners = vec![bundle_owner_reference(bundle)];
    owners.extend(
        resource
            .depends_on
            .iter()
            .filter_map(|dep| processed.get(dep)?.actual.as_ref())
            .filter_map(dependency_owner_reference),
    );
    let owners = serde_json::to_value(owners)
        .map_err(|e| ResourceError::terminal(format!("serialize owner references: {e}")))?;

    let meta = metadata_mut(&mut desired)?;
    meta.insert("namespace".to_string(), Value::String(namespace.to_string()));

    let labels = meta
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    if let Some(labels) = labels.as_object_mut() {
        for (k, v) in managed_labels(&bundle.name_any()) {
            labels.insert(k, Value::String(v));
        }
    }

    meta.insert("ownerReferences".to_string(), owners);
    Ok(desired)
}

fn check_consistency(
    ctx: &Context,
    gvk: &GroupVersionKind,
    desired: &Value,
    written: &DynamicObject,
    reference: &ObjectRef,
) -> Result<(), ResourceError> {
    let written = to_value(written)?;
    let comparison = compare(ctx.cleanup.as_ref(), gvk, desired, &written)
        .map_err(|e| ResourceError::terminal(e.to_string()))?;
    if comparison.matches {
        return Ok(());
    }
    Err(ResourceError::terminal(format!(
        "{reference} does not converge, the server changed it after write: {}",
        comparison.diff.join("; ")
    )))
}

/// Facets a ready object exposes. `None` when a facet is not available yet.
async fn facets_of(
    ctx: &Context,
    gvk: &GroupVersionKind,
    obj: &DynamicObject,
    namespace: &str,
) -> Result<Option<BTreeMap<String, Value>>, ResourceError> {
    let mut facets = BTreeMap::new();
    if gvk.group != SERVICE_CATALOG_GROUP || gvk.kind != KIND_SERVICE_BINDING {
        return Ok(Some(facets));
    }

    let secret_name = obj
        .data
        .pointer("/spec/secretName")
        .and_then(Value::as_str)
        .map_or_else(|| obj.name_any(), str::to_string);
    let secret_gvk = GroupVersionKind::gvk("", CORE_API_VERSION, KIND_SECRET);
    let reference = ObjectRef::new(&secret_gvk, &secret_name);
    let secret = ctx
        .store
        .get(&secret_gvk, namespace, &secret_name)
        .await
        .map_err(|e| ResourceError::from_client("get", &reference, &e))?;

    match secret {
        Some(secret) => {
            facets.insert(MODIFIER_BIND_SECRET.to_string(), to_value(&secret)?);
            Ok(Some(facets))
        }
        None => {
            debug!(secret = %reference, "Bound secret not created yet");
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod resource_tests;
