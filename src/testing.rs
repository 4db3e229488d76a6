// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory collaborators for unit tests.
//!
//! [`FakeCluster`] implements both [`ObjectStore`] and [`ClusterClient`] over a map
//! of objects, mimicking the API server closely enough for reconciliation tests:
//! UIDs and resource versions are assigned on write, stale writes conflict,
//! delete preconditions are honoured, Secret `stringData` is folded into
//! `data` and status writes are applied as merge patches. Every write is
//! recorded in [`FakeCluster::calls`].

use crate::crd::{Bundle, BundleSpec, Resource};
use crate::errors::{ClientError, PluginError, ReadinessError};
use crate::labels::FINALIZER_BUNDLE;
use crate::objects::{is_owned_by, ObjectRef};
use crate::plugins::{Plugin, PluginContext, PluginDescription};
use crate::readiness::{generic_readiness, ReadinessChecker};
use crate::store::{ClusterClient, DeletePreconditions, ObjectStore};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Namespace used by [`test_bundle`].
pub const TEST_NAMESPACE: &str = "team-a";

/// UID used by [`test_bundle`].
pub const TEST_BUNDLE_UID: &str = "bundle-uid";

/// Deserialize a JSON literal into a [`DynamicObject`].
pub fn dynamic_object(value: Value) -> DynamicObject {
    serde_json::from_value(value).expect("valid DynamicObject literal")
}

/// A Bundle in [`TEST_NAMESPACE`] with UID [`TEST_BUNDLE_UID`] and the finalizer set.
pub fn test_bundle(name: &str, resources: Vec<Resource>) -> Bundle {
    let mut bundle = Bundle::new(name, BundleSpec { resources });
    bundle.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    bundle.metadata.uid = Some(TEST_BUNDLE_UID.to_string());
    bundle.metadata.generation = Some(1);
    bundle.metadata.resource_version = Some("1".to_string());
    bundle.metadata.finalizers = Some(vec![FINALIZER_BUNDLE.to_string()]);
    bundle
}

/// A resource with an object template.
pub fn object_resource(name: &str, depends_on: &[&str], template: Value) -> Resource {
    Resource {
        name: name.to_string(),
        depends_on: depends_on.iter().map(ToString::to_string).collect(),
        spec: crate::crd::ResourceSpec::object(template),
    }
}

/// A `v1/ConfigMap` template.
pub fn config_map(name: &str, data: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name},
        "data": data
    })
}

/// Apply an RFC 7386 JSON merge patch to `target`.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(current) = target {
        for (key, value) in fields {
            if value.is_null() {
                current.remove(key);
            } else {
                apply_merge_patch(current.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Plugin producing a `v1/ConfigMap` whose data holds the stringified spec values.
pub struct ConfigMapPlugin;

impl Plugin for ConfigMapPlugin {
    fn describe(&self) -> PluginDescription {
        PluginDescription {
            name: "configmap".to_string(),
            gvk: GroupVersionKind::gvk("", "v1", "ConfigMap"),
        }
    }

    fn process(&self, spec: &Map<String, Value>, _ctx: &PluginContext) -> Result<Value, PluginError> {
        let data: Map<String, Value> = spec
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), Value::String(text))
            })
            .collect();
        Ok(json!({ "data": data }))
    }
}

/// Readiness checker with per-object overrides, falling back to the generic check.
#[derive(Default)]
pub struct FakeReadiness {
    pending: Mutex<HashSet<String>>,
    failing: Mutex<HashMap<String, ReadinessError>>,
}

impl FakeReadiness {
    /// Everything follows the generic check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the object with this name as not ready.
    pub fn set_pending(&self, object_name: &str) {
        self.pending.lock().unwrap().insert(object_name.to_string());
    }

    /// Clear a pending override.
    pub fn set_ready(&self, object_name: &str) {
        self.pending.lock().unwrap().remove(object_name);
    }

    /// Report an error for the object with this name.
    pub fn set_failing(&self, object_name: &str, err: ReadinessError) {
        self.failing
            .lock()
            .unwrap()
            .insert(object_name.to_string(), err);
    }
}

impl ReadinessChecker for FakeReadiness {
    fn is_ready(&self, _gvk: &GroupVersionKind, obj: &DynamicObject) -> Result<bool, ReadinessError> {
        let name = obj.name_any();
        if let Some(err) = self.failing.lock().unwrap().get(&name) {
            return Err(err.clone());
        }
        if self.pending.lock().unwrap().contains(&name) {
            return Ok(false);
        }
        generic_readiness(obj)
    }
}

/// A call recorded by [`FakeCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `create`
    Create(ObjectRef),
    /// `update`
    Update(ObjectRef),
    /// `delete`, with the UID precondition it carried
    Delete {
        /// Target
        object: ObjectRef,
        /// UID precondition
        uid: Option<String>,
    },
    /// `update_bundle`
    UpdateBundle(String),
    /// `update_bundle_status`
    UpdateBundleStatus(String),
}

impl Call {
    /// Whether this call wrote a managed object.
    pub fn is_object_write(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Update(_) | Self::Delete { .. })
    }
}

/// Operation an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `get`
    Get,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `update_bundle_status`
    UpdateStatus,
}

type Admission = Arc<dyn Fn(&mut Value) + Send + Sync>;

#[derive(Default)]
struct FakeState {
    // key: (namespace, apiVersion, kind, name)
    objects: BTreeMap<(String, String, String, String), DynamicObject>,
    bundles: BTreeMap<(String, String), Bundle>,
    calls: Vec<Call>,
    failures: HashMap<(Op, String), ClientError>,
    next_uid: u64,
    admission: Option<Admission>,
}

fn object_key(namespace: &str, api_version: &str, kind: &str, name: &str) -> (String, String, String, String) {
    (
        namespace.to_string(),
        api_version.to_string(),
        kind.to_string(),
        name.to_string(),
    )
}

fn key_of(obj: &DynamicObject) -> (String, String, String, String) {
    let types = obj.types.clone().unwrap_or_default();
    object_key(
        &obj.namespace().unwrap_or_default(),
        &types.api_version,
        &types.kind,
        &obj.name_any(),
    )
}

fn bump(resource_version: Option<&String>) -> String {
    let current: u64 = resource_version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

/// In-memory cluster.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    /// Empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a Bundle as-is.
    pub fn insert_bundle(&self, bundle: &Bundle) {
        let key = (bundle.namespace().unwrap_or_default(), bundle.name_any());
        self.state.lock().unwrap().bundles.insert(key, bundle.clone());
    }

    /// Current copy of a Bundle.
    pub fn bundle(&self, namespace: &str, name: &str) -> Option<Bundle> {
        self.state
            .lock()
            .unwrap()
            .bundles
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Store an object without recording a call. Assigns a UID and resource version if missing.
    pub fn insert(&self, obj: DynamicObject) -> DynamicObject {
        let mut state = self.state.lock().unwrap();
        let mut obj = obj;
        if obj.metadata.uid.is_none() {
            state.next_uid += 1;
            obj.metadata.uid = Some(format!("uid-{}", state.next_uid));
        }
        if obj.metadata.resource_version.is_none() {
            obj.metadata.resource_version = Some("1".to_string());
        }
        state.objects.insert(key_of(&obj), obj.clone());
        obj
    }

    /// Current copy of an object.
    pub fn object(&self, namespace: &str, api_version: &str, kind: &str, name: &str) -> Option<DynamicObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&object_key(namespace, api_version, kind, name))
            .cloned()
    }

    /// Remove an object without recording a call.
    pub fn remove(&self, namespace: &str, api_version: &str, kind: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&object_key(namespace, api_version, kind, name));
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded create/update/delete calls.
    pub fn object_writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_object_write).collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make `op` on the object (or Bundle) named `name` fail with `err` until cleared.
    pub fn fail(&self, op: Op, name: &str, err: ClientError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, name.to_string()), err);
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Mutate every created or updated object the way a mutating webhook would.
    pub fn set_admission(&self, admission: impl Fn(&mut Value) + Send + Sync + 'static) {
        self.state.lock().unwrap().admission = Some(Arc::new(admission));
    }

    fn injected(state: &FakeState, op: Op, name: &str) -> Result<(), ClientError> {
        match state.failures.get(&(op, name.to_string())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Server-side defaulting: fold Secret `stringData`, default the Secret type, run admission.
    fn admit(state: &FakeState, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let mut value = serde_json::to_value(obj).map_err(|e| ClientError::Other {
            message: e.to_string(),
            retriable: false,
        })?;
        if obj.types.as_ref().map(|t| t.kind.as_str()) == Some("Secret") {
            value = crate::cleanup::secret_cleanup(&value, &json!({"type": "Opaque"})).map_err(|e| {
                ClientError::Other {
                    message: e.to_string(),
                    retriable: false,
                }
            })?;
        }
        if let Some(admission) = &state.admission {
            admission(&mut value);
        }
        serde_json::from_value(value).map_err(|e| ClientError::Other {
            message: e.to_string(),
            retriable: false,
        })
    }
}

#[async_trait]
impl ObjectStore for FakeCluster {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClientError> {
        let state = self.state.lock().unwrap();
        Self::injected(&state, Op::Get, name)?;
        Ok(state
            .objects
            .get(&object_key(namespace, &gvk.api_version(), &gvk.kind, name))
            .cloned())
    }

    async fn objects_owned_by(
        &self,
        namespace: &str,
        owner_uid: &str,
    ) -> Result<Vec<DynamicObject>, ClientError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|((ns, ..), obj)| ns == namespace && is_owned_by(obj, owner_uid))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get_bundle(&self, namespace: &str, name: &str) -> Result<Option<Bundle>, ClientError> {
        Ok(self.bundle(namespace, name))
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let mut state = self.state.lock().unwrap();
        let reference = ObjectRef::from_object(obj).unwrap_or_else(|| ObjectRef {
            api_version: String::new(),
            kind: String::new(),
            name: obj.name_any(),
        });
        state.calls.push(Call::Create(reference.clone()));
        Self::injected(&state, Op::Create, &obj.name_any())?;

        let key = key_of(obj);
        if state.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(reference.to_string()));
        }
        let mut created = Self::admit(&state, obj)?;
        state.next_uid += 1;
        created.metadata.uid = Some(format!("uid-{}", state.next_uid));
        created.metadata.resource_version = Some("1".to_string());
        created.metadata.generation = Some(1);
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let mut state = self.state.lock().unwrap();
        let reference = ObjectRef::from_object(obj).unwrap_or_else(|| ObjectRef {
            api_version: String::new(),
            kind: String::new(),
            name: obj.name_any(),
        });
        state.calls.push(Call::Update(reference.clone()));
        Self::injected(&state, Op::Update, &obj.name_any())?;

        let key = key_of(obj);
        let Some(live) = state.objects.get(&key).cloned() else {
            return Err(ClientError::NotFound(reference.to_string()));
        };
        if let Some(rv) = &obj.metadata.resource_version {
            if live.metadata.resource_version.as_ref() != Some(rv) {
                return Err(ClientError::Conflict(format!(
                    "{reference}: resourceVersion {rv} is stale"
                )));
            }
        }
        let mut updated = Self::admit(&state, obj)?;
        updated.metadata.uid = live.metadata.uid.clone();
        updated.metadata.resource_version = Some(bump(live.metadata.resource_version.as_ref()));
        updated.metadata.generation = Some(live.metadata.generation.unwrap_or(1) + 1);
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
        preconditions: &DeletePreconditions,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        let reference = ObjectRef::new(gvk, name);
        state.calls.push(Call::Delete {
            object: reference.clone(),
            uid: preconditions.uid.clone(),
        });
        Self::injected(&state, Op::Delete, name)?;

        let key = object_key(namespace, &gvk.api_version(), &gvk.kind, name);
        let Some(live) = state.objects.get(&key) else {
            return Err(ClientError::NotFound(reference.to_string()));
        };
        if let Some(uid) = &preconditions.uid {
            if live.metadata.uid.as_ref() != Some(uid) {
                return Err(ClientError::Conflict(format!(
                    "{reference}: UID precondition {uid} failed"
                )));
            }
        }
        state.objects.remove(&key);
        Ok(())
    }

    async fn update_bundle(&self, bundle: &Bundle) -> Result<Bundle, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdateBundle(bundle.name_any()));
        let key = (bundle.namespace().unwrap_or_default(), bundle.name_any());
        let Some(live) = state.bundles.get(&key).cloned() else {
            return Err(ClientError::NotFound(bundle.name_any()));
        };
        if bundle.metadata.resource_version != live.metadata.resource_version {
            return Err(ClientError::Conflict(bundle.name_any()));
        }

        let mut updated = live;
        updated.metadata.finalizers = bundle.metadata.finalizers.clone();
        updated.metadata.resource_version = Some(bump(updated.metadata.resource_version.as_ref()));
        let finalizers_clear = updated.finalizers().is_empty();
        if updated.metadata.deletion_timestamp.is_some() && finalizers_clear {
            state.bundles.remove(&key);
        } else {
            state.bundles.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_bundle_status(&self, bundle: &Bundle) -> Result<Bundle, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdateBundleStatus(bundle.name_any()));
        Self::injected(&state, Op::UpdateStatus, &bundle.name_any())?;
        let key = (bundle.namespace().unwrap_or_default(), bundle.name_any());
        let Some(live) = state.bundles.get(&key).cloned() else {
            return Err(ClientError::NotFound(bundle.name_any()));
        };
        if bundle.metadata.resource_version != live.metadata.resource_version {
            return Err(ClientError::Conflict(bundle.name_any()));
        }

        let patch = crate::kube_store::status_patch(bundle);
        let mut status = serde_json::to_value(&live.status).unwrap();
        apply_merge_patch(&mut status, &patch["status"]);

        let mut updated = live;
        updated.status = serde_json::from_value(status).unwrap();
        updated.metadata.resource_version = Some(bump(updated.metadata.resource_version.as_ref()));
        state.bundles.insert(key, updated.clone());
        Ok(updated)
    }
}
