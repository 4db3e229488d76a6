// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! kube-rs backed implementation of [`ObjectStore`] and [`ClusterClient`].
//!
//! Kinds are resolved through API discovery on first use and cached. Owned objects
//! are found by listing, with the managed-by label selector, every namespaced kind
//! the cluster serves (one version per group and kind) plus every kind the
//! controller has written, so objects created before a restart are still seen.

use crate::constants::CONTROLLER_NAME;
use crate::crd::Bundle;
use crate::errors::ClientError;
use crate::labels::{K8S_MANAGED_BY, MANAGED_BY_CONDUCTOR};
use crate::objects::{gvk_of, is_owned_by};
use crate::reconcilers::retry::retry_api_call;
use crate::store::{ClusterClient, DeletePreconditions, ObjectStore};
use async_trait::async_trait;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, Preconditions,
    PropagationPolicy,
};
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{pinned_kind, verbs, ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

fn cache_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}", gvk.api_version(), gvk.kind)
}

/// Namespaced kinds supporting every verb in `required`.
#[must_use]
pub fn namespaced_kinds(
    resources: &[(ApiResource, ApiCapabilities)],
    required: &[&str],
) -> Vec<ApiResource> {
    resources
        .iter()
        .filter(|(_, caps)| matches!(caps.scope, Scope::Namespaced))
        .filter(|(_, caps)| required.iter().all(|verb| caps.supports_operation(verb)))
        .map(|(ar, _)| ar.clone())
        .collect()
}

/// Kinds to scan for owned objects: one API resource per group and kind.
///
/// An object is served under every version of its kind, so listing two versions
/// would report it twice. Discovered (preferred) versions win over served ones.
#[must_use]
pub fn scan_kinds(discovered: Vec<ApiResource>, served: Vec<ApiResource>) -> Vec<ApiResource> {
    let mut kinds = BTreeMap::new();
    for ar in served.into_iter().chain(discovered) {
        kinds.insert((ar.group.clone(), ar.kind.clone()), ar);
    }
    kinds.into_values().collect()
}

/// Merge patch body written to the status subresource.
///
/// `resourceVersion` makes the server reject a status computed from a stale Bundle.
#[must_use]
pub fn status_patch(bundle: &Bundle) -> Value {
    json!({
        "metadata": { "resourceVersion": bundle.resource_version() },
        "status": bundle.status,
    })
}

/// Cluster access through the Kubernetes API server.
pub struct KubeCluster {
    client: Client,
    // key: "apiVersion/kind"; ordered so listing owned objects is deterministic
    resources: RwLock<BTreeMap<String, ApiResource>>,
    // namespaced kinds from the first full discovery
    discovered: RwLock<Option<Vec<(ApiResource, ApiCapabilities)>>>,
}

impl KubeCluster {
    /// Wrap a kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: RwLock::new(BTreeMap::new()),
            discovered: RwLock::new(None),
        }
    }

    /// Every namespaced kind the cluster serves, discovered once per process.
    async fn namespaced_resources(&self) -> Result<Vec<(ApiResource, ApiCapabilities)>, ClientError> {
        if let Some(found) = self.discovered.read().await.as_ref() {
            return Ok(found.clone());
        }

        let discovery = Discovery::new(self.client.clone()).run().await?;
        let found: Vec<(ApiResource, ApiCapabilities)> = discovery
            .groups()
            .flat_map(|group| group.recommended_resources())
            .filter(|(_, caps)| matches!(caps.scope, Scope::Namespaced))
            .collect();
        debug!(kinds = found.len(), "Discovered namespaced kinds");

        *self.discovered.write().await = Some(found.clone());
        Ok(found)
    }

    /// Namespaced kinds that can be listed and watched.
    ///
    /// # Errors
    ///
    /// Returns the discovery error.
    pub async fn watchable_kinds(&self) -> Result<Vec<ApiResource>, ClientError> {
        let resources = self.namespaced_resources().await?;
        Ok(namespaced_kinds(&resources, &[verbs::LIST, verbs::WATCH]))
    }

    /// Resolve a kind to its API resource, using discovery on a cache miss.
    async fn api_resource(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ClientError> {
        let key = cache_key(gvk);
        if let Some(ar) = self.resources.read().await.get(&key) {
            return Ok(ar.clone());
        }

        let (ar, _caps) = retry_api_call(
            || pinned_kind(&self.client, gvk),
            &format!("discover {key}"),
        )
        .await
        .map_err(|e| {
            let err = ClientError::from(e);
            // An unknown kind is not a transport failure: the CRD may simply not be installed yet.
            match err {
                ClientError::NotFound(message) => ClientError::Other {
                    message: format!("kind {key} is not served by the cluster: {message}"),
                    retriable: true,
                },
                other => other,
            }
        })?;
        debug!(kind = %key, plural = %ar.plural, "Resolved API resource");

        self.resources.write().await.insert(key, ar.clone());
        Ok(ar)
    }

    async fn dynamic_api(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
    ) -> Result<Api<DynamicObject>, ClientError> {
        let ar = self.api_resource(gvk).await?;
        Ok(Api::namespaced_with(self.client.clone(), namespace, &ar))
    }

    async fn api_for_object(
        &self,
        obj: &DynamicObject,
    ) -> Result<(Api<DynamicObject>, String), ClientError> {
        let gvk = gvk_of(obj).ok_or_else(|| ClientError::Other {
            message: format!("object {} has no apiVersion/kind", obj.name_any()),
            retriable: false,
        })?;
        let namespace = obj.namespace().unwrap_or_default();
        let api = self.dynamic_api(&gvk, &namespace).await?;
        Ok((api, obj.name_any()))
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for KubeCluster {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClientError> {
        let api = self.dynamic_api(gvk, namespace).await?;
        let mut obj = api.get_opt(name).await?;
        if let Some(o) = obj.as_mut() {
            if o.types.is_none() {
                o.types = Some(TypeMeta {
                    api_version: gvk.api_version(),
                    kind: gvk.kind.clone(),
                });
            }
        }
        Ok(obj)
    }

    async fn objects_owned_by(
        &self,
        namespace: &str,
        owner_uid: &str,
    ) -> Result<Vec<DynamicObject>, ClientError> {
        let discovered = namespaced_kinds(&self.namespaced_resources().await?, &[verbs::LIST]);
        let served: Vec<ApiResource> = self.resources.read().await.values().cloned().collect();
        let selector = format!("{K8S_MANAGED_BY}={MANAGED_BY_CONDUCTOR}");
        let lp = ListParams::default().labels(&selector);

        let mut owned = Vec::new();
        let mut seen = HashSet::new();
        for ar in scan_kinds(discovered, served) {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), namespace, &ar);
            let list = match api.list(&lp).await {
                Ok(list) => list,
                Err(kube::Error::Api(response)) if matches!(response.code, 403 | 404 | 405) => {
                    warn!(kind = %ar.kind, code = response.code, "Kind cannot be listed, skipping in ownership scan");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for mut obj in list.items {
                if !is_owned_by(&obj, owner_uid) {
                    continue;
                }
                if let Some(uid) = &obj.metadata.uid {
                    if !seen.insert(uid.clone()) {
                        continue;
                    }
                }
                // List items usually arrive without apiVersion/kind.
                obj.types = Some(TypeMeta {
                    api_version: ar.api_version.clone(),
                    kind: ar.kind.clone(),
                });
                owned.push(obj);
            }
        }
        Ok(owned)
    }

    async fn get_bundle(&self, namespace: &str, name: &str) -> Result<Option<Bundle>, ClientError> {
        let api: Api<Bundle> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let (api, _) = self.api_for_object(obj).await?;
        Ok(api.create(&Self::post_params(), obj).await?)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let (api, name) = self.api_for_object(obj).await?;
        Ok(api.replace(&name, &Self::post_params(), obj).await?)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
        preconditions: &DeletePreconditions,
    ) -> Result<(), ClientError> {
        let api = self.dynamic_api(gvk, namespace).await?;
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            preconditions: preconditions.uid.as_ref().map(|uid| Preconditions {
                uid: Some(uid.clone()),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };
        api.delete(name, &dp).await?;
        Ok(())
    }

    async fn update_bundle(&self, bundle: &Bundle) -> Result<Bundle, ClientError> {
        let namespace = bundle.namespace().unwrap_or_default();
        let api: Api<Bundle> = Api::namespaced(self.client.clone(), &namespace);
        // resourceVersion in a merge patch makes the server reject stale writes with 409.
        let patch = json!({
            "metadata": {
                "resourceVersion": bundle.resource_version(),
                "finalizers": bundle.finalizers(),
            }
        });
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PatchParams::default()
        };
        Ok(api
            .patch(&bundle.name_any(), &params, &Patch::Merge(&patch))
            .await?)
    }

    async fn update_bundle_status(&self, bundle: &Bundle) -> Result<Bundle, ClientError> {
        let namespace = bundle.namespace().unwrap_or_default();
        let api: Api<Bundle> = Api::namespaced(self.client.clone(), &namespace);
        let patch = status_patch(bundle);
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PatchParams::default()
        };
        Ok(api
            .patch_status(&bundle.name_any(), &params, &Patch::Merge(&patch))
            .await?)
    }
}

#[cfg(test)]
#[path = "kube_store_tests.rs"]
mod kube_store_tests;
