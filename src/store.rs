// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Contracts with the cluster: cached reads and REST writes.
//!
//! The reconcilers only talk to the cluster through these traits. The production
//! implementation is [`crate::kube_store::KubeCluster`]; tests use in-memory fakes.
//!
//! Implementations must hand out owned snapshots. Callers are free to mutate
//! what they receive.

use crate::crd::Bundle;
use crate::errors::ClientError;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;

/// Guards for a delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePreconditions {
    /// Only delete if the live object still has this UID.
    pub uid: Option<String>,
}

/// Read access to cluster objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClientError>;

    /// Every object in `namespace` whose owner references include `owner_uid`.
    async fn objects_owned_by(
        &self,
        namespace: &str,
        owner_uid: &str,
    ) -> Result<Vec<DynamicObject>, ClientError>;

    /// Fetch a Bundle. `Ok(None)` when it does not exist.
    async fn get_bundle(&self, namespace: &str, name: &str) -> Result<Option<Bundle>, ClientError>;
}

/// Write access to cluster objects.
///
/// Writes are namespaced by the object's own `metadata.namespace`.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create an object.
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError>;

    /// Replace an object. Fails with [`ClientError::Conflict`] on a stale `resourceVersion`.
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError>;

    /// Delete an object with foreground propagation.
    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
        preconditions: &DeletePreconditions,
    ) -> Result<(), ClientError>;

    /// Replace a Bundle's metadata and spec (finalizers).
    async fn update_bundle(&self, bundle: &Bundle) -> Result<Bundle, ClientError>;

    /// Replace a Bundle's status subresource.
    async fn update_bundle_status(&self, bundle: &Bundle) -> Result<Bundle, ClientError>;
}
