// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for `Bundle` resources.
//!
//! A Bundle carries a deletion-protection finalizer so that the controller gets a
//! chance to tear down its objects before the Bundle disappears.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::labels::FINALIZER_BUNDLE;
//! use conductor::reconcilers::finalizers::{ensure_finalizer, handle_deletion};
//!
//! if bundle.metadata.deletion_timestamp.is_some() {
//!     return handle_deletion(store, client, &bundle, FINALIZER_BUNDLE).await;
//! }
//! if ensure_finalizer(client, &bundle, FINALIZER_BUNDLE).await? {
//!     // the next pass observes the finalizer
//! }
//! ```

use crate::crd::Bundle;
use crate::errors::ClientError;
use crate::metrics::record_object_write;
use crate::objects::{is_controlled_by, ObjectRef};
use crate::store::{ClusterClient, DeletePreconditions, ObjectStore};
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Cleanup that must finish before the finalizer is removed.
#[async_trait]
pub trait FinalizerCleanup {
    /// Perform cleanup. On error the finalizer stays and deletion is retried.
    ///
    /// Every owned object is attempted even when an earlier delete fails.
    ///
    /// # Errors
    ///
    /// Returns the first client error that is not an already-deleted or
    /// already-replaced object.
    async fn cleanup(&self, store: &dyn ObjectStore, client: &dyn ClusterClient)
        -> Result<(), ClientError>;
}

#[async_trait]
impl FinalizerCleanup for Bundle {
    async fn cleanup(
        &self,
        store: &dyn ObjectStore,
        client: &dyn ClusterClient,
    ) -> Result<(), ClientError> {
        let namespace = self.namespace().unwrap_or_default();
        let Some(uid) = self.metadata.uid.as_deref() else {
            return Ok(());
        };

        let owned = store.objects_owned_by(&namespace, uid).await?;
        let mut first_error = None;
        for obj in owned.iter().filter(|o| is_controlled_by(o, uid)) {
            let Some(reference) = ObjectRef::from_object(obj) else {
                continue;
            };
            if let Err(e) =
                delete_owned_object(client, &namespace, &reference, obj.metadata.uid.clone()).await
            {
                warn!(namespace = %namespace, object = %reference, error = %e, "Failed to delete owned object");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Delete one owned object, guarded by its UID.
///
/// Returns `true` when the object was deleted by this call. An object that is
/// already gone (`NotFound`) or was replaced by a different one (`Conflict`) counts
/// as success and returns `false`.
///
/// # Errors
///
/// Returns any other client error.
pub async fn delete_owned_object(
    client: &dyn ClusterClient,
    namespace: &str,
    reference: &ObjectRef,
    uid: Option<String>,
) -> Result<bool, ClientError> {
    let preconditions = DeletePreconditions { uid };
    match client
        .delete(&reference.gvk(), namespace, &reference.name, &preconditions)
        .await
    {
        Ok(()) => {
            record_object_write("delete", &reference.kind);
            info!(namespace = %namespace, object = %reference, "Deleted owned object");
            Ok(true)
        }
        Err(ClientError::NotFound(_)) => {
            debug!(namespace = %namespace, object = %reference, "Owned object already deleted");
            Ok(false)
        }
        Err(ClientError::Conflict(message)) => {
            debug!(
                namespace = %namespace,
                object = %reference,
                reason = %message,
                "Owned object was replaced, leaving it alone"
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Whether the Bundle carries `finalizer`.
#[must_use]
pub fn has_finalizer(bundle: &Bundle, finalizer: &str) -> bool {
    bundle.finalizers().iter().any(|f| f == finalizer)
}

/// Add a finalizer if not already present.
///
/// Returns `true` when the Bundle was updated.
///
/// # Errors
///
/// Returns the client error of the update; a stale `resourceVersion` surfaces
/// as [`ClientError::Conflict`].
pub async fn ensure_finalizer(
    client: &dyn ClusterClient,
    bundle: &Bundle,
    finalizer: &str,
) -> Result<bool, ClientError> {
    if has_finalizer(bundle, finalizer) {
        return Ok(false);
    }

    info!(
        bundle = %bundle.name_any(),
        namespace = %bundle.namespace().unwrap_or_default(),
        finalizer = finalizer,
        "Adding finalizer"
    );

    let mut updated = bundle.clone();
    updated
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    client.update_bundle(&updated).await?;
    Ok(true)
}

/// Remove a finalizer if present.
///
/// # Errors
///
/// Returns the client error of the update. A Bundle that is already gone is not an error.
pub async fn remove_finalizer(
    client: &dyn ClusterClient,
    bundle: &Bundle,
    finalizer: &str,
) -> Result<(), ClientError> {
    if !has_finalizer(bundle, finalizer) {
        return Ok(());
    }

    info!(
        bundle = %bundle.name_any(),
        namespace = %bundle.namespace().unwrap_or_default(),
        finalizer = finalizer,
        "Removing finalizer"
    );

    let mut updated = bundle.clone();
    if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }
    match client.update_bundle(&updated).await {
        Ok(_) | Err(ClientError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Run cleanup and then release the finalizer of a Bundle marked for deletion.
///
/// Does nothing when the finalizer is already gone.
///
/// # Errors
///
/// Returns the cleanup or update error; the finalizer is kept in that case.
pub async fn handle_deletion(
    store: &dyn ObjectStore,
    client: &dyn ClusterClient,
    bundle: &Bundle,
    finalizer: &str,
) -> Result<(), ClientError> {
    if !has_finalizer(bundle, finalizer) {
        debug!(bundle = %bundle.name_any(), "Finalizer already removed, nothing to clean up");
        return Ok(());
    }

    info!(
        bundle = %bundle.name_any(),
        namespace = %bundle.namespace().unwrap_or_default(),
        "Bundle is being deleted, removing owned objects"
    );

    if let Err(e) = bundle.cleanup(store, client).await {
        warn!(
            bundle = %bundle.name_any(),
            error = %e,
            "Cleanup failed, keeping finalizer"
        );
        return Err(e);
    }

    remove_finalizer(client, bundle, finalizer).await
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
