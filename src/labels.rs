// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label, annotation and finalizer constants.
//!
//! Every object created on behalf of a `Bundle` carries the same label set so
//! that owned objects can be listed cheaply and traced back to their Bundle.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/managed-by` on every managed object
pub const MANAGED_BY_CONDUCTOR: &str = "conductor";

/// Value for `app.kubernetes.io/part-of` on every managed object
pub const PART_OF_CONDUCTOR: &str = "conductor";

// ============================================================================
// Conductor-Specific Labels
// ============================================================================

/// Label naming the `Bundle` an object belongs to
pub const CONDUCTOR_BUNDLE_LABEL: &str = "conductor.firestoned.io/bundle";

// ============================================================================
// Finalizers
// ============================================================================

/// Deletion-protection finalizer for `Bundle` resources
pub const FINALIZER_BUNDLE: &str = "conductor.firestoned.io/bundle-finalizer";
