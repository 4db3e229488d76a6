// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Conductor controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "conductor.firestoned.io/v1alpha1";

/// Kind name for `Bundle` resource
pub const KIND_BUNDLE: &str = "Bundle";

/// Field manager / controller name reported on writes and in logs
pub const CONTROLLER_NAME: &str = "conductor";

// ============================================================================
// Well-known Kinds
// ============================================================================

/// Core API version (`v1`)
pub const CORE_API_VERSION: &str = "v1";

/// Kind name for core `Secret`
pub const KIND_SECRET: &str = "Secret";

/// Kind name for core `Service`
pub const KIND_SERVICE: &str = "Service";

/// API group of the service catalog
pub const SERVICE_CATALOG_GROUP: &str = "servicecatalog.k8s.io";

/// Kind name for service catalog `ServiceBinding`
pub const KIND_SERVICE_BINDING: &str = "ServiceBinding";

// ============================================================================
// Reference Modifiers
// ============================================================================

/// Modifier selecting the Secret bound by a `ServiceBinding`
pub const MODIFIER_BIND_SECRET: &str = "bindsecret";

// ============================================================================
// Work Queue Constants
// ============================================================================

/// Initial backoff for a failing key (500ms)
pub const QUEUE_BASE_DELAY_MILLIS: u64 = 500;

/// Maximum backoff between retries of a failing key (5 minutes)
pub const QUEUE_MAX_DELAY_SECS: u64 = 300;

/// Number of rate-limited requeues before a key is dropped
pub const QUEUE_MAX_RETRIES: u32 = 10;

/// Backoff multiplier (exponential growth factor)
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
pub const RANDOMIZATION_FACTOR: f64 = 0.1;

// ============================================================================
// Resync Constants
// ============================================================================

/// Resync interval for a Bundle that is Ready (5 minutes)
pub const RESYNC_READY_SECS: u64 = 300;

/// Resync interval for a Bundle that is still converging (30 seconds)
pub const RESYNC_PENDING_SECS: u64 = 30;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default number of concurrent reconciliation workers
pub const DEFAULT_RECONCILE_WORKERS: usize = 4;
