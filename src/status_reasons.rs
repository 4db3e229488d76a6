// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for `Bundle` resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition Hierarchy
//!
//! - **Bundle level** (`status.conditions`): `InProgress`, `Ready`, `Error`
//! - **Resource level** (`status.resourceStatuses[*].conditions`): `Blocked`,
//!   `InProgress`, `Ready`, `Error`
//!
//! Every condition type of a level is always present, either `"True"` or `"False"`.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: InProgress
//!       status: "True"
//!     - type: Ready
//!       status: "False"
//!     - type: Error
//!       status: "False"
//!   resourceStatuses:
//!     - name: app-config
//!       conditions:
//!         - type: Blocked
//!           status: "True"
//!           reason: DependenciesNotReady
//!           message: "Not ready: [db-secret]"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Work is still being done to converge the Bundle or resource.
pub const CONDITION_TYPE_IN_PROGRESS: &str = "InProgress";

/// The Bundle or resource has converged.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Reconciliation failed.
pub const CONDITION_TYPE_ERROR: &str = "Error";

/// The resource cannot be processed yet (resource level only).
pub const CONDITION_TYPE_BLOCKED: &str = "Blocked";

// ============================================================================
// Condition Status Values
// ============================================================================

/// Condition holds.
pub const STATUS_TRUE: &str = "True";

/// Condition does not hold.
pub const STATUS_FALSE: &str = "False";

// ============================================================================
// Reasons
// ============================================================================

/// At least one dependency has not reached `Ready` yet.
pub const REASON_DEPENDENCIES_NOT_READY: &str = "DependenciesNotReady";

/// A dependency (direct or transitive) failed; no side effects were attempted.
pub const REASON_BLOCKED_BY_ERROR: &str = "BlockedByError";

/// The failure is transient; the Bundle will be retried with backoff.
pub const REASON_RETRIABLE_ERROR: &str = "RetriableError";

/// The failure requires a spec change or manual intervention.
pub const REASON_TERMINAL_ERROR: &str = "TerminalError";

/// The Bundle spec itself is malformed (duplicate names, cycles, bad references).
pub const REASON_INVALID_BUNDLE: &str = "InvalidBundle";

/// A create or update raced with another writer; a later watch event retriggers reconciliation.
pub const REASON_CONCURRENT_MODIFICATION: &str = "ConcurrentModification";

/// Objects are being created, updated or waited on.
pub const REASON_PROGRESSING: &str = "Progressing";

/// Everything has converged.
pub const REASON_ALL_READY: &str = "AllReady";

/// The resource has converged.
pub const REASON_READY: &str = "Ready";
