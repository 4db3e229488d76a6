// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of `Bundle` resources.
//!
//! # Reconciliation Architecture
//!
//! Conductor follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Bundle changes are turned into keys on the work queue
//! 2. **Validate** - The spec is checked for structural errors ([`validation`])
//! 3. **Reconcile** - Each resource is evaluated and written in dependency order ([`resource`]),
//!    comparing desired and live state with the merge engine ([`drift`])
//! 4. **Status** - Conditions are written back to the Bundle ([`status`])
//!
//! [`reconcile_bundle`] runs one full pass; [`finalizers`] handles teardown and
//! [`retry`] holds the backoff policy shared with the work queue.

pub mod bundle;
pub mod drift;
pub mod finalizers;
pub mod resource;
pub mod retry;
pub mod status;
pub mod validation;

pub use bundle::{reconcile_bundle, PassSummary};
