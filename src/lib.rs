// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Conductor - declarative Bundle controller for Kubernetes
//!
//! Conductor reconciles `Bundle` custom resources. A Bundle is a named set of
//! resources, each an object template or a plugin invocation, with explicit
//! dependencies between them. Resources are created in dependency order and may
//! read values from the live objects of the resources they depend on through
//! reference tokens such as `{{db#status.endpoint}}`.
//!
//! ## Modules
//!
//! - [`crd`] - The `Bundle` custom resource
//! - [`graph`] - Dependency graph and deterministic topological sort
//! - [`references`] - Reference token parsing and resolution
//! - [`reconcilers`] - Drift checking, per-resource and per-Bundle reconciliation
//! - [`workqueue`] - Rate-limited work queue feeding the workers
//! - [`store`] / [`kube_store`] - Cluster access contracts and their kube-rs implementation
//! - [`readiness`], [`cleanup`], [`plugins`] - Registries injected through [`context::Context`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use conductor::context::Context;
//! use conductor::kube_store::KubeCluster;
//! use conductor::reconcilers::reconcile_bundle;
//! use std::sync::Arc;
//!
//! async fn run_once(client: kube::Client) -> anyhow::Result<()> {
//!     let cluster = Arc::new(KubeCluster::new(client));
//!     let ctx = Context::new(cluster.clone(), cluster);
//!     let summary = reconcile_bundle(&ctx, "team-a", "app").await?;
//!     println!("ready: {}", summary.ready);
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod graph;
pub mod kube_store;
pub mod labels;
pub mod metrics;
pub mod objects;
pub mod plugins;
pub mod readiness;
pub mod reconcilers;
pub mod references;
pub mod status_reasons;
pub mod store;
pub mod workqueue;

#[cfg(test)]
pub mod testing;
