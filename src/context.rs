// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for reconciliation workers.
//!
//! Every worker receives an `Arc<Context>` that contains:
//! - the object store and cluster client
//! - the readiness, cleanup and plugin registries, built once at startup
//!
//! Nothing in the context is mutable after construction; the registries are
//! looked up by kind or name and injected rather than kept in global state.

use crate::cleanup::{CleanupTable, SpecCleanup};
use crate::plugins::PluginRegistry;
use crate::readiness::{ReadinessChecker, ReadinessTable};
use crate::store::{ClusterClient, ObjectStore};
use std::sync::Arc;

/// Shared context passed to every Bundle pass.
#[derive(Clone)]
pub struct Context {
    /// Read access to cluster objects
    pub store: Arc<dyn ObjectStore>,

    /// Write access to cluster objects
    pub client: Arc<dyn ClusterClient>,

    /// Kind-specific readiness predicates
    pub readiness: Arc<dyn ReadinessChecker>,

    /// Kind-specific cleanup before drift comparison
    pub cleanup: Arc<dyn SpecCleanup>,

    /// Registered plugins
    pub plugins: PluginRegistry,
}

impl Context {
    /// Context with the built-in registries and no plugins.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, client: Arc<dyn ClusterClient>) -> Self {
        Self {
            store,
            client,
            readiness: Arc::new(ReadinessTable::new()),
            cleanup: Arc::new(CleanupTable::builtin()),
            plugins: PluginRegistry::new(),
        }
    }

    /// Replace the readiness registry.
    #[must_use]
    pub fn with_readiness(mut self, readiness: Arc<dyn ReadinessChecker>) -> Self {
        self.readiness = readiness;
        self
    }

    /// Replace the cleanup registry.
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: Arc<dyn SpecCleanup>) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Replace the plugin registry.
    #[must_use]
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }
}
