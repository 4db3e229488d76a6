// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Plugins: named producers of objects from an opaque spec.
//!
//! A resource may declare `spec.plugin` instead of an object template. The plugin
//! receives the plugin spec (with reference tokens already resolved) and the live
//! state of the resource's direct dependencies, and returns the object to apply.
//!
//! Plugins are registered explicitly at startup in a [`PluginRegistry`].
//!
//! # Example
//!
//! ```rust
//! use conductor::errors::PluginError;
//! use conductor::plugins::{Plugin, PluginContext, PluginDescription, PluginRegistry};
//! use kube::core::GroupVersionKind;
//! use serde_json::{json, Map, Value};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Plugin for Echo {
//!     fn describe(&self) -> PluginDescription {
//!         PluginDescription {
//!             name: "echo".to_string(),
//!             gvk: GroupVersionKind::gvk("", "v1", "ConfigMap"),
//!         }
//!     }
//!
//!     fn process(&self, spec: &Map<String, Value>, _ctx: &PluginContext) -> Result<Value, PluginError> {
//!         Ok(json!({ "data": spec }))
//!     }
//! }
//!
//! let registry = PluginRegistry::new().with(Arc::new(Echo));
//! assert!(registry.get("echo").is_some());
//! ```

use crate::errors::PluginError;
use crate::references::Dependency;
use kube::core::GroupVersionKind;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Static description of a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescription {
    /// Registered name, matched against `spec.plugin.name`
    pub name: String,
    /// Kind of the produced object
    pub gvk: GroupVersionKind,
}

/// What a plugin can see while processing.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    /// Namespace of the Bundle
    pub namespace: String,
    /// Name of the Bundle
    pub bundle: String,
    /// Direct dependencies keyed by resource name
    pub dependencies: BTreeMap<String, Dependency>,
}

/// An object producer.
pub trait Plugin: Send + Sync {
    /// Name and produced kind.
    fn describe(&self) -> PluginDescription;

    /// Build the object. `apiVersion` and `kind` may be omitted; they are filled from
    /// [`Plugin::describe`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Failed`] when the spec cannot be processed.
    fn process(&self, spec: &Map<String, Value>, ctx: &PluginContext) -> Result<Value, PluginError>;
}

/// Name to plugin table.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its described name, replacing any previous one.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.describe().name;
        self.plugins.insert(name, plugin);
    }

    /// Builder form of [`PluginRegistry::register`].
    #[must_use]
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.register(plugin);
        self
    }

    /// Look up a plugin.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a plugin and check that it produced the kind it describes.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`], the plugin's own error, or
    /// [`PluginError::KindMismatch`].
    pub fn process(
        &self,
        name: &str,
        spec: &Map<String, Value>,
        ctx: &PluginContext,
    ) -> Result<Value, PluginError> {
        let plugin = self
            .get(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?;
        let description = plugin.describe();
        let mut object = plugin.process(spec, ctx)?;

        let map = object.as_object_mut().ok_or_else(|| PluginError::Failed {
            plugin: name.to_string(),
            message: "plugin did not return an object".to_string(),
        })?;
        let expected_api_version = description.gvk.api_version();
        let api_version = map
            .entry("apiVersion")
            .or_insert_with(|| Value::String(expected_api_version.clone()))
            .clone();
        let kind = map
            .entry("kind")
            .or_insert_with(|| Value::String(description.gvk.kind.clone()))
            .clone();

        if api_version.as_str() != Some(expected_api_version.as_str())
            || kind.as_str() != Some(description.gvk.kind.as_str())
        {
            return Err(PluginError::KindMismatch {
                plugin: name.to_string(),
                expected: format!("{expected_api_version}/{}", description.gvk.kind),
                actual: format!("{api_version}/{kind}"),
            });
        }
        Ok(object)
    }
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod plugins_tests;
