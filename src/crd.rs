// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for declarative resource bundles.
//!
//! A [`Bundle`] is a named, ordered collection of resource specifications with
//! explicit dependency edges. The controller creates and updates the described
//! objects in dependency order, waits for each to become ready before unblocking
//! its dependents, repairs drift, and reports per-resource status.
//!
//! # Example: Declaring a Bundle
//!
//! ```rust,no_run
//! use conductor::crd::{BundleSpec, Resource, ResourceSpec};
//! use serde_json::json;
//!
//! let spec = BundleSpec {
//!     resources: vec![
//!         Resource {
//!             name: "db-secret".to_string(),
//!             depends_on: vec![],
//!             spec: ResourceSpec::object(json!({
//!                 "apiVersion": "v1",
//!                 "kind": "Secret",
//!                 "metadata": { "name": "db" },
//!                 "stringData": { "password": "hunter2" }
//!             })),
//!         },
//!         Resource {
//!             name: "app-config".to_string(),
//!             depends_on: vec!["db-secret".to_string()],
//!             spec: ResourceSpec::object(json!({
//!                 "apiVersion": "v1",
//!                 "kind": "ConfigMap",
//!                 "metadata": { "name": "app" },
//!                 "data": { "password": "{{db-secret#data.password}}" }
//!             })),
//!         },
//!     ],
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema for free-form embedded objects: any JSON object, kept verbatim by the API server.
fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: InProgress, Ready, Error or Blocked.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// `Bundle` declares a set of interdependent Kubernetes objects.
///
/// Resources are reconciled in dependency order. A resource may read values from
/// the resources it depends on through reference tokens of the form
/// `{{name[:modifier]#path[#default]}}` embedded in its template.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: conductor.firestoned.io/v1alpha1
/// kind: Bundle
/// metadata:
///   name: app
///   namespace: team-a
/// spec:
///   resources:
///     - name: db-secret
///       spec:
///         object:
///           apiVersion: v1
///           kind: Secret
///           metadata: { name: db }
///           stringData: { password: hunter2 }
///     - name: app-config
///       dependsOn: [db-secret]
///       spec:
///         object:
///           apiVersion: v1
///           kind: ConfigMap
///           metadata: { name: app }
///           data:
///             password: "{{db-secret#data.password}}"
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "conductor.firestoned.io",
    version = "v1alpha1",
    kind = "Bundle",
    namespaced,
    shortname = "bdl",
    doc = "Bundle is a named set of Kubernetes objects with explicit dependencies. The controller creates them in dependency order, waits for readiness before unblocking dependents, and repairs drift.",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.conditions[?(@.type=='Error')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "BundleStatus")]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    /// Resources managed by this Bundle. Names must be unique within the Bundle.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// One desired object inside a [`Bundle`].
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Name of the resource, unique within the Bundle.
    ///
    /// This is the name used by `dependsOn` and by reference tokens, not the
    /// name of the produced Kubernetes object.
    pub name: String,

    /// Resources that must be Ready before this one is processed.
    ///
    /// A resource may only reference (via tokens) resources listed here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// What to produce: an object template or a plugin invocation.
    pub spec: ResourceSpec,
}

/// Exactly one of `object` or `plugin` must be set.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Object template. `apiVersion`, `kind` and `metadata.name` must be literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub object: Option<Value>,

    /// Plugin invocation producing the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginSpec>,
}

impl ResourceSpec {
    /// Build a spec from an object template.
    #[must_use]
    pub fn object(template: Value) -> Self {
        Self {
            object: Some(template),
            plugin: None,
        }
    }

    /// Build a spec from a plugin invocation.
    #[must_use]
    pub fn plugin(plugin: PluginSpec) -> Self {
        Self {
            object: None,
            plugin: Some(plugin),
        }
    }
}

/// Invocation of a registered plugin.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginSpec {
    /// Registered plugin name.
    pub name: String,

    /// Name of the object the plugin produces.
    pub object_name: String,

    /// Opaque plugin input. Reference tokens are resolved before the plugin runs.
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub spec: Map<String, Value>,
}

/// `Bundle` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatus {
    /// Bundle-level conditions: `InProgress`, `Ready`, `Error`.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Per-resource conditions, in topological order.
    /// Always serialized so a status merge patch can empty it.
    #[serde(default)]
    pub resource_statuses: Vec<ResourceStatus>,

    /// Owned objects no longer declared, deleted once every resource is Ready.
    #[serde(default)]
    pub objects_to_delete: Vec<ObjectToDelete>,

    /// Generation of the spec the status was computed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Conditions of a single resource.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Resource name within the Bundle.
    pub name: String,

    /// `Blocked`, `InProgress`, `Ready`, `Error`.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Identity of an owned object pending deletion.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ObjectToDelete {
    /// API version of the object, e.g. `apps/v1`.
    pub api_version: String,

    /// Kind of the object.
    pub kind: String,

    /// Name of the object.
    pub name: String,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
