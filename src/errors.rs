// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for Bundle reconciliation.
//!
//! This module provides the structured error taxonomy used across the controller:
//! - Structural errors: a malformed Bundle ([`GraphError`], [`ValidationError`])
//! - Reference resolution errors ([`ReferenceError`])
//! - Cluster API outcomes ([`ClientError`])
//! - Errors reported by injected registries ([`ReadinessError`], [`CleanupError`], [`PluginError`])
//! - Pass-level outcomes ([`BundleError`])
//!
//! Every error that reaches a Bundle is reflected as a status condition; the
//! retriable/terminal split decides whether the work queue backs off and retries.

use thiserror::Error;

/// Errors produced while building or sorting the dependency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A vertex was added twice.
    #[error("duplicate vertex '{0}'")]
    DuplicateVertex(String),

    /// An edge names a vertex that was never added.
    #[error("unknown vertex '{0}'")]
    UnknownVertex(String),

    /// The graph contains a cycle.
    ///
    /// `path` starts and ends with the same vertex, e.g. `[a, b, a]`.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Vertices forming the cycle, first vertex repeated at the end
        path: Vec<String>,
    },
}

/// Errors produced while parsing or resolving `{{name[:modifier]#path[#default]}}` tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// Malformed token: unterminated, empty name or empty path.
    #[error("invalid reference syntax in '{token}': {reason}")]
    InvalidSyntax {
        /// Offending token text
        token: String,
        /// What is wrong with it
        reason: String,
    },

    /// Token names a resource that is not in `dependsOn`.
    #[error("resource '{resource}' references '{target}' which is not listed in dependsOn")]
    UndeclaredReference {
        /// Resource whose template contains the token
        resource: String,
        /// Referenced resource
        target: String,
    },

    /// Token has no path.
    #[error("reference '{token}' must select a field; whole-object references are not allowed")]
    WholeObjectNotAllowed {
        /// Offending token text
        token: String,
    },

    /// Token references the resource it appears in.
    #[error("reference '{token}' points at its own resource")]
    SelfReferenceNotAllowed {
        /// Offending token text
        token: String,
    },

    /// The dependency does not expose the requested facet.
    #[error("resource '{target}' does not support modifier '{modifier}'")]
    UnsupportedModifier {
        /// Referenced resource
        target: String,
        /// Requested modifier
        modifier: String,
    },

    /// A byte payload is not valid UTF-8.
    #[error("value for '{token}' is not valid UTF-8")]
    NonUtf8Payload {
        /// Offending token text
        token: String,
    },

    /// A byte payload is not valid base64.
    #[error("value for '{token}' is not valid base64: {reason}")]
    InvalidBase64Payload {
        /// Offending token text
        token: String,
        /// Decoder message
        reason: String,
    },

    /// Path matched nothing.
    #[error("path in '{token}' matched no value")]
    PathNotFound {
        /// Offending token text
        token: String,
    },

    /// Path matched more than one value.
    #[error("path in '{token}' matched {matches} values, expected exactly one")]
    AmbiguousPath {
        /// Offending token text
        token: String,
        /// Number of matches
        matches: usize,
    },

    /// Path could not be parsed by the JSONPath engine.
    #[error("invalid path in '{token}': {reason}")]
    InvalidPath {
        /// Offending token text
        token: String,
        /// Parser message
        reason: String,
    },

    /// Examples mode needs a default and the token has none.
    #[error("reference '{token}' has no default value to render an example")]
    MissingExample {
        /// Offending token text
        token: String,
    },

    /// An object, array or null cannot be spliced into a longer string.
    #[error("reference '{token}' resolved to a non-scalar value and cannot be embedded in a string")]
    NonScalarInterpolation {
        /// Offending token text
        token: String,
    },

    /// The dependency has not been processed yet in this pass.
    #[error("dependency '{target}' has no live object yet")]
    DependencyNotProcessed {
        /// Referenced resource
        target: String,
    },
}

/// Outcome classes of cluster API calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Create found an existing object with the same name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency check failed (stale `resourceVersion` or UID precondition).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Whether retrying may succeed (429, 5xx, transport errors)
        retriable: bool,
    },
}

impl ClientError {
    /// Whether the failed call may succeed if retried.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Other { retriable: true, .. })
    }

    /// Whether this is a benign race with another writer.
    #[must_use]
    pub fn is_race(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::Conflict(_))
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        if let kube::Error::Api(response) = &err {
            match response.code {
                404 => return Self::NotFound(response.message.clone()),
                409 if response.reason == "AlreadyExists" => {
                    return Self::AlreadyExists(response.message.clone())
                }
                409 => return Self::Conflict(response.message.clone()),
                _ => {}
            }
        }
        let retriable = crate::reconcilers::retry::is_retryable_error(&err);
        Self::Other {
            message: err.to_string(),
            retriable,
        }
    }
}

/// Error reported by a readiness predicate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ReadinessError {
    /// Human-readable description
    pub message: String,
    /// Whether a later check may succeed
    pub retriable: bool,
}

/// Error reported by a kind-specific cleanup hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cleanup failed for {kind}: {message}")]
pub struct CleanupError {
    /// Kind being cleaned up
    pub kind: String,
    /// Human-readable description
    pub message: String,
}

/// Errors reported by the plugin registry or a plugin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// No plugin registered under that name.
    #[error("plugin '{0}' is not registered")]
    UnknownPlugin(String),

    /// The plugin rejected its input.
    #[error("plugin '{plugin}' failed: {message}")]
    Failed {
        /// Plugin name
        plugin: String,
        /// Plugin message
        message: String,
    },

    /// The plugin produced an object of a different kind than it describes.
    #[error("plugin '{plugin}' produced {actual}, expected {expected}")]
    KindMismatch {
        /// Plugin name
        plugin: String,
        /// Described `apiVersion/kind`
        expected: String,
        /// Produced `apiVersion/kind`
        actual: String,
    },
}

/// Structural problems with a Bundle spec. Never retriable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two resources share a name.
    #[error("duplicate resource name '{0}'")]
    DuplicateResource(String),

    /// Dangling edge or dependency cycle.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A resource depends on itself.
    #[error("resource '{0}' depends on itself")]
    SelfDependency(String),

    /// Both or neither of `object` and `plugin` are set.
    #[error("resource '{0}' must set exactly one of spec.object or spec.plugin")]
    ObjectPluginExclusivity(String),

    /// `apiVersion`, `kind` or `metadata.name` is missing or not a string.
    #[error("resource '{resource}' is missing literal field '{field}'")]
    MissingIdentity {
        /// Resource name
        resource: String,
        /// Field path
        field: String,
    },

    /// `apiVersion`, `kind` or `metadata.name` contains a reference token.
    #[error("resource '{resource}' must not use references in '{field}'")]
    TemplatedIdentity {
        /// Resource name
        resource: String,
        /// Field path
        field: String,
    },

    /// A reference token is malformed or points somewhere it may not.
    #[error("resource '{resource}': {source}")]
    Reference {
        /// Resource name
        resource: String,
        /// Underlying error
        #[source]
        source: ReferenceError,
    },

    /// `plugin.name` is not registered.
    #[error("resource '{resource}' uses unknown plugin '{plugin}'")]
    UnknownPlugin {
        /// Resource name
        resource: String,
        /// Plugin name
        plugin: String,
    },

    /// A fully-defaulted template does not render to a well-formed object.
    #[error("resource '{resource}' example does not render: {message}")]
    ExampleRender {
        /// Resource name
        resource: String,
        /// What went wrong
        message: String,
    },
}

/// Failure of a whole reconciliation pass.
#[derive(Error, Debug)]
pub enum BundleError {
    /// The Bundle spec is structurally invalid.
    #[error("invalid bundle: {0}")]
    Invalid(#[from] ValidationError),

    /// A Bundle-level API call failed (fetch, finalizer update, status write, GC).
    #[error("cluster API error: {0}")]
    Client(#[from] ClientError),

    /// One or more resources ended in `Error`.
    #[error("{} resource(s) failed: {}", failed.len(), failed.join(", "))]
    ResourcesFailed {
        /// Names of the failed resources
        failed: Vec<String>,
        /// Whether at least one failure is retriable
        retriable: bool,
    },

    /// Status could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BundleError {
    /// Whether the work queue should retry the key with backoff.
    ///
    /// Structural errors and races are not retried; races rely on the next
    /// watch event instead.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Invalid(_) | Self::Serialization(_) => false,
            Self::Client(e) => e.is_retriable(),
            Self::ResourcesFailed { retriable, .. } => *retriable,
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
