// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Structural validation of a Bundle spec.
//!
//! Runs before any resource is touched. A failure here aborts the pass and is
//! never retried: the Bundle needs a spec change.

use crate::crd::{Bundle, Resource};
use crate::errors::{GraphError, ValidationError};
use crate::graph::DependencyGraph;
use crate::plugins::PluginRegistry;
use crate::references::{check_references, contains_reference, Resolver};
use kube::api::DynamicObject;
use serde_json::Value;

/// Validate `bundle` and return its resource names in processing order.
///
/// # Errors
///
/// Returns the first structural problem found.
pub fn validate(bundle: &Bundle, plugins: &PluginRegistry) -> Result<Vec<String>, ValidationError> {
    let order = processing_order(&bundle.spec.resources)?;
    for resource in &bundle.spec.resources {
        validate_resource(resource, plugins)?;
    }
    Ok(order)
}

/// Build the dependency graph and sort it.
///
/// # Errors
///
/// Duplicate names, self-dependencies, unknown `dependsOn` targets and cycles.
pub fn processing_order(resources: &[Resource]) -> Result<Vec<String>, ValidationError> {
    let mut graph = DependencyGraph::new();
    for resource in resources {
        graph.add_vertex(&resource.name).map_err(|e| match e {
            GraphError::DuplicateVertex(name) => ValidationError::DuplicateResource(name),
            other => ValidationError::Graph(other),
        })?;
    }
    for resource in resources {
        for dep in &resource.depends_on {
            if dep == &resource.name {
                return Err(ValidationError::SelfDependency(resource.name.clone()));
            }
            graph.add_edge(&resource.name, dep)?;
        }
    }
    Ok(graph.topological_sort()?)
}

fn validate_resource(resource: &Resource, plugins: &PluginRegistry) -> Result<(), ValidationError> {
    let name = &resource.name;
    match (&resource.spec.object, &resource.spec.plugin) {
        (Some(template), None) => {
            check_identity(name, template)?;
            let references = check_references(name, &resource.depends_on, template)
                .map_err(|source| ValidationError::Reference {
                    resource: name.clone(),
                    source,
                })?;
            if references.iter().all(|r| r.default.is_some()) {
                render_example(resource, template)?;
            }
        }
        (None, Some(plugin)) => {
            if plugin.object_name.is_empty() {
                return Err(ValidationError::MissingIdentity {
                    resource: name.clone(),
                    field: "plugin.objectName".to_string(),
                });
            }
            if contains_reference(&plugin.object_name) {
                return Err(ValidationError::TemplatedIdentity {
                    resource: name.clone(),
                    field: "plugin.objectName".to_string(),
                });
            }
            if plugins.get(&plugin.name).is_none() {
                return Err(ValidationError::UnknownPlugin {
                    resource: name.clone(),
                    plugin: plugin.name.clone(),
                });
            }
            let spec = Value::Object(plugin.spec.clone());
            let references = check_references(name, &resource.depends_on, &spec)
                .map_err(|source| ValidationError::Reference {
                    resource: name.clone(),
                    source,
                })?;
            if references.iter().all(|r| r.default.is_some()) {
                let mut resolver = Resolver::examples(name, &resource.depends_on);
                let rendered = resolver.resolve(&spec).map_err(|e| ValidationError::ExampleRender {
                    resource: name.clone(),
                    message: e.to_string(),
                })?;
                if !rendered.is_object() {
                    return Err(ValidationError::ExampleRender {
                        resource: name.clone(),
                        message: "plugin spec did not render to a map".to_string(),
                    });
                }
            }
        }
        _ => return Err(ValidationError::ObjectPluginExclusivity(name.clone())),
    }
    Ok(())
}

fn check_identity(resource: &str, template: &Value) -> Result<(), ValidationError> {
    for (field, pointer) in [
        ("apiVersion", "/apiVersion"),
        ("kind", "/kind"),
        ("metadata.name", "/metadata/name"),
    ] {
        match template.pointer(pointer).and_then(Value::as_str) {
            Some(s) if contains_reference(s) => {
                return Err(ValidationError::TemplatedIdentity {
                    resource: resource.to_string(),
                    field: field.to_string(),
                })
            }
            Some(s) if !s.is_empty() => {}
            _ => {
                return Err(ValidationError::MissingIdentity {
                    resource: resource.to_string(),
                    field: field.to_string(),
                })
            }
        }
    }
    Ok(())
}

fn render_example(resource: &Resource, template: &Value) -> Result<(), ValidationError> {
    let mut resolver = Resolver::examples(&resource.name, &resource.depends_on);
    let rendered = resolver
        .resolve(template)
        .map_err(|e| ValidationError::ExampleRender {
            resource: resource.name.clone(),
            message: e.to_string(),
        })?;
    serde_json::from_value::<DynamicObject>(rendered).map_err(|e| ValidationError::ExampleRender {
        resource: resource.name.clone(),
        message: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
