// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object identity, labels and owner references for managed objects.

use crate::constants::{API_GROUP_VERSION, KIND_BUNDLE};
use crate::crd::{Bundle, ObjectToDelete};
use crate::labels::{
    CONDUCTOR_BUNDLE_LABEL, K8S_MANAGED_BY, K8S_PART_OF, MANAGED_BY_CONDUCTOR, PART_OF_CONDUCTOR,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an object under a Bundle's ownership: group-version-kind plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    /// `group/version`, or `version` for the core group
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Object name
    pub name: String,
}

impl ObjectRef {
    /// Build from a group-version-kind and a name.
    #[must_use]
    pub fn new(gvk: &GroupVersionKind, name: &str) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            name: name.to_string(),
        }
    }

    /// Identity of a live object, if it carries type metadata.
    #[must_use]
    pub fn from_object(obj: &DynamicObject) -> Option<Self> {
        let types = obj.types.as_ref()?;
        Some(Self {
            api_version: types.api_version.clone(),
            kind: types.kind.clone(),
            name: obj.name_any(),
        })
    }

    /// API group, `""` for the core group.
    #[must_use]
    pub fn group(&self) -> &str {
        self.api_version.split_once('/').map_or("", |(group, _)| group)
    }

    /// Version-independent identity: the same object is served under every
    /// version of its kind.
    #[must_use]
    pub fn group_kind_name(&self) -> (&str, &str, &str) {
        (self.group(), &self.kind, &self.name)
    }

    /// Group-version-kind of this reference.
    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        gvk_from_parts(&self.api_version, &self.kind)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.api_version, self.kind, self.name)
    }
}

impl From<ObjectRef> for ObjectToDelete {
    fn from(r: ObjectRef) -> Self {
        Self {
            api_version: r.api_version,
            kind: r.kind,
            name: r.name,
        }
    }
}

/// Split an `apiVersion` into group and version. The core group is `""`.
#[must_use]
pub fn gvk_from_parts(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

/// Group-version-kind of a live object.
#[must_use]
pub fn gvk_of(obj: &DynamicObject) -> Option<GroupVersionKind> {
    obj.types
        .as_ref()
        .map(|t| gvk_from_parts(&t.api_version, &t.kind))
}

/// Group-version-kind declared by an object template, if `apiVersion` and `kind` are strings.
#[must_use]
pub fn gvk_of_template(template: &Value) -> Option<GroupVersionKind> {
    let api_version = template.get("apiVersion")?.as_str()?;
    let kind = template.get("kind")?.as_str()?;
    Some(gvk_from_parts(api_version, kind))
}

/// Labels stamped on every object created for `bundle_name`.
#[must_use]
pub fn managed_labels(bundle_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_CONDUCTOR.into());
    labels.insert(K8S_PART_OF.into(), PART_OF_CONDUCTOR.into());
    labels.insert(CONDUCTOR_BUNDLE_LABEL.into(), bundle_name.into());
    labels
}

/// Controller owner reference pointing at the Bundle.
#[must_use]
pub fn bundle_owner_reference(bundle: &Bundle) -> OwnerReference {
    OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_BUNDLE.to_string(),
        name: bundle.name_any(),
        uid: bundle.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Non-controller owner reference pointing at a dependency's live object.
///
/// Returns `None` when the object has no type metadata or no UID yet.
#[must_use]
pub fn dependency_owner_reference(obj: &DynamicObject) -> Option<OwnerReference> {
    let types = obj.types.as_ref()?;
    Some(OwnerReference {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        name: obj.name_any(),
        uid: obj.metadata.uid.clone()?,
        controller: Some(false),
        block_owner_deletion: Some(true),
    })
}

/// Whether `obj` lists an owner with the given UID.
#[must_use]
pub fn is_owned_by(obj: &DynamicObject, owner_uid: &str) -> bool {
    obj.owner_references().iter().any(|r| r.uid == owner_uid)
}

/// Whether `obj` is controlled by the owner with the given UID.
#[must_use]
pub fn is_controlled_by(obj: &DynamicObject, owner_uid: &str) -> bool {
    obj.owner_references()
        .iter()
        .any(|r| r.uid == owner_uid && r.controller == Some(true))
}

#[cfg(test)]
#[path = "objects_tests.rs"]
mod objects_tests;
