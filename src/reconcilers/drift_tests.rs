// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `drift.rs`

#[cfg(test)]
mod tests {
    use super::super::{compare, normalize};
    use crate::cleanup::CleanupTable;
    use crate::objects::gvk_from_parts;
    use serde_json::{json, Value};

    fn live_config_map(data: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "app",
                "namespace": "team-a",
                "uid": "uid-1",
                "resourceVersion": "7",
                "labels": {"team": "a"},
                "finalizers": ["other.io/keep"]
            },
            "data": data
        })
    }

    #[test]
    fn test_matching_object_returns_live_untouched() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "ConfigMap");
        let desired = json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "app", "labels": {"team": "a"}},
            "data": {"k": "v"}
        });
        let actual = live_config_map(json!({"k": "v"}));

        let result = compare(&cleanup, &gvk, &desired, &actual).unwrap();
        assert!(result.matches);
        assert_eq!(result.merged, actual);
        assert!(result.diff.is_empty());
    }

    #[test]
    fn test_changed_field_produces_merged_update() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "ConfigMap");
        let desired = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "app"}, "data": {"k": "new"}});
        let actual = live_config_map(json!({"k": "old", "stale": "x"}));

        let result = compare(&cleanup, &gvk, &desired, &actual).unwrap();
        assert!(!result.matches);
        assert_eq!(result.merged["data"], json!({"k": "new"}));
        // identity and concurrency fields come from the live object
        assert_eq!(result.merged["metadata"]["resourceVersion"], "7");
        assert_eq!(result.merged["metadata"]["uid"], "uid-1");
        assert!(result.diff.contains(&"~ data.k: \"old\" -> \"new\"".to_string()));
        assert!(result.diff.contains(&"- data.stale: \"x\"".to_string()));
    }

    #[test]
    fn test_compare_is_idempotent_after_update() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "ConfigMap");
        let desired = json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "app", "labels": {"owner": "bundle"}},
            "data": {"k": "new"}
        });
        let actual = live_config_map(json!({"k": "old"}));

        let first = compare(&cleanup, &gvk, &desired, &actual).unwrap();
        assert!(!first.matches);

        let second = compare(&cleanup, &gvk, &desired, &first.merged).unwrap();
        assert!(second.matches);
        assert_eq!(second.merged, first.merged);
    }

    #[test]
    fn test_empty_and_absent_collections_are_equivalent() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "ConfigMap");
        let desired = json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "app", "annotations": {}},
            "data": {"k": "v"},
            "binaryData": {},
            "immutable": null
        });
        let actual = live_config_map(json!({"k": "v"}));

        assert!(compare(&cleanup, &gvk, &desired, &actual).unwrap().matches);
    }

    #[test]
    fn test_status_is_ignored() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("example.com/v1", "Widget");
        let desired = json!({"apiVersion": "example.com/v1", "kind": "Widget", "metadata": {"name": "w"}, "spec": {"size": 1}});
        let mut actual = desired.clone();
        actual["status"] = json!({"phase": "Running"});

        let result = compare(&cleanup, &gvk, &desired, &actual).unwrap();
        assert!(result.matches);
        assert_eq!(result.merged["status"]["phase"], "Running");
    }

    #[test]
    fn test_metadata_merge_keeps_foreign_labels_and_finalizers() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "ConfigMap");
        let desired = json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {
                "name": "app",
                "labels": {"owner": "bundle"},
                "finalizers": ["mine.io/f"],
                "ownerReferences": [{"apiVersion": "v1", "kind": "X", "name": "x", "uid": "u"}]
            },
            "data": {"k": "v"}
        });
        let actual = live_config_map(json!({"k": "v"}));

        let result = compare(&cleanup, &gvk, &desired, &actual).unwrap();
        assert!(!result.matches);
        let meta = &result.merged["metadata"];
        assert_eq!(meta["labels"], json!({"team": "a", "owner": "bundle"}));
        assert_eq!(meta["finalizers"], json!(["other.io/keep", "mine.io/f"]));
        assert_eq!(meta["ownerReferences"][0]["uid"], "u");
    }

    #[test]
    fn test_service_allocated_fields_are_not_drift() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "Service");
        let desired = json!({
            "apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"},
            "spec": {"ports": [{"port": 80}], "selector": {"app": "web"}}
        });
        let actual = json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "web", "uid": "u", "resourceVersion": "3"},
            "spec": {
                "type": "ClusterIP",
                "clusterIP": "10.0.0.1",
                "clusterIPs": ["10.0.0.1"],
                "sessionAffinity": "None",
                "ports": [{"port": 80, "protocol": "TCP", "targetPort": 80}],
                "selector": {"app": "web"}
            },
            "status": {"loadBalancer": {}}
        });

        assert!(compare(&cleanup, &gvk, &desired, &actual).unwrap().matches);
    }

    #[test]
    fn test_secret_diff_is_redacted() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "Secret");
        let desired = json!({
            "apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"},
            "stringData": {"password": "hunter3"}
        });
        let actual = json!({
            "apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"},
            "type": "Opaque",
            "data": {"password": "aHVudGVyMg=="}
        });

        let result = compare(&cleanup, &gvk, &desired, &actual).unwrap();
        assert!(!result.matches);
        assert!(!result.diff.is_empty());
        for line in &result.diff {
            assert!(!line.contains("aHVudGVy"), "leaked payload: {line}");
            assert!(!line.contains("hunter"), "leaked payload: {line}");
        }
        assert!(result.diff.iter().any(|l| l.contains("<redacted>")));
    }

    #[test]
    fn test_secret_string_data_matches_folded_data() {
        let cleanup = CleanupTable::builtin();
        let gvk = gvk_from_parts("v1", "Secret");
        let desired = json!({
            "apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"},
            "stringData": {"password": "hunter2"}
        });
        let actual = json!({
            "apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"},
            "type": "Opaque",
            "data": {"password": "aHVudGVyMg=="}
        });

        assert!(compare(&cleanup, &gvk, &desired, &actual).unwrap().matches);
    }

    #[test]
    fn test_normalize_keeps_array_positions() {
        let mut value = json!({"a": [{}, {"b": null}, 1], "c": {"d": []}});
        normalize(&mut value);
        assert_eq!(value, json!({"a": [{}, {}, 1]}));
    }
}
