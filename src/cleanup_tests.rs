// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cleanup.rs`

#[cfg(test)]
mod tests {
    use crate::cleanup::*;
    use crate::objects::gvk_from_parts;
    use serde_json::json;

    #[test]
    fn test_service_copies_allocated_fields() {
        let desired = json!({
            "apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"},
            "spec": {"type": "NodePort", "ports": [{"port": 80}], "selector": {"app": "web"}}
        });
        let actual = json!({
            "apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"},
            "spec": {
                "type": "NodePort",
                "clusterIP": "10.0.0.9",
                "clusterIPs": ["10.0.0.9"],
                "sessionAffinity": "None",
                "ports": [{"port": 80, "protocol": "TCP", "targetPort": 80, "nodePort": 31000}],
                "selector": {"app": "web"}
            }
        });

        let out = service_cleanup(&desired, &actual).unwrap();
        assert_eq!(out["spec"]["clusterIP"], "10.0.0.9");
        assert_eq!(out["spec"]["clusterIPs"], json!(["10.0.0.9"]));
        assert_eq!(out["spec"]["sessionAffinity"], "None");
        assert_eq!(
            out["spec"]["ports"],
            json!([{"port": 80, "protocol": "TCP", "targetPort": 80, "nodePort": 31000}])
        );
        assert_eq!(out["spec"]["selector"], json!({"app": "web"}));
    }

    #[test]
    fn test_service_keeps_explicit_values() {
        let desired = json!({"spec": {"type": "LoadBalancer", "ports": [{"port": 443, "nodePort": 30443}]}});
        let actual = json!({"spec": {"type": "ClusterIP", "ports": [{"port": 443, "protocol": "TCP", "nodePort": 31999}]}});

        let out = service_cleanup(&desired, &actual).unwrap();
        assert_eq!(out["spec"]["type"], "LoadBalancer");
        assert_eq!(out["spec"]["ports"][0]["nodePort"], 30443);
        assert_eq!(out["spec"]["ports"][0]["protocol"], "TCP");
    }

    #[test]
    fn test_service_port_match_respects_protocol() {
        let desired = json!({"spec": {"ports": [{"port": 53, "protocol": "UDP"}]}});
        let actual = json!({"spec": {"ports": [{"port": 53, "protocol": "TCP", "nodePort": 30053}]}});

        let out = service_cleanup(&desired, &actual).unwrap();
        assert!(out["spec"]["ports"][0].get("nodePort").is_none());
    }

    #[test]
    fn test_service_without_live_spec_is_unchanged() {
        let desired = json!({"spec": {"ports": [{"port": 80}]}});
        assert_eq!(service_cleanup(&desired, &json!({})).unwrap(), desired);
    }

    #[test]
    fn test_secret_folds_string_data() {
        let desired = json!({
            "apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"},
            "data": {"user": "YWRtaW4="},
            "stringData": {"password": "hunter2"}
        });
        let actual = json!({"type": "Opaque"});

        let out = secret_cleanup(&desired, &actual).unwrap();
        assert!(out.get("stringData").is_none());
        assert_eq!(out["data"], json!({"user": "YWRtaW4=", "password": "aHVudGVyMg=="}));
        assert_eq!(out["type"], "Opaque");
    }

    #[test]
    fn test_secret_rejects_non_string_data() {
        let desired = json!({"stringData": {"port": 5432}});
        let err = secret_cleanup(&desired, &json!({})).unwrap_err();
        assert_eq!(err.kind, "Secret");
    }

    #[test]
    fn test_table_dispatches_by_kind() {
        let table = CleanupTable::builtin();
        let desired = json!({"stringData": {"a": "b"}});

        let secret = table
            .cleanup(&gvk_from_parts("v1", "Secret"), &desired, &json!({}))
            .unwrap();
        assert_eq!(secret["data"]["a"], "Yg==");

        let config_map = table
            .cleanup(&gvk_from_parts("v1", "ConfigMap"), &desired, &json!({}))
            .unwrap();
        assert_eq!(config_map, desired);
    }
}
