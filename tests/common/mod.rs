// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use anyhow::Result;
use conductor::context::Context;
use conductor::kube_store::KubeCluster;
use conductor::reconcilers::{reconcile_bundle, PassSummary};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::client::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => {
            println!("✓ Successfully connected to Kubernetes cluster");
            Some(client)
        }
        Err(e) => {
            eprintln!("⊘ Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Context backed by the live cluster
pub fn cluster_context(client: Client) -> Context {
    let cluster = Arc::new(KubeCluster::new(client));
    Context::new(cluster.clone(), cluster)
}

/// Create a test namespace
pub async fn create_test_namespace(client: &Client, name: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let mut labels = BTreeMap::new();
    labels.insert("test".to_string(), "integration".to_string());
    labels.insert("managed-by".to_string(), "conductor-test".to_string());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("✓ Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("  Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => println!("✓ Deleted test namespace: {name}"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("  Test namespace already deleted: {name}");
        }
        Err(e) => eprintln!("  Failed to delete test namespace {name}: {e}"),
    }
}

/// Run passes until the Bundle is ready or `attempts` passes have run
pub async fn reconcile_until_ready(
    ctx: &Context,
    namespace: &str,
    name: &str,
    attempts: usize,
) -> Result<PassSummary> {
    let mut last = None;
    for attempt in 1..=attempts {
        match reconcile_bundle(ctx, namespace, name).await {
            Ok(summary) if summary.ready => return Ok(summary),
            Ok(summary) => {
                println!("  pass {attempt}: not ready yet");
                last = Some(Ok(summary));
            }
            Err(e) => {
                println!("  pass {attempt}: {e}");
                last = Some(Err(e));
            }
        }
        sleep(Duration::from_secs(1)).await;
    }
    match last {
        Some(Ok(summary)) => Ok(summary),
        Some(Err(e)) => Err(e.into()),
        None => anyhow::bail!("no pass ran"),
    }
}
