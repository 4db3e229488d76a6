// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Result};
use clap::Parser;
use conductor::{
    constants::{
        API_GROUP_VERSION, DEFAULT_RECONCILE_WORKERS, KIND_BUNDLE, QUEUE_MAX_RETRIES,
        RESYNC_PENDING_SECS, RESYNC_READY_SECS, TOKIO_WORKER_THREADS,
    },
    context::Context,
    crd::Bundle,
    errors::BundleError,
    kube_store::KubeCluster,
    labels::{K8S_MANAGED_BY, MANAGED_BY_CONDUCTOR},
    metrics::{record_pass, record_requeue},
    reconcilers::{reconcile_bundle, PassSummary},
    workqueue::WorkQueue,
};
use futures::{stream, StreamExt};
use kube::{
    api::DynamicObject,
    runtime::{watcher, watcher::Event, WatchStreamExt},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Declarative Bundle controller
#[derive(Debug, Clone, Parser)]
#[command(name = "conductor", version, about)]
struct Config {
    /// Number of Bundles reconciled in parallel
    #[arg(long, env = "CONDUCTOR_WORKERS", default_value_t = DEFAULT_RECONCILE_WORKERS)]
    workers: usize,

    /// Watch a single namespace instead of the whole cluster
    #[arg(long, env = "CONDUCTOR_NAMESPACE")]
    namespace: Option<String>,

    /// Log output format: `text` or `json`
    #[arg(long, env = "RUST_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Resync interval for Bundles that are Ready
    #[arg(long, env = "CONDUCTOR_RESYNC_READY_SECS", default_value_t = RESYNC_READY_SECS)]
    resync_ready_secs: u64,

    /// Resync interval for Bundles that are still converging
    #[arg(long, env = "CONDUCTOR_RESYNC_PENDING_SECS", default_value_t = RESYNC_PENDING_SECS)]
    resync_pending_secs: u64,

    /// Consecutive retriable failures before a Bundle key is dropped
    #[arg(long, env = "CONDUCTOR_MAX_RETRIES", default_value_t = QUEUE_MAX_RETRIES)]
    max_retries: u32,
}

/// Work queue key: one Bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BundleKey {
    namespace: String,
    name: String,
}

impl BundleKey {
    fn of(bundle: &Bundle) -> Self {
        Self {
            namespace: bundle.namespace().unwrap_or_default(),
            name: bundle.name_any(),
        }
    }

    /// The Bundle controlling a managed object, from its controller owner reference.
    fn controller_of(obj: &DynamicObject) -> Option<Self> {
        let owner = obj.owner_references().iter().find(|o| {
            o.controller == Some(true) && o.kind == KIND_BUNDLE && o.api_version == API_GROUP_VERSION
        })?;
        Some(Self {
            namespace: obj.namespace()?,
            name: owner.name.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Resync {
    ready: Duration,
    pending: Duration,
}

impl From<&Config> for Resync {
    fn from(config: &Config) -> Self {
        Self {
            ready: Duration::from_secs(config.resync_ready_secs),
            pending: Duration::from_secs(config.resync_pending_secs),
        }
    }
}

fn main() -> Result<()> {
    let config = Config::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("conductor-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

/// Initialize logging.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level.
/// Example: `2025-11-29T23:45:00.123456Z main.rs:49 INFO Starting Conductor`
fn init_tracing(log_format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: Config) -> Result<()> {
    init_tracing(&config.log_format);

    info!(
        workers = config.workers,
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        "Starting Conductor Bundle controller"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let cluster = Arc::new(KubeCluster::new(client.clone()));
    let ctx = Arc::new(Context::new(cluster.clone(), cluster.clone()));
    let queue: WorkQueue<BundleKey> = WorkQueue::new(config.max_retries);
    let shutdown = CancellationToken::new();
    let resync = Resync::from(&config);

    let workers: Vec<_> = (0..config.workers.max(1))
        .map(|id| {
            tokio::spawn(run_worker(
                id,
                ctx.clone(),
                queue.clone(),
                shutdown.clone(),
                resync,
            ))
        })
        .collect();

    let outcome = tokio::select! {
        result = watch_bundles(client.clone(), config.namespace.clone(), queue.clone()) => {
            error!("CRITICAL: Bundle watcher exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("Bundle watcher exited unexpectedly without error")))
        }
        result = watch_managed_objects(&cluster, client, config.namespace.clone(), queue.clone()) => {
            error!("CRITICAL: Managed object watcher exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("Managed object watcher exited unexpectedly without error")))
        }
        () = wait_for_shutdown() => Ok(()),
    };

    info!("Stopping workers");
    shutdown.cancel();
    queue.shut_down();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Worker task failed");
        }
    }

    info!("Conductor stopped");
    outcome
}

/// Turn Bundle watch events into work queue keys.
async fn watch_bundles(
    client: Client,
    namespace: Option<String>,
    queue: WorkQueue<BundleKey>,
) -> Result<()> {
    let api: Api<Bundle> = match &namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    info!("Starting Bundle watcher");
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    let mut stream = std::pin::pin!(stream);

    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Apply(bundle) | Event::InitApply(bundle) | Event::Delete(bundle)) => {
                let key = BundleKey::of(&bundle);
                debug!(bundle = %key.name, namespace = %key.namespace, "Bundle changed");
                queue.add(key);
            }
            Ok(Event::Init | Event::InitDone) => {}
            Err(e) => warn!(error = %e, "Bundle watch error"),
        }
    }

    Ok(())
}

/// Turn changes to managed objects into work queue keys for their Bundles.
///
/// Watches every namespaced kind the cluster serves at startup, filtered by the
/// managed-by label. Kinds installed later are covered by the periodic resync.
async fn watch_managed_objects(
    cluster: &KubeCluster,
    client: Client,
    namespace: Option<String>,
    queue: WorkQueue<BundleKey>,
) -> Result<()> {
    let kinds = cluster.watchable_kinds().await?;
    if kinds.is_empty() {
        warn!("No watchable kinds discovered, relying on resync");
        std::future::pending::<()>().await;
    }
    info!(kinds = kinds.len(), "Starting managed object watchers");

    let config = watcher::Config::default().labels(&format!("{K8S_MANAGED_BY}={MANAGED_BY_CONDUCTOR}"));
    let streams = kinds.iter().map(|ar| {
        let api: Api<DynamicObject> = match &namespace {
            Some(ns) => Api::namespaced_with(client.clone(), ns, ar),
            None => Api::all_with(client.clone(), ar),
        };
        watcher(api, config.clone()).default_backoff().boxed()
    });
    let mut events = stream::select_all(streams);

    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Apply(obj) | Event::InitApply(obj) | Event::Delete(obj)) => {
                if let Some(key) = BundleKey::controller_of(&obj) {
                    debug!(
                        bundle = %key.name,
                        namespace = %key.namespace,
                        object = %obj.name_any(),
                        "Managed object changed"
                    );
                    queue.add(key);
                }
            }
            Ok(Event::Init | Event::InitDone) => {}
            Err(e) => warn!(error = %e, "Managed object watch error"),
        }
    }

    Ok(())
}

/// Pull keys and run passes until the queue shuts down.
async fn run_worker(
    id: usize,
    ctx: Arc<Context>,
    queue: WorkQueue<BundleKey>,
    shutdown: CancellationToken,
    resync: Resync,
) {
    debug!(worker = id, "Worker started");

    while let Some(key) = queue.get().await {
        let started = Instant::now();
        let result = tokio::select! {
            () = shutdown.cancelled() => None,
            result = reconcile_bundle(&ctx, &key.namespace, &key.name) => Some(result),
        };

        let Some(result) = result else {
            info!(bundle = %key.name, namespace = %key.namespace, "Pass cancelled");
            record_pass("cancelled", started.elapsed());
            queue.done(&key);
            break;
        };

        handle_outcome(&queue, &key, result, started.elapsed(), resync);
        queue.done(&key);
    }

    debug!(worker = id, "Worker stopped");
}

/// Decide how `key` is requeued after a pass.
fn handle_outcome(
    queue: &WorkQueue<BundleKey>,
    key: &BundleKey,
    result: Result<PassSummary, BundleError>,
    elapsed: Duration,
    resync: Resync,
) {
    match result {
        Ok(summary) => {
            record_pass("success", elapsed);
            queue.forget(key);
            if summary.requeue {
                let delay = if summary.ready {
                    resync.ready
                } else {
                    resync.pending
                };
                record_requeue("resync");
                queue.add_after(key.clone(), delay);
            }
        }
        Err(e) if e.is_retriable() => {
            record_pass("error", elapsed);
            warn!(
                bundle = %key.name,
                namespace = %key.namespace,
                attempt = queue.num_requeues(key) + 1,
                error = %e,
                "Bundle pass failed, retrying with backoff"
            );
            if !queue.add_rate_limited(key.clone()) {
                error!(
                    bundle = %key.name,
                    namespace = %key.namespace,
                    "Giving up on Bundle after repeated failures; see its status"
                );
            }
        }
        Err(e) => {
            let outcome = if matches!(e, BundleError::Invalid(_)) {
                "invalid"
            } else {
                "error"
            };
            record_pass(outcome, elapsed);
            queue.forget(key);
            warn!(
                bundle = %key.name,
                namespace = %key.namespace,
                error = %e,
                "Bundle pass failed, not retrying"
            );
            // Healthy resources of a partially failed Bundle still need readiness checks.
            if matches!(e, BundleError::ResourcesFailed { .. }) {
                record_requeue("resync");
                queue.add_after(key.clone(), resync.pending);
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, initiating graceful shutdown"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
