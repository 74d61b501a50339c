mod local;

use std::{sync::Arc, time::Duration};

use rill_cluster::{ControlApi, LocalCluster, NodeService};
use rill_core::{
    InstanceRegistry, ManagedInstance, ManagerConfig, SourceRouter, StaticSettings, system,
};
use rill_model::NodeId;
use rill_observe::{LoggerConfig, logger_init};
use rill_prometheus::{PrometheusMetrics, TextEncoder};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::local::{LogSink, SystemInfoBuilder};

const INSTANCE: &str = "local-agent";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    logger_init(&LoggerConfig::from_env()?)?;
    system::init_uptime();
    info!(node = %system::node_id(), os = %system::os_info(), "agent starting");

    // 2) Metrics + shutdown
    let metrics = PrometheusMetrics::new()?;
    let shutdown = CancellationToken::new();

    // 3) Two-node in-process cluster
    let cluster = LocalCluster::new();
    let local = InstanceRegistry::new();
    cluster.join(NodeService::with_default_operations(
        system::node_id().clone(),
        local.clone(),
    ));
    cluster.join(NodeService::with_default_operations(
        NodeId::from("peer"),
        InstanceRegistry::new(),
    ));

    // 4) Instance on the local node
    let settings = StaticSettings::new(json!({
        "connection": { "type": "local" },
        "tasks": {
            "health": {
                "info_type": "cluster_health",
                "target_index": "agent",
                "target_type": "health",
                "period": "2s"
            },
            "nodes": {
                "info_type": "cluster_nodes_info",
                "target_index": "agent",
                "target_type": "nodes",
                "period": "10s",
                "params": { "verbose": true }
            }
        }
    }));
    let router = Arc::new(SourceRouter::new().with(Arc::new(SystemInfoBuilder)));
    let instance = ManagedInstance::builder(INSTANCE, local, router, Arc::new(LogSink))
        .with_loader(Arc::new(settings))
        .with_metrics(Arc::new(metrics.clone()))
        .with_config(ManagerConfig::default())
        .with_shutdown(shutdown.clone())
        .build();
    instance.reconfigure().await?;
    instance.start().await?;

    // 5) Cluster-wide control
    let api = ControlApi::new(Arc::new(cluster));
    info!(instances = ?api.list_instances().await?, "cluster instances");

    tokio::time::sleep(Duration::from_secs(3)).await;
    api.change_period_raw(INSTANCE, "nodes", "1s").await?;
    tokio::time::sleep(Duration::from_secs(3)).await;

    if let Err(e) = api
        .change_period(INSTANCE, Some(vec!["missing".into()]), Duration::from_secs(1))
        .await
    {
        info!(error = %e, "unknown task rejected");
    }
    api.restart_instance(INSTANCE).await?;

    info!(
        metrics = %TextEncoder::new().encode_to_string(&metrics.gather())?,
        "metrics snapshot"
    );

    // 6) Keep running
    info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down...");

    shutdown.cancel();
    instance.close().await;
    Ok(())
}
