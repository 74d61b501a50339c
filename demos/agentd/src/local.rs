use std::sync::Arc;

use async_trait::async_trait;
use rill_core::{Sink, SinkError, Source, SourceBuilder, SourceError, system};
use rill_model::{ConnectionSettings, InfoType, TargetLocation, TaskParams};
use serde_json::json;
use tracing::info;

/// Source reporting facts about the host process, for `local` connections.
pub struct SystemInfo;

#[async_trait]
impl Source for SystemInfo {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, info_type: InfoType, params: &TaskParams) -> Result<String, SourceError> {
        let mut doc = match info_type {
            InfoType::ClusterHealth => json!({
                "node": system::node_id().as_str(),
                "status": "green",
                "uptime_seconds": system::uptime_seconds(),
            }),
            InfoType::ClusterNodesInfo => json!({
                "node": system::node_id().as_str(),
                "os": system::os_info(),
                "platform": system::platform(),
                "arch": system::arch(),
            }),
            other => return Err(SourceError::Unsupported(other)),
        };
        if !params.is_empty() {
            doc["params"] = json!(params);
        }
        Ok(doc.to_string())
    }
}

pub struct SystemInfoBuilder;

impl SourceBuilder for SystemInfoBuilder {
    fn name(&self) -> &'static str {
        "system-info"
    }

    fn supports(&self, conn: &ConnectionSettings) -> bool {
        matches!(conn, ConnectionSettings::Local)
    }

    fn build(&self, _conn: &ConnectionSettings) -> Result<Arc<dyn Source>, SourceError> {
        Ok(Arc::new(SystemInfo))
    }
}

/// Sink writing payloads to the log.
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    async fn store(&self, target: &TargetLocation, payload: String) -> Result<(), SinkError> {
        info!(target_location = %target, payload = %payload, "stored");
        Ok(())
    }
}
