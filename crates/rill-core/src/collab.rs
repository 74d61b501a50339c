//! Seams to the collaborators the scheduler drives but does not implement:
//! the data source, the data sink and the settings loader.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use rill_model::{InfoType, TargetLocation, TaskParams};
use serde_json::Value;

use crate::error::{CoreError, SinkError, SourceError};

/// Data source a polling task reads status payloads from.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Short connection kind used in logs.
    fn kind(&self) -> &'static str;

    /// Open the connection. Called when the owning instance starts.
    async fn start(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Fetch one payload. May block for as long as the underlying protocol does.
    async fn fetch(&self, info_type: InfoType, params: &TaskParams) -> Result<String, SourceError>;

    /// Release the connection. Called when the owning instance stops.
    async fn close(&self) {}
}

/// Destination of fetched payloads.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn store(&self, target: &TargetLocation, payload: String) -> Result<(), SinkError>;
}

/// Supplies the current settings document of an instance.
///
/// Consulted on every reconfigure, so changes made outside the process are picked up on restart.
#[async_trait]
pub trait SettingsLoader: Send + Sync + 'static {
    async fn load(&self, instance: &str) -> Result<Value, CoreError>;
}

/// Settings loader backed by an in-memory document that can be replaced at runtime.
#[derive(Clone)]
pub struct StaticSettings {
    doc: Arc<RwLock<Value>>,
}

impl StaticSettings {
    pub fn new(doc: Value) -> Self {
        Self {
            doc: Arc::new(RwLock::new(doc)),
        }
    }

    /// Replace the document returned by subsequent loads.
    pub fn replace(&self, doc: Value) {
        *self.doc.write().unwrap_or_else(PoisonError::into_inner) = doc;
    }
}

#[async_trait]
impl SettingsLoader for StaticSettings {
    async fn load(&self, _instance: &str) -> Result<Value, CoreError> {
        Ok(self.doc.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}
