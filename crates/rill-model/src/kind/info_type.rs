use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Kind of status information a polling task reads from its source.
///
/// The symbolic name returned by [`InfoType::name`] is the one used in settings documents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoType {
    /// Overall cluster health.
    ClusterHealth,
    /// Full cluster state.
    ClusterState,
    /// Static information about cluster nodes.
    ClusterNodesInfo,
    /// Runtime statistics of cluster nodes.
    ClusterNodesStats,
    /// Status of indices.
    IndicesStatus,
    /// Statistics of indices.
    IndicesStats,
    /// Segment layout of indices.
    IndicesSegments,
}

impl InfoType {
    pub const ALL: [InfoType; 7] = [
        InfoType::ClusterHealth,
        InfoType::ClusterState,
        InfoType::ClusterNodesInfo,
        InfoType::ClusterNodesStats,
        InfoType::IndicesStatus,
        InfoType::IndicesStats,
        InfoType::IndicesSegments,
    ];

    /// Returns the name used for this kind in settings documents and logs.
    pub fn name(&self) -> &'static str {
        match self {
            InfoType::ClusterHealth => "cluster_health",
            InfoType::ClusterState => "cluster_state",
            InfoType::ClusterNodesInfo => "cluster_nodes_info",
            InfoType::ClusterNodesStats => "cluster_nodes_stats",
            InfoType::IndicesStatus => "indices_status",
            InfoType::IndicesStats => "indices_stats",
            InfoType::IndicesSegments => "indices_segments",
        }
    }

    /// Parse the `info_type` value of a task definition.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn parse_setting(value: Option<&str>) -> Result<Self, SettingsError> {
        let value = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SettingsError::Invalid("tasks/info_type must be defined".into()))?;
        value.parse()
    }
}

impl FromStr for InfoType {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim();
        InfoType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(norm))
            .ok_or_else(|| {
                SettingsError::Invalid(format!("tasks/info_type contains unsupported name: {s}"))
            })
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
