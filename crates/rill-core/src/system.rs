//! Identity and host facts of the node this process runs on.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Instant,
};

use rill_model::NodeId;
use tracing::{debug, warn};

/// Environment variable that pins the node id.
pub const NODE_ID_ENV: &str = "RILL_NODE_ID";

static NODE_ID: OnceLock<NodeId> = OnceLock::new();
static STARTED: OnceLock<Instant> = OnceLock::new();

/// Record the process start instant. Later calls are no-ops.
pub fn init_uptime() {
    STARTED.get_or_init(Instant::now);
}

pub fn uptime_seconds() -> u64 {
    STARTED.get_or_init(Instant::now).elapsed().as_secs()
}

#[inline]
pub fn platform() -> &'static str {
    std::env::consts::OS
}

#[inline]
pub fn arch() -> &'static str {
    std::env::consts::ARCH
}

/// Stable id of this node, resolved once per process.
///
/// Resolution order: `RILL_NODE_ID`, the pod hostname under Kubernetes,
/// an id persisted on disk, a freshly generated id (persisted when possible).
pub fn node_id() -> &'static NodeId {
    NODE_ID.get_or_init(|| {
        if let Ok(id) = std::env::var(NODE_ID_ENV)
            && !id.trim().is_empty()
        {
            return NodeId::from(id.trim());
        }
        if is_kubernetes()
            && let Ok(host) = hostname::get()
            && let Some(name) = host.to_str()
        {
            return NodeId::from(name);
        }
        NodeId::from(load_or_generate_id(&id_paths()))
    })
}

/// Pretty OS name from `/etc/os-release`, or the platform name.
pub fn os_info() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = fs::read_to_string("/etc/os-release")
            && let Some(name) = content
                .lines()
                .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        {
            return name.trim_matches('"').to_string();
        }
    }
    platform().to_string()
}

fn id_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/var/lib/rill/node-id")];
    if let Ok(home) = std::env::var("HOME")
        && !home.is_empty()
    {
        paths.push(Path::new(&home).join(".rill").join("node-id"));
    }
    paths
}

fn load_or_generate_id(paths: &[PathBuf]) -> String {
    for path in paths {
        if let Ok(id) = fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                debug!(path = %path.display(), "loaded persisted node id");
                return id.to_string();
            }
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    for path in paths {
        if let Some(parent) = path.parent()
            && fs::create_dir_all(parent).is_ok()
            && fs::write(path, &id).is_ok()
        {
            debug!(path = %path.display(), "persisted generated node id");
            return id;
        }
    }
    warn!("node id could not be persisted; it will change on restart");
    id
}

fn is_kubernetes() -> bool {
    std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
        || Path::new("/var/run/secrets/kubernetes.io/serviceaccount").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_stable_within_process() {
        let a = node_id();
        let b = node_id();
        assert_eq!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn generated_id_is_persisted_and_reloaded() {
        let dir = std::env::temp_dir().join(format!("rill-node-id-{}", uuid::Uuid::new_v4()));
        let paths = vec![dir.join("node-id")];

        let first = load_or_generate_id(&paths);
        let second = load_or_generate_id(&paths);
        assert_eq!(first, second);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn platform_is_known() {
        assert!(!platform().is_empty());
        assert!(!arch().is_empty());
    }
}
