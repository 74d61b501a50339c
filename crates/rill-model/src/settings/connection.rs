use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{domain::duration_setting, error::SettingsError};

/// Default timeout of a `rest` connection.
pub const DEFAULT_REST_TIMEOUT: Duration = Duration::from_secs(5);

/// One `host:port` entry of a `remote` connection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteAddress {
    pub host: String,
    pub port: u16,
}

/// Connection to the data source an instance polls.
///
/// Each variant carries the settings its source builder needs.
/// The variant is resolved once, when the instance is configured.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionSettings {
    /// The node the instance runs on.
    Local,
    /// A remote cluster reached over its native transport.
    Remote {
        addresses: Vec<RemoteAddress>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        settings: BTreeMap<String, String>,
    },
    /// A remote cluster reached over its REST API.
    Rest {
        /// Base URL, always ending with `/`.
        url_base: String,
        #[serde(with = "timeout_ms")]
        timeout: Duration,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pwd: Option<String>,
    },
}

impl ConnectionSettings {
    /// Short symbolic name of the connection kind (`local`, `remote`, `rest`).
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionSettings::Local => "local",
            ConnectionSettings::Remote { .. } => "remote",
            ConnectionSettings::Rest { .. } => "rest",
        }
    }

    /// Parse the `connection` section of a settings document.
    pub fn from_settings(value: &Value) -> Result<Self, SettingsError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SettingsError::Invalid("'connection' must be an object".into()))?;

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SettingsError::MissingOrEmpty("connection/type".into()))?;

        match kind.to_ascii_lowercase().as_str() {
            "local" => Ok(ConnectionSettings::Local),
            "remote" => remote(obj),
            "rest" => rest(obj),
            _ => Err(SettingsError::Invalid(format!(
                "connection/type value '{kind}' is invalid. Use one of local, remote, rest"
            ))),
        }
    }
}

fn remote(obj: &Map<String, Value>) -> Result<ConnectionSettings, SettingsError> {
    let raw = obj
        .get("addresses")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SettingsError::MissingOrEmpty("connection/addresses".into()))?;

    let mut addresses = Vec::with_capacity(raw.len());
    for entry in raw {
        let host = entry
            .get("host")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SettingsError::MissingOrEmpty("connection/addresses/host".into()))?;
        let port = match entry.get("port") {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| SettingsError::MissingOrEmpty("connection/addresses/port".into()))?;

        addresses.push(RemoteAddress {
            host: host.to_string(),
            port,
        });
    }

    let settings = match obj.get("settings") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                (k.clone(), v)
            })
            .collect(),
        _ => BTreeMap::new(),
    };

    Ok(ConnectionSettings::Remote { addresses, settings })
}

fn rest(obj: &Map<String, Value>) -> Result<ConnectionSettings, SettingsError> {
    let url_base = obj
        .get("url_base")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| SettingsError::MissingOrEmpty("connection/url_base".into()))?;
    if !(url_base.starts_with("http://") || url_base.starts_with("https://")) {
        return Err(SettingsError::Invalid(format!(
            "connection/url_base '{url_base}' is malformed: expected http:// or https:// scheme"
        )));
    }
    let url_base = if url_base.ends_with('/') {
        url_base.to_string()
    } else {
        format!("{url_base}/")
    };

    let username = optional_string(obj, "username");
    let pwd = optional_string(obj, "pwd");

    Ok(ConnectionSettings::Rest {
        url_base,
        timeout: duration_setting(obj, "timeout", DEFAULT_REST_TIMEOUT)?,
        username,
        pwd,
    })
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

mod timeout_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
