use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    InfoType, TargetLocation, TaskName, TaskParams, domain::duration_setting, error::SettingsError,
};

/// Period used when a task definition does not set one.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);

/// Typed definition of one polling task, as read from a settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    /// Task name, trimmed.
    pub name: TaskName,
    /// Kind of information fetched on every cycle.
    pub info_type: InfoType,
    /// Where fetched payloads are stored.
    pub target: TargetLocation,
    /// Interval between the starts of consecutive cycles. Always non-zero.
    #[serde(with = "millis")]
    pub period: Duration,
    /// Opaque params forwarded to the source.
    #[serde(default)]
    pub params: TaskParams,
}

impl TaskDef {
    /// Build a definition from one entry of the `tasks` map.
    pub fn from_settings(name: &str, value: &Value) -> Result<Self, SettingsError> {
        let name = name.trim();
        let obj = value
            .as_object()
            .ok_or_else(|| SettingsError::Invalid(format!("'tasks/{name}' must be an object")))?;

        let info_type = InfoType::parse_setting(obj.get("info_type").and_then(Value::as_str))?;
        let index = mandatory_string(obj, "target_index", name)?;
        let type_name = mandatory_string(obj, "target_type", name)?;

        let period = duration_setting(obj, "period", DEFAULT_PERIOD)?;
        if period.is_zero() {
            return Err(SettingsError::Invalid(format!(
                "'tasks/{name}/period' must be greater than zero"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            info_type,
            target: TargetLocation::new(index, type_name),
            period,
            params: params(obj, name)?,
        })
    }
}

fn mandatory_string(obj: &Map<String, Value>, key: &str, parent: &str) -> Result<String, SettingsError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SettingsError::MissingOrEmpty(format!("tasks/{parent}/{key}")))
}

fn params(obj: &Map<String, Value>, parent: &str) -> Result<TaskParams, SettingsError> {
    let Some(raw) = obj.get("params") else {
        return Ok(TaskParams::new());
    };
    match raw {
        Value::Null => Ok(TaskParams::new()),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(_) | Value::Bool(_) => v.to_string(),
                    _ => {
                        return Err(SettingsError::Invalid(format!(
                            "'tasks/{parent}/params/{k}' must be a scalar value"
                        )));
                    }
                };
                Ok((k.clone(), v))
            })
            .collect(),
        _ => Err(SettingsError::Invalid(format!(
            "'tasks/{parent}/params' must be an object"
        ))),
    }
}

mod millis {
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
