use std::time::Duration;

use crate::{TaskName, error::SettingsError, parse_duration};

/// Split a comma-separated list of task names.
///
/// Blank entries are dropped; `None` is returned when nothing remains,
/// which control operations treat as "no task named".
pub fn split_task_names(raw: &str) -> Option<Vec<TaskName>> {
    let names: Vec<TaskName> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

/// Parse the period of a period-change request.
///
/// Uses the settings duration grammar and refuses a zero period.
pub fn parse_period(raw: &str) -> Result<Duration, SettingsError> {
    let period = parse_duration("period", raw)?;
    if period.is_zero() {
        return Err(SettingsError::Invalid("period must be greater than zero".into()));
    }
    Ok(period)
}
