//! Payload mapping: untyped bag -> typed payload of a registered pair

use serde_json::{Map, Value};

use contracts::{DispatchError, Platform, TaskPayload, TaskType, registry};

/// Resolve the task type and decode the payload for one platform
///
/// # Errors
/// - `InvalidInput`: payload absent or empty, or a field has the wrong type
/// - `UnknownRoute`: unknown task type or unregistered (platform, task type)
pub fn map_payload(
    platform: Platform,
    task_type: &str,
    payload: Option<&Map<String, Value>>,
) -> Result<(TaskType, TaskPayload), DispatchError> {
    let raw = match payload {
        Some(map) if !map.is_empty() => map,
        _ => return Err(DispatchError::invalid_input("payload is required")),
    };

    let task_type: TaskType = task_type
        .parse()
        .map_err(|e| DispatchError::unknown_route(format!("{e}")))?;

    let entry = registry::lookup(platform, task_type).ok_or_else(|| {
        DispatchError::unknown_route(format!(
            "no payload schema for {platform}/{task_type}"
        ))
    })?;

    let typed = entry.decode(raw).map_err(|e| {
        DispatchError::invalid_input(format!(
            "payload does not match {platform}/{task_type}: {e}"
        ))
    })?;

    Ok((task_type, typed))
}
