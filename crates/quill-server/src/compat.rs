//! Client compatibility layer.
//!
//! Browser clients send camelCase params and a few legacy names; handlers
//! only ever see the snake_case forms.

use quill_core::Channel;

/// Mapping of camelCase (and legacy) param keys to snake_case equivalents.
const CAMEL_TO_SNAKE: &[(&str, &str)] = &[
    ("sessionKey", "session_key"),
    ("studentId", "student_id"),
    ("studentName", "student_name"),
    ("partnerSessionKey", "partner_session_key"),
    ("partnerId", "partner_id"),
    ("partnerName", "partner_name"),
    ("userId", "user_id"),
    ("userName", "user_name"),
    ("forceReload", "force"),
    ("targetStage", "stage"),
];

/// Normalize camelCase params to snake_case for handlers.
/// If the snake_case key already exists, the existing value takes precedence.
pub fn normalize_params(params: &serde_json::Value) -> serde_json::Value {
    let Some(obj) = params.as_object() else {
        return params.clone();
    };
    let mut result = obj.clone();
    for &(camel, snake) in CAMEL_TO_SNAKE {
        if !result.contains_key(snake) {
            if let Some(val) = result.remove(camel) {
                result.insert(snake.to_string(), val);
            }
        } else {
            result.remove(camel);
        }
    }
    serde_json::Value::Object(result)
}

/// Channel named by the `channel` param, defaulting to the AI channel.
pub fn channel_param(params: &serde_json::Value) -> Channel {
    params
        .get("channel")
        .and_then(|v| v.as_str())
        .map(Channel::resolve)
        .unwrap_or(Channel::Ai)
}
