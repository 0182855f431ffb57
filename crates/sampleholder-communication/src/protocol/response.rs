//! Firmware response decoding
//!
//! Every request is answered by one JSON object with keys `status`,
//! `command`, and optionally `response` and `id`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Status value the firmware uses to report failure
pub const STATUS_ERROR: &str = "error";

/// Status value the firmware uses to report success
pub const STATUS_OK: &str = "ok";

/// Decoded firmware response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
    /// `"ok"` or `"error"`
    pub status: String,
    /// Echo of the invoked command name
    pub command: String,
    /// Command return payload, `Some(Value::Null)` for an explicit null
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub response: Option<Value>,
    /// Auxiliary identifier payload
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
}

/// A key that is present is `Some`, even when its value is null
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl DeviceResponse {
    /// Successful response with an optional payload
    pub fn ok(command: impl Into<String>, response: Option<Value>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            command: command.into(),
            response,
            id: None,
        }
    }

    /// Failed response
    pub fn error(command: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            command: command.into(),
            response: None,
            id: None,
        }
    }

    /// Only `"error"` is treated as failure; any other status is success.
    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

/// Value returned by a successful invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InvokeResult {
    /// Neither `response` nor `id` was present
    #[default]
    Empty,
    /// Only `response` was present
    Response(Value),
    /// Only `id` was present
    Id(Value),
    /// Both were present
    Both {
        /// The `response` payload
        response: Value,
        /// The `id` payload
        id: Value,
    },
}

impl From<DeviceResponse> for InvokeResult {
    fn from(resp: DeviceResponse) -> Self {
        match (resp.response, resp.id) {
            (Some(response), Some(id)) => Self::Both { response, id },
            (Some(response), None) => Self::Response(response),
            (None, Some(id)) => Self::Id(id),
            (None, None) => Self::Empty,
        }
    }
}

impl InvokeResult {
    /// The primary payload: `response` when present, otherwise `id`
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Empty => None,
            Self::Response(v) | Self::Id(v) => Some(v),
            Self::Both { response, .. } => Some(response),
        }
    }

    /// True when the firmware returned no payload
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Primary payload as text, strings unquoted
    pub fn as_text(&self) -> Option<String> {
        self.value().map(value_as_text)
    }

    /// Primary payload as an integer
    pub fn as_i64(&self) -> Option<i64> {
        self.value().and_then(value_as_i64)
    }
}

impl std::fmt::Display for InvokeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "(none)"),
            Self::Response(v) | Self::Id(v) => write!(f, "{}", value_as_text(v)),
            Self::Both { response, id } => write!(
                f,
                "response={} id={}",
                value_as_text(response),
                value_as_text(id)
            ),
        }
    }
}

/// Textual form of a payload value
///
/// Strings are returned without quotes; everything else in JSON notation.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integer form of a payload value
///
/// Accepts integers, integral floats, and strings holding either.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}
