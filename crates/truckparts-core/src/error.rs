//! Normalized errors for calls made through the gateway.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text used when no response was received at all.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error - Please check your connection";

/// Categories of gateway errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// No response received (connection failure, timeout)
    Network,
    /// 4xx response
    Client,
    /// 4xx response carrying field-level validation errors
    Validation,
    /// 5xx response
    Server,
    /// 401 that could not be recovered by a token refresh
    SessionExpired,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Network => write!(f, "network"),
            ApiErrorKind::Client => write!(f, "client"),
            ApiErrorKind::Validation => write!(f, "validation"),
            ApiErrorKind::Server => write!(f, "server"),
            ApiErrorKind::SessionExpired => write!(f, "session_expired"),
        }
    }
}

/// Uniform error shape returned to callers of the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// HTTP status, absent for network errors
    pub status: Option<u16>,
    /// Backend-provided `code` field, or a local code such as `TIMEOUT`
    pub code: Option<String>,
    /// Raw response body
    pub details: Option<Value>,
    /// Set when a 401 was followed by a successful refresh; re-issuing the
    /// original call is expected to succeed.
    pub retryable: bool,
}

impl ApiError {
    /// Builds an error from an HTTP status and (possibly empty) body.
    pub fn from_response(status: u16, body: Option<Value>) -> Self {
        let message = error_message(Some(status), body.as_ref());
        let code = body
            .as_ref()
            .and_then(|b| b.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let kind = if status >= 500 {
            ApiErrorKind::Server
        } else if body.as_ref().is_some_and(has_field_errors) {
            ApiErrorKind::Validation
        } else {
            ApiErrorKind::Client
        };

        Self {
            kind,
            message,
            status: Some(status),
            code,
            details: body,
            retryable: false,
        }
    }

    /// Builds a network error (no response received).
    pub fn network(code: Option<&str>) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: NETWORK_ERROR_MESSAGE.to_string(),
            status: None,
            code: code.map(str::to_string),
            details: None,
            retryable: false,
        }
    }

    /// Builds a network error from a transport failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "TIMEOUT"
        } else if err.is_connect() {
            "CONNECTION_FAILED"
        } else if err.is_decode() {
            "DECODE_FAILED"
        } else {
            "NETWORK_ERROR"
        };
        tracing::debug!(error = %err, code, "request failed without a response");
        Self::network(Some(code))
    }

    /// A 2xx response whose body could not be understood.
    pub fn invalid_response(status: u16, detail: &str) -> Self {
        tracing::debug!(status, detail, "invalid response body");
        Self {
            kind: ApiErrorKind::Server,
            message: "Invalid response from server".to_string(),
            status: Some(status),
            code: Some("INVALID_RESPONSE".to_string()),
            details: Some(Value::String(detail.to_string())),
            retryable: false,
        }
    }

    /// Re-labels this error as an unrecoverable 401.
    #[must_use]
    pub fn into_session_expired(mut self) -> Self {
        self.kind = ApiErrorKind::SessionExpired;
        self.retryable = false;
        self
    }

    #[must_use]
    pub fn into_retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn is_network_error(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_some_and(|s| s >= 500)
    }

    pub fn is_client_error(&self) -> bool {
        self.status.is_some_and(|s| (400..500).contains(&s))
    }

    pub fn is_session_expired(&self) -> bool {
        self.kind == ApiErrorKind::SessionExpired
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for gateway operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Derives a readable message from a failed response.
///
/// Precedence (first match wins): `detail`, `message`, `error`, the known
/// validation fields (`phone_number`, `password`, `non_field_errors`), the
/// first non-empty array-valued field in response order, a status text, and
/// finally the network error text.
pub fn error_message(status: Option<u16>, body: Option<&Value>) -> String {
    if let Some(Value::Object(data)) = body {
        for key in ["detail", "message", "error"] {
            if let Some(value) = data.get(key).filter(|v| is_truthy(v)) {
                return display_value(value);
            }
        }

        if let Some(value) = data.get("phone_number").filter(|v| is_truthy(v)) {
            return format!("Phone number: {}", first_or_self(value));
        }
        if let Some(value) = data.get("password").filter(|v| is_truthy(v)) {
            return format!("Password: {}", first_or_self(value));
        }
        if let Some(value) = data.get("non_field_errors").filter(|v| is_truthy(v)) {
            return first_or_self(value);
        }

        for (field, value) in data {
            if let Value::Array(errors) = value
                && let Some(first) = errors.first()
            {
                return format!("{field}: {}", display_value(first));
            }
        }
    }

    match status {
        Some(status) => status_message(status),
        None => NETWORK_ERROR_MESSAGE.to_string(),
    }
}

fn status_message(status: u16) -> String {
    let text = match status {
        400 => "Bad request - Please check your input",
        401 => "Authentication required",
        403 => "Access denied",
        404 => "Resource not found",
        408 => "Request timeout",
        409 => "Conflict - Resource already exists",
        422 => "Validation error",
        429 => "Too many requests - Please try again later",
        500 => "Internal server error",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        other => {
            let reason = reqwest::StatusCode::from_u16(other)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Request failed");
            return format!("HTTP {other}: {reason}");
        }
    };
    text.to_string()
}

fn has_field_errors(body: &Value) -> bool {
    body.as_object()
        .is_some_and(|data| data.values().any(|v| v.as_array().is_some_and(|a| !a.is_empty())))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn first_or_self(value: &Value) -> String {
    match value {
        Value::Array(items) => items.first().map(display_value).unwrap_or_default(),
        other => display_value(other),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
