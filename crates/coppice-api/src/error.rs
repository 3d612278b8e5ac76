use coppice_query::{QueryError, QueryErrorCode};
use coppice_store::{StoreError, StoreErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    ChannelNotFound,
    NodeNotFound,
    FileNotFound,
    InvalidIdentifier,
    InvalidFilter,
    InvalidSkipField,
    CycleDetected,
    Internal,
}

impl ApiErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChannelNotFound => "channel_not_found",
            Self::NodeNotFound => "node_not_found",
            Self::FileNotFound => "file_not_found",
            Self::InvalidIdentifier => "invalid_identifier",
            Self::InvalidFilter => "invalid_filter",
            Self::InvalidSkipField => "invalid_skip_field",
            Self::CycleDetected => "cycle_detected",
            Self::Internal => "internal",
        }
    }
}

/// The stable error payload every catalog operation resolves to. `details`
/// carries machine-readable context such as the offending parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn invalid_identifier(name: &str, value: &str, reason: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidIdentifier,
            format!("invalid {name}: {reason}"),
            json!({"parameter": name, "value": value, "reason": reason}),
        )
    }

    #[must_use]
    pub fn invalid_filter(key: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidFilter,
            format!("unknown filter key: {key}"),
            json!({"parameter": key}),
        )
    }

    #[must_use]
    pub fn invalid_skip_field(raw: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidSkipField,
            format!("unknown skip field: {raw}"),
            json!({"parameter": "skip", "value": raw}),
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match err.code {
            StoreErrorCode::PartitionNotFound => ApiErrorCode::ChannelNotFound,
            StoreErrorCode::NodeNotFound => ApiErrorCode::NodeNotFound,
            StoreErrorCode::FileNotFound => ApiErrorCode::FileNotFound,
            _ => ApiErrorCode::Internal,
        };
        Self::new(code, err.message, Value::Null)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let code = match err.code {
            QueryErrorCode::PartitionNotFound => ApiErrorCode::ChannelNotFound,
            QueryErrorCode::NodeNotFound => ApiErrorCode::NodeNotFound,
            QueryErrorCode::CycleDetected => ApiErrorCode::CycleDetected,
            QueryErrorCode::Corrupt | QueryErrorCode::Store => ApiErrorCode::Internal,
            _ => ApiErrorCode::Internal,
        };
        Self::new(code, err.message, Value::Null)
    }
}
