use coppice_store::{StoreError, StoreErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryErrorCode {
    PartitionNotFound,
    NodeNotFound,
    CycleDetected,
    Corrupt,
    Store,
}

impl QueryErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PartitionNotFound => "partition_not_found",
            Self::NodeNotFound => "node_not_found",
            Self::CycleDetected => "cycle_detected",
            Self::Corrupt => "corrupt",
            Self::Store => "store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub code: QueryErrorCode,
    pub message: String,
}

impl QueryError {
    #[must_use]
    pub fn new(code: QueryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn node_not_found(node: &coppice_model::NodeId) -> Self {
        Self::new(
            QueryErrorCode::NodeNotFound,
            format!("node {node} not found in channel tree"),
        )
    }

    #[must_use]
    pub fn cycle_detected(node: &coppice_model::NodeId) -> Self {
        Self::new(
            QueryErrorCode::CycleDetected,
            format!("parent graph cycle detected at node {node}"),
        )
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for QueryError {}

impl From<StoreError> for QueryError {
    fn from(value: StoreError) -> Self {
        let code = match value.code {
            StoreErrorCode::PartitionNotFound => QueryErrorCode::PartitionNotFound,
            StoreErrorCode::NodeNotFound => QueryErrorCode::NodeNotFound,
            StoreErrorCode::Corrupt => QueryErrorCode::Corrupt,
            _ => QueryErrorCode::Store,
        };
        Self::new(code, value.message)
    }
}
