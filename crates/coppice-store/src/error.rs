use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorCode {
    PartitionNotFound,
    NodeNotFound,
    FileNotFound,
    Conflict,
    Validation,
    Corrupt,
    Io,
    Sql,
}

impl StoreErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PartitionNotFound => "partition_not_found",
            Self::NodeNotFound => "node_not_found",
            Self::FileNotFound => "file_not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Corrupt => "corrupt",
            Self::Io => "io",
            Self::Sql => "sql",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn partition_not_found(channel: &coppice_model::ChannelId) -> Self {
        Self::new(
            StoreErrorCode::PartitionNotFound,
            format!("no partition for channel {channel}"),
        )
    }

    #[must_use]
    pub fn node_not_found(node: &coppice_model::NodeId) -> Self {
        Self::new(
            StoreErrorCode::NodeNotFound,
            format!("node {node} not found in partition"),
        )
    }

    #[must_use]
    pub fn file_not_found(file: &coppice_model::FileId) -> Self {
        Self::new(
            StoreErrorCode::FileNotFound,
            format!("file {file} not found in partition"),
        )
    }

    pub(crate) fn sql(e: &rusqlite::Error) -> Self {
        Self::new(StoreErrorCode::Sql, e.to_string())
    }

    pub(crate) fn io(e: &std::io::Error) -> Self {
        Self::new(StoreErrorCode::Io, e.to_string())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}
