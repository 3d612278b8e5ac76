use crate::error::{ApiError, ApiErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiErrorMapping {
    pub status_code: u16,
}

#[must_use]
pub fn map_error(error: &ApiError) -> ApiErrorMapping {
    let status_code = match error.code {
        ApiErrorCode::ChannelNotFound
        | ApiErrorCode::NodeNotFound
        | ApiErrorCode::FileNotFound => 404,
        ApiErrorCode::InvalidIdentifier
        | ApiErrorCode::InvalidFilter
        | ApiErrorCode::InvalidSkipField => 400,
        _ => 500,
    };

    ApiErrorMapping { status_code }
}
