#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const CRATE_NAME: &str = "coppice-core";

pub const ENV_COPPICE_LOG: &str = "COPPICE_LOG";
pub const ENV_COPPICE_DATA_ROOT: &str = "COPPICE_DATA_ROOT";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Validation = 3,
    DependencyFailure = 4,
    Internal = 10,
}

impl ExitCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Usage => "usage",
            Self::Validation => "validation",
            Self::DependencyFailure => "dependency_failure",
            Self::Internal => "internal",
        }
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Resolves the partition root directory. `COPPICE_DATA_ROOT` wins, then the
/// XDG data home, then `$HOME/.local/share/coppice`, then a relative fallback.
#[must_use]
pub fn resolve_data_root() -> PathBuf {
    if let Ok(explicit) = std::env::var(ENV_COPPICE_DATA_ROOT) {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        let trimmed = xdg_data_home.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join("coppice");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed)
                .join(".local")
                .join("share")
                .join("coppice");
        }
    }

    PathBuf::from(".coppice").join("data")
}
