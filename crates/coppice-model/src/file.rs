use crate::ids::{FileId, NodeId, ValidationError};
use serde::{Deserialize, Serialize};

pub const CHECKSUM_LEN: usize = 64;
pub const EXTENSION_MAX_LEN: usize = 16;

/// A file record owned by one content node. `available == false` means the
/// record exists but the backing blob is known to be absent from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub id: FileId,
    pub node_id: NodeId,
    pub available: bool,
    pub checksum: String,
    pub extension: String,
    pub file_size: u64,
}

impl File {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.checksum.len() != CHECKSUM_LEN
            || !self.checksum.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ValidationError(format!(
                "file {} checksum must be {CHECKSUM_LEN} hex characters",
                self.id
            )));
        }
        if self.extension.is_empty()
            || self.extension.len() > EXTENSION_MAX_LEN
            || !self
                .extension
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ValidationError(format!(
                "file {} extension must match [a-z0-9]{{1,{EXTENSION_MAX_LEN}}}",
                self.id
            )));
        }
        Ok(())
    }

    /// Blob file name under the content-addressed store.
    #[must_use]
    pub fn blob_name(&self) -> String {
        format!("{}.{}", self.checksum, self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> File {
        File {
            id: FileId::parse("f1").expect("file id"),
            node_id: NodeId::parse("n1").expect("node id"),
            available: true,
            checksum: "ab".repeat(32),
            extension: "mp4".to_string(),
            file_size: 1024,
        }
    }

    #[test]
    fn checksum_must_be_hex_of_fixed_length() {
        assert!(file().validate().is_ok());

        let mut f = file();
        f.checksum = "zz".repeat(32);
        assert!(f.validate().is_err());

        let mut f = file();
        f.checksum = "abcd".to_string();
        assert!(f.validate().is_err());
    }

    #[test]
    fn blob_name_joins_checksum_and_extension() {
        let f = file();
        assert_eq!(f.blob_name(), format!("{}.mp4", "ab".repeat(32)));
    }
}
