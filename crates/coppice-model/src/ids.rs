use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const ID_MAX_LEN: usize = 64;

fn parse_identifier(label: &str, input: &str) -> Result<String, ValidationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ValidationError(format!("{label} must not be empty")));
    }
    if s.len() > ID_MAX_LEN {
        return Err(ValidationError(format!(
            "{label} exceeds max length {ID_MAX_LEN}"
        )));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError(format!(
            "{label} must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(s.to_string())
}

macro_rules! id_newtype {
    ($name:ident, $label:literal) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
        )]
        #[serde(transparent)]
        #[non_exhaustive]
        pub struct $name(String);

        impl $name {
            pub fn parse(input: &str) -> Result<Self, ValidationError> {
                parse_identifier($label, input).map(Self)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ChannelId, "channel id");
id_newtype!(NodeId, "node id");
id_newtype!(FileId, "file id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_trimmed_and_validated() {
        let id = ChannelId::parse("  math-101 ").expect("valid id");
        assert_eq!(id.as_str(), "math-101");

        assert!(ChannelId::parse("").is_err());
        assert!(NodeId::parse("a b").is_err());
        assert!(FileId::parse(&"x".repeat(ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn identifiers_serialize_transparently() {
        let id = NodeId::parse("n1").expect("valid id");
        assert_eq!(serde_json::to_string(&id).expect("json"), "\"n1\"");
    }
}
