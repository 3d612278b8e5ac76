use crate::ids::{ChannelId, NodeId, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const TITLE_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum NodeKind {
    Topic,
    Leaf,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Leaf => "leaf",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input {
            "topic" => Ok(Self::Topic),
            "leaf" => Ok(Self::Leaf),
            other => Err(ValidationError(format!("unknown node kind: {other}"))),
        }
    }

    #[must_use]
    pub const fn is_topic(self) -> bool {
        matches!(self, Self::Topic)
    }

    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf)
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentNode {
    pub id: NodeId,
    pub channel_id: ChannelId,
    pub kind: NodeKind,
    pub title: String,
    pub description: String,
    pub parent_id: Option<NodeId>,
    pub sort_order: i64,
    pub prerequisite_ids: Vec<NodeId>,
    pub related_ids: Vec<NodeId>,
}

impl ContentNode {
    /// Structural checks that hold for every node row in isolation. Tree-wide
    /// invariants (single root, acyclic parent graph) are the import
    /// validator's job.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError(format!(
                "node {} has an empty title",
                self.id
            )));
        }
        if self.title.len() > TITLE_MAX_LEN {
            return Err(ValidationError(format!(
                "node {} title exceeds max length {TITLE_MAX_LEN}",
                self.id
            )));
        }
        if self.parent_id.as_ref() == Some(&self.id) {
            return Err(ValidationError(format!(
                "node {} must not be its own parent",
                self.id
            )));
        }
        if self.prerequisite_ids.contains(&self.id) {
            return Err(ValidationError(format!(
                "node {} must not be its own prerequisite",
                self.id
            )));
        }
        if self.related_ids.contains(&self.id) {
            return Err(ValidationError(format!(
                "node {} must not be related to itself",
                self.id
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
