use crate::ids::{ChannelId, NodeId, ValidationError};
use serde::{Deserialize, Serialize};

pub const CHANNEL_NAME_MAX_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub root_id: NodeId,
}

impl Channel {
    pub fn new(id: ChannelId, name: &str, root_id: NodeId) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError(format!("channel {id} must have a name")));
        }
        if name.len() > CHANNEL_NAME_MAX_LEN {
            return Err(ValidationError(format!(
                "channel {id} name exceeds max length {CHANNEL_NAME_MAX_LEN}"
            )));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            root_id,
        })
    }
}
