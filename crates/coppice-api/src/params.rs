use crate::error::ApiError;
use coppice_store::NodeFilter;
use std::collections::{BTreeMap, BTreeSet};

pub const ALLOWED_SKIP: [&str; 3] = ["files", "prerequisites", "related"];

const ALLOWED_FILTER_KEYS: [&str; 3] = ["title_contains", "description_contains", "skip"];

/// Serializer sections a caller may omit from node responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipField {
    Files,
    Prerequisites,
    Related,
}

impl SkipField {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "files" => Some(Self::Files),
            "prerequisites" => Some(Self::Prerequisites),
            "related" => Some(Self::Related),
            _ => None,
        }
    }
}

/// Parses a comma-separated `skip` value. Blank entries and unknown names
/// are rejected rather than ignored so typos surface to the caller.
pub fn parse_skip(raw: &str) -> Result<BTreeSet<SkipField>, ApiError> {
    let mut fields = BTreeSet::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() || !ALLOWED_SKIP.contains(&part) {
            return Err(ApiError::invalid_skip_field(raw));
        }
        let field = SkipField::parse(part).ok_or_else(|| ApiError::invalid_skip_field(raw))?;
        fields.insert(field);
    }
    Ok(fields)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeListParams {
    pub filter: NodeFilter,
    pub skip: BTreeSet<SkipField>,
}

/// Parses a node listing query map. Unknown keys are rejected so misspelled
/// filters never silently return the whole channel.
pub fn parse_node_list_params(
    query: &BTreeMap<String, String>,
) -> Result<NodeListParams, ApiError> {
    for key in query.keys() {
        if !ALLOWED_FILTER_KEYS.contains(&key.as_str()) {
            return Err(ApiError::invalid_filter(key));
        }
    }

    let skip = match query.get("skip") {
        Some(raw) => parse_skip(raw)?,
        None => BTreeSet::new(),
    };

    Ok(NodeListParams {
        filter: NodeFilter {
            title_contains: query.get("title_contains").cloned(),
            description_contains: query.get("description_contains").cloned(),
        },
        skip,
    })
}
