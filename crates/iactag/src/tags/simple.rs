//! User supplied tags with fixed values
use crate::error::TagError;
use crate::tags::{Tag, TagCalculator, TagContext};
use indexmap::IndexMap;

/// Environment variable holding a JSON object of additional tags
pub const SIMPLE_TAGS_ENV: &str = "IACTAG_SIMPLE_TAGS";

#[derive(Debug, Clone, derive_new::new)]
pub struct SimpleTag {
    key: String,
    value: String,
}

impl TagCalculator for SimpleTag {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> &str {
        "A user supplied tag with a fixed value"
    }

    fn set_tag_prefix(&mut self, prefix: &str) {
        self.key = format!("{prefix}{}", self.key);
    }

    fn calculate(&self, _context: TagContext<'_>) -> Result<Tag, TagError> {
        Ok(Tag::new(self.key.clone(), self.value.clone()))
    }
}

/// Tags from [SIMPLE_TAGS_ENV], an unparsable value is ignored
pub fn tags_from_env() -> IndexMap<String, String> {
    let Ok(json) = std::env::var(SIMPLE_TAGS_ENV) else {
        return IndexMap::new();
    };

    parse_tags_json(&json).unwrap_or_else(|e| {
        tracing::warn!(variable = SIMPLE_TAGS_ENV, error=%e, "ignoring tags from environment");
        IndexMap::new()
    })
}

fn parse_tags_json(json: &str) -> Result<IndexMap<String, String>, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn calculators(tags: &IndexMap<String, String>) -> Vec<Box<dyn TagCalculator>> {
    tags.iter()
        .map(|(key, value)| Box::new(SimpleTag::new(key.clone(), value.clone())) as Box<dyn TagCalculator>)
        .collect()
}
