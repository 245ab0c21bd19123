//! Identity tags linking a cloud resource back to its definition
use crate::error::TagError;
use crate::tags::{Tag, TagCalculator, TagContext, NAME_TAG_KEY, TRACE_TAG_KEY};

/// A random UUID, only ever added to blocks without one
#[derive(Debug, Clone)]
pub struct TraceTag {
    key: String,
}

impl Default for TraceTag {
    fn default() -> Self {
        Self {
            key: TRACE_TAG_KEY.to_string(),
        }
    }
}

impl TagCalculator for TraceTag {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> &str {
        "A UUID value tag, to find this resource easily across accounts and deployment stacks"
    }

    fn set_tag_prefix(&mut self, prefix: &str) {
        self.key = format!("{prefix}{TRACE_TAG_KEY}");
    }

    fn calculate(&self, _context: TagContext<'_>) -> Result<Tag, TagError> {
        Ok(Tag::new(self.key.clone(), uuid::Uuid::new_v4().to_string()))
    }
}

/// Name of the resource in the IaC file
#[derive(Debug, Clone)]
pub struct NameTag {
    key: String,
}

impl Default for NameTag {
    fn default() -> Self {
        Self {
            key: NAME_TAG_KEY.to_string(),
        }
    }
}

impl TagCalculator for NameTag {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> &str {
        "A tag that states the resource name in the IaC config file"
    }

    fn set_tag_prefix(&mut self, prefix: &str) {
        self.key = format!("{prefix}{NAME_TAG_KEY}");
    }

    fn calculate(&self, context: TagContext<'_>) -> Result<Tag, TagError> {
        match context {
            TagContext::Block(block) => Ok(Tag::new(self.key.clone(), block.resource_name.clone())),
            TagContext::Blame(_) => Err(TagError::plugin(&self.key, "block required")),
        }
    }
}

pub fn default_calculators() -> Vec<Box<dyn TagCalculator>> {
    vec![Box::<TraceTag>::default(), Box::<NameTag>::default()]
}
