//! Tags whose values are computed from rules in the configuration file
//!
//! ```yaml
//! external_tag_groups:
//!   - name: ownership
//!     tags:
//!       - name: env
//!         value:
//!           default: dev
//!           matches:
//!             - prod:
//!                 tags:
//!                   git_repo: [infra, platform]
//!         filters:
//!           tags:
//!             team: platform
//!           directory: services
//! ```
//!
//! A tag starts out with its default, every matching entry of `matches` overrides it, the last one
//! winning. Filters decide whether the tag is added to a block at all. Both look at the block's
//! existing tags and at the tags groups before this one added.
use crate::block::Block;
use crate::error::TagError;
use crate::tags::{is_tag_key_match, Tag, TagCalculator, TagContext};
use indexmap::IndexMap;
use serde_yaml::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalGroupConfig {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<ExternalTagConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalTagConfig {
    /// tag key, used as is without prefix
    pub name: String,
    #[serde(default)]
    pub value: ValueConfig,
    #[serde(default)]
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValueConfig {
    pub default: Option<Scalar>,
    /// entries of one value and the block tags it applies to
    pub matches: Vec<IndexMap<Scalar, MatchRule>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRule {
    pub tags: IndexMap<String, MatchValues>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum MatchValues {
    One(Scalar),
    Any(Vec<Scalar>),
}

impl MatchValues {
    fn contains(&self, value: &str) -> bool {
        match self {
            MatchValues::One(one) => one.0 == value,
            MatchValues::Any(any) => any.iter().any(|candidate| candidate.0 == value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// tags the block must carry with exactly these values
    pub tags: IndexMap<String, Scalar>,
    /// matched against the trailing components of the directories holding the block's file
    pub directory: Option<PathBuf>,
}

/// A YAML scalar read as a string, `42` and `true` included
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(try_from = "Value")]
pub struct Scalar(pub String);

impl TryFrom<Value> for Scalar {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Scalar(s)),
            Value::Number(n) => Ok(Scalar(n.to_string())),
            Value::Bool(b) => Ok(Scalar(b.to_string())),
            other => Err(format!("expected a string, number or boolean, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalTag {
    key: String,
    description: String,
    default: Option<String>,
    matches: Vec<(String, MatchRule)>,
    filters: FilterConfig,
}

impl ExternalTag {
    /// `None` for a tag that could never have a value
    pub fn new(group: &str, config: &ExternalTagConfig) -> Option<Self> {
        if config.value.default.is_none() && config.value.matches.is_empty() {
            tracing::warn!(group, key=%config.name, "external tag has neither a default nor matches, ignored");
            return None;
        }

        Some(Self {
            key: config.name.clone(),
            description: format!("Computed from the rules of external tag group {group}"),
            default: config.value.default.as_ref().map(|default| default.0.clone()),
            matches: config
                .value
                .matches
                .iter()
                .flat_map(|entry| entry.iter().map(|(value, rule)| (value.0.clone(), rule.clone())))
                .collect(),
            filters: config.filters.clone(),
        })
    }

    fn satisfies_filters(&self, block: &Block) -> bool {
        let tags_match = self
            .filters
            .tags
            .iter()
            .all(|(key, value)| block_tags(block).any(|tag| is_tag_key_match(&tag.key, key) && tag.value == value.0));

        let directory_matches = match (&self.filters.directory, block.file_path.parent()) {
            (None, _) => true,
            (Some(directory), Some(parent)) => parent.ancestors().any(|dir| dir.ends_with(directory)),
            (Some(_), None) => false,
        };

        tags_match && directory_matches
    }

    fn value_for(&self, block: &Block) -> Option<String> {
        self.matches
            .iter()
            .filter(|(_, rule)| {
                rule.tags.iter().any(|(key, values)| {
                    block_tags(block).any(|tag| is_tag_key_match(&tag.key, key) && values.contains(&tag.value))
                })
            })
            .map(|(value, _)| value.clone())
            .last()
            .or_else(|| self.default.clone())
    }
}

fn block_tags(block: &Block) -> impl Iterator<Item = &Tag> {
    block.existing_tags.iter().chain(block.new_tags.iter())
}

impl TagCalculator for ExternalTag {
    fn key(&self) -> &str {
        &self.key
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn set_tag_prefix(&mut self, _prefix: &str) {}

    fn applies_to(&self, context: TagContext<'_>) -> bool {
        match context {
            TagContext::Block(block) => self.satisfies_filters(block),
            TagContext::Blame(_) => false,
        }
    }

    fn calculate(&self, context: TagContext<'_>) -> Result<Tag, TagError> {
        let TagContext::Block(block) = context else {
            return Err(TagError::plugin(&self.key, "block required"));
        };

        self.value_for(block)
            .map(|value| Tag::new(self.key.clone(), value))
            .ok_or_else(|| TagError::plugin(&self.key, "no default and no matching tags"))
    }
}

pub fn calculators(groups: &[ExternalGroupConfig]) -> Vec<Box<dyn TagCalculator>> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .tags
                .iter()
                .filter_map(move |tag| ExternalTag::new(&group.name, tag))
        })
        .map(|tag| Box::new(tag) as Box<dyn TagCalculator>)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::test::block_with_tags;
    use pretty_assertions::assert_eq;

    const GROUPS: &str = r#"
- name: ownership
  tags:
    - name: env
      value:
        default: dev
        matches:
          - prod:
              tags:
                git_repo: [infra, platform]
          - staging:
              tags:
                git_commit: 42
    - name: stack
      value:
        default: account
      filters:
        tags:
          yor_trace: "123"
        directory: src/account
    - name: owner
      value:
        matches:
          - data-team:
              tags:
                team: data
    - name: broken
"#;

    fn tags_for(groups: &[ExternalGroupConfig], block: &Block) -> Vec<Tag> {
        calculators(groups)
            .iter()
            .filter(|calculator| calculator.applies_to(TagContext::Block(block)))
            .filter_map(|calculator| calculator.calculate(TagContext::Block(block)).ok())
            .collect()
    }

    fn groups() -> Vec<ExternalGroupConfig> {
        serde_yaml::from_str(GROUPS).unwrap()
    }

    #[test]
    fn reads_config() {
        let groups = groups();

        assert_eq!(groups[0].tags.len(), 4);
        assert_eq!(
            groups[0].tags[0].value.matches[1].get(&Scalar("staging".into())),
            Some(&MatchRule {
                tags: [("git_commit".to_string(), MatchValues::One(Scalar("42".into())))]
                    .into_iter()
                    .collect()
            })
        );

        // broken has neither a default nor matches
        let keys: Vec<String> = calculators(&groups).iter().map(|c| c.key().to_string()).collect();
        assert_eq!(keys, vec!["env", "stack", "owner"]);
    }

    #[test]
    fn default_value() {
        let block = block_with_tags(&[("git_modifiers", "jane"), ("git_repo", "checkov")]);
        assert_eq!(tags_for(&groups(), &block), vec![Tag::new("env", "dev")]);
    }

    #[test]
    fn matches_override_the_default() {
        let mut block = block_with_tags(&[("git_repo", "platform")]);
        assert_eq!(tags_for(&groups(), &block), vec![Tag::new("env", "prod")]);

        // the last matching entry wins, new tags of earlier groups count as well
        block.new_tags.push(Tag::new("git_commit", "42"));
        block.new_tags.push(Tag::new("team", "data"));
        assert_eq!(
            tags_for(&groups(), &block),
            vec![Tag::new("env", "staging"), Tag::new("owner", "data-team")]
        );
    }

    #[test]
    fn directory_filter() {
        let mut block = block_with_tags(&[("yor_trace", "123")]);

        block.file_path = "/repo/src/account/main.tf".into();
        assert_eq!(
            tags_for(&groups(), &block),
            vec![Tag::new("env", "dev"), Tag::new("stack", "account")]
        );

        block.file_path = "/repo/src/account/modules/main.tf".into();
        assert!(tags_for(&groups(), &block).contains(&Tag::new("stack", "account")));

        block.file_path = "/repo/src/base/main.tf".into();
        assert_eq!(tags_for(&groups(), &block), vec![Tag::new("env", "dev")]);
    }

    #[test]
    fn tag_filter() {
        let mut block = block_with_tags(&[("yor_trace", "456")]);
        block.file_path = "src/account/main.tf".into();

        assert_eq!(tags_for(&groups(), &block), vec![Tag::new("env", "dev")]);
    }

    #[test]
    fn no_value_is_an_error() {
        let block = block_with_tags(&[]);
        let owner = ExternalTag::new("ownership", &groups()[0].tags[2]).unwrap();

        assert!(owner.applies_to(TagContext::Block(&block)));
        assert!(matches!(
            owner.calculate(TagContext::Block(&block)),
            Err(TagError::Plugin { .. })
        ));
    }
}
