//! Tag groups: the compile-time registry of calculators
use crate::tags::external::ExternalGroupConfig;
use crate::tags::{code2cloud, external, git, simple, Tag, TagCalculator, TagContext, TRACE_TAG_KEY};
use indexmap::IndexMap;
use regex::Regex;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TagGroupName {
    /// provenance from git blame
    Git,
    /// trace identifier and resource name
    #[value(name = "code2cloud")]
    Code2Cloud,
    /// user supplied tags
    Simple,
    /// tags computed from rules of the configuration file
    External,
}

impl TagGroupName {
    pub const ALL: [TagGroupName; 4] = [
        TagGroupName::Git,
        TagGroupName::Code2Cloud,
        TagGroupName::Simple,
        TagGroupName::External,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagGroupName::Git => "git",
            TagGroupName::Code2Cloud => "code2cloud",
            TagGroupName::Simple => "simple",
            TagGroupName::External => "external",
        }
    }
}

impl std::fmt::Display for TagGroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Glob patterns (`*` matching anything) of tag keys to leave out
#[derive(Debug, Clone, Default)]
pub struct SkipPatterns {
    patterns: Vec<(String, Regex)>,
}

impl SkipPatterns {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        let patterns = globs
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|glob| {
                let escaped: Vec<String> = glob.split('*').map(regex::escape).collect();
                let regex = Regex::new(&format!("^{}$", escaped.join(".*"))).ok()?;
                Some((glob.to_string(), regex))
            })
            .collect();

        Self { patterns }
    }

    /// The first pattern matching `key`
    pub fn matching(&self, key: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(key))
            .map(|(glob, _)| glob.as_str())
    }
}

/// How calculators are set up, shared by all groups
#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    pub tag_prefix: String,
    pub skip_tags: Vec<String>,
    /// tags of the `simple` group
    pub simple_tags: IndexMap<String, String>,
    /// rules of the `external` group
    pub external: Vec<ExternalGroupConfig>,
}

impl GroupOptions {
    /// Key of the trace tag after prefixing
    pub fn trace_key(&self) -> String {
        format!("{}{TRACE_TAG_KEY}", self.tag_prefix)
    }
}

pub struct TagGroup {
    name: TagGroupName,
    calculators: Vec<Box<dyn TagCalculator>>,
}

impl std::fmt::Debug for TagGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagGroup")
            .field("name", &self.name)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TagGroup {
    pub fn new(name: TagGroupName, options: &GroupOptions) -> Self {
        let calculators = match name {
            TagGroupName::Git => git::default_calculators(),
            TagGroupName::Code2Cloud => code2cloud::default_calculators(),
            TagGroupName::Simple => simple::calculators(&options.simple_tags),
            TagGroupName::External => external::calculators(&options.external),
        };

        let skip = SkipPatterns::new(&options.skip_tags);
        let calculators = calculators
            .into_iter()
            .filter_map(|mut calculator| {
                let unprefixed = calculator.key().to_string();
                calculator.set_tag_prefix(&options.tag_prefix);

                match skip.matching(calculator.key()).or_else(|| skip.matching(&unprefixed)) {
                    Some(pattern) => {
                        tracing::info!(key = calculator.key(), pattern, "skipping tag");
                        None
                    }
                    None => Some(calculator),
                }
            })
            .collect();

        Self { name, calculators }
    }

    pub fn name(&self) -> TagGroupName {
        self.name
    }

    pub fn calculators(&self) -> &[Box<dyn TagCalculator>] {
        &self.calculators
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.calculators.iter().map(|c| c.key())
    }

    /// Tags of every calculator that applies and succeeds, failures are logged and skipped
    pub fn calculate(&self, context: TagContext<'_>) -> Vec<Tag> {
        self.calculators
            .iter()
            .filter(|calculator| {
                let applies = calculator.applies_to(context);
                if !applies {
                    tracing::debug!(group=%self.name, key = calculator.key(), "tag does not apply");
                }
                applies
            })
            .filter_map(|calculator| match calculator.calculate(context) {
                Ok(tag) => Some(tag),
                Err(e) => {
                    tracing::warn!(group=%self.name, error=%e, "tag skipped");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::test::block_with_tags;
    use pretty_assertions::assert_eq;

    #[test]
    fn skip_patterns() {
        let skip = SkipPatterns::new(&["git_*", "yor_name", "a.b"]);

        assert_eq!(skip.matching("git_commit"), Some("git_*"));
        assert_eq!(skip.matching("yor_name"), Some("yor_name"));
        assert_eq!(skip.matching("yor_trace"), None);
        assert_eq!(skip.matching("axb"), None);
    }

    #[test]
    fn groups_apply_prefix_and_skips() {
        let options = GroupOptions {
            tag_prefix: "acme_".into(),
            skip_tags: vec!["git_modifiers".into(), "*_last_modified_*".into()],
            ..Default::default()
        };

        let git = TagGroup::new(TagGroupName::Git, &options);
        assert_eq!(
            git.keys().collect::<Vec<_>>(),
            vec!["acme_git_org", "acme_git_repo", "acme_git_file", "acme_git_commit"]
        );
        assert_eq!(options.trace_key(), "acme_yor_trace");
    }

    #[test]
    fn failing_calculators_are_skipped() {
        let block = block_with_tags(&[]);
        let code2cloud = TagGroup::new(TagGroupName::Code2Cloud, &GroupOptions::default());

        // git tags need history, the block context makes every one of them fail
        let git = TagGroup::new(TagGroupName::Git, &GroupOptions::default());
        assert!(git.calculate(TagContext::Block(&block)).is_empty());

        let keys: Vec<String> = code2cloud
            .calculate(TagContext::Block(&block))
            .into_iter()
            .map(|tag| tag.key)
            .collect();
        assert_eq!(keys, vec!["yor_trace", "yor_name"]);
    }

    #[test]
    fn external_keys_are_not_prefixed() {
        let options = GroupOptions {
            tag_prefix: "acme_".into(),
            skip_tags: vec!["cost_*".into()],
            external: serde_yaml::from_str(
                r#"
- name: finance
  tags:
    - name: cost_center
      value: { default: "42" }
    - name: env
      value: { default: dev }
      filters: { tags: { team: data } }
"#,
            )
            .unwrap(),
            ..Default::default()
        };

        let external = TagGroup::new(TagGroupName::External, &options);
        assert_eq!(external.keys().collect::<Vec<_>>(), vec!["env"]);

        assert!(external.calculate(TagContext::Block(&block_with_tags(&[]))).is_empty());
        assert_eq!(
            external.calculate(TagContext::Block(&block_with_tags(&[("team", "data")]))),
            vec![Tag::new("env", "dev")]
        );
    }
}
