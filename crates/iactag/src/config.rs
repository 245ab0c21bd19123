//! Run configuration
//!
//! A [TaggerConfig] is read from a YAML file and then overridden by command line flags. Every field
//! is optional in the file.
use crate::tags::external::ExternalGroupConfig;
use crate::tags::group::{GroupOptions, TagGroupName};
use crate::tags::simple;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Directories never descended into
pub const IGNORED_DIRS: &[&str] = &[".git", ".terraform", ".idea", ".DS_Store"];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Invalid config file {}", .0.display())]
    Yaml(PathBuf, #[source] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaggerConfig {
    pub tag_groups: Vec<TagGroupName>,
    /// glob patterns of tag keys to leave out
    pub skip_tags: Vec<String>,
    /// prepended to every calculated tag key
    pub tag_prefix: String,
    /// static tags of the `simple` group
    pub tags: IndexMap<String, String>,
    pub skip_resource_types: Vec<String>,
    /// resource ids like `aws_s3_bucket.logs` or `LogsBucket`
    pub skip_resources: Vec<String>,
    pub skip_dirs: Vec<PathBuf>,
    /// output of `terraform providers schema -json`
    pub terraform_schema: Option<PathBuf>,
    pub dry_run: bool,
    /// rules of the `external` group
    pub external_tag_groups: Vec<ExternalGroupConfig>,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            tag_groups: TagGroupName::ALL.to_vec(),
            skip_tags: vec![],
            tag_prefix: String::new(),
            tags: IndexMap::new(),
            skip_resource_types: vec![],
            skip_resources: vec![],
            skip_dirs: vec![],
            terraform_schema: None,
            dry_run: false,
            external_tag_groups: vec![],
        }
    }
}

impl TaggerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_yaml(&yaml).map_err(|e| ConfigError::Yaml(path.to_path_buf(), e))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // an empty file is an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Adds tags from [simple::SIMPLE_TAGS_ENV], configured tags take precedence
    pub fn with_env_tags(mut self) -> Self {
        for (key, value) in simple::tags_from_env() {
            self.tags.entry(key).or_insert(value);
        }
        self
    }

    pub fn group_options(&self) -> GroupOptions {
        GroupOptions {
            tag_prefix: self.tag_prefix.clone(),
            skip_tags: self.skip_tags.clone(),
            simple_tags: self.tags.clone(),
            external: self.external_tag_groups.clone(),
        }
    }

    pub fn is_skipped_dir(&self, name: &str, path: &Path) -> bool {
        IGNORED_DIRS.contains(&name)
            || self
                .skip_dirs
                .iter()
                .any(|skipped| path.ends_with(skipped) || path.starts_with(skipped))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = TaggerConfig::from_yaml("").unwrap();
        assert_eq!(config, TaggerConfig::default());
        assert_eq!(config.tag_groups, TagGroupName::ALL.to_vec());
    }

    #[test]
    fn from_yaml() {
        let config = TaggerConfig::from_yaml(
            r#"
tag_groups: [code2cloud, simple]
tag_prefix: acme_
tags:
  team: platform
skip_tags: ["git_*"]
skip_resources: [aws_s3_bucket.logs]
dry_run: true
"#,
        )
        .unwrap();

        assert_eq!(config.tag_groups, vec![TagGroupName::Code2Cloud, TagGroupName::Simple]);
        assert_eq!(config.tag_prefix, "acme_");
        assert_eq!(config.tags.get("team").map(String::as_str), Some("platform"));
        assert_eq!(config.group_options().trace_key(), "acme_yor_trace");
        assert!(config.dry_run);
    }

    #[test]
    fn external_tag_groups() {
        let config = TaggerConfig::from_yaml(
            r#"
tag_groups: [external]
external_tag_groups:
  - name: ownership
    tags:
      - name: env
        value:
          default: dev
          matches:
            - prod: { tags: { git_repo: [infra, platform] } }
        filters:
          directory: services
"#,
        )
        .unwrap();

        assert_eq!(config.tag_groups, vec![TagGroupName::External]);
        let options = config.group_options();
        assert_eq!(options.external[0].name, "ownership");
        assert_eq!(options.external[0].tags[0].filters.directory, Some(PathBuf::from("services")));

        assert!(TaggerConfig::from_yaml("external_tag_groups: [{name: x, tags: [{name: y, valu: z}]}]").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(TaggerConfig::from_yaml("tag_group: [git]").is_err());
    }

    #[test]
    fn skipped_dirs() {
        let config = TaggerConfig {
            skip_dirs: vec!["modules/legacy".into()],
            ..Default::default()
        };

        assert!(config.is_skipped_dir(".terraform", Path::new("env/.terraform")));
        assert!(config.is_skipped_dir("legacy", Path::new("modules/legacy")));
        assert!(!config.is_skipped_dir("network", Path::new("modules/network")));
    }
}
