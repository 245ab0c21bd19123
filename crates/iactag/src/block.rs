//! A taggable resource inside an IaC source file
use crate::locate::{hcl::HclHandle, json::JsonHandle, yaml::YamlHandle};
use crate::tags::{diff_tags, is_tag_key_match, merge_tags, Tag, TagDiff};
use std::path::PathBuf;

/// Inclusive, 1-indexed line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct Lines {
    pub start: usize,
    pub end: usize,
}

impl Lines {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start >= 1 && start <= end, "invalid line range {start}..={end}");
        Self { start, end }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> {
        self.start..=self.end
    }
}

impl std::fmt::Display for Lines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Format specific position data, only understood by the matching patch writer
#[derive(Debug, Clone)]
pub enum RawBlock {
    Hcl(HclHandle),
    Json(JsonHandle),
    Yaml(YamlHandle),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub file_path: PathBuf,
    pub existing_tags: Vec<Tag>,
    pub new_tags: Vec<Tag>,
    pub is_taggable: bool,
    pub tags_attribute_name: String,
    /// the whole block
    pub lines: Lines,
    /// just the tags attribute, `None` if the block has none
    pub tag_lines: Option<Lines>,
    /// unique within the file, e.g. `aws_s3_bucket.logs` or `LogsBucket`
    pub resource_id: String,
    pub resource_type: String,
    pub resource_name: String,
    pub raw: RawBlock,
}

impl Block {
    /// Adds computed tags
    ///
    /// A trace candidate is dropped if the block is already traced. Keys added twice keep the
    /// latest value.
    pub fn add_new_tags(&mut self, tags: impl IntoIterator<Item = Tag>, trace_key: &str) {
        let traced = self.existing_trace(trace_key).is_some();

        for tag in tags {
            if traced && is_tag_key_match(&tag.key, trace_key) {
                continue;
            }

            match self
                .new_tags
                .iter_mut()
                .find(|t| is_tag_key_match(&t.key, &tag.key))
            {
                Some(existing) => existing.value = tag.value,
                None => self.new_tags.push(tag),
            }
        }
    }

    pub fn existing_trace(&self, trace_key: &str) -> Option<&str> {
        self.existing_tags
            .iter()
            .find(|t| is_tag_key_match(&t.key, trace_key))
            .map(|t| t.value.as_str())
    }

    /// Trace identifier after this run
    pub fn trace(&self, trace_key: &str) -> Option<&str> {
        self.existing_trace(trace_key).or_else(|| {
            self.new_tags
                .iter()
                .find(|t| is_tag_key_match(&t.key, trace_key))
                .map(|t| t.value.as_str())
        })
    }

    pub fn merged_tags(&self, trace_key: &str) -> Vec<Tag> {
        merge_tags(&self.existing_tags, &self.new_tags, trace_key)
    }

    pub fn tags_diff(&self) -> TagDiff {
        diff_tags(&self.existing_tags, &self.new_tags)
    }
}
