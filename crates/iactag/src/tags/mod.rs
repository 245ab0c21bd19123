//! Tag model, merge/diff rules and the calculators producing new tags
//!
//! A [Tag] is an immutable key/value pair. Calculators ([TagCalculator]) produce tags for a
//! block, either from its git history ([TagContext::Blame]) or from the block itself
//! ([TagContext::Block]). Calculators are organized in [group::TagGroup]s.
//!
//! [merge_tags] and [diff_tags] decide what ends up in the file:
//! - existing tags keep their position, new keys are appended
//! - the trace tag is never overwritten once present
//! - every other key takes the newly computed value
use crate::block::Block;
use crate::error::TagError;
use crate::git::GitBlame;
use indexmap::IndexMap;

pub mod code2cloud;
pub mod external;
pub mod git;
pub mod group;
pub mod simple;

pub const TRACE_TAG_KEY: &str = "yor_trace";
pub const NAME_TAG_KEY: &str = "yor_name";
pub const GIT_ORG_TAG_KEY: &str = "git_org";
pub const GIT_REPO_TAG_KEY: &str = "git_repo";
pub const GIT_FILE_TAG_KEY: &str = "git_file";
pub const GIT_COMMIT_TAG_KEY: &str = "git_commit";
pub const GIT_MODIFIERS_TAG_KEY: &str = "git_modifiers";
pub const GIT_LAST_MODIFIED_AT_TAG_KEY: &str = "git_last_modified_at";
pub const GIT_LAST_MODIFIED_BY_TAG_KEY: &str = "git_last_modified_by";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// What a calculator gets to look at
#[derive(Debug, Clone, Copy)]
pub enum TagContext<'a> {
    /// history of the block's lines
    Blame(&'a GitBlame),
    /// the parsed block itself
    Block(&'a Block),
}

/// Produces the value of exactly one tag key
///
/// Construction takes the place of an init step, the key is fixed afterwards except for a prefix.
pub trait TagCalculator: Send + Sync {
    fn key(&self) -> &str;

    fn description(&self) -> &str;

    fn set_tag_prefix(&mut self, prefix: &str);

    /// Whether the tag belongs on the block at all, checked before [TagCalculator::calculate]
    fn applies_to(&self, _context: TagContext<'_>) -> bool {
        true
    }

    fn calculate(&self, context: TagContext<'_>) -> Result<Tag, TagError>;
}

/// Tolerates quoted keys: `"Name"` matches `Name`
pub fn is_tag_key_match(key: &str, expected: &str) -> bool {
    unquote(key) == unquote(expected)
}

pub(crate) fn unquote(key: &str) -> &str {
    let key = key.trim();
    key.strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key)
}

/// Merges newly computed tags into existing ones
///
/// Existing order is preserved and new keys are appended in their original order. A key present in
/// both takes the new value, except for `trace_key` which keeps the existing value.
pub fn merge_tags(existing: &[Tag], new: &[Tag], trace_key: &str) -> Vec<Tag> {
    let mut remaining: IndexMap<&str, &str> = IndexMap::new();
    for tag in new {
        remaining.insert(unquote(&tag.key), tag.value.as_str());
    }

    let mut merged = Vec::with_capacity(existing.len() + remaining.len());
    for tag in existing {
        let key = unquote(&tag.key);
        match remaining.shift_remove(key) {
            Some(_) if is_tag_key_match(key, trace_key) => merged.push(tag.clone()),
            Some(value) => merged.push(Tag::new(tag.key.clone(), value)),
            None => merged.push(tag.clone()),
        }
    }

    merged.extend(remaining.into_iter().map(|(key, value)| Tag::new(key, value)));
    merged
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct TagUpdate {
    pub key: String,
    pub prev_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct TagDiff {
    pub added: Vec<Tag>,
    pub updated: Vec<TagUpdate>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }
}

pub fn diff_tags(existing: &[Tag], new: &[Tag]) -> TagDiff {
    let mut diff = TagDiff::default();

    for tag in new {
        match existing.iter().find(|e| is_tag_key_match(&e.key, &tag.key)) {
            None => diff.added.push(tag.clone()),
            Some(prev) if prev.value != tag.value => diff.updated.push(TagUpdate {
                key: tag.key.clone(),
                prev_value: prev.value.clone(),
                new_value: tag.value.clone(),
            }),
            Some(_) => {}
        }
    }

    diff
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
    }

    #[test]
    fn merge_appends_new_keys_after_existing() {
        let merged = merge_tags(
            &tags(&[("MyTag", "TagValue")]),
            &tags(&[("yor_trace", "X"), ("git_last_modified_at", "T")]),
            TRACE_TAG_KEY,
        );

        assert_eq!(
            merged,
            tags(&[
                ("MyTag", "TagValue"),
                ("yor_trace", "X"),
                ("git_last_modified_at", "T")
            ])
        );
    }

    #[test]
    fn merge_keeps_existing_trace() {
        let merged = merge_tags(
            &tags(&[("yor_trace", "old"), ("git_commit", "a")]),
            &tags(&[("git_commit", "b"), ("yor_trace", "new")]),
            TRACE_TAG_KEY,
        );

        assert_eq!(merged, tags(&[("yor_trace", "old"), ("git_commit", "b")]));
    }

    #[test]
    fn merge_keeps_position_of_updated_keys() {
        let merged = merge_tags(
            &tags(&[("a", "1"), ("b", "2"), ("c", "3")]),
            &tags(&[("d", "4"), ("b", "20")]),
            TRACE_TAG_KEY,
        );

        assert_eq!(merged, tags(&[("a", "1"), ("b", "20"), ("c", "3"), ("d", "4")]));
    }

    #[test]
    fn merge_with_empty_inputs() {
        assert_eq!(merge_tags(&[], &[], TRACE_TAG_KEY), vec![]);
        assert_eq!(
            merge_tags(&[], &tags(&[("a", "1")]), TRACE_TAG_KEY),
            tags(&[("a", "1")])
        );
        assert_eq!(
            merge_tags(&tags(&[("a", "1")]), &[], TRACE_TAG_KEY),
            tags(&[("a", "1")])
        );
    }

    #[test]
    fn merge_respects_prefixed_trace_key() {
        let merged = merge_tags(
            &tags(&[("acme_yor_trace", "old")]),
            &tags(&[("acme_yor_trace", "new")]),
            "acme_yor_trace",
        );

        assert_eq!(merged, tags(&[("acme_yor_trace", "old")]));
    }

    #[test]
    fn diff_reports_added_and_updated() {
        let diff = diff_tags(
            &tags(&[("a", "1"), ("b", "2")]),
            &tags(&[("a", "1"), ("b", "3"), ("c", "4")]),
        );

        assert_eq!(
            diff,
            TagDiff {
                added: tags(&[("c", "4")]),
                updated: vec![TagUpdate {
                    key: "b".into(),
                    prev_value: "2".into(),
                    new_value: "3".into(),
                }],
            }
        );
    }

    #[test]
    fn diff_of_identical_sets_is_empty() {
        let same = tags(&[("a", "1")]);
        assert!(diff_tags(&same, &same).is_empty());
    }

    #[test]
    fn key_match_tolerates_quotes() {
        assert!(is_tag_key_match("\"Name\"", "Name"));
        assert!(is_tag_key_match("Name", "Name"));
        assert!(!is_tag_key_match("Names", "Name"));
    }
}
