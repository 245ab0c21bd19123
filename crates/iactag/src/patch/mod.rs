//! Non-destructive rewriting of tag regions
//!
//! Writers turn the blocks of a file into byte [Edit]s against the original text, everything
//! outside of an edit is copied verbatim. The result is located again with the same locator and
//! must contain every merged tag of every rewritten block, otherwise the write is refused with
//! [TagError::PatchValidation].
use crate::block::Block;
use crate::error::TagError;
use crate::tags::Tag;
use std::ops::Range;
use std::path::Path;

pub mod hcl;
pub mod json;
pub mod yaml;

/// Replaces `range` of the original text with `text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub text: String,
}

impl Edit {
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at..at, text)
    }
}

/// Applies non-overlapping edits
///
/// Inserts at the same offset keep their order.
pub fn apply_edits(src: &str, mut edits: Vec<Edit>) -> Result<String, String> {
    edits.sort_by_key(|edit| (edit.range.start, edit.range.end));

    let mut patched = String::with_capacity(src.len() + edits.iter().map(|e| e.text.len()).sum::<usize>());
    let mut copied_until = 0;

    for edit in edits {
        if edit.range.start < copied_until || edit.range.end > src.len() {
            return Err(format!("overlapping edit at byte {}", edit.range.start));
        }

        patched.push_str(&src[copied_until..edit.range.start]);
        patched.push_str(&edit.text);
        copied_until = edit.range.end;
    }

    patched.push_str(&src[copied_until..]);
    Ok(patched)
}

/// Blocks that need to be rewritten
pub(crate) fn changed_blocks(blocks: &[Block]) -> impl Iterator<Item = &Block> {
    blocks
        .iter()
        .filter(|block| block.is_taggable && !block.tags_diff().is_empty())
}

/// Applies `edits` and checks the result by locating the blocks again
pub(crate) fn apply_and_validate(
    path: &Path,
    src: &str,
    edits: Vec<Edit>,
    expected: Vec<(String, Vec<Tag>)>,
    relocate: impl FnOnce(&str) -> Result<Vec<Block>, TagError>,
) -> Result<String, TagError> {
    let patched = apply_edits(src, edits).map_err(|reason| TagError::patch_validation(path, reason))?;

    let relocated = relocate(&patched).map_err(|e| {
        TagError::patch_validation(path, format!("patched file can't be parsed: {e}"))
    })?;

    for (resource_id, merged) in expected {
        let block = relocated
            .iter()
            .find(|block| block.resource_id == resource_id)
            .ok_or_else(|| TagError::patch_validation(path, format!("{resource_id} is missing")))?;

        if block.tag_lines.is_none() {
            return Err(TagError::patch_validation(
                path,
                format!("{resource_id} has no tags after patching"),
            ));
        }

        if let Some(missing) = merged.iter().find(|tag| !block.existing_tags.contains(tag)) {
            return Err(TagError::patch_validation(
                path,
                format!("{resource_id} is missing tag {missing} after patching"),
            ));
        }
    }

    Ok(patched)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn edits_are_applied_in_order() {
        let patched = apply_edits(
            "abcdef",
            vec![
                Edit::replace(4..5, "E"),
                Edit::insert(0, ">"),
                Edit::insert(6, "<"),
                Edit::replace(1..3, ""),
            ],
        )
        .unwrap();

        assert_eq!(patched, ">adEf<");
    }

    #[test]
    fn overlapping_edits_are_rejected() {
        assert!(apply_edits("abcdef", vec![Edit::replace(0..3, "x"), Edit::replace(2..4, "y")]).is_err());
    }
}
