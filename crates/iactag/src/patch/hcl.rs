//! Terraform tags, edited in place
//!
//! Only value expressions of updated keys are replaced, new keys are appended. Tags given by
//! anything but a map literal (variables, locals, module outputs) are never rewritten: new keys
//! are added through `merge()`.
use crate::block::{Block, RawBlock};
use crate::error::TagError;
use crate::locate::hcl::{HclHandle, HclItem, HclObject, HclTags, HclTagsValue};
use crate::locate::scan::indent_at;
use crate::patch::{apply_and_validate, changed_blocks, Edit};
use crate::tags::Tag;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const INDENT: &str = "  ";

pub fn patch(path: &Path, src: &str, blocks: &[Block], trace_key: &str) -> Result<String, TagError> {
    let mut edits = Vec::new();
    let mut expected = Vec::new();

    for block in changed_blocks(blocks) {
        let RawBlock::Hcl(handle) = &block.raw else {
            return Err(TagError::patch_validation(path, format!("{} is not a terraform block", block.resource_id)));
        };

        edits.extend(block_edits(src, block, handle, trace_key));
        expected.push((block.resource_id.clone(), block.merged_tags(trace_key)));
    }

    apply_and_validate(path, src, edits, expected, |patched| {
        crate::locate::hcl::locate(path, patched)
    })
}

fn block_edits(src: &str, block: &Block, handle: &HclHandle, trace_key: &str) -> Vec<Edit> {
    let Some(tags) = &handle.tags else {
        return vec![insert_attribute(src, block, handle, &block.merged_tags(trace_key))];
    };

    let diff = block.tags_diff();
    let mut edits = Vec::new();
    let mut added = diff.added;

    for update in diff.updated {
        match last_item(tags, &update.key) {
            Some(item) => edits.push(Edit::replace(item.value_span.clone(), render_string(&update.new_value))),
            None => added.push(Tag::new(update.key, update.new_value)),
        }
    }

    if added.is_empty() {
        return edits;
    }

    let indent = indent_at(src, tags.attribute_span.start);
    match &tags.value {
        HclTagsValue::Literal(object) => edits.push(append_to_object(src, object, &added, indent)),
        HclTagsValue::Merge { close_paren, .. } => {
            edits.push(append_argument(src, *close_paren, &render_object(&added, indent)))
        }
        HclTagsValue::Other => {
            edits.push(Edit::insert(tags.value_span.start, "merge("));
            edits.push(Edit::insert(
                tags.value_span.end,
                format!(", {})", render_object(&added, indent)),
            ));
        }
    }

    edits
}

/// The item defining `key`, later maps of a `merge()` take precedence
fn last_item<'a>(tags: &'a HclTags, key: &str) -> Option<&'a HclItem> {
    tags.objects()
        .iter()
        .rev()
        .find_map(|object| object.items.iter().rev().find(|item| item.key == key))
}

/// Adds a new tags attribute as the last attribute of the block
fn insert_attribute(src: &str, block: &Block, handle: &HclHandle, tags: &[Tag]) -> Edit {
    let block_indent = indent_at(src, handle.block_span.start);
    let close = handle.block_span.end.saturating_sub(1);
    let line_start = src[..close].rfind('\n').map(|i| i + 1).unwrap_or(0);

    let body_indent = sibling_indent(src, handle).unwrap_or_else(|| format!("{block_indent}{INDENT}"));
    let attribute = format!(
        "{body_indent}{} = {}",
        block.tags_attribute_name,
        render_object(tags, &body_indent)
    );

    if src[line_start..close].trim().is_empty() && line_start > handle.block_span.start {
        Edit::insert(line_start, format!("{attribute}\n"))
    } else {
        Edit::insert(close, format!("\n{attribute}\n{block_indent}"))
    }
}

/// Indentation of the first line inside the block body
fn sibling_indent(src: &str, handle: &HclHandle) -> Option<String> {
    let body = &src[handle.block_span.clone()];
    let first_line = body.lines().skip(1).find(|line| !line.trim().is_empty())?;
    let trimmed = first_line.trim_start();
    (!trimmed.starts_with('}')).then(|| first_line[..first_line.len() - trimmed.len()].to_string())
}

fn append_to_object(src: &str, object: &HclObject, tags: &[Tag], indent: &str) -> Edit {
    let Some(last) = object.items.last() else {
        return Edit::replace(object.span.clone(), render_object(tags, indent));
    };

    let close = object.span.end.saturating_sub(1);
    let after_value = &src[last.value_span.end..close];
    let uses_commas = after_value.trim_start_matches([' ', '\t']).starts_with(',');

    if !src[object.span.clone()].contains('\n') {
        // { a = "1", b = "2" }
        let anchor = src[..close].trim_end().len();
        let entries: Vec<String> = tags.iter().map(|tag| render_entry(tag, 0)).collect();
        let text = if src[..anchor].ends_with(',') {
            format!(" {},", entries.join(", "))
        } else {
            format!(", {}", entries.join(", "))
        };
        return Edit::insert(anchor, text);
    }

    let item_indent = indent_at(src, last.value_span.start);
    let item_line_start = src[..last.value_span.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    // pad new keys so their `=` lines up with the last entry's
    let key_width = src[item_line_start..last.value_span.start]
        .find('=')
        .unwrap_or(0)
        .saturating_sub(item_indent.len() + 1);

    let mut text = String::new();
    for tag in tags {
        text.push('\n');
        text.push_str(item_indent);
        text.push_str(&render_entry(tag, key_width));
        if uses_commas {
            text.push(',');
        }
    }

    // after the last entry's line, unless the closing brace shares it
    let insert_at = match after_value.find('\n') {
        Some(newline) => last.value_span.end + newline,
        None => last.value_span.end + after_value.len() - after_value.trim_start_matches([' ', '\t', ',']).len(),
    };
    Edit::insert(insert_at, text)
}

/// Adds a map as the last argument of a function call
fn append_argument(src: &str, close_paren: usize, object: &str) -> Edit {
    let anchor = src[..close_paren].trim_end().len();
    if src[..anchor].ends_with(',') {
        Edit::insert(anchor, format!(" {object},"))
    } else {
        Edit::insert(anchor, format!(", {object}"))
    }
}

/// Multi-line map literal, `=` aligned like `terraform fmt` does
fn render_object(tags: &[Tag], indent: &str) -> String {
    if tags.is_empty() {
        return "{}".to_string();
    }

    let width = tags.iter().map(|tag| render_key(&tag.key).len()).max().unwrap_or(0);
    let mut rendered = String::from("{\n");
    for tag in tags {
        rendered.push_str(indent);
        rendered.push_str(INDENT);
        rendered.push_str(&render_entry(tag, width));
        rendered.push('\n');
    }
    rendered.push_str(indent);
    rendered.push('}');
    rendered
}

/// `key = "value"` with the key padded to `width`
fn render_entry(tag: &Tag, width: usize) -> String {
    format!(
        "{:width$} = {}",
        render_key(&tag.key),
        render_string(&tag.value),
        width = width
    )
}

fn render_key(key: &str) -> String {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let identifier = IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"));

    if identifier.is_match(key) {
        key.to_string()
    } else {
        render_string(key)
    }
}

fn render_string(value: &str) -> String {
    hcl::format::to_string(&hcl::Expression::String(value.to_string()))
        .unwrap_or_else(|_| format!("{value:?}"))
}
