//! CloudFormation YAML and Serverless tags
//!
//! An existing tags attribute is rewritten line by line with the indentation it already uses, a
//! missing one is added as the first child of its parent (`Properties:` or the function), creating
//! `Properties:` when needed.
use crate::block::{Block, RawBlock};
use crate::error::TagError;
use crate::locate::scan::{indent_of, indentation, is_blank_or_comment, LineIndex};
use crate::locate::yaml::{value_string, YamlFlavor, YamlHandle};
use crate::patch::{apply_and_validate, changed_blocks, Edit};
use crate::tags::Tag;
use serde_yaml::Value;
use std::path::Path;

pub fn patch(
    path: &Path,
    src: &str,
    blocks: &[Block],
    flavor: YamlFlavor,
    trace_key: &str,
) -> Result<String, TagError> {
    let index = LineIndex::new(src);
    let mut edits = Vec::new();
    let mut expected = Vec::new();

    for block in changed_blocks(blocks) {
        let RawBlock::Yaml(handle) = &block.raw else {
            return Err(TagError::patch_validation(path, format!("{} is not a yaml resource", block.resource_id)));
        };

        let merged = block.merged_tags(trace_key);
        edits.push(block_edit(&index, block, handle, &merged));
        expected.push((block.resource_id.clone(), merged));
    }

    apply_and_validate(path, src, edits, expected, |patched| {
        crate::locate::yaml::locate(path, patched, flavor)
    })
}

fn block_edit(index: &LineIndex, block: &Block, handle: &YamlHandle, tags: &[Tag]) -> Edit {
    let flavor = handle.flavor;
    let unit = indent_unit(index, block.lines.start);
    let attribute = flavor.tags_attribute();

    if let Some(tag_lines) = block.tag_lines {
        let indent = indent_of(index.line(tag_lines.start));
        let entry_indent = ((tag_lines.start + 1)..=tag_lines.end)
            .map(|n| index.line(n))
            .find(|line| !is_blank_or_comment(line))
            .map(|line| indent_of(line).to_string())
            .unwrap_or_else(|| format!("{indent}{unit}"));

        return Edit::replace(
            index.span_of_lines(tag_lines.start, tag_lines.end),
            format!("{indent}{attribute}:{}", render_entries(handle, tags, &entry_indent)),
        );
    }

    match (handle.parent_line, flavor.tags_parent()) {
        (Some(parent), _) => {
            let indent = child_indent(index, parent)
                .unwrap_or_else(|| format!("{}{unit}", indent_of(index.line(parent))));
            let entries = render_entries(handle, tags, &format!("{indent}{unit}"));
            Edit::insert(index.line_end(parent), format!("\n{indent}{attribute}:{entries}"))
        }
        (None, parent_key) => {
            let resource = block.lines.start;
            let indent = child_indent(index, resource)
                .unwrap_or_else(|| format!("{}{unit}", indent_of(index.line(resource))));

            let text = match parent_key {
                Some(parent_key) => {
                    let tags_indent = format!("{indent}{unit}");
                    let entries = render_entries(handle, tags, &format!("{tags_indent}{unit}"));
                    format!("\n{indent}{parent_key}:\n{tags_indent}{attribute}:{entries}")
                }
                None => {
                    let entries = render_entries(handle, tags, &format!("{indent}{unit}"));
                    format!("\n{indent}{attribute}:{entries}")
                }
            };
            Edit::insert(index.line_end(resource), text)
        }
    }
}

/// Indentation of the first content line below `line`, if it is nested under it
fn child_indent(index: &LineIndex, line: usize) -> Option<String> {
    let parent = indentation(index.line(line));
    ((line + 1)..=index.line_count())
        .map(|n| index.line(n))
        .find(|l| !is_blank_or_comment(l))
        .filter(|l| indentation(l) > parent)
        .map(|l| indent_of(l).to_string())
}

/// Indentation step of the document, taken from the resource's children
fn indent_unit(index: &LineIndex, resource_line: usize) -> String {
    let resource_indent = indent_of(index.line(resource_line));
    child_indent(index, resource_line)
        .and_then(|child| {
            child
                .strip_prefix(resource_indent)
                .filter(|unit| !unit.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "  ".to_string())
}

/// One line per entry, each starting with a line break
fn render_entries(handle: &YamlHandle, tags: &[Tag], indent: &str) -> String {
    let mut rendered = String::new();
    for tag in tags {
        let key = render_scalar(&tag.key);
        let value = match handle.values.get(&tag.key) {
            Some(original) if value_string(original) == tag.value => render_original(original),
            _ => render_scalar(&tag.value),
        };

        match handle.flavor {
            YamlFlavor::CloudFormation => {
                rendered.push_str(&format!("\n{indent}- Key: {key}\n{indent}  Value: {value}"))
            }
            YamlFlavor::Serverless => rendered.push_str(&format!("\n{indent}{key}: {value}")),
        }
    }
    rendered
}

/// Unchanged values keep their type and intrinsic function tags
fn render_original(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => render_scalar(s),
        Value::Tagged(tagged) => format!("{} {}", tagged.tag, render_original(&tagged.value)),
        Value::Sequence(_) | Value::Mapping(_) => value_string(value),
    }
}

/// Single-line YAML string, quoted only when it would not read back as the same string
fn render_scalar(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(rendered) if !rendered.trim_end().is_empty() && !rendered.trim_end().contains('\n') => {
            rendered.trim_end().to_string()
        }
        _ => serde_json::Value::String(value.to_string()).to_string(),
    }
}
