//! CloudFormation JSON tags, the `Tags` array is written anew
use crate::block::{Block, RawBlock};
use crate::error::TagError;
use crate::locate::json::{value_string, BracketPair, JsonHandle, TAGS_ATTRIBUTE};
use crate::locate::scan::indent_at;
use crate::patch::{apply_and_validate, changed_blocks, Edit};
use crate::tags::Tag;
use serde_json::Value;
use std::path::Path;

pub fn patch(path: &Path, src: &str, blocks: &[Block], trace_key: &str) -> Result<String, TagError> {
    let mut edits = Vec::new();
    let mut expected = Vec::new();

    for block in changed_blocks(blocks) {
        let RawBlock::Json(handle) = &block.raw else {
            return Err(TagError::patch_validation(path, format!("{} is not a json resource", block.resource_id)));
        };

        let merged = block.merged_tags(trace_key);
        edits.push(block_edit(src, handle, &merged));
        expected.push((block.resource_id.clone(), merged));
    }

    apply_and_validate(path, src, edits, expected, |patched| {
        crate::locate::json::locate(path, patched)
    })
}

fn block_edit(src: &str, handle: &JsonHandle, tags: &[Tag]) -> Edit {
    let unit = indent_unit(src, &handle.resource);

    if let Some((key_offset, array)) = handle.tags {
        let layout = match handle.properties {
            Some(properties) if properties.open_line == properties.close_line => Layout::Inline,
            _ => Layout::Indented(indent_at(src, key_offset).to_string()),
        };
        return Edit::replace(array.open..array.close + 1, render_tags(tags, &handle.values, &layout, &unit));
    }

    let tags_member = |layout: &Layout| {
        format!(
            "\"{TAGS_ATTRIBUTE}\": {}",
            render_tags(tags, &handle.values, layout, &unit)
        )
    };

    match &handle.properties {
        Some(properties) => insert_first_member(src, properties, &unit, tags_member),
        None => insert_first_member(src, &handle.resource, &unit, |layout| match layout {
            Layout::Indented(indent) => {
                let inner = format!("{indent}{unit}");
                let member = tags_member(&Layout::Indented(inner.clone()));
                format!("\"Properties\": {{\n{inner}{member}\n{indent}}}")
            }
            Layout::Inline => format!("\"Properties\": {{ {} }}", tags_member(&Layout::Inline)),
        }),
    }
}

/// How an inserted value is spread over lines
#[derive(Debug, Clone, PartialEq, Eq)]
enum Layout {
    /// one member per line, the value starting on a line with this indentation
    Indented(String),
    /// everything on the line of the enclosing object
    Inline,
}

/// Indentation step of the template, taken from the resource's members
fn indent_unit(src: &str, resource: &BracketPair) -> String {
    let outer = indent_at(src, resource.open);
    let inner = &src[resource.open + 1..resource.close];
    let first_member = resource.open + 1 + (inner.len() - inner.trim_start().len());

    if src[resource.open..first_member].contains('\n') {
        let member = indent_at(src, first_member);
        if let Some(unit) = member.strip_prefix(outer).filter(|unit| !unit.is_empty()) {
            return unit.to_string();
        }
    }

    "  ".to_string()
}

/// Inserts a member at the top of an object, in the object's layout
fn insert_first_member(
    src: &str,
    scope: &BracketPair,
    unit: &str,
    render: impl Fn(&Layout) -> String,
) -> Edit {
    let scope_indent = indent_at(src, scope.open);
    let inner = &src[scope.open + 1..scope.close];

    if inner.trim().is_empty() {
        let indent = format!("{scope_indent}{unit}");
        let member = render(&Layout::Indented(indent.clone()));
        return Edit::replace(
            scope.open..scope.close + 1,
            format!("{{\n{indent}{member}\n{scope_indent}}}"),
        );
    }

    if !inner.contains('\n') {
        let pad = if inner.starts_with(char::is_whitespace) { " " } else { "" };
        return Edit::insert(scope.open + 1, format!("{pad}{},", render(&Layout::Inline)));
    }

    let first_member = scope.open + 1 + (inner.len() - inner.trim_start().len());
    let indent = if src[scope.open..first_member].contains('\n') {
        indent_at(src, first_member).to_string()
    } else {
        format!("{scope_indent}{unit}")
    };

    let member = render(&Layout::Indented(indent.clone()));
    Edit::insert(scope.open + 1, format!("\n{indent}{member},"))
}

/// `[{"Key": .., "Value": ..}, ..]`
fn render_tags(
    tags: &[Tag],
    values: &indexmap::IndexMap<String, Value>,
    layout: &Layout,
    unit: &str,
) -> String {
    let entries: Vec<(String, String)> = tags
        .iter()
        .map(|tag| {
            let value = match values.get(&tag.key) {
                Some(original) if value_string(original) == tag.value => original.to_string(),
                _ => Value::String(tag.value.clone()).to_string(),
            };
            (Value::String(tag.key.clone()).to_string(), value)
        })
        .collect();

    match layout {
        Layout::Inline => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{{ \"Key\": {key}, \"Value\": {value} }}"))
                .collect();
            format!("[{}]", entries.join(", "))
        }
        Layout::Indented(indent) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{indent}{unit}{{\n{indent}{unit}{unit}\"Key\": {key},\n{indent}{unit}{unit}\"Value\": {value}\n{indent}{unit}}}"
                    )
                })
                .collect();
            format!("[\n{}\n{indent}]", entries.join(",\n"))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::locate::json::locate;
    use crate::tags::TRACE_TAG_KEY;
    use pretty_assertions::assert_eq;

    fn tag_src(src: &str, new_tags: &[(&str, &str)]) -> String {
        let path = Path::new("template.json");
        let mut blocks = locate(path, src).unwrap();
        for block in blocks.iter_mut().filter(|b| b.is_taggable) {
            block.add_new_tags(new_tags.iter().map(|(k, v)| Tag::new(*k, *v)), TRACE_TAG_KEY);
        }
        patch(path, src, &blocks, TRACE_TAG_KEY).unwrap()
    }

    #[test]
    fn rewrites_existing_tags() {
        let src = r#"{
    "Resources": {
        "Bucket": {
            "Type": "AWS::S3::Bucket",
            "Properties": {
                "Tags": [{ "Key": "Env", "Value": { "Ref": "Env" } }, { "Key": "git_commit", "Value": "a" }],
                "BucketName": "logs"
            }
        }
    }
}
"#;

        let patched = tag_src(src, &[("git_commit", "b"), ("yor_trace", "1234")]);
        assert_eq!(
            patched,
            r#"{
    "Resources": {
        "Bucket": {
            "Type": "AWS::S3::Bucket",
            "Properties": {
                "Tags": [
                    {
                        "Key": "Env",
                        "Value": {"Ref":"Env"}
                    },
                    {
                        "Key": "git_commit",
                        "Value": "b"
                    },
                    {
                        "Key": "yor_trace",
                        "Value": "1234"
                    }
                ],
                "BucketName": "logs"
            }
        }
    }
}
"#
        );
    }

    #[test]
    fn adds_tags_to_properties() {
        let src = r#"{
  "Resources": {
    "Queue": {
      "Type": "AWS::SQS::Queue",
      "Properties": {
        "DelaySeconds": 5
      }
    },
    "Topic": {
      "Type": "AWS::SNS::Topic"
    }
  }
}
"#;

        let patched = tag_src(src, &[("yor_trace", "1234")]);
        assert_eq!(
            patched,
            r#"{
  "Resources": {
    "Queue": {
      "Type": "AWS::SQS::Queue",
      "Properties": {
        "Tags": [
          {
            "Key": "yor_trace",
            "Value": "1234"
          }
        ],
        "DelaySeconds": 5
      }
    },
    "Topic": {
      "Properties": {
        "Tags": [
          {
            "Key": "yor_trace",
            "Value": "1234"
          }
        ]
      },
      "Type": "AWS::SNS::Topic"
    }
  }
}
"#
        );

        assert_eq!(tag_src(&patched, &[("yor_trace", "5678")]), patched);
    }

    #[test]
    fn single_line_objects_stay_on_one_line() {
        let src = r#"{
  "Resources": {
    "Queue": {
      "Type": "AWS::SQS::Queue",
      "Properties": { "DelaySeconds": 5 }
    },
    "Topic": { "Type": "AWS::SNS::Topic" }
  }
}
"#;

        let patched = tag_src(src, &[("yor_trace", "1234")]);
        assert_eq!(
            patched,
            r#"{
  "Resources": {
    "Queue": {
      "Type": "AWS::SQS::Queue",
      "Properties": { "Tags": [{ "Key": "yor_trace", "Value": "1234" }], "DelaySeconds": 5 }
    },
    "Topic": { "Properties": { "Tags": [{ "Key": "yor_trace", "Value": "1234" }] }, "Type": "AWS::SNS::Topic" }
  }
}
"#
        );

        let retagged = tag_src(&patched, &[("team", "data")]);
        assert!(retagged.contains(
            r#""Properties": { "Tags": [{ "Key": "yor_trace", "Value": "1234" }, { "Key": "team", "Value": "data" }], "DelaySeconds": 5 }"#
        ));
    }

    #[test]
    fn computed_tags_are_left_alone() {
        let src = r#"{
  "Resources": {
    "Bucket": {
      "Type": "AWS::S3::Bucket",
      "Properties": {
        "Tags": { "Fn::If": ["IsProd", [{ "Key": "Env", "Value": "prod" }], { "Ref": "AWS::NoValue" }] },
        "BucketName": "logs"
      }
    }
  }
}
"#;

        assert_eq!(tag_src(src, &[("yor_trace", "1234")]), src);
    }
}
