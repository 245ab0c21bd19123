//! CloudFormation JSON templates
//!
//! The template is parsed with [serde_json] for its content and scanned once for matching brackets
//! for positions. A key's scope is the first bracket pair opening after the key.
use crate::block::{Block, Lines, RawBlock};
use crate::error::TagError;
use crate::locate::scan::LineIndex;
use crate::schema::cloudformation_is_taggable;
use crate::tags::Tag;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

pub const TAGS_ATTRIBUTE: &str = "Tags";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

/// Matching open and close bracket, offsets in bytes, lines 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketPair {
    pub shape: Shape,
    pub open: usize,
    pub close: usize,
    pub open_line: usize,
    pub close_line: usize,
}

impl BracketPair {
    pub fn lines(&self) -> Lines {
        Lines::new(self.open_line, self.close_line)
    }

    fn contains(&self, offset: usize) -> bool {
        self.open < offset && offset < self.close
    }
}

/// All bracket pairs of a document, ordered by their opening offset
#[derive(Debug, Clone, Default)]
pub struct BracketPairs {
    pairs: Vec<BracketPair>,
}

impl BracketPairs {
    /// Scans `src` once, brackets inside string literals are ignored
    pub fn scan(src: &str) -> Self {
        let mut pairs = Vec::new();
        let mut objects: Vec<(usize, usize)> = Vec::new();
        let mut arrays: Vec<(usize, usize)> = Vec::new();
        let mut line = 1;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, ch) in src.char_indices() {
            if ch == '\n' {
                line += 1;
            }

            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            let (stack, shape) = match ch {
                '"' => {
                    in_string = true;
                    continue;
                }
                '{' => {
                    objects.push((offset, line));
                    continue;
                }
                '[' => {
                    arrays.push((offset, line));
                    continue;
                }
                '}' => (&mut objects, Shape::Object),
                ']' => (&mut arrays, Shape::Array),
                _ => continue,
            };

            if let Some((open, open_line)) = stack.pop() {
                pairs.push(BracketPair {
                    shape,
                    open,
                    close: offset,
                    open_line,
                    close_line: line,
                });
            }
        }

        pairs.sort_by_key(|pair| pair.open);
        Self { pairs }
    }

    /// The outermost pair
    pub fn root(&self) -> Option<&BracketPair> {
        self.pairs.first()
    }

    /// Innermost pair containing `offset`
    pub fn enclosing(&self, offset: usize) -> Option<&BracketPair> {
        let candidates = &self.pairs[..self.pairs.partition_point(|pair| pair.open < offset)];
        candidates.iter().rev().find(|pair| pair.contains(offset))
    }

    /// First pair opening after `offset`
    pub fn first_after(&self, offset: usize) -> Option<&BracketPair> {
        self.pairs.get(self.pairs.partition_point(|pair| pair.open <= offset))
    }

    /// Value scope of `key` as a direct member of `outer`
    ///
    /// Returns the key's offset and the pair of its value. Keys with scalar values have no scope.
    pub fn key_scope(&self, src: &str, key: &str, outer: &BracketPair) -> Option<(usize, BracketPair)> {
        let pattern = Regex::new(&format!(r#""{}"\s*:"#, regex::escape(key))).ok()?;
        let inner_start = outer.open + 1;

        let found = pattern
            .find_iter(&src[inner_start..outer.close])
            .map(|m| (inner_start + m.start(), inner_start + m.end()))
            .find(|(key_offset, _)| self.enclosing(*key_offset) == Some(outer))
            .and_then(|(key_offset, colon_end)| {
                let value = self.first_after(colon_end)?;
                let between = &src[colon_end..value.open];
                (value.close < outer.close && between.trim().is_empty()).then_some((key_offset, *value))
            });
        found
    }
}

#[derive(Debug, Clone)]
pub struct JsonHandle {
    pub resource: BracketPair,
    pub properties: Option<BracketPair>,
    /// offset of the `"Tags"` key and the array it opens
    pub tags: Option<(usize, BracketPair)>,
    /// parsed tag values by key, re-emitted as-is when unchanged
    pub values: IndexMap<String, Value>,
}

pub fn locate(path: &Path, src: &str) -> Result<Vec<Block>, TagError> {
    let template: Value = serde_json::from_str(src).map_err(|e| TagError::parse(path, e))?;
    let Some(resources) = template.get("Resources").and_then(Value::as_object) else {
        return Ok(vec![]);
    };

    let pairs = BracketPairs::scan(src);
    let resources_scope = pairs
        .root()
        .and_then(|root| pairs.key_scope(src, "Resources", root))
        .map(|(_, scope)| scope)
        .ok_or_else(|| TagError::parse(path, "Resources section not found"))?;

    let index = LineIndex::new(src);
    let mut blocks = Vec::new();
    for (name, resource) in resources {
        let Some((_, scope)) = pairs.key_scope(src, name, &resources_scope) else {
            tracing::warn!(path=%path.display(), resource=%name, "resource not found in template text");
            continue;
        };

        let properties = pairs
            .key_scope(src, "Properties", &scope)
            .map(|(_, scope)| scope);
        let tags = properties.and_then(|properties| pairs.key_scope(src, TAGS_ATTRIBUTE, &properties));

        let values = existing_values(resource);
        let computed = has_computed_tags(resource);
        if computed {
            tracing::warn!(path=%path.display(), resource=%name, "tags are not a literal list, left untouched");
        }
        let resource_type = resource
            .get("Type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        blocks.push(Block {
            file_path: path.to_path_buf(),
            existing_tags: values
                .iter()
                .map(|(key, value)| Tag::new(key.clone(), value_string(value)))
                .collect(),
            new_tags: vec![],
            is_taggable: !computed && (tags.is_some() || cloudformation_is_taggable(&resource_type)),
            tags_attribute_name: TAGS_ATTRIBUTE.to_string(),
            lines: scope.lines(),
            tag_lines: tags.map(|(key_offset, array)| Lines::new(index.line_of(key_offset), array.close_line)),
            resource_id: name.clone(),
            resource_type,
            resource_name: name.clone(),
            raw: RawBlock::Json(JsonHandle {
                resource: scope,
                properties,
                tags,
                values,
            }),
        });
    }

    Ok(blocks)
}

fn existing_values(resource: &Value) -> IndexMap<String, Value> {
    resource
        .pointer("/Properties/Tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| {
                    let key = tag.get("Key")?.as_str()?;
                    Some((key.to_string(), tag.get("Value").cloned().unwrap_or(Value::Null)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Tags built by an intrinsic function, a parameter or anything else than `Key`/`Value` objects
fn has_computed_tags(resource: &Value) -> bool {
    match resource.pointer("/Properties/Tags") {
        None => false,
        Some(Value::Array(tags)) => !tags.iter().all(|tag| tag.get("Key").is_some_and(Value::is_string)),
        Some(_) => true,
    }
}

/// Scalars as plain strings, anything else as compact JSON
pub fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = r#"{
  "AWSTemplateFormatVersion": "2010-09-09",
  "Resources": {
    "Bucket": {
      "Type": "AWS::S3::Bucket",
      "Properties": {
        "BucketName": { "Fn::Sub": "logs-${AWS::AccountId}" },
        "Tags": [
          { "Key": "Name", "Value": "logs" },
          { "Key": "Env", "Value": { "Ref": "Env" } }
        ]
      }
    },
    "Policy": {
      "Type": "AWS::S3::BucketPolicy",
      "Properties": {
        "Bucket": { "Ref": "Bucket" }
      }
    }
  }
}
"#;

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let pairs = BracketPairs::scan(r#"{"a": "}{[", "b": [1]}"#);
        let shapes: Vec<_> = pairs.pairs.iter().map(|p| (p.shape, p.open, p.close)).collect();
        assert_eq!(shapes, vec![(Shape::Object, 0, 21), (Shape::Array, 18, 20)]);
    }

    #[test]
    fn key_scope_only_matches_direct_members() {
        let pairs = BracketPairs::scan(TEMPLATE);
        let root = *pairs.root().unwrap();
        let (_, resources) = pairs.key_scope(TEMPLATE, "Resources", &root).unwrap();
        let (_, bucket) = pairs.key_scope(TEMPLATE, "Bucket", &resources).unwrap();

        // "Bucket" also appears as a property of the policy, which comes later
        assert_eq!(bucket.lines(), Lines::new(4, 13));
        assert!(pairs.key_scope(TEMPLATE, "Tags", &root).is_none());
    }

    #[test]
    fn locates_resources_and_tags() {
        let blocks = locate(Path::new("template.json"), TEMPLATE).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].resource_id, "Bucket");
        assert_eq!(blocks[0].lines, Lines::new(4, 13));
        assert_eq!(blocks[0].tag_lines, Some(Lines::new(8, 11)));
        assert_eq!(
            blocks[0].existing_tags,
            vec![Tag::new("Name", "logs"), Tag::new("Env", r#"{"Ref":"Env"}"#)]
        );

        assert_eq!(blocks[1].resource_id, "Policy");
        assert_eq!(blocks[1].lines, Lines::new(14, 19));
        assert_eq!(blocks[1].tag_lines, None);
        assert!(!blocks[1].is_taggable);
    }

    #[test]
    fn computed_tags_are_not_taggable() {
        let template = r#"{
  "Resources": {
    "Conditional": {
      "Type": "AWS::S3::Bucket",
      "Properties": {
        "Tags": { "Fn::If": ["IsProd", [{ "Key": "Env", "Value": "prod" }], { "Ref": "AWS::NoValue" }] }
      }
    },
    "Mixed": {
      "Type": "AWS::S3::Bucket",
      "Properties": {
        "Tags": [{ "Key": "Name", "Value": "logs" }, { "Fn::If": ["IsProd", { "Key": "Env", "Value": "prod" }, { "Ref": "AWS::NoValue" }] }]
      }
    },
    "Parameter": {
      "Type": "AWS::S3::Bucket",
      "Properties": { "Tags": "none" }
    }
  }
}
"#;
        let blocks = locate(Path::new("template.json"), template).unwrap();

        let taggable: Vec<(&str, bool)> = blocks
            .iter()
            .map(|block| (block.resource_id.as_str(), block.is_taggable))
            .collect();
        assert_eq!(
            taggable,
            vec![("Conditional", false), ("Mixed", false), ("Parameter", false)]
        );
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = locate(Path::new("template.json"), "{\"Resources\": ").unwrap_err();
        assert!(matches!(err, TagError::Parse { .. }));
    }
}
