//! CloudFormation YAML templates and Serverless configurations
//!
//! Content comes from [serde_yaml], positions from a single line scan. Top-level keys switch the
//! scan in and out of the section holding the resources (`Resources:` or `functions:`); the first
//! line in that section naming a resource opens it, the next resource or section closes it.
use crate::block::{Block, Lines, RawBlock};
use crate::error::TagError;
use crate::locate::scan::{indentation, is_blank_or_comment, LineIndex};
use crate::schema::cloudformation_is_taggable;
use crate::tags::Tag;
use indexmap::IndexMap;
use serde_yaml::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum YamlFlavor {
    /// `Resources.<name>.Properties.Tags` as a list of `Key`/`Value` pairs
    CloudFormation,
    /// `functions.<name>.tags` as a map
    Serverless,
}

impl YamlFlavor {
    pub fn section(&self) -> &'static str {
        match self {
            YamlFlavor::CloudFormation => "Resources",
            YamlFlavor::Serverless => "functions",
        }
    }

    pub fn tags_attribute(&self) -> &'static str {
        match self {
            YamlFlavor::CloudFormation => "Tags",
            YamlFlavor::Serverless => "tags",
        }
    }

    /// Key between the resource and its tags
    pub fn tags_parent(&self) -> Option<&'static str> {
        match self {
            YamlFlavor::CloudFormation => Some("Properties"),
            YamlFlavor::Serverless => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct YamlHandle {
    pub flavor: YamlFlavor,
    /// line of the key holding the tags attribute (`Properties:` or the resource itself)
    pub parent_line: Option<usize>,
    /// parsed tag values by key, re-emitted as-is when unchanged
    pub values: IndexMap<String, Value>,
}

/// The key of a `key: value` or `key:` line
pub fn key_of(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('-') || trimmed.starts_with('#') {
        return None;
    }

    for quote in ['"', '\''] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            let (key, after) = rest.split_once(quote)?;
            return after.trim_start().starts_with(':').then_some(key);
        }
    }

    let (key, after) = trimmed.split_once(':')?;
    (after.is_empty() || after.starts_with([' ', '\t'])).then_some(key.trim_end())
}

/// Line ranges of `names` inside `section`
///
/// `headers` are the top-level keys in document order. Each header and name is matched once.
pub fn resource_lines(
    src: &str,
    headers: &[String],
    section: &str,
    names: &[String],
) -> IndexMap<String, Lines> {
    let index = LineIndex::new(src);
    let mut headers: Vec<&str> = headers.iter().map(String::as_str).collect();
    let mut names: Vec<&str> = names.iter().map(String::as_str).collect();

    let mut found = IndexMap::new();
    let mut in_section = false;
    let mut resource_indent = None;
    let mut open: Option<(&str, usize)> = None;
    let mut last_content_line = 0;

    for (number, line) in index.lines() {
        if is_blank_or_comment(line) {
            continue;
        }

        let indent = indentation(line);
        let key = key_of(line);

        if indent == 0 {
            if let Some(position) = headers.iter().position(|h| Some(*h) == key) {
                let header = headers.remove(position);
                if let Some((name, start)) = open.take() {
                    found.insert(name.to_string(), Lines::new(start, last_content_line));
                }
                in_section = header == section;
            }
        } else if in_section && resource_indent.map_or(true, |ri| ri == indent) {
            if let Some(position) = key.and_then(|key| names.iter().position(|n| *n == key)) {
                let name = names.remove(position);
                if let Some((previous, start)) = open.take() {
                    found.insert(previous.to_string(), Lines::new(start, last_content_line));
                }
                resource_indent = Some(indent);
                open = Some((name, number));
            }
        }

        last_content_line = number;
    }

    if let Some((name, start)) = open {
        found.insert(name.to_string(), Lines::new(start, last_content_line));
    }

    found
}

/// Where a resource keeps its tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRegion {
    pub parent_line: Option<usize>,
    pub tags: Option<Lines>,
}

/// Finds the tags attribute inside a resource's lines
pub fn tag_region(index: &LineIndex, resource: Lines, flavor: YamlFlavor) -> TagRegion {
    let parent = match flavor.tags_parent() {
        None => Some(resource),
        Some(parent_key) => child_key(index, resource, parent_key),
    };

    let Some(parent) = parent else {
        return TagRegion {
            parent_line: None,
            tags: None,
        };
    };

    TagRegion {
        parent_line: Some(parent.start),
        tags: child_key(index, parent, flavor.tags_attribute()),
    }
}

/// Lines of the direct child `key` of the key opening `scope`
fn child_key(index: &LineIndex, scope: Lines, key: &str) -> Option<Lines> {
    let parent_indent = indentation(index.line(scope.start));
    let content = ((scope.start + 1)..=scope.end)
        .map(|n| (n, index.line(n)))
        .filter(|(_, line)| !is_blank_or_comment(line));

    let mut first_indent = None;
    let mut start = None;
    let mut end = 0;

    for (number, line) in content {
        let indent = indentation(line);
        if indent <= parent_indent {
            break;
        }
        let child_indent = *first_indent.get_or_insert(indent);

        match start {
            None if indent == child_indent && key_of(line) == Some(key) => {
                start = Some(number);
                end = number;
            }
            None => {}
            Some(_) if indent > child_indent => end = number,
            Some(_) if indent == child_indent && line.trim_start().starts_with('-') => end = number,
            Some(_) => break,
        }
    }

    start.map(|start| Lines::new(start, end))
}

pub fn locate(path: &Path, src: &str, flavor: YamlFlavor) -> Result<Vec<Block>, TagError> {
    let document: Value = serde_yaml::from_str(src).map_err(|e| TagError::parse(path, e))?;
    let Some(root) = document.as_mapping() else {
        return Ok(vec![]);
    };
    let Some(section) = document.get(flavor.section()).and_then(Value::as_mapping) else {
        return Ok(vec![]);
    };

    let headers: Vec<String> = root.keys().filter_map(Value::as_str).map(str::to_string).collect();
    let names: Vec<String> = section.keys().filter_map(Value::as_str).map(str::to_string).collect();
    let ranges = resource_lines(src, &headers, flavor.section(), &names);
    let index = LineIndex::new(src);

    let mut blocks = Vec::new();
    for name in names {
        let (Some(lines), Some(resource)) = (ranges.get(&name).copied(), section.get(name.as_str())) else {
            tracing::warn!(path=%path.display(), resource=%name, "resource not found in template text");
            continue;
        };
        let region = tag_region(&index, lines, flavor);

        let values = existing_values(resource, flavor);
        let computed = has_computed_tags(resource, flavor);
        if computed {
            tracing::warn!(path=%path.display(), resource=%name, "tags are not a literal list, left untouched");
        }
        let (resource_type, is_taggable) = match flavor {
            YamlFlavor::CloudFormation => {
                let resource_type = resource
                    .get("Type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let taggable = region.tags.is_some() || cloudformation_is_taggable(&resource_type);
                (resource_type, taggable && !computed)
            }
            YamlFlavor::Serverless => ("AWS::Lambda::Function".to_string(), !computed),
        };

        blocks.push(Block {
            file_path: path.to_path_buf(),
            existing_tags: values
                .iter()
                .map(|(key, value)| Tag::new(key.clone(), value_string(value)))
                .collect(),
            new_tags: vec![],
            is_taggable,
            tags_attribute_name: flavor.tags_attribute().to_string(),
            lines,
            tag_lines: region.tags,
            resource_id: name.clone(),
            resource_type,
            resource_name: name,
            raw: RawBlock::Yaml(YamlHandle {
                flavor,
                parent_line: region.parent_line,
                values,
            }),
        });
    }

    Ok(blocks)
}

fn existing_values(resource: &Value, flavor: YamlFlavor) -> IndexMap<String, Value> {
    match flavor {
        YamlFlavor::CloudFormation => resource
            .get("Properties")
            .and_then(|p| p.get("Tags"))
            .and_then(Value::as_sequence)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| {
                        let key = scalar_key(tag.get("Key")?)?;
                        Some((key, tag.get("Value").cloned().unwrap_or(Value::Null)))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        YamlFlavor::Serverless => resource
            .get("tags")
            .and_then(Value::as_mapping)
            .map(|tags| {
                tags.iter()
                    .filter_map(|(key, value)| Some((scalar_key(key)?, value.clone())))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Tags built by an intrinsic function, a variable or anything else than literal entries
fn has_computed_tags(resource: &Value, flavor: YamlFlavor) -> bool {
    match flavor {
        YamlFlavor::CloudFormation => match resource.get("Properties").and_then(|p| p.get("Tags")) {
            None | Some(Value::Null) => false,
            Some(Value::Sequence(tags)) => !tags
                .iter()
                .all(|tag| tag.get("Key").and_then(scalar_key).is_some()),
            Some(_) => true,
        },
        YamlFlavor::Serverless => !matches!(resource.get("tags"), None | Some(Value::Null) | Some(Value::Mapping(_))),
    }
}

fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Scalars as plain strings, intrinsics as `!Tag value`, collections as JSON
pub fn value_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => format!("{} {}", tagged.tag, value_string(&tagged.value)),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const EBS_TEMPLATE: &str = "\
AWSTemplateFormatVersion: \"2010-09-09\"
Description: An EBS volume
Resources:
  NewVolume:
    Type: AWS::EC2::Volume
    Properties:
      Size: 100
      Encrypted: true
      AvailabilityZone: !GetAtt Ec2Instance.AvailabilityZone
      VolumeType: gp3
      Iops: 3000
      Throughput: 125
    DeletionPolicy: Snapshot
    UpdateReplacePolicy: Snapshot
Outputs:
  VolumeId:
    Value: !Ref NewVolume
";

    #[test]
    fn resource_without_tags() {
        let blocks = locate(Path::new("ebs.yaml"), EBS_TEMPLATE, YamlFlavor::CloudFormation).unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].resource_id, "NewVolume");
        assert_eq!(blocks[0].lines, Lines::new(4, 14));
        assert_eq!(blocks[0].tag_lines, None);
        assert!(blocks[0].is_taggable);

        let RawBlock::Yaml(handle) = &blocks[0].raw else {
            panic!("yaml block expected");
        };
        assert_eq!(handle.parent_line, Some(6));
    }

    #[test]
    fn resources_with_tags() {
        let src = "\
Resources:
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      Tags:
      - Key: Name
        Value: jobs

      - Key: Env
        Value: !Ref Env
      DelaySeconds: 5

  # the bucket
  Bucket:
    Type: AWS::S3::Bucket
";

        let blocks = locate(Path::new("t.yaml"), src, YamlFlavor::CloudFormation).unwrap();

        assert_eq!(blocks[0].lines, Lines::new(2, 11));
        assert_eq!(blocks[0].tag_lines, Some(Lines::new(5, 10)));
        assert_eq!(
            blocks[0].existing_tags,
            vec![Tag::new("Name", "jobs"), Tag::new("Env", "!Ref Env")]
        );
        assert_eq!(blocks[1].lines, Lines::new(14, 15));
        assert_eq!(blocks[1].tag_lines, None);
    }

    #[test]
    fn serverless_functions() {
        let src = "\
service: jobs
functions:
  worker:
    handler: worker.handle
    tags:
      team: data
  api:
    handler: api.handle
custom:
  worker: not a function
";

        let blocks = locate(Path::new("serverless.yml"), src, YamlFlavor::Serverless).unwrap();

        let summary: Vec<_> = blocks
            .iter()
            .map(|b| (b.resource_id.as_str(), b.lines, b.tag_lines))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("worker", Lines::new(3, 6), Some(Lines::new(5, 6))),
                ("api", Lines::new(7, 8), None),
            ]
        );
        assert_eq!(blocks[0].existing_tags, vec![Tag::new("team", "data")]);
    }

    #[test]
    fn computed_tags_are_not_taggable() {
        let src = "\
Resources:
  Conditional:
    Type: AWS::S3::Bucket
    Properties:
      Tags: !If
        - IsProd
        - - Key: Env
            Value: prod
        - !Ref AWS::NoValue
  Literal:
    Type: AWS::S3::Bucket
    Properties:
      Tags:
        - Key: Env
          Value: !If [IsProd, prod, dev]
";
        let blocks = locate(Path::new("t.yaml"), src, YamlFlavor::CloudFormation).unwrap();
        let taggable: Vec<_> = blocks.iter().map(|b| (b.resource_id.as_str(), b.is_taggable)).collect();
        assert_eq!(taggable, vec![("Conditional", false), ("Literal", true)]);

        let src = "\
functions:
  worker:
    handler: worker.handle
    tags: ${self:custom.tags}
";
        let blocks = locate(Path::new("serverless.yml"), src, YamlFlavor::Serverless).unwrap();
        assert!(!blocks[0].is_taggable);
    }

    #[test]
    fn keys_of_lines() {
        assert_eq!(key_of("  Tags:"), Some("Tags"));
        assert_eq!(key_of("  Tags: []"), Some("Tags"));
        assert_eq!(key_of("  \"Tags\" :"), Some("Tags"));
        assert_eq!(key_of("  - Key: a"), None);
        assert_eq!(key_of("  url: http://x"), Some("url"));
        assert_eq!(key_of("  http://x"), None);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = locate(Path::new("t.yaml"), "Resources: [", YamlFlavor::CloudFormation).unwrap_err();
        assert!(matches!(err, TagError::Parse { .. }));
    }
}
