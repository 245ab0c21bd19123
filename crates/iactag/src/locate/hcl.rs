//! Terraform resource blocks and their tags attribute
//!
//! Positions come straight from the [hcl_edit] syntax tree. Spans exclude decor (whitespace and
//! comments), so a span always starts at the first significant character.
use crate::block::{Block, Lines, RawBlock};
use crate::error::TagError;
use crate::locate::scan::LineIndex;
use crate::schema::terraform_tags_attribute;
use crate::tags::Tag;
use hcl_edit::expr::{Expression, Object, ObjectKey};
use hcl_edit::repr::Span;
use hcl_edit::structure::Attribute;
use indexmap::IndexMap;
use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct HclHandle {
    pub block_span: Range<usize>,
    pub tags: Option<HclTags>,
}

/// The tags attribute of a block
#[derive(Debug, Clone)]
pub struct HclTags {
    pub attribute_span: Range<usize>,
    pub value_span: Range<usize>,
    pub value: HclTagsValue,
}

#[derive(Debug, Clone)]
pub enum HclTagsValue {
    /// `tags = { ... }`
    Literal(HclObject),
    /// `tags = merge(...)`, only the literal map arguments are known
    Merge {
        objects: Vec<HclObject>,
        close_paren: usize,
    },
    /// a reference, local, module output, conditional...
    Other,
}

/// An object literal and its entries
#[derive(Debug, Clone)]
pub struct HclObject {
    pub span: Range<usize>,
    pub items: Vec<HclItem>,
}

#[derive(Debug, Clone)]
pub struct HclItem {
    pub key: String,
    pub value: String,
    pub value_span: Range<usize>,
}

impl HclTags {
    pub fn objects(&self) -> &[HclObject] {
        match &self.value {
            HclTagsValue::Literal(object) => std::slice::from_ref(object),
            HclTagsValue::Merge { objects, .. } => objects,
            HclTagsValue::Other => &[],
        }
    }

    /// Tags known from literal maps, later maps override earlier ones
    pub fn literal_tags(&self) -> Vec<Tag> {
        let mut tags: IndexMap<&str, &str> = IndexMap::new();
        for item in self.objects().iter().flat_map(|o| &o.items) {
            tags.insert(&item.key, &item.value);
        }

        tags.into_iter().map(|(k, v)| Tag::new(k, v)).collect()
    }
}

pub fn locate(path: &Path, src: &str) -> Result<Vec<Block>, TagError> {
    let body = hcl_edit::parser::parse_body(src).map_err(|e| TagError::parse(path, e))?;
    let index = LineIndex::new(src);
    let mut blocks = Vec::new();

    for block in body.blocks() {
        if block.ident.value().as_str() != "resource" || block.labels.len() != 2 {
            continue;
        }

        let Some(block_span) = block.span() else {
            continue;
        };

        let resource_type = block.labels[0].as_str().to_string();
        let resource_name = block.labels[1].as_str().to_string();
        let tags_attribute_name = terraform_tags_attribute(&resource_type);

        let tags = tags_attribute_name.and_then(|name| {
            block
                .body
                .attributes()
                .find(|attribute| attribute.key.value().as_str() == name)
                .and_then(|attribute| read_tags_attribute(attribute, src))
        });

        let tag_lines = tags.as_ref().map(|tags| {
            Lines::new(
                index.line_of(tags.attribute_span.start),
                index.line_of(tags.attribute_span.end.saturating_sub(1)),
            )
        });

        tracing::trace!(%resource_type, %resource_name, ?tag_lines, "found resource block");

        blocks.push(Block {
            file_path: path.to_path_buf(),
            existing_tags: tags.as_ref().map(HclTags::literal_tags).unwrap_or_default(),
            new_tags: vec![],
            is_taggable: tags_attribute_name.is_some(),
            tags_attribute_name: tags_attribute_name.unwrap_or_default().to_string(),
            lines: Lines::new(
                index.line_of(block_span.start),
                index.line_of(block_span.end.saturating_sub(1)),
            ),
            tag_lines,
            resource_id: format!("{resource_type}.{resource_name}"),
            resource_type,
            resource_name,
            raw: RawBlock::Hcl(HclHandle { block_span, tags }),
        });
    }

    Ok(blocks)
}

fn read_tags_attribute(attribute: &Attribute, src: &str) -> Option<HclTags> {
    let attribute_span = attribute.span()?;
    let value_span = attribute.value.span()?;

    let value = match &attribute.value {
        Expression::Object(object) => {
            HclTagsValue::Literal(read_object(object, value_span.clone(), src))
        }
        Expression::FuncCall(call) if is_merge_call(&src[value_span.clone()]) => {
            HclTagsValue::Merge {
                objects: call
                    .args
                    .iter()
                    .filter_map(|arg| match arg {
                        Expression::Object(object) => Some(read_object(object, arg.span()?, src)),
                        _ => None,
                    })
                    .collect(),
                close_paren: value_span.end - 1,
            }
        }
        _ => HclTagsValue::Other,
    };

    Some(HclTags {
        attribute_span,
        value_span,
        value,
    })
}

fn is_merge_call(text: &str) -> bool {
    text.strip_prefix("merge")
        .map(|rest| rest.trim_start().starts_with('('))
        .unwrap_or(false)
}

fn read_object(object: &Object, span: Range<usize>, src: &str) -> HclObject {
    let items = object
        .iter()
        .filter_map(|(key, value)| {
            let value_span = value.expr().span()?;
            let key = match key {
                ObjectKey::Ident(ident) => ident.value().as_str().to_string(),
                ObjectKey::Expression(Expression::String(s)) => s.value().to_string(),
                ObjectKey::Expression(expr) => src[expr.span()?].trim().to_string(),
            };

            Some(HclItem {
                key,
                value: expression_value(value.expr(), &src[value_span.clone()]),
                value_span,
            })
        })
        .collect();

    HclObject { span, items }
}

/// Literal values as plain strings, anything else as written in the source
fn expression_value(expr: &Expression, raw: &str) -> String {
    match hcl::Expression::from(expr.clone()) {
        hcl::Expression::String(s) => s,
        hcl::Expression::Number(n) => n.to_string(),
        hcl::Expression::Bool(b) => b.to_string(),
        _ => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn locate_str(src: &str) -> Vec<Block> {
        locate(Path::new("main.tf"), src).unwrap()
    }

    fn tag_pairs(block: &Block) -> Vec<(&str, &str)> {
        block
            .existing_tags
            .iter()
            .map(|t| (t.key.as_str(), t.value.as_str()))
            .collect()
    }

    #[test]
    fn finds_resource_and_tags() {
        let blocks = locate_str(
            r#"provider "aws" {
  region = "eu-west-1"
}

resource "aws_s3_bucket" "logs" {
  bucket = "logs"

  tags = {
    Name          = "logs"
    "cost-center" = 42
  }
}
"#,
        );

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.resource_id, "aws_s3_bucket.logs");
        assert_eq!(block.lines, Lines::new(5, 12));
        assert_eq!(block.tag_lines, Some(Lines::new(8, 11)));
        assert_eq!(block.tags_attribute_name, "tags");
        assert!(block.is_taggable);
        assert_eq!(tag_pairs(block), vec![("Name", "logs"), ("cost-center", "42")]);
    }

    #[test]
    fn block_without_tags() {
        let blocks = locate_str(
            r#"resource "google_storage_bucket" "assets" {
  name = "assets"
}
"#,
        );

        assert_eq!(blocks[0].lines, Lines::new(1, 3));
        assert_eq!(blocks[0].tag_lines, None);
        assert_eq!(blocks[0].tags_attribute_name, "labels");
        assert!(blocks[0].existing_tags.is_empty());
    }

    #[test]
    fn merge_call_with_literal_maps() {
        let blocks = locate_str(
            r#"resource "aws_instance" "web" {
  tags = merge(var.common_tags, {
    Name = "web"
    env  = "dev"
  }, { env = "prod" })
}
"#,
        );

        let RawBlock::Hcl(handle) = &blocks[0].raw else {
            panic!("hcl block expected");
        };
        assert!(matches!(
            handle.tags.as_ref().map(|t| &t.value),
            Some(HclTagsValue::Merge { .. })
        ));
        assert_eq!(tag_pairs(&blocks[0]), vec![("Name", "web"), ("env", "prod")]);
    }

    #[test]
    fn reference_tags_have_no_literal_values() {
        let blocks = locate_str(
            r#"resource "aws_instance" "web" {
  tags = local.tags
}
"#,
        );

        assert_eq!(blocks[0].tag_lines, Some(Lines::new(2, 2)));
        assert!(blocks[0].existing_tags.is_empty());
    }

    #[test]
    fn unknown_provider_is_not_taggable() {
        let blocks = locate_str("resource \"random_id\" \"suffix\" {\n  byte_length = 4\n}\n");
        assert!(!blocks[0].is_taggable);
    }

    #[test]
    fn invalid_hcl_is_a_parse_error() {
        let err = locate(Path::new("main.tf"), "resource \"a\" {").unwrap_err();
        assert!(matches!(err, TagError::Parse { .. }));
    }
}
