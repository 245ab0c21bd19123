//! Selects the locator and patch writer for a file
use crate::block::Block;
use crate::error::TagError;
use crate::locate::yaml::YamlFlavor;
use crate::{locate, patch};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    Terraform,
    #[serde(rename = "cloudformation-json")]
    CloudFormationJson,
    #[serde(rename = "cloudformation-yaml")]
    CloudFormationYaml,
    Serverless,
}

impl Format {
    /// The single format `path` is tagged as, `None` for files without tagging support
    pub fn detect(path: &Path, src: &str) -> Option<Format> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let is_json = src.trim_start().starts_with('{');

        match extension.as_str() {
            "tf" => Some(Format::Terraform),
            "json" if is_json => Some(Format::CloudFormationJson),
            "template" if is_json => Some(Format::CloudFormationJson),
            "yaml" | "yml" | "template" if file_name.contains("serverless") => Some(Format::Serverless),
            "yaml" | "yml" | "template" if has_resources_section(src) => Some(Format::CloudFormationYaml),
            _ => None,
        }
    }

    /// Like [Format::detect], failing with [TagError::UnsupportedFile]
    pub fn for_file(path: &Path, src: &str) -> Result<Format, TagError> {
        Self::detect(path, src).ok_or_else(|| TagError::UnsupportedFile(path.to_path_buf()))
    }

    pub fn locate(&self, path: &Path, src: &str) -> Result<Vec<Block>, TagError> {
        match self {
            Format::Terraform => locate::hcl::locate(path, src),
            Format::CloudFormationJson => locate::json::locate(path, src),
            Format::CloudFormationYaml => locate::yaml::locate(path, src, YamlFlavor::CloudFormation),
            Format::Serverless => locate::yaml::locate(path, src, YamlFlavor::Serverless),
        }
    }

    /// New text of the file, validated by locating the result again
    pub fn patch(&self, path: &Path, src: &str, blocks: &[Block], trace_key: &str) -> Result<String, TagError> {
        match self {
            Format::Terraform => patch::hcl::patch(path, src, blocks, trace_key),
            Format::CloudFormationJson => patch::json::patch(path, src, blocks, trace_key),
            Format::CloudFormationYaml => {
                patch::yaml::patch(path, src, blocks, YamlFlavor::CloudFormation, trace_key)
            }
            Format::Serverless => patch::yaml::patch(path, src, blocks, YamlFlavor::Serverless, trace_key),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Format::Terraform => "terraform",
            Format::CloudFormationJson => "cloudformation-json",
            Format::CloudFormationYaml => "cloudformation-yaml",
            Format::Serverless => "serverless",
        })
    }
}

/// A `Resources:` key at the top level, without parsing the document
fn has_resources_section(src: &str) -> bool {
    src.lines()
        .any(|line| line.starts_with("Resources:") || line.starts_with("\"Resources\":"))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_formats() {
        let cases = [
            ("main.tf", "resource \"a\" \"b\" {}", Some(Format::Terraform)),
            ("stack.json", "{\"Resources\": {}}", Some(Format::CloudFormationJson)),
            ("package.json", "[1, 2]", None),
            ("stack.template", "  {\n}", Some(Format::CloudFormationJson)),
            ("stack.template", "Resources:\n  A: {}", Some(Format::CloudFormationYaml)),
            ("serverless.yml", "functions: {}", Some(Format::Serverless)),
            ("stack.yaml", "Resources:\n  A: {}", Some(Format::CloudFormationYaml)),
            ("values.yaml", "replicas: 3", None),
            ("README.md", "Resources:", None),
            ("Makefile", "", None),
        ];

        for (path, src, expected) in cases {
            assert_eq!(Format::detect(Path::new(path), src), expected, "{path}");
        }
    }

    #[test]
    fn unsupported_files() {
        let error = Format::for_file(Path::new("values.yaml"), "replicas: 3").unwrap_err();
        assert!(matches!(error, TagError::UnsupportedFile(path) if path == Path::new("values.yaml")));
    }
}
