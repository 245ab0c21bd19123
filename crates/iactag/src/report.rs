//! What a run did, per file and in total
use crate::block::Block;
use crate::format::Format;
use crate::tags::{Tag, TagUpdate};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Written,
    Unchanged,
    /// would have been written
    DryRun,
    Failed,
    /// no tagging support, or nothing taggable
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BlockReport {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<Tag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<TagUpdate>,
}

impl BlockReport {
    pub fn new(block: &Block, trace_key: &str) -> Self {
        let diff = block.tags_diff();
        Self {
            resource_id: block.resource_id.clone(),
            resource_type: block.resource_type.clone(),
            trace: block.trace(trace_key).map(str::to_string),
            added: diff.added,
            updated: diff.updated,
        }
    }

    /// Whether the block had no trace before this run
    pub fn is_new(&self, trace_key: &str) -> bool {
        self.added.iter().any(|tag| tag.key == trace_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, derive_new::new)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    pub status: FileStatus,
    #[new(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[new(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockReport>,
}

impl FileReport {
    pub fn failed(path: PathBuf, format: Option<Format>, error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(path, format, FileStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub scanned_files: usize,
    pub written_files: usize,
    pub failed_files: usize,
    /// blocks that received their first trace
    pub new_resources: usize,
    /// blocks that were traced already and got other tags changed
    pub updated_resources: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub summary: Summary,
}

impl RunReport {
    pub fn new(mut files: Vec<FileReport>, trace_key: &str) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut summary = Summary {
            scanned_files: files.len(),
            ..Default::default()
        };

        for file in &files {
            match file.status {
                FileStatus::Written => summary.written_files += 1,
                FileStatus::Failed => summary.failed_files += 1,
                FileStatus::Unchanged | FileStatus::DryRun | FileStatus::Skipped => {}
            }

            for block in &file.blocks {
                if block.is_new(trace_key) {
                    summary.new_resources += 1;
                } else if !block.added.is_empty() || !block.updated.is_empty() {
                    summary.updated_resources += 1;
                }
            }
        }

        Self { files, summary }
    }
}
