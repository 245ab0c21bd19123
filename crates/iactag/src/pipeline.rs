//! The per-file pipeline: locate, correlate, calculate, merge, patch, write
//!
//! A [PipelineContext] holds everything shared between files of a run: configuration, tag groups,
//! the blame correlator and the provider schema. It is shared by reference across worker threads,
//! [PipelineContext::tag_file] never fails but reports what happened in a [FileReport].
use crate::block::Block;
use crate::config::TaggerConfig;
use crate::error::TagError;
use crate::format::Format;
use crate::git::{BlameCorrelator, BlockAttribution, FileCorrelation, GitAccess, GitBlame};
use crate::report::{BlockReport, FileReport, FileStatus};
use crate::schema::TerraformSchema;
use crate::tags::group::{TagGroup, TagGroupName};
use crate::tags::{unquote, Tag, TagContext};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub struct PipelineContext {
    config: TaggerConfig,
    groups: Vec<TagGroup>,
    trace_key: String,
    /// every key a calculator may produce
    managed_keys: HashSet<String>,
    correlator: Option<BlameCorrelator>,
    schema: TerraformSchema,
}

impl PipelineContext {
    pub fn new(config: TaggerConfig, git: Option<Arc<dyn GitAccess>>, schema: TerraformSchema) -> Self {
        let options = config.group_options();
        let trace_key = options.trace_key();

        let mut names = config.tag_groups.clone();
        names.dedup();
        let groups: Vec<TagGroup> = names.into_iter().map(|name| TagGroup::new(name, &options)).collect();

        let mut managed_keys: HashSet<String> = groups.iter().flat_map(TagGroup::keys).map(str::to_string).collect();
        managed_keys.insert(trace_key.clone());

        if git.is_none() && config.tag_groups.contains(&TagGroupName::Git) {
            tracing::warn!("git repository unavailable, git tags are skipped");
        }

        Self {
            config,
            groups,
            trace_key,
            managed_keys,
            correlator: git.map(BlameCorrelator::new),
            schema,
        }
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    pub fn groups(&self) -> &[TagGroup] {
        &self.groups
    }

    pub fn trace_key(&self) -> &str {
        &self.trace_key
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn tag_file(&self, path: &Path) -> FileReport {
        let src = match std::fs::read_to_string(path) {
            Ok(src) => src,
            Err(e) => {
                let error = TagError::io(path, e);
                tracing::warn!(error=%error, "unable to read file");
                return FileReport::failed(path.to_path_buf(), None, error);
            }
        };

        let format = match Format::for_file(path, &src) {
            Ok(format) => format,
            Err(e) => {
                tracing::trace!(error=%e, "skipped");
                return FileReport::new(path.to_path_buf(), None, FileStatus::Skipped);
            }
        };

        match self.tag_source(path, &src, format) {
            Ok(report) => report,
            Err(e @ TagError::Parse { .. }) => {
                tracing::warn!(error=%e, "skipping file");
                FileReport {
                    error: Some(e.to_string()),
                    ..FileReport::new(path.to_path_buf(), Some(format), FileStatus::Skipped)
                }
            }
            Err(e) => {
                tracing::warn!(error=%e, "tagging failed, file left untouched");
                FileReport::failed(path.to_path_buf(), Some(format), e)
            }
        }
    }

    fn tag_source(&self, path: &Path, src: &str, format: Format) -> Result<FileReport, TagError> {
        let mut blocks = format.locate(path, src)?;
        tracing::debug!(%format, blocks = blocks.len(), "located blocks");

        for block in &mut blocks {
            self.resolve_taggable(format, block);
        }

        let correlation = self.correlate(path, src);
        for block in blocks.iter_mut().filter(|block| block.is_taggable) {
            // later groups see the tags of earlier ones
            for group in &self.groups {
                let tags = self.calculate(group, block, correlation.as_deref());
                block.add_new_tags(tags, &self.trace_key);
            }
        }

        let changed: Vec<BlockReport> = blocks
            .iter()
            .filter(|block| block.is_taggable && !block.tags_diff().is_empty())
            .map(|block| BlockReport::new(block, &self.trace_key))
            .collect();

        let mut report = FileReport::new(path.to_path_buf(), Some(format), FileStatus::Unchanged);
        if changed.is_empty() {
            tracing::debug!("tags are up to date");
            return Ok(report);
        }

        let patched = format.patch(path, src, &blocks, &self.trace_key)?;
        report.blocks = changed;
        report.status = if self.config.dry_run {
            FileStatus::DryRun
        } else {
            write_atomically(path, &patched)?;
            FileStatus::Written
        };

        tracing::info!(status=?report.status, blocks = report.blocks.len(), "tagged");
        Ok(report)
    }

    fn resolve_taggable(&self, format: Format, block: &mut Block) {
        if self.config.skip_resource_types.contains(&block.resource_type)
            || self.config.skip_resources.contains(&block.resource_id)
        {
            tracing::debug!(resource=%block.resource_id, "skipped by configuration");
            block.is_taggable = false;
            return;
        }

        // a block with a tags attribute is taggable no matter what the schema says
        if format != Format::Terraform || !block.is_taggable || block.tag_lines.is_some() {
            return;
        }

        match self.schema.is_taggable(&block.resource_type) {
            Ok(taggable) => block.is_taggable = taggable,
            Err(e) => {
                tracing::warn!(resource=%block.resource_id, error=%e, "treated as not taggable");
                block.is_taggable = false;
            }
        }
    }

    fn correlate(&self, path: &Path, src: &str) -> Option<Arc<FileCorrelation>> {
        if !self.groups.iter().any(|group| group.name() == TagGroupName::Git) {
            return None;
        }

        match self.correlator.as_ref()?.correlate(path, src) {
            Ok(correlation) => Some(correlation),
            Err(e) => {
                tracing::warn!(error=%e, "git tags skipped for this file");
                None
            }
        }
    }

    fn calculate(&self, group: &TagGroup, block: &Block, correlation: Option<&FileCorrelation>) -> Vec<Tag> {
        match group.name() {
            TagGroupName::Git => {
                let Some(correlation) = correlation else {
                    return vec![];
                };

                match correlation.attribute(block) {
                    BlockAttribution::Blamed(blame) if is_tag_only_commit(&blame, block, &self.managed_keys) => {
                        tracing::debug!(resource=%block.resource_id, "latest commit only changed tags, git tags kept");
                        vec![]
                    }
                    BlockAttribution::Blamed(blame) => group.calculate(TagContext::Blame(&blame)),
                    BlockAttribution::Uncommitted { lines } => {
                        tracing::debug!(resource=%block.resource_id, ?lines, "uncommitted lines, git tags skipped");
                        vec![]
                    }
                    BlockAttribution::NoHistory => {
                        tracing::debug!(resource=%block.resource_id, "never committed, git tags skipped");
                        vec![]
                    }
                }
            }
            TagGroupName::Code2Cloud | TagGroupName::Simple | TagGroupName::External => {
                group.calculate(TagContext::Block(block))
            }
        }
    }
}

/// Whether every line of the block's latest commit is a line of managed tags
///
/// Committing the output of a run must not make the next run see a new commit.
fn is_tag_only_commit(blame: &GitBlame, block: &Block, managed_keys: &HashSet<String>) -> bool {
    let (Some(latest), Some(tag_lines)) = (blame.latest_commit(), block.tag_lines) else {
        return false;
    };

    let mut managed_lines = HashSet::new();
    let mut previous_managed = false;
    for number in tag_lines.iter() {
        let Some(line) = blame.lines.get(&number) else {
            previous_managed = false;
            continue;
        };

        let managed = if number == tag_lines.start {
            is_attribute_opening(&line.text)
        } else {
            match TagLine::parse(&line.text) {
                TagLine::Punctuation => true,
                TagLine::Key(key) => managed_keys.contains(key),
                TagLine::Value => previous_managed,
                TagLine::Other => false,
            }
        };

        if managed {
            managed_lines.insert(number);
        }
        previous_managed = managed;
    }

    blame
        .lines_of_commit(&latest.commit)
        .all(|(number, _)| managed_lines.contains(&number))
}

/// One line inside a tags attribute
#[derive(Debug, PartialEq, Eq)]
enum TagLine<'a> {
    Punctuation,
    /// `key = ..`, `key: ..` or `Key: key`
    Key(&'a str),
    /// `Value: ..` of a key/value list entry
    Value,
    Other,
}

impl<'a> TagLine<'a> {
    fn parse(text: &'a str) -> Self {
        let trimmed = text.trim();
        let trimmed = trimmed.strip_prefix('-').unwrap_or(trimmed).trim();
        if is_punctuation(trimmed) {
            return TagLine::Punctuation;
        }

        let Some(separator) = trimmed.find(['=', ':']) else {
            return TagLine::Other;
        };
        let key = unquote(&trimmed[..separator]);
        let rest = trimmed[separator + 1..].trim().trim_end_matches(',');

        match key {
            "Key" => TagLine::Key(unquote(rest)),
            "Value" => TagLine::Value,
            _ => TagLine::Key(key),
        }
    }
}

fn is_punctuation(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || "{}[](),".contains(c))
}

/// `tags = {`, `Tags:` or `"Tags": [`
fn is_attribute_opening(text: &str) -> bool {
    text.split_once(['=', ':'])
        .map_or(false, |(_, rest)| is_punctuation(rest))
}

/// Replaces `path` with `text` by renaming a temporary file in the same directory
fn write_atomically(path: &Path, text: &str) -> Result<(), TagError> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut file = tempfile::NamedTempFile::new_in(directory).map_err(|e| TagError::io(path, e))?;
    file.write_all(text.as_bytes()).map_err(|e| TagError::io(path, e))?;

    if let Ok(metadata) = std::fs::metadata(path) {
        if let Err(e) = file.as_file().set_permissions(metadata.permissions()) {
            tracing::debug!(error=%e, "unable to keep file permissions");
        }
    }

    file.persist(path).map_err(|e| TagError::io(path, e.error))?;
    Ok(())
}
