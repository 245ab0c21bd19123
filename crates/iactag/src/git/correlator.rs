//! Maps lines of the current file onto lines of its committed version
use crate::block::{Block, Lines};
use crate::error::TagError;
use crate::git::matcher::matching_blocks;
use crate::git::{FileBlame, GitAccess, GitBlame};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Line correspondence between the current file ("origin") and the committed file ("git")
///
/// Both directions are 1-indexed. `None` marks a line without counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLineMapper {
    pub origin_to_git: BTreeMap<usize, Option<usize>>,
    pub git_to_origin: BTreeMap<usize, Option<usize>>,
}

impl FileLineMapper {
    pub fn new<T: AsRef<str>>(origin_lines: &[T], git_lines: &[T]) -> Self {
        let origin: Vec<&str> = origin_lines.iter().map(AsRef::as_ref).collect();
        let git: Vec<&str> = git_lines.iter().map(AsRef::as_ref).collect();

        let mut mapper = Self::default();
        let mut next_origin = 1;
        let mut next_git = 1;

        for m in matching_blocks(&origin, &git) {
            for line in next_origin..=m.a {
                mapper.origin_to_git.insert(line, None);
            }
            for line in next_git..=m.b {
                mapper.git_to_origin.insert(line, None);
            }
            for i in 1..=m.size {
                mapper.origin_to_git.insert(m.a + i, Some(m.b + i));
                mapper.git_to_origin.insert(m.b + i, Some(m.a + i));
            }

            next_origin = m.a + m.size + 1;
            next_git = m.b + m.size + 1;
        }

        mapper
    }

    pub fn git_line(&self, origin_line: usize) -> Option<usize> {
        self.origin_to_git.get(&origin_line).copied().flatten()
    }

    /// Committed range of a block: its first and last line that has a counterpart
    pub fn git_lines(&self, lines: Lines) -> Option<Lines> {
        let first = lines.iter().find_map(|l| self.git_line(l))?;
        let last = lines.iter().rev().find_map(|l| self.git_line(l))?;
        Some(Lines::new(first, last))
    }

    /// Lines of the range that were never committed
    pub fn unmapped_lines(&self, lines: Lines) -> Vec<usize> {
        lines.iter().filter(|l| self.git_line(*l).is_none()).collect()
    }
}

/// What the history knows about a block
#[derive(Debug, Clone)]
pub enum BlockAttribution {
    /// every line of the block is committed
    Blamed(GitBlame),
    /// some lines were added or changed after the last commit
    Uncommitted { lines: Vec<usize> },
    /// nothing of the block was ever committed
    NoHistory,
}

/// Blame of one file together with its line mapping
#[derive(Debug)]
pub struct FileCorrelation {
    pub organization: String,
    pub repository: String,
    pub blame: Arc<FileBlame>,
    pub mapper: FileLineMapper,
}

impl FileCorrelation {
    pub fn new(organization: String, repository: String, blame: Arc<FileBlame>, current: &str) -> Self {
        let origin_lines: Vec<&str> = current.lines().collect();
        let git_lines: Vec<&str> = blame.lines.iter().map(|l| l.text.as_str()).collect();
        let mapper = FileLineMapper::new(&origin_lines, &git_lines);

        Self {
            organization,
            repository,
            blame,
            mapper,
        }
    }

    pub fn attribute(&self, block: &Block) -> BlockAttribution {
        if self.mapper.git_lines(block.lines).is_none() {
            return BlockAttribution::NoHistory;
        }

        let mut lines = BTreeMap::new();
        let mut uncommitted = Vec::new();
        for origin_line in block.lines.iter() {
            let blamed = self
                .mapper
                .git_line(origin_line)
                .and_then(|git_line| self.blame.lines.get(git_line - 1));

            match blamed {
                Some(line) => {
                    lines.insert(origin_line, line.clone());
                }
                None => uncommitted.push(origin_line),
            }
        }

        if !uncommitted.is_empty() {
            return BlockAttribution::Uncommitted { lines: uncommitted };
        }

        BlockAttribution::Blamed(GitBlame {
            organization: self.organization.clone(),
            repository: self.repository.clone(),
            file_path: self.blame.relative_path.clone(),
            lines,
        })
    }
}

/// Blame lookups with one cached result per file
///
/// Failed lookups are cached as well, a file that can't be blamed is not retried for every block.
/// Line mappings are cached per file content, a file rewritten during the run is mapped again
/// against the blame already fetched.
pub struct BlameCorrelator {
    git: Arc<dyn GitAccess>,
    blames: Mutex<HashMap<PathBuf, Result<Arc<FileBlame>, String>>>,
    correlations: Mutex<HashMap<(PathBuf, u64), Arc<FileCorrelation>>>,
}

impl BlameCorrelator {
    pub fn new(git: Arc<dyn GitAccess>) -> Self {
        Self {
            git,
            blames: Default::default(),
            correlations: Default::default(),
        }
    }

    pub fn git(&self) -> &dyn GitAccess {
        self.git.as_ref()
    }

    /// Correlates `current` (the file's present content) with the blame of `path`
    pub fn correlate(&self, path: &Path, current: &str) -> Result<Arc<FileCorrelation>, TagError> {
        let key = (path.to_path_buf(), content_hash(current));
        if let Some(cached) = self.correlations.lock().get(&key) {
            return Ok(cached.clone());
        }

        let blame = self.blame(path)?;
        let identity = self.git.identity();
        let correlation = Arc::new(FileCorrelation::new(
            identity.organization.clone(),
            identity.repository.clone(),
            blame,
            current,
        ));

        self.correlations.lock().insert(key, correlation.clone());
        Ok(correlation)
    }

    fn blame(&self, path: &Path) -> Result<Arc<FileBlame>, TagError> {
        if let Some(cached) = self.blames.lock().get(path) {
            return cached
                .clone()
                .map_err(|reason| TagError::blame_unavailable(path, reason));
        }

        let result = self.git.blame(path).map(|blame| {
            tracing::trace!(path=%path.display(), lines=blame.lines.len(), "blame loaded");
            Arc::new(blame)
        });

        let cached = match &result {
            Ok(blame) => Ok(blame.clone()),
            Err(TagError::BlameUnavailable { reason, .. }) => Err(reason.clone()),
            Err(e) => Err(e.to_string()),
        };
        self.blames.lock().insert(path.to_path_buf(), cached);

        result
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
