//! Git history of the lines of a block
//!
//! [GitAccess] fetches blame for the committed version of a file. Because the working copy may
//! differ from what was committed (not least because we rewrite it), [correlator] maps current
//! lines onto blamed lines before any history is attributed to a block.
use crate::error::TagError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

pub mod correlator;
pub mod matcher;
pub mod service;

pub use correlator::{BlameCorrelator, BlockAttribution, FileCorrelation, FileLineMapper};
pub use service::GitService;

/// One line of the committed file and who touched it last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    /// author email
    pub author: String,
    pub date: DateTime<Utc>,
    pub commit: String,
    pub text: String,
}

impl BlameLine {
    /// `jane` for `jane@example.com`
    pub fn author_name(&self) -> &str {
        self.author
            .split_once('@')
            .map(|(name, _)| name)
            .unwrap_or(&self.author)
    }

    pub fn is_ci_bot(&self) -> bool {
        ci_bot_pattern().is_match(&self.author)
    }
}

fn ci_bot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\bci\b|\[bot\]|github-action|\bautomation\b").expect("valid regex")
    })
}

/// Blame of a whole committed file, line `n` at index `n - 1`
#[derive(Debug, Clone, Default)]
pub struct FileBlame {
    /// path relative to the repository root
    pub relative_path: String,
    pub lines: Vec<BlameLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepoIdentity {
    pub organization: String,
    pub repository: String,
}

/// Access to a git repository
pub trait GitAccess: Send + Sync {
    fn identity(&self) -> &RepoIdentity;

    /// Blame of the committed version of `path`
    fn blame(&self, path: &Path) -> Result<FileBlame, TagError>;
}

/// History of the lines of one block, keyed by their current line number
#[derive(Debug, Clone)]
pub struct GitBlame {
    pub organization: String,
    pub repository: String,
    pub file_path: String,
    pub lines: BTreeMap<usize, BlameLine>,
}

impl GitBlame {
    /// Most recent commit, ignoring commits made by CI bots
    pub fn latest_commit(&self) -> Option<&BlameLine> {
        self.lines
            .values()
            .filter(|line| !line.is_ci_bot())
            .max_by_key(|line| line.date)
    }

    /// Sorted, unique names of everyone who touched the block
    pub fn modifiers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .lines
            .values()
            .filter(|line| !line.is_ci_bot())
            .map(BlameLine::author_name)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Current line numbers last touched by `commit`
    pub fn lines_of_commit<'a>(&'a self, commit: &'a str) -> impl Iterator<Item = (usize, &'a BlameLine)> {
        self.lines
            .iter()
            .filter(move |(_, line)| line.commit == commit)
            .map(|(number, line)| (*number, line))
    }
}

/// Splits a remote url into organization and repository
///
/// Handles `https://host/org/repo.git`, `ssh://git@host/org/repo` and `git@host:org/repo.git`.
/// Nested groups end up in the organization (`group/subgroup`).
pub fn parse_remote_url(url: &str) -> Option<RepoIdentity> {
    let url = url.trim();
    let path = match url.split_once("://") {
        Some((_scheme, rest)) => rest.split_once('/').map(|(_host, path)| path)?,
        None => url.split_once(':').map(|(_host, path)| path)?,
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (organization, repository) = path.rsplit_once('/')?;

    if organization.is_empty() || repository.is_empty() {
        return None;
    }

    Some(RepoIdentity {
        organization: organization.to_string(),
        repository: repository.to_string(),
    })
}
