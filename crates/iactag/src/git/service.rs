//! [GitAccess] backed by libgit2
use crate::error::TagError;
use crate::git::{parse_remote_url, BlameLine, FileBlame, GitAccess, RepoIdentity};
use chrono::{DateTime, Utc};
use git2::{Oid, Repository};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git2: {0}")]
    Git2(#[from] git2::Error),
    #[error("{0}")]
    Other(String),
}

pub struct GitService {
    repo: Mutex<Repository>,
    root: PathBuf,
    identity: RepoIdentity,
}

impl GitService {
    /// Opens the repository containing `path`
    pub fn discover(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::discover(path)?;
        let root = repo
            .workdir()
            .ok_or_else(|| GitError::Other("bare repositories are not supported".into()))?
            .canonicalize()
            .map_err(|e| GitError::Other(e.to_string()))?;

        let remote_url = repo
            .find_remote("origin")
            .ok()
            .and_then(|remote| remote.url().map(str::to_string));
        let identity = remote_url
            .as_deref()
            .and_then(parse_remote_url)
            .unwrap_or_else(|| RepoIdentity {
                organization: String::new(),
                repository: root
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });

        tracing::info!(root=%root.display(), organization=%identity.organization, repository=%identity.repository, "opened git repository");

        Ok(Self {
            repo: Mutex::new(repo),
            root,
            identity,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_path(&self, path: &Path) -> Result<PathBuf, GitError> {
        let absolute = path
            .canonicalize()
            .map_err(|e| GitError::Other(format!("{}: {e}", path.display())))?;

        absolute
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| GitError::Other(format!("{} is outside of the repository", path.display())))
    }

    fn blame_file(&self, path: &Path) -> Result<FileBlame, GitError> {
        let relative = self.relative_path(path)?;
        let repo = self.repo.lock();

        let head = repo.head()?.peel_to_commit()?;
        let entry = head.tree()?.get_path(&relative)?;
        let blob = repo.find_blob(entry.id())?;
        let content = String::from_utf8_lossy(blob.content()).into_owned();

        let blame = repo.blame_file(&relative, None)?;
        let mut authors: HashMap<Oid, (String, DateTime<Utc>)> = HashMap::new();
        let mut lines = Vec::new();

        for (index, text) in content.lines().enumerate() {
            let hunk = blame
                .get_line(index + 1)
                .ok_or_else(|| GitError::Other(format!("no blame for line {}", index + 1)))?;
            let commit_id = hunk.final_commit_id();

            let (author, date) = match authors.get(&commit_id) {
                Some(known) => known.clone(),
                None => {
                    let commit = repo.find_commit(commit_id)?;
                    let signature = commit.author();
                    let known = (
                        signature.email().unwrap_or_default().to_string(),
                        DateTime::from_timestamp(signature.when().seconds(), 0).unwrap_or_default(),
                    );
                    authors.insert(commit_id, known.clone());
                    known
                }
            };

            lines.push(BlameLine {
                author,
                date,
                commit: commit_id.to_string(),
                text: text.to_string(),
            });
        }

        Ok(FileBlame {
            relative_path: relative.to_string_lossy().replace('\\', "/"),
            lines,
        })
    }
}

impl GitAccess for GitService {
    fn identity(&self) -> &RepoIdentity {
        &self.identity
    }

    fn blame(&self, path: &Path) -> Result<FileBlame, TagError> {
        self.blame_file(path)
            .map_err(|e| TagError::blame_unavailable(path, e))
    }
}
