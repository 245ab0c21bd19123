use std::path::PathBuf;

/// Everything that can go wrong while tagging
///
/// Errors are handled at the narrowest scope possible: a [TagError::Plugin] drops one tag,
/// [TagError::BlameUnavailable] drops the git tags of a file, [TagError::SchemaUnavailable] marks a
/// resource as not taggable. The remaining variants fail a single file.
#[derive(thiserror::Error, Debug)]
pub enum TagError {
    #[error("Unable to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Git blame unavailable for {}: {reason}", path.display())]
    BlameUnavailable { path: PathBuf, reason: String },

    #[error("Schema unavailable for resource type {resource_type}: {reason}")]
    SchemaUnavailable {
        resource_type: String,
        reason: String,
    },

    #[error("Patched output of {} failed validation: {reason}", path.display())]
    PatchValidation { path: PathBuf, reason: String },

    #[error("Tag {key} could not be calculated: {reason}")]
    Plugin { key: String, reason: String },

    #[error("IO error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tagging support for {}", .0.display())]
    UnsupportedFile(PathBuf),
}

impl TagError {
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn blame_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::BlameUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn patch_validation(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::PatchValidation {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn plugin(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Plugin {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
