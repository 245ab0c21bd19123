//! Tags derived from the history of a block's lines
use crate::error::TagError;
use crate::git::GitBlame;
use crate::tags::{
    Tag, TagCalculator, TagContext, GIT_COMMIT_TAG_KEY, GIT_FILE_TAG_KEY, GIT_LAST_MODIFIED_AT_TAG_KEY,
    GIT_LAST_MODIFIED_BY_TAG_KEY, GIT_MODIFIERS_TAG_KEY, GIT_ORG_TAG_KEY, GIT_REPO_TAG_KEY,
};

/// Value of [GitCommitTag] when the block has no commit by a human
pub const COMMIT_UNAVAILABLE: &str = "N/A";

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn blame<'a>(key: &str, context: TagContext<'a>) -> Result<&'a GitBlame, TagError> {
    match context {
        TagContext::Blame(blame) => Ok(blame),
        TagContext::Block(block) => Err(TagError::plugin(
            key,
            format!("git history required, got block {}", block.resource_id),
        )),
    }
}

macro_rules! git_tag {
    ($(#[$doc:meta])* $name:ident, $key:expr, $description:literal, |$blame:ident| $value:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            key: String,
        }

        impl Default for $name {
            fn default() -> Self {
                Self { key: $key.to_string() }
            }
        }

        impl TagCalculator for $name {
            fn key(&self) -> &str {
                &self.key
            }

            fn description(&self) -> &str {
                $description
            }

            fn set_tag_prefix(&mut self, prefix: &str) {
                self.key = format!("{prefix}{}", $key);
            }

            fn calculate(&self, context: TagContext<'_>) -> Result<Tag, TagError> {
                let $blame = blame(&self.key, context)?;
                let value: Option<String> = $value;
                value
                    .map(|value| Tag::new(self.key.clone(), value))
                    .ok_or_else(|| TagError::plugin(&self.key, "no commit by a human author"))
            }
        }
    };
}

git_tag!(
    GitOrgTag,
    GIT_ORG_TAG_KEY,
    "The entity which owns the repository where this resource is provisioned in IaC",
    |blame| Some(blame.organization.clone())
);

git_tag!(
    GitRepoTag,
    GIT_REPO_TAG_KEY,
    "The repository where this resource is provisioned in IaC",
    |blame| Some(blame.repository.clone())
);

git_tag!(
    GitFileTag,
    GIT_FILE_TAG_KEY,
    "The file (including path) in the repository where this resource is provisioned in IaC",
    |blame| Some(blame.file_path.clone())
);

git_tag!(
    /// `N/A` if every line was last touched by a bot
    GitCommitTag,
    GIT_COMMIT_TAG_KEY,
    "The hash of the latest commit which changed this resource",
    |blame| Some(
        blame
            .latest_commit()
            .map_or(COMMIT_UNAVAILABLE.to_string(), |line| line.commit.clone())
    )
);

git_tag!(
    /// `jane/john`, sorted
    GitModifiersTag,
    GIT_MODIFIERS_TAG_KEY,
    "The users who modified this resource",
    |blame| Some(blame.modifiers().join("/")).filter(|names| !names.is_empty())
);

git_tag!(
    GitLastModifiedAtTag,
    GIT_LAST_MODIFIED_AT_TAG_KEY,
    "Last Modified At - the last time this resource configuration was updated",
    |blame| blame
        .latest_commit()
        .map(|line| line.date.format(DATE_FORMAT).to_string())
);

git_tag!(
    GitLastModifiedByTag,
    GIT_LAST_MODIFIED_BY_TAG_KEY,
    "The last user who modified this resource",
    |blame| blame.latest_commit().map(|line| line.author.clone())
);

pub fn default_calculators() -> Vec<Box<dyn TagCalculator>> {
    vec![
        Box::<GitOrgTag>::default(),
        Box::<GitRepoTag>::default(),
        Box::<GitFileTag>::default(),
        Box::<GitCommitTag>::default(),
        Box::<GitModifiersTag>::default(),
        Box::<GitLastModifiedAtTag>::default(),
        Box::<GitLastModifiedByTag>::default(),
    ]
}
