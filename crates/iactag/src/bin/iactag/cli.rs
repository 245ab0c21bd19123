//! iactag cli interface

use clap::{Parser, Subcommand, ValueEnum};
use iactag::tags::group::TagGroupName;
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; iactag ... }
    #[clap(id = "work_dir", short = 'C', global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tag every supported file of a directory
    Tag(TagCommand),

    /// List the tags each group calculates
    ListTags(ListTagsCommand),
}

#[derive(Parser, Debug)]
pub struct TagCommand {
    /// Directory to tag
    #[clap(short = 'd', long = "directory", default_value = ".")]
    pub directory: PathBuf,

    /// Configuration file (yaml), flags take precedence
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub tagging: TaggingArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct TaggingArgs {
    /// Additional tag, can be specified multiple times
    #[clap(short = 't', long = "tag", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,

    /// Tag keys to leave out, `*` matches anything
    #[clap(short = 's', long = "skip-tags", value_delimiter = ',')]
    pub skip_tags: Vec<String>,

    /// Prefix of every calculated tag key
    #[clap(long = "tag-prefix")]
    pub tag_prefix: Option<String>,

    /// Tag groups to apply
    #[clap(short = 'g', long = "tag-groups", value_delimiter = ',')]
    pub tag_groups: Vec<TagGroupName>,

    /// Resource types to leave untouched
    #[clap(long = "skip-resource-types", value_delimiter = ',')]
    pub skip_resource_types: Vec<String>,

    /// Resources to leave untouched, e.g. `aws_s3_bucket.logs`
    #[clap(long = "skip-resources", value_delimiter = ',')]
    pub skip_resources: Vec<String>,

    /// Directories not to descend into
    #[clap(long = "skip-dirs", value_delimiter = ',')]
    pub skip_dirs: Vec<PathBuf>,

    /// Output of `terraform providers schema -json`
    ///
    /// Without it `terraform` is run in the tagged directory.
    #[clap(long = "terraform-schema")]
    pub terraform_schema: Option<PathBuf>,

    /// Report what would change without writing any file
    #[clap(long = "dry-run")]
    pub dry_run: bool,
}

fn parse_tag(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{value}`"))
}

#[derive(Parser, Debug)]
pub struct ListTagsCommand {
    /// Tag groups to list
    #[clap(short = 'g', long = "tag-groups", value_delimiter = ',')]
    pub tag_groups: Vec<TagGroupName>,

    /// Configuration file (yaml) with tags and external tag groups
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn tag_command(cli: Cli) -> TagCommand {
        match cli.command {
            Command::Tag(tag) => tag,
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tagged_directory_is_not_the_work_directory() {
        let cli = Cli::try_parse_from(["iactag", "tag", "-d", "infra"]).unwrap();

        assert!(cli.directory.is_empty());
        assert_eq!(tag_command(cli).directory, PathBuf::from("infra"));
    }

    #[test]
    fn work_directory_keeps_the_default_tagged_directory() {
        let cli = Cli::try_parse_from(["iactag", "-C", "repo", "tag"]).unwrap();

        assert_eq!(cli.directory, vec![PathBuf::from("repo")]);
        assert_eq!(tag_command(cli).directory, PathBuf::from("."));
    }

    #[test]
    fn tags_are_key_value_pairs() {
        let cli = Cli::try_parse_from(["iactag", "tag", "-t", "team=platform", "-t", "empty="]).unwrap();

        assert_eq!(
            tag_command(cli).tagging.tags,
            vec![
                ("team".to_string(), "platform".to_string()),
                ("empty".to_string(), String::new())
            ]
        );
        assert!(Cli::try_parse_from(["iactag", "tag", "-t", "=x"]).is_err());
    }
}
