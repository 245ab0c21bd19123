mod cli;

use iactag::tags::group::{TagGroup, TagGroupName};
use iactag::TaggerConfig;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("IACTAG_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Tag(tag_cli) => tag(tag_cli),
        cli::Command::ListTags(list_cli) => list_tags(list_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn tag(cli: cli::TagCommand) -> anyhow::Result<()> {
    anyhow::ensure!(
        cli.directory.is_dir(),
        "{} is not a directory",
        cli.directory.display()
    );

    let config = match &cli.config {
        Some(path) => TaggerConfig::load(path)?,
        None => TaggerConfig::default(),
    };
    let config = apply_flags(config, cli.tagging).with_env_tags();

    let context = iactag::runner::pipeline_for(&cli.directory, config);
    let report = iactag::runner::run(&context, &cli.directory);

    output(&cli.output, &report)?;

    anyhow::ensure!(
        report.summary.failed_files == 0,
        "Failed to tag {} file(s)",
        report.summary.failed_files
    );
    Ok(())
}

/// Flags given on the command line replace the configured values
fn apply_flags(mut config: TaggerConfig, flags: cli::TaggingArgs) -> TaggerConfig {
    config.tags.extend(flags.tags);

    if !flags.skip_tags.is_empty() {
        config.skip_tags = flags.skip_tags;
    }
    if let Some(prefix) = flags.tag_prefix {
        config.tag_prefix = prefix;
    }
    if !flags.tag_groups.is_empty() {
        config.tag_groups = flags.tag_groups;
    }
    if !flags.skip_resource_types.is_empty() {
        config.skip_resource_types = flags.skip_resource_types;
    }
    if !flags.skip_resources.is_empty() {
        config.skip_resources = flags.skip_resources;
    }
    config.skip_dirs.extend(flags.skip_dirs);
    if flags.terraform_schema.is_some() {
        config.terraform_schema = flags.terraform_schema;
    }
    config.dry_run |= flags.dry_run;

    config
}

#[derive(serde::Serialize)]
struct TagDescription<'a> {
    group: TagGroupName,
    key: &'a str,
    description: &'a str,
}

pub fn list_tags(cli: cli::ListTagsCommand) -> anyhow::Result<()> {
    let names = if cli.tag_groups.is_empty() {
        TagGroupName::ALL.to_vec()
    } else {
        cli.tag_groups
    };

    let config = match &cli.config {
        Some(path) => TaggerConfig::load(path)?,
        None => TaggerConfig::default(),
    };
    let options = config.with_env_tags().group_options();
    let groups: Vec<TagGroup> = names.into_iter().map(|name| TagGroup::new(name, &options)).collect();

    let descriptions: Vec<TagDescription> = groups
        .iter()
        .flat_map(|group| {
            group.calculators().iter().map(|calculator| TagDescription {
                group: group.name(),
                key: calculator.key(),
                description: calculator.description(),
            })
        })
        .collect();

    output(&cli.output, &descriptions)
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
