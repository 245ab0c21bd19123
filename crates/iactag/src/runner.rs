//! Tags every supported file below a directory, files in parallel
use crate::config::TaggerConfig;
use crate::git::{GitAccess, GitService};
use crate::pipeline::PipelineContext;
use crate::report::{FileReport, RunReport};
use crate::schema::{SchemaSource, TerraformSchema};
use crate::tags::group::TagGroupName;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Files below `root` in a stable order, skipping ignored and configured directories
pub fn discover(root: &Path, config: &TaggerConfig) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !config.is_skipped_dir(&entry.file_name().to_string_lossy(), entry.path())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error=%e, "unable to read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Context for tagging `directory`: its git repository and terraform provider schema
pub fn pipeline_for(directory: &Path, config: TaggerConfig) -> PipelineContext {
    let git = if config.tag_groups.contains(&TagGroupName::Git) {
        match GitService::discover(directory) {
            Ok(service) => Some(Arc::new(service) as Arc<dyn GitAccess>),
            Err(e) => {
                tracing::warn!(directory=%directory.display(), error=%e, "not a git repository");
                None
            }
        }
    } else {
        None
    };

    let source = match &config.terraform_schema {
        Some(path) => SchemaSource::File(path.clone()),
        None => SchemaSource::Terraform(directory.to_path_buf()),
    };

    PipelineContext::new(config, git, TerraformSchema::new(source))
}

/// Runs the pipeline for every file below `directory`
///
/// Files without tagging support are left out of the report.
pub fn run(context: &PipelineContext, directory: &Path) -> RunReport {
    let files = discover(directory, context.config());
    tracing::info!(directory=%directory.display(), files = files.len(), "tagging");

    let reports: Vec<FileReport> = files
        .par_iter()
        .map(|path| context.tag_file(path))
        .filter(|report| report.format.is_some())
        .collect();

    let report = RunReport::new(reports, context.trace_key());
    tracing::info!(
        written = report.summary.written_files,
        failed = report.summary.failed_files,
        "done"
    );
    report
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::report::FileStatus;
    use crate::schema::test::AWS_SCHEMA;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "main.tf", "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}\n");
        write(
            root,
            "stack/template.json",
            "{\n  \"Resources\": {\n    \"Queue\": {\n      \"Type\": \"AWS::SQS::Queue\"\n    }\n  }\n}\n",
        );
        write(root, "stack/values.yaml", "replicas: 3\n");
        write(root, ".terraform/modules/vendored.tf", "resource \"aws_s3_bucket\" \"x\" {}\n");
        write(root, "legacy/old.tf", "resource \"aws_s3_bucket\" \"old\" {}\n");
        write(root, "README.md", "# infra\n");
        dir
    }

    #[test]
    fn discovers_files() {
        let dir = fixture();
        let config = TaggerConfig {
            skip_dirs: vec!["legacy".into()],
            ..Default::default()
        };

        let files: Vec<PathBuf> = discover(dir.path(), &config)
            .into_iter()
            .map(|path| path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            files,
            vec![
                PathBuf::from("README.md"),
                PathBuf::from("main.tf"),
                PathBuf::from("stack/template.json"),
                PathBuf::from("stack/values.yaml"),
            ]
        );
    }

    #[test]
    fn runs_every_file() {
        let dir = fixture();
        let config = TaggerConfig {
            tag_groups: vec![TagGroupName::Code2Cloud, TagGroupName::Simple],
            tags: [("team".to_string(), "platform".to_string())].into_iter().collect(),
            skip_dirs: vec!["legacy".into()],
            ..Default::default()
        };
        let context = PipelineContext::new(config, None, TerraformSchema::from_json(AWS_SCHEMA));

        let report = run(&context, dir.path());

        let statuses: Vec<(PathBuf, FileStatus)> = report
            .files
            .iter()
            .map(|file| (file.path.strip_prefix(dir.path()).unwrap().to_path_buf(), file.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (PathBuf::from("main.tf"), FileStatus::Written),
                (PathBuf::from("stack/template.json"), FileStatus::Written),
            ]
        );
        assert_eq!(report.summary.new_resources, 2);

        let template = std::fs::read_to_string(dir.path().join("stack/template.json")).unwrap();
        assert!(template.contains("\"Key\": \"team\""));

        let rerun = run(&context, dir.path());
        assert_eq!(rerun.summary.written_files, 0);
    }
}
