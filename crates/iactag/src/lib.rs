//! # iactag - tags for infrastructure as code
//!
//! Scans Terraform, CloudFormation and Serverless sources, calculates tags for every taggable
//! resource and writes them back into the file. Nothing but the tags attribute of a resource is
//! touched.
//!
//! ## Introduction for developers
//!
//! ### Terms
//!
//! - a **block** ([block::Block]) is one resource (or Serverless function) of a file
//! - its **tags attribute** is `tags`/`labels` in Terraform, `Properties.Tags` in CloudFormation and
//!   `tags` in Serverless
//! - the **trace** (`yor_trace`) is a random identifier that never changes once written
//!
//! ### Per file
//!
//! see [pipeline::PipelineContext::tag_file]
//!
//! 1. [format::Format::detect] picks the format from the path and the content.
//! 2. A locator ([locate]) parses the file and returns blocks with their existing tags and line
//!    ranges.
//! 3. For the `git` tag group the file is blamed ([git::GitAccess]). The working copy usually
//!    differs from `HEAD`, if only because we wrote tags into it, so current lines are mapped onto
//!    committed lines first ([git::FileLineMapper]). Blocks with lines that aren't committed get no
//!    git tags.
//! 4. Tag groups ([tags::group::TagGroup]) calculate new tags, [tags::merge_tags] and
//!    [tags::diff_tags] decide what changes.
//! 5. A patch writer ([patch]) turns the changes into byte edits of the original text. The result
//!    is located again and has to contain every merged tag before it replaces the file.
//!
//! **Example**
//!
//! ```hcl
//! resource "aws_s3_bucket" "logs" {
//!   bucket = "logs"
//! }
//! ```
//!
//! becomes
//!
//! ```hcl
//! resource "aws_s3_bucket" "logs" {
//!   bucket = "logs"
//!   tags = {
//!     git_commit = "2f8e9d3..."
//!     yor_trace  = "5e7c7bd2-..."
//!   }
//! }
//! ```
//!
//! ### Many files
//!
//! [runner::run] walks a directory and tags files in parallel. Caches (blame per file, provider
//! schema) live in the [pipeline::PipelineContext] shared by all workers. Every file ends up in a
//! [report::RunReport], a failure of one file never stops the others.
//!
pub mod block;
pub mod config;
pub mod error;
pub mod format;
pub mod git;
pub mod locate;
pub mod patch;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod schema;
pub mod tags;

pub use block::{Block, Lines};
pub use config::TaggerConfig;
pub use error::TagError;
pub use format::Format;
pub use pipeline::PipelineContext;
pub use tags::Tag;
