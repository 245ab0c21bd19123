//! Finding blocks and their tags inside source files
//!
//! Each locator returns one [crate::block::Block] per resource with its existing tags, the lines of
//! the whole block and the lines of the tags attribute. Positions are kept in a format specific
//! [crate::block::RawBlock] for the matching writer in [crate::patch].
pub mod hcl;
pub mod json;
pub mod scan;
pub mod yaml;
