//! Output generation for enriched records.
//!
//! # Submodules
//!
//! - [`json`]: Writes the final record list as a JSON array to a file or stdout

pub mod json;
