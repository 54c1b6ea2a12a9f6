//! # doc-uploader core
//!
//! Pure logic for doc-uploader: document models, filename/path
//! classification, hierarchy rules, and bulk-lookup result matching.
//!
//! This crate performs no filesystem or network I/O and has no async
//! runtime dependency; the `doc-uploader` crate drives it.

pub mod hierarchy;
pub mod lookup;
pub mod models;
pub mod parse;

pub use models::{DocumentRecord, DocumentType, EntityType, NamePath, ResolvedIds};
pub use parse::{parse_document, NamingConvention, ParseError};
