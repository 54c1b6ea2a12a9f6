//! # doc-uploader
//!
//! Uploads a tree of building-project documents to a Salesforce org and
//! links each file to the hierarchy record it belongs to.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌─────────────┐
//! │  collect  │──▶│  resolve  │──▶│  upload   │──▶│ attachments │
//! │ walk+parse│   │bulk lookup│   │ContentVer.│   │ join records│
//! └───────────┘   └─────┬─────┘   └─────┬─────┘   └──────┬──────┘
//!                       └───────────────┼────────────────┘
//!                                       ▼
//!                              ┌─────────────────┐
//!                              │ salesforce::Org │
//!                              │  HTTP / memory  │
//!                              └─────────────────┘
//! ```
//!
//! Parsing, hierarchy rules and lookup-result matching live in the
//! `doc-uploader-core` crate, which does no I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`progress`] | Status sinks for run progress |
//! | [`collect`] | Directory walk and classification |
//! | [`resolve`] | Level-by-level entity resolution |
//! | [`upload`] | Content upload and distribution links |
//! | [`attachments`] | Join-record creation |
//! | [`batch`] | Chunked composite submission |
//! | [`salesforce`] | Org access trait and implementations |
//! | [`auth`] | Access-token providers |
//! | [`pipeline`] | Stage sequencing |

pub mod attachments;
pub mod auth;
pub mod batch;
pub mod collect;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod salesforce;
pub mod upload;

pub use error::{RemoteError, UploadError};
