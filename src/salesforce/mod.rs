//! Access to the remote org.
//!
//! Every stage talks to the org through the [`OrgApi`] trait:
//!
//! ```text
//!   resolve ──► bulk_lookup          (Apex REST, idempotent)
//!   upload  ──► composite            (ContentVersion / ContentDistribution)
//!          └──► content_documents    (SOQL, idempotent)
//!          └──► distribution_urls    (SOQL, idempotent)
//!   attach  ──► composite            (Attachments_Uploader__c)
//! ```
//!
//! [`HttpOrgClient`] is the production implementation. [`InMemoryOrg`]
//! holds records in memory and backs tests and dry runs.

pub mod http;
pub mod memory;
pub mod wire;

use std::collections::HashMap;

use async_trait::async_trait;
use doc_uploader_core::lookup::BulkLookupRequest;

use crate::error::RemoteError;

pub use http::HttpOrgClient;
pub use memory::InMemoryOrg;
pub use wire::{CompositeRequest, CompositeResponse, Subrequest, Subresponse};

/// Operations the pipeline needs from the org.
#[async_trait]
pub trait OrgApi: Send + Sync {
    /// REST API version used in data URLs, e.g. `v57.0`.
    fn api_version(&self) -> &str;

    /// Resolve a batch of name paths. Keys of the returned map are
    /// serialized lookups; values are ids or `ERROR:`-prefixed messages.
    async fn bulk_lookup(
        &self,
        request: &BulkLookupRequest,
    ) -> Result<HashMap<String, String>, RemoteError>;

    /// Submit one composite request. Per-subrequest failures are reported
    /// inside the response, not as an `Err`.
    async fn composite(&self, request: &CompositeRequest)
        -> Result<CompositeResponse, RemoteError>;

    /// `ContentVersion` id → `ContentDocumentId` for the given versions.
    /// Versions the org does not know are absent from the map.
    async fn content_documents(
        &self,
        version_ids: &[String],
    ) -> Result<HashMap<String, String>, RemoteError>;

    /// `ContentDistribution` id → public URL, `None` when the org has not
    /// populated it.
    async fn distribution_urls(
        &self,
        distribution_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>, RemoteError>;
}
