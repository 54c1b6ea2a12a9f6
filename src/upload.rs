//! Content upload.
//!
//! Every document becomes one `ContentVersion` published to its own
//! hierarchy record. After the versions are created, one query fetches the
//! durable `ContentDocumentId` of each. Optionally a `ContentDistribution`
//! is created per version to obtain a public link.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use doc_uploader_core::DocumentRecord;
use serde_json::json;

use crate::batch::{created_ids_by_reference, submit_chunked, BatchOptions};
use crate::config::DistributionConfig;
use crate::error::{RemoteError, UploadError};
use crate::progress::{ProgressSpan, StatusSink};
use crate::salesforce::{OrgApi, Subrequest};

const CONTENT_VERSION: &str = "ContentVersion";
const CONTENT_DISTRIBUTION: &str = "ContentDistribution";

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub batch: BatchOptions,
    pub distribution: DistributionConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub bytes: u64,
    /// Documents that received a public distribution link.
    pub distributed: usize,
    /// Documents that fell back to the record deep link.
    pub fallbacks: usize,
}

/// Upload every document's content and record its version, document and
/// (optionally) distribution identifiers.
pub async fn upload_content(
    org: &dyn OrgApi,
    root: &Path,
    docs: &mut [DocumentRecord],
    options: &UploadOptions,
    sink: &dyn StatusSink,
    span: ProgressSpan,
) -> Result<UploadSummary, UploadError> {
    let mut summary = UploadSummary::default();

    let mut contents = Vec::with_capacity(docs.len());
    for doc in docs.iter() {
        let path = root.join(doc.source_path());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(source) => return Err(UploadError::Io { path, source }),
        };
        summary.bytes += bytes.len() as u64;
        contents.push(bytes);
    }

    let mut requests = Vec::with_capacity(docs.len());
    for (i, (doc, bytes)) in docs.iter().zip(&contents).enumerate() {
        let location = doc.entity_id().ok_or_else(|| UploadError::Unresolved {
            source_path: doc.source_path().to_string(),
            entity_type: doc.entity_type(),
        })?;
        requests.push(Subrequest::create(
            org.api_version(),
            CONTENT_VERSION,
            format!("ref{}", i),
            json!({
                "Title": doc.file_name(),
                "PathOnClient": doc.file_name(),
                "VersionData": BASE64.encode(bytes),
                "FirstPublishLocationId": location,
            }),
        ));
    }
    drop(contents);

    let (content_span, distribution_span) = if options.distribution.enabled {
        let mid = span.start + (span.end - span.start) * 0.75;
        (
            ProgressSpan::new(span.start, mid),
            ProgressSpan::new(mid, span.end),
        )
    } else {
        (span, ProgressSpan::new(span.end, span.end))
    };

    tracing::info!(documents = docs.len(), bytes = summary.bytes, "uploading content");
    let subs = submit_chunked(org, requests, options.batch, sink, content_span).await?;
    let version_ids = created_ids_by_reference(&subs, "ref", docs.len())?;

    for (doc, version_id) in docs.iter_mut().zip(&version_ids) {
        doc.resolved_ids_mut()
            .record_content_version_id(version_id)
            .map_err(|e| UploadError::UnexpectedResponse(e.to_string()))?;
    }

    let document_ids = org.content_documents(&version_ids).await?;
    for (doc, version_id) in docs.iter_mut().zip(&version_ids) {
        let document_id =
            document_ids
                .get(version_id)
                .ok_or_else(|| UploadError::MissingContentDocument {
                    source_path: doc.source_path().to_string(),
                })?;
        doc.set_content_document_id(document_id)
            .map_err(|e| UploadError::UnexpectedResponse(e.to_string()))?;
    }
    summary.uploaded = docs.len();

    if options.distribution.enabled {
        sink.status("Creating distribution links...");
        let (distributed, fallbacks) = distribute(
            org,
            docs,
            &version_ids,
            options,
            sink,
            distribution_span,
        )
        .await?;
        summary.distributed = distributed;
        summary.fallbacks = fallbacks;
    }

    Ok(summary)
}

/// Create one `ContentDistribution` per version and record the public URLs.
/// Returns `(distributed, fallbacks)`.
async fn distribute(
    org: &dyn OrgApi,
    docs: &mut [DocumentRecord],
    version_ids: &[String],
    options: &UploadOptions,
    sink: &dyn StatusSink,
    span: ProgressSpan,
) -> Result<(usize, usize), UploadError> {
    let strict = options.distribution.strict;

    let requests: Vec<Subrequest> = docs
        .iter()
        .zip(version_ids)
        .enumerate()
        .map(|(i, (doc, version_id))| {
            Subrequest::create(
                org.api_version(),
                CONTENT_DISTRIBUTION,
                format!("dist{}", i),
                json!({
                    "Name": doc.file_name(),
                    "ContentVersionId": version_id,
                    "PreferencesAllowViewInBrowser": true,
                    "PreferencesLinkLatestVersion": true,
                    "PreferencesNotifyOnVisit": false,
                    "PreferencesPasswordRequired": false,
                    "PreferencesAllowOriginalDownload": true,
                }),
            )
        })
        .collect();

    let distribution_ids = match submit_chunked(org, requests, options.batch, sink, span)
        .await
        .and_then(|subs| created_ids_by_reference(&subs, "dist", docs.len()))
    {
        Ok(ids) => ids,
        Err(e) => return degrade(e, strict, docs.len()),
    };

    let urls = match org.distribution_urls(&distribution_ids).await {
        Ok(urls) => urls,
        Err(e) => return degrade(e.into(), strict, docs.len()),
    };

    let mut distributed = 0;
    let mut fallbacks = 0;
    for (doc, distribution_id) in docs.iter_mut().zip(&distribution_ids) {
        match urls.get(distribution_id).and_then(|u| u.as_deref()) {
            Some(url) => {
                doc.resolved_ids_mut()
                    .record_distribution_url(url)
                    .map_err(|e| UploadError::UnexpectedResponse(e.to_string()))?;
                distributed += 1;
            }
            None if strict => {
                return Err(UploadError::Distribution {
                    source_path: doc.source_path().to_string(),
                    message: "no public URL returned".to_string(),
                })
            }
            None => {
                tracing::warn!(
                    path = doc.source_path(),
                    "no public URL returned, using record link"
                );
                fallbacks += 1;
            }
        }
    }

    Ok((distributed, fallbacks))
}

/// In lenient mode a distribution failure leaves every document on the
/// record deep link. An expired session is fatal either way.
fn degrade(err: UploadError, strict: bool, count: usize) -> Result<(usize, usize), UploadError> {
    if strict || matches!(err, UploadError::Remote(RemoteError::SessionExpired { .. })) {
        return Err(err);
    }
    tracing::warn!(error = %err, "distribution links unavailable, using record links");
    Ok((0, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoStatus;
    use crate::salesforce::InMemoryOrg;
    use doc_uploader_core::parse::parse_flat;
    use doc_uploader_core::EntityType;
    use tempfile::TempDir;

    fn prepared(org: &InMemoryOrg, tmp: &TempDir, names: &[&str]) -> Vec<DocumentRecord> {
        names
            .iter()
            .map(|name| {
                std::fs::write(tmp.path().join(name), name.as_bytes()).unwrap();
                let mut doc = parse_flat(name).unwrap();
                let id = org.register_hierarchy(doc.name_path());
                let level = doc.entity_type();
                doc.resolved_ids_mut().record_level(level, &id).unwrap();
                doc
            })
            .collect()
    }

    fn span() -> ProgressSpan {
        ProgressSpan::new(0.4, 0.8)
    }

    #[tokio::test]
    async fn test_uploads_and_records_content_documents() {
        let org = InMemoryOrg::new();
        let tmp = TempDir::new().unwrap();
        let mut docs = prepared(&org, &tmp, &["pp_p_P_Ph1.pdf", "f_z_P_Ph1_Z1.jpg"]);

        let summary = upload_content(&org, tmp.path(), &mut docs, &UploadOptions::default(), &NoStatus, span())
            .await
            .unwrap();
        assert_eq!(summary.uploaded, 2);
        assert!(docs.iter().all(|d| d.content_document_id().is_some()));

        let versions = org.records("ContentVersion");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].fields["Title"], "pp_p_P_Ph1.pdf");
        assert_eq!(
            versions[0].fields["FirstPublishLocationId"],
            docs[0].resolved_ids().level(EntityType::Phase).unwrap()
        );
        assert_eq!(
            versions[0].fields["VersionData"],
            BASE64.encode("pp_p_P_Ph1.pdf")
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_aborts_before_upload() {
        let org = InMemoryOrg::new();
        let tmp = TempDir::new().unwrap();
        let mut docs = prepared(&org, &tmp, &["pp_p_P_Ph1.pdf"]);
        std::fs::remove_file(tmp.path().join("pp_p_P_Ph1.pdf")).unwrap();

        let err = upload_content(&org, tmp.path(), &mut docs, &UploadOptions::default(), &NoStatus, span())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
        assert!(org.composite_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_distribution_links_recorded() {
        let org = InMemoryOrg::new();
        let tmp = TempDir::new().unwrap();
        let mut docs = prepared(&org, &tmp, &["pp_p_P_Ph1.pdf"]);
        let options = UploadOptions {
            distribution: DistributionConfig {
                enabled: true,
                strict: false,
            },
            ..Default::default()
        };

        let summary = upload_content(&org, tmp.path(), &mut docs, &options, &NoStatus, span())
            .await
            .unwrap();
        assert_eq!(summary.distributed, 1);
        assert!(docs[0]
            .resolved_ids()
            .distribution_url()
            .unwrap()
            .contains("/sfc/p/"));
    }

    #[tokio::test]
    async fn test_missing_distribution_url_falls_back_or_fails() {
        let org = InMemoryOrg::new();
        org.withhold_distribution_urls();
        let tmp = TempDir::new().unwrap();
        let mut docs = prepared(&org, &tmp, &["pp_p_P_Ph1.pdf"]);
        let mut options = UploadOptions {
            distribution: DistributionConfig {
                enabled: true,
                strict: false,
            },
            ..Default::default()
        };

        let summary = upload_content(&org, tmp.path(), &mut docs, &options, &NoStatus, span())
            .await
            .unwrap();
        assert_eq!(summary.fallbacks, 1);
        assert!(docs[0].resolved_ids().distribution_url().is_none());

        options.distribution.strict = true;
        let mut docs = prepared(&org, &tmp, &["pp_p_P_Ph1.pdf"]);
        let err = upload_content(&org, tmp.path(), &mut docs, &options, &NoStatus, span())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Distribution { .. }));
    }
}
