//! Chunked `allOrNone` composite submission.
//!
//! Sub-requests are split into chunks of at most `batch_size`, one composite
//! call per chunk. With `concurrency > 1`, chunks go out in windows of that
//! many concurrent calls. A window is always drained completely; after a
//! failed window no further chunk is issued.

use futures::future::join_all;

use crate::error::UploadError;
use crate::progress::{ProgressSpan, StatusSink};
use crate::salesforce::{CompositeRequest, OrgApi, Subrequest, Subresponse};

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::config::MAX_BATCH_SIZE,
            concurrency: 1,
        }
    }
}

/// Submit `requests` and return every sub-response, chunk by chunk.
///
/// Any non-success sub-response fails the call with
/// [`UploadError::PartialBatchFailure`], naming the root-cause error rather
/// than a `PROCESSING_HALTED` sibling.
pub async fn submit_chunked(
    org: &dyn OrgApi,
    requests: Vec<Subrequest>,
    options: BatchOptions,
    sink: &dyn StatusSink,
    span: ProgressSpan,
) -> Result<Vec<Subresponse>, UploadError> {
    let batch_size = options.batch_size.max(1);
    let concurrency = options.concurrency.max(1);

    let chunks: Vec<CompositeRequest> = requests
        .chunks(batch_size)
        .map(|chunk| CompositeRequest::all_or_none(chunk.to_vec()))
        .collect();
    let total = chunks.len();

    let mut responses = Vec::with_capacity(requests.len());
    let mut done = 0;
    sink.progress(span.at(0, total));

    for window in chunks.chunks(concurrency) {
        let results = join_all(window.iter().map(|chunk| org.composite(chunk))).await;

        let mut first_err = None;
        for (chunk, result) in window.iter().zip(results) {
            done += 1;
            sink.progress(span.at(done, total));
            let outcome = result
                .map_err(UploadError::from)
                .and_then(|resp| check_chunk(chunk, resp.composite_response));
            match outcome {
                Ok(mut subs) => responses.append(&mut subs),
                Err(e) => {
                    tracing::error!(error = %e, "composite chunk failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        tracing::debug!(done, total, "composite chunks submitted");
    }

    Ok(responses)
}

/// Map sub-responses back to request positions through their `{prefix}{n}`
/// reference ids and return the created record ids in request order.
///
/// A reference id that does not decode to a position below `count`, or a
/// position left without a created id, is an unexpected response.
pub fn created_ids_by_reference(
    subs: &[Subresponse],
    prefix: &str,
    count: usize,
) -> Result<Vec<String>, UploadError> {
    let mut ids: Vec<Option<String>> = vec![None; count];
    for sub in subs {
        let index = sub
            .reference_id
            .strip_prefix(prefix)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| n < count)
            .ok_or_else(|| {
                UploadError::UnexpectedResponse(format!(
                    "unknown reference id '{}'",
                    sub.reference_id
                ))
            })?;
        let id = sub.created_id().ok_or_else(|| {
            UploadError::UnexpectedResponse(format!(
                "no record id in response for '{}'",
                sub.reference_id
            ))
        })?;
        ids[index] = Some(id);
    }

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            id.ok_or_else(|| {
                UploadError::UnexpectedResponse(format!("no response for '{}{}'", prefix, i))
            })
        })
        .collect()
}

fn check_chunk(
    chunk: &CompositeRequest,
    subs: Vec<Subresponse>,
) -> Result<Vec<Subresponse>, UploadError> {
    let failed: Vec<&Subresponse> = subs.iter().filter(|s| !s.is_success()).collect();
    if failed.is_empty() {
        return Ok(subs);
    }

    // Prefer the sub-response carrying the real error over halted siblings.
    let culprit = failed
        .iter()
        .find(|s| {
            s.root_error()
                .map(|e| e.error_code != crate::salesforce::wire::PROCESSING_HALTED)
                .unwrap_or(true)
        })
        .unwrap_or(&failed[0]);

    let object = chunk
        .composite_request
        .iter()
        .find(|r| r.reference_id == culprit.reference_id)
        .map(|r| r.sobject().to_string())
        .unwrap_or_else(|| "record".to_string());
    let error = culprit.root_error().unwrap_or_default();

    Err(UploadError::PartialBatchFailure {
        object,
        reference_id: culprit.reference_id.clone(),
        status: culprit.http_status_code,
        error_code: error.error_code,
        message: if error.message.is_empty() {
            culprit.body.to_string()
        } else {
            error.message
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoStatus;
    use crate::salesforce::InMemoryOrg;
    use serde_json::json;

    fn things(n: usize) -> Vec<Subrequest> {
        (0..n)
            .map(|i| {
                Subrequest::create(
                    "v57.0",
                    "Thing__c",
                    format!("ref{}", i),
                    json!({"Name": i}),
                )
            })
            .collect()
    }

    #[test]
    fn test_created_ids_follow_reference_not_order() {
        let sub = |r: &str, id: &str| Subresponse {
            body: json!({"id": id}),
            http_status_code: 201,
            reference_id: r.to_string(),
        };
        let subs = vec![sub("ref1", "b"), sub("ref0", "a")];
        assert_eq!(created_ids_by_reference(&subs, "ref", 2).unwrap(), vec!["a", "b"]);
        assert!(created_ids_by_reference(&subs, "ref", 3).is_err());
        assert!(created_ids_by_reference(&[sub("refX", "a")], "ref", 1).is_err());
    }

    #[tokio::test]
    async fn test_chunks_by_batch_size() {
        let org = InMemoryOrg::new();
        let options = BatchOptions {
            batch_size: 3,
            concurrency: 1,
        };
        let subs = submit_chunked(&org, things(7), options, &NoStatus, ProgressSpan::new(0.0, 1.0))
            .await
            .unwrap();
        assert_eq!(subs.len(), 7);
        assert_eq!(org.composite_sizes(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_concurrent_windows_keep_all_results() {
        let org = InMemoryOrg::new();
        let options = BatchOptions {
            batch_size: 2,
            concurrency: 3,
        };
        let subs = submit_chunked(&org, things(9), options, &NoStatus, ProgressSpan::new(0.0, 1.0))
            .await
            .unwrap();
        let mut refs: Vec<String> = subs.into_iter().map(|s| s.reference_id).collect();
        refs.sort();
        assert_eq!(refs.len(), 9);
        assert_eq!(org.records("Thing__c").len(), 9);
    }

    #[tokio::test]
    async fn test_failure_names_root_cause() {
        let org = InMemoryOrg::new();
        org.reject_creates("Thing__c", "FIELD_CUSTOM_VALIDATION_EXCEPTION", "bad name");
        let err = submit_chunked(
            &org,
            things(2),
            BatchOptions::default(),
            &NoStatus,
            ProgressSpan::new(0.0, 1.0),
        )
        .await
        .unwrap_err();
        match err {
            UploadError::PartialBatchFailure {
                object,
                error_code,
                message,
                status,
                ..
            } => {
                assert_eq!(object, "Thing__c");
                assert_eq!(status, 400);
                assert_eq!(error_code, "FIELD_CUSTOM_VALIDATION_EXCEPTION");
                assert_eq!(message, "bad name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_window_after_failure() {
        let org = InMemoryOrg::new();
        org.reject_creates("Thing__c", "DENIED", "no");
        let options = BatchOptions {
            batch_size: 1,
            concurrency: 2,
        };
        let _ = submit_chunked(&org, things(5), options, &NoStatus, ProgressSpan::new(0.0, 1.0))
            .await
            .unwrap_err();
        assert_eq!(org.composite_sizes(), vec![1, 1]);
    }
}
