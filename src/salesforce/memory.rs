//! In-memory [`OrgApi`] for tests and dry runs.
//!
//! Holds registered hierarchy records and every record created through
//! `composite`, behind a `Mutex`. Composite requests honour `allOrNone`:
//! one failing sub-request rolls back the whole call and its siblings are
//! reported as `PROCESSING_HALTED`. Failures can be injected per name path
//! or per object type.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use doc_uploader_core::lookup::{BulkLookupRequest, ERROR_MARKER};
use doc_uploader_core::{EntityType, NamePath};
use serde_json::{json, Value};

use super::wire::{
    ApiError, CompositeRequest, CompositeResponse, Subresponse, PROCESSING_HALTED,
};
use super::OrgApi;
use crate::error::RemoteError;

const ENDPOINT: &str = "memory";

/// A record created through `composite`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub sobject: String,
    pub id: String,
    pub fields: Value,
}

#[derive(Default)]
struct State {
    entities: HashMap<NamePath, String>,
    lookup_errors: HashMap<NamePath, String>,
    rejections: HashMap<String, ApiError>,
    withhold_urls: bool,
    session_expired: bool,
    next_id: u64,
    records: Vec<StoredRecord>,
    content_documents: HashMap<String, String>,
    distribution_urls: HashMap<String, String>,
    lookup_requests: Vec<BulkLookupRequest>,
    composite_sizes: Vec<usize>,
}

impl State {
    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:015}", prefix, self.next_id)
    }
}

pub struct InMemoryOrg {
    api_version: String,
    instance_url: String,
    state: Mutex<State>,
}

impl InMemoryOrg {
    pub fn new() -> Self {
        Self {
            api_version: "v57.0".to_string(),
            instance_url: "https://memory.my.salesforce.com".to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `path` resolvable to `id`.
    pub fn register(&self, path: &NamePath, id: &str) {
        self.state().entities.insert(path.clone(), id.to_string());
    }

    /// Register `path` and every ancestor below the project, generating ids
    /// for nodes not yet known. Returns the id of `path`.
    pub fn register_hierarchy(&self, path: &NamePath) -> String {
        let mut state = self.state();
        let mut chain = Vec::new();
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if p.entity_type() == EntityType::Project {
                break;
            }
            current = p.parent();
            chain.push(p);
        }

        let mut leaf_id = String::new();
        for p in chain.into_iter().rev() {
            let id = match state.entities.get(&p) {
                Some(id) => id.clone(),
                None => {
                    let id = state.new_id(level_prefix(p.entity_type()));
                    state.entities.insert(p.clone(), id.clone());
                    id
                }
            };
            leaf_id = id;
        }
        leaf_id
    }

    /// Answer lookups of `path` with an `ERROR:` result.
    pub fn fail_lookup(&self, path: &NamePath, message: &str) {
        self.state()
            .lookup_errors
            .insert(path.clone(), message.to_string());
    }

    /// Reject every create of `sobject` with the given error.
    pub fn reject_creates(&self, sobject: &str, error_code: &str, message: &str) {
        self.state().rejections.insert(
            sobject.to_string(),
            ApiError {
                error_code: error_code.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Leave `DistributionPublicUrl` empty on created distributions.
    pub fn withhold_distribution_urls(&self) {
        self.state().withhold_urls = true;
    }

    /// Fail every subsequent call as if the token had expired.
    pub fn expire_session(&self) {
        self.state().session_expired = true;
    }

    pub fn lookup_requests(&self) -> Vec<BulkLookupRequest> {
        self.state().lookup_requests.clone()
    }

    /// Number of sub-requests in each composite call, in call order.
    pub fn composite_sizes(&self) -> Vec<usize> {
        self.state().composite_sizes.clone()
    }

    /// Committed records of `sobject`, in creation order.
    pub fn records(&self, sobject: &str) -> Vec<StoredRecord> {
        self.state()
            .records
            .iter()
            .filter(|r| r.sobject == sobject)
            .cloned()
            .collect()
    }

    fn check_session(&self) -> Result<(), RemoteError> {
        if self.state().session_expired {
            return Err(RemoteError::SessionExpired {
                endpoint: ENDPOINT.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryOrg {
    fn default() -> Self {
        Self::new()
    }
}

fn level_prefix(level: EntityType) -> &'static str {
    match level {
        EntityType::Project => "a0P",
        EntityType::Phase => "a0H",
        EntityType::Zone => "a0Z",
        EntityType::Building => "a0B",
        EntityType::Unit => "a0U",
        EntityType::DesignType => "a0D",
    }
}

fn sobject_prefix(sobject: &str) -> &'static str {
    match sobject {
        "ContentVersion" => "068",
        "ContentDistribution" => "05D",
        _ => "a0X",
    }
}

/// Why the org would refuse this create, before any rollback.
fn validate_create(state: &State, sobject: &str, fields: &Value) -> Option<ApiError> {
    if let Some(rejection) = state.rejections.get(sobject) {
        return Some(rejection.clone());
    }
    let missing = |field: &str| ApiError {
        error_code: "REQUIRED_FIELD_MISSING".to_string(),
        message: format!("Required fields are missing: [{}]", field),
    };
    let text = |field: &str| fields.get(field).and_then(Value::as_str).unwrap_or_default();
    match sobject {
        "ContentVersion" => {
            for field in ["Title", "PathOnClient", "VersionData", "FirstPublishLocationId"] {
                if text(field).is_empty() {
                    return Some(missing(field));
                }
            }
            None
        }
        "ContentDistribution" => {
            let version_id = text("ContentVersionId");
            let known = state
                .records
                .iter()
                .any(|r| r.sobject == "ContentVersion" && r.id == version_id);
            if known {
                None
            } else {
                Some(ApiError {
                    error_code: "INVALID_CROSS_REFERENCE_KEY".to_string(),
                    message: format!("invalid cross reference id: {}", version_id),
                })
            }
        }
        _ => None,
    }
}

fn error_response(reference_id: &str, error: &ApiError) -> Subresponse {
    Subresponse {
        body: json!([{"errorCode": error.error_code, "message": error.message}]),
        http_status_code: 400,
        reference_id: reference_id.to_string(),
    }
}

#[async_trait]
impl OrgApi for InMemoryOrg {
    fn api_version(&self) -> &str {
        &self.api_version
    }

    async fn bulk_lookup(
        &self,
        request: &BulkLookupRequest,
    ) -> Result<HashMap<String, String>, RemoteError> {
        self.check_session()?;
        let mut state = self.state();
        state.lookup_requests.push(request.clone());

        let mut results = HashMap::new();
        for lookup in &request.lookups {
            let value = match NamePath::from_wire(lookup.entity_type, &lookup.name_path) {
                None => format!("{} invalid name path", ERROR_MARKER),
                Some(path) => match (state.lookup_errors.get(&path), state.entities.get(&path)) {
                    (Some(message), _) => format!("{} {}", ERROR_MARKER, message),
                    (None, Some(id)) => id.clone(),
                    (None, None) => format!(
                        "{} {} not found: {}",
                        ERROR_MARKER,
                        lookup.entity_type.label(),
                        path.display_path()
                    ),
                },
            };
            results.insert(lookup.result_key(), value);
        }
        Ok(results)
    }

    async fn composite(
        &self,
        request: &CompositeRequest,
    ) -> Result<CompositeResponse, RemoteError> {
        self.check_session()?;
        let mut state = self.state();
        state.composite_sizes.push(request.composite_request.len());

        let verdicts: Vec<Option<ApiError>> = request
            .composite_request
            .iter()
            .map(|sub| {
                if sub.method != "POST" {
                    return Some(ApiError {
                        error_code: "METHOD_NOT_ALLOWED".to_string(),
                        message: format!("{} not supported", sub.method),
                    });
                }
                validate_create(&state, sub.sobject(), &sub.body)
            })
            .collect();

        let any_failed = verdicts.iter().any(Option::is_some);
        let mut responses = Vec::with_capacity(verdicts.len());

        for (sub, verdict) in request.composite_request.iter().zip(verdicts) {
            if let Some(error) = verdict {
                responses.push(error_response(&sub.reference_id, &error));
                continue;
            }
            if any_failed && request.all_or_none {
                responses.push(error_response(
                    &sub.reference_id,
                    &ApiError {
                        error_code: PROCESSING_HALTED.to_string(),
                        message: "The transaction was rolled back since another operation in the same transaction failed.".to_string(),
                    },
                ));
                continue;
            }

            let sobject = sub.sobject().to_string();
            let id = state.new_id(sobject_prefix(&sobject));
            match sobject.as_str() {
                "ContentVersion" => {
                    let document_id = state.new_id("069");
                    state.content_documents.insert(id.clone(), document_id);
                }
                "ContentDistribution" if !state.withhold_urls => {
                    let url = format!("{}/sfc/p/{}", self.instance_url, id);
                    state.distribution_urls.insert(id.clone(), url);
                }
                _ => {}
            }
            state.records.push(StoredRecord {
                sobject,
                id: id.clone(),
                fields: sub.body.clone(),
            });
            responses.push(Subresponse {
                body: json!({"id": id, "success": true, "errors": []}),
                http_status_code: 201,
                reference_id: sub.reference_id.clone(),
            });
        }

        Ok(CompositeResponse {
            composite_response: responses,
        })
    }

    async fn content_documents(
        &self,
        version_ids: &[String],
    ) -> Result<HashMap<String, String>, RemoteError> {
        self.check_session()?;
        let state = self.state();
        Ok(version_ids
            .iter()
            .filter_map(|id| {
                state
                    .content_documents
                    .get(id)
                    .map(|doc| (id.clone(), doc.clone()))
            })
            .collect())
    }

    async fn distribution_urls(
        &self,
        distribution_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>, RemoteError> {
        self.check_session()?;
        let state = self.state();
        Ok(distribution_ids
            .iter()
            .filter(|id| {
                state
                    .records
                    .iter()
                    .any(|r| r.sobject == "ContentDistribution" && &r.id == *id)
            })
            .map(|id| (id.clone(), state.distribution_urls.get(id).cloned()))
            .collect())
    }
}
