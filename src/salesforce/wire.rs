//! Request and response bodies of the org's REST endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /services/data/{v}/composite` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRequest {
    #[serde(rename = "allOrNone")]
    pub all_or_none: bool,
    #[serde(rename = "compositeRequest")]
    pub composite_request: Vec<Subrequest>,
}

impl CompositeRequest {
    pub fn all_or_none(subrequests: Vec<Subrequest>) -> Self {
        Self {
            all_or_none: true,
            composite_request: subrequests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subrequest {
    pub method: String,
    pub url: String,
    #[serde(rename = "referenceId")]
    pub reference_id: String,
    pub body: Value,
}

impl Subrequest {
    /// Create one `sobject` record.
    pub fn create(api_version: &str, sobject: &str, reference_id: String, body: Value) -> Self {
        Self {
            method: "POST".to_string(),
            url: sobject_url(api_version, sobject),
            reference_id,
            body,
        }
    }

    /// Object name from a `/sobjects/{name}` URL.
    pub fn sobject(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or_default()
    }
}

pub fn sobject_url(api_version: &str, sobject: &str) -> String {
    format!("/services/data/{}/sobjects/{}", api_version, sobject)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeResponse {
    #[serde(rename = "compositeResponse")]
    pub composite_response: Vec<Subresponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subresponse {
    #[serde(default)]
    pub body: Value,
    #[serde(rename = "httpStatusCode")]
    pub http_status_code: u16,
    #[serde(rename = "referenceId")]
    pub reference_id: String,
}

/// One entry of an error-array response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "errorCode", default)]
    pub error_code: String,
    #[serde(default)]
    pub message: String,
}

/// Error code the org reports for sub-requests rolled back because a
/// sibling failed.
pub const PROCESSING_HALTED: &str = "PROCESSING_HALTED";

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

impl Subresponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status_code)
    }

    /// Id of the created record, when the body is a create result.
    pub fn created_id(&self) -> Option<String> {
        serde_json::from_value::<Created>(self.body.clone())
            .ok()
            .map(|c| c.id)
            .filter(|id| !id.is_empty())
    }

    /// Errors reported in the body, if it is an error array.
    pub fn errors(&self) -> Vec<ApiError> {
        serde_json::from_value(self.body.clone()).unwrap_or_default()
    }

    /// The most informative error: the first one that is not a
    /// [`PROCESSING_HALTED`] echo of a sibling failure.
    pub fn root_error(&self) -> Option<ApiError> {
        let errors = self.errors();
        errors
            .iter()
            .find(|e| e.error_code != PROCESSING_HALTED)
            .or_else(|| errors.first())
            .cloned()
    }
}

/// `GET /services/data/{v}/query` response page.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default = "default_done")]
    pub done: bool,
    #[serde(rename = "nextRecordsUrl", default)]
    pub next_records_url: Option<String>,
}

fn default_done() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentVersionRow {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "ContentDocumentId")]
    pub content_document_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionRow {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "DistributionPublicUrl")]
    pub distribution_public_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_composite_request_shape() {
        let req = CompositeRequest::all_or_none(vec![Subrequest::create(
            "v57.0",
            "ContentVersion",
            "ref0".into(),
            json!({"Title": "a.pdf"}),
        )]);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "allOrNone": true,
                "compositeRequest": [{
                    "method": "POST",
                    "url": "/services/data/v57.0/sobjects/ContentVersion",
                    "referenceId": "ref0",
                    "body": {"Title": "a.pdf"}
                }]
            })
        );
        assert_eq!(req.composite_request[0].sobject(), "ContentVersion");
    }

    #[test]
    fn test_root_error_skips_processing_halted() {
        let resp: Subresponse = serde_json::from_value(json!({
            "body": [
                {"errorCode": "PROCESSING_HALTED", "message": "rolled back"},
                {"errorCode": "REQUIRED_FIELD_MISSING", "message": "Name missing"}
            ],
            "httpStatusCode": 400,
            "referenceId": "attRef3"
        }))
        .unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.created_id(), None);
        assert_eq!(resp.root_error().unwrap().error_code, "REQUIRED_FIELD_MISSING");
    }

    #[test]
    fn test_created_id() {
        let resp: Subresponse = serde_json::from_value(json!({
            "body": {"id": "068000000000001", "success": true, "errors": []},
            "httpStatusCode": 201,
            "referenceId": "ref0"
        }))
        .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.created_id().as_deref(), Some("068000000000001"));
    }
}
