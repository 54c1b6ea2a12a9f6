//! [`OrgApi`] over the org's REST API.
//!
//! All calls carry the run's bearer token. Idempotent calls (bulk lookup and
//! SOQL queries) are retried with exponential backoff:
//! - HTTP 429 or 5xx → retry
//! - network error → retry
//! - HTTP 401 → [`RemoteError::SessionExpired`], never retried
//! - other 4xx → fail immediately
//!
//! Composite writes are sent exactly once.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use doc_uploader_core::lookup::BulkLookupRequest;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use super::wire::{
    CompositeRequest, CompositeResponse, ContentVersionRow, DistributionRow, QueryResponse,
};
use super::OrgApi;
use crate::config::Config;
use crate::error::RemoteError;

/// Ids per SOQL `IN (...)` clause, keeping query URLs well under length
/// limits.
const QUERY_ID_CHUNK: usize = 200;

/// Longest response body quoted in an error message.
const ERROR_BODY_LIMIT: usize = 500;

pub struct HttpOrgClient {
    client: reqwest::Client,
    instance_url: String,
    api_version: String,
    bulk_lookup_path: String,
    token: String,
    max_retries: u32,
    backoff_unit: Duration,
}

impl HttpOrgClient {
    pub fn new(config: &Config, token: impl Into<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.org.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Transport {
                endpoint: config.instance_url().to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            instance_url: config.instance_url().to_string(),
            api_version: config.org.api_version.clone(),
            bulk_lookup_path: config.org.bulk_lookup_path.clone(),
            token: token.into(),
            max_retries: config.org.max_retries,
            backoff_unit: Duration::from_secs(1),
        })
    }

    /// Base delay of the backoff sequence (1x, 2x, 4x, ...).
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    fn data_url(&self, suffix: &str) -> String {
        format!(
            "{}/services/data/{}/{}",
            self.instance_url, self.api_version, suffix
        )
    }

    /// Send once and return the body of a 2xx response.
    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<String, RemoteError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteError::Transport {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RemoteError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        if status.as_u16() == 401 {
            return Err(RemoteError::SessionExpired {
                endpoint: endpoint.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        Ok(body)
    }

    async fn send_with_retry<F>(&self, endpoint: &str, build: F) -> Result<String, RemoteError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_unit * (1u32 << (attempt - 1).min(5));
                tracing::warn!(endpoint, attempt, ?delay, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }

            match self.send(build(), endpoint).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| RemoteError::Transport {
            endpoint: endpoint.to_string(),
            message: "no attempt was made".to_string(),
        }))
    }

    /// Run a SOQL query, following `nextRecordsUrl` until `done`.
    async fn query<T: DeserializeOwned>(&self, soql: &str) -> Result<Vec<T>, RemoteError> {
        let endpoint = self.data_url("query");
        tracing::debug!(soql, "query");
        let body = self
            .send_with_retry(&endpoint, || self.client.get(&endpoint).query(&[("q", soql)]))
            .await?;
        let mut page: QueryResponse<T> = decode(&endpoint, &body)?;
        let mut records = std::mem::take(&mut page.records);

        while !page.done {
            let Some(next) = page.next_records_url.take() else {
                break;
            };
            let url = format!("{}{}", self.instance_url, next);
            let body = self.send_with_retry(&url, || self.client.get(&url)).await?;
            page = decode(&url, &body)?;
            records.append(&mut page.records);
        }

        Ok(records)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, RemoteError> {
    serde_json::from_str(body).map_err(|e| RemoteError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// `'a','b'` with SOQL string escaping.
fn soql_id_list(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("'{}'", id.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl OrgApi for HttpOrgClient {
    fn api_version(&self) -> &str {
        &self.api_version
    }

    async fn bulk_lookup(
        &self,
        request: &BulkLookupRequest,
    ) -> Result<HashMap<String, String>, RemoteError> {
        let endpoint = format!("{}{}", self.instance_url, self.bulk_lookup_path);
        let body = self
            .send_with_retry(&endpoint, || self.client.post(&endpoint).json(request))
            .await?;
        decode(&endpoint, &body)
    }

    async fn composite(
        &self,
        request: &CompositeRequest,
    ) -> Result<CompositeResponse, RemoteError> {
        let endpoint = self.data_url("composite");
        let body = self
            .send(self.client.post(&endpoint).json(request), &endpoint)
            .await?;
        decode(&endpoint, &body)
    }

    async fn content_documents(
        &self,
        version_ids: &[String],
    ) -> Result<HashMap<String, String>, RemoteError> {
        let mut found = HashMap::new();
        for chunk in version_ids.chunks(QUERY_ID_CHUNK) {
            let soql = format!(
                "SELECT Id, ContentDocumentId FROM ContentVersion WHERE Id IN ({})",
                soql_id_list(chunk)
            );
            let rows: Vec<ContentVersionRow> = self.query(&soql).await?;
            for row in rows {
                if let Some(doc_id) = row.content_document_id.filter(|id| !id.is_empty()) {
                    found.insert(row.id, doc_id);
                }
            }
        }
        Ok(found)
    }

    async fn distribution_urls(
        &self,
        distribution_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>, RemoteError> {
        let mut found = HashMap::new();
        for chunk in distribution_ids.chunks(QUERY_ID_CHUNK) {
            let soql = format!(
                "SELECT Id, DistributionPublicUrl FROM ContentDistribution WHERE Id IN ({})",
                soql_id_list(chunk)
            );
            let rows: Vec<DistributionRow> = self.query(&soql).await?;
            for row in rows {
                let url = row.distribution_public_url.filter(|u| !u.is_empty());
                found.insert(row.id, url);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soql_id_list_escapes_quotes() {
        let ids = vec!["068A".to_string(), "it's".to_string()];
        assert_eq!(soql_id_list(&ids), r"'068A','it\'s'");
    }

    #[test]
    fn test_data_url() {
        let mut config = Config::default();
        config.org.instance_url = "https://x.my.salesforce.com/".into();
        let client = HttpOrgClient::new(&config, "tok").unwrap();
        assert_eq!(
            client.data_url("composite"),
            "https://x.my.salesforce.com/services/data/v57.0/composite"
        );
    }
}
