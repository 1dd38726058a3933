//! Shared JSON HTTP plumbing with bounded retries

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;

use super::error_handler::ExponentialBackoff;
use super::FetchError;

const RETRY_INITIAL_DELAY_SECS: u64 = 2;
const RETRY_MAX_DELAY_SECS: u64 = 60;
const RETRY_MAX_ATTEMPTS: u32 = 5;

/// Thin JSON client shared by every API collaborator.
pub struct HttpJson {
    client: reqwest::Client,
}

impl HttpJson {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// GET a JSON document.
    ///
    /// Transport failures and server errors are retried with backoff up to
    /// the bounded budget; client errors (4xx) are returned immediately.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: Option<&HeaderMap>,
    ) -> Result<Value, FetchError> {
        let mut backoff = ExponentialBackoff::new(
            RETRY_INITIAL_DELAY_SECS,
            RETRY_MAX_DELAY_SECS,
            RETRY_MAX_ATTEMPTS,
        );

        loop {
            let mut request = self.client.get(url).query(query);
            if let Some(headers) = headers {
                request = request.headers(headers.clone());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(FetchError::from);
                    }
                    if status.is_client_error() {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    log::warn!("HTTP {} from {}", status, url);
                }
                Err(e) => log::warn!("Request to {} failed: {}", url, e),
            }

            if backoff.sleep().await.is_err() {
                return Err(FetchError::RetriesExhausted);
            }
        }
    }

    /// Single-shot POST returning the status code and parsed body.
    ///
    /// Callers with polling semantics own their own retry budget.
    pub async fn post_status_json(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<(u16, Value), FetchError> {
        let mut request = self.client.post(url);
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}
