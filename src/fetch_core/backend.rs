//! Launchpad backend API client
//!
//! Registration and wallet-delegation exports, plus the snapshot-complete
//! notification with bounded polling.

use std::collections::BTreeSet;
use std::time::Duration;

use alloy_primitives::Address;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::time::sleep;

use crate::snapshot_core::address;
use crate::snapshot_core::merge::Delegation;

use super::http::HttpJson;
use super::FetchError;

const HTTP_TIMEOUT_SECS: u64 = 60;
const NOTIFY_MAX_POLLS: u32 = 60;
const NOTIFY_MAX_CRITICAL_ERRORS: u32 = 3;

/// IDO registration export: unique registered wallets plus the project name
/// when the backend reports one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationExport {
    pub wallets: BTreeSet<Address>,
    pub project_name: Option<String>,
}

pub struct BackendClient {
    http: HttpJson,
    api_url: String,
    api_key: String,
}

impl BackendClient {
    pub fn new(api_url: String, api_key: String) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpJson::new(HTTP_TIMEOUT_SECS)?,
            api_url,
            api_key,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert("x-api-key", value);
        }
        headers
    }

    /// Wallets that registered interest in a project.
    pub async fn registration_export(
        &self,
        project_id: &str,
    ) -> Result<RegistrationExport, FetchError> {
        let url = format!("{}/igo/{}/interest/export", self.api_url, project_id);
        let params = [("type", "json".to_string())];

        let body = self.http.get_json(&url, &params, Some(&self.headers())).await?;
        let rows = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let wallets = rows
            .iter()
            .filter_map(|row| row.get("primaryWallet"))
            .filter_map(Value::as_str)
            .filter_map(address::normalize)
            .collect();
        let project_name = body
            .get("idoName")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(RegistrationExport {
            wallets,
            project_name,
        })
    }

    /// Primary-to-delegate wallet pairs; duplicates on the primary keep the
    /// first occurrence.
    pub async fn delegation_export(&self) -> Result<Vec<Delegation>, FetchError> {
        let url = format!("{}/user/export", self.api_url);
        let params = [("type", "json".to_string())];

        let body = self.http.get_json(&url, &params, Some(&self.headers())).await?;
        let rows = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut seen = BTreeSet::new();
        let mut delegations = Vec::new();
        for row in &rows {
            let primary = row
                .get("primaryWallet")
                .and_then(Value::as_str)
                .and_then(address::normalize);
            let delegate = row
                .get("delegatedWallet")
                .and_then(Value::as_str)
                .and_then(address::normalize);
            if let (Some(primary), Some(delegate)) = (primary, delegate) {
                if seen.insert(primary) {
                    delegations.push(Delegation { primary, delegate });
                }
            }
        }

        Ok(delegations)
    }

    /// Tell the backend a snapshot is ready and wait until it is processed.
    ///
    /// Polls while the backend reports the update in progress, bounded by
    /// `NOTIFY_MAX_POLLS`; unexpected statuses consume the much smaller
    /// critical-error budget. Returns whether the update completed.
    pub async fn notify_snapshot(
        &self,
        post_api_key: &str,
        timestamp: i64,
        poll_delay: Duration,
    ) -> Result<bool, FetchError> {
        let url = format!("{}/snapshot/{}", self.api_url, timestamp);
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(post_api_key) {
            headers.insert("api-key", value);
        }

        let mut polls_left = NOTIFY_MAX_POLLS;
        let mut critical_left = NOTIFY_MAX_CRITICAL_ERRORS;

        while polls_left > 0 && critical_left > 0 {
            match self.http.post_status_json(&url, Some(&headers)).await {
                Ok((200, body)) if body.get("status").and_then(Value::as_str) == Some("DONE") => {
                    return Ok(true);
                }
                Ok((200, body)) | Ok((202, body)) => {
                    let msg = body
                        .get("msg")
                        .and_then(Value::as_str)
                        .unwrap_or("waiting for the snapshot to finish processing");
                    log::info!("Backend snapshot update pending: {}", msg);
                    polls_left -= 1;
                }
                Ok((status, body)) => {
                    log::warn!(
                        "Backend snapshot update failed with status {}: {}",
                        status,
                        body.get("msg").cloned().unwrap_or(Value::Null)
                    );
                    critical_left -= 1;
                }
                Err(e) => {
                    log::warn!("Backend snapshot update request failed: {}", e);
                    critical_left -= 1;
                }
            }
            sleep(poll_delay).await;
        }

        Ok(false)
    }
}
