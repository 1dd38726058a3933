//! KYC provider export client
//!
//! Pages through the provider's applicant export and maps each record to a
//! typed `KycRecord` (identity reference, wallet, lower-cased status).

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use crate::snapshot_core::address;
use crate::snapshot_core::merge::{KycRecord, KycStatus};

use super::http::HttpJson;
use super::FetchError;

const KYC_BATCH_SIZE: usize = 20;
const HTTP_TIMEOUT_SECS: u64 = 30;

pub struct KycClient {
    http: HttpJson,
    api_url: String,
    api_key: String,
    client_id: String,
}

impl KycClient {
    pub fn new(api_url: String, api_key: String, client_id: String) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpJson::new(HTTP_TIMEOUT_SECS)?,
            api_url,
            api_key,
            client_id,
        })
    }

    /// Fetch the full applicant export, batch by batch.
    pub async fn fetch_all(&self) -> Result<Vec<KycRecord>, FetchError> {
        let mut records = Vec::new();
        let mut skipped = 0;

        loop {
            let batch = self.fetch_batch(KYC_BATCH_SIZE, skipped).await?;
            if batch.is_empty() {
                break;
            }
            skipped += batch.len();
            records.extend(batch);
            log::info!("** Fetched {} KYC records", skipped);
        }

        Ok(records)
    }

    async fn fetch_batch(&self, limit: usize, skip: usize) -> Result<Vec<KycRecord>, FetchError> {
        let url = format!("{}/{}/applicants/", self.api_url, self.client_id);

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert("Authorization", value);
        }
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));

        let params = [
            ("limit", limit.to_string()),
            ("skip", skip.to_string()),
        ];

        let body = self.http.get_json(&url, &params, Some(&headers)).await?;
        let rows = body
            .get("data")
            .and_then(|data| data.get("records"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(rows.iter().map(parse_record).collect())
    }
}

fn parse_record(row: &Value) -> KycRecord {
    let ref_id = row
        .get("refId")
        .and_then(Value::as_str)
        .and_then(address::normalize);
    // The wallet lives in the identities blob when present.
    let wallet = row
        .get("identities")
        .and_then(|ids| ids.get("crypto_address_eth"))
        .and_then(|entry| entry.get("value"))
        .and_then(Value::as_str)
        .or_else(|| row.get("wallet").and_then(Value::as_str))
        .and_then(address::normalize);
    let status = KycStatus::parse(row.get("status").and_then(Value::as_str).unwrap_or(""));

    KycRecord {
        ref_id,
        wallet,
        status,
    }
}
