//! Run settings from the settings file and environment
//!
//! Non-secret settings live in a JSON file (directories, scoring period,
//! exclusion list, per-network API endpoints and RPC nodes); secrets are
//! resolved from environment variables only, with a mandatory-variable
//! check that fails the whole run up front.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required variables: {}", names.join(", "))]
    MissingVars { names: Vec<String> },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn default_output_dir() -> String {
    "Snapshots".to_string()
}

fn default_data_dir() -> String {
    "Data".to_string()
}

fn default_ssp_period() -> usize {
    1
}

fn default_api_call_delay_ms() -> u64 {
    250
}

fn default_max_rpc_tries() -> u32 {
    3
}

fn default_day_secs() -> i64 {
    86_400
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSettings {
    /// Empty for networks with a dedicated explorer endpoint; set when the
    /// multichain endpoint should be used instead.
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub rpc_nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Length of the points scoring window in days; a period above one
    /// enables points for the designated token.
    #[serde(default = "default_ssp_period")]
    pub ssp_period: usize,
    /// Token whose snapshots accrue points.
    #[serde(default)]
    pub points_token: Option<String>,
    /// Addresses excluded from being counted as depositor wallets.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub multichain_api_url: Option<String>,
    #[serde(default = "default_api_call_delay_ms")]
    pub api_call_delay_ms: u64,
    #[serde(default = "default_max_rpc_tries")]
    pub max_rpc_tries: u32,
    #[serde(default = "default_day_secs")]
    pub day_secs: i64,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSettings>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Append provider keys from the environment to RPC node URLs.
    ///
    /// `{NETWORK}_MORALIS_RPC_KEY` and `ALCHEMY_RPC_KEY` follow the node
    /// providers' URL-suffix convention.
    pub fn apply_env(&mut self) {
        for (name, network) in self.networks.iter_mut() {
            for node in network.rpc_nodes.iter_mut() {
                if node.contains(".moralis-nodes.com") {
                    if let Ok(key) = env::var(format!("{}_MORALIS_RPC_KEY", name)) {
                        node.push_str(&key);
                    }
                }
                if node.contains(".alchemy.com") {
                    if let Ok(key) = env::var("ALCHEMY_RPC_KEY") {
                        node.push_str(&key);
                    }
                }
            }
        }
    }
}

/// Secrets resolved from the environment only.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub kyc_api_url: String,
    pub kyc_api_key: String,
    pub kyc_client_id: String,
    pub backend_api_url: String,
    pub backend_get_api_key: String,
    pub backend_post_api_key: Option<String>,
    pub multichain_api_key: Option<String>,
}

impl Secrets {
    /// Load secrets, failing with the full list of missing variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |name: &str| match env::var(name) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                missing.push(name.to_string());
                String::new()
            }
        };

        let secrets = Self {
            kyc_api_url: required("KYC_API_URL"),
            kyc_api_key: required("KYC_API_KEY"),
            kyc_client_id: required("KYC_CLIENT_ID"),
            backend_api_url: required("BACKEND_API_URL"),
            backend_get_api_key: required("BACKEND_GET_API_KEY"),
            backend_post_api_key: env::var("BACKEND_POST_API_KEY").ok(),
            multichain_api_key: env::var("MULTICHAIN_API_KEY").ok(),
        };

        if missing.is_empty() {
            Ok(secrets)
        } else {
            Err(ConfigError::MissingVars { names: missing })
        }
    }
}
