//! External collaborators: explorer, RPC, KYC and backend clients
//!
//! Everything here performs network I/O with its own bounded retry policy;
//! the snapshot core never blocks on I/O. Trait seams (`TransferSource`,
//! `PairStateSource`) keep the pipeline testable with in-memory fakes.

pub mod backend;
pub mod error_handler;
pub mod explorer;
pub mod http;
pub mod kyc;
pub mod rpc;

use thiserror::Error;

pub use backend::{BackendClient, RegistrationExport};
pub use error_handler::{ExponentialBackoff, MaxRetriesExceeded};
pub use explorer::{ExplorerClient, RawTransfer, TransferSource, TXN_BATCH_SIZE};
pub use kyc::KycClient;
pub use rpc::{PairStateSource, RpcClient};

/// Errors raised while talking to external collaborators.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-retryable HTTP status.
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    /// The response body could not be interpreted.
    #[error("malformed response: {detail}")]
    Decode { detail: String },
    /// A required field was absent from the response.
    #[error("required field '{field}' missing in response")]
    MissingField { field: String },
    /// The bounded retry budget ran out.
    #[error("maximum retry attempts exceeded")]
    RetriesExhausted,
    /// Every configured RPC node failed.
    #[error("all RPC nodes failed after {attempts} attempts")]
    RpcNodesExhausted { attempts: u32 },
}
