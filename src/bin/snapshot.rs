//! Production snapshot binary
//!
//! Usage:
//!   cargo run --release --bin snapshot -- --token SFUND --date 01.06.2024
//!
//! Environment variables (see config module):
//!   KYC_API_URL / KYC_API_KEY / KYC_CLIENT_ID - KYC provider access
//!   BACKEND_API_URL / BACKEND_GET_API_KEY - launchpad backend access
//!   BACKEND_POST_API_KEY - optional, enables the snapshot notification
//!   MULTICHAIN_API_KEY - explorer key for chain-id based networks

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tiersnap::main()
}
