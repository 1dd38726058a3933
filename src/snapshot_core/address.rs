//! Wallet address normalization

use std::str::FromStr;

use alloy_primitives::Address;

/// Normalize a raw address string.
///
/// Accepts a trimmed, `0x`-prefixed, 40-hex-character string in any case
/// and returns the parsed address. Anything else yields `None`; invalid
/// addresses are dropped from consideration, never treated as a zero-balance
/// wallet.
pub fn normalize(raw: &str) -> Option<Address> {
    let trimmed = raw.trim();
    if trimmed.len() != 42 || !trimmed.starts_with("0x") {
        return None;
    }
    Address::from_str(trimmed).ok()
}

/// EIP-55 checksum-cased display form.
pub fn checksum(addr: &Address) -> String {
    addr.to_checksum(None)
}
