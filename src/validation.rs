use alloy_primitives::{Address, B256};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid EVM address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    value
        .strip_prefix("0x")
        .map(|hex| hex.len() == digits && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Accepts a `0x`-prefixed 20-byte address in any letter case and returns its EIP-55
/// checksummed form, the form wallets are stored and matched in.
pub fn validate_evm_address(address: &str) -> Result<String, ValidationError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingParameter("wallet_address".to_string()));
    }

    if !is_prefixed_hex(trimmed, 40) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }

    let parsed = Address::from_str(trimmed).map_err(|_| ValidationError::InvalidAddress(address.to_string()))?;
    Ok(parsed.to_checksum(None))
}

/// Returns the lowercase `0x` form used as the outbox/order key.
pub fn validate_tx_hash(tx_hash: &str) -> Result<String, ValidationError> {
    let trimmed = tx_hash.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingParameter("tx_hash".to_string()));
    }

    if !is_prefixed_hex(trimmed, 64) {
        return Err(ValidationError::InvalidTxHash(tx_hash.to_string()));
    }

    let parsed = B256::from_str(trimmed).map_err(|_| ValidationError::InvalidTxHash(tx_hash.to_string()))?;
    Ok(format!("{parsed:#x}"))
}

pub fn validate_chain_id(chain_id: i64) -> Result<i64, ValidationError> {
    if chain_id <= 0 {
        return Err(ValidationError::InvalidParameter(format!(
            "chain_id must be positive, got {chain_id}"
        )));
    }
    Ok(chain_id)
}
