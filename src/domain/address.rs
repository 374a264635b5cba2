//! Tron address codec
//!
//! Base58check addresses are `0x41 || 20-byte account`. Event logs carry the
//! bare 20-byte account in hex (contract address) or left-padded to 32 bytes
//! (indexed topics).

use thiserror::Error;

/// Mainnet address version byte
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_EVENT_TOPIC: &str = "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected 20 account bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid base58check address: {0}")]
    InvalidBase58(String),
}

/// Encoded length of a mainnet address
pub const TRON_ADDRESS_LEN: usize = 34;

/// Shape check (`T` + 33 base58 chars) plus checksum and version byte
pub fn is_valid_tron_address(address: &str) -> bool {
    address.len() == TRON_ADDRESS_LEN
        && address.starts_with('T')
        && tron_address_to_hex(address).is_ok()
}

/// Encode a 20-byte account given as hex into a base58check address
pub fn tron_address_from_hex(account_hex: &str) -> Result<String, AddressError> {
    let trimmed = account_hex.trim_start_matches("0x");
    let account = hex::decode(trimmed).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    let account = match account.len() {
        20 => account,
        21 if account[0] == TRON_ADDRESS_PREFIX => account[1..].to_vec(),
        n => return Err(AddressError::InvalidLength(n)),
    };

    let mut payload = Vec::with_capacity(21);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(&account);
    Ok(bs58::encode(payload).with_check().into_string())
}

/// Decode a base58check address into its 20-byte account hex
pub fn tron_address_to_hex(address: &str) -> Result<String, AddressError> {
    let payload = bs58::decode(address)
        .with_check(Some(TRON_ADDRESS_PREFIX))
        .into_vec()
        .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
    if payload.len() != 21 {
        return Err(AddressError::InvalidLength(payload.len().saturating_sub(1)));
    }
    Ok(hex::encode(&payload[1..]))
}

/// Address held in an indexed event topic (last 20 of 32 bytes)
pub fn tron_address_from_topic(topic: &str) -> Result<String, AddressError> {
    let trimmed = topic.trim_start_matches("0x");
    if !trimmed.is_ascii() {
        return Err(AddressError::InvalidHex(topic.to_string()));
    }
    if trimmed.len() < 40 {
        return Err(AddressError::InvalidLength(trimmed.len() / 2));
    }
    tron_address_from_hex(&trimmed[trimmed.len() - 40..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const USDT_HEX: &str = "a614f803b6fd780986a42c78ec9c7f77e6ded13c";

    #[test]
    fn test_contract_hex_to_base58() {
        assert_eq!(tron_address_from_hex(USDT_HEX).unwrap(), USDT);
        assert_eq!(tron_address_from_hex(&format!("41{}", USDT_HEX)).unwrap(), USDT);
    }

    #[test]
    fn test_base58_to_hex() {
        assert_eq!(tron_address_to_hex(USDT).unwrap(), USDT_HEX);
    }

    #[test]
    fn test_topic_decoding() {
        let topic = format!("000000000000000000000000{}", USDT_HEX);
        assert_eq!(tron_address_from_topic(&topic).unwrap(), USDT);
        assert!(tron_address_from_topic("abcd").is_err());
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_tron_address(USDT));
        assert!(!is_valid_tron_address("0xa614f803b6fd780986a42c78ec9c7f77e6ded13c"));
        // right shape, broken checksum
        assert!(!is_valid_tron_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6u"));
        assert!(!is_valid_tron_address(""));
    }

    #[test]
    fn test_bad_hex() {
        assert!(matches!(tron_address_from_hex("zz"), Err(AddressError::InvalidHex(_))));
        assert!(matches!(tron_address_from_hex("abcd"), Err(AddressError::InvalidLength(2))));
    }
}
