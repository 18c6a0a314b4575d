//! Minimal Solidity ABI coding for the four DreamPool contract functions.
//!
//! Only static types are needed (`address`, `uint256`, `bool`), so every
//! argument and return value occupies exactly one 32-byte word.

use crate::errors::{ConciergeError, Result};

const WORD: usize = 32;

/// `poolCount()`
pub const POOL_COUNT_SELECTOR: [u8; 4] = [0xf5, 0x25, 0xcb, 0x68];
/// `getPool(uint256)`
pub const GET_POOL_SELECTOR: [u8; 4] = [0x06, 0x8b, 0xcd, 0x8d];
/// `createPool(address,uint256,uint256)`
pub const CREATE_POOL_SELECTOR: [u8; 4] = [0xb0, 0x39, 0xdd, 0xf6];
/// `deposit(uint256)`
pub const DEPOSIT_SELECTOR: [u8; 4] = [0xb6, 0xb5, 0x5f, 0x25];

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// A single ABI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address([u8; 20]),
    Uint(u128),
}

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(raw: &str) -> Result<[u8; 20]> {
    let hex_part = raw
        .trim()
        .strip_prefix("0x")
        .or_else(|| raw.trim().strip_prefix("0X"))
        .ok_or_else(|| ConciergeError::validation("address", "must start with 0x"))?;
    if hex_part.len() != 40 {
        return Err(ConciergeError::validation(
            "address",
            "must be 42 characters long",
        ));
    }
    let bytes = hex::decode(hex_part)
        .map_err(|_| ConciergeError::validation("address", "contains non-hex characters"))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn is_zero_address(raw: &str) -> bool {
    parse_address(raw).map(|a| a == [0u8; 20]).unwrap_or(false)
}

pub fn format_address(bytes: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Build `0x`-prefixed calldata for `selector(args...)`.
pub fn encode_call(selector: [u8; 4], args: &[Token]) -> String {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector);
    for arg in args {
        let mut word = [0u8; WORD];
        match arg {
            Token::Address(addr) => word[WORD - 20..].copy_from_slice(addr),
            Token::Uint(n) => word[WORD - 16..].copy_from_slice(&n.to_be_bytes()),
        }
        data.extend_from_slice(&word);
    }
    format!("0x{}", hex::encode(data))
}

/// Split an `eth_call` result into 32-byte words, requiring at least `expected`.
pub fn decode_words(raw: &str, expected: usize) -> Result<Vec<[u8; WORD]>> {
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(hex_part).map_err(|e| ConciergeError::Abi(e.to_string()))?;
    if bytes.len() < expected * WORD {
        return Err(ConciergeError::Abi(format!(
            "expected {expected} words, got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(WORD)
        .map(|chunk| {
            let mut word = [0u8; WORD];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Read a `uint256` word; values that do not fit in `u128` are rejected.
pub fn word_to_u128(word: &[u8; WORD]) -> Result<u128> {
    if word[..WORD - 16].iter().any(|b| *b != 0) {
        return Err(ConciergeError::Abi("uint256 value exceeds u128".to_string()));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[WORD - 16..]);
    Ok(u128::from_be_bytes(buf))
}

pub fn word_to_u64(word: &[u8; WORD]) -> Result<u64> {
    u64::try_from(word_to_u128(word)?)
        .map_err(|_| ConciergeError::Abi("uint256 value exceeds u64".to_string()))
}

pub fn word_to_address(word: &[u8; WORD]) -> String {
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&word[WORD - 20..]);
    format_address(&addr)
}

pub fn word_to_bool(word: &[u8; WORD]) -> bool {
    word[WORD - 1] != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_deposit_call() {
        let data = encode_call(DEPOSIT_SELECTOR, &[Token::Uint(7)]);
        assert_eq!(
            data,
            "0xb6b55f250000000000000000000000000000000000000000000000000000000000000007"
        );
    }

    #[test]
    fn encode_address_is_left_padded() {
        let addr = parse_address("0xcC31859af72EaFE13C843d4A5C5d3784B5615677").unwrap();
        let data = encode_call(
            CREATE_POOL_SELECTOR,
            &[Token::Address(addr), Token::Uint(1), Token::Uint(2)],
        );
        assert!(data.starts_with(
            "0xb039ddf6000000000000000000000000cc31859af72eafe13c843d4a5c5d3784b5615677"
        ));
        assert_eq!(data.len(), 2 + 8 + 3 * 64);
    }

    #[test]
    fn parse_address_validates_shape() {
        assert!(parse_address("cC31859af72EaFE13C843d4A5C5d3784B5615677").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzz31859af72EaFE13C843d4A5C5d3784B5615677").is_err());
        assert!(is_zero_address(ZERO_ADDRESS));
        assert!(!is_zero_address("0xcC31859af72EaFE13C843d4A5C5d3784B5615677"));
    }

    #[test]
    fn decode_words_round_trips_static_values() {
        let encoded = encode_call([0, 0, 0, 0], &[Token::Uint(42), Token::Uint(1)]);
        // drop the selector
        let words = decode_words(&format!("0x{}", &encoded[10..]), 2).unwrap();
        assert_eq!(word_to_u128(&words[0]).unwrap(), 42);
        assert!(word_to_bool(&words[1]));
    }

    #[test]
    fn decode_words_rejects_short_input() {
        assert!(matches!(decode_words("0x00", 1), Err(ConciergeError::Abi(_))));
        assert!(matches!(decode_words("0xnothex", 1), Err(ConciergeError::Abi(_))));
    }

    #[test]
    fn oversized_uint_is_rejected() {
        let word = [0xffu8; 32];
        assert!(word_to_u128(&word).is_err());
    }
}
