//! Ether / wei conversions.

use crate::errors::{ConciergeError, Result};

pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
const ETH_DECIMALS: usize = 18;

/// Parse a decimal ether amount ("0.25", "3", "1.000000000000000001") into wei
/// without going through floating point.
pub fn parse_ether(raw: &str) -> Result<u128> {
    let invalid = |msg: &str| ConciergeError::validation("amount_eth", msg);
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid("amount is required"));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("not a number"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("must be a positive decimal number"));
    }
    if frac.len() > ETH_DECIMALS {
        return Err(invalid("at most 18 decimal places"));
    }

    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .ok()
            .and_then(|w| w.checked_mul(WEI_PER_ETH))
            .ok_or_else(|| invalid("amount too large"))?
    };
    let frac_wei = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = ETH_DECIMALS);
        padded
            .parse::<u128>()
            .map_err(|_| invalid("not a number"))?
    };

    let wei = whole_wei
        .checked_add(frac_wei)
        .ok_or_else(|| invalid("amount too large"))?;
    if wei == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(wei)
}

/// Convert a floating-point ether amount to wei, truncating toward zero.
/// Negative and non-finite inputs map to zero.
pub fn eth_to_wei(eth: f64) -> u128 {
    if !eth.is_finite() || eth <= 0.0 {
        return 0;
    }
    (eth * WEI_PER_ETH as f64).floor() as u128
}

/// Render wei as a trimmed decimal ether string ("1.5", "0.000000000000000001").
pub fn format_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETH;
    let frac = wei % WEI_PER_ETH;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0>width$}", width = ETH_DECIMALS);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Serialize wei amounts as decimal strings; JSON numbers lose precision in
/// most clients above 2^53.
pub mod wei_string {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ether_handles_whole_and_fractional_amounts() {
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETH);
        assert_eq!(parse_ether("0.5").unwrap(), WEI_PER_ETH / 2);
        assert_eq!(parse_ether(".25").unwrap(), WEI_PER_ETH / 4);
        assert_eq!(parse_ether(" 2. ").unwrap(), 2 * WEI_PER_ETH);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
    }

    #[test]
    fn parse_ether_rejects_bad_input() {
        for bad in ["", "   ", ".", "-1", "1e18", "abc", "0", "0.0", "1.0000000000000000001"] {
            let err = parse_ether(bad).unwrap_err();
            assert!(
                matches!(err, ConciergeError::Validation { field: "amount_eth", .. }),
                "expected validation error for {bad:?}"
            );
        }
    }

    #[test]
    fn eth_to_wei_truncates() {
        assert_eq!(eth_to_wei(2.0), 2 * WEI_PER_ETH);
        assert_eq!(eth_to_wei(0.0), 0);
        assert_eq!(eth_to_wei(-3.0), 0);
        assert_eq!(eth_to_wei(f64::NAN), 0);
    }

    #[test]
    fn format_ether_trims_trailing_zeros() {
        assert_eq!(format_ether(WEI_PER_ETH), "1");
        assert_eq!(format_ether(WEI_PER_ETH * 3 / 2), "1.5");
        assert_eq!(format_ether(1), "0.000000000000000001");
        assert_eq!(format_ether(0), "0");
    }
}
