use crate::error::{Result, SnapshotError};
use ethers::types::Address;
use num_bigint::BigInt;
use std::str::FromStr;

/// The all-zero address, used to seed cursor pagination.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// Subgraph ids and user-supplied addresses come in mixed case
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address> {
    Address::from_str(s.trim()).map_err(|e| SnapshotError::InvalidAddress(format!("{s}: {e}")))
}

/// Parses a base-10 token amount as reported by a subgraph (`BigInt`/`BigDecimal`
/// scalars are serialized as strings). Amounts with a fractional part are rejected
/// rather than rounded.
pub fn parse_amount(raw: &str) -> Result<BigInt> {
    let trimmed = raw.trim();
    BigInt::from_str(trimmed).map_err(|_| SnapshotError::InvalidAmount(raw.to_string()))
}

/// Parses a decimal token amount (e.g. `"1.5"` with 18 decimals) into base units
/// without going through floating point. Fractional digits beyond `decimals` must
/// be zero; anything else would need rounding and is rejected.
pub fn parse_decimal_amount(raw: &str, decimals: u32) -> Result<BigInt> {
    let trimmed = raw.trim();
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    let unsigned = int_part.trim_start_matches(|c| c == '-' || c == '+');
    if unsigned.is_empty() && frac_part.is_empty() {
        return Err(SnapshotError::InvalidAmount(raw.to_string()));
    }
    if frac_part.chars().any(|c| !c.is_ascii_digit()) {
        return Err(SnapshotError::InvalidAmount(raw.to_string()));
    }

    let scale = decimals as usize;
    let (kept, dropped) = frac_part.split_at(frac_part.len().min(scale));
    if dropped.chars().any(|c| c != '0') {
        return Err(SnapshotError::InvalidAmount(raw.to_string()));
    }

    let int_part = match int_part {
        "" | "-" | "+" => format!("{}0", int_part),
        other => other.to_string(),
    };
    let digits = format!("{}{}{}", int_part, kept, "0".repeat(scale - kept.len()));
    parse_amount(&digits).map_err(|_| SnapshotError::InvalidAmount(raw.to_string()))
}

pub fn i128_to_bigint(value: i128) -> BigInt {
    BigInt::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_handles_values_beyond_u128() {
        let raw = "1157920892373161954235709850086879078532699846656405640394575840079131296399";
        let parsed = parse_amount(raw).unwrap();
        assert_eq!(parsed.to_string(), raw);
        assert_eq!(parse_amount("-42").unwrap(), BigInt::from(-42));
    }

    #[test]
    fn test_parse_amount_rejects_fractions() {
        assert!(matches!(
            parse_amount("1.5"),
            Err(SnapshotError::InvalidAmount(_))
        ));
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_parse_decimal_amount_is_exact() {
        assert_eq!(
            parse_decimal_amount("1.5", 18).unwrap().to_string(),
            "1500000000000000000"
        );
        assert_eq!(
            parse_decimal_amount("123456789.123456789123456789", 18).unwrap().to_string(),
            "123456789123456789123456789"
        );
        assert_eq!(parse_decimal_amount("42", 6).unwrap(), BigInt::from(42_000_000));
        assert_eq!(parse_decimal_amount(".25", 2).unwrap(), BigInt::from(25));
        assert_eq!(parse_decimal_amount("-0.5", 1).unwrap(), BigInt::from(-5));
        assert_eq!(parse_decimal_amount("1.500", 1).unwrap(), BigInt::from(15));
        assert!(parse_decimal_amount("1.05", 1).is_err());
        assert!(parse_decimal_amount("1.2e3", 18).is_err());
    }

    #[test]
    fn test_parse_decimal_amount_rejects_missing_digits() {
        for raw in ["", ".", "-", "+", " ", "-."] {
            assert!(
                matches!(parse_decimal_amount(raw, 18), Err(SnapshotError::InvalidAmount(_))),
                "{:?} should not parse",
                raw
            );
        }
        assert_eq!(parse_decimal_amount("7.", 2).unwrap(), BigInt::from(700));
    }

    #[test]
    fn test_address_normalization() {
        assert_eq!(
            normalize_address(" 0xAbCdEf0000000000000000000000000000000001 "),
            "0xabcdef0000000000000000000000000000000001"
        );
        let addr = string_to_address("0x5FbDF89403270a1846f5ae7d113A989F850d1566").unwrap();
        assert_eq!(
            address_to_string(addr),
            "0x5fbdf89403270a1846f5ae7d113a989f850d1566"
        );
    }
}
