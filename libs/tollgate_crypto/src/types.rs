//! Common type aliases used across cryptographic components.

/// Standard byte array length used for hashes, keys and addresses (32 bytes).
pub const STANDARD_ARRAY_LENGTH: usize = 32;
/// Length of an ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Fixed-size 32-byte array (hashes, public keys, addresses).
pub type StdByteArray = [u8; STANDARD_ARRAY_LENGTH];
/// Fixed-size 64-byte ed25519 signature.
pub type SignatureBytes = [u8; SIGNATURE_LENGTH];

/// The all-zero array, used as "no address".
pub const ZERO_ARRAY: StdByteArray = [0u8; STANDARD_ARRAY_LENGTH];

/// Lowercase hex rendering of a byte array.
pub fn to_hex(bytes: &StdByteArray) -> String {
    hex::encode(bytes)
}

/// First four bytes in hex, for log lines and error messages.
pub fn short_hex(bytes: &StdByteArray) -> String {
    format!("0x{}..", hex::encode(&bytes[..4]))
}

/// Parse a 64 character hex string (an optional `0x` prefix is allowed).
pub fn from_hex(text: &str) -> Result<StdByteArray, hex::FromHexError> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    let mut out = ZERO_ARRAY;
    hex::decode_to_slice(text, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_with_prefix() {
        let bytes = [7u8; 32];
        let text = format!("0x{}", to_hex(&bytes));
        assert_eq!(from_hex(&text).unwrap(), bytes);
        assert!(from_hex("abcd").is_err());
        assert_eq!(short_hex(&bytes), "0x07070707..");
    }
}
