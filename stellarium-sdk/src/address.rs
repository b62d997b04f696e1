//! Stellar account address validation.
//!
//! Account ids are "strkeys": RFC 4648 base32 (no padding) over
//!
//! ```text
//! version_byte (1) || ed25519 public key (32) || crc16_xmodem (2, little endian)
//! ```
//!
//! Only public account keys (`G...`, version byte `6 << 3`) are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version byte of an ed25519 public account key.
const ACCOUNT_ID_VERSION: u8 = 6 << 3;

/// Encoded length of an account id.
const ENCODED_LEN: usize = 56;

/// Decoded length: version + key + checksum.
const DECODED_LEN: usize = 35;

/// Errors produced while parsing an account address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid length: expected {ENCODED_LEN} characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid base32 encoding")]
    InvalidBase32,
    #[error("not an account id (version byte {0:#04x})")]
    InvalidVersion(u8),
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// A validated Stellar account id such as `GB2SWT...AJGX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StellarAddress(String);

impl StellarAddress {
    /// Parse and validate an account id.
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        if value.len() != ENCODED_LEN {
            return Err(AddressError::InvalidLength(value.len()));
        }
        let raw = fast32::base32::RFC4648_NOPAD
            .decode_str(value)
            .map_err(|_| AddressError::InvalidBase32)?;
        if raw.len() != DECODED_LEN {
            return Err(AddressError::InvalidBase32);
        }
        if raw[0] != ACCOUNT_ID_VERSION {
            return Err(AddressError::InvalidVersion(raw[0]));
        }
        let (payload, checksum) = raw.split_at(DECODED_LEN - 2);
        let expected = u16::from_le_bytes([checksum[0], checksum[1]]);
        if crc16_xmodem(payload) != expected {
            return Err(AddressError::ChecksumMismatch);
        }
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StellarAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StellarAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StellarAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StellarAddress> for String {
    fn from(value: StellarAddress) -> Self {
        value.0
    }
}

/// CRC-16/XMODEM (poly 0x1021, init 0x0000).
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
