//! Address normalization and salted one-way hashing
//!
//! The raw address only ever exists as a request-scoped [`NormalizedAddress`],
//! which has no `Serialize` impl and a redacting `Debug` impl so it cannot
//! leak through logs or persistence by accident. Only the
//! [`AddressFingerprint`] (SHA-256 of salt and normalized text) may be kept.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

/// Street-type and directional spellings folded before hashing
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("road", "rd"),
    ("boulevard", "blvd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("court", "ct"),
    ("place", "pl"),
    ("terrace", "ter"),
    ("highway", "hwy"),
    ("parkway", "pkwy"),
    ("circle", "cir"),
    ("apartment", "apt"),
    ("suite", "ste"),
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
    ("northeast", "ne"),
    ("northwest", "nw"),
    ("southeast", "se"),
    ("southwest", "sw"),
];

/// Request-scoped normalized address text
pub struct NormalizedAddress(String);

impl NormalizedAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NormalizedAddress(<redacted>)")
    }
}

/// Normalize free-text address input
///
/// Lower-cases, drops punctuation other than commas and `#`, collapses
/// whitespace within each comma-separated component and folds common
/// street-type spellings, so trivially different inputs hash identically.
pub fn normalize_address(raw: &str) -> NormalizedAddress {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ',' || c == '#' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let components: Vec<String> = lowered
        .split(',')
        .map(|component| {
            component
                .split_whitespace()
                .map(|word| {
                    ABBREVIATIONS
                        .iter()
                        .find(|(long, _)| *long == word)
                        .map(|(_, short)| *short)
                        .unwrap_or(word)
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|component| !component.is_empty())
        .collect();

    NormalizedAddress(components.join(", "))
}

/// Salted SHA-256 of a normalized address (64 hex characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressFingerprint(String);

impl AddressFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix suitable for debug logging
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for AddressFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic salted hasher
#[derive(Clone)]
pub struct AddressHasher {
    salt: String,
}

impl AddressHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Hash a normalized address
    ///
    /// The salt is length-prefixed so ("ab", "c") and ("a", "bc") differ.
    pub fn fingerprint(&self, address: &NormalizedAddress) -> AddressFingerprint {
        let mut hasher = Sha256::new();
        hasher.update((self.salt.len() as u64).to_be_bytes());
        hasher.update(self.salt.as_bytes());
        hasher.update(address.as_str().as_bytes());
        AddressFingerprint(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Debug for AddressHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AddressHasher(<salt redacted>)")
    }
}

/// Generate a 256-bit random salt as hex
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
