//! # Portal Tokens
//!
//! A portal token is a 256-bit random bearer credential embedded in a
//! single-use link. The raw value exists only in memory between generation
//! and the outgoing email; storage holds [`TokenHash`] exclusively.
//!
//! ## Security Invariant
//!
//! `PortalToken` zeroizes its buffer on drop and its `Debug` output is
//! redacted, so a raw token cannot leak through a `tracing` field by
//! accident. Lookups compare hashes, never raw tokens.

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TokenError;

const TOKEN_BYTES: usize = 32;
const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

// ---------------------------------------------------------------------------
// Raw token
// ---------------------------------------------------------------------------

/// A raw portal token. Hex-encoded, 64 characters.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PortalToken(String);

impl PortalToken {
    /// Generate a fresh token from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = Self(bytes_to_hex(&bytes));
        bytes.zeroize();
        token
    }

    /// Accept a token presented by a client.
    ///
    /// Surrounding whitespace is ignored and hex digits are case-folded.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MalformedToken`] if the value is not exactly
    /// 64 hex characters.
    pub fn parse(presented: &str) -> Result<Self, TokenError> {
        let trimmed = presented.trim();
        if trimmed.len() != TOKEN_HEX_LEN || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenError::MalformedToken);
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// The raw value, for embedding in a portal link.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// One-way hash of this token.
    pub fn hash(&self) -> TokenHash {
        hash_token(&self.0)
    }
}

impl std::fmt::Debug for PortalToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PortalToken(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Token hash
// ---------------------------------------------------------------------------

/// SHA-256 of a raw portal token. The only form of a token that is persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

/// Hash a raw token string.
pub fn hash_token(raw: &str) -> TokenHash {
    let digest = Sha256::digest(raw.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    TokenHash(bytes)
}

impl TokenHash {
    /// Parse a stored hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidHash`] if the value is not 64 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, TokenError> {
        if hex.len() != TOKEN_HEX_LEN {
            return Err(TokenError::InvalidHash(format!(
                "expected {TOKEN_HEX_LEN} hex characters, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| TokenError::InvalidHash("non-ASCII input".into()))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| TokenError::InvalidHash(format!("invalid hex pair {pair:?}")))?;
        }
        Ok(Self(bytes))
    }

    /// Lowercase hex encoding, as stored.
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.0)
    }

    /// Constant-time equality against another hash.
    pub fn matches(&self, other: &TokenHash) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenHash({}...)", &self.to_hex()[..8])
    }
}

impl std::fmt::Display for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TokenHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let t = PortalToken::generate();
        assert_eq!(t.expose().len(), 64);
        assert!(t.expose().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let a = PortalToken::generate();
        let b = PortalToken::generate();
        assert_ne!(a.expose(), b.expose());
        assert!(!a.hash().matches(&b.hash()));
    }

    #[test]
    fn debug_is_redacted() {
        let t = PortalToken::generate();
        let dbg = format!("{t:?}");
        assert!(!dbg.contains(t.expose()));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            hash_token("abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn parse_normalizes_and_rejects() {
        let t = PortalToken::generate();
        let upper = format!(" {} ", t.expose().to_ascii_uppercase());
        let parsed = PortalToken::parse(&upper).unwrap();
        assert!(parsed.hash().matches(&t.hash()));

        assert_eq!(PortalToken::parse("short").unwrap_err(), TokenError::MalformedToken);
        assert!(PortalToken::parse(&"z".repeat(64)).is_err());
    }

    #[test]
    fn hash_from_hex_rejects_bad_input() {
        assert!(TokenHash::from_hex("abc").is_err());
        assert!(TokenHash::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn hash_serializes_as_hex_string() {
        let h = hash_token("abc");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: TokenHash = serde_json::from_str(&json).unwrap();
        assert!(back.matches(&h));
    }

    proptest! {
        #[test]
        fn hash_hex_roundtrip(raw in ".{0,80}") {
            let h = hash_token(&raw);
            let back = TokenHash::from_hex(&h.to_hex()).unwrap();
            prop_assert!(back.matches(&h));
        }

        #[test]
        fn distinct_inputs_do_not_match(a in "[0-9a-f]{64}", b in "[0-9a-f]{64}") {
            prop_assume!(a != b);
            prop_assert!(!hash_token(&a).matches(&hash_token(&b)));
        }
    }
}
