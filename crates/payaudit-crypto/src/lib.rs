//! # payaudit-crypto -- Portal Token Primitives
//!
//! Provides the cryptographic building blocks for single-use portal links:
//!
//! - **Token generation** from the operating system CSPRNG (256 bits,
//!   hex-encoded for use in a URL query string).
//! - **SHA-256 token hashing.** Only the hash is ever persisted; a leaked
//!   store does not yield usable bearer tokens.
//! - **Constant-time comparison** of token hashes.
//!
//! ## Crate Policy
//!
//! - The raw token type ([`PortalToken`]) zeroizes on drop and never prints
//!   its value through `Debug`.
//! - No mocking of cryptographic operations in tests.

pub mod error;
pub mod token;

pub use error::TokenError;
pub use token::{hash_token, PortalToken, TokenHash};
