//! # payaudit-core -- Foundational Types for the Audit Portal
//!
//! Every other crate in the workspace depends on `payaudit-core`; it depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `RequestId`, `ReportId`,
//!    `EmailAddress` are newtypes with validated constructors. No bare strings
//!    for identifiers or addresses.
//!
//! 2. **Validation at the boundary.** String newtypes validate on construction
//!    and on deserialization, so an invalid address can never reach the
//!    lifecycle state machine.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `payaudit-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod email;
pub mod error;
pub mod identity;

pub use email::{EmailAddress, EmailMatch};
pub use error::ValidationError;
pub use identity::{ReportId, RequestId};
