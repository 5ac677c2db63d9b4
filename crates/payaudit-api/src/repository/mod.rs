//! # Request Repository
//!
//! The single storage interface for [`AuditRequest`]. Two implementations:
//! [`MemoryRepository`] for development and tests, and
//! [`PgRequestRepository`](crate::db::requests::PgRequestRepository) when
//! `DATABASE_URL` is set.
//!
//! All writes after creation go through [`RequestRepository::try_update`],
//! a read-modify-write that either stores the mutated aggregate or leaves
//! the stored one untouched.

pub mod memory;

use async_trait::async_trait;
use payaudit_core::{EmailAddress, RequestId};
use payaudit_crypto::TokenHash;
use payaudit_state::{AuditRequest, LifecycleError};
use thiserror::Error;

pub use memory::MemoryRepository;

/// A lifecycle mutation applied inside [`RequestRepository::try_update`].
///
/// Returning `Err` discards every change the closure made.
pub type Mutation<'a> =
    Box<dyn FnOnce(&mut AuditRequest) -> Result<(), LifecycleError> + Send + 'a>;

/// Outcome of [`RequestRepository::try_update`]: `None` when the id is
/// unknown, otherwise the updated aggregate or the rejection.
pub type UpdateResult = Option<Result<AuditRequest, LifecycleError>>;

/// Storage failures.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back onto the aggregate.
    #[error("stored request {id} is corrupt: {reason}")]
    Corrupt { id: RequestId, reason: String },

    #[error("request {0} already exists")]
    Duplicate(RequestId),
}

/// Persistent keyed store of audit requests.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Store a new request. Fails with [`RepoError::Duplicate`] if the id exists.
    async fn insert(&self, request: &AuditRequest) -> Result<(), RepoError>;

    async fn get(&self, id: RequestId) -> Result<Option<AuditRequest>, RepoError>;

    /// The request whose current token hash equals `hash`.
    async fn find_by_token_hash(&self, hash: &TokenHash)
        -> Result<Option<AuditRequest>, RepoError>;

    /// All requests addressed to `email`, newest first.
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Vec<AuditRequest>, RepoError>;

    /// All requests, oldest first.
    async fn list(&self) -> Result<Vec<AuditRequest>, RepoError>;

    /// Atomically load, mutate and store one request.
    async fn try_update(
        &self,
        id: RequestId,
        mutation: Mutation<'_>,
    ) -> Result<UpdateResult, RepoError>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> Result<(), RepoError>;
}
