//! In-memory repository.
//!
//! A `parking_lot::RwLock` around a `HashMap`. The lock is never held
//! across an `.await`, so the async trait methods complete synchronously.
//! State does not survive restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use payaudit_core::{EmailAddress, RequestId};
use payaudit_crypto::TokenHash;
use payaudit_state::AuditRequest;

use super::{Mutation, RepoError, RequestRepository, UpdateResult};

/// Thread-safe, cloneable in-memory store of audit requests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    data: Arc<RwLock<HashMap<RequestId, AuditRequest>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RequestRepository for MemoryRepository {
    async fn insert(&self, request: &AuditRequest) -> Result<(), RepoError> {
        let mut guard = self.data.write();
        if guard.contains_key(&request.id) {
            return Err(RepoError::Duplicate(request.id));
        }
        guard.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<AuditRequest>, RepoError> {
        Ok(self.data.read().get(&id).cloned())
    }

    async fn find_by_token_hash(
        &self,
        hash: &TokenHash,
    ) -> Result<Option<AuditRequest>, RepoError> {
        Ok(self
            .data
            .read()
            .values()
            .find(|r| r.portal_token_hash.is_some_and(|h| h.matches(hash)))
            .cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Vec<AuditRequest>, RepoError> {
        let mut hits: Vec<AuditRequest> = self
            .data
            .read()
            .values()
            .filter(|r| &r.customer_email == email)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits)
    }

    async fn list(&self) -> Result<Vec<AuditRequest>, RepoError> {
        let mut all: Vec<AuditRequest> = self.data.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn try_update(
        &self,
        id: RequestId,
        mutation: Mutation<'_>,
    ) -> Result<UpdateResult, RepoError> {
        let mut guard = self.data.write();
        let Some(stored) = guard.get_mut(&id) else {
            return Ok(None);
        };
        // Mutate a copy so a rejected transition leaves the stored record intact.
        let mut draft = stored.clone();
        Ok(Some(match mutation(&mut draft) {
            Ok(()) => {
                *stored = draft.clone();
                Ok(draft)
            }
            Err(e) => Err(e),
        }))
    }

    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use payaudit_crypto::PortalToken;
    use payaudit_state::{AuditStatus, LifecycleError};

    fn request(email: &str) -> AuditRequest {
        AuditRequest::new(
            "Acme".into(),
            "Jane".into(),
            EmailAddress::new(email).unwrap(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let repo = MemoryRepository::new();
        let r = request("a@b.io");
        repo.insert(&r).await.unwrap();
        assert!(matches!(repo.insert(&r).await, Err(RepoError::Duplicate(_))));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn token_hash_lookup() {
        let repo = MemoryRepository::new();
        let mut r = request("a@b.io");
        let token = PortalToken::generate();
        r.issue_token(token.hash(), Utc::now(), Utc::now());
        repo.insert(&r).await.unwrap();

        let found = repo.find_by_token_hash(&token.hash()).await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(r.id));
        let other = PortalToken::generate();
        assert!(repo.find_by_token_hash(&other.hash()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_record_unchanged() {
        let repo = MemoryRepository::new();
        let r = request("a@b.io");
        repo.insert(&r).await.unwrap();

        let result = repo
            .try_update(
                r.id,
                Box::new(|req: &mut AuditRequest| {
                    req.company_name = "Mutated".into();
                    Err(LifecycleError::ReportMissing)
                }),
            )
            .await
            .unwrap();
        assert_eq!(result, Some(Err(LifecycleError::ReportMissing)));
        assert_eq!(repo.get(r.id).await.unwrap().unwrap().company_name, "Acme");
    }

    #[tokio::test]
    async fn successful_mutation_is_stored() {
        let repo = MemoryRepository::new();
        let r = request("a@b.io");
        repo.insert(&r).await.unwrap();

        let updated = repo
            .try_update(
                r.id,
                Box::new(|req: &mut AuditRequest| {
                    req.status = AuditStatus::Paid;
                    Ok(())
                }),
            )
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, AuditStatus::Paid);
        assert_eq!(repo.get(r.id).await.unwrap().unwrap().status, AuditStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_id_yields_none() {
        let repo = MemoryRepository::new();
        let out = repo
            .try_update(RequestId::new(), Box::new(|_: &mut AuditRequest| Ok(())))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn email_lookup_is_exact() {
        let repo = MemoryRepository::new();
        repo.insert(&request("a@b.io")).await.unwrap();
        repo.insert(&request("c@b.io")).await.unwrap();
        let hits = repo
            .find_by_email(&EmailAddress::new("A@B.io").unwrap())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
