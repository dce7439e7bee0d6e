use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::request::{RequestId, RequestStatus, UserId, WorkRequest};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("request `{0}` already exists")]
    Conflict(String),
    #[error("request `{0}` does not exist")]
    Missing(String),
    #[error("stored request could not be decoded: {0}")]
    Decode(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Durable-store contract the engine writes through. Implementations must
/// provide read-after-write consistency for the same id within a process;
/// durability is their concern, not the engine's.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create(&self, request: WorkRequest) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<WorkRequest>, StoreError>;
    async fn find_all(&self) -> Result<Vec<WorkRequest>, StoreError>;
    async fn find_by_status(&self, status: RequestStatus) -> Result<Vec<WorkRequest>, StoreError>;
    async fn find_assigned_to(&self, approver_id: &UserId)
        -> Result<Vec<WorkRequest>, StoreError>;
    async fn find_by_requester(
        &self,
        requester_id: &UserId,
    ) -> Result<Vec<WorkRequest>, StoreError>;
    async fn update(&self, request: WorkRequest) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<String, WorkRequest>>,
}

fn by_creation(mut requests: Vec<WorkRequest>) -> Vec<WorkRequest> {
    requests.sort_by(|left, right| {
        left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
    });
    requests
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(&self, request: WorkRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::Conflict(request.id.0.clone()));
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<WorkRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn find_all(&self) -> Result<Vec<WorkRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(by_creation(requests.values().cloned().collect()))
    }

    async fn find_by_status(&self, status: RequestStatus) -> Result<Vec<WorkRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(by_creation(
            requests.values().filter(|request| request.status == status).cloned().collect(),
        ))
    }

    async fn find_assigned_to(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<WorkRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(by_creation(
            requests
                .values()
                .filter(|request| request.current_approver.as_ref() == Some(approver_id))
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_requester(
        &self,
        requester_id: &UserId,
    ) -> Result<Vec<WorkRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(by_creation(
            requests
                .values()
                .filter(|request| &request.requester_id == requester_id)
                .cloned()
                .collect(),
        ))
    }

    async fn update(&self, request: WorkRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id.0) {
            return Err(StoreError::Missing(request.id.0.clone()));
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }
}
