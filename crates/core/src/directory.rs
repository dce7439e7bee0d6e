use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::request::{ApprovalRole, OrgId, UserId};

/// Directory entry for someone who can hold an approval step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: UserId,
    pub name: String,
    pub role: ApprovalRole,
    pub organization: Option<OrgId>,
    pub active: bool,
}

/// Read-mostly identity directory. Implementations must return entries in
/// registration order; routing tie-breaks depend on it. The routing engine
/// re-queries on every assignment instead of caching.
#[async_trait]
pub trait ApproverDirectory: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Approver>, String>;
}

#[derive(Debug, Default)]
pub struct InMemoryApproverDirectory {
    approvers: RwLock<Vec<Approver>>,
}

impl InMemoryApproverDirectory {
    pub fn new(approvers: Vec<Approver>) -> Self {
        Self { approvers: RwLock::new(approvers) }
    }

    pub async fn register(&self, approver: Approver) {
        let mut approvers = self.approvers.write().await;
        approvers.push(approver);
    }

    pub async fn set_active(&self, id: &UserId, active: bool) {
        let mut approvers = self.approvers.write().await;
        for approver in approvers.iter_mut().filter(|approver| &approver.id == id) {
            approver.active = active;
        }
    }
}

#[async_trait]
impl ApproverDirectory for InMemoryApproverDirectory {
    async fn find_all(&self) -> Result<Vec<Approver>, String> {
        let approvers = self.approvers.read().await;
        Ok(approvers.clone())
    }
}
