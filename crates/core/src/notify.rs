use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::{RequestId, RequestStatus};

/// One successful state transition, published for an external notifier.
/// The engine never delivers notifications itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub event_id: String,
    pub request_id: RequestId,
    pub from: Option<RequestStatus>,
    pub to: RequestStatus,
    pub actor: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(
        request_id: RequestId,
        from: Option<RequestStatus>,
        to: RequestStatus,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id,
            from,
            to,
            actor: actor.into(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, change: StatusChange);
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    changes: Arc<Mutex<Vec<StatusChange>>>,
}

impl InMemoryNotificationSink {
    pub fn changes(&self) -> Vec<StatusChange> {
        match self.changes.lock() {
            Ok(changes) => changes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, change: StatusChange) {
        match self.changes.lock() {
            Ok(mut changes) => changes.push(change),
            Err(poisoned) => poisoned.into_inner().push(change),
        }
    }
}
