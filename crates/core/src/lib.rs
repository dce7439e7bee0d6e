pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod routing;
pub mod service;
pub mod sla;
pub mod store;

pub use config::{ConfigError, SlaHours, WorkflowRules};
pub use directory::{Approver, ApproverDirectory, InMemoryApproverDirectory};
pub use domain::payload::{
    EvidencePayload, ItemClaimPayload, RequestKind, RequestPayload, TransferPayload,
};
pub use domain::request::{
    AdvanceOutcome, ApprovalRecord, ApprovalRole, OrgId, Priority, RequestId, RequestStatus,
    UserId, WorkRequest,
};
pub use errors::{ServiceError, WorkflowError};
pub use notify::{InMemoryNotificationSink, NotificationSink, StatusChange};
pub use routing::{RoutingEngine, RoutingError};
pub use service::{ApprovalOutcome, CreationReceipt, NewRequest, WorkflowService};
pub use sla::SlaTracker;
pub use store::{InMemoryRequestStore, RequestStore, StoreError};
