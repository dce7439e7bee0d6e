use thiserror::Error;

use crate::domain::request::RequestStatus;
use crate::routing::RoutingError;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("payload validation failed: {0}")]
    Validation(String),
    #[error("`{operation}` is not allowed while the request is {status:?}")]
    InvalidState { operation: &'static str, status: RequestStatus },
    #[error("`{approver_id}` is not the assigned approver for the current step")]
    InvalidApprover { approver_id: String },
    #[error("`{caller_id}` is not the requester of this request")]
    Unauthorized { caller_id: String },
    #[error("request invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("request not found: `{0}`")]
    RequestNotFound(String),
}
