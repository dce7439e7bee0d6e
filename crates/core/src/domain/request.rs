use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WorkflowRules;
use crate::domain::payload::{RequestKind, RequestPayload};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl RequestStatus {
    /// Pending and InProgress requests still sit in an approver queue.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalRole {
    CampusCoordinator,
    PoliceEvidenceCustodian,
    OriginEnterpriseManager,
    DestinationCoordinator,
    RequesterConfirmation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver_id: UserId,
    pub approver_name: String,
    pub approved_at: DateTime<Utc>,
}

/// Shared envelope around every request kind. The chain, priority and SLA
/// target are frozen at creation from the payload; afterwards the envelope
/// mutates only through the four transition operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub id: RequestId,
    pub payload: RequestPayload,
    pub status: RequestStatus,
    pub priority: Priority,
    pub approval_chain: Vec<ApprovalRole>,
    pub approval_step: usize,
    pub approver_history: Vec<ApprovalRecord>,
    pub current_approver: Option<UserId>,
    pub requester_id: UserId,
    pub requester_org: OrgId,
    pub target_org: OrgId,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sla_target_hours: i64,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The chain has another step; the returned role still needs an assignee.
    NextStep(ApprovalRole),
    FullyApproved,
}

impl WorkRequest {
    pub fn open(
        id: RequestId,
        payload: RequestPayload,
        requester_id: UserId,
        requester_org: OrgId,
        target_org: OrgId,
        rules: &WorkflowRules,
        now: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        payload.validate(rules).map_err(WorkflowError::Validation)?;
        let approval_chain = payload.approval_chain(rules);
        let priority = payload.priority(rules);
        let sla_target_hours = payload.sla_target_hours(rules);

        Ok(Self {
            id,
            payload,
            status: RequestStatus::Pending,
            priority,
            approval_chain,
            approval_step: 0,
            approver_history: Vec::new(),
            current_approver: None,
            requester_id,
            requester_org,
            target_org,
            created_at: now,
            completed_at: None,
            sla_target_hours,
            notes: None,
        })
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn current_role(&self) -> Option<ApprovalRole> {
        self.approval_chain.get(self.approval_step).copied()
    }

    pub fn advance_approval(
        &mut self,
        approver_id: &UserId,
        approver_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, WorkflowError> {
        if !self.status.is_active() {
            return Err(WorkflowError::InvalidState {
                operation: "advance_approval",
                status: self.status,
            });
        }
        if self.current_approver.as_ref() != Some(approver_id) {
            return Err(WorkflowError::InvalidApprover { approver_id: approver_id.0.clone() });
        }

        self.approver_history.push(ApprovalRecord {
            approver_id: approver_id.clone(),
            approver_name: approver_name.to_owned(),
            approved_at: now,
        });
        self.approval_step += 1;
        self.current_approver = None;

        if self.approval_step == self.approval_chain.len() {
            self.status = RequestStatus::Approved;
            Ok(AdvanceOutcome::FullyApproved)
        } else {
            self.status = RequestStatus::InProgress;
            Ok(AdvanceOutcome::NextStep(self.approval_chain[self.approval_step]))
        }
    }

    pub fn reject(&mut self, reason: &str) -> Result<(), WorkflowError> {
        if !self.status.is_active() {
            return Err(WorkflowError::InvalidState { operation: "reject", status: self.status });
        }
        self.status = RequestStatus::Rejected;
        self.current_approver = None;
        self.notes = Some(reason.to_owned());
        Ok(())
    }

    pub fn cancel(&mut self, caller: &UserId) -> Result<(), WorkflowError> {
        if caller != &self.requester_id {
            return Err(WorkflowError::Unauthorized { caller_id: caller.0.clone() });
        }
        if !self.status.is_active() {
            return Err(WorkflowError::InvalidState { operation: "cancel", status: self.status });
        }
        self.status = RequestStatus::Cancelled;
        self.current_approver = None;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != RequestStatus::Approved {
            return Err(WorkflowError::InvalidState { operation: "complete", status: self.status });
        }
        self.status = RequestStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.approval_step > self.approval_chain.len() {
            return Err(WorkflowError::InvariantViolation(
                "approval step is past the end of the chain".to_owned(),
            ));
        }
        if self.approver_history.len() != self.approval_step {
            return Err(WorkflowError::InvariantViolation(
                "approver history length does not match the approval step".to_owned(),
            ));
        }
        if self.current_approver.is_some() && !self.status.is_active() {
            return Err(WorkflowError::InvariantViolation(
                "a settled request still has an assigned approver".to_owned(),
            ));
        }
        if self.completed_at.is_some() != (self.status == RequestStatus::Completed) {
            return Err(WorkflowError::InvariantViolation(
                "completion timestamp does not match status".to_owned(),
            ));
        }
        Ok(())
    }
}
