//! Workflow service facade: the single entry point that coordinates the
//! state machine, routing engine, SLA tracker and storage collaborator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WorkflowRules;
use crate::directory::ApproverDirectory;
use crate::domain::payload::RequestPayload;
use crate::domain::request::{
    AdvanceOutcome, ApprovalRole, OrgId, RequestId, RequestStatus, UserId, WorkRequest,
};
use crate::errors::{ServiceError, WorkflowError};
use crate::notify::{NotificationSink, StatusChange};
use crate::routing::{RoutingEngine, RoutingError};
use crate::sla::SlaTracker;
use crate::store::RequestStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    pub payload: RequestPayload,
    pub requester_id: UserId,
    pub requester_org: OrgId,
    pub target_org: OrgId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreationReceipt {
    pub request_id: RequestId,
    /// Absent when no directory candidate held the first role; the request
    /// is persisted Pending and needs operational attention.
    pub assigned_to: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Advanced { next_role: ApprovalRole, assigned_to: Option<UserId> },
    FullyApproved,
}

pub struct WorkflowService<S, D, N> {
    store: S,
    routing: RoutingEngine<D>,
    sink: N,
    rules: WorkflowRules,
    sla: SlaTracker,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, D, N> WorkflowService<S, D, N>
where
    S: RequestStore,
    D: ApproverDirectory,
    N: NotificationSink,
{
    pub fn new(store: S, directory: D, sink: N, rules: WorkflowRules) -> Self {
        let sla = SlaTracker::from_rules(&rules);
        Self {
            store,
            routing: RoutingEngine::new(directory),
            sink,
            rules,
            sla,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the routing counters from the in-flight requests in the
    /// store. Call once after constructing a service over pre-existing
    /// data; the store, not the counter map, is authoritative.
    pub async fn recover_workloads(&self) -> Result<(), ServiceError> {
        let requests = self.store.find_all().await?;
        self.routing.rebuild(requests.into_iter().filter_map(|request| {
            request.status.is_active().then_some(request.current_approver).flatten()
        }));
        Ok(())
    }

    pub async fn create_request(
        &self,
        new_request: NewRequest,
    ) -> Result<CreationReceipt, ServiceError> {
        let request_id = RequestId(Uuid::new_v4().to_string());
        let mut request = WorkRequest::open(
            request_id.clone(),
            new_request.payload,
            new_request.requester_id,
            new_request.requester_org,
            new_request.target_org,
            &self.rules,
            Utc::now(),
        )?;

        let assigned = match self.routing.assign(&request).await {
            Ok(approver_id) => Some(approver_id),
            Err(RoutingError::NoApproverAvailable { role }) => {
                warn!(request_id = %request_id.0, ?role, "no approver available at creation");
                None
            }
            Err(error) => return Err(error.into()),
        };
        request.current_approver = assigned.clone();

        let requester_id = request.requester_id.clone();
        let kind = request.kind();
        let priority = request.priority;
        if let Err(error) = self.store.create(request).await {
            if let Some(approver_id) = &assigned {
                self.routing.release(approver_id);
            }
            return Err(error.into());
        }

        info!(request_id = %request_id.0, ?kind, ?priority, "work request created");
        let mut change =
            StatusChange::new(request_id.clone(), None, RequestStatus::Pending, requester_id.0)
                .with_metadata("kind", format!("{kind:?}"))
                .with_metadata("priority", format!("{priority:?}"));
        if let Some(approver_id) = &assigned {
            change = change.with_metadata("assigned_to", approver_id.0.clone());
        }
        self.sink.notify(change);

        Ok(CreationReceipt { request_id, assigned_to: assigned })
    }

    pub async fn approve_request(
        &self,
        request_id: &RequestId,
        approver_id: &UserId,
        approver_name: &str,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let guard = self.request_lock(request_id);
        let _held = guard.lock().await;

        let mut request = self.load(request_id).await?;
        let from = request.status;
        let previous = request.current_approver.clone();
        let outcome = request.advance_approval(approver_id, approver_name, Utc::now())?;

        match outcome {
            AdvanceOutcome::FullyApproved => {
                let step = request.approval_step;
                self.store.update(request).await?;
                if let Some(previous) = &previous {
                    self.routing.release(previous);
                }

                info!(request_id = %request_id.0, "work request fully approved");
                self.sink.notify(
                    StatusChange::new(
                        request_id.clone(),
                        Some(from),
                        RequestStatus::Approved,
                        approver_id.0.clone(),
                    )
                    .with_metadata("step", step.to_string()),
                );
                Ok(ApprovalOutcome::FullyApproved)
            }
            AdvanceOutcome::NextStep(next_role) => {
                let assigned = match self.routing.assign(&request).await {
                    Ok(next_approver) => Some(next_approver),
                    Err(RoutingError::NoApproverAvailable { role }) => {
                        warn!(request_id = %request_id.0, ?role, "no approver for next step");
                        None
                    }
                    Err(error) => return Err(error.into()),
                };
                request.current_approver = assigned.clone();

                let step = request.approval_step;
                if let Err(error) = self.store.update(request).await {
                    if let Some(next_approver) = &assigned {
                        self.routing.release(next_approver);
                    }
                    return Err(error.into());
                }
                if let Some(previous) = &previous {
                    self.routing.release(previous);
                }

                info!(request_id = %request_id.0, step, ?next_role, "work request advanced");
                let mut change = StatusChange::new(
                    request_id.clone(),
                    Some(from),
                    RequestStatus::InProgress,
                    approver_id.0.clone(),
                )
                .with_metadata("step", step.to_string())
                .with_metadata("next_role", format!("{next_role:?}"));
                if let Some(next_approver) = &assigned {
                    change = change.with_metadata("assigned_to", next_approver.0.clone());
                }
                self.sink.notify(change);

                Ok(ApprovalOutcome::Advanced { next_role, assigned_to: assigned })
            }
        }
    }

    pub async fn reject_request(
        &self,
        request_id: &RequestId,
        approver_id: &UserId,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let guard = self.request_lock(request_id);
        let _held = guard.lock().await;

        let mut request = self.load(request_id).await?;
        if let Some(current) = &request.current_approver {
            if current != approver_id {
                return Err(
                    WorkflowError::InvalidApprover { approver_id: approver_id.0.clone() }.into()
                );
            }
        }

        let from = request.status;
        let previous = request.current_approver.clone();
        request.reject(reason)?;
        self.store.update(request).await?;
        if let Some(previous) = &previous {
            self.routing.release(previous);
        }

        info!(request_id = %request_id.0, "work request rejected");
        self.sink.notify(
            StatusChange::new(
                request_id.clone(),
                Some(from),
                RequestStatus::Rejected,
                approver_id.0.clone(),
            )
            .with_metadata("reason", reason),
        );
        Ok(())
    }

    pub async fn cancel_request(
        &self,
        request_id: &RequestId,
        caller: &UserId,
    ) -> Result<(), ServiceError> {
        let guard = self.request_lock(request_id);
        let _held = guard.lock().await;

        let mut request = self.load(request_id).await?;
        let from = request.status;
        let previous = request.current_approver.clone();
        request.cancel(caller)?;
        self.store.update(request).await?;
        if let Some(previous) = &previous {
            self.routing.release(previous);
        }

        info!(request_id = %request_id.0, "work request cancelled");
        self.sink.notify(StatusChange::new(
            request_id.clone(),
            Some(from),
            RequestStatus::Cancelled,
            caller.0.clone(),
        ));
        Ok(())
    }

    pub async fn complete_request(&self, request_id: &RequestId) -> Result<(), ServiceError> {
        let guard = self.request_lock(request_id);
        let _held = guard.lock().await;

        let mut request = self.load(request_id).await?;
        let from = request.status;
        request.complete(Utc::now())?;
        self.store.update(request).await?;

        info!(request_id = %request_id.0, "work request completed");
        self.sink.notify(StatusChange::new(
            request_id.clone(),
            Some(from),
            RequestStatus::Completed,
            "workflow-service",
        ));
        Ok(())
    }

    pub async fn request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<WorkRequest>, ServiceError> {
        Ok(self.store.find_by_id(request_id).await?)
    }

    pub async fn all_requests(&self) -> Result<Vec<WorkRequest>, ServiceError> {
        Ok(self.store.find_all().await?)
    }

    pub async fn overdue_requests(&self) -> Result<Vec<WorkRequest>, ServiceError> {
        self.overdue_requests_at(Utc::now()).await
    }

    pub async fn overdue_requests_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkRequest>, ServiceError> {
        let requests = self.store.find_all().await?;
        Ok(requests.into_iter().filter(|request| self.sla.is_overdue(request, now)).collect())
    }

    pub async fn approaching_sla_requests(&self) -> Result<Vec<WorkRequest>, ServiceError> {
        self.approaching_sla_requests_at(Utc::now()).await
    }

    pub async fn approaching_sla_requests_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkRequest>, ServiceError> {
        let requests = self.store.find_all().await?;
        Ok(requests
            .into_iter()
            .filter(|request| self.sla.is_approaching_breach(request, now))
            .collect())
    }

    pub fn workload_statistics(&self) -> HashMap<UserId, usize> {
        self.routing.workload_statistics()
    }

    async fn load(&self, request_id: &RequestId) -> Result<WorkRequest, ServiceError> {
        self.store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ServiceError::RequestNotFound(request_id.0.clone()))
    }

    /// One async mutex per request id; operations on different ids never
    /// contend. Entries are kept for the process lifetime, matching the
    /// audit-retention of the requests themselves.
    fn request_lock(&self, request_id: &RequestId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(request_id.0.clone()).or_default())
    }
}
