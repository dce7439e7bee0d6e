use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::directory::{Approver, ApproverDirectory};
use crate::domain::request::{ApprovalRole, OrgId, UserId, WorkRequest};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no active approver holds role {role:?} for this request")]
    NoApproverAvailable { role: ApprovalRole },
    #[error("request has no pending approval step to assign")]
    NoPendingStep,
    #[error("identity directory lookup failed: {0}")]
    Directory(String),
}

/// Picks an assignee for a request's current chain step and keeps the
/// per-approver open-item counters. The counters live behind their own
/// lock, independent of any per-request serialization.
pub struct RoutingEngine<D> {
    directory: D,
    workloads: Mutex<HashMap<UserId, usize>>,
}

impl<D> RoutingEngine<D>
where
    D: ApproverDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { directory, workloads: Mutex::new(HashMap::new()) }
    }

    /// Select the least-loaded eligible approver for the request's current
    /// step and charge their counter. The caller releases the counter when
    /// the request leaves that approver's queue.
    pub async fn assign(&self, request: &WorkRequest) -> Result<UserId, RoutingError> {
        let role = request.current_role().ok_or(RoutingError::NoPendingStep)?;

        if role == ApprovalRole::RequesterConfirmation {
            // Receipt acknowledgement goes back to whoever opened the request.
            self.charge(&request.requester_id);
            return Ok(request.requester_id.clone());
        }

        let entries = self.directory.find_all().await.map_err(RoutingError::Directory)?;
        let scope = org_scope(role, request);

        let mut workloads = self.lock_workloads();
        let mut selected: Option<(&Approver, usize)> = None;
        for candidate in entries.iter().filter(|candidate| {
            candidate.active
                && candidate.role == role
                && scope.map_or(true, |org| candidate.organization.as_ref() == Some(org))
        }) {
            let open_items = workloads.get(&candidate.id).copied().unwrap_or(0);
            // Strict `<` keeps the earliest-registered candidate on ties.
            if selected.as_ref().map_or(true, |(_, best)| open_items < *best) {
                selected = Some((candidate, open_items));
            }
        }

        let (winner, open_items) = selected.ok_or(RoutingError::NoApproverAvailable { role })?;
        let winner_id = winner.id.clone();
        workloads.insert(winner_id.clone(), open_items + 1);
        Ok(winner_id)
    }

    /// Drop one open item from an approver's counter; requests leave a
    /// queue on approval-forward, rejection and cancellation.
    pub fn release(&self, approver_id: &UserId) {
        let mut workloads = self.lock_workloads();
        if let Some(count) = workloads.get_mut(approver_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Snapshot of the counters, for observability only. Selection reads
    /// the live map under its lock, never this copy.
    pub fn workload_statistics(&self) -> HashMap<UserId, usize> {
        self.lock_workloads().clone()
    }

    /// Re-derive the counters from the in-flight assignments; the request
    /// store is the authoritative source after a restart.
    pub fn rebuild<I>(&self, assignments: I)
    where
        I: IntoIterator<Item = UserId>,
    {
        let mut counts: HashMap<UserId, usize> = HashMap::new();
        for id in assignments {
            *counts.entry(id).or_insert(0) += 1;
        }
        *self.lock_workloads() = counts;
    }

    fn charge(&self, approver_id: &UserId) {
        let mut workloads = self.lock_workloads();
        *workloads.entry(approver_id.clone()).or_insert(0) += 1;
    }

    fn lock_workloads(&self) -> MutexGuard<'_, HashMap<UserId, usize>> {
        match self.workloads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn org_scope(role: ApprovalRole, request: &WorkRequest) -> Option<&OrgId> {
    match role {
        ApprovalRole::CampusCoordinator | ApprovalRole::DestinationCoordinator => {
            Some(&request.target_org)
        }
        ApprovalRole::OriginEnterpriseManager => Some(&request.requester_org),
        ApprovalRole::PoliceEvidenceCustodian | ApprovalRole::RequesterConfirmation => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::config::WorkflowRules;
    use crate::directory::{Approver, InMemoryApproverDirectory};
    use crate::domain::payload::{ItemClaimPayload, RequestPayload, TransferPayload};
    use crate::domain::request::{ApprovalRole, OrgId, RequestId, UserId, WorkRequest};

    use super::{RoutingEngine, RoutingError};

    fn approver(id: &str, role: ApprovalRole, org: &str) -> Approver {
        Approver {
            id: UserId(id.to_owned()),
            name: id.to_owned(),
            role,
            organization: Some(OrgId(org.to_owned())),
            active: true,
        }
    }

    fn coordinators(ids: &[&str]) -> InMemoryApproverDirectory {
        InMemoryApproverDirectory::new(
            ids.iter()
                .map(|id| approver(id, ApprovalRole::CampusCoordinator, "org-university"))
                .collect(),
        )
    }

    fn claim_request(id: &str) -> WorkRequest {
        WorkRequest::open(
            RequestId(id.to_owned()),
            RequestPayload::ItemClaim(ItemClaimPayload {
                item_description: "Calculator".to_owned(),
                declared_value: Decimal::new(3_500, 2),
                claim_details: "Left in lecture hall 3 after the morning exam".to_owned(),
                identifying_features: "Name written inside the cover".to_owned(),
                proof_description: "Matches the registration card on file".to_owned(),
                photo_reference: None,
            }),
            UserId("u-requester".to_owned()),
            OrgId("org-university".to_owned()),
            OrgId("org-university".to_owned()),
            &WorkflowRules::default(),
            Utc::now(),
        )
        .expect("claim payload should be valid")
    }

    fn transfer_request_at_confirmation() -> WorkRequest {
        let mut request = WorkRequest::open(
            RequestId("WR-T".to_owned()),
            RequestPayload::OrgTransfer(TransferPayload {
                item_description: "Violin in a hard case".to_owned(),
                origin_org: OrgId("org-transit".to_owned()),
                destination_org: OrgId("org-university".to_owned()),
                justification: "Owner identified as a university student".to_owned(),
                manifest_reference: None,
            }),
            UserId("u-requester".to_owned()),
            OrgId("org-transit".to_owned()),
            OrgId("org-university".to_owned()),
            &WorkflowRules::default(),
            Utc::now(),
        )
        .expect("transfer payload should be valid");
        request.approval_step = 2;
        request
    }

    #[tokio::test]
    async fn equal_loads_distribute_one_each_before_any_second() {
        let engine = RoutingEngine::new(coordinators(&["u-a", "u-b", "u-c"]));
        let request = claim_request("WR-1");

        let mut picks = Vec::new();
        for _ in 0..3 {
            picks.push(engine.assign(&request).await.expect("candidates exist").0);
        }

        assert_eq!(picks, vec!["u-a", "u-b", "u-c"]);

        let fourth = engine.assign(&request).await.expect("candidates exist");
        assert_eq!(fourth.0, "u-a");
    }

    #[tokio::test]
    async fn ties_break_by_registration_order() {
        let engine = RoutingEngine::new(coordinators(&["u-late-but-first", "u-second"]));
        let pick = engine.assign(&claim_request("WR-1")).await.expect("candidates exist");
        assert_eq!(pick.0, "u-late-but-first");
    }

    #[tokio::test]
    async fn release_returns_an_approver_to_the_front() {
        let engine = RoutingEngine::new(coordinators(&["u-a", "u-b"]));
        let request = claim_request("WR-1");

        let first = engine.assign(&request).await.expect("candidates exist");
        assert_eq!(first.0, "u-a");
        engine.release(&first);

        let second = engine.assign(&request).await.expect("candidates exist");
        assert_eq!(second.0, "u-a");
    }

    #[tokio::test]
    async fn coordinators_outside_the_target_org_are_ineligible() {
        let directory = InMemoryApproverDirectory::new(vec![approver(
            "u-elsewhere",
            ApprovalRole::CampusCoordinator,
            "org-transit",
        )]);
        let engine = RoutingEngine::new(directory);

        let error = engine.assign(&claim_request("WR-1")).await.expect_err("no in-scope candidate");
        assert_eq!(
            error,
            RoutingError::NoApproverAvailable { role: ApprovalRole::CampusCoordinator }
        );
    }

    #[tokio::test]
    async fn inactive_approvers_are_skipped() {
        let directory = coordinators(&["u-a", "u-b"]);
        directory.set_active(&UserId("u-a".to_owned()), false).await;
        let engine = RoutingEngine::new(directory);

        let pick = engine.assign(&claim_request("WR-1")).await.expect("active candidate exists");
        assert_eq!(pick.0, "u-b");
    }

    #[tokio::test]
    async fn requester_confirmation_goes_to_the_requester() {
        let engine = RoutingEngine::new(coordinators(&["u-a"]));
        let request = transfer_request_at_confirmation();

        let pick = engine.assign(&request).await.expect("requester step always assigns");
        assert_eq!(pick, request.requester_id);
        assert_eq!(engine.workload_statistics().get(&request.requester_id).copied(), Some(1));
    }

    #[tokio::test]
    async fn rebuild_replaces_counters_from_in_flight_assignments() {
        let engine = RoutingEngine::new(coordinators(&["u-a", "u-b"]));
        let request = claim_request("WR-1");
        let _ = engine.assign(&request).await.expect("candidates exist");

        engine.rebuild(vec![
            UserId("u-b".to_owned()),
            UserId("u-b".to_owned()),
            UserId("u-a".to_owned()),
        ]);

        let statistics = engine.workload_statistics();
        assert_eq!(statistics.get(&UserId("u-a".to_owned())).copied(), Some(1));
        assert_eq!(statistics.get(&UserId("u-b".to_owned())).copied(), Some(2));

        let pick = engine.assign(&request).await.expect("candidates exist");
        assert_eq!(pick.0, "u-a");
    }
}
