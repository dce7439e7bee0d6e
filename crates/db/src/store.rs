use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use reclaim_core::domain::payload::{RequestKind, RequestPayload};
use reclaim_core::domain::request::{
    ApprovalRecord, ApprovalRole, OrgId, Priority, RequestId, RequestStatus, UserId, WorkRequest,
};
use reclaim_core::store::{RequestStore, StoreError};

use crate::DbPool;

pub struct SqliteRequestStore {
    pool: DbPool,
}

impl SqliteRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn status_as_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::InProgress => "in_progress",
        RequestStatus::Approved => "approved",
        RequestStatus::Rejected => "rejected",
        RequestStatus::Cancelled => "cancelled",
        RequestStatus::Completed => "completed",
    }
}

fn parse_status(raw: &str) -> Result<RequestStatus, StoreError> {
    match raw {
        "pending" => Ok(RequestStatus::Pending),
        "in_progress" => Ok(RequestStatus::InProgress),
        "approved" => Ok(RequestStatus::Approved),
        "rejected" => Ok(RequestStatus::Rejected),
        "cancelled" => Ok(RequestStatus::Cancelled),
        "completed" => Ok(RequestStatus::Completed),
        other => Err(StoreError::Decode(format!("unknown request status `{other}`"))),
    }
}

fn priority_as_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn parse_priority(raw: &str) -> Result<Priority, StoreError> {
    match raw {
        "low" => Ok(Priority::Low),
        "normal" => Ok(Priority::Normal),
        "high" => Ok(Priority::High),
        "urgent" => Ok(Priority::Urgent),
        other => Err(StoreError::Decode(format!("unknown priority `{other}`"))),
    }
}

fn kind_as_str(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::ItemClaim => "item_claim",
        RequestKind::EvidenceReview => "evidence_review",
        RequestKind::OrgTransfer => "org_transfer",
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn decode(error: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(error.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(decode)
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<WorkRequest, StoreError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let payload_json: String = row.try_get("payload").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let priority_str: String = row.try_get("priority").map_err(decode)?;
    let chain_json: String = row.try_get("approval_chain").map_err(decode)?;
    let approval_step: i64 = row.try_get("approval_step").map_err(decode)?;
    let history_json: String = row.try_get("approver_history").map_err(decode)?;
    let current_approver_id: Option<String> =
        row.try_get("current_approver_id").map_err(decode)?;
    let requester_id: String = row.try_get("requester_id").map_err(decode)?;
    let requester_org_id: String = row.try_get("requester_org_id").map_err(decode)?;
    let target_org_id: String = row.try_get("target_org_id").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;
    let completed_at_str: Option<String> = row.try_get("completed_at").map_err(decode)?;
    let sla_target_hours: i64 = row.try_get("sla_target_hours").map_err(decode)?;
    let notes: Option<String> = row.try_get("notes").map_err(decode)?;

    let payload: RequestPayload = serde_json::from_str(&payload_json).map_err(decode)?;
    let approval_chain: Vec<ApprovalRole> = serde_json::from_str(&chain_json).map_err(decode)?;
    let approver_history: Vec<ApprovalRecord> =
        serde_json::from_str(&history_json).map_err(decode)?;
    let completed_at = completed_at_str.as_deref().map(parse_timestamp).transpose()?;

    Ok(WorkRequest {
        id: RequestId(id),
        payload,
        status: parse_status(&status_str)?,
        priority: parse_priority(&priority_str)?,
        approval_chain,
        approval_step: usize::try_from(approval_step).map_err(decode)?,
        approver_history,
        current_approver: current_approver_id.map(UserId),
        requester_id: UserId(requester_id),
        requester_org: OrgId(requester_org_id),
        target_org: OrgId(target_org_id),
        created_at: parse_timestamp(&created_at_str)?,
        completed_at,
        sla_target_hours,
        notes,
    })
}

struct EncodedRequest {
    payload: String,
    chain: String,
    history: String,
}

fn encode_request(request: &WorkRequest) -> Result<EncodedRequest, StoreError> {
    Ok(EncodedRequest {
        payload: serde_json::to_string(&request.payload).map_err(decode)?,
        chain: serde_json::to_string(&request.approval_chain).map_err(decode)?,
        history: serde_json::to_string(&request.approver_history).map_err(decode)?,
    })
}

const SELECT_COLUMNS: &str = "SELECT id, payload, status, priority, approval_chain, \
     approval_step, approver_history, current_approver_id, requester_id, requester_org_id, \
     target_org_id, created_at, completed_at, sla_target_hours, notes FROM work_request";

#[async_trait]
impl RequestStore for SqliteRequestStore {
    async fn create(&self, request: WorkRequest) -> Result<(), StoreError> {
        let encoded = encode_request(&request)?;
        let result = sqlx::query(
            "INSERT INTO work_request (id, request_type, payload, status, priority, \
             approval_chain, approval_step, approver_history, current_approver_id, requester_id, \
             requester_org_id, target_org_id, created_at, completed_at, sla_target_hours, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(kind_as_str(request.kind()))
        .bind(&encoded.payload)
        .bind(status_as_str(request.status))
        .bind(priority_as_str(request.priority))
        .bind(&encoded.chain)
        .bind(request.approval_step as i64)
        .bind(&encoded.history)
        .bind(request.current_approver.as_ref().map(|approver| approver.0.as_str()))
        .bind(&request.requester_id.0)
        .bind(&request.requester_org.0)
        .bind(&request.target_org.0)
        .bind(request.created_at.to_rfc3339())
        .bind(request.completed_at.map(|at| at.to_rfc3339()))
        .bind(request.sla_target_hours)
        .bind(request.notes.as_deref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                Err(StoreError::Conflict(request.id.0.clone()))
            }
            Err(error) => Err(backend(error)),
        }
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<WorkRequest>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<WorkRequest>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_request).collect()
    }

    async fn find_by_status(&self, status: RequestStatus) -> Result<Vec<WorkRequest>, StoreError> {
        let rows =
            sqlx::query(&format!("{SELECT_COLUMNS} WHERE status = ? ORDER BY created_at, id"))
                .bind(status_as_str(status))
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        rows.iter().map(row_to_request).collect()
    }

    async fn find_assigned_to(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<WorkRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE current_approver_id = ? ORDER BY created_at, id"
        ))
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_request).collect()
    }

    async fn find_by_requester(
        &self,
        requester_id: &UserId,
    ) -> Result<Vec<WorkRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE requester_id = ? ORDER BY created_at, id"
        ))
        .bind(&requester_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_request).collect()
    }

    async fn update(&self, request: WorkRequest) -> Result<(), StoreError> {
        let encoded = encode_request(&request)?;
        let result = sqlx::query(
            "UPDATE work_request SET payload = ?, status = ?, priority = ?, approval_chain = ?, \
             approval_step = ?, approver_history = ?, current_approver_id = ?, completed_at = ?, \
             notes = ? WHERE id = ?",
        )
        .bind(&encoded.payload)
        .bind(status_as_str(request.status))
        .bind(priority_as_str(request.priority))
        .bind(&encoded.chain)
        .bind(request.approval_step as i64)
        .bind(&encoded.history)
        .bind(request.current_approver.as_ref().map(|approver| approver.0.as_str()))
        .bind(request.completed_at.map(|at| at.to_rfc3339()))
        .bind(request.notes.as_deref())
        .bind(&request.id.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(request.id.0.clone()));
        }
        Ok(())
    }
}
