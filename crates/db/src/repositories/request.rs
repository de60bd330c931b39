use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;

use eapproval_core::approvals;
use eapproval_core::domain::approval::{ApprovalRecord, ApprovalStatus, UserId};
use eapproval_core::domain::request::{LeavePeriod, Request, RequestId, RequestType};
use eapproval_core::flows::MaintenanceState;

use super::{decode, parse_timestamp, RepositoryError, RequestRepository, RequestScope};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, requester_id, staff_name, staff_department, request_type,
    details, leave_start, leave_end, items_json, attachments_json, staff_signature,
    assigned_technician, assigned_at, sla_hours, maintenance_status, created_at, updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn approval_status_as_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

fn parse_approval_status(value: &str) -> Result<ApprovalStatus, RepositoryError> {
    match value {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown approval status `{other}`"))),
    }
}

fn maintenance_state_as_str(state: MaintenanceState) -> &'static str {
    match state {
        MaintenanceState::Submitted => "submitted",
        MaintenanceState::InProgress => "in_progress",
        MaintenanceState::Completed => "completed",
    }
}

fn parse_maintenance_state(value: &str) -> Result<MaintenanceState, RepositoryError> {
    match value {
        "submitted" => Ok(MaintenanceState::Submitted),
        "in_progress" => Ok(MaintenanceState::InProgress),
        "completed" => Ok(MaintenanceState::Completed),
        other => Err(RepositoryError::Decode(format!("unknown maintenance status `{other}`"))),
    }
}

fn parse_date(column: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_level(row: &SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let level: i64 = decode(row, "level")?;
    let level = u32::try_from(level)
        .map_err(|_| RepositoryError::Decode(format!("invalid approval level {level}")))?;
    let status: String = decode(row, "status")?;
    let decided_at: Option<String> = decode(row, "decided_at")?;

    Ok(ApprovalRecord {
        level,
        approver_id: decode::<Option<String>>(row, "approver_id")?.map(UserId),
        approver_name: decode(row, "approver_name")?,
        status: parse_approval_status(&status)?,
        reason: decode(row, "reason")?,
        signature: decode(row, "signature")?,
        decided_at: decided_at.map(|value| parse_timestamp("decided_at", &value)).transpose()?,
    })
}

fn row_to_request(
    row: &SqliteRow,
    approvals: Vec<ApprovalRecord>,
) -> Result<Request, RepositoryError> {
    let id: String = decode(row, "id")?;
    let request_type: String = decode(row, "request_type")?;
    let request_type = request_type
        .parse::<RequestType>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let leave_start: Option<String> = decode(row, "leave_start")?;
    let leave_end: Option<String> = decode(row, "leave_end")?;
    let leave = match (leave_start, leave_end) {
        (Some(start), Some(end)) => Some(LeavePeriod {
            start: parse_date("leave_start", &start)?,
            end: parse_date("leave_end", &end)?,
        }),
        _ => None,
    };

    let items_json: String = decode(row, "items_json")?;
    let attachments_json: String = decode(row, "attachments_json")?;
    let assigned_at: Option<String> = decode(row, "assigned_at")?;
    let sla_hours: Option<i64> = decode(row, "sla_hours")?;
    let maintenance_status: Option<String> = decode(row, "maintenance_status")?;
    let created_at: String = decode(row, "created_at")?;
    let updated_at: String = decode(row, "updated_at")?;

    approvals::validate_chain(&approvals)
        .map_err(|e| RepositoryError::Decode(format!("request `{id}` has a corrupt chain: {e}")))?;

    Ok(Request {
        id: RequestId(id),
        requester_id: UserId(decode(row, "requester_id")?),
        staff_name: decode(row, "staff_name")?,
        staff_department: decode(row, "staff_department")?,
        request_type,
        details: decode(row, "details")?,
        leave,
        items: serde_json::from_str(&items_json)
            .map_err(|e| RepositoryError::Decode(format!("items_json: {e}")))?,
        attachments: serde_json::from_str(&attachments_json)
            .map_err(|e| RepositoryError::Decode(format!("attachments_json: {e}")))?,
        staff_signature: decode(row, "staff_signature")?,
        approvals,
        assigned_technician: decode::<Option<String>>(row, "assigned_technician")?.map(UserId),
        assigned_at: assigned_at.map(|value| parse_timestamp("assigned_at", &value)).transpose()?,
        sla_hours: sla_hours
            .map(|hours| {
                u32::try_from(hours)
                    .map_err(|_| RepositoryError::Decode(format!("invalid sla_hours {hours}")))
            })
            .transpose()?,
        maintenance_status: maintenance_status
            .map(|value| parse_maintenance_state(&value))
            .transpose()?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

impl SqlRequestRepository {
    async fn levels_by_request(
        &self,
        scope_clause: &str,
        bind: Option<&str>,
    ) -> Result<HashMap<String, Vec<ApprovalRecord>>, RepositoryError> {
        let sql = format!(
            "SELECT request_id, level, approver_id, approver_name, status, reason, signature,
                    decided_at
             FROM approval_level
             WHERE request_id IN (SELECT id FROM request {scope_clause})
             ORDER BY request_id, level"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let mut grouped: HashMap<String, Vec<ApprovalRecord>> = HashMap::new();
        for row in query.fetch_all(&self.pool).await? {
            let request_id: String = decode(&row, "request_id")?;
            grouped.entry(request_id).or_default().push(row_to_level(&row)?);
        }
        Ok(grouped)
    }
}

fn scope_clause(scope: &RequestScope) -> (&'static str, Option<&str>) {
    match scope {
        RequestScope::All => ("", None),
        RequestScope::Requester(user_id) => ("WHERE requester_id = ?", Some(user_id.as_str())),
        RequestScope::Approver(user_id) => (
            "WHERE id IN (SELECT request_id FROM approval_level WHERE approver_id = ?)",
            Some(user_id.as_str()),
        ),
        RequestScope::Technician(user_id) => {
            ("WHERE assigned_technician = ?", Some(user_id.as_str()))
        }
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let levels = sqlx::query(
            "SELECT level, approver_id, approver_name, status, reason, signature, decided_at
             FROM approval_level WHERE request_id = ? ORDER BY level",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_level)
        .collect::<Result<Vec<_>, _>>()?;

        row_to_request(&row, levels).map(Some)
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&request.items)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let attachments_json = serde_json::to_string(&request.attachments)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO request ({REQUEST_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 staff_name = excluded.staff_name,
                 staff_department = excluded.staff_department,
                 details = excluded.details,
                 leave_start = excluded.leave_start,
                 leave_end = excluded.leave_end,
                 items_json = excluded.items_json,
                 attachments_json = excluded.attachments_json,
                 staff_signature = excluded.staff_signature,
                 assigned_technician = excluded.assigned_technician,
                 assigned_at = excluded.assigned_at,
                 sla_hours = excluded.sla_hours,
                 maintenance_status = excluded.maintenance_status,
                 updated_at = excluded.updated_at"
        ))
        .bind(&request.id.0)
        .bind(request.requester_id.as_str())
        .bind(&request.staff_name)
        .bind(&request.staff_department)
        .bind(request.request_type.as_str())
        .bind(&request.details)
        .bind(request.leave.map(|period| period.start.format("%Y-%m-%d").to_string()))
        .bind(request.leave.map(|period| period.end.format("%Y-%m-%d").to_string()))
        .bind(&items_json)
        .bind(&attachments_json)
        .bind(&request.staff_signature)
        .bind(request.assigned_technician.as_ref().map(UserId::as_str))
        .bind(request.assigned_at.map(|dt| dt.to_rfc3339()))
        .bind(request.sla_hours.map(i64::from))
        .bind(request.maintenance_status.map(maintenance_state_as_str))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for record in &request.approvals {
            sqlx::query(
                "INSERT INTO approval_level (request_id, level, approver_id, approver_name,
                                             status, reason, signature, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(request_id, level) DO UPDATE SET
                     approver_id = excluded.approver_id,
                     approver_name = excluded.approver_name,
                     status = excluded.status,
                     reason = excluded.reason,
                     signature = excluded.signature,
                     decided_at = excluded.decided_at",
            )
            .bind(&request.id.0)
            .bind(i64::from(record.level))
            .bind(record.approver_id.as_ref().map(UserId::as_str))
            .bind(&record.approver_name)
            .bind(approval_status_as_str(record.status))
            .bind(&record.reason)
            .bind(&record.signature)
            .bind(record.decided_at.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, scope: &RequestScope) -> Result<Vec<Request>, RepositoryError> {
        let (clause, bind) = scope_clause(scope);
        let mut levels = self.levels_by_request(clause, bind).await?;

        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM request {clause} ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| {
                let id: String = decode(row, "id")?;
                row_to_request(row, levels.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM request WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
