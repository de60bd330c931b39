use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;

use eapproval_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use eapproval_core::domain::request::RequestId;

use super::{decode, parse_timestamp, AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let category: String = decode(row, "category")?;
    let outcome: String = decode(row, "outcome")?;
    let metadata_json: String = decode(row, "metadata_json")?;
    let occurred_at: String = decode(row, "occurred_at")?;

    Ok(AuditEvent {
        event_id: decode(row, "id")?,
        request_id: RequestId(decode(row, "request_id")?),
        correlation_id: decode(row, "correlation_id")?,
        event_type: decode(row, "event_type")?,
        category: AuditCategory::parse(&category).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown audit category `{category}`"))
        })?,
        actor: decode(row, "actor")?,
        outcome: AuditOutcome::parse(&outcome).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown audit outcome `{outcome}`"))
        })?,
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata_json)
            .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (id, request_id, correlation_id, event_type, category,
                                      actor, outcome, metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.request_id.0)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(&metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, correlation_id, event_type, category, actor, outcome,
                    metadata_json, occurred_at
             FROM audit_event WHERE request_id = ? ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use eapproval_core::audit::{AuditCategory, AuditContext, AuditOutcome};
    use eapproval_core::domain::request::RequestId;
    use eapproval_core::session::{Role, Session};

    use super::SqlAuditEventRepository;
    use crate::repositories::{AuditEventRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn appended_events_are_listed_per_request_in_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlAuditEventRepository::new(pool);
        let request_id = RequestId("REQ-1".to_string());
        let staff = Session::new("staff-1", "Nur Aisyah", Role::Staff);
        let approver = Session::new("hod-1", "Farid Hassan", Role::Approver);

        let submitted = AuditContext::new(request_id.clone(), "corr-1", &staff)
            .succeeded("request.submitted", AuditCategory::Request);
        let decided = AuditContext::new(request_id.clone(), "corr-2", &approver)
            .succeeded("approval.level_decided", AuditCategory::Approval)
            .with_metadata("level", "1")
            .with_metadata("decision", "Approved");
        let refused = AuditContext::new(request_id.clone(), "corr-3", &approver).refused(
            "approval.decision_refused",
            AuditCategory::Approval,
            "level 1 is already Approved",
        );
        let unrelated = AuditContext::new(RequestId("REQ-2".to_string()), "corr-4", &staff)
            .succeeded("request.submitted", AuditCategory::Request);

        for event in [submitted.clone(), decided, refused, unrelated] {
            repo.append(event).await.expect("append");
        }

        let events = repo.list_for_request(&request_id).await.expect("list");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_id, submitted.event_id);
        assert_eq!(events[0].correlation_id, "corr-1");
        assert_eq!(events[1].metadata.get("level").map(String::as_str), Some("1"));
        assert_eq!(events[1].category, AuditCategory::Approval);
        assert_eq!(events[2].outcome, AuditOutcome::Rejected);
        assert_eq!(events[2].actor, "approver:hod-1");
    }

    #[tokio::test]
    async fn unknown_stored_labels_are_decode_errors() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query(
            "INSERT INTO audit_event (id, request_id, correlation_id, event_type, category,
                                      actor, outcome, metadata_json, occurred_at)
             VALUES ('evt-1', 'REQ-1', 'corr', 'request.submitted', 'billing',
                     'staff:staff-1', 'success', '{}', '2026-01-05T09:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert raw row");
        let repo = SqlAuditEventRepository::new(pool);

        let error = repo
            .list_for_request(&RequestId("REQ-1".to_string()))
            .await
            .expect_err("unknown category");
        assert!(
            matches!(error, RepositoryError::Decode(ref message) if message.contains("billing"))
        );
    }
}
