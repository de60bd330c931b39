use std::collections::HashMap;

use tokio::sync::RwLock;

use eapproval_core::audit::AuditEvent;
use eapproval_core::domain::request::{Request, RequestId};

use super::{AuditEventRepository, RepositoryError, RequestRepository, RequestScope};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: Request) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list(&self, scope: &RequestScope) -> Result<Vec<Request>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut listed: Vec<Request> =
            requests.values().filter(|request| scope.includes(request)).cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.0.cmp(&a.id.0)));
        Ok(listed)
    }

    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        Ok(requests.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| &event.request_id == id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use eapproval_core::audit::{AuditCategory, AuditContext};
    use eapproval_core::domain::approval::{ApprovalRecord, UserId};
    use eapproval_core::domain::request::{Request, RequestId, RequestType};
    use eapproval_core::session::{Role, Session};

    use crate::repositories::{
        AuditEventRepository, InMemoryAuditEventRepository, InMemoryRequestRepository,
        RequestRepository, RequestScope,
    };

    fn request(id: &str, requester: &str, approver: &str, age_days: i64) -> Request {
        let created_at = Utc::now() - Duration::days(age_days);
        Request {
            id: RequestId(id.to_string()),
            requester_id: UserId::from(requester),
            staff_name: requester.to_string(),
            staff_department: None,
            request_type: RequestType::ItSupport,
            details: "Laptop will not boot".to_string(),
            leave: None,
            items: Vec::new(),
            attachments: Vec::new(),
            staff_signature: None,
            approvals: vec![ApprovalRecord::pending(1, approver)],
            assigned_technician: None,
            assigned_at: None,
            sla_hours: None,
            maintenance_status: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn in_memory_request_repo_round_trip() {
        let repo = InMemoryRequestRepository::default();
        let request = request("REQ-1", "staff-1", "hod-1", 0);

        repo.save(request.clone()).await.expect("save request");
        let found = repo.find_by_id(&request.id).await.expect("find request");

        assert_eq!(found, Some(request));
    }

    #[tokio::test]
    async fn in_memory_listing_is_scoped_and_newest_first() {
        let repo = InMemoryRequestRepository::default();
        repo.save(request("REQ-1", "staff-1", "hod-1", 3)).await.expect("save");
        repo.save(request("REQ-2", "staff-2", "hod-1", 1)).await.expect("save");
        repo.save(request("REQ-3", "staff-1", "hod-2", 2)).await.expect("save");

        let by_approver =
            repo.list(&RequestScope::Approver(UserId::from("hod-1"))).await.expect("list");
        let ids: Vec<_> = by_approver.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-2", "REQ-1"]);

        let own = repo.list(&RequestScope::Requester(UserId::from("staff-1"))).await.expect("own");
        let ids: Vec<_> = own.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-3", "REQ-1"]);

        assert!(repo
            .list(&RequestScope::Technician(UserId::from("tech-1")))
            .await
            .expect("technician")
            .is_empty());
    }

    #[tokio::test]
    async fn in_memory_delete_reports_presence() {
        let repo = InMemoryRequestRepository::default();
        let request = request("REQ-9", "staff-1", "hod-1", 0);
        repo.save(request.clone()).await.expect("save");

        assert!(repo.delete(&request.id).await.expect("delete"));
        assert!(!repo.delete(&request.id).await.expect("delete again"));
        assert!(repo.find_by_id(&request.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn in_memory_audit_repo_filters_by_request() {
        let repo = InMemoryAuditEventRepository::default();
        let staff = Session::new("staff-1", "Nur Aisyah", Role::Staff);
        for request_id in ["REQ-1", "REQ-2", "REQ-1"] {
            let audit = AuditContext::new(RequestId(request_id.to_string()), "corr", &staff);
            repo.append(audit.succeeded("request.submitted", AuditCategory::Request))
                .await
                .expect("append");
        }

        let events =
            repo.list_for_request(&RequestId("REQ-1".to_string())).await.expect("list events");
        assert_eq!(events.len(), 2);
    }
}
