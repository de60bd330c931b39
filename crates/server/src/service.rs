//! Request workflow orchestration.
//!
//! Each operation takes the caller's [`Session`] explicitly, checks the role
//! table, runs the pure evaluator from `eapproval_core`, persists through the
//! repository traits, then records an audit event and publishes a change.

use std::sync::Arc;

use chrono::Utc;
use eapproval_core::analytics::{self, AnalyticsSummary, ReportMonth};
use eapproval_core::approvals::{apply_decision, Decision, InvalidTransition};
use eapproval_core::audit::{AuditCategory, AuditContext, AuditEvent};
use eapproval_core::domain::approval::{ApprovalStatus, UserId};
use eapproval_core::domain::request::{NewRequest, Request, RequestId};
use eapproval_core::flows::{FlowEngine, MaintenanceEvent, MaintenanceFlow, MaintenanceState};
use eapproval_core::session::{Permission, Role, Session};
use eapproval_core::{ApplicationError, DomainError};
use eapproval_db::repositories::{
    AuditEventRepository, RepositoryError, RequestRepository, RequestScope,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::{ChangeFeed, ChangeKind, RequestChange};

/// A request as a particular caller sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub overall_status: ApprovalStatus,
    pub current_level: Option<u32>,
    /// The level the caller may decide right now.
    pub actionable_level: Option<u32>,
}

impl RequestView {
    pub fn for_caller(request: Request, session: &Session) -> Self {
        let actionable_level = match session.role {
            Role::Approver => request.actionable_level_for(&session.user_id),
            _ => None,
        };
        Self {
            overall_status: request.overall_status(),
            current_level: request.current_level(),
            actionable_level,
            request,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionInput {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianAssignment {
    pub technician_id: UserId,
    #[serde(default)]
    pub sla_hours: Option<u32>,
}

pub struct RequestService {
    requests: Arc<dyn RequestRepository>,
    audit: Arc<dyn AuditEventRepository>,
    feed: ChangeFeed,
    flow: FlowEngine<MaintenanceFlow>,
    default_sla_hours: u32,
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        audit: Arc<dyn AuditEventRepository>,
        feed: ChangeFeed,
        default_sla_hours: u32,
    ) -> Self {
        Self { requests, audit, feed, flow: FlowEngine::default(), default_sla_hours }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub async fn submit(
        &self,
        session: &Session,
        correlation_id: &str,
        submission: NewRequest,
    ) -> Result<RequestView, ApplicationError> {
        session.require(Permission::SubmitRequest)?;

        let id = RequestId(format!("REQ-{}", &Uuid::new_v4().simple().to_string()[..12]));
        let request = submission.into_request(id, session, Utc::now())?;
        self.requests.save(request.clone()).await.map_err(persistence)?;

        info!(
            event_name = "request.submitted",
            correlation_id,
            request_id = %request.id,
            request_type = request.request_type.as_str(),
            levels = request.approvals.len(),
            "request submitted"
        );
        self.record(
            AuditContext::new(request.id.clone(), correlation_id, session)
                .succeeded("request.submitted", AuditCategory::Request)
                .with_metadata("request_type", request.request_type.as_str())
                .with_metadata("levels", request.approvals.len().to_string()),
        )
        .await;
        self.publish(ChangeKind::Submitted, &request, session, correlation_id);

        Ok(RequestView::for_caller(request, session))
    }

    /// Role-scoped listing, newest first.
    pub async fn list(&self, session: &Session) -> Result<Vec<RequestView>, ApplicationError> {
        let scope = match session.role {
            Role::Staff => {
                session.require(Permission::ViewOwnRequests)?;
                RequestScope::Requester(session.user_id.clone())
            }
            Role::Approver => {
                session.require(Permission::ViewAssignedApprovals)?;
                RequestScope::Approver(session.user_id.clone())
            }
            Role::Technician => {
                session.require(Permission::WorkMaintenance)?;
                RequestScope::Technician(session.user_id.clone())
            }
            Role::Admin => {
                session.require(Permission::ViewAllRequests)?;
                RequestScope::All
            }
        };

        let requests = self.requests.list(&scope).await.map_err(persistence)?;
        Ok(requests.into_iter().map(|request| RequestView::for_caller(request, session)).collect())
    }

    pub async fn get(
        &self,
        session: &Session,
        id: &RequestId,
    ) -> Result<RequestView, ApplicationError> {
        let request = self.load_visible(session, id).await?;
        Ok(RequestView::for_caller(request, session))
    }

    /// Decides the level that is currently the caller's turn.
    pub async fn decide(
        &self,
        session: &Session,
        correlation_id: &str,
        id: &RequestId,
        decision: Decision,
        input: DecisionInput,
    ) -> Result<RequestView, ApplicationError> {
        session.require(Permission::DecideLevel)?;
        let mut request = self.load_visible(session, id).await?;

        let Some(level) = request.actionable_level_for(&session.user_id) else {
            let refused = InvalidTransition::not_actionable(&request.approvals, &session.user_id);
            self.record_refusal(session, correlation_id, id, &refused).await;
            return Err(DomainError::from(refused).into());
        };

        let signature = input.signature.trim();
        if signature.is_empty() {
            let missing = DomainError::Validation("a signature is required to decide".to_string());
            return Err(missing.into());
        }
        if decision == Decision::Approved
            && request.is_maintenance()
            && request.assigned_technician.is_none()
        {
            return Err(DomainError::Validation(
                "assign a technician before approving a maintenance request".to_string(),
            )
            .into());
        }

        let reason = input.reason.as_deref();
        let decided = match apply_decision(&request.approvals, level, decision, reason) {
            Ok(decided) => decided,
            Err(refused) => {
                self.record_refusal(session, correlation_id, id, &refused).await;
                return Err(DomainError::from(refused).into());
            }
        };

        let now = Utc::now();
        request.approvals = decided;
        if let Some(record) = request.approvals.iter_mut().find(|record| record.level == level) {
            record.signature = Some(signature.to_string());
            record.decided_at = Some(now);
            if record.approver_name.is_none() {
                record.approver_name = Some(session.display_name.clone());
            }
        }
        request.updated_at = now;
        self.requests.save(request.clone()).await.map_err(persistence)?;

        let overall = request.overall_status();
        info!(
            event_name = "approval.level_decided",
            correlation_id,
            request_id = %request.id,
            level,
            decision = ?decision,
            overall_status = %overall,
            "approval level decided"
        );
        self.record(
            AuditContext::new(request.id.clone(), correlation_id, session)
                .succeeded("approval.level_decided", AuditCategory::Approval)
                .with_metadata("level", level.to_string())
                .with_metadata("decision", format!("{decision:?}"))
                .with_metadata("overall_status", overall.to_string()),
        )
        .await;
        self.publish(ChangeKind::Decided, &request, session, correlation_id);

        Ok(RequestView::for_caller(request, session))
    }

    pub async fn assign_technician(
        &self,
        session: &Session,
        correlation_id: &str,
        id: &RequestId,
        assignment: TechnicianAssignment,
    ) -> Result<RequestView, ApplicationError> {
        session.require(Permission::AssignTechnician)?;
        let mut request = self.load_visible(session, id).await?;

        if !request.is_maintenance() {
            return Err(DomainError::Validation(format!(
                "technicians can only be assigned to maintenance requests, not {}",
                request.request_type.label()
            ))
            .into());
        }
        if request.overall_status() == ApprovalStatus::Rejected {
            return Err(DomainError::InvariantViolation(format!(
                "request `{id}` was rejected and cannot be assigned"
            ))
            .into());
        }
        if matches!(
            request.maintenance_status,
            Some(MaintenanceState::InProgress | MaintenanceState::Completed)
        ) {
            return Err(DomainError::InvariantViolation(format!(
                "maintenance work on `{id}` has already started"
            ))
            .into());
        }

        let technician = assignment.technician_id.as_str().trim();
        if technician.is_empty() {
            return Err(DomainError::Validation("a technician id is required".to_string()).into());
        }
        let sla_hours = assignment.sla_hours.unwrap_or(self.default_sla_hours);
        if sla_hours == 0 {
            let message = "sla hours must be greater than zero".to_string();
            return Err(DomainError::Validation(message).into());
        }

        let now = Utc::now();
        request.assigned_technician = Some(UserId::from(technician));
        request.assigned_at = Some(now);
        request.sla_hours = Some(sla_hours);
        request.maintenance_status = Some(self.flow.initial_state());
        request.updated_at = now;
        self.requests.save(request.clone()).await.map_err(persistence)?;

        info!(
            event_name = "maintenance.technician_assigned",
            correlation_id,
            request_id = %request.id,
            technician,
            sla_hours,
            "technician assigned"
        );
        self.record(
            AuditContext::new(request.id.clone(), correlation_id, session)
                .succeeded("maintenance.technician_assigned", AuditCategory::Maintenance)
                .with_metadata("technician", technician)
                .with_metadata("sla_hours", sla_hours.to_string()),
        )
        .await;
        self.publish(ChangeKind::TechnicianAssigned, &request, session, correlation_id);

        Ok(RequestView::for_caller(request, session))
    }

    /// Moves assigned maintenance work one step: `Submitted -> InProgress -> Completed`.
    pub async fn advance_maintenance(
        &self,
        session: &Session,
        correlation_id: &str,
        id: &RequestId,
    ) -> Result<RequestView, ApplicationError> {
        session.require(Permission::WorkMaintenance)?;
        let mut request = self.load_visible(session, id).await?;

        if request.overall_status() != ApprovalStatus::Approved {
            return Err(DomainError::InvariantViolation(format!(
                "maintenance on `{id}` can start only once every level has approved"
            ))
            .into());
        }

        let current = request.maintenance_status.unwrap_or_else(|| self.flow.initial_state());
        let event = self.flow.next_event(current).unwrap_or(MaintenanceEvent::WorkCompleted);
        let audit = AuditContext::new(id.clone(), correlation_id, session);
        let (result, entry) = self.flow.apply_audited(current, event, &audit);
        self.record(entry).await;
        let outcome = result.map_err(DomainError::from)?;

        request.maintenance_status = Some(outcome.to);
        request.updated_at = Utc::now();
        self.requests.save(request.clone()).await.map_err(persistence)?;

        info!(
            event_name = "maintenance.advanced",
            correlation_id,
            request_id = %request.id,
            from = %outcome.from,
            to = %outcome.to,
            "maintenance work advanced"
        );
        self.publish(ChangeKind::MaintenanceAdvanced, &request, session, correlation_id);

        Ok(RequestView::for_caller(request, session))
    }

    pub async fn delete(
        &self,
        session: &Session,
        correlation_id: &str,
        id: &RequestId,
    ) -> Result<(), ApplicationError> {
        session.require(Permission::DeleteRequest)?;

        let request = self.load_visible(session, id).await?;
        if !self.requests.delete(id).await.map_err(persistence)? {
            return Err(not_found(id));
        }

        info!(event_name = "request.deleted", correlation_id, request_id = %id, "request deleted");
        self.record(
            AuditContext::new(id.clone(), correlation_id, session)
                .succeeded("request.deleted", AuditCategory::Request),
        )
        .await;
        self.publish(ChangeKind::Deleted, &request, session, correlation_id);
        Ok(())
    }

    pub async fn analytics(
        &self,
        session: &Session,
        month: Option<&str>,
    ) -> Result<AnalyticsSummary, ApplicationError> {
        session.require(Permission::ViewAnalytics)?;
        let month = month
            .map(str::trim)
            .filter(|month| !month.is_empty())
            .map(str::parse::<ReportMonth>)
            .transpose()?;

        let requests = self.requests.list(&RequestScope::All).await.map_err(persistence)?;
        Ok(analytics::summarize(&requests, month, Utc::now()))
    }

    /// Audit trail of one request, oldest first.
    pub async fn audit_trail(
        &self,
        session: &Session,
        id: &RequestId,
    ) -> Result<Vec<AuditEvent>, ApplicationError> {
        session.require(Permission::ViewAllRequests)?;
        self.audit.list_for_request(id).await.map_err(persistence)
    }

    /// Loads a request the caller is allowed to see. Hidden requests look missing.
    async fn load_visible(
        &self,
        session: &Session,
        id: &RequestId,
    ) -> Result<Request, ApplicationError> {
        let request = self
            .requests
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| not_found(id))?;

        if !request.is_visible_to(session) {
            return Err(not_found(id));
        }
        Ok(request)
    }

    async fn record(&self, event: AuditEvent) {
        let event_type = event.event_type.clone();
        let correlation_id = event.correlation_id.clone();
        if let Err(error) = self.audit.append(event).await {
            warn!(
                event_name = "audit.persist_failed",
                correlation_id = %correlation_id,
                audit_event = %event_type,
                error = %error,
                "audit event could not be stored"
            );
        }
    }

    async fn record_refusal(
        &self,
        session: &Session,
        correlation_id: &str,
        id: &RequestId,
        refused: &InvalidTransition,
    ) {
        self.record(AuditContext::new(id.clone(), correlation_id, session).refused(
            "approval.decision_refused",
            AuditCategory::Approval,
            refused.to_string(),
        ))
        .await;
    }

    fn publish(
        &self,
        kind: ChangeKind,
        request: &Request,
        session: &Session,
        correlation_id: &str,
    ) {
        self.feed.publish(RequestChange::new(kind, request, session.actor(), correlation_id));
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn not_found(id: &RequestId) -> ApplicationError {
    ApplicationError::NotFound { entity: "request", id: id.to_string() }
}
