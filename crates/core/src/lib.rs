pub mod analytics;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod session;

pub use analytics::{AnalyticsSummary, MaintenanceKpis, ReportMonth, StatusCounts};
pub use approvals::{
    apply_decision, can_act, current_level, overall_status, ApproverAssignment, ChainShapeError,
    Decision, InvalidTransition, TransitionViolation,
};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
pub use domain::approval::{ApprovalRecord, ApprovalStatus, UserId};
pub use domain::request::{
    Attachment, LeavePeriod, NewRequest, PurchaseItem, Request, RequestId, RequestType,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, MaintenanceEvent, MaintenanceFlow, MaintenanceState};
pub use session::{Permission, Role, Session};
