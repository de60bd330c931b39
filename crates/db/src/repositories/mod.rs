use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use eapproval_core::audit::AuditEvent;
use eapproval_core::domain::approval::UserId;
use eapproval_core::domain::request::{Request, RequestId};

pub mod audit;
pub mod memory;
pub mod request;

pub use audit::SqlAuditEventRepository;
pub use memory::{InMemoryAuditEventRepository, InMemoryRequestRepository};
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Reads one column, reporting type mismatches as decode errors.
pub(crate) fn decode<T>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

/// Which requests a listing covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestScope {
    All,
    /// Submitted by this user.
    Requester(UserId),
    /// This user holds at least one level of the chain.
    Approver(UserId),
    /// Maintenance work assigned to this technician.
    Technician(UserId),
}

impl RequestScope {
    pub fn includes(&self, request: &Request) -> bool {
        match self {
            Self::All => true,
            Self::Requester(user_id) => &request.requester_id == user_id,
            Self::Approver(user_id) => request.has_approver(user_id),
            Self::Technician(user_id) => request.is_assigned_to_technician(user_id),
        }
    }
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    /// Inserts or replaces the request together with its whole approval chain.
    async fn save(&self, request: Request) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list(&self, scope: &RequestScope) -> Result<Vec<Request>, RepositoryError>;
    /// Returns `false` when nothing was stored under `id`.
    async fn delete(&self, id: &RequestId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    /// Oldest first.
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<AuditEvent>, RepositoryError>;
}
