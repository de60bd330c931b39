//! Audit trail entries for request workflow actions.
//!
//! Every entry belongs to one request and carries the acting caller and the
//! correlation id of the call that caused it. Entries are built from an
//! [`AuditContext`] so those three fields are never filled in by hand.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::RequestId;
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Request,
    Approval,
    Maintenance,
}

impl AuditCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Approval => "approval",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Request, Self::Approval, Self::Maintenance]
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// The caller asked for something the workflow does not allow.
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Success, Self::Rejected].into_iter().find(|outcome| outcome.as_str() == value)
    }
}

/// Who is acting on which request, under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditContext {
    pub request_id: RequestId,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        request_id: RequestId,
        correlation_id: impl Into<String>,
        session: &Session,
    ) -> Self {
        Self { request_id, correlation_id: correlation_id.into(), actor: session.actor() }
    }

    pub fn succeeded(&self, event_type: &str, category: AuditCategory) -> AuditEvent {
        self.entry(event_type, category, AuditOutcome::Success)
    }

    /// A refused action, with the refusal kept under the `error` metadata key.
    pub fn refused(
        &self,
        event_type: &str,
        category: AuditCategory,
        error: impl Into<String>,
    ) -> AuditEvent {
        self.entry(event_type, category, AuditOutcome::Rejected).with_metadata("error", error)
    }

    fn entry(
        &self,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            request_id: self.request_id.clone(),
            correlation_id: self.correlation_id.clone(),
            event_type: event_type.to_string(),
            category,
            actor: self.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: RequestId,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
