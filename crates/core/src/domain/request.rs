use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::approvals::{self, ApproverAssignment};
use crate::domain::approval::{ApprovalRecord, ApprovalStatus, UserId};
use crate::errors::DomainError;
use crate::flows::MaintenanceState;
use crate::session::{Role, Session};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Purchase,
    ItSupport,
    Maintenance,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Purchase => "purchase",
            Self::ItSupport => "it_support",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Leave => "Leave",
            Self::Purchase => "Purchase",
            Self::ItSupport => "IT Support",
            Self::Maintenance => "Maintenance",
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "leave" => Ok(Self::Leave),
            "purchase" => Ok(Self::Purchase),
            "it_support" => Ok(Self::ItSupport),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(DomainError::Validation(format!(
                "unsupported request type `{other}` \
                 (expected leave|purchase|it_support|maintenance)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LeavePeriod {
    /// Inclusive number of calendar days covered.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub description: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// Reference to a file held by the external file store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub requester_id: UserId,
    pub staff_name: String,
    pub staff_department: Option<String>,
    pub request_type: RequestType,
    pub details: String,
    pub leave: Option<LeavePeriod>,
    pub items: Vec<PurchaseItem>,
    pub attachments: Vec<Attachment>,
    pub staff_signature: Option<String>,
    pub approvals: Vec<ApprovalRecord>,
    pub assigned_technician: Option<UserId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub sla_hours: Option<u32>,
    pub maintenance_status: Option<MaintenanceState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn overall_status(&self) -> ApprovalStatus {
        approvals::overall_status(&self.approvals)
    }

    pub fn current_level(&self) -> Option<u32> {
        approvals::current_level(&self.approvals)
    }

    pub fn actionable_level_for(&self, approver_id: &UserId) -> Option<u32> {
        approvals::can_act(&self.approvals, approver_id)
    }

    pub fn has_approver(&self, approver_id: &UserId) -> bool {
        self.approvals.iter().any(|record| record.is_assigned_to(approver_id))
    }

    pub fn is_maintenance(&self) -> bool {
        self.request_type == RequestType::Maintenance
    }

    pub fn is_assigned_to_technician(&self, technician_id: &UserId) -> bool {
        self.assigned_technician.as_ref() == Some(technician_id)
    }

    /// Admins see every request; everyone else only the ones they take part in.
    pub fn is_visible_to(&self, session: &Session) -> bool {
        match session.role {
            Role::Admin => true,
            Role::Staff => self.requester_id == session.user_id,
            Role::Approver => self.has_approver(&session.user_id),
            Role::Technician => self.is_assigned_to_technician(&session.user_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    #[serde(default)]
    pub staff_name: Option<String>,
    #[serde(default)]
    pub staff_department: Option<String>,
    pub request_type: RequestType,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub leave: Option<LeavePeriod>,
    #[serde(default)]
    pub items: Vec<PurchaseItem>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub staff_signature: Option<String>,
    pub approvers: Vec<ApproverAssignment>,
}

impl NewRequest {
    /// Validates the submission and builds a request whose chain is all `Pending`.
    ///
    /// Leave dates are kept only for leave requests and purchase items only for
    /// purchase requests.
    pub fn into_request(
        self,
        id: RequestId,
        requester: &Session,
        now: DateTime<Utc>,
    ) -> Result<Request, DomainError> {
        let details = self.details.trim().to_string();
        if details.is_empty() {
            return Err(DomainError::Validation("details are required".to_string()));
        }

        let leave = match self.request_type {
            RequestType::Leave => {
                let period = self.leave.ok_or_else(|| {
                    DomainError::Validation("leave requests need a start and end date".to_string())
                })?;
                if period.end < period.start {
                    return Err(DomainError::Validation(format!(
                        "leave end {} is before leave start {}",
                        period.end, period.start
                    )));
                }
                Some(period)
            }
            _ => None,
        };

        let items = match self.request_type {
            RequestType::Purchase => validate_items(self.items)?,
            _ => Vec::new(),
        };

        for attachment in &self.attachments {
            if attachment.file_name.trim().is_empty() || attachment.url.trim().is_empty() {
                return Err(DomainError::Validation(
                    "attachments need both a file name and a url".to_string(),
                ));
            }
        }

        let approvals = approvals::fresh_chain(self.approvers)?;
        let staff_name =
            non_blank(self.staff_name).unwrap_or_else(|| requester.display_name.clone());

        Ok(Request {
            id,
            requester_id: requester.user_id.clone(),
            staff_name,
            staff_department: non_blank(self.staff_department),
            request_type: self.request_type,
            details,
            leave,
            items,
            attachments: self.attachments,
            staff_signature: non_blank(self.staff_signature),
            approvals,
            assigned_technician: None,
            assigned_at: None,
            sla_hours: None,
            maintenance_status: None,
            created_at: now,
            updated_at: now,
        })
    }
}

fn validate_items(items: Vec<PurchaseItem>) -> Result<Vec<PurchaseItem>, DomainError> {
    if items.is_empty() {
        return Err(DomainError::Validation(
            "purchase requests need at least one item".to_string(),
        ));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let description = item.description.trim().to_string();
            if description.is_empty() {
                return Err(DomainError::Validation(format!(
                    "item {} is missing a description",
                    index + 1
                )));
            }
            if item.quantity == 0 {
                return Err(DomainError::Validation(format!(
                    "item {} must have a quantity of at least 1",
                    index + 1
                )));
            }
            Ok(PurchaseItem {
                description,
                quantity: item.quantity,
                remarks: non_blank(item.remarks),
            })
        })
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
