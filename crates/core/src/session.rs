//! Explicit caller context.
//!
//! A `Session` is built once authentication has succeeded upstream and is
//! handed to every operation that needs to know who is acting. Nothing in the
//! workspace reads the caller from ambient state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::approval::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Approver,
    Admin,
    Technician,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Approver => "approver",
            Self::Admin => "admin",
            Self::Technician => "technician",
        }
    }

    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            Self::Staff => matches!(permission, SubmitRequest | ViewOwnRequests),
            Self::Approver => {
                matches!(permission, ViewAssignedApprovals | DecideLevel | AssignTechnician)
            }
            Self::Technician => matches!(permission, WorkMaintenance),
            Self::Admin => matches!(
                permission,
                SubmitRequest | AssignTechnician | ViewAllRequests | DeleteRequest | ViewAnalytics
            ),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Self::Staff),
            "approver" => Ok(Self::Approver),
            "admin" => Ok(Self::Admin),
            "technician" => Ok(Self::Technician),
            other => Err(DomainError::Validation(format!(
                "unsupported role `{other}` (expected staff|approver|admin|technician)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SubmitRequest,
    ViewOwnRequests,
    ViewAssignedApprovals,
    DecideLevel,
    AssignTechnician,
    WorkMaintenance,
    ViewAllRequests,
    DeleteRequest,
    ViewAnalytics,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        let user_id = user_id.into();
        let display_name = display_name.into();
        let display_name =
            if display_name.trim().is_empty() { user_id.clone() } else { display_name };
        Self { user_id: UserId(user_id), display_name, role }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), DomainError> {
        if self.can(permission) {
            return Ok(());
        }
        Err(DomainError::Forbidden { role: self.role, permission })
    }

    /// Label used as the `actor` of audit events.
    pub fn actor(&self) -> String {
        format!("{}:{}", self.role, self.user_id)
    }
}
