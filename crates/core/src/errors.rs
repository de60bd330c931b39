use thiserror::Error;

use crate::{
    approvals::{ChainShapeError, InvalidTransition},
    flows::FlowTransitionError,
    session::{Permission, Role},
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    ChainShape(#[from] ChainShapeError),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("role `{role}` is not permitted to {permission:?}")]
    Forbidden { role: Role, permission: Permission },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

const UNASSIGNED: &str = "unassigned";

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Authentication is required to use this endpoint.",
            Self::Forbidden { .. } => "Your role is not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The request has changed state and this action is no longer possible."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    fn with_correlation_id(mut self, correlation_id: String) -> Self {
        match &mut self {
            Self::BadRequest { correlation_id: id, .. }
            | Self::Unauthorized { correlation_id: id, .. }
            | Self::Forbidden { correlation_id: id, .. }
            | Self::NotFound { correlation_id: id, .. }
            | Self::Conflict { correlation_id: id, .. }
            | Self::ServiceUnavailable { correlation_id: id, .. }
            | Self::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        self
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::from(self).with_correlation_id(correlation_id.into())
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Domain(error) => {
                let message = error.to_string();
                match error {
                    DomainError::InvalidTransition(_) | DomainError::FlowTransition(_) => {
                        Self::Conflict { message, correlation_id }
                    }
                    DomainError::Forbidden { .. } => Self::Forbidden { message, correlation_id },
                    DomainError::ChainShape(_)
                    | DomainError::Validation(_)
                    | DomainError::InvariantViolation(_) => {
                        Self::BadRequest { message, correlation_id }
                    }
                }
            }
            ApplicationError::NotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::approvals::{ChainShapeError, InvalidTransition};
    use crate::domain::approval::{ApprovalRecord, UserId};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::session::{Permission, Role};

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::Validation("details are required".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn empty_chain_is_a_bad_request() {
        let interface =
            ApplicationError::from(DomainError::from(ChainShapeError::Empty)).into_interface("r");
        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn invalid_transition_maps_to_conflict() {
        let chain = vec![ApprovalRecord::pending(1, "hod-1")];
        let transition = InvalidTransition::not_actionable(&chain, &UserId::from("hr-1"));
        let interface =
            ApplicationError::from(DomainError::from(transition)).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
        assert!(interface.message().contains("hr-1"));
    }

    #[test]
    fn forbidden_role_maps_to_forbidden() {
        let interface = ApplicationError::from(DomainError::Forbidden {
            role: Role::Technician,
            permission: Permission::DeleteRequest,
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert!(interface.message().contains("technician"));
    }

    #[test]
    fn missing_request_maps_to_not_found() {
        let interface = ApplicationError::NotFound { entity: "request", id: "REQ-9".to_owned() }
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.message(), "request `REQ-9` was not found");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid api token".to_owned()).into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
