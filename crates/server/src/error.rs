use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eapproval_core::{ApplicationError, InterfaceError};
use serde::Serialize;
use tracing::{error, warn};

/// Response wrapper that renders an [`InterfaceError`] as a JSON body.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub detail: String,
    pub correlation_id: String,
}

impl ApiError {
    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    pub fn unauthorized(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::Unauthorized {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            InterfaceError::BadRequest { .. } => "bad_request",
            InterfaceError::Unauthorized { .. } => "unauthorized",
            InterfaceError::Forbidden { .. } => "forbidden",
            InterfaceError::NotFound { .. } => "not_found",
            InterfaceError::Conflict { .. } => "conflict",
            InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
            InterfaceError::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation_id = self.0.correlation_id().to_string();

        // Server-side faults keep their detail in the log only.
        let detail = if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %self.0,
                "request failed on the server side"
            );
            String::new()
        } else {
            warn!(
                event_name = "api.request.refused",
                correlation_id = %correlation_id,
                error = %self.0,
                "request refused"
            );
            self.0.message().to_string()
        };

        let body = ErrorBody {
            error: self.code(),
            message: self.0.user_message().to_string(),
            detail,
            correlation_id,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use eapproval_core::approvals::InvalidTransition;
    use eapproval_core::{ApplicationError, ApprovalRecord, DomainError, UserId};

    use super::ApiError;

    async fn render(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn invalid_transition_renders_as_conflict_with_detail() {
        let error = ApplicationError::Domain(DomainError::InvalidTransition(
            InvalidTransition::not_actionable(
                &[ApprovalRecord::pending(1, "hod-farid")],
                &UserId::from("hr-mei"),
            ),
        ));

        let (status, body) = render(ApiError::from_application(error, "corr-7")).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["correlationId"], "corr-7");
        assert!(body["detail"].as_str().unwrap_or_default().contains("hr-mei"));
    }

    #[tokio::test]
    async fn persistence_failures_hide_their_detail() {
        let error = ApplicationError::Persistence("disk I/O error at /var/lib/db".to_string());

        let (status, body) = render(ApiError::from_application(error, "corr-8")).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "");
        assert_eq!(
            body["message"],
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[tokio::test]
    async fn missing_records_map_to_not_found() {
        let error = ApplicationError::NotFound { entity: "request", id: "REQ-404".to_string() };

        let (status, body) = render(ApiError::from_application(error, "corr-9")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "request `REQ-404` was not found");
    }
}
