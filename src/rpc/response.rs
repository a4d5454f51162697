//! The `{success, data?, error?}` response envelope (`spec.md` §6).

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::handlers::HandlerError;
use crate::supervisor::SupervisorError;
use crate::translation::TranslationError;

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T: Serialize> RpcResponse<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn err(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    fn status_for(code: &str) -> StatusCode {
        match code {
            "InvalidArgument" => StatusCode::BAD_REQUEST,
            "NotFound" => StatusCode::NOT_FOUND,
            "AlreadyExists" => StatusCode::CONFLICT,
            "FailedPrecondition" => StatusCode::CONFLICT,
            "Aborted" => StatusCode::SERVICE_UNAVAILABLE,
            "Unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "DeadlineExceeded" => StatusCode::GATEWAY_TIMEOUT,
            "Cancelled" => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            "PermissionDenied" => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<T: Serialize> IntoResponse for RpcResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.error {
            Some(e) => Self::status_for(e.code),
            None => StatusCode::OK,
        };
        (status, Json(self)).into_response()
    }
}

/// Translates every error kind the RPC edge can surface into the
/// standard error-code families in `spec.md` §6.
pub fn from_handler_error(err: &HandlerError) -> RpcError {
    RpcError {
        code: err.code(),
        message: err.to_string(),
    }
}

pub fn from_translation_error(err: &TranslationError) -> RpcError {
    RpcError {
        code: "InvalidArgument",
        message: err.to_string(),
    }
}

pub fn from_supervisor_error(err: &SupervisorError) -> RpcError {
    match err {
        SupervisorError::UnknownTenant(_) => RpcError {
            code: "NotFound",
            message: err.to_string(),
        },
        SupervisorError::Persistence(_) => RpcError {
            code: "Internal",
            message: err.to_string(),
        },
        SupervisorError::Handler(inner) => from_handler_error(inner),
    }
}

pub fn from_rpc_error(err: &super::RpcError) -> RpcError {
    RpcError {
        code: err.code(),
        message: err.message(),
    }
}
