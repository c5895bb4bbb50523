use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde_json::json;
use tracing::{debug, error};

use std::io;
use std::sync::PoisonError;
use std::time::Duration;

use crate::auth::data::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lock poisoned: {0}")]
    Poison(String),

    /// Non-2xx answer from the hosted backend. `code` carries the database
    /// error code when the backend reports one (e.g. `23505`).
    #[error("backend returned {status}: {message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("not signed in")]
    NotSignedIn,

    #[error("backend is not configured")]
    BackendNotConfigured,

    #[error("{0} not found")]
    NotFound(String),

    #[error("only the workspace owner can do that")]
    NotOwner,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("planner not ready: {0}")]
    NotReady(String),

    #[error("configuration: {0}")]
    Config(String),
}

impl<T> From<PoisonError<T>> for InternalError {
    fn from(e: PoisonError<T>) -> InternalError {
        InternalError::Poison(e.to_string())
    }
}

impl From<rocket::figment::Error> for InternalError {
    fn from(e: rocket::figment::Error) -> InternalError {
        InternalError::Config(e.to_string())
    }
}

impl InternalError {
    pub fn not_found(what: impl Into<String>) -> InternalError {
        InternalError::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> InternalError {
        InternalError::InvalidInput(what.into())
    }

    pub fn status(&self) -> Status {
        match self {
            InternalError::InvalidInput(_) | InternalError::Json(_) => Status::BadRequest,
            InternalError::NotSignedIn => Status::Unauthorized,
            InternalError::Auth(AuthError::RateLimited) => Status::TooManyRequests,
            InternalError::Auth(_) => Status::Unauthorized,
            InternalError::NotOwner => Status::Forbidden,
            InternalError::NotFound(_) => Status::NotFound,
            InternalError::Backend { .. } | InternalError::Http(_) => Status::BadGateway,
            InternalError::BackendNotConfigured | InternalError::NotReady(_) => {
                Status::ServiceUnavailable
            }
            InternalError::Timeout(_) => Status::GatewayTimeout,
            InternalError::Sql(_)
            | InternalError::Io(_)
            | InternalError::Poison(_)
            | InternalError::Config(_) => Status::InternalServerError,
        }
    }

    /// Short machine-readable tag for the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            InternalError::Sql(_) => "storage",
            InternalError::Io(_) => "io",
            InternalError::Json(_) => "json",
            InternalError::Http(_) => "backend_unreachable",
            InternalError::Poison(_) => "internal",
            InternalError::Backend { .. } => "backend",
            InternalError::Auth(_) => "auth",
            InternalError::Timeout(_) => "timeout",
            InternalError::NotSignedIn => "not_signed_in",
            InternalError::BackendNotConfigured => "backend_not_configured",
            InternalError::NotFound(_) => "not_found",
            InternalError::NotOwner => "not_owner",
            InternalError::InvalidInput(_) => "invalid_input",
            InternalError::NotReady(_) => "not_ready",
            InternalError::Config(_) => "config",
        }
    }

    /// Message meant for a notification in the UI.
    pub fn user_message(&self) -> String {
        match self {
            InternalError::Auth(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for InternalError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            error!(error = %self, uri = %request.uri(), "request failed");
        } else {
            debug!(error = %self, uri = %request.uri(), "request rejected");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.user_message(),
        }));

        Response::build_from(body.respond_to(request)?)
            .status(status)
            .ok()
    }
}

pub type InternalResult<T> = Result<T, InternalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_taxonomy() {
        assert_eq!(InternalError::NotOwner.status(), Status::Forbidden);
        assert_eq!(
            InternalError::Auth(AuthError::RateLimited).status(),
            Status::TooManyRequests
        );
        assert_eq!(
            InternalError::Auth(AuthError::InvalidCredentials).status(),
            Status::Unauthorized
        );
        assert_eq!(
            InternalError::Timeout(Duration::from_secs(8)).status(),
            Status::GatewayTimeout
        );
        assert_eq!(
            InternalError::Backend {
                status: 500,
                code: None,
                message: "boom".into()
            }
            .status(),
            Status::BadGateway
        );
    }
}
