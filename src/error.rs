use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{auth::AuthError, ledger::LedgerError};

/// Boundary error taxonomy. Every component error lands in one of these.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            // Duplicate card / duplicate email paths answer 400 on both surfaces
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller; internals are never exposed
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Something went wrong, please try again later".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound
            | AuthError::BadPassword
            | AuthError::InvalidRefreshToken
            | AuthError::Unauthenticated
            | AuthError::InvalidRegistrationToken => Self::Authentication(err.to_string()),
            AuthError::IncompleteRegistration => Self::Validation(err.to_string()),
            AuthError::DuplicateEmail => Self::Conflict(err.to_string()),
            AuthError::RateLimited => Self::RateLimited(err.to_string()),
            AuthError::Store(_) | AuthError::Token(_) | AuthError::Internal(_) => {
                Self::Internal(err.into())
            }
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateCard => Self::Conflict(err.to_string()),
            LedgerError::CardNotFound
            | LedgerError::NoRemainingOpens
            | LedgerError::InvalidOpens(_)
            | LedgerError::EmptyName => Self::Validation(err.to_string()),
            LedgerError::Store(_) => Self::Internal(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            tracing::error!("Request failed: {:#}", err);
        }

        (self.status(), self.public_message()).into_response()
    }
}
