use crate::{database, token::TokenError};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::{debug, warn};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InternalSigning(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalSigning(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        if status.is_server_error() {
            warn!("{}: {}", status, message);
        } else {
            debug!("{}: {}", status, message);
        }
        HttpResponse::build(status).json(ErrorBody {
            status: status.as_u16(),
            message: &message,
        })
    }
}

impl From<database::Error> for ApiError {
    fn from(err: database::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken(_) => ApiError::Forbidden(err.to_string()),
            TokenError::Signing(_) => ApiError::InternalSigning(err.to_string()),
        }
    }
}
