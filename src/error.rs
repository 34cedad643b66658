use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;
use crate::storage::BlobStoreError;

/// Outcome taxonomy of the forum operations.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("you have already reported this thread")]
    DuplicateReport,
    #[error("not found")]
    NotFound,
    #[error("denied")]
    Denied,
    #[error("thread is locked")]
    Locked,
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("storage: {0}")]
    Repo(RepoError),
    #[error("blob storage: {0}")]
    Blob(#[from] BlobStoreError),
}

impl From<RepoError> for ServiceError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ServiceError::NotFound,
            other => ServiceError::Repo(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("{0}")] DuplicateReport(String),
    #[error("forbidden")] Forbidden,
    #[error("unauthorized")] Unauthorized,
    #[error("locked")] Locked,
    #[error("bad request: {0}")] BadRequest(String),
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Internal(msg) => {
                log::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::DuplicateReport => {
                ApiError::DuplicateReport(ServiceError::DuplicateReport.to_string())
            }
            ServiceError::NotFound => ApiError::NotFound,
            ServiceError::Denied => ApiError::Forbidden,
            ServiceError::Locked => ApiError::Locked,
            ServiceError::Invalid(msg) => ApiError::BadRequest(msg),
            ServiceError::Repo(inner) => inner.into(),
            ServiceError::Blob(inner) => {
                log::error!("blob storage failure: {inner}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict | ApiError::DuplicateReport(_) => StatusCode::CONFLICT,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Locked => StatusCode::LOCKED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
