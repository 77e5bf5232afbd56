use actix_multipart::MultipartError;
use actix_web::{error::JsonPayloadError, http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use tracing::error;

use crate::types::Message;

pub const GENERIC_FAILURE: &str = "Something went wrong!";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid file type: {0:?}")]
    InvalidFileType(String),
    #[error("file exceeds the upload limit of {limit} bytes")]
    FileTooLarge { limit: u64 },
    #[error("unexpected file field: {0}")]
    UnexpectedFile(String),
    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("json body error: {0}")]
    Json(#[from] JsonPayloadError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::NotFound(_) => {
                HttpResponse::NotFound().json(Message::new(self.to_string()))
            }
            _ => {
                error!(error = %self, "request failed");
                HttpResponse::InternalServerError().json(Message::new(GENERIC_FAILURE))
            }
        }
    }
}
