//! Error values carried to the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShareError>;

/// Errors surfaced while configuring or serving the share.
///
/// Each wire-facing variant maps to one status code and a literal diagnostic
/// body; a failure terminates only the request that hit it.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Only GET and HEAD are served.
    #[error("method not implemented")]
    MethodNotAllowed,

    /// The path named no shared file or asset.
    #[error("not found")]
    NotFound,

    /// Unexpected failure while producing a response body.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad configuration or share list; startup only, never hits the wire.
    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ShareError::MethodNotAllowed => (StatusCode::NOT_IMPLEMENTED, "501 Not Implemented"),
            ShareError::NotFound => (StatusCode::NOT_FOUND, "404 Not Found!"),
            ShareError::Io(_) | ShareError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error")
            }
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_wire_contract() {
        let cases = [
            (ShareError::MethodNotAllowed, StatusCode::NOT_IMPLEMENTED),
            (ShareError::NotFound, StatusCode::NOT_FOUND),
            (
                ShareError::Io(std::io::Error::other("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status, err.into_response().status());
        }
    }
}
