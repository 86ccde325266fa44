use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

/// Everything that can end a stream request before the body starts
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Unauthorized stream request")]
    Unauthorized,

    #[error("Song not found")]
    SongNotFound,

    #[error("Audio file not found")]
    FileNotFound,

    #[error("Requested range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StreamError {
    pub fn status(&self) -> StatusCode {
        match self {
            StreamError::Unauthorized => StatusCode::UNAUTHORIZED,
            StreamError::SongNotFound | StreamError::FileNotFound => StatusCode::NOT_FOUND,
            StreamError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            StreamError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(error: std::io::Error) -> Self {
        StreamError::Internal(error.into())
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        if let StreamError::RangeNotSatisfiable { size } = self {
            return Response::builder()
                .status(status)
                .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::empty())
                .unwrap_or_else(|_| status.into_response());
        }

        err_response(status, &self.to_string())
    }
}

/// JSON error body in the `{"error": ...}` shape clients expect
pub fn err_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}
