//! Response handling module - binary artifact responses and upload staging

pub mod base64;
pub mod file;

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

/// Binary file response for an exported artifact
pub struct ArtifactResponse {
    pub filename: String,
    pub data: Vec<u8>,
}

impl ArtifactResponse {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

impl IntoResponse for ArtifactResponse {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename);
        let disposition = HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

        (
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                ),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.data,
        )
            .into_response()
    }
}
