use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures a classification request can end in.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Upload is not an audio file; rejected before decoding.
    #[error("Invalid file type. Please upload an audio file (WAV, MP3, OGG, or FLAC)")]
    InvalidInputType,

    /// Malformed multipart body or missing file field.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("File too large. Maximum upload size is {limit}.")]
    UploadTooLarge { limit: String },

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio file too short. Minimum duration is ~{min_seconds:.1} seconds.")]
    TooShort { min_seconds: f32 },

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Processing failed: {0}")]
    Processing(String),
}

impl Error {
    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Error::Decode(msg.to_string())
    }

    pub fn processing(msg: impl std::fmt::Display) -> Self {
        Error::Processing(msg.to_string())
    }

    pub fn upload_too_large(limit_bytes: usize) -> Self {
        Error::UploadTooLarge {
            limit: human_size(limit_bytes),
        }
    }

    /// True for errors caused by what the caller sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInputType
                | Error::InvalidUpload(_)
                | Error::UploadTooLarge { .. }
                | Error::TooShort { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInputType => "INVALID_INPUT_TYPE",
            Error::InvalidUpload(_) => "INVALID_UPLOAD",
            Error::UploadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Error::Decode(_) => "DECODE_ERROR",
            Error::TooShort { .. } => "AUDIO_TOO_SHORT",
            Error::ClassifierUnavailable(_) => "CLASSIFIER_UNAVAILABLE",
            Error::Processing(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInputType | Error::InvalidUpload(_) | Error::TooShort { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ClassifierUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Decode(_) | Error::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match &self {
            Error::Processing(detail) => {
                log::error!("Classification error: {}", detail);
                "Classification failed".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        (self.status(), body).into_response()
    }
}
