use thiserror::Error;

/// Errors surfaced by the HTTP gateway and the stores built on it.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("session expired - sign in again")]
    Unauthenticated,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("sign in to continue")]
    RequiresAuthentication,

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies carried in messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    /// Pull the `message` field out of an error envelope, falling back
    /// to the truncated raw body.
    fn body_message(body: &str) -> String {
        #[derive(serde::Deserialize)]
        struct ErrorEnvelope {
            message: Option<String>,
        }
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope {
                message: Some(message),
            }) => message,
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 => ApiError::Validation(Self::body_message(body)),
            401 => ApiError::Unauthenticated,
            403 => ApiError::Forbidden(Self::body_message(body)),
            404 => ApiError::NotFound(Self::body_message(body)),
            500..=599 => ApiError::ServerError(Self::body_message(body)),
            _ => ApiError::InvalidResponse(format!(
                "status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }
}
