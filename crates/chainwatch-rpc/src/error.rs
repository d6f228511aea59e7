use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("endpoint pool is empty")]
    EmptyPool,

    #[error("invalid endpoint url: {url:?}")]
    InvalidEndpoint { url: String },

    #[error("transport error calling {method} on {endpoint}: {reason}")]
    Transport {
        endpoint: String,
        method: String,
        reason: String,
    },

    #[error("request {method} to {endpoint} timed out")]
    Timeout { endpoint: String, method: String },

    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("{method} failed with code {code}: {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    #[error("invalid {method} response: {reason}")]
    InvalidResponse { method: String, reason: String },
}

impl RpcError {
    /// Build an `InvalidResponse` for the given method.
    pub fn invalid_response(method: &str, reason: impl Into<String>) -> Self {
        RpcError::InvalidResponse {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
