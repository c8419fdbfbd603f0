//! Error types for the control-plane client.

/// Errors that can occur while talking to the control plane.
#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    /// The client configuration is unusable.
    #[error("config error: {0}")]
    Config(String),

    /// The HTTP request failed before a response arrived, or the body broke.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API server answered with a non-success status.
    #[error("API server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// A response or watch frame was not valid JSON of the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
