use thiserror::Error;

/// The backend snapshot is internally inconsistent. Any of these aborts the
/// run before a single digest goes out.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("service '{service}' references unknown host '{host_id}'")]
    OrphanService { service: String, host_id: String },

    #[error("host '{host_id}' notifies unknown user '{recipient}'")]
    UnknownRecipient { host_id: String, recipient: String },
}

/// Failure fetching or decoding backend state.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Icinga API request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Icinga API returned {status} for {endpoint}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to read snapshot file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode backend objects: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("'{object}' has an out of range timestamp: {seconds}")]
    Timestamp { object: String, seconds: f64 },

    #[error("Invalid Icinga API url: {0}")]
    InvalidUrl(String),
}

/// Failure delivering a single recipient's digest.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to render digest: {0}")]
    Render(#[from] minijinja::Error),

    #[error("Invalid mail address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
