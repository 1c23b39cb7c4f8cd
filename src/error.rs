use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use validator::ValidationErrors;

/// Result alias for REST boundary operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures crossing the REST boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent at all.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-2xx status.
    ///
    /// The message follows the backend's contract: the `detail` field of the
    /// JSON body when present (stringified if it is itself an object), else
    /// `API error: <status>`.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    /// Response body could not be decoded into the expected type.
    #[error("failed to decode response from `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failures establishing the authenticated session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Initialization did not finish inside the configured deadline. The
    /// underlying operation is cancelled, not left running.
    #[error("session initialization timed out after {timeout:?}")]
    TimedOut { timeout: Duration },
    /// No bearer token configured and no local stand-in user persisted.
    #[error("no credentials available: configure a token or seed the local user record")]
    MissingCredentials,
    /// The API rejected the configured credential.
    #[error("credential validation failed")]
    Validation {
        #[source]
        source: ApiError,
    },
}

/// Failures on the delta stream transport.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The connection attempt never reached the open state.
    #[error("websocket connect failed: {0}")]
    Connect(String),
    /// The open connection broke mid-flight.
    #[error("websocket transport error: {0}")]
    Transport(String),
    /// Operation attempted on a connection that is not open.
    #[error("connection closed")]
    Closed,
}

/// Failures against the realtime database chat layer.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Building the HTTP client failed.
    #[error("failed to build realtime database client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    /// A request to the database could not be sent.
    #[error("realtime database request to `{path}` failed")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The database answered with an unexpected status.
    #[error("unexpected realtime database status {status} for `{path}`")]
    Status { path: String, status: StatusCode },
    /// A stored value could not be decoded.
    #[error("failed to decode realtime database value at `{path}`")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// The live subscription ended and will not produce further updates.
    #[error("subscription to `{path}` ended")]
    SubscriptionEnded { path: String },
}

/// Engine-level failures surfaced to embedding callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An operation required an established session.
    #[error("no active session")]
    NoSession,
    /// An operation required an active project selection.
    #[error("no active project")]
    NoProject,
    /// The three-call snapshot load failed as a whole. The message carries
    /// the first failure only; callers cannot attribute it to a single call.
    #[error("failed to load project snapshot: {0}")]
    Snapshot(String),
    /// Invalid input rejected before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A REST call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<ValidationErrors> for SyncError {
    fn from(err: ValidationErrors) -> Self {
        SyncError::InvalidInput(format!("validation failed: {err}"))
    }
}
