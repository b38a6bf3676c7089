//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. Only
//! [`Error::Connection`] takes part in retry logic; everything else
//! surfaces to the caller unchanged.

use reqwest::Method;

/// Library result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while building, sending or decoding requests
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested resource name is not registered on the client
    #[error("Resource \"{0}\" is not implemented")]
    UnknownResource(String),

    /// The action is not part of the resource's action table
    #[error("Resource \"{resource}\" has no action \"{action}\"")]
    UnknownAction { resource: String, action: String },

    /// A pool route did not have the `resource.action` shape
    #[error("Route must match the pattern 'resource.action', got \"{0}\"")]
    InvalidRoute(String),

    /// A path placeholder points past the positional arguments
    #[error("Path \"{template}\" needs argument {{{index}}} but only {given} positional argument(s) were given")]
    MissingArgument {
        template: String,
        index: usize,
        given: usize,
    },

    /// The options map could not be read as request options
    #[error("Invalid request options: {0}")]
    InvalidOptions(String),

    /// The transport could not establish or complete the connection
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The response body could not be decoded
    #[error("Failed to decode response body: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    /// Any other transport failure (bad URL, protocol error, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// reqwest failed the request for a reason other than connectivity
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// The task driving a pending request panicked or was cancelled
    #[error("Pending request {method} {uri} did not complete: {message}")]
    Task {
        method: String,
        uri: String,
        message: String,
    },

    /// Asynchronous dispatch was attempted outside a Tokio runtime
    #[error("Asynchronous requests need a running Tokio runtime")]
    NoRuntime,

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is a connection-level failure (the only retried kind)
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// A connection-level failure, with the request it belongs to
#[derive(Debug, thiserror::Error)]
#[error("Connection failed for {method} {uri}: {message}")]
pub struct ConnectionError {
    pub method: String,
    pub uri: String,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConnectionError {
    pub fn new(method: &Method, uri: &str, message: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying transport error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}
