//! Default HTTP transport built on reqwest

use super::transport::{RequestOptions, Response, Transport};
use crate::config::TransportParams;
use crate::error::{ConnectionError, Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::io;
use std::time::Duration;
use url::Url;

/// User agent sent when the params don't name one
pub const DEFAULT_USER_AGENT: &str = concat!("restkit/", env!("CARGO_PKG_VERSION"));

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Transport sending requests with a shared reqwest client
///
/// Relative request URIs are resolved against `base_uri` with RFC 3986
/// reference resolution, so a base of `https://api.example.com/v1/` and a
/// URI of `pokemons/143` target `https://api.example.com/v1/pokemons/143`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_uri: Option<Url>,
}

impl HttpTransport {
    /// Create a transport with default parameters
    pub fn new() -> Result<Self> {
        Self::from_params(&TransportParams::default())
    }

    /// Create a transport from configuration parameters
    pub fn from_params(params: &TransportParams) -> Result<Self> {
        for key in params.extra.keys() {
            tracing::warn!("Ignoring unknown transport param \"{}\"", key);
        }

        let mut builder = Client::builder()
            .user_agent(params.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));

        if let Some(secs) = params.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if !params.headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in &params.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::Config(format!("Invalid header name \"{}\": {}", name, e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("Invalid value for header {}: {}", name, e)))?;
                headers.insert(name, value);
            }
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_uri = params
            .base_uri
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| Error::Config(format!("Invalid base_uri: {}", e)))?;

        Ok(Self { client, base_uri })
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    /// Resolve a request URI (plus query) into an absolute URL
    pub fn resolve(&self, uri: &str, query: Option<&Value>) -> Result<Url> {
        let target = match query {
            Some(query) => add_query_params(uri, query),
            None => uri.to_string(),
        };

        let resolved = match &self.base_uri {
            Some(base) => base.join(&target),
            None => Url::parse(&target),
        };

        resolved.map_err(|e| Error::Transport(format!("Invalid URI \"{}\": {}", target, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: &Method, uri: &str, options: &RequestOptions) -> Result<Response> {
        let url = self.resolve(uri, options.query.as_ref())?;
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url);

        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(json) = &options.json {
            request = request.json(json);
        } else if let Some(body) = &options.body {
            request = match body {
                Value::String(text) => request.body(text.clone()),
                other => request.body(other.to_string()),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(method, uri, e))?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(method, uri, e))?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::debug!(
                "API error: {} - {}",
                status,
                sanitize_for_log(&String::from_utf8_lossy(&body))
            );
        }

        Ok(Response::new(status, body.to_vec())
            .with_version(version)
            .with_headers(headers))
    }
}

/// Failures to establish or complete the exchange are connection-level,
/// everything else keeps the reqwest error as its source
fn classify(method: &Method, uri: &str, error: reqwest::Error) -> Error {
    if is_connection_failure(&error) {
        let message = error.to_string();
        ConnectionError::new(method, uri, message)
            .with_source(error)
            .into()
    } else {
        Error::Http(error)
    }
}

/// Connect errors, timeouts, broken bodies, and requests that died before
/// any status arrived (the peer closed or reset the socket)
fn is_connection_failure(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() || error.is_body() {
        return true;
    }

    if error.is_request() && error.status().is_none() && !error.is_builder() && !error.is_redirect() {
        return true;
    }

    io_failure_in_chain(error)
}

/// Whether any cause in the chain is an io error that ended the connection
fn io_failure_in_chain(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);

    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = err.source();
    }

    false
}

/// Append a query object (or raw query string) to a URI
fn add_query_params(uri: &str, query: &Value) -> String {
    let mut query_parts: Vec<String> = Vec::new();

    match query {
        Value::String(raw) if !raw.is_empty() => query_parts.push(raw.clone()),
        Value::Object(map) => {
            for (key, value) in map {
                let key = urlencoding::encode(key);
                match value {
                    Value::Array(items) => {
                        for item in items {
                            if let Some(text) = query_value(item) {
                                query_parts.push(format!("{}={}", key, urlencoding::encode(&text)));
                            }
                        }
                    },
                    other => {
                        if let Some(text) = query_value(other) {
                            query_parts.push(format!("{}={}", key, urlencoding::encode(&text)));
                        }
                    },
                }
            }
        },
        _ => {},
    }

    if query_parts.is_empty() {
        uri.to_string()
    } else if uri.contains('?') {
        format!("{}&{}", uri, query_parts.join("&"))
    } else {
        format!("{}?{}", uri, query_parts.join("&"))
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Short, user-facing explanation for an error status
pub fn status_hint(status: StatusCode) -> Option<&'static str> {
    match status.as_u16() {
        400 => Some("Invalid request. Check your parameters."),
        401 => Some("Authentication failed. Check your credentials."),
        403 => Some("Permission denied."),
        404 => Some("Resource not found."),
        409 => Some("Resource conflict. The resource may already exist or be in use."),
        429 => Some("Rate limit exceeded. Please try again later."),
        500 | 502 | 503 => Some("Service temporarily unavailable. Please try again."),
        _ => None,
    }
}
