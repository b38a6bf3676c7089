//! Transport contract
//!
//! The client never speaks HTTP itself. It hands a method, a URI and a
//! [`RequestOptions`] bag to a [`Transport`] and gets a [`Response`] back.
//! Asynchronous dispatch runs the same call on a Tokio task and hands out a
//! [`PendingRequest`] that can be waited on later.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::task::JoinHandle;

/// Options for a single request
///
/// `retries` travels with the options so the transport (and tests) can see
/// how many retries are left for the attempt being made. Keys the client
/// does not know about are kept in `extra` for transport-specific use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Raw body: strings are sent as-is, other values as JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// JSON body, sent with a JSON content type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from a JSON object. `null` gives empty options.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => {
                serde_json::from_value(value).map_err(|e| Error::InvalidOptions(e.to_string()))
            },
            other => Err(Error::InvalidOptions(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json(mut self, json: impl Into<Value>) -> Self {
        self.json = Some(json.into());
        self
    }

    pub fn query(mut self, query: impl Into<Value>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A completed HTTP response. Error statuses are ordinary responses.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Shorthand for a response with a JSON body
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Protocol version the response arrived with, HTTP/1.1 unless set
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can carry a request to a server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response.
    ///
    /// Connectivity problems must be reported as [`Error::Connection`];
    /// the client retries only those.
    async fn send(&self, method: &Method, uri: &str, options: &RequestOptions) -> Result<Response>;
}

/// How a call is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Wait for the response before returning
    #[default]
    Sync,
    /// Return a [`PendingRequest`] immediately
    Async,
}

/// Outcome of [`Client::request_with_mode`](crate::Client::request_with_mode)
#[derive(Debug)]
pub enum Dispatched {
    Ready(Response),
    Pending(PendingRequest),
}

impl Dispatched {
    /// Resolve either variant into a response
    pub async fn into_response(self) -> Result<Response> {
        match self {
            Dispatched::Ready(response) => Ok(response),
            Dispatched::Pending(pending) => pending.wait().await,
        }
    }
}

/// A request already in flight on its own task
#[derive(Debug)]
pub struct PendingRequest {
    method: Method,
    uri: String,
    handle: JoinHandle<Result<Response>>,
}

impl PendingRequest {
    /// Start `request` on the current Tokio runtime
    pub(crate) fn spawn<F>(method: Method, uri: String, request: F) -> Result<Self>
    where
        F: Future<Output = Result<Response>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let handle = runtime.spawn(request);
        Ok(Self {
            method,
            uri,
            handle,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether the response (or failure) is already available
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the request to finish
    pub async fn wait(self) -> Result<Response> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Task {
                method: self.method.to_string(),
                uri: self.uri,
                message: e.to_string(),
            }),
        }
    }
}
