//! # Mock transport
//!
//! A [`Transport`] that records every request and answers from a script,
//! for testing resources and pools without a server.
//!
//! Answers are chosen in this order:
//! 1. a fixed response registered with [`MockTransport::respond_to`] for the
//!    exact method and URI,
//! 2. the next scripted outcome queued with [`MockTransport::push_response`]
//!    or [`MockTransport::push_connection_failure`],
//! 3. an empty `200 OK`.
//!
//! Fixed routes are what pool tests want, since pooled requests run on their
//! own tasks and reach the transport in no particular order.
//!
//! # Example
//! ```
//! use restkit::client::mock::MockTransport;
//! use restkit::{Client, Response};
//! use reqwest::{Method, StatusCode};
//! use std::sync::Arc;
//!
//! # async fn example() -> restkit::Result<()> {
//! let mock = Arc::new(MockTransport::new());
//! mock.push_connection_failure("connection refused");
//! mock.push_response(Response::new(StatusCode::OK, "{}"));
//!
//! let client = Client::builder().transport(mock.clone()).build()?;
//! client.request(Method::GET, "/", Default::default()).await?;
//! assert_eq!(mock.requests().len(), 2);
//! # Ok(())
//! # }
//! ```

use super::transport::{RequestOptions, Response, Transport};
use crate::error::{ConnectionError, Error, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A request as the transport saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub options: RequestOptions,
}

enum Outcome {
    Respond(Response),
    ConnectionFailure(String),
    TransportFailure(String),
}

#[derive(Default)]
struct MockState {
    routes: HashMap<(Method, String), Response>,
    script: VecDeque<Outcome>,
    requests: Vec<RecordedRequest>,
}

/// Recording, scriptable transport
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking test thread must not hide the recorded requests from others
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Always answer `method uri` with `response`
    pub fn respond_to(&self, method: Method, uri: impl Into<String>, response: Response) {
        self.state().routes.insert((method, uri.into()), response);
    }

    /// Queue a response for the next unrouted request
    pub fn push_response(&self, response: Response) {
        self.state().script.push_back(Outcome::Respond(response));
    }

    /// Queue a connection failure for the next unrouted request
    pub fn push_connection_failure(&self, message: impl Into<String>) {
        self.state()
            .script
            .push_back(Outcome::ConnectionFailure(message.into()));
    }

    /// Queue a non-connection transport failure for the next unrouted request
    pub fn push_transport_failure(&self, message: impl Into<String>) {
        self.state()
            .script
            .push_back(Outcome::TransportFailure(message.into()));
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Requests received for one URI
    pub fn requests_to(&self, uri: &str) -> Vec<RecordedRequest> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.uri == uri)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, method: &Method, uri: &str, options: &RequestOptions) -> Result<Response> {
        let mut state = self.state();
        state.requests.push(RecordedRequest {
            method: method.clone(),
            uri: uri.to_string(),
            options: options.clone(),
        });

        if let Some(response) = state.routes.get(&(method.clone(), uri.to_string())) {
            return Ok(response.clone());
        }

        match state.script.pop_front() {
            Some(Outcome::Respond(response)) => Ok(response),
            Some(Outcome::ConnectionFailure(message)) => {
                Err(ConnectionError::new(method, uri, message).into())
            },
            Some(Outcome::TransportFailure(message)) => Err(Error::Transport(message)),
            None => Ok(Response::new(StatusCode::OK, Vec::new())),
        }
    }
}
