//! Request Pool
//!
//! Issue many named resource calls at once and collect their decoded bodies
//! later. Every entry is started on its own task as soon as it is added, so
//! all of them are in flight before [`Pool::send`] begins waiting.

use super::decode::{Decoder, JsonDecoder};
use super::dispatch::CallArgs;
use crate::client::{Client, PendingRequest, RequestOptions};
use crate::error::{Error, Result};
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Key in the pool params whose value is spread as positional arguments
pub const PARAMETERS_KEY: &str = "parameters";

/// Named in-flight requests, kept in insertion order
pub struct Pool {
    entries: IndexMap<String, PendingRequest>,
    decoder: Arc<dyn Decoder>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            decoder: Arc::new(JsonDecoder),
        }
    }

    /// Decode every body with `decoder` instead of JSON
    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Start `route` (`"resource.action"`) on `client` and file it under `name`.
    ///
    /// When `params` holds a `parameters` list it is spread as the
    /// positional arguments and the remaining keys become the request
    /// options. Otherwise `params` is the options as a whole.
    ///
    /// Adding a name twice replaces the earlier request in place.
    pub fn add_resource(
        &mut self,
        name: impl Into<String>,
        client: &Client,
        route: &str,
        params: Value,
    ) -> Result<()> {
        let (resource, action) = split_route(route)?;
        let args = call_args(params)?;

        let pending = client.resource(resource)?.call_async(action, args)?;
        self.entries.insert(name.into(), pending);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Wait for every entry in insertion order and decode it.
    ///
    /// The first failure is returned and the remaining entries are not
    /// waited on. Their tasks still run to completion.
    pub async fn send(self) -> Result<IndexMap<String, Value>> {
        let mut results = IndexMap::with_capacity(self.entries.len());

        for (name, pending) in self.entries {
            let response = pending.wait().await?;
            let value = self.decoder.decode(response.body())?;
            results.insert(name, value);
        }

        Ok(results)
    }

    /// Wait for every entry and keep each outcome, failed or not
    pub async fn send_settled(self) -> IndexMap<String, Result<Value>> {
        let (names, pending): (Vec<String>, Vec<PendingRequest>) = self.entries.into_iter().unzip();
        let responses = join_all(pending.into_iter().map(PendingRequest::wait)).await;

        names
            .into_iter()
            .zip(responses)
            .map(|(name, response)| {
                let outcome = response.and_then(|r| self.decoder.decode(r.body()));
                if let Err(e) = &outcome {
                    tracing::debug!("Pool entry {} failed: {}", name, e);
                }
                (name, outcome)
            })
            .collect()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

/// `"resource.action"` into its two pieces
pub fn split_route(route: &str) -> Result<(&str, &str)> {
    let mut pieces = route.split('.');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(resource), Some(action), None) => Ok((resource, action)),
        _ => Err(Error::InvalidRoute(route.to_string())),
    }
}

fn call_args(params: Value) -> Result<CallArgs> {
    let mut map = match params {
        Value::Null => return Ok(CallArgs::new()),
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidOptions(format!(
                "pool params must be an object, got {}",
                other_kind(&other)
            )))
        },
    };

    let positional = match map.remove(PARAMETERS_KEY) {
        Some(Value::Array(values)) => values,
        Some(value) => vec![value],
        None => Vec::new(),
    };

    let options = RequestOptions::from_value(Value::Object(map))?;
    Ok(CallArgs::new().args(positional).options(options))
}

fn other_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
