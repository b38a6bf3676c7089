//! Resource Dispatch
//!
//! Turns `resource.action(args...)` into a request: look the action up,
//! fill the path placeholders from the positional arguments, and send it
//! with the trailing options through the client.

use super::registry::{Resource, ResourceSlot};
use crate::client::{Client, PendingRequest, RequestMode, RequestOptions, Response};
use crate::error::{Error, Result};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// Arguments of one action call: positional path arguments plus options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    options: RequestOptions,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append several positional arguments
    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.positional.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Split a loose argument list: when the last value is an object it is
    /// the options map, everything before it is positional.
    pub fn from_values(mut values: Vec<Value>) -> Result<Self> {
        let options = match values.last() {
            Some(Value::Object(_)) => values.pop().map(RequestOptions::from_value).transpose()?,
            _ => None,
        };

        Ok(Self {
            positional: values,
            options: options.unwrap_or_default(),
        })
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.options
    }
}

/// Fill every `{N}` placeholder in `template` with positional argument N.
///
/// Braces that don't hold a plain decimal index are kept literally.
pub fn build_path(template: &str, args: &[Value]) -> Result<String> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        path.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let digits = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()));

        match digits {
            Some(digits) => {
                let index = digits.parse::<usize>().unwrap_or(usize::MAX);
                let arg = args.get(index).ok_or_else(|| Error::MissingArgument {
                    template: template.to_string(),
                    index,
                    given: args.len(),
                })?;
                path.push_str(&render_arg(arg));
                rest = &after[digits.len() + 1..];
            },
            None => {
                path.push('{');
                rest = after;
            },
        }
    }

    path.push_str(rest);
    Ok(path)
}

/// Text of a positional argument as it appears in a path
fn render_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// A request ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub method: Method,
    pub uri: String,
    pub options: RequestOptions,
}

/// Result of [`ResourceHandle::invoke`]
#[derive(Debug)]
pub enum Invocation {
    /// Sync mode: the decoded body
    Decoded(Value),
    /// Async mode: the in-flight request, not decoded
    Pending(PendingRequest),
}

/// A registered resource bound to its client
#[derive(Clone)]
pub struct ResourceHandle {
    name: String,
    slot: Arc<ResourceSlot>,
    client: Client,
}

impl ResourceHandle {
    pub(crate) fn new(name: &str, slot: Arc<ResourceSlot>, client: Client) -> Self {
        Self {
            name: name.to_string(),
            slot,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared resource instance
    pub fn resource(&self) -> &Arc<dyn Resource> {
        self.slot.instance()
    }

    /// Resolve an action call into method, URI and options without sending it
    pub fn prepare(&self, action: &str, args: CallArgs) -> Result<PreparedCall> {
        let resource = self.resource();
        let Some(definition) = resource.action(action) else {
            return Err(Error::UnknownAction {
                resource: self.name.clone(),
                action: action.to_string(),
            });
        };

        let path = build_path(&definition.path, &args.positional)?;

        Ok(PreparedCall {
            method: definition.method.clone(),
            uri: format!("{}{}", resource.base_uri(), path),
            options: args.options,
        })
    }

    /// Call an action, wait for the response and decode it
    pub async fn call(&self, action: &str, args: CallArgs) -> Result<Value> {
        let call = self.prepare(action, args)?;
        tracing::debug!("{}.{} -> {} {}", self.name, action, call.method, call.uri);

        let response = self.client.request(call.method, &call.uri, call.options).await?;
        self.slot.remember(response.clone());
        self.resource().parse(response.body())
    }

    /// Start an action call and return the pending request undecoded
    pub fn call_async(&self, action: &str, args: CallArgs) -> Result<PendingRequest> {
        let call = self.prepare(action, args)?;
        tracing::debug!("{}.{} -> {} {} (async)", self.name, action, call.method, call.uri);

        self.client.request_async(call.method, &call.uri, call.options)
    }

    /// [`call`](Self::call) or [`call_async`](Self::call_async), chosen per call
    pub async fn invoke(&self, action: &str, args: CallArgs, mode: RequestMode) -> Result<Invocation> {
        match mode {
            RequestMode::Sync => self.call(action, args).await.map(Invocation::Decoded),
            RequestMode::Async => self.call_async(action, args).map(Invocation::Pending),
        }
    }

    /// Decode a response the way this resource does
    pub fn decode(&self, response: &Response) -> Result<Value> {
        self.resource().parse(response.body())
    }

    /// Response of the last synchronous call made through this resource
    pub fn last_response(&self) -> Option<Response> {
        self.slot.last_response()
    }
}
