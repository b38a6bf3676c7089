//! Resource Registry - resource types and their action tables
//!
//! A resource type is a base URI plus a table of named actions. Types are
//! either written in Rust (implement [`Resource`]) or described as data
//! ([`ResourceDef`], loadable from JSON/YAML). The client keeps one slot
//! per registered name and builds the instance the first time it is asked
//! for.

use super::decode::decode_json;
use crate::client::Response;
use crate::error::{Error, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Action name → action
pub type ActionTable = HashMap<String, Action>;

/// HTTP method plus a path template with positional `{N}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(with = "method_serde")]
    pub method: Method,
    pub path: String,
}

impl Action {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

mod method_serde {
    use reqwest::Method;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Method, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// A kind of REST resource
pub trait Resource: Send + Sync {
    /// Prefix of every request URI for this resource
    fn base_uri(&self) -> &str;

    /// The actions this resource supports
    fn actions(&self) -> &ActionTable;

    fn action(&self, name: &str) -> Option<&Action> {
        self.actions().get(name)
    }

    /// Decode a response body, JSON by default
    fn parse(&self, body: &[u8]) -> Result<Value> {
        decode_json(body)
    }
}

/// Data-driven resource definition
///
/// ```json
/// {
///   "base_uri": "pokemons",
///   "actions": {
///     "get": {"method": "GET", "path": "/{0}"}
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub base_uri: String,
    #[serde(default)]
    pub actions: ActionTable,
}

impl ResourceDef {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            actions: HashMap::new(),
        }
    }

    /// Add (or replace) an action
    pub fn with_action(mut self, name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        self.actions.insert(name.into(), Action::new(method, path));
        self
    }
}

impl Resource for ResourceDef {
    fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn actions(&self) -> &ActionTable {
        &self.actions
    }
}

/// Builds a resource instance on first use
pub type ResourceFactory = Arc<dyn Fn() -> Arc<dyn Resource> + Send + Sync>;

/// Where a registered resource's instance comes from
#[derive(Clone)]
pub enum ResourceSource {
    Definition(ResourceDef),
    Factory(ResourceFactory),
    Instance(Arc<dyn Resource>),
}

impl ResourceSource {
    /// Register a Rust resource type through its constructor
    pub fn factory<F, R>(factory: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Resource + 'static,
    {
        ResourceSource::Factory(Arc::new(move || Arc::new(factory()) as Arc<dyn Resource>))
    }

    fn build(&self) -> Arc<dyn Resource> {
        match self {
            ResourceSource::Definition(def) => Arc::new(def.clone()),
            ResourceSource::Factory(factory) => factory(),
            ResourceSource::Instance(instance) => instance.clone(),
        }
    }
}

impl From<ResourceDef> for ResourceSource {
    fn from(def: ResourceDef) -> Self {
        ResourceSource::Definition(def)
    }
}

impl fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSource::Definition(def) => f.debug_tuple("Definition").field(def).finish(),
            ResourceSource::Factory(_) => f.write_str("Factory(..)"),
            ResourceSource::Instance(instance) => write!(f, "Instance({})", instance.base_uri()),
        }
    }
}

/// One registered resource: how to build it, the built instance, and the
/// last synchronous response it produced
pub(crate) struct ResourceSlot {
    source: ResourceSource,
    instance: OnceLock<Arc<dyn Resource>>,
    last_response: RwLock<Option<Response>>,
}

impl ResourceSlot {
    fn new(source: ResourceSource) -> Self {
        Self {
            source,
            instance: OnceLock::new(),
            last_response: RwLock::new(None),
        }
    }

    /// The instance, built on first access
    pub(crate) fn instance(&self) -> &Arc<dyn Resource> {
        self.instance.get_or_init(|| self.source.build())
    }

    pub(crate) fn remember(&self, response: Response) {
        *self
            .last_response
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    pub(crate) fn last_response(&self) -> Option<Response> {
        self.last_response
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Name → slot, owned by the client
#[derive(Default)]
pub(crate) struct ResourceRegistry {
    slots: HashMap<String, Arc<ResourceSlot>>,
}

impl ResourceRegistry {
    pub(crate) fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (String, ResourceSource)>,
    {
        let slots = sources
            .into_iter()
            .map(|(name, source)| (name, Arc::new(ResourceSlot::new(source))))
            .collect();
        Self { slots }
    }

    pub(crate) fn get(&self, name: &str) -> Result<Arc<ResourceSlot>> {
        self.slots
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownResource(name.to_string()))
    }

    /// Registered names, sorted
    pub(crate) fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.slots.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
