//! # restkit
//!
//! Declarative REST API client. Describe a remote API as resources, each a
//! base URI with a table of named actions (`get` is `GET /{0}`, `attack` is
//! `PATCH /{0}/{1}/{2}`), then call the actions by name.
//!
//! - [`Client`] sends every request, applies the authorization header and
//!   retries connection failures
//! - [`ResourceHandle`] resolves an action call into a request and decodes
//!   the response
//! - [`Pool`] issues many calls at once and joins them by name
//!
//! ```no_run
//! use restkit::{CallArgs, Client, Pool, ResourceDef};
//! use reqwest::Method;
//! use serde_json::json;
//!
//! # async fn example() -> restkit::Result<()> {
//! let pokemons = ResourceDef::new("pokemons")
//!     .with_action("all", Method::GET, "/")
//!     .with_action("get", Method::GET, "/{0}");
//!
//! let client = Client::builder()
//!     .base_uri("https://pokeapi.example/")
//!     .resource("pokemons", pokemons)
//!     .build()?;
//!
//! let snorlax = client.resource("pokemons")?.call("get", CallArgs::new().arg(143)).await?;
//!
//! let mut pool = Pool::new();
//! pool.add_resource("all", &client, "pokemons.all", json!(null))?;
//! pool.add_resource("first", &client, "pokemons.get", json!({"parameters": [1]}))?;
//! let results = pool.send().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod resource;

pub use client::auth::AuthConfig;
pub use client::http::HttpTransport;
pub use client::middleware::{
    CacheDirectives, CacheStrategy, CachingTransport, Logger, LoggingTransport, MemoryCacheStrategy,
};
pub use client::{
    Authorization, BasicAuth, BearerAuth, Client, ClientBuilder, Dispatched, PendingRequest, RequestMode,
    RequestOptions, Response, Transport, DEFAULT_MAX_RETRIES,
};
pub use config::{ClientConfig, ConfigFile, CustomTransport, TransportParams};
pub use error::{ConnectionError, Error, Result};
pub use resource::{
    Action, ActionTable, CallArgs, Decoder, Invocation, JsonDecoder, Pool, Resource, ResourceDef, ResourceHandle,
    ResourceSource,
};
