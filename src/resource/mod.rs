//! Resource abstraction layer
//!
//! A resource is a base URI plus a table of named actions. Calling an action
//! fills its path template from positional arguments and sends the request
//! through the owning [`Client`](crate::Client).
//!
//! # Architecture
//!
//! - [`registry`] - Resource types, data-driven definitions and the per-client registry
//! - [`dispatch`] - Turns `resource.action(args)` into a request and decodes the result
//! - [`pool`] - Issues many calls concurrently and joins them by name
//! - [`decode`] - Body decoders
//!
//! # Example
//!
//! ```no_run
//! use restkit::{CallArgs, Client, ResourceDef};
//! use reqwest::Method;
//!
//! async fn snorlax() -> restkit::Result<serde_json::Value> {
//!     let client = Client::builder()
//!         .base_uri("https://pokeapi.example/")
//!         .resource("pokemons", ResourceDef::new("pokemons").with_action("get", Method::GET, "/{0}"))
//!         .build()?;
//!     client.resource("pokemons")?.call("get", CallArgs::new().arg(143)).await
//! }
//! ```

pub mod decode;
pub mod dispatch;
pub mod pool;
pub mod registry;

pub use decode::{decode_json, Decoder, JsonDecoder};
pub use dispatch::{build_path, CallArgs, Invocation, PreparedCall, ResourceHandle};
pub use pool::{split_route, Pool};
pub use registry::{Action, ActionTable, Resource, ResourceDef, ResourceFactory, ResourceSource};

pub(crate) use registry::ResourceRegistry;
