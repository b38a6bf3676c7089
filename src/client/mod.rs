//! Request execution
//!
//! This module holds everything between a resource call and the wire:
//! the client itself, authorization, the transport contract and the
//! default transport stack.
//!
//! # Module Structure
//!
//! - [`executor`] - The [`Client`] with its retry loop and builder
//! - [`auth`] - Basic and Bearer authorization providers
//! - [`transport`] - Transport contract, request options, responses, pending requests
//! - [`http`] - Default reqwest transport
//! - [`middleware`] - Logging and caching transport wrappers
//! - [`mock`] - Recording transport for tests
//!
//! # Example
//!
//! ```no_run
//! use restkit::{BearerAuth, Client, RequestOptions};
//! use reqwest::Method;
//! use std::sync::Arc;
//!
//! async fn example() -> restkit::Result<()> {
//!     let client = Client::builder()
//!         .base_uri("https://pokeapi.example/")
//!         .authorization(Arc::new(BearerAuth::new("token")))
//!         .build()?;
//!     let response = client.request(Method::GET, "pokemons/143", RequestOptions::new()).await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod executor;
pub mod http;
pub mod middleware;
pub mod mock;
pub mod transport;

pub use auth::{Authorization, BasicAuth, BearerAuth};
pub use executor::{Client, ClientBuilder, DEFAULT_MAX_RETRIES};
pub use transport::{Dispatched, PendingRequest, RequestMode, RequestOptions, Response, Transport};
