//! REST Client
//!
//! Main client: owns the transport, the authorization provider, the retry
//! budget and the registered resources. Every request made by a resource or
//! a pool goes through [`Client::request`] or [`Client::request_async`].

use super::auth::{Authorization, AUTHORIZATION_HEADER};
use super::middleware::{CacheStrategy, Logger};
use super::transport::{Dispatched, PendingRequest, RequestMode, RequestOptions, Response, Transport};
use crate::config::{ClientConfig, CustomTransport, TransportParams};
use crate::error::{Error, Result};
use crate::resource::{ResourceHandle, ResourceRegistry, ResourceSource};
use reqwest::Method;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Retries granted to a request whose options don't set `retries`
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// REST client, cheap to clone (all clones share the same state)
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    authorization: RwLock<Option<Arc<dyn Authorization>>>,
    max_retries: u32,
    retry_non_idempotent: bool,
    logger: Logger,
    cache_strategy: Option<Arc<dyn CacheStrategy>>,
    resources: ResourceRegistry,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a client from a full configuration
    pub fn new(mut config: ClientConfig) -> Result<Self> {
        let transport = config.build_transport()?;

        let inner = ClientInner {
            transport,
            authorization: RwLock::new(config.authorization),
            max_retries: config.max_retries,
            retry_non_idempotent: config.retry_non_idempotent,
            logger: config.logger.unwrap_or_default(),
            cache_strategy: config.cache_strategy,
            resources: ResourceRegistry::new(config.resources),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Handle on a registered resource. The resource instance is built the
    /// first time any handle for that name is used and shared afterwards.
    pub fn resource(&self, name: &str) -> Result<ResourceHandle> {
        let slot = self.inner.resources.get(name)?;
        Ok(ResourceHandle::new(name, slot, self.clone()))
    }

    /// Names of the registered resources, sorted
    pub fn resource_names(&self) -> Vec<&str> {
        self.inner.resources.names()
    }

    /// The transport requests are sent through
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    /// Change the authorization used by every following request
    pub fn set_authorization(&self, authorization: Arc<dyn Authorization>) {
        *self
            .inner
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(authorization);
    }

    pub fn clear_authorization(&self) {
        *self
            .inner
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn authorization(&self) -> Option<Arc<dyn Authorization>> {
        self.inner
            .authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }

    /// Logger used by the logging middleware (the default one if none was configured)
    pub fn logger(&self) -> Logger {
        self.inner.logger
    }

    pub fn cache_strategy(&self) -> Option<Arc<dyn CacheStrategy>> {
        self.inner.cache_strategy.clone()
    }

    /// Options as they will reach the transport: authorization header set,
    /// `retries` defaulted
    pub fn prepare_options(&self, mut options: RequestOptions) -> RequestOptions {
        if let Some(authorization) = self.authorization() {
            options
                .headers
                .insert(AUTHORIZATION_HEADER.to_string(), authorization.header_value());
        }

        if options.retries.is_none() {
            options.retries = Some(self.inner.max_retries);
        }

        options
    }

    /// Send a request and wait for the response
    pub async fn request(&self, method: Method, uri: &str, options: RequestOptions) -> Result<Response> {
        let options = self.prepare_options(options);
        self.inner.execute(method, uri.to_string(), options).await
    }

    /// Start a request on its own task and return without waiting for it
    pub fn request_async(&self, method: Method, uri: &str, options: RequestOptions) -> Result<PendingRequest> {
        let options = self.prepare_options(options);
        let inner = self.inner.clone();
        let uri = uri.to_string();

        PendingRequest::spawn(method.clone(), uri.clone(), async move {
            inner.execute(method, uri, options).await
        })
    }

    /// [`request`](Self::request) or [`request_async`](Self::request_async), chosen per call
    pub async fn request_with_mode(
        &self,
        method: Method,
        uri: &str,
        options: RequestOptions,
        mode: RequestMode,
    ) -> Result<Dispatched> {
        match mode {
            RequestMode::Sync => self.request(method, uri, options).await.map(Dispatched::Ready),
            RequestMode::Async => self.request_async(method, uri, options).map(Dispatched::Pending),
        }
    }
}

impl ClientInner {
    /// Connection failures are retried while `retries` is above zero, each
    /// retry one lower. Any other outcome is returned as is.
    async fn execute(&self, method: Method, uri: String, mut options: RequestOptions) -> Result<Response> {
        loop {
            match self.transport.send(&method, &uri, &options).await {
                Err(Error::Connection(err)) => {
                    let remaining = options.retries.unwrap_or(0);

                    if remaining > 0 && self.may_retry(&method) {
                        tracing::debug!(
                            "Connection failed for {} {}, retrying ({} left): {}",
                            method,
                            uri,
                            remaining - 1,
                            err.message
                        );
                        options.retries = Some(remaining - 1);
                        continue;
                    }

                    tracing::warn!("Giving up on {} {}: {}", method, uri, err.message);
                    return Err(Error::Connection(err));
                },
                other => return other,
            }
        }
    }

    fn may_retry(&self, method: &Method) -> bool {
        self.retry_non_idempotent || !(*method == Method::POST || *method == Method::PATCH)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("resources", &self.resource_names())
            .field("max_retries", &self.inner.max_retries)
            .field("authorization", &self.authorization())
            .finish_non_exhaustive()
    }
}

/// Fluent construction of a [`Client`]
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Use a pre-built transport instead of the default HTTP one
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.custom = Some(CustomTransport::Instance(transport));
        self
    }

    /// Build the transport from the params when the client is built
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&TransportParams) -> Result<Arc<dyn Transport>> + Send + 'static,
    {
        self.config.custom = Some(CustomTransport::Factory(Box::new(factory)));
        self
    }

    pub fn params(mut self, params: TransportParams) -> Self {
        self.config.params = params;
        self
    }

    /// Shorthand for setting `params.base_uri`
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.config.params.base_uri = Some(base_uri.into());
        self
    }

    pub fn authorization(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.config.authorization = Some(authorization);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Whether POST and PATCH are retried on connection failures (default: yes)
    pub fn retry_non_idempotent(mut self, retry: bool) -> Self {
        self.config.retry_non_idempotent = retry;
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.config.logger = Some(logger);
        self
    }

    pub fn cache_strategy(mut self, strategy: Arc<dyn CacheStrategy>) -> Self {
        self.config.cache_strategy = Some(strategy);
        self
    }

    /// Register a resource under `name`, replacing any earlier one
    pub fn resource(mut self, name: impl Into<String>, source: impl Into<ResourceSource>) -> Self {
        self.config.resources.insert(name.into(), source.into());
        self
    }

    /// Register several resources at once
    pub fn resources<I, N, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<ResourceSource>,
    {
        self.config
            .resources
            .extend(resources.into_iter().map(|(n, s)| (n.into(), s.into())));
        self
    }

    pub fn build(self) -> Result<Client> {
        Client::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::auth::{BasicAuth, BearerAuth};
    use crate::client::mock::MockTransport;
    use crate::client::middleware::MemoryCacheStrategy;
    use reqwest::StatusCode;
    use serde_json::json;
    use tracing::Level;

    fn client_with(mock: &Arc<MockTransport>) -> Client {
        Client::builder().transport(mock.clone()).build().unwrap()
    }

    fn same_transport(a: &Arc<dyn Transport>, b: &Arc<dyn Transport>) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    #[tokio::test]
    async fn test_request_passes_arguments_to_transport() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);

        let options = RequestOptions::new().body(r#"{"key":"value"}"#).retries(3);
        client.request(Method::PUT, "/endpoint", options.clone()).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].uri, "/endpoint");
        assert_eq!(requests[0].options, options);
    }

    #[tokio::test]
    async fn test_retries_default_to_max_retries() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);

        client.request(Method::GET, "pokemons/", RequestOptions::new()).await.unwrap();

        assert_eq!(mock.requests()[0].options, RequestOptions::new().retries(DEFAULT_MAX_RETRIES));
    }

    #[tokio::test]
    async fn test_auth_header_is_applied() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);
        let auth = BasicAuth::new("user", "password");
        client.set_authorization(Arc::new(auth.clone()));

        let options = RequestOptions::new()
            .body(r#"{"key":"value"}"#)
            .header("key", "value")
            .retries(10);
        client.request(Method::PUT, "/endpoint", options.clone()).await.unwrap();

        let expected = options.header("Authorization", auth.header_value());
        assert_eq!(mock.requests()[0].options, expected);
    }

    #[tokio::test]
    async fn test_auth_header_overwrites_existing_value() {
        let mock = Arc::new(MockTransport::new());
        let client = Client::builder()
            .transport(mock.clone())
            .authorization(Arc::new(BearerAuth::new("fresh")))
            .build()
            .unwrap();

        let options = RequestOptions::new().header("Authorization", "Bearer stale");
        client.request(Method::GET, "/", options).await.unwrap();

        let sent = &mock.requests()[0].options;
        assert_eq!(sent.headers.get("Authorization").map(String::as_str), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_failure("refused");
        mock.push_connection_failure("refused");
        mock.push_response(Response::json(StatusCode::OK, &json!({"ok": true})));
        let client = client_with(&mock);

        let response = client.request(Method::GET, "/", RequestOptions::new()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let retries: Vec<Option<u32>> = mock.requests().iter().map(|r| r.options.retries).collect();
        assert_eq!(retries, vec![Some(3), Some(2), Some(1)]);
    }

    #[tokio::test]
    async fn test_explicit_retries_are_decremented() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_failure("refused");
        let client = client_with(&mock);

        client.request(Method::GET, "/", RequestOptions::new().retries(2)).await.unwrap();

        let retries: Vec<Option<u32>> = mock.requests().iter().map(|r| r.options.retries).collect();
        assert_eq!(retries, vec![Some(2), Some(1)]);
    }

    #[tokio::test]
    async fn test_connection_error_after_retries_are_exhausted() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..5 {
            mock.push_connection_failure("foo");
        }
        let client = Client::builder().transport(mock.clone()).max_retries(1).build().unwrap();

        let err = client.request(Method::GET, "/", RequestOptions::new()).await.unwrap_err();

        match err {
            Error::Connection(e) => {
                assert_eq!(e.message, "foo");
                assert_eq!(e.uri, "/");
                assert_eq!(e.method, "GET");
            },
            other => panic!("expected connection error, got {:?}", other),
        }
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(mock.requests()[1].options.retries, Some(0));
    }

    #[tokio::test]
    async fn test_zero_retries_fail_on_first_connection_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_failure("down");
        let client = client_with(&mock);

        let err = client
            .request(Method::GET, "/", RequestOptions::new().retries(0))
            .await
            .unwrap_err();

        assert!(err.is_connection());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_other_transport_errors_are_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_transport_failure("bad uri");
        let client = client_with(&mock);

        let err = client.request(Method::GET, "/", RequestOptions::new()).await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_error_statuses_are_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(Response::new(StatusCode::SERVICE_UNAVAILABLE, "down"));
        let client = client_with(&mock);

        let response = client.request(Method::GET, "/", RequestOptions::new()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_retry_can_be_disabled() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_failure("refused");
        mock.push_connection_failure("refused");
        let client = Client::builder()
            .transport(mock.clone())
            .retry_non_idempotent(false)
            .build()
            .unwrap();

        let err = client.request(Method::POST, "/", RequestOptions::new()).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(mock.requests().len(), 1);

        // GET keeps its retries
        client.request(Method::GET, "/", RequestOptions::new()).await.unwrap();
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_async_request_retries_on_its_task() {
        let mock = Arc::new(MockTransport::new());
        mock.push_connection_failure("refused");
        mock.push_response(Response::new(StatusCode::OK, "{}"));
        let client = client_with(&mock);

        let pending = client.request_async(Method::GET, "/", RequestOptions::new()).unwrap();
        let response = pending.wait().await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_request_with_mode() {
        let mock = Arc::new(MockTransport::new());
        let client = client_with(&mock);

        let ready = client
            .request_with_mode(Method::GET, "/", RequestOptions::new(), RequestMode::Sync)
            .await
            .unwrap();
        assert!(matches!(ready, Dispatched::Ready(_)));

        let pending = client
            .request_with_mode(Method::GET, "/", RequestOptions::new(), RequestMode::Async)
            .await
            .unwrap();
        assert!(matches!(pending, Dispatched::Pending(_)));
        pending.into_response().await.unwrap();
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_custom_transport_instance_is_kept() {
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let client = Client::builder()
            .transport(mock.clone())
            .params(TransportParams {
                cache: true,
                log: true,
                ..TransportParams::default()
            })
            .build()
            .unwrap();

        assert!(same_transport(&client.transport(), &mock));
    }

    #[test]
    fn test_custom_transport_factory_gets_params() {
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let expected = mock.clone();
        let client = Client::builder()
            .base_uri("https://pokeapi.example/")
            .transport_factory(move |params| {
                assert_eq!(params.base_uri.as_deref(), Some("https://pokeapi.example/"));
                Ok(mock)
            })
            .build()
            .unwrap();

        assert!(same_transport(&client.transport(), &expected));
    }

    #[test]
    fn test_logger_and_cache_strategy_accessors() {
        let client = Client::builder()
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();
        assert_eq!(client.logger(), Logger::default());
        assert!(client.cache_strategy().is_none());

        let strategy: Arc<dyn CacheStrategy> = Arc::new(MemoryCacheStrategy::new());
        let client = Client::builder()
            .transport(Arc::new(MockTransport::new()))
            .logger(Logger::new(Level::TRACE))
            .cache_strategy(strategy.clone())
            .build()
            .unwrap();
        assert_eq!(client.logger().level(), Level::TRACE);
        let kept = client.cache_strategy().unwrap();
        assert!(Arc::as_ptr(&kept) as *const () == Arc::as_ptr(&strategy) as *const ());
    }

    #[test]
    fn test_unknown_resource() {
        let client = Client::builder()
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();
        let err = client.resource("digimons").err().unwrap();
        assert_eq!(err.to_string(), "Resource \"digimons\" is not implemented");
    }
}
