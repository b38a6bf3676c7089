//! Transport middleware
//!
//! Wrappers that sit between the client and the real transport. The client
//! stacks them around the default [`HttpTransport`](super::http::HttpTransport)
//! when the `cache` and `log` params are set: caching innermost, logging
//! outermost so that cache hits are logged too.

use super::transport::{RequestOptions, Response, Transport};
use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use reqwest::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::Level;
use url::Url;

// =============================================================================
// Logging
// =============================================================================

/// Level the logging middleware writes request/response lines at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logger {
    level: Level,
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    fn emit(&self, line: &str) {
        match self.level {
            Level::ERROR => tracing::error!("{}", line),
            Level::WARN => tracing::warn!("{}", line),
            Level::INFO => tracing::info!("{}", line),
            Level::DEBUG => tracing::debug!("{}", line),
            _ => tracing::trace!("{}", line),
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

/// Logs one line before and one after every request:
/// `REQ "GET {target}"` and `RES "GET {target} HTTP/1.1" 200`
pub struct LoggingTransport {
    inner: Arc<dyn Transport>,
    logger: Logger,
    base_uri: Option<Url>,
}

impl LoggingTransport {
    pub fn new(inner: Arc<dyn Transport>, logger: Logger) -> Self {
        Self {
            inner,
            logger,
            base_uri: None,
        }
    }

    /// Log targets resolved against `base_uri` instead of the relative URI
    pub fn with_base_uri(mut self, base_uri: Option<Url>) -> Self {
        self.base_uri = base_uri;
        self
    }

    fn target(&self, uri: &str) -> String {
        self.base_uri
            .as_ref()
            .and_then(|base| base.join(uri).ok())
            .map_or_else(|| uri.to_string(), String::from)
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, method: &Method, uri: &str, options: &RequestOptions) -> Result<Response> {
        let target = self.target(uri);
        self.logger.emit(&format!("REQ \"{} {}\"", method, target));

        match self.inner.send(method, uri, options).await {
            Ok(response) => {
                self.logger.emit(&format!(
                    "RES \"{} {} {:?}\" {}",
                    method,
                    target,
                    response.version(),
                    response.status().as_u16()
                ));
                Ok(response)
            },
            Err(e) => {
                tracing::warn!("ERR \"{} {}\" {}", method, target, e);
                Err(e)
            },
        }
    }
}

// =============================================================================
// Caching
// =============================================================================

/// How long the default cache keeps a response without a `max-age`
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// How many responses the default cache holds before evicting the oldest
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Storage behind the caching middleware
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    async fn fetch(&self, key: &str) -> Option<Response>;
    async fn store(&self, key: &str, response: &Response);
}

/// The parts of a response's `Cache-Control` header the cache acts on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    /// `no-store` or `no-cache`: never serve this response again
    pub no_store: bool,
    pub max_age: Option<Duration>,
}

impl CacheDirectives {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut directives = Self::default();

        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };

            for directive in value.split(',') {
                let directive = directive.trim().to_ascii_lowercase();
                match directive.split_once('=') {
                    Some(("max-age", secs)) => {
                        directives.max_age = secs.trim_matches('"').parse().ok().map(Duration::from_secs);
                    },
                    None if directive == "no-store" || directive == "no-cache" => {
                        directives.no_store = true;
                    },
                    _ => {},
                }
            }
        }

        directives
    }
}

#[derive(Clone)]
struct CachedResponse {
    response: Response,
    /// When this entry stops being served, `None` keeps it until evicted
    expires_at: Option<Instant>,
}

impl CachedResponse {
    fn is_valid(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-memory cache of successful responses
///
/// Entries live for the response's `max-age`, or the configured TTL when
/// shorter or absent. Once `capacity` is reached the oldest entry goes.
pub struct MemoryCacheStrategy {
    ttl: Option<Duration>,
    capacity: usize,
    entries: RwLock<IndexMap<String, CachedResponse>>,
}

impl Default for MemoryCacheStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStrategy {
    /// Cache with [`DEFAULT_CACHE_TTL`] and [`DEFAULT_CACHE_CAPACITY`]
    pub fn new() -> Self {
        Self {
            ttl: Some(DEFAULT_CACHE_TTL),
            capacity: DEFAULT_CACHE_CAPACITY,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keep entries until evicted or their `max-age` runs out
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl CacheStrategy for MemoryCacheStrategy {
    async fn fetch(&self, key: &str) -> Option<Response> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(cached) if cached.is_valid() => return Some(cached.response.clone()),
                Some(_) => tracing::debug!("Cached response expired: {}", key),
                None => return None,
            }
        }

        self.entries.write().await.shift_remove(key);
        None
    }

    async fn store(&self, key: &str, response: &Response) {
        if !response.status().is_success() {
            return;
        }

        let directives = CacheDirectives::from_headers(response.headers());
        if directives.no_store {
            return;
        }

        let lifetime = match (directives.max_age, self.ttl) {
            (Some(max_age), Some(ttl)) => Some(max_age.min(ttl)),
            (max_age, ttl) => max_age.or(ttl),
        };
        let cached = CachedResponse {
            response: response.clone(),
            expires_at: lifetime.map(|lifetime| Instant::now() + lifetime),
        };

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_valid());
        entries.shift_remove(key);
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(key.to_string(), cached);
    }
}

/// Serves repeated GET requests from a [`CacheStrategy`]
pub struct CachingTransport {
    inner: Arc<dyn Transport>,
    strategy: Arc<dyn CacheStrategy>,
}

impl CachingTransport {
    pub fn new(inner: Arc<dyn Transport>, strategy: Arc<dyn CacheStrategy>) -> Self {
        Self { inner, strategy }
    }
}

/// Cache key for a request, `None` when the request must not be cached.
///
/// Request headers (the `Authorization` header among them) are folded into
/// the key as a digest, so callers with different credentials never share
/// an entry and no credential is kept in the key itself.
fn cache_key(method: &Method, uri: &str, options: &RequestOptions) -> Option<String> {
    if *method != Method::GET {
        return None;
    }

    let mut key = format!("{} {}", method, uri);

    if let Some(query) = &options.query {
        key.push(' ');
        key.push_str(&query.to_string());
    }

    if !options.headers.is_empty() {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in &options.headers {
            hasher.update(name.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        key.push_str(" #");
        key.push_str(hasher.finalize().to_hex().as_str());
    }

    Some(key)
}

#[async_trait]
impl Transport for CachingTransport {
    async fn send(&self, method: &Method, uri: &str, options: &RequestOptions) -> Result<Response> {
        let Some(key) = cache_key(method, uri, options) else {
            return self.inner.send(method, uri, options).await;
        };

        if let Some(response) = self.strategy.fetch(&key).await {
            tracing::debug!("Cache hit: {} {}", method, uri);
            return Ok(response);
        }

        let response = self.inner.send(method, uri, options).await?;
        self.strategy.store(&key, &response).await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use reqwest::header::HeaderValue;
    use reqwest::{StatusCode, Version};
    use serde_json::json;

    fn with_cache_control(response: Response, value: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(value));
        response.with_headers(headers)
    }

    #[tokio::test]
    async fn test_caching_serves_repeated_gets() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_to(Method::GET, "pokemons/143", Response::json(StatusCode::OK, &json!({"id": 143})));
        let transport = CachingTransport::new(mock.clone(), Arc::new(MemoryCacheStrategy::new()));

        let options = RequestOptions::new();
        let first = transport.send(&Method::GET, "pokemons/143", &options).await.unwrap();
        let second = transport.send(&Method::GET, "pokemons/143", &options).await.unwrap();

        assert_eq!(first.body(), second.body());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_caching_skips_other_methods() {
        let mock = Arc::new(MockTransport::new());
        let transport = CachingTransport::new(mock.clone(), Arc::new(MemoryCacheStrategy::new()));

        let options = RequestOptions::new();
        transport.send(&Method::POST, "pokemons/", &options).await.unwrap();
        transport.send(&Method::POST, "pokemons/", &options).await.unwrap();

        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_caching_keys_on_query() {
        let mock = Arc::new(MockTransport::new());
        let transport = CachingTransport::new(mock.clone(), Arc::new(MemoryCacheStrategy::new()));

        let page_one = RequestOptions::new().query(json!({"page": 1}));
        let page_two = RequestOptions::new().query(json!({"page": 2}));
        transport.send(&Method::GET, "pokemons/", &page_one).await.unwrap();
        transport.send(&Method::GET, "pokemons/", &page_two).await.unwrap();
        transport.send(&Method::GET, "pokemons/", &page_one).await.unwrap();

        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_caching_keys_on_authorization() {
        let mock = Arc::new(MockTransport::new());
        let transport = CachingTransport::new(mock.clone(), Arc::new(MemoryCacheStrategy::new()));

        let alice = RequestOptions::new().header("Authorization", "Bearer alice");
        let bob = RequestOptions::new().header("Authorization", "Bearer bob");
        transport.send(&Method::GET, "me", &alice).await.unwrap();
        transport.send(&Method::GET, "me", &bob).await.unwrap();
        transport.send(&Method::GET, "me", &alice).await.unwrap();

        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn test_cache_key_hides_credentials() {
        let options = RequestOptions::new().header("Authorization", "Bearer secret-token");
        let key = cache_key(&Method::GET, "me", &options).unwrap();
        assert!(key.starts_with("GET me #"));
        assert!(!key.contains("secret-token"));

        assert_eq!(cache_key(&Method::GET, "me", &RequestOptions::new()).unwrap(), "GET me");
        assert!(cache_key(&Method::DELETE, "me", &options).is_none());
    }

    #[test]
    fn test_cache_directives() {
        let response = with_cache_control(Response::new(StatusCode::OK, ""), "public, max-age=60");
        assert_eq!(
            CacheDirectives::from_headers(response.headers()),
            CacheDirectives {
                no_store: false,
                max_age: Some(Duration::from_secs(60)),
            }
        );

        let response = with_cache_control(Response::new(StatusCode::OK, ""), "No-Store");
        assert!(CacheDirectives::from_headers(response.headers()).no_store);
        assert_eq!(CacheDirectives::from_headers(&HeaderMap::new()), CacheDirectives::default());
    }

    #[tokio::test]
    async fn test_no_store_responses_are_not_cached() {
        let mock = Arc::new(MockTransport::new());
        let response = with_cache_control(Response::new(StatusCode::OK, "{}"), "no-store");
        mock.respond_to(Method::GET, "pokemons/", response);
        let transport = CachingTransport::new(mock.clone(), Arc::new(MemoryCacheStrategy::new()));

        let options = RequestOptions::new();
        transport.send(&Method::GET, "pokemons/", &options).await.unwrap();
        transport.send(&Method::GET, "pokemons/", &options).await.unwrap();

        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_max_age_limits_lifetime() {
        let cache = MemoryCacheStrategy::new().without_ttl();
        let stale = with_cache_control(Response::new(StatusCode::OK, "a"), "max-age=0");
        cache.store("GET a", &stale).await;
        assert!(cache.fetch("GET a").await.is_none());

        let fresh = with_cache_control(Response::new(StatusCode::OK, "b"), "max-age=3600");
        cache.store("GET b", &fresh).await;
        assert_eq!(cache.fetch("GET b").await.unwrap().text(), "b");
    }

    #[tokio::test]
    async fn test_memory_cache_does_not_store_errors() {
        let cache = MemoryCacheStrategy::new();
        cache
            .store("GET missing", &Response::new(StatusCode::NOT_FOUND, Vec::new()))
            .await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_memory_cache_expires_entries() {
        let cache = MemoryCacheStrategy::new().with_ttl(Duration::from_millis(0));
        cache.store("GET a", &Response::new(StatusCode::OK, "a")).await;
        assert!(cache.fetch("GET a").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn test_memory_cache_defaults_are_bounded() {
        let cache = MemoryCacheStrategy::new();
        assert_eq!(cache.ttl(), Some(DEFAULT_CACHE_TTL));
        assert_eq!(cache.capacity(), DEFAULT_CACHE_CAPACITY);
    }

    #[tokio::test]
    async fn test_memory_cache_evicts_oldest() {
        let cache = MemoryCacheStrategy::new().with_capacity(2);
        for key in ["GET a", "GET b", "GET c"] {
            cache.store(key, &Response::new(StatusCode::OK, key)).await;
        }

        assert_eq!(cache.len().await, 2);
        assert!(cache.fetch("GET a").await.is_none());
        assert_eq!(cache.fetch("GET c").await.unwrap().text(), "GET c");
    }

    #[tokio::test]
    async fn test_logging_passes_through() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_to(Method::GET, "pokemons/", Response::new(StatusCode::OK, "[]"));
        let transport = LoggingTransport::new(mock.clone(), Logger::new(Level::INFO));

        let response = transport
            .send(&Method::GET, "pokemons/", &RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(response.text(), "[]");
        assert_eq!(response.version(), Version::HTTP_11);
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_logging_target_is_resolved() {
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let base = Url::parse("https://pokeapi.example/v2/").ok();

        let resolved = LoggingTransport::new(mock.clone(), Logger::default()).with_base_uri(base);
        assert_eq!(resolved.target("pokemons/1"), "https://pokeapi.example/v2/pokemons/1");

        let relative = LoggingTransport::new(mock, Logger::default());
        assert_eq!(relative.target("pokemons/1"), "pokemons/1");
    }
}
