//! Authorization providers
//!
//! A provider supplies the scheme and credentials the client writes into the
//! `Authorization` header of every request it sends.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Header name written by the client
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Source of the `Authorization` header value
pub trait Authorization: Send + Sync + fmt::Debug {
    /// Scheme, such as "Basic" or "Bearer"
    fn auth_type(&self) -> &str;

    /// Credentials placed after the scheme
    fn credentials(&self) -> String;

    /// Full header value: `"{auth_type} {credentials}"`
    fn header_value(&self) -> String {
        format!("{} {}", self.auth_type(), self.credentials())
    }
}

/// HTTP basic authorization
#[derive(Clone)]
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

// Security: never print the password
impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl Authorization for BasicAuth {
    fn auth_type(&self) -> &str {
        "Basic"
    }

    fn credentials(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.user, self.password))
    }
}

/// Bearer token authorization, the token is passed through untouched
#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").field("token", &"***").finish()
    }
}

impl Authorization for BearerAuth {
    fn auth_type(&self) -> &str {
        "Bearer"
    }

    fn credentials(&self) -> String {
        self.token.clone()
    }
}

/// Authorization as written in a configuration file
///
/// `{"basic": {"user": "...", "password": "..."}}` or `{"bearer": "..."}`
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthConfig {
    Basic { user: String, password: String },
    Bearer(String),
}

impl AuthConfig {
    pub fn into_provider(self) -> Arc<dyn Authorization> {
        match self {
            AuthConfig::Basic { user, password } => Arc::new(BasicAuth::new(user, password)),
            AuthConfig::Bearer(token) => Arc::new(BearerAuth::new(token)),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::Basic { user, .. } => write!(f, "AuthConfig::Basic({})", user),
            AuthConfig::Bearer(_) => write!(f, "AuthConfig::Bearer(***)"),
        }
    }
}
