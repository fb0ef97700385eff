//! Configuration types for the webhook server
//!
//! This module defines the settings fixed at construction time: where to
//! listen, which path and credentials to accept, the dispatch namespace, and
//! where request log lines go.

use std::fmt;
use std::sync::Arc;

use warp::http::StatusCode;

use crate::error::HookError;
use crate::logger::{HookLogger, NoopLogger};

/// Default listening port
pub const DEFAULT_PORT: u16 = 3420;

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default webhook path
pub const DEFAULT_PATH: &str = "/recurly/callback";

/// Default dispatch namespace
pub const DEFAULT_NAMESPACE: &str = "Recurly";

/// Prefix of every environment variable read by [`HookConfig::from_env`]
pub const ENV_PREFIX: &str = "RECURLY_HOOK_";

/// Status returned when credentials do not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthFailureStatus {
    /// 403 Forbidden without a challenge, as existing webhook senders expect
    #[default]
    Forbidden,
    /// 401 Unauthorized with a `WWW-Authenticate: Basic` challenge
    Challenge,
}

impl AuthFailureStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Challenge => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Configuration for the webhook server
#[derive(Clone)]
pub struct HookConfig {
    /// Listening port
    /// Default: 3420
    pub port: u16,

    /// Bind host, an IP address or resolvable name
    /// Default: "0.0.0.0"
    pub host: String,

    /// Expected basic-auth username; unset rejects every request
    /// Default: None
    pub username: Option<String>,

    /// Expected basic-auth password; unset rejects every request
    /// Default: None
    pub password: Option<String>,

    /// The only path that accepts webhooks
    /// Default: "/recurly/callback"
    pub path: String,

    /// Prefix of dispatch keys, e.g. `Recurly` in `Recurly.*`
    /// Default: "Recurly"
    pub namespace: String,

    /// Response to bad credentials
    /// Default: Forbidden (403)
    pub auth_failure: AuthFailureStatus,

    /// Largest accepted body in bytes
    /// Default: None (unbounded)
    pub max_body_bytes: Option<usize>,

    /// Receives the request log
    /// Default: NoopLogger
    pub logger: Arc<dyn HookLogger>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            username: None,
            password: None,
            path: DEFAULT_PATH.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            auth_failure: AuthFailureStatus::default(),
            max_body_bytes: None,
            logger: Arc::new(NoopLogger),
        }
    }
}

impl fmt::Debug for HookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("path", &self.path)
            .field("namespace", &self.namespace)
            .field("auth_failure", &self.auth_failure)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("logger", &self.logger)
            .finish()
    }
}

impl HookConfig {
    /// Create a HookConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `RECURLY_HOOK_*` environment variables
    ///
    /// Recognized: `PORT`, `HOST`, `USERNAME`, `PASSWORD`, `PATH`, `NAMESPACE`,
    /// `MAX_BODY_BYTES`, and `AUTH_CHALLENGE` (`true`/`false`). Unset variables
    /// keep their defaults.
    pub fn from_env() -> Result<Self, HookError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut config = Self::default();

        if let Some(port) = var("PORT") {
            config.port = parse_var("PORT", &port)?;
        }
        if let Some(host) = var("HOST") {
            config.host = host;
        }
        config.username = var("USERNAME").or(config.username);
        config.password = var("PASSWORD").or(config.password);
        if let Some(path) = var("PATH") {
            config.path = path;
        }
        if let Some(namespace) = var("NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(limit) = var("MAX_BODY_BYTES") {
            config.max_body_bytes = Some(parse_var("MAX_BODY_BYTES", &limit)?);
        }
        if let Some(challenge) = var("AUTH_CHALLENGE") {
            if parse_var::<bool>("AUTH_CHALLENGE", &challenge)? {
                config.auth_failure = AuthFailureStatus::Challenge;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), HookError> {
        if self.host.trim().is_empty() {
            return Err(HookError::Configuration("Host must not be empty".to_string()));
        }

        if !self.path.starts_with('/') {
            return Err(HookError::Configuration(format!(
                "Path must start with '/': {}",
                self.path
            )));
        }

        if self.namespace.is_empty() {
            return Err(HookError::Configuration(
                "Namespace must not be empty".to_string(),
            ));
        }

        if self.max_body_bytes == Some(0) {
            return Err(HookError::Configuration(
                "Max body size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether both username and password are set and non-empty
    pub fn has_credentials(&self) -> bool {
        let set = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        set(&self.username) && set(&self.password)
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_auth_failure(mut self, status: AuthFailureStatus) -> Self {
        self.auth_failure = status;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    pub fn with_logger(mut self, logger: impl HookLogger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, HookError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| {
        HookError::Configuration(format!("Invalid {ENV_PREFIX}{name} value {value:?}: {e}"))
    })
}
