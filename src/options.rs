//! Transport configuration for the CortexAI client.

use std::collections::HashMap;
use std::time::Duration;

use crate::stream::DEFAULT_STREAM_TIMEOUT;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "CORTEX_API_URL";
/// Environment variable holding a bearer token.
pub const ENV_TOKEN: &str = "CORTEX_API_TOKEN";
/// Environment variable overriding the stream timeout, in seconds.
pub const ENV_STREAM_TIMEOUT: &str = "CORTEX_STREAM_TIMEOUT_SECS";

/// A secret string type for sensitive data like auth tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// HTTP transport options.
///
/// # Example
/// ```rust
/// use cortexai::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new("https://cortex.example.com")
///     .with_token("jwt-token")
///     .with_timeout(Duration::from_secs(30))
///     .with_stream_timeout(Duration::from_secs(120));
///
/// assert_eq!(options.base_url, "https://cortex.example.com");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the backend, without a trailing slash
    pub base_url: String,

    /// Timeout for plain request/response calls
    pub timeout: Option<Duration>,

    /// Overall deadline for a streamed reply; values too large to represent
    /// as an instant mean the reply never times out
    pub stream_timeout: Duration,

    /// Bearer token sent in the `Authorization` header
    pub token: Option<SecretString>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl TransportOptions {
    /// Create options for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: None,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            token: None,
            proxy: None,
            extra_headers: None,
        }
    }

    /// Build options from `CORTEX_API_URL`, `CORTEX_API_TOKEN` and
    /// `CORTEX_STREAM_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options =
            Self::new(lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()));

        if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.is_empty()) {
            options.token = Some(token.into());
        }

        if let Some(raw) = lookup(ENV_STREAM_TIMEOUT) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => options.stream_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", ENV_STREAM_TIMEOUT),
            }
        }

        options
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the stream timeout.
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<SecretString>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Join an endpoint path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
