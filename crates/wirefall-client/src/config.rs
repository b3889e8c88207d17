//! Client configuration and resolution.
//!
//! The caller-facing surface is [`ClientOptions`], a loose options object
//! mirroring the upstream API (`baseURL` with a deprecated `baseUrl` alias,
//! `apiKey` with a legacy `token` alias, an injectable env map).
//! [`ClientConfig::resolve`] turns it into the immutable configuration the
//! client runs on; resolution happens exactly once, at construction, with
//! the credential priority order implemented as a plain testable function
//! rather than ambient lookup at call time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use wirefall_common::{Result, WirefallError};

/// Primary environment key for the bearer credential.
pub const API_KEY_ENV: &str = "WIREFALL_API_KEY";
/// Legacy environment key, checked after the primary in every scope.
pub const TOKEN_ENV: &str = "WIREFALL_TOKEN";

const DEFAULT_SERVICE: &str = "rpc";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 30_000;

/// Which transport the client uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Prefer the persistent channel, fall back to HTTP per call.
    #[default]
    Auto,
    /// Persistent channel only; its errors surface directly.
    Ws,
    /// Fallback channel only; no WebSocket connection is ever made.
    Http,
}

/// How the retry delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffCurve {
    Constant,
    #[default]
    Exponential,
}

/// Retry policy for the fallback channel.
///
/// `attempts` counts retries beyond the initial try, so a call makes at most
/// `attempts + 1` exchanges. Retries apply only to transient error classes
/// (connectivity, timeout, 5xx); everything else surfaces immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    /// Initial delay in milliseconds.
    pub delay: u64,
    /// Cap for the growing delay, in milliseconds.
    pub max_delay: u64,
    pub backoff: BackoffCurve,
    /// Growth factor for the exponential curve.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: 50,
            max_delay: 5_000,
            backoff: BackoffCurve::Exponential,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Creates an exponential-backoff policy, validating its inputs.
    pub fn new(attempts: u32, delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Result<Self> {
        if delay_ms == 0 {
            return Err(WirefallError::InvalidConfig(
                "retry delay must be positive".to_string(),
            ));
        }
        if max_delay_ms < delay_ms {
            return Err(WirefallError::InvalidConfig(
                "retry max delay must be >= initial delay".to_string(),
            ));
        }
        if multiplier < 1.0 {
            return Err(WirefallError::InvalidConfig(
                "retry multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(Self {
            attempts,
            delay: delay_ms,
            max_delay: max_delay_ms,
            backoff: BackoffCurve::Exponential,
            multiplier,
        })
    }

    /// Creates a constant-delay policy.
    pub fn constant(attempts: u32, delay_ms: u64) -> Result<Self> {
        if delay_ms == 0 {
            return Err(WirefallError::InvalidConfig(
                "retry delay must be positive".to_string(),
            ));
        }
        Ok(Self {
            attempts,
            delay: delay_ms,
            max_delay: delay_ms,
            backoff: BackoffCurve::Constant,
            multiplier: 1.0,
        })
    }

    /// Delay before retry number `attempt` (zero-based), per the configured
    /// curve, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            BackoffCurve::Constant => self.delay,
            BackoffCurve::Exponential => {
                let factor = self.multiplier.powi(attempt as i32);
                (self.delay as f64 * factor) as u64
            }
        };
        Duration::from_millis(ms.min(self.max_delay))
    }
}

/// The caller-facing options object.
///
/// Field names mirror the upstream configuration surface; when both a
/// primary name and its deprecated alias are set, the primary wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
    /// Deprecated alias for `baseURL`; lower priority when both are given.
    #[serde(rename = "baseUrl")]
    pub base_url_compat: Option<String>,
    pub service: Option<String>,
    pub transport: Option<TransportMode>,
    /// Per-call timeout in milliseconds.
    pub timeout: Option<u64>,
    pub retry: Option<RetryConfig>,
    /// Backoff window after a persistent-channel failure, in milliseconds.
    #[serde(rename = "reconnectBackoff")]
    pub reconnect_backoff: Option<u64>,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    /// Legacy alias for `apiKey`; lower priority when both are given.
    pub token: Option<String>,
    /// Client-scoped environment map, consulted before the process env.
    pub env: Option<HashMap<String, String>>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn transport(mut self, transport: TransportMode) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_millis() as u64);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn reconnect_backoff(mut self, window: Duration) -> Self {
        self.reconnect_backoff = Some(window.as_millis() as u64);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }
}

/// Immutable resolved configuration; lives for the client's lifetime.
/// Only the transport mode can change afterwards, via the explicit override.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub service: String,
    pub transport: TransportMode,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub reconnect_backoff: Duration,
    pub credential: Option<String>,
}

impl ClientConfig {
    /// Resolves options against the process environment.
    pub fn resolve(options: ClientOptions) -> Result<Self> {
        let process_env: HashMap<String, String> = std::env::vars().collect();
        Self::resolve_with_env(options, &process_env)
    }

    /// Resolves options against an injected environment snapshot. This is
    /// the whole resolution logic; `resolve` only supplies the snapshot.
    pub fn resolve_with_env(
        options: ClientOptions,
        process_env: &HashMap<String, String>,
    ) -> Result<Self> {
        let base_url = options
            .base_url
            .clone()
            .or_else(|| options.base_url_compat.clone())
            .ok_or_else(|| WirefallError::InvalidConfig("baseURL is required".to_string()))?;

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(WirefallError::InvalidUrl(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let credential = resolve_credential(&options, process_env);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service: options.service.unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            transport: options.transport.unwrap_or_default(),
            timeout: Duration::from_millis(options.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)),
            retry: options.retry.unwrap_or_default(),
            reconnect_backoff: Duration::from_millis(
                options
                    .reconnect_backoff
                    .unwrap_or(DEFAULT_RECONNECT_BACKOFF_MS),
            ),
            credential,
        })
    }

    /// Persistent-channel address: the base address with its scheme swapped
    /// for the WebSocket equivalent, plus the channel route and service name.
    pub fn ws_url(&self) -> String {
        let (scheme, rest) = if let Some(rest) = self.base_url.strip_prefix("https://") {
            ("wss", rest)
        } else {
            ("ws", self.base_url.trim_start_matches("http://"))
        };
        format!("{}://{}/ws/{}", scheme, rest, self.service)
    }

    /// Fallback address: the base address plus the service name.
    pub fn http_url(&self) -> String {
        format!("{}/{}", self.base_url, self.service)
    }
}

/// Credential priority, checked in a fixed order: explicit `apiKey`, then
/// the legacy `token` option, then the client-scoped env map, then the
/// process env snapshot, each env scope under the primary key before the
/// legacy key.
pub fn resolve_credential(
    options: &ClientOptions,
    process_env: &HashMap<String, String>,
) -> Option<String> {
    if let Some(key) = &options.api_key {
        return Some(key.clone());
    }
    if let Some(token) = &options.token {
        return Some(token.clone());
    }
    if let Some(env) = &options.env {
        for key in [API_KEY_ENV, TOKEN_ENV] {
            if let Some(value) = env.get(key) {
                return Some(value.clone());
            }
        }
    }
    for key in [API_KEY_ENV, TOKEN_ENV] {
        if let Some(value) = process_env.get(key) {
            return Some(value.clone());
        }
    }
    None
}
