//! Client configuration with explicit-value > environment > default
//! resolution.
//!
//! A [`Config`] is built once per client instance and never mutated
//! afterwards. Environment variables are consulted exactly once, inside
//! [`ConfigBuilder::build`]; there is no process-wide configuration
//! state, so multiple clients with different settings coexist freely.

use std::time::Duration;

/// Default local ComfyUI base URL.
pub const DEFAULT_COMFYUI_URL: &str = "http://127.0.0.1:8188";

/// Default cloud service base URL.
pub const DEFAULT_CLOUD_URL: &str = "https://www.runninghub.ai";

/// Default cloud job timeout in seconds.
pub const DEFAULT_CLOUD_TIMEOUT_SECS: u64 = 600;

/// Default number of retries for transient cloud poll failures.
pub const DEFAULT_CLOUD_RETRY_COUNT: u32 = 3;

/// Default local execution timeout in seconds.
pub const DEFAULT_LOCAL_TIMEOUT_SECS: u64 = 600;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of consecutive poll failures tolerated before the
/// local backend is considered unreachable.
pub const DEFAULT_POLL_RETRY_COUNT: u32 = 3;

/// Which protocol the local backend executor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Submit then poll the history endpoint (default).
    Http,
    /// Submit then stream progress events over a WebSocket.
    WebSocket,
}

impl ExecutorKind {
    /// Parse an executor kind from its configuration string.
    ///
    /// Unrecognized values fall back to [`ExecutorKind::Http`].
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Self::WebSocket,
            "http" => Self::Http,
            other => {
                tracing::warn!(value = %other, "Unknown executor kind, using http");
                Self::Http
            }
        }
    }
}

/// Immutable per-client configuration.
///
/// | Field               | Env var                  | Default                      |
/// |---------------------|--------------------------|------------------------------|
/// | `comfyui_url`       | `COMFYUI_BASE_URL`       | `http://127.0.0.1:8188`      |
/// | `executor`          | `COMFYUI_EXECUTOR`       | `http`                       |
/// | `api_key`           | `COMFYUI_API_KEY`        | none                         |
/// | `cookies`           | `COMFYUI_COOKIES`        | none                         |
/// | `cloud_url`         | `RUNNINGHUB_BASE_URL`    | `https://www.runninghub.ai`  |
/// | `cloud_api_key`     | `RUNNINGHUB_API_KEY`     | none                         |
/// | `cloud_timeout`     | `RUNNINGHUB_TIMEOUT`     | 600 s                        |
/// | `cloud_retry_count` | `RUNNINGHUB_RETRY_COUNT` | 3                            |
#[derive(Debug, Clone)]
pub struct Config {
    /// Base HTTP URL of the local ComfyUI server.
    pub comfyui_url: String,
    /// Local backend protocol.
    pub executor: ExecutorKind,
    /// Optional bearer token sent on every local request.
    pub api_key: Option<String>,
    /// Optional cookie header sent on every local request.
    pub cookies: Option<String>,
    /// Base URL of the cloud execution service.
    pub cloud_url: String,
    /// API key for the cloud execution service.
    pub cloud_api_key: Option<String>,
    /// Wall-clock budget for one cloud job.
    pub cloud_timeout: Duration,
    /// Retries for transient cloud poll failures.
    pub cloud_retry_count: u32,
    /// Wall-clock budget for one local execution.
    pub local_timeout: Duration,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Consecutive poll failures tolerated before giving up locally.
    pub poll_retry_count: u32,
}

impl Config {
    /// Start building a configuration. Unset fields fall back to
    /// environment variables, then to built-in defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`Config`]. Every setter overrides both the environment
/// variable and the default for that field.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    comfyui_url: Option<String>,
    executor: Option<ExecutorKind>,
    api_key: Option<String>,
    cookies: Option<String>,
    cloud_url: Option<String>,
    cloud_api_key: Option<String>,
    cloud_timeout: Option<Duration>,
    cloud_retry_count: Option<u32>,
    local_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    poll_retry_count: Option<u32>,
}

impl ConfigBuilder {
    /// Base HTTP URL of the local ComfyUI server.
    pub fn comfyui_url(mut self, url: impl Into<String>) -> Self {
        self.comfyui_url = Some(url.into());
        self
    }

    /// Local backend protocol.
    pub fn executor(mut self, kind: ExecutorKind) -> Self {
        self.executor = Some(kind);
        self
    }

    /// Bearer token for the local server.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Cookie header for the local server.
    pub fn cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    /// Base URL of the cloud execution service.
    pub fn cloud_url(mut self, url: impl Into<String>) -> Self {
        self.cloud_url = Some(url.into());
        self
    }

    /// API key for the cloud execution service.
    pub fn cloud_api_key(mut self, key: impl Into<String>) -> Self {
        self.cloud_api_key = Some(key.into());
        self
    }

    /// Wall-clock budget for one cloud job.
    pub fn cloud_timeout(mut self, timeout: Duration) -> Self {
        self.cloud_timeout = Some(timeout);
        self
    }

    /// Retries for transient cloud poll failures.
    pub fn cloud_retry_count(mut self, count: u32) -> Self {
        self.cloud_retry_count = Some(count);
        self
    }

    /// Wall-clock budget for one local execution.
    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = Some(timeout);
        self
    }

    /// Interval between status polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Consecutive poll failures tolerated before giving up locally.
    pub fn poll_retry_count(mut self, count: u32) -> Self {
        self.poll_retry_count = Some(count);
        self
    }

    /// Resolve every field: builder value > environment > default.
    ///
    /// The environment is read here and never again; the returned
    /// [`Config`] is immutable.
    pub fn build(self) -> Config {
        let trimmed = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Config {
            comfyui_url: self
                .comfyui_url
                .or_else(|| trimmed("COMFYUI_BASE_URL"))
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_COMFYUI_URL.to_string()),
            executor: self.executor.unwrap_or_else(|| {
                trimmed("COMFYUI_EXECUTOR")
                    .map(|v| ExecutorKind::parse(&v))
                    .unwrap_or(ExecutorKind::Http)
            }),
            api_key: self.api_key.or_else(|| trimmed("COMFYUI_API_KEY")),
            cookies: self.cookies.or_else(|| trimmed("COMFYUI_COOKIES")),
            cloud_url: self
                .cloud_url
                .or_else(|| trimmed("RUNNINGHUB_BASE_URL"))
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_CLOUD_URL.to_string()),
            cloud_api_key: self.cloud_api_key.or_else(|| trimmed("RUNNINGHUB_API_KEY")),
            cloud_timeout: self.cloud_timeout.unwrap_or_else(|| {
                Duration::from_secs(parse_env_u64(
                    "RUNNINGHUB_TIMEOUT",
                    DEFAULT_CLOUD_TIMEOUT_SECS,
                ))
            }),
            cloud_retry_count: self.cloud_retry_count.unwrap_or_else(|| {
                parse_env_u64("RUNNINGHUB_RETRY_COUNT", DEFAULT_CLOUD_RETRY_COUNT as u64) as u32
            }),
            local_timeout: self
                .local_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_LOCAL_TIMEOUT_SECS)),
            poll_interval: self
                .poll_interval
                .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            poll_retry_count: self.poll_retry_count.unwrap_or(DEFAULT_POLL_RETRY_COUNT),
        }
    }
}

/// Read a numeric environment variable, falling back to `default` when
/// the variable is unset or not a valid number.
fn parse_env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "Ignoring non-numeric env value");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The COMFYUI_* variables are deliberately untouched by the tests in
    // this module; the env-fallback scenario for them lives in the client
    // crate's integration tests, which run in their own process. Tests
    // here that need the environment use only the RUNNINGHUB_* variables.
    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::builder().build();
        assert_eq!(config.comfyui_url, DEFAULT_COMFYUI_URL);
        assert_eq!(config.executor, ExecutorKind::Http);
        assert_eq!(
            config.local_timeout,
            Duration::from_secs(DEFAULT_LOCAL_TIMEOUT_SECS)
        );
        assert_eq!(
            config.poll_interval,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        assert!(config.api_key.is_none());
    }

    // Environment checks share one test so parallel test threads never
    // race on the same process-wide variables.
    #[test]
    fn env_fallback_and_builder_priority() {
        std::env::set_var("RUNNINGHUB_BASE_URL", "https://env-cloud.example.com");
        std::env::set_var("RUNNINGHUB_API_KEY", "env-key");
        std::env::set_var("RUNNINGHUB_TIMEOUT", "120");

        let from_env = Config::builder().build();
        assert_eq!(from_env.cloud_url, "https://env-cloud.example.com");
        assert_eq!(from_env.cloud_api_key.as_deref(), Some("env-key"));
        assert_eq!(from_env.cloud_timeout, Duration::from_secs(120));

        // An explicit builder value always wins over the environment.
        let explicit = Config::builder()
            .cloud_url("https://param-cloud.example.com")
            .cloud_timeout(Duration::from_secs(60))
            .build();
        assert_eq!(explicit.cloud_url, "https://param-cloud.example.com");
        assert_eq!(explicit.cloud_timeout, Duration::from_secs(60));

        // Junk numeric values fall back to the default.
        std::env::set_var("RUNNINGHUB_TIMEOUT", "not-a-number");
        let junk = Config::builder().build();
        assert_eq!(
            junk.cloud_timeout,
            Duration::from_secs(DEFAULT_CLOUD_TIMEOUT_SECS)
        );

        std::env::remove_var("RUNNINGHUB_BASE_URL");
        std::env::remove_var("RUNNINGHUB_API_KEY");
        std::env::remove_var("RUNNINGHUB_TIMEOUT");
    }

    #[test]
    fn executor_kind_parses_known_values() {
        assert_eq!(ExecutorKind::parse("websocket"), ExecutorKind::WebSocket);
        assert_eq!(ExecutorKind::parse("WS"), ExecutorKind::WebSocket);
        assert_eq!(ExecutorKind::parse("http"), ExecutorKind::Http);
        assert_eq!(ExecutorKind::parse("bogus"), ExecutorKind::Http);
    }

    #[test]
    fn trailing_slash_is_stripped_from_urls() {
        let config = Config::builder()
            .comfyui_url("http://host:8188/")
            .cloud_url("https://cloud.example.com/")
            .build();
        assert_eq!(config.comfyui_url, "http://host:8188");
        assert_eq!(config.cloud_url, "https://cloud.example.com");
    }

    #[test]
    fn instances_are_independent() {
        let a = Config::builder().comfyui_url("http://a:8188").build();
        let b = Config::builder().comfyui_url("http://b:8188").build();
        assert_ne!(a.comfyui_url, b.comfyui_url);
    }
}
