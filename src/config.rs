use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::UpstreamConfig;

/// Application-level constants
pub const APP_NAME: &str = "Attune";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of recent notes pulled into a prompt when no explicit ids are given.
pub const DEFAULT_MAX_RECENT_NOTES: usize = 10;

pub const ENV_API_KEY: &str = "ATTUNE_API_KEY";
pub const ENV_BASE_URL: &str = "ATTUNE_API_BASE_URL";
pub const ENV_MODEL: &str = "ATTUNE_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "ATTUNE_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "ATTUNE_MAX_RETRIES";
pub const ENV_TEMPERATURE: &str = "ATTUNE_TEMPERATURE";
pub const ENV_MAX_OUTPUT_TOKENS: &str = "ATTUNE_MAX_OUTPUT_TOKENS";
pub const ENV_MAX_RECENT_NOTES: &str = "ATTUNE_MAX_RECENT_NOTES";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "attune=info"
}

/// How many extra upstream attempts a request may make before falling back.
///
/// Only retryable failures count: connection errors, timeouts, 429/5xx and
/// unusable output. A missing credential or a 4xx status falls back at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_retries: 0 }
    }

    pub fn retries(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Everything needed to build a [`crate::engine::ResponseOrchestrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub upstream: UpstreamConfig,
    pub retry: RetryPolicy,
    pub max_recent_notes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            retry: RetryPolicy::default(),
            max_recent_notes: DEFAULT_MAX_RECENT_NOTES,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `ATTUNE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    /// Values that do not parse are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            config.upstream.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            config.upstream.base_url = url.trim().to_string();
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            config.upstream.model = model.trim().to_string();
        }

        override_parsed(&non_empty, ENV_TIMEOUT_SECS, &mut config.upstream.timeout_secs);
        override_parsed(&non_empty, ENV_MAX_RETRIES, &mut config.retry.max_retries);
        override_parsed(&non_empty, ENV_TEMPERATURE, &mut config.upstream.generation.temperature);
        override_parsed(
            &non_empty,
            ENV_MAX_OUTPUT_TOKENS,
            &mut config.upstream.generation.max_output_tokens,
        );
        override_parsed(&non_empty, ENV_MAX_RECENT_NOTES, &mut config.max_recent_notes);

        config
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => tracing::warn!(var = name, error = %e, "Ignoring invalid configuration value"),
    }
}
