//! Scheduler and dispatcher configuration structures.

use std::env::{self, VarError};

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`SchedulerConfig::max_threads`].
pub const ENV_MAX_THREADS: &str = "NAVCORE_MAX_THREADS";
/// Environment variable overriding [`SchedulerConfig::thread_stack_size`].
pub const ENV_THREAD_STACK_SIZE: &str = "NAVCORE_THREAD_STACK_SIZE";
/// Environment variable overriding [`SchedulerConfig::thread_name_prefix`].
pub const ENV_THREAD_NAME_PREFIX: &str = "NAVCORE_THREAD_NAME_PREFIX";
/// Environment variable overriding [`DispatcherConfig::max_concurrent`].
pub const ENV_MAX_CONCURRENT_REQUESTS: &str = "NAVCORE_MAX_CONCURRENT_REQUESTS";

const MIN_STACK_SIZE: usize = 16 * 1024;

/// Work scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on worker threads, further capped by the platform ceiling.
    pub max_threads: usize,
    /// Stack size for worker threads; platform default when unset.
    pub thread_stack_size: Option<usize>,
    /// Worker threads are named `{prefix}-{slot}`.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_threads: 4,
            thread_stack_size: None,
            thread_name_prefix: "navcore-worker".into(),
        }
    }
}

impl SchedulerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread limit.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate scheduler configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if let Some(size) = self.thread_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
            }
        }
        Ok(())
    }
}

/// Network dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Requests allowed in flight at once; the map server accepts two per client.
    pub max_concurrent: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

impl DispatcherConfig {
    /// Set the in-flight request limit.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Validate dispatcher configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration for the scheduling core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Worker pool settings.
    pub scheduler: SchedulerConfig,
    /// Request admission settings.
    pub dispatcher: DispatcherConfig,
}

impl CoreConfig {
    /// Validate both sections.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.dispatcher
            .validate()
            .map_err(|e| format!("dispatcher invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `NAVCORE_*` variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        if let Some(max_threads) = env_usize(ENV_MAX_THREADS)? {
            cfg.scheduler.max_threads = max_threads;
        }
        if let Some(stack) = env_usize(ENV_THREAD_STACK_SIZE)? {
            cfg.scheduler.thread_stack_size = Some(stack);
        }
        if let Some(prefix) = env_string(ENV_THREAD_NAME_PREFIX)? {
            cfg.scheduler.thread_name_prefix = prefix;
        }
        if let Some(max_concurrent) = env_usize(ENV_MAX_CONCURRENT_REQUESTS)? {
            cfg.dispatcher.max_concurrent = max_concurrent;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_string(key: &str) -> Result<Option<String>, String> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("{key}: {e}")),
    }
}

fn env_usize(key: &str) -> Result<Option<usize>, String> {
    env_string(key)?
        .map(|raw| {
            raw.trim()
                .parse::<usize>()
                .map_err(|e| format!("{key}: invalid value `{raw}`: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = CoreConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dispatcher.max_concurrent, 2);
    }

    #[test]
    fn test_builder_methods() {
        let cfg = SchedulerConfig::new()
            .with_max_threads(8)
            .with_thread_stack_size(256 * 1024)
            .with_thread_name_prefix("tiles");
        assert_eq!(cfg.max_threads, 8);
        assert_eq!(cfg.thread_stack_size, Some(256 * 1024));
        assert_eq!(cfg.thread_name_prefix, "tiles");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_tiny_stack_rejected() {
        let cfg = SchedulerConfig::new().with_thread_stack_size(1024);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var(ENV_MAX_THREADS, " 6 ");
        env::set_var(ENV_MAX_CONCURRENT_REQUESTS, "3");
        let cfg = CoreConfig::from_env();
        env::remove_var(ENV_MAX_THREADS);
        env::remove_var(ENV_MAX_CONCURRENT_REQUESTS);

        let cfg = cfg.unwrap();
        assert_eq!(cfg.scheduler.max_threads, 6);
        assert_eq!(cfg.dispatcher.max_concurrent, 3);
    }

    #[test]
    fn test_env_usize_rejects_garbage() {
        env::set_var("NAVCORE_TEST_GARBAGE", "many");
        let parsed = env_usize("NAVCORE_TEST_GARBAGE");
        env::remove_var("NAVCORE_TEST_GARBAGE");
        assert!(parsed.unwrap_err().contains("invalid value `many`"));
    }
}
