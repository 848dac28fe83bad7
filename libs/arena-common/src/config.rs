use std::env;

/// Upper bound on concurrent engine calls within one run
pub const MAX_PARALLEL_TESTS_CAP: usize = 5;

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub engine_url: String,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub memory_limit_bytes: u64,
    pub max_parallel_tests: usize,
    pub engine_max_attempts: u32,
    pub engine_retry_backoff_ms: u64,
    pub language_config_path: String,
    pub runtimes_cache_ttl_secs: u64,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset or unparseable values fall back
    /// to the defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: u64| -> u64 {
            lookup(name).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        Self {
            engine_url: lookup("ENGINE_URL")
                .unwrap_or_else(|| "https://emkc.org/api/v2/piston".to_string()),
            default_timeout_ms: var_or("DEFAULT_TIMEOUT_MS", 5000),
            max_timeout_ms: var_or("MAX_TIMEOUT_MS", 30000),
            memory_limit_bytes: var_or("MEMORY_LIMIT_BYTES", 128 * 1024 * 1024),
            max_parallel_tests: (var_or("MAX_PARALLEL_TESTS", 1) as usize)
                .clamp(1, MAX_PARALLEL_TESTS_CAP),
            engine_max_attempts: (var_or("ENGINE_MAX_ATTEMPTS", 2).min(u32::MAX as u64) as u32)
                .max(1),
            engine_retry_backoff_ms: var_or("ENGINE_RETRY_BACKOFF_MS", 250),
            language_config_path: lookup("LANGUAGE_CONFIG_PATH")
                .unwrap_or_else(|| "config/languages.json".to_string()),
            runtimes_cache_ttl_secs: var_or("RUNTIMES_CACHE_TTL_SECS", 3600),
            port: lookup("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    /// Clamp a caller-supplied timeout to the configured ceiling
    pub fn effective_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|ms| *ms > 0)
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.default_timeout_ms, 5000);
        assert_eq!(config.max_timeout_ms, 30000);
        assert_eq!(config.max_parallel_tests, 1);
        assert_eq!(config.engine_max_attempts, 2);
        assert_eq!(config.port, 3000);
        assert!(config.engine_url.starts_with("https://"));
    }

    #[test]
    fn test_config_overrides() {
        let config = config_from(&[
            ("ENGINE_URL", "http://localhost:2000/api/v2"),
            ("DEFAULT_TIMEOUT_MS", "1500"),
            ("MAX_PARALLEL_TESTS", "64"),
            ("ENGINE_MAX_ATTEMPTS", "0"),
            ("PORT", "not-a-port"),
        ]);
        assert_eq!(config.engine_url, "http://localhost:2000/api/v2");
        assert_eq!(config.default_timeout_ms, 1500);
        assert_eq!(config.max_parallel_tests, MAX_PARALLEL_TESTS_CAP);
        assert_eq!(config.engine_max_attempts, 1);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_effective_timeout_is_clamped() {
        let config = config_from(&[]);
        assert_eq!(config.effective_timeout_ms(None), 5000);
        assert_eq!(config.effective_timeout_ms(Some(0)), 5000);
        assert_eq!(config.effective_timeout_ms(Some(1200)), 1200);
        assert_eq!(config.effective_timeout_ms(Some(120_000)), 30000);
    }
}
