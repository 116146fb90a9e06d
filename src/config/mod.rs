/// Configuration management for the stepflow engine
///
/// Handles server binding, the SQLite database location and the runtime knobs
/// of the execution engine. Every value can be overridden from the
/// environment; unparseable numbers fall back to their defaults.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Execution engine configuration
    pub engine: EngineConfig,
    /// Max tracing level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the database file (default: "data")
    pub data_dir: String,
    /// Database file name inside `data_dir`
    pub file_name: String,
    /// Pool size
    pub max_connections: u32,
}

/// Execution engine knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL that gateway-relative api_call URLs are joined onto
    pub gateway_url: String,
    /// Per-request timeout for outbound calls
    pub gateway_timeout_secs: u64,
    /// Delay used by delay steps that configure none
    pub default_delay_ms: u64,
    /// Wall-clock limit for one transform or condition expression
    pub expression_timeout_ms: u64,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("STEPFLOW_HOST", "0.0.0.0"),
                port: env_parse("STEPFLOW_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: env_or("STEPFLOW_DATA_DIR", "data"),
                file_name: "stepflow.db".to_string(),
                max_connections: 5,
            },
            engine: EngineConfig {
                gateway_url: env_or("STEPFLOW_GATEWAY_URL", "http://127.0.0.1:3005/proxy"),
                gateway_timeout_secs: env_parse("STEPFLOW_GATEWAY_TIMEOUT_SECS", 30),
                default_delay_ms: env_parse("STEPFLOW_DEFAULT_DELAY_MS", 1000),
                expression_timeout_ms: env_parse("STEPFLOW_EXPRESSION_TIMEOUT_MS", 5000),
            },
            log_level: env_or("STEPFLOW_LOG_LEVEL", "info"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_numbers_fall_back() {
        assert_eq!(env_parse("STEPFLOW_TEST_UNSET_VARIABLE", 42u16), 42);

        std::env::set_var("STEPFLOW_TEST_BAD_NUMBER", "not-a-number");
        assert_eq!(env_parse("STEPFLOW_TEST_BAD_NUMBER", 7u64), 7);

        std::env::set_var("STEPFLOW_TEST_GOOD_NUMBER", "1500");
        assert_eq!(env_parse("STEPFLOW_TEST_GOOD_NUMBER", 7u64), 1500);
    }

    #[test]
    fn string_values_default_when_unset() {
        assert_eq!(env_or("STEPFLOW_TEST_UNSET_HOST", "0.0.0.0"), "0.0.0.0");
    }
}
