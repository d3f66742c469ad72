//! Configuration loader
//!
//! Loads application configuration from files and environment variables.
//!
//! ## Loading Strategy
//! 1. Probes standard paths for a config file; defaults are used if none
//!    exists
//! 2. Applies `HTTPGUARD_*` environment variable overrides
//! 3. Validates the result
//!
//! Files may be JSON or TOML and only need the values they change.
//!
//! ## Environment Variables
//! - `HTTPGUARD_BASE_URL`: Base URL requests are sent to
//! - `HTTPGUARD_TIMEOUT_SECS`: Per-attempt request timeout in seconds
//! - `HTTPGUARD_USER_AGENT`: User agent header value
//! - `HTTPGUARD_API_KEY`: Value sent as `X-API-KEY`
//! - `HTTPGUARD_RETRY_MAX`: Retries after the first attempt
//! - `HTTPGUARD_RETRY_DELAY_MS`: Delay between attempts in milliseconds
//! - `HTTPGUARD_CB_FAILURE_THRESHOLD`: Consecutive failures that open the
//!   circuit
//! - `HTTPGUARD_CB_OPEN_SECS`: Seconds the circuit stays open
//! - `HTTPGUARD_BULKHEAD_MAX_PARALLEL`: Concurrent executions allowed
//! - `HTTPGUARD_BULKHEAD_MAX_QUEUED`: Callers allowed to wait for a slot
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./httpguard.toml` or `./httpguard.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use httpguard_domain::{Config, DomainError, Result};

const FILE_NAMES: [&str; 4] = ["httpguard.toml", "httpguard.json", "config.toml", "config.json"];

/// Load configuration: probed file (or defaults), then environment overrides
///
/// # Errors
/// Returns `DomainError::Config` if:
/// - A probed file cannot be read or parsed
/// - An environment variable has an invalid value
/// - The merged configuration fails validation
pub fn load() -> Result<Config> {
    let base = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, starting from defaults");
            Config::default()
        }
    };

    let config = apply_env_overrides(base)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from defaults plus environment variables only
///
/// # Errors
/// Returns `DomainError::Config` if a variable has an invalid value or the
/// result fails validation.
pub fn load_from_env() -> Result<Config> {
    let config = apply_env_overrides(Config::default())?;
    config.validate()?;
    tracing::info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Override `config` with every `HTTPGUARD_*` variable that is set
///
/// Empty variables are ignored.
///
/// # Errors
/// Returns `DomainError::Config` naming the variable that failed to parse.
pub fn apply_env_overrides(mut config: Config) -> Result<Config> {
    if let Some(base_url) = env_string("HTTPGUARD_BASE_URL") {
        config.http.base_url = base_url;
    }
    if let Some(timeout) = env_parse("HTTPGUARD_TIMEOUT_SECS")? {
        config.http.timeout_secs = timeout;
    }
    if let Some(agent) = env_string("HTTPGUARD_USER_AGENT") {
        config.http.user_agent = agent;
    }
    if let Some(key) = env_string("HTTPGUARD_API_KEY") {
        config.http.api_key = Some(key);
    }
    if let Some(retries) = env_parse("HTTPGUARD_RETRY_MAX")? {
        config.retry.max_retries = retries;
    }
    if let Some(delay) = env_parse("HTTPGUARD_RETRY_DELAY_MS")? {
        config.retry.delay_ms = delay;
    }
    if let Some(threshold) = env_parse("HTTPGUARD_CB_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = threshold;
    }
    if let Some(open) = env_parse("HTTPGUARD_CB_OPEN_SECS")? {
        config.circuit_breaker.open_duration_secs = open;
    }
    if let Some(parallel) = env_parse("HTTPGUARD_BULKHEAD_MAX_PARALLEL")? {
        config.bulkhead.max_parallel = parallel;
    }
    if let Some(queued) = env_parse("HTTPGUARD_BULKHEAD_MAX_QUEUED")? {
        config.bulkhead.max_queued = queued;
    }
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `DomainError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(DomainError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            DomainError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| DomainError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration, choosing the format by file extension
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| DomainError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| DomainError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(DomainError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    dirs.iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Non-empty value of an environment variable
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse an environment variable if it is set
///
/// # Errors
/// Returns `DomainError::Config` if the value does not parse as `T`.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| DomainError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_VARS: [&str; 10] = [
        "HTTPGUARD_BASE_URL",
        "HTTPGUARD_TIMEOUT_SECS",
        "HTTPGUARD_USER_AGENT",
        "HTTPGUARD_API_KEY",
        "HTTPGUARD_RETRY_MAX",
        "HTTPGUARD_RETRY_DELAY_MS",
        "HTTPGUARD_CB_FAILURE_THRESHOLD",
        "HTTPGUARD_CB_OPEN_SECS",
        "HTTPGUARD_BULKHEAD_MAX_PARALLEL",
        "HTTPGUARD_BULKHEAD_MAX_QUEUED",
    ];

    fn clear_env() {
        for key in ENV_VARS {
            std::env::remove_var(key);
        }
    }

    fn write_temp(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().expect("temp file");
        temp_file.write_all(contents.as_bytes()).expect("write temp file");
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).expect("copy temp file");
        path
    }

    #[test]
    fn test_env_overrides_every_section() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("HTTPGUARD_BASE_URL", "http://localhost:9000");
        std::env::set_var("HTTPGUARD_API_KEY", "env-key");
        std::env::set_var("HTTPGUARD_RETRY_MAX", "5");
        std::env::set_var("HTTPGUARD_RETRY_DELAY_MS", "250");
        std::env::set_var("HTTPGUARD_CB_FAILURE_THRESHOLD", "2");
        std::env::set_var("HTTPGUARD_CB_OPEN_SECS", "10");
        std::env::set_var("HTTPGUARD_BULKHEAD_MAX_PARALLEL", "4");
        std::env::set_var("HTTPGUARD_BULKHEAD_MAX_QUEUED", "0");

        let result = load_from_env();
        clear_env();

        let config = result.expect("env config should load");
        assert_eq!(config.http.base_url, "http://localhost:9000");
        assert_eq!(config.http.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.delay_ms, 250);
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.open_duration_secs, 10);
        assert_eq!(config.bulkhead.max_parallel, 4);
        assert_eq!(config.bulkhead.max_queued, 0);
    }

    #[test]
    fn test_env_without_overrides_gives_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("HTTPGUARD_USER_AGENT", "   ");

        let result = load_from_env();
        clear_env();

        assert_eq!(result.expect("defaults are valid"), Config::default());
    }

    #[test]
    fn test_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("HTTPGUARD_RETRY_MAX", "three");

        let result = load_from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(matches!(err, DomainError::Config(_)), "Should be a Config error");
        assert!(err.to_string().contains("HTTPGUARD_RETRY_MAX"));
    }

    #[test]
    fn test_env_values_are_validated() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("HTTPGUARD_BULKHEAD_MAX_PARALLEL", "0");

        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(DomainError::Config(_))));
    }

    /// Validates that environment variables win over file values.
    ///
    /// Assertions:
    /// - Values only in the file survive.
    /// - Values set in both come from the environment.
    #[test]
    fn test_env_overrides_file_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        let path = write_temp("[retry]\nmax_retries = 7\ndelay_ms = 50\n", "toml");
        std::env::set_var("HTTPGUARD_RETRY_DELAY_MS", "75");

        let result = load_from_file(Some(path.clone())).and_then(apply_env_overrides);
        clear_env();
        std::fs::remove_file(path).ok();

        let config = result.expect("config");
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.delay_ms, 75);
    }

    #[test]
    fn test_load_from_file_json() {
        let path = write_temp(
            r#"{
                "http": { "base_url": "http://127.0.0.1:8080", "timeout_secs": 5 },
                "circuit_breaker": { "failure_threshold": 3 }
            }"#,
            "json",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("Should load config from JSON file");
        assert_eq!(config.http.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.open_duration_secs, 30);
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = write_temp(
            r#"
[http]
base_url = "http://localhost:3000"

[http.default_headers]
Accept = "application/json"

[bulkhead]
max_parallel = 2
max_queued = 3
"#,
            "toml",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("Should load config from TOML file");
        assert_eq!(config.http.default_headers.get("Accept").map(String::as_str), Some("application/json"));
        assert_eq!(config.bulkhead.max_parallel, 2);
        assert_eq!(config.bulkhead.max_queued, 3);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/httpguard.toml")));
        assert!(matches!(result, Err(DomainError::Config(_))), "Should be a Config error");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = write_temp(r#"{ "this is": "not valid json" "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid JSON format"));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", &PathBuf::from("test.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }

    #[test]
    fn test_parse_config_wrong_type() {
        let result = parse_config("[retry]\nmax_retries = \"many\"\n", &PathBuf::from("x.toml"));
        assert!(matches!(result, Err(DomainError::Config(_))));
    }
}
