//! Service configuration
//!
//! `SandboxConfig::default()` is a working local setup. `from_env()` layers
//! `AGENTBOX_*` environment variables on top of it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command line used to launch a program: executable plus leading arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Parse a whitespace-separated command line such as `python3 -m pytest`
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Configuration for the sandbox service
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,
    /// Directory under which every agent workspace is created
    pub workspace_root: PathBuf,
    /// Interpreter used by the execute endpoint (file path is appended)
    pub interpreter: CommandSpec,
    /// Test runner used by the test endpoint (workspace path is appended)
    pub test_runner: CommandSpec,
    /// Wall-clock limit for a single execution
    pub execution_timeout: Duration,
    /// Wall-clock limit for a test run
    pub test_timeout: Duration,
    /// Maximum bytes kept per output stream
    pub max_output_bytes: usize,
    /// Idle workspaces older than this are swept
    pub workspace_ttl: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
    /// Maximum accepted request body for uploads
    pub max_upload_bytes: usize,
    /// Token bucket burst size
    pub rate_limit_burst: u64,
    /// Token bucket refill rate (requests/sec)
    pub rate_limit_per_sec: f64,
    /// OTLP collector endpoint; console logging only when unset
    pub otlp_endpoint: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            workspace_root: std::env::temp_dir().join("agentbox"),
            interpreter: CommandSpec::new("python3", &[]),
            test_runner: CommandSpec::new("python3", &["-m", "pytest"]),
            execution_timeout: Duration::from_secs(30),
            test_timeout: Duration::from_secs(120),
            max_output_bytes: 1024 * 1024,
            workspace_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            max_upload_bytes: 16 * 1024 * 1024,
            rate_limit_burst: 50,
            rate_limit_per_sec: 10.0,
            otlp_endpoint: None,
        }
    }
}

/// Slowest accepted refill rate (one request per ~11.5 days)
pub const MIN_RATE_PER_SEC: f64 = 1e-6;

/// Error raised when an environment override cannot be parsed
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

impl SandboxConfig {
    /// Build a config from defaults plus `AGENTBOX_*` environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("AGENTBOX_LISTEN") {
            config.listen_addr = parse("AGENTBOX_LISTEN", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("AGENTBOX_INTERPRETER") {
            config.interpreter = CommandSpec::parse(&v).ok_or(ConfigError::Invalid {
                key: "AGENTBOX_INTERPRETER",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("AGENTBOX_TEST_RUNNER") {
            config.test_runner = CommandSpec::parse(&v).ok_or(ConfigError::Invalid {
                key: "AGENTBOX_TEST_RUNNER",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("AGENTBOX_EXEC_TIMEOUT_SECS") {
            config.execution_timeout = positive_secs("AGENTBOX_EXEC_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_TEST_TIMEOUT_SECS") {
            config.test_timeout = positive_secs("AGENTBOX_TEST_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse("AGENTBOX_MAX_OUTPUT_BYTES", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_WORKSPACE_TTL_SECS") {
            config.workspace_ttl = positive_secs("AGENTBOX_WORKSPACE_TTL_SECS", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = positive_secs("AGENTBOX_SWEEP_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = positive("AGENTBOX_MAX_UPLOAD_BYTES", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_RATE_LIMIT_BURST") {
            config.rate_limit_burst = positive("AGENTBOX_RATE_LIMIT_BURST", v)?;
        }
        if let Some(v) = lookup("AGENTBOX_RATE_LIMIT_PER_SEC") {
            config.rate_limit_per_sec = rate("AGENTBOX_RATE_LIMIT_PER_SEC", v)?;
        }
        if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !v.is_empty() {
                config.otlp_endpoint = Some(v);
            }
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

/// Integer that must be at least 1
fn positive<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let parsed: T = parse(key, value.clone())?;
    if parsed < T::from(1) {
        return Err(ConfigError::Invalid { key, value });
    }
    Ok(parsed)
}

/// Whole seconds, at least one
fn positive_secs(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    positive::<u64>(key, value).map(Duration::from_secs)
}

/// Requests per second: finite, and large enough that one refill interval fits a `Duration`
fn rate(key: &'static str, value: String) -> Result<f64, ConfigError> {
    let parsed: f64 = parse(key, value.clone())?;
    if !parsed.is_finite() || parsed < MIN_RATE_PER_SEC {
        return Err(ConfigError::Invalid { key, value });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.interpreter.program, "python3");
        assert_eq!(config.test_runner.args, vec!["-m", "pytest"]);
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = SandboxConfig::from_lookup(lookup_from(&[
            ("AGENTBOX_LISTEN", "0.0.0.0:9100"),
            ("AGENTBOX_INTERPRETER", "sh -e"),
            ("AGENTBOX_EXEC_TIMEOUT_SECS", "5"),
            ("AGENTBOX_RATE_LIMIT_PER_SEC", "2.5"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr.port(), 9100);
        assert_eq!(config.interpreter, CommandSpec::new("sh", &["-e"]));
        assert_eq!(config.execution_timeout, Duration::from_secs(5));
        assert!((config.rate_limit_per_sec - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let err = SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_MAX_OUTPUT_BYTES", "lots")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for AGENTBOX_MAX_OUTPUT_BYTES: 'lots'");
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        for key in [
            "AGENTBOX_EXEC_TIMEOUT_SECS",
            "AGENTBOX_TEST_TIMEOUT_SECS",
            "AGENTBOX_WORKSPACE_TTL_SECS",
            "AGENTBOX_SWEEP_INTERVAL_SECS",
        ] {
            let err = SandboxConfig::from_lookup(lookup_from(&[(key, "0")])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key), "{key}");
        }
    }

    #[test]
    fn test_zero_burst_and_upload_limit_are_rejected() {
        assert!(SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_RATE_LIMIT_BURST", "0")])).is_err());
        assert!(SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_MAX_UPLOAD_BYTES", "0")])).is_err());
        assert!(SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_RATE_LIMIT_BURST", "1")])).is_ok());
    }

    #[test]
    fn test_bad_rates_are_rejected() {
        for value in ["0", "-1", "NaN", "inf", "1e-30"] {
            let result = SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_RATE_LIMIT_PER_SEC", value)]));
            assert!(result.is_err(), "rate {value} should be rejected");
        }
        let config =
            SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_RATE_LIMIT_PER_SEC", "0.5")])).unwrap();
        assert!((config.rate_limit_per_sec - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_interpreter_is_rejected() {
        assert!(SandboxConfig::from_lookup(lookup_from(&[("AGENTBOX_INTERPRETER", "   ")])).is_err());
    }

    #[test]
    fn test_command_spec_parse() {
        let spec = CommandSpec::parse("python3 -m pytest -q").unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-m", "pytest", "-q"]);
        assert!(CommandSpec::parse("").is_none());
    }
}
