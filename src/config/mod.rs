//! Config file handling
//!
//! ```toml
//! [run]
//! environment = "qa"
//! skip_waits = false
//! request_timeout = "30s"
//! max_report_requests = 20
//! body_sample_bytes = 4096
//!
//! [report]
//! format = "html"
//! output = "report.html"
//!
//! [log]
//! format = "text"
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{PulserunError, Result};
use crate::logging::LogFormat;
use crate::pipeline::report::{ReportFormat, DEFAULT_BODY_SAMPLE_BYTES};

/// pulserun configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub report: ReportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Endpoint environment used when `--env` is not given
    pub environment: Option<String>,
    pub skip_waits: bool,
    /// Per-request timeout, humantime syntax ("30s", "1m 30s")
    pub request_timeout: Option<String>,
    /// Requests kept per case in load reports
    pub max_report_requests: Option<usize>,
    pub body_sample_bytes: usize,
    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            environment: None,
            skip_waits: false,
            request_timeout: None,
            max_report_requests: None,
            body_sample_bytes: DEFAULT_BODY_SAMPLE_BYTES,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub format: Option<String>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: Option<LogFormat>,
    pub level: Option<String>,
}

impl Config {
    /// Load the config file.
    ///
    /// An explicit path must exist. The default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_file, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_config_dir().join("config.toml"), false),
        };

        if !config_file.exists() {
            if explicit {
                return Err(PulserunError::Config(format!(
                    "Config file not found: {}",
                    config_file.display()
                )));
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_file)
            .map_err(|e| PulserunError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PulserunError::Config(format!("Invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.report_format()?;
        self.request_timeout()?;
        if self.run.body_sample_bytes == 0 {
            return Err(PulserunError::Config("run.body_sample_bytes must be positive".to_string()));
        }
        Ok(())
    }

    pub fn report_format(&self) -> Result<Option<ReportFormat>> {
        self.report
            .format
            .as_deref()
            .map(|f| f.parse::<ReportFormat>().map_err(|e| PulserunError::Config(e.to_string())))
            .transpose()
    }

    pub fn request_timeout(&self) -> Result<Option<Duration>> {
        self.run
            .request_timeout
            .as_deref()
            .map(|t| {
                humantime::parse_duration(t)
                    .map_err(|e| PulserunError::Config(format!("Invalid run.request_timeout '{}': {}", t, e)))
            })
            .transpose()
    }

    /// Get the default config directory
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("pulserun"))
            .unwrap_or_else(|| PathBuf::from(".pulserun"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
[run]
environment = "qa"
skip_waits = true
request_timeout = "1m 30s"
max_report_requests = 5

[report]
format = "junit"
output = "out.xml"

[log]
format = "json"
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.run.environment.as_deref(), Some("qa"));
        assert!(config.run.skip_waits);
        assert_eq!(config.request_timeout().unwrap(), Some(Duration::from_secs(90)));
        assert_eq!(config.run.body_sample_bytes, DEFAULT_BODY_SAMPLE_BYTES);
        assert_eq!(config.report_format().unwrap(), Some(ReportFormat::JUnit));
        assert_eq!(config.log.format, Some(LogFormat::Json));
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_toml_str("[run]\nrequest_timeout = \"soon\"\n").is_err());
        assert!(Config::from_toml_str("[report]\nformat = \"pdf\"\n").is_err());
        assert!(Config::from_toml_str("[run]\nunknown = 1\n").is_err());
        assert!(Config::from_toml_str("not toml at all [").is_err());
    }

    #[test]
    fn test_load_paths() {
        let missing = Path::new("/definitely/not/here/pulserun.toml");
        assert!(matches!(Config::load(Some(missing)), Err(PulserunError::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[run]\nenvironment = \"staging\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.run.environment.as_deref(), Some("staging"));
    }
}
