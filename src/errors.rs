//! Error types for pulserun

use thiserror::Error;

/// Main error type for pulserun
#[derive(Error, Debug)]
pub enum PulserunError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Test case '{tcid}' not found (referenced by {referenced_by})")]
    DependencyNotFound {
        tcid: String,
        referenced_by: String,
    },

    #[error("Malformed condition string '{conditions}': {message}")]
    Condition {
        conditions: String,
        message: String,
    },

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("Load profile error: {0}")]
    Profile(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl PulserunError {
    /// Whether this error belongs to the definition category (fatal before execution)
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            PulserunError::DependencyNotFound { .. }
                | PulserunError::Condition { .. }
                | PulserunError::Definition(_)
                | PulserunError::Profile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PulserunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_not_found_message() {
        let err = PulserunError::DependencyNotFound {
            tcid: "TC404".to_string(),
            referenced_by: "TC001".to_string(),
        };
        assert_eq!(err.to_string(), "Test case 'TC404' not found (referenced by TC001)");
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_runtime_is_not_definition_error() {
        assert!(!PulserunError::Runtime("boom".to_string()).is_definition_error());
    }
}
