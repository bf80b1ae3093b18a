//! Definition store
//!
//! Read-only access to test cases, endpoints, templates, scenarios and custom
//! variable definitions. [`Definitions`] is the in-memory form; [`FileStore`]
//! loads it from a YAML or TOML file and can re-read it on demand.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{PulserunError, Result};
use crate::models::{Endpoint, Scenario, Template, TestCase};

/// Maximum definitions file size (4 MB)
/// YAML parsers can expand memory 10-20x, so limit input size
const MAX_DEFINITIONS_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Lookups the engine needs from persisted definitions
pub trait DefinitionStore: Send + Sync {
    fn test(&self, tcid: &str) -> Option<TestCase>;

    /// Tests of a suite, in definition order
    fn tests_in_suite(&self, suite: &str) -> Vec<TestCase>;

    fn endpoint(&self, name: &str) -> Option<Endpoint>;

    fn template(&self, name: &str) -> Option<Template>;

    fn scenario(&self, name: &str) -> Option<Scenario>;
}

/// A persisted custom variable: `@{name(params)}` backed by a script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomVariableDef {
    pub name: String,

    /// Declared parameters, e.g. `(prefix, length)`
    #[serde(default, alias = "params")]
    pub param_spec: String,

    /// Rune source; empty means identity
    #[serde(default)]
    pub script: String,
}

/// Source of custom variable definitions, re-read on every call
pub trait CustomVariableSource: Send + Sync {
    fn load_definitions(&self) -> Result<Vec<CustomVariableDef>>;
}

/// In-memory definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default, alias = "test_cases")]
    pub tests: Vec<TestCase>,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub scenarios: Vec<Scenario>,

    #[serde(default, alias = "variables")]
    pub custom_variables: Vec<CustomVariableDef>,
}

impl Definitions {
    /// Reject records the engine cannot address unambiguously
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (i, test) in self.tests.iter().enumerate() {
            if test.tcid.trim().is_empty() {
                return Err(PulserunError::Definition(format!("Test {} must have a tcid", i + 1)));
            }
            if !seen.insert(test.tcid.as_str()) {
                return Err(PulserunError::Definition(format!("Duplicate tcid '{}'", test.tcid)));
            }
        }

        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                return Err(PulserunError::Definition("Endpoint must have a name".to_string()));
            }
        }

        for scenario in &self.scenarios {
            if scenario.steps.is_empty() {
                return Err(PulserunError::Definition(format!(
                    "Scenario '{}' must have at least one step",
                    scenario.name
                )));
            }
        }

        Ok(())
    }
}

impl DefinitionStore for Definitions {
    fn test(&self, tcid: &str) -> Option<TestCase> {
        self.tests.iter().find(|t| t.tcid == tcid).cloned()
    }

    fn tests_in_suite(&self, suite: &str) -> Vec<TestCase> {
        self.tests.iter().filter(|t| t.suite == suite).cloned().collect()
    }

    fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.endpoints.iter().find(|e| e.name == name).cloned()
    }

    fn template(&self, name: &str) -> Option<Template> {
        self.templates.iter().find(|t| t.name == name).cloned()
    }

    fn scenario(&self, name: &str) -> Option<Scenario> {
        self.scenarios.iter().find(|s| s.name == name).cloned()
    }
}

impl CustomVariableSource for Definitions {
    fn load_definitions(&self) -> Result<Vec<CustomVariableDef>> {
        Ok(self.custom_variables.clone())
    }
}

/// Definitions loaded from a YAML or TOML file
pub struct FileStore {
    path: PathBuf,
    defs: RwLock<Arc<Definitions>>,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let defs = load_definitions_file(path)?;
        info!(
            path = %path.display(),
            tests = defs.tests.len(),
            scenarios = defs.scenarios.len(),
            "Definitions loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            defs: RwLock::new(Arc::new(defs)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current definitions
    pub fn snapshot(&self) -> Arc<Definitions> {
        self.defs.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Re-read the file; on failure the previous definitions stay in place
    pub fn reload(&self) -> Result<()> {
        let defs = load_definitions_file(&self.path)?;
        *self.defs.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(defs);
        debug!(path = %self.path.display(), "Definitions reloaded");
        Ok(())
    }
}

impl DefinitionStore for FileStore {
    fn test(&self, tcid: &str) -> Option<TestCase> {
        self.snapshot().test(tcid)
    }

    fn tests_in_suite(&self, suite: &str) -> Vec<TestCase> {
        self.snapshot().tests_in_suite(suite)
    }

    fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.snapshot().endpoint(name)
    }

    fn template(&self, name: &str) -> Option<Template> {
        self.snapshot().template(name)
    }

    fn scenario(&self, name: &str) -> Option<Scenario> {
        self.snapshot().scenario(name)
    }
}

impl CustomVariableSource for FileStore {
    /// Reads the file again so edits are picked up by a resolver reload
    fn load_definitions(&self) -> Result<Vec<CustomVariableDef>> {
        Ok(load_definitions_file(&self.path)?.custom_variables)
    }
}

/// Load definitions from a file (YAML or TOML by extension)
pub fn load_definitions_file(path: &Path) -> Result<Definitions> {
    let metadata = fs::metadata(path)?;
    let file_size = metadata.len();
    if file_size > MAX_DEFINITIONS_FILE_SIZE {
        return Err(PulserunError::Definition(format!(
            "Definitions file too large: {} bytes (max {} bytes)",
            file_size, MAX_DEFINITIONS_FILE_SIZE
        )));
    }

    let content = fs::read_to_string(path)?;

    let extension = path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let defs: Definitions = match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| PulserunError::Definition(format!("Failed to parse YAML definitions: {}", e)))?,
        "toml" => toml::from_str(&content)
            .map_err(|e| PulserunError::Definition(format!("Failed to parse TOML definitions: {}", e)))?,
        _ => serde_yaml::from_str(&content)
            .or_else(|_| toml::from_str(&content)
                .map_err(|e| PulserunError::Definition(format!("Failed to parse definitions: {}", e))))?,
    };

    defs.validate()?;
    Ok(defs)
}
