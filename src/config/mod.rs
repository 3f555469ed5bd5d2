//! Configuration
//!
//! User settings are read from `config.toml` in the hdlbuild config directory
//! (or any explicit path). Every section is optional; a missing file yields the
//! defaults. Settings select the default simulator and synthesizer, the working
//! and archive directories, timeouts, severity rules and the declarative command
//! backends.

pub mod defaults;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::backend::CommandBackend;
use crate::core::builder::{BackendRegistry, BuildOptions};
use crate::core::catalog::GenericKind;
use crate::core::classify::{Severity, SeverityRule};
use crate::core::tool::{IncludePath, Operation};
use crate::error::ConfigError;

use defaults::{
    CACHE_FILE_NAME, CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_ARCHIVE_DIR, DEFAULT_PROJECT_ID,
    DEFAULT_SIMULATION_DIR, DEFAULT_SYNTHESIS_DIR,
};

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Project identity and tool selection
    #[serde(default)]
    pub project: ProjectConfig,

    /// Working, archive and cache locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Wall-clock timeouts per operation
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Global severity rules, applied after backend-specific ones
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Declarative command backends by name
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,

    /// Precompiled library search paths per backend (`name = path`)
    #[serde(default)]
    pub libraries: BTreeMap<String, BTreeMap<String, PathBuf>>,
}

/// Project identity and default tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Identifier used in archive names
    pub id: Option<String>,

    /// Backend used for compile and simulate
    pub simulator: Option<String>,

    /// Backend used for synthesize
    pub synthesizer: Option<String>,

    /// Target part passed to synthesis
    pub part: Option<String>,
}

/// Directory layout, relative paths resolve against the project root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    pub simulation_dir: Option<PathBuf>,
    pub synthesis_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub cache_file: Option<PathBuf>,
}

/// Timeouts in seconds; absent means unbounded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub compile_secs: Option<u64>,
    pub simulate_secs: Option<u64>,
    pub synthesize_secs: Option<u64>,
}

/// A severity rule as written in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression matched against each output line
    pub pattern: String,

    /// Severity assigned to matching lines
    pub severity: Severity,
}

impl RuleConfig {
    /// Compile into a [`SeverityRule`]
    pub fn compile(&self) -> Result<SeverityRule, ConfigError> {
        SeverityRule::new(&self.pattern, self.severity)
    }
}

/// Declarative command backend
///
/// Each operation is a list of steps run in sequence. Step arguments may use
/// placeholders (`{file}`, `{library}`, `{entity}`, `{part}`, `{work_dir}`,
/// `{duration}`) and whole-argument list expansions (`{generics}`, `{includes}`,
/// `{files}`, `{constraints}`, `{extra}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Executable name or path
    pub executable: String,

    /// Directory searched before `PATH`
    pub install_dir: Option<PathBuf>,

    /// Flow identifier used for constraint selection
    pub flow: Option<String>,

    /// Supported operations; derived from the step lists when empty
    pub operations: Vec<Operation>,

    /// Generic types the backend can override natively
    pub generic_kinds: Vec<GenericKind>,

    /// Constraint flows accepted; defaults to `flow`
    pub constraint_flows: Vec<String>,

    /// Decide pass/fail from output text only
    pub ignore_exit_code: bool,

    /// Backend-specific severity rules, evaluated first
    pub rules: Vec<RuleConfig>,

    /// Format of one `{generics}` argument
    pub generic_format: Option<String>,

    /// Format of one `{includes}` argument
    pub include_format: Option<String>,

    /// Extra arguments per stage, used before file-level tool arguments
    pub extra_args: BTreeMap<String, String>,

    /// Compile steps (run once per file)
    pub compile: Vec<StepConfig>,

    /// Simulate steps
    pub simulate: Vec<StepConfig>,

    /// Synthesize steps
    pub synthesize: Vec<StepConfig>,

    /// Output artifacts per operation, relative to the working directory
    pub artifacts: BTreeMap<String, Vec<String>>,

    /// Compiled library location (`{work_dir}`, `{library}`); files of a
    /// library whose directory is gone are recompiled
    pub library_dir: Option<String>,
}

/// One subprocess invocation of an operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Program to run; defaults to the backend executable
    pub program: Option<String>,

    /// Argument templates
    pub args: Vec<String>,

    /// Script written before the step runs
    pub script: Option<ScriptConfig>,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

/// Script file template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Path relative to the working directory
    pub path: String,

    /// Line templates, joined with newlines
    pub lines: Vec<String>,
}

impl Settings {
    /// Load settings from the user config directory
    ///
    /// Returns defaults when no config directory exists on this platform or the
    /// file is absent.
    pub fn load_user() -> Result<Self, ConfigError> {
        match user_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a specific path
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the file exists but is not valid TOML for
    /// these settings.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content, &path.display().to_string())
    }

    /// Parse settings from TOML text; `origin` names the source in errors
    pub fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            error: e.to_string(),
        })
    }

    /// Compile the global severity rules in order
    pub fn severity_rules(&self) -> Result<Vec<SeverityRule>, ConfigError> {
        self.rules.iter().map(RuleConfig::compile).collect()
    }

    /// Instantiate every configured command backend
    pub fn build_registry(&self) -> Result<BackendRegistry, ConfigError> {
        let global_rules = self.severity_rules()?;
        let mut registry = BackendRegistry::new();
        for (name, config) in &self.backends {
            let backend = CommandBackend::from_config(name, config, &global_rules)?;
            tracing::debug!(
                "Configured backend '{name}' (installed: {})",
                crate::core::tool::ToolBackend::is_installed(&backend)
            );
            registry.register(Box::new(backend));
        }
        Ok(registry)
    }

    /// Orchestrator options with relative paths resolved against `root`
    pub fn build_options(&self, root: &Path) -> BuildOptions {
        let resolve = |configured: &Option<PathBuf>, default: &str| -> PathBuf {
            let path = configured
                .clone()
                .unwrap_or_else(|| PathBuf::from(default));
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        };

        let includes = self
            .libraries
            .iter()
            .map(|(backend, libs)| {
                let paths = libs
                    .iter()
                    .map(|(name, path)| IncludePath {
                        name: name.to_lowercase(),
                        path: if path.is_absolute() {
                            path.clone()
                        } else {
                            root.join(path)
                        },
                    })
                    .collect();
                (backend.clone(), paths)
            })
            .collect();

        BuildOptions {
            project_id: self
                .project
                .id
                .clone()
                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
            simulator: self.project.simulator.clone(),
            synthesizer: self.project.synthesizer.clone(),
            part: self.project.part.clone(),
            simulation_dir: resolve(&self.paths.simulation_dir, DEFAULT_SIMULATION_DIR),
            synthesis_dir: resolve(&self.paths.synthesis_dir, DEFAULT_SYNTHESIS_DIR),
            archive_dir: resolve(&self.paths.archive_dir, DEFAULT_ARCHIVE_DIR),
            compile_timeout: self.timeouts.compile_secs.map(Duration::from_secs),
            simulate_timeout: self.timeouts.simulate_secs.map(Duration::from_secs),
            synthesize_timeout: self.timeouts.synthesize_secs.map(Duration::from_secs),
            includes,
        }
    }

    /// Location of the persisted build cache
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        match &self.paths.cache_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => self.build_options(root).simulation_dir.join(CACHE_FILE_NAME),
        }
    }
}

/// `<config dir>/hdlbuild/config.toml`, if the platform has a config directory
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
