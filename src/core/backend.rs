//! Declarative command backend
//!
//! A [`CommandBackend`] is a tool plugin described entirely by a
//! [`BackendConfig`]: which operations it offers, which generic types and
//! constraint flows it accepts, and the argument templates of each step.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{BackendConfig, StepConfig};
use crate::core::catalog::Generics;
use crate::core::classify::{default_rules, Classifier, SeverityRule};
use crate::core::tool::{
    format_sim_time, Capabilities, CompileRequest, IncludePath, Invocation, Operation,
    ScriptFile, SimulateRequest, SynthesizeRequest, ToolBackend, ToolCommand,
};
use crate::error::{ConfigError, ToolError};
use crate::infra::toolchain;

const DEFAULT_GENERIC_FORMAT: &str = "-g{name}={value}";
const DEFAULT_INCLUDE_FORMAT: &str = "-L{name}";

const SCALAR_KEYS: [&str; 6] = ["file", "library", "entity", "part", "work_dir", "duration"];
const LIST_KEYS: [&str; 5] = ["generics", "includes", "files", "constraints", "extra"];

/// Values substituted into templates for one invocation
#[derive(Debug, Default)]
struct TemplateValues {
    scalars: BTreeMap<&'static str, String>,
    lists: BTreeMap<&'static str, Vec<String>>,
}

impl TemplateValues {
    fn scalar(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.scalars.insert(key, value.into());
        self
    }

    fn list(mut self, key: &'static str, values: Vec<String>) -> Self {
        self.lists.insert(key, values);
        self
    }
}

/// Tool backend driven by a [`BackendConfig`]
#[derive(Debug, Clone)]
pub struct CommandBackend {
    name: String,
    executable: String,
    program: Option<PathBuf>,
    flow: Option<String>,
    capabilities: Capabilities,
    classifier: Classifier,
    generic_format: String,
    include_format: String,
    extra_args: BTreeMap<String, String>,
    steps: BTreeMap<Operation, Vec<StepConfig>>,
    artifacts: BTreeMap<Operation, Vec<String>>,
    library_dir: Option<String>,
}

impl CommandBackend {
    /// Build a backend from its config section
    ///
    /// Backend rules are evaluated before `global_rules`, which come before the
    /// built-in defaults.
    pub fn from_config(
        name: &str,
        config: &BackendConfig,
        global_rules: &[SeverityRule],
    ) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidBackend {
            backend: name.to_string(),
            message,
        };

        if config.executable.trim().is_empty() {
            return Err(invalid("no executable configured".to_string()));
        }

        let steps = BTreeMap::from([
            (Operation::Compile, config.compile.clone()),
            (Operation::Simulate, config.simulate.clone()),
            (Operation::Synthesize, config.synthesize.clone()),
        ]);

        let operations: Vec<Operation> = if config.operations.is_empty() {
            steps
                .iter()
                .filter(|(_, s)| !s.is_empty())
                .map(|(op, _)| *op)
                .collect()
        } else {
            config.operations.clone()
        };
        if let Some(op) = operations.iter().find(|op| steps[*op].is_empty()) {
            return Err(invalid(format!("operation '{op}' has no steps")));
        }

        let mut artifacts = BTreeMap::new();
        for (key, paths) in &config.artifacts {
            let op = match key.as_str() {
                "compile" => Operation::Compile,
                "simulate" => Operation::Simulate,
                "synthesize" => Operation::Synthesize,
                other => return Err(invalid(format!("unknown artifact operation '{other}'"))),
            };
            artifacts.insert(op, paths.clone());
        }

        let mut rules = config
            .rules
            .iter()
            .map(crate::config::RuleConfig::compile)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(global_rules.iter().cloned());
        rules.extend(default_rules()?);

        let flow = config.flow.as_ref().map(|f| f.to_lowercase());
        let capabilities = Capabilities::new(operations)
            .with_generics(config.generic_kinds.iter().copied())
            .with_constraint_flows(config.constraint_flows.iter().cloned());

        let program = toolchain::locate_executable(&config.executable, config.install_dir.as_deref());

        Ok(Self {
            name: name.to_string(),
            executable: config.executable.clone(),
            program,
            flow,
            capabilities,
            classifier: Classifier::new(rules).ignore_exit_code(config.ignore_exit_code),
            generic_format: config
                .generic_format
                .clone()
                .unwrap_or_else(|| DEFAULT_GENERIC_FORMAT.to_string()),
            include_format: config
                .include_format
                .clone()
                .unwrap_or_else(|| DEFAULT_INCLUDE_FORMAT.to_string()),
            extra_args: config.extra_args.clone(),
            steps,
            artifacts,
            library_dir: config.library_dir.clone(),
        })
    }

    fn generic_args(&self, generics: &Generics) -> Vec<String> {
        generics
            .iter()
            .map(|(name, value)| {
                self.generic_format
                    .replace("{name}", name)
                    .replace("{value}", &value.to_string())
            })
            .collect()
    }

    fn include_args(&self, includes: &[IncludePath]) -> Vec<String> {
        includes
            .iter()
            .map(|inc| {
                self.include_format
                    .replace("{name}", &inc.name)
                    .replace("{path}", &inc.path.display().to_string())
            })
            .collect()
    }

    fn stage_extra(&self, operation: Operation, file_level: Option<&str>) -> Vec<String> {
        self.extra_args
            .get(operation.as_str())
            .map(String::as_str)
            .or(file_level)
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn build(
        &self,
        operation: Operation,
        work_dir: &Path,
        values: &TemplateValues,
    ) -> Result<Invocation, ToolError> {
        let default_program = self.program.as_ref().map_or_else(
            || self.executable.clone(),
            |p| p.display().to_string(),
        );

        let mut invocation = Invocation::default();
        for step in self.steps.get(&operation).into_iter().flatten() {
            if let Some(script) = &step.script {
                let mut lines = Vec::new();
                for line in &script.lines {
                    lines.extend(self.expand(line, values, true)?);
                }
                let path = work_dir.join(self.expand_scalar(&script.path, values)?);
                invocation.scripts.push(ScriptFile {
                    path,
                    content: lines.join("\n") + "\n",
                });
            }

            let mut args = Vec::new();
            for template in &step.args {
                args.extend(self.expand(template, values, false)?);
            }

            let mut command = ToolCommand::new(
                step.program.clone().unwrap_or_else(|| default_program.clone()),
                work_dir,
            )
            .args(args);
            command.env = step.env.clone();
            invocation.steps.push(command);
        }

        for template in self.artifacts.get(&operation).into_iter().flatten() {
            match self.expand_scalar(template, values) {
                Ok(path) => invocation.artifacts.push(work_dir.join(path)),
                Err(e) => tracing::debug!("Skipping artifact '{template}': {e}"),
            }
        }

        Ok(invocation)
    }

    /// Expand one argument (or script line) into zero or more strings
    fn expand(
        &self,
        template: &str,
        values: &TemplateValues,
        script_line: bool,
    ) -> Result<Vec<String>, ToolError> {
        for key in LIST_KEYS {
            if template.trim() == format!("{{{key}}}") {
                let items = values.lists.get(key).cloned().unwrap_or_default();
                return Ok(if script_line && !items.is_empty() {
                    vec![items.join(" ")]
                } else {
                    items
                });
            }
        }

        if template.contains("{duration}") && !values.scalars.contains_key("duration") {
            return Ok(Vec::new());
        }

        let mut expanded = self.expand_scalar(template, values)?;
        for key in LIST_KEYS {
            let placeholder = format!("{{{key}}}");
            if expanded.contains(&placeholder) {
                let joined = values.lists.get(key).map(|l| l.join(" ")).unwrap_or_default();
                expanded = expanded.replace(&placeholder, &joined);
            }
        }
        Ok(vec![expanded])
    }

    fn expand_scalar(&self, template: &str, values: &TemplateValues) -> Result<String, ToolError> {
        let mut expanded = template.to_string();
        for key in SCALAR_KEYS {
            let placeholder = format!("{{{key}}}");
            if !expanded.contains(&placeholder) {
                continue;
            }
            let value = values
                .scalars
                .get(key)
                .ok_or_else(|| ToolError::MissingValue {
                    backend: self.name.clone(),
                    placeholder: placeholder.clone(),
                })?;
            expanded = expanded.replace(&placeholder, value);
        }
        Ok(expanded)
    }
}

fn paths(files: impl IntoIterator<Item = PathBuf>) -> Vec<String> {
    files.into_iter().map(|p| p.display().to_string()).collect()
}

impl ToolBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    fn flow(&self) -> Option<&str> {
        self.flow.as_deref()
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn is_installed(&self) -> bool {
        self.program.is_some()
    }

    fn library_dir(&self, library: &str, work_dir: &Path) -> Option<PathBuf> {
        let template = self.library_dir.as_ref()?;
        let values = TemplateValues::default()
            .scalar("library", library)
            .scalar("work_dir", work_dir.display().to_string());
        match self.expand_scalar(template, &values) {
            Ok(dir) => Some(work_dir.join(dir)),
            Err(e) => {
                tracing::warn!("Ignoring library_dir of '{}': {e}", self.name);
                None
            }
        }
    }

    fn compile_invocation(&self, request: &CompileRequest) -> Result<Invocation, ToolError> {
        let file = &request.file;
        let values = TemplateValues::default()
            .scalar("file", file.path.display().to_string())
            .scalar("library", &file.library)
            .scalar("work_dir", request.work_dir.display().to_string())
            .list("files", paths([file.path.clone()]))
            .list("generics", self.generic_args(&file.generics))
            .list("includes", self.include_args(&request.includes))
            .list(
                "extra",
                self.stage_extra(Operation::Compile, file.tool_arguments(&self.name, "compile")),
            );
        self.build(Operation::Compile, &request.work_dir, &values)
    }

    fn simulate_invocation(&self, request: &SimulateRequest) -> Result<Invocation, ToolError> {
        let mut values = TemplateValues::default()
            .scalar("library", &request.library)
            .scalar("entity", &request.entity)
            .scalar("work_dir", request.work_dir.display().to_string())
            .list("files", paths(request.files.iter().map(|f| f.path.clone())))
            .list("generics", self.generic_args(&request.generics))
            .list("includes", self.include_args(&request.includes))
            .list("extra", self.stage_extra(Operation::Simulate, None));
        if let Some(duration) = request.duration {
            values = values.scalar("duration", format_sim_time(duration));
        }
        self.build(Operation::Simulate, &request.work_dir, &values)
    }

    fn synthesize_invocation(&self, request: &SynthesizeRequest) -> Result<Invocation, ToolError> {
        let mut values = TemplateValues::default()
            .scalar("library", &request.library)
            .scalar("entity", &request.entity)
            .scalar("work_dir", request.work_dir.display().to_string())
            .list("files", paths(request.files.iter().map(|f| f.path.clone())))
            .list(
                "constraints",
                paths(request.constraints.iter().map(|c| c.path.clone())),
            )
            .list("generics", self.generic_args(&request.generics))
            .list("extra", self.stage_extra(Operation::Synthesize, None));
        if let Some(part) = &request.part {
            values = values.scalar("part", part);
        }
        self.build(Operation::Synthesize, &request.work_dir, &values)
    }
}
