//! Build orchestration logic
//!
//! Drives one compile, simulate or synthesize operation through
//! `PLANNING → FILTERING → EXECUTING → CLASSIFYING → ARCHIVING → DONE`, with
//! `FAILED` reachable from every state. Operations run strictly one at a time:
//! compile order and cache transitivity rely on it.
//!
//! Structural errors (unknown backend, cycles, unsupported overrides, missing
//! tools) end in `FAILED` before any process is spawned. Tool failures are
//! classified, archived with an `ERROR` tag, and then end in `FAILED`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::defaults::{
    DEFAULT_ARCHIVE_DIR, DEFAULT_PROJECT_ID, DEFAULT_SIMULATION_DIR, DEFAULT_SYNTHESIS_DIR,
};
use crate::core::archive::{ArchiveManager, ArchiveRecord};
use crate::core::cache::{BuildCache, BuildOutcome};
use crate::core::catalog::{Catalog, GenericValue, Generics};
use crate::core::classify::{ClassifiedMessage, Verdict};
use crate::core::plan::{BuildPlan, FilteredPlan};
use crate::core::resolver;
use crate::core::tool::{
    CommandRunner, CompileRequest, IncludePath, Operation, SimulateRequest, SynthesizeRequest,
    ToolAdapter, ToolBackend, ToolResult, ToolRun,
};
use crate::error::{ArchiveError, CacheError, HdlBuildError, ToolError};

/// Named backends available to the orchestrator
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn ToolBackend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend, replacing any with the same name
    pub fn register(&mut self, backend: Box<dyn ToolBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Look up a backend by name
    pub fn get(&self, name: &str) -> Result<&dyn ToolBackend, HdlBuildError> {
        self.backends
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| HdlBuildError::UnknownBackend {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is registered
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Project-wide orchestrator settings
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Identifier used in archive names
    pub project_id: String,
    /// Default backend for compile and simulate
    pub simulator: Option<String>,
    /// Default backend for synthesize
    pub synthesizer: Option<String>,
    /// Default target part
    pub part: Option<String>,
    /// Working directory for compile and simulate
    pub simulation_dir: PathBuf,
    /// Working directory for synthesize
    pub synthesis_dir: PathBuf,
    /// Root of archive bundles
    pub archive_dir: PathBuf,
    /// Wall-clock limit per compiled file
    pub compile_timeout: Option<Duration>,
    /// Wall-clock limit per simulation
    pub simulate_timeout: Option<Duration>,
    /// Wall-clock limit per synthesis run
    pub synthesize_timeout: Option<Duration>,
    /// Precompiled library search paths per backend
    pub includes: BTreeMap<String, Vec<IncludePath>>,
}

impl BuildOptions {
    /// Defaults with directories under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            simulator: None,
            synthesizer: None,
            part: None,
            simulation_dir: root.join(DEFAULT_SIMULATION_DIR),
            synthesis_dir: root.join(DEFAULT_SYNTHESIS_DIR),
            archive_dir: root.join(DEFAULT_ARCHIVE_DIR),
            compile_timeout: None,
            simulate_timeout: None,
            synthesize_timeout: None,
            includes: BTreeMap::new(),
        }
    }

    /// Set the default simulator
    #[must_use]
    pub fn with_simulator(mut self, backend: impl Into<String>) -> Self {
        self.simulator = Some(backend.into());
        self
    }

    /// Set the default synthesizer
    #[must_use]
    pub fn with_synthesizer(mut self, backend: impl Into<String>) -> Self {
        self.synthesizer = Some(backend.into());
        self
    }

    /// Set the project identifier
    #[must_use]
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = id.into();
        self
    }

    fn work_dir(&self, operation: Operation) -> PathBuf {
        match operation {
            Operation::Synthesize => self.synthesis_dir.clone(),
            Operation::Compile | Operation::Simulate => self.simulation_dir.clone(),
        }
    }

    fn default_backend(&self, operation: Operation) -> Option<&String> {
        match operation {
            Operation::Synthesize => self.synthesizer.as_ref(),
            Operation::Compile | Operation::Simulate => self.simulator.as_ref(),
        }
    }
}

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Planning,
    Filtering,
    Executing,
    Classifying,
    Archiving,
    Done,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Planning => "PLANNING",
            Self::Filtering => "FILTERING",
            Self::Executing => "EXECUTING",
            Self::Classifying => "CLASSIFYING",
            Self::Archiving => "ARCHIVING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        write!(f, "{text}")
    }
}

/// `library.entity` target of simulate/synthesize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub library: String,
    pub entity: String,
}

impl Target {
    /// Parse `library.entity`; both parts are lower-cased
    pub fn parse(target: &str) -> Result<Self, HdlBuildError> {
        let invalid = || HdlBuildError::InvalidTarget {
            target: target.to_string(),
        };
        let (library, entity) = target.trim().split_once('.').ok_or_else(invalid)?;
        let (library, entity) = (library.trim(), entity.trim());
        if library.is_empty() || entity.is_empty() || entity.contains('.') {
            return Err(invalid());
        }
        Ok(Self {
            library: library.to_lowercase(),
            entity: entity.to_lowercase(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.library, self.entity)
    }
}

/// Per-request overrides of project settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// Generics, winning over project-level generics
    pub generics: Generics,
    /// Simulated time; `None` runs until the simulation stops itself
    pub duration: Option<Duration>,
    /// Target part for synthesis
    pub part: Option<String>,
    /// Constraint flow to synthesize for, instead of the backend's own
    pub flow: Option<String>,
    /// Wall-clock limit for the terminal simulate/synthesize invocation
    pub timeout: Option<Duration>,
    /// Extra precompiled libraries
    pub includes: Vec<IncludePath>,
}

/// One operation requested by a front end
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub kind: Operation,
    /// `library.entity`; required for simulate and synthesize
    pub target: Option<String>,
    /// Backend name; defaults to the configured simulator/synthesizer
    pub backend: Option<String>,
    pub overrides: Overrides,
}

impl OperationRequest {
    /// Compile every changed file
    pub fn compile() -> Self {
        Self {
            kind: Operation::Compile,
            target: None,
            backend: None,
            overrides: Overrides::default(),
        }
    }

    /// Compile then simulate `target`
    pub fn simulate(target: impl Into<String>) -> Self {
        Self {
            kind: Operation::Simulate,
            target: Some(target.into()),
            ..Self::compile()
        }
    }

    /// Compile (if the backend compiles separately) then synthesize `target`
    pub fn synthesize(target: impl Into<String>) -> Self {
        Self {
            kind: Operation::Synthesize,
            target: Some(target.into()),
            ..Self::compile()
        }
    }

    /// Use a specific backend
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Override a generic
    #[must_use]
    pub fn with_generic(mut self, name: impl Into<String>, value: impl Into<GenericValue>) -> Self {
        self.overrides.generics.insert(name, value);
        self
    }

    /// Simulate for a fixed time
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.overrides.duration = Some(duration);
        self
    }

    /// Synthesize for a specific part
    #[must_use]
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.overrides.part = Some(part.into());
        self
    }

    /// Forward only constraints of this flow
    #[must_use]
    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.overrides.flow = Some(flow.into());
        self
    }

    /// Limit the terminal invocation's wall-clock time
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }
}

/// Result of [`Orchestrator::run_operation`]
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// Overall pass/fail
    pub succeeded: bool,
    /// Terminal state, `Done` or `Failed`
    pub state: BuildState,
    /// State in which the operation failed
    pub failed_in: Option<BuildState>,
    /// Every state visited, in order
    pub transitions: Vec<BuildState>,
    /// Backend used, once selected
    pub backend: Option<String>,
    /// Files compiled successfully in this run
    pub compiled: Vec<PathBuf>,
    /// Files skipped as unchanged
    pub skipped: Vec<PathBuf>,
    /// Classified output of every invocation
    pub messages: Vec<ClassifiedMessage>,
    /// Output of the terminal (or failing) invocation
    pub tool_result: Option<ToolResult>,
    /// Bundle written in ARCHIVING
    pub archive: Option<ArchiveRecord>,
    /// Archive failure; does not affect `succeeded`
    pub archive_error: Option<ArchiveError>,
    /// Why the operation failed
    pub error: Option<HdlBuildError>,
}

impl OperationOutcome {
    fn new() -> Self {
        Self {
            succeeded: false,
            state: BuildState::Planning,
            failed_in: None,
            transitions: vec![BuildState::Planning],
            backend: None,
            compiled: Vec::new(),
            skipped: Vec::new(),
            messages: Vec::new(),
            tool_result: None,
            archive: None,
            archive_error: None,
            error: None,
        }
    }

    fn enter(&mut self, state: BuildState) {
        tracing::debug!("{} -> {}", self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    fn fail(mut self, error: HdlBuildError) -> Self {
        tracing::error!("{error}");
        self.failed_in.get_or_insert(self.state);
        self.error = Some(error);
        self.succeeded = false;
        self.enter(BuildState::Failed);
        self
    }
}

/// What EXECUTING produced
struct Execution {
    /// Terminal or failing invocation
    run: Option<ToolRun>,
    /// Operation that produced `run`
    operation: Operation,
    /// Subject for error messages (file or target)
    subject: String,
    /// Whether EXECUTING stopped at a failed compile
    compile_failed: bool,
}

/// Sequences resolver, cache, tool adapter, classification and archiving
pub struct Orchestrator<R: CommandRunner> {
    catalog: Catalog,
    registry: BackendRegistry,
    cache: BuildCache,
    runner: R,
    options: BuildOptions,
    archiver: ArchiveManager,
    cancel: CancellationToken,
}

impl<R: CommandRunner> Orchestrator<R> {
    /// Create an orchestrator over a catalog
    pub fn new(
        catalog: Catalog,
        registry: BackendRegistry,
        cache: BuildCache,
        runner: R,
        options: BuildOptions,
    ) -> Self {
        let archiver = ArchiveManager::new(options.archive_dir.clone());
        Self {
            catalog,
            registry,
            cache,
            runner,
            options,
            archiver,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelling the operation in progress
    ///
    /// A cancelled token stays cancelled; [`Orchestrator::reset_cancellation`]
    /// arms a fresh one for the next operation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replace a cancelled token with a fresh one
    pub fn reset_cancellation(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    /// The build cache
    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    /// Delete every cache entry
    pub fn clear_cache(&mut self) -> Result<(), CacheError> {
        self.cache.clear()
    }

    /// The source catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Registered backends
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The runner executing invocations
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Orchestrator options
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Compile order of the current catalog
    pub fn plan(&self) -> Result<BuildPlan, HdlBuildError> {
        Ok(resolver::resolve(&self.catalog)?)
    }

    /// Run one operation to completion
    ///
    /// Never returns an error: every failure is reported in the outcome.
    pub async fn run_operation(&mut self, request: &OperationRequest) -> OperationOutcome {
        let mut outcome = OperationOutcome::new();
        tracing::info!(
            "Starting {} {}",
            request.kind,
            request.target.as_deref().unwrap_or("")
        );

        // PLANNING
        let backend_name = match self.select_backend(request) {
            Ok(name) => name,
            Err(e) => return outcome.fail(e),
        };
        outcome.backend = Some(backend_name.clone());

        let target = match request.kind {
            Operation::Compile => None,
            Operation::Simulate | Operation::Synthesize => {
                let Some(raw) = request.target.as_deref() else {
                    return outcome.fail(HdlBuildError::MissingTarget {
                        operation: request.kind.to_string(),
                    });
                };
                match Target::parse(raw) {
                    Ok(target) => Some(target),
                    Err(e) => return outcome.fail(e),
                }
            }
        };

        let generics = self.catalog.generics().merged_with(&request.overrides.generics);
        if let Err(e) = self.preflight(&backend_name, request.kind, &generics) {
            return outcome.fail(e);
        }

        let plan = match resolver::resolve(&self.catalog) {
            Ok(plan) => plan,
            Err(e) => return outcome.fail(e.into()),
        };
        tracing::info!(
            "Planned {} files in {} libraries",
            plan.len(),
            plan.units().len()
        );

        // FILTERING
        outcome.enter(BuildState::Filtering);
        let compile_phase = self.compiles_separately(&backend_name);
        let filtered = if compile_phase {
            let work_dir = self.options.work_dir(request.kind);
            let filtered = match self.registry.get(&backend_name) {
                Ok(backend) => self.cache.filter_with(&plan, &backend_name, |library| {
                    backend
                        .library_dir(library, &work_dir)
                        .map_or(true, |dir| dir.is_dir())
                }),
                Err(e) => return outcome.fail(e),
            };
            if request.kind == Operation::Synthesize {
                synthesis_only(filtered)
            } else {
                filtered
            }
        } else {
            FilteredPlan::default()
        };
        outcome.skipped = filtered.skipped().map(|p| p.file.path.clone()).collect();
        tracing::info!(
            "{} to compile, {} unchanged",
            filtered.build_count(),
            outcome.skipped.len()
        );

        // EXECUTING
        outcome.enter(BuildState::Executing);
        let execution = match self
            .execute(
                request,
                &backend_name,
                target.as_ref(),
                generics,
                &plan,
                &filtered,
                &mut outcome,
            )
            .await
        {
            Ok(execution) => execution,
            Err(e) => return outcome.fail(e),
        };

        if execution.compile_failed {
            outcome.failed_in = Some(BuildState::Executing);
        }

        // CLASSIFYING
        outcome.enter(BuildState::Classifying);
        let mut succeeded = !execution.compile_failed;
        if let Some(run) = &execution.run {
            if !execution.compile_failed && execution.operation != Operation::Compile {
                let verdict = match self.registry.get(&backend_name) {
                    Ok(backend) => {
                        let classification = backend.classifier().classify(&run.result);
                        outcome.messages.extend(classification.messages);
                        classification.verdict
                    }
                    Err(e) => return outcome.fail(e),
                };
                succeeded = verdict.is_success();
                if !succeeded {
                    outcome.failed_in = Some(BuildState::Classifying);
                }
            }
            outcome.tool_result = Some(run.result.clone());
        }

        let cancelled = outcome
            .tool_result
            .as_ref()
            .is_some_and(ToolResult::was_cancelled);
        if cancelled {
            let program = self.registry.get(&backend_name).map_or_else(
                |_| backend_name.clone(),
                |b| b.executable().to_string(),
            );
            outcome.failed_in.get_or_insert(BuildState::Executing);
            return outcome.fail(ToolError::Cancelled { program }.into());
        }

        // ARCHIVING
        outcome.enter(BuildState::Archiving);
        if let Some(run) = &execution.run {
            match self.archiver.archive(
                request.kind,
                &self.options.project_id,
                succeeded,
                &run.artifacts,
                Some(&run.result),
            ) {
                Ok(record) => outcome.archive = Some(record),
                Err(e) => {
                    tracing::error!("{e}");
                    outcome.archive_error = Some(e);
                }
            }
        }

        if succeeded {
            outcome.succeeded = true;
            outcome.enter(BuildState::Done);
            tracing::info!("{} succeeded", request.kind);
            outcome
        } else {
            outcome.fail(HdlBuildError::ToolFailed {
                operation: execution.operation.to_string(),
                subject: execution.subject,
            })
        }
    }

    fn select_backend(&self, request: &OperationRequest) -> Result<String, HdlBuildError> {
        let name = request
            .backend
            .as_ref()
            .or_else(|| self.options.default_backend(request.kind))
            .ok_or_else(|| HdlBuildError::NoBackend {
                role: match request.kind {
                    Operation::Synthesize => "synthesis".to_string(),
                    Operation::Compile | Operation::Simulate => "simulation".to_string(),
                },
            })?;
        self.registry.get(name)?;
        Ok(name.clone())
    }

    fn compiles_separately(&self, backend: &str) -> bool {
        self.registry
            .get(backend)
            .is_ok_and(|b| b.capabilities().supports(Operation::Compile))
    }

    /// Structural checks done before any process is spawned
    fn preflight(
        &self,
        backend_name: &str,
        operation: Operation,
        generics: &Generics,
    ) -> Result<(), HdlBuildError> {
        let backend = self.registry.get(backend_name)?;
        let adapter = ToolAdapter::new(backend, &self.runner);
        adapter.ensure_ready(operation)?;
        if operation != Operation::Compile {
            adapter.check_generics(generics)?;
            if backend.capabilities().supports(Operation::Compile) {
                adapter.ensure_ready(Operation::Compile)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &mut self,
        request: &OperationRequest,
        backend_name: &str,
        target: Option<&Target>,
        generics: Generics,
        plan: &BuildPlan,
        filtered: &FilteredPlan,
        outcome: &mut OperationOutcome,
    ) -> Result<Execution, HdlBuildError> {
        let backend = self.registry.get(backend_name)?;
        let adapter =
            ToolAdapter::new(backend, &self.runner).with_flow(request.overrides.flow.as_deref());
        let work_dir = self.options.work_dir(request.kind);
        let mut includes = self
            .options
            .includes
            .get(backend_name)
            .cloned()
            .unwrap_or_default();
        includes.extend(request.overrides.includes.iter().cloned());

        let mut compile_log: Option<ToolRun> = None;

        for planned in filtered.to_build() {
            if self.cancel.is_cancelled() {
                return Err(ToolError::Cancelled {
                    program: backend.executable().to_string(),
                }
                .into());
            }

            let file = &planned.file;
            tracing::info!("Compiling {} into {}", file.display_name(), file.library);
            let compile = CompileRequest {
                file: file.clone(),
                work_dir: work_dir.clone(),
                includes: includes.clone(),
            };
            let run = adapter
                .compile(&compile, self.options.compile_timeout, &self.cancel)
                .await?;

            if run.result.was_cancelled() {
                // Entry left untouched so the file is simply rebuilt next time
                return Ok(Execution {
                    run: Some(append_run(compile_log, run)),
                    operation: Operation::Compile,
                    subject: file.path.display().to_string(),
                    compile_failed: true,
                });
            }

            let classification = backend.classifier().classify(&run.result);
            outcome.messages.extend(classification.messages.iter().cloned());

            if !classification.verdict.is_success() {
                tracing::error!("Compilation of {} failed", file.display_name());
                if let Err(e) = self.cache.invalidate(backend_name, &file.path) {
                    tracing::error!("{e}");
                }
                return Ok(Execution {
                    run: Some(append_run(compile_log, run)),
                    operation: Operation::Compile,
                    subject: file.path.display().to_string(),
                    compile_failed: true,
                });
            }

            let result_outcome = if classification.verdict == Verdict::PassedWithWarnings {
                BuildOutcome::PassedWithWarnings
            } else {
                BuildOutcome::Passed
            };
            match &planned.fingerprint {
                Some(fp) => {
                    if let Err(e) =
                        self.cache
                            .record(backend_name, &file.path, fp.clone(), result_outcome)
                    {
                        tracing::error!("{e}");
                    }
                }
                None => tracing::warn!("No fingerprint for {}; not cached", file.display_name()),
            }
            outcome.compiled.push(file.path.clone());
            compile_log = Some(append_run(compile_log, run));
        }

        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled {
                program: backend.executable().to_string(),
            }
            .into());
        }

        let (run, subject) = match (request.kind, target) {
            (Operation::Simulate, Some(target)) => {
                let simulate = SimulateRequest {
                    library: target.library.clone(),
                    entity: target.entity.clone(),
                    generics,
                    duration: request.overrides.duration,
                    files: plan.files().cloned().collect(),
                    includes,
                    work_dir,
                };
                let timeout = request.overrides.timeout.or(self.options.simulate_timeout);
                tracing::info!("Simulating {target}");
                let run = adapter.simulate(&simulate, timeout, &self.cancel).await?;
                (run, target.to_string())
            }
            (Operation::Synthesize, Some(target)) => {
                let synthesize = SynthesizeRequest {
                    library: target.library.clone(),
                    entity: target.entity.clone(),
                    generics,
                    constraints: self.catalog.constraints().to_vec(),
                    part: request
                        .overrides
                        .part
                        .clone()
                        .or_else(|| self.options.part.clone()),
                    files: plan.files().filter(|f| f.synthesize).cloned().collect(),
                    work_dir,
                };
                let timeout = request.overrides.timeout.or(self.options.synthesize_timeout);
                tracing::info!("Synthesizing {target}");
                let run = adapter.synthesize(&synthesize, timeout, &self.cancel).await?;
                (run, target.to_string())
            }
            _ => {
                return Ok(Execution {
                    run: compile_log,
                    operation: Operation::Compile,
                    subject: "project".to_string(),
                    compile_failed: false,
                });
            }
        };

        Ok(Execution {
            run: Some(run),
            operation: request.kind,
            subject,
            compile_failed: false,
        })
    }
}

/// Keep only files flagged for synthesis
fn synthesis_only(filtered: FilteredPlan) -> FilteredPlan {
    FilteredPlan::new(
        filtered
            .entries()
            .iter()
            .filter(|p| p.file.synthesize)
            .cloned()
            .collect(),
    )
}

/// Concatenate compile outputs into one log
fn append_run(log: Option<ToolRun>, run: ToolRun) -> ToolRun {
    match log {
        None => run,
        Some(mut log) => {
            log.result.stdout.push_str(&run.result.stdout);
            log.result.stderr.push_str(&run.result.stderr);
            log.result.elapsed += run.result.elapsed;
            log.result.status = run.result.status;
            log.artifacts.extend(run.artifacts);
            log
        }
    }
}
