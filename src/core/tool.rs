//! Tool adapter interface
//!
//! Backends describe what they can do ([`Capabilities`]) and turn normalized
//! requests into subprocess [`Invocation`]s. They never run anything
//! themselves: a [`CommandRunner`] executes invocations, and [`ToolAdapter`]
//! validates requests against the backend's capabilities before any process is
//! spawned.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::catalog::{ConstraintsFile, GenericKind, Generics, SourceFile};
use crate::core::classify::Classifier;
use crate::error::ToolError;

/// Operation kinds a backend may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Compile,
    Simulate,
    Synthesize,
}

impl Operation {
    /// Lower-case name, used in archive names and config keys
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Simulate => "simulate",
            Self::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a backend can do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Supported operations
    pub operations: BTreeSet<Operation>,
    /// Constraint flows accepted for synthesis
    pub constraint_flows: Vec<String>,
    /// Generic value types the backend can override
    pub generic_kinds: BTreeSet<GenericKind>,
    /// Whether generic overrides are supported at all
    pub native_generics: bool,
}

impl Capabilities {
    /// Capabilities for the given operations, nothing else
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Enable native generic overrides of these kinds
    #[must_use]
    pub fn with_generics(mut self, kinds: impl IntoIterator<Item = GenericKind>) -> Self {
        self.generic_kinds = kinds.into_iter().collect();
        self.native_generics = !self.generic_kinds.is_empty();
        self
    }

    /// Accept constraints tagged with these flows
    #[must_use]
    pub fn with_constraint_flows(mut self, flows: impl IntoIterator<Item = String>) -> Self {
        self.constraint_flows = flows.into_iter().map(|f| f.to_lowercase()).collect();
        self
    }

    /// Whether the operation is supported
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

/// A precompiled library made visible to the tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludePath {
    /// Library name
    pub name: String,
    /// Location of the compiled library
    pub path: PathBuf,
}

/// Compile one file into its library
#[derive(Debug, Clone, PartialEq)]
pub struct CompileRequest {
    pub file: SourceFile,
    pub work_dir: PathBuf,
    pub includes: Vec<IncludePath>,
}

/// Simulate `library.entity`
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateRequest {
    pub library: String,
    pub entity: String,
    pub generics: Generics,
    /// Simulated time; `None` runs until the simulation stops itself
    pub duration: Option<Duration>,
    /// Ordered file set, for backends that compile as part of simulation
    pub files: Vec<SourceFile>,
    pub includes: Vec<IncludePath>,
    pub work_dir: PathBuf,
}

/// Synthesize `library.entity`
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizeRequest {
    pub library: String,
    pub entity: String,
    pub generics: Generics,
    /// Constraints already filtered to the backend's flows
    pub constraints: Vec<ConstraintsFile>,
    pub part: Option<String>,
    /// Ordered synthesis file set
    pub files: Vec<SourceFile>,
    pub work_dir: PathBuf,
}

/// One subprocess to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl ToolCommand {
    /// Command with no arguments running in `cwd`
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// Append an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A file written before the commands run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub path: PathBuf,
    pub content: String,
}

/// Everything needed to perform one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Commands run in sequence, stopping at the first non-zero exit
    pub steps: Vec<ToolCommand>,
    /// Scripts written before the first step
    pub scripts: Vec<ScriptFile>,
    /// Output artifacts to archive
    pub artifacts: Vec<PathBuf>,
    /// Wall-clock limit for the whole invocation
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Invocation of a single command
    pub fn single(command: ToolCommand) -> Self {
        Self {
            steps: vec![command],
            ..Self::default()
        }
    }

    /// Program of the first step, for error messages
    pub fn program(&self) -> &str {
        self.steps.first().map_or("", |s| s.program.as_str())
    }
}

/// How a subprocess ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Exited on its own; -1 when killed by a signal
    Exited(i32),
    /// Killed after the timeout elapsed
    TimedOut,
    /// Killed by cancellation
    Cancelled,
}

/// Normalized outcome of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolResult {
    /// Exit code, if the process exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ToolStatus::Exited(code) => Some(code),
            ToolStatus::TimedOut | ToolStatus::Cancelled => None,
        }
    }

    /// Whether the run was cancelled
    pub fn was_cancelled(&self) -> bool {
        self.status == ToolStatus::Cancelled
    }
}

/// A backend plugin: capability declaration plus command construction
pub trait ToolBackend: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Executable the backend drives
    fn executable(&self) -> &str;

    /// Flow identifier used to select constraints
    fn flow(&self) -> Option<&str>;

    /// Supported operations and overrides
    fn capabilities(&self) -> &Capabilities;

    /// Rules used to classify this backend's output
    fn classifier(&self) -> &Classifier;

    /// Whether the executable is available
    fn is_installed(&self) -> bool;

    /// Where compiled `library` lives under `work_dir`, if the backend knows
    fn library_dir(&self, library: &str, work_dir: &Path) -> Option<PathBuf> {
        let _ = (library, work_dir);
        None
    }

    /// Build the invocation compiling one file
    fn compile_invocation(&self, request: &CompileRequest) -> Result<Invocation, ToolError> {
        let _ = request;
        Err(self.unsupported(Operation::Compile))
    }

    /// Build the invocation simulating an entity
    fn simulate_invocation(&self, request: &SimulateRequest) -> Result<Invocation, ToolError> {
        let _ = request;
        Err(self.unsupported(Operation::Simulate))
    }

    /// Build the invocation synthesizing an entity
    fn synthesize_invocation(&self, request: &SynthesizeRequest) -> Result<Invocation, ToolError> {
        let _ = request;
        Err(self.unsupported(Operation::Synthesize))
    }

    /// Error for an operation this backend does not offer
    fn unsupported(&self, operation: Operation) -> ToolError {
        ToolError::UnsupportedOperation {
            backend: self.name().to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Executes invocations
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run every step of `invocation`
    ///
    /// Timeouts and cancellation are reported through [`ToolStatus`]; only a
    /// failure to start a process is an error.
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError>;
}

/// Result of one adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    pub result: ToolResult,
    /// Artifacts declared by the invocation
    pub artifacts: Vec<PathBuf>,
}

/// Normalized compile/simulate/synthesize surface over one backend
pub struct ToolAdapter<'a, R> {
    backend: &'a dyn ToolBackend,
    runner: &'a R,
    /// Constraint flow replacing the backend's own for this adapter
    flow: Option<String>,
}

impl<'a, R: CommandRunner> ToolAdapter<'a, R> {
    /// Adapter for `backend` executing through `runner`
    pub fn new(backend: &'a dyn ToolBackend, runner: &'a R) -> Self {
        Self {
            backend,
            runner,
            flow: None,
        }
    }

    /// Select constraints for `flow` instead of the backend's declared flows
    #[must_use]
    pub fn with_flow(mut self, flow: Option<&str>) -> Self {
        self.flow = flow.map(str::to_lowercase);
        self
    }

    /// The wrapped backend
    pub fn backend(&self) -> &'a dyn ToolBackend {
        self.backend
    }

    /// Check the backend can run `operation` at all
    pub fn ensure_ready(&self, operation: Operation) -> Result<(), ToolError> {
        if !self.backend.capabilities().supports(operation) {
            return Err(self.backend.unsupported(operation));
        }
        if !self.backend.is_installed() {
            return Err(ToolError::ToolNotInstalled {
                backend: self.backend.name().to_string(),
                executable: self.backend.executable().to_string(),
            });
        }
        Ok(())
    }

    /// Fail if any override cannot be expressed by the backend
    pub fn check_generics(&self, generics: &Generics) -> Result<(), ToolError> {
        let caps = self.backend.capabilities();
        for (name, value) in generics.iter() {
            let kind = value.kind();
            if !caps.native_generics || !caps.generic_kinds.contains(&kind) {
                return Err(ToolError::UnsupportedOverride {
                    backend: self.backend.name().to_string(),
                    name: name.to_string(),
                    kind: kind.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Constraints whose flow this backend accepts; untagged files always pass
    pub fn select_constraints(&self, constraints: &[ConstraintsFile]) -> Vec<ConstraintsFile> {
        let caps = self.backend.capabilities();
        let own_flow = self.backend.flow().map(str::to_lowercase);
        let accepts = |flow: &str| match &self.flow {
            Some(selected) => selected == flow,
            None => {
                caps.constraint_flows.iter().any(|f| f == flow)
                    || own_flow.as_deref() == Some(flow)
            }
        };

        constraints
            .iter()
            .filter(|c| match c.effective_flow() {
                None => true,
                Some(flow) if accepts(&flow) => true,
                Some(flow) => {
                    tracing::info!(
                        "Excluding constraints {} (flow '{flow}') from backend '{}'",
                        c.path.display(),
                        self.backend.name()
                    );
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// Compile one file
    pub async fn compile(
        &self,
        request: &CompileRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        self.ensure_ready(Operation::Compile)?;
        self.check_generics(&request.file.generics)?;
        let invocation = self.backend.compile_invocation(request)?;
        self.execute(invocation, timeout, cancel).await
    }

    /// Simulate an entity
    pub async fn simulate(
        &self,
        request: &SimulateRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        self.ensure_ready(Operation::Simulate)?;
        self.check_generics(&request.generics)?;
        let invocation = self.backend.simulate_invocation(request)?;
        self.execute(invocation, timeout, cancel).await
    }

    /// Synthesize an entity; constraints are filtered by flow first
    pub async fn synthesize(
        &self,
        request: &SynthesizeRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        self.ensure_ready(Operation::Synthesize)?;
        self.check_generics(&request.generics)?;
        let mut request = request.clone();
        request.constraints = self.select_constraints(&request.constraints);
        let invocation = self.backend.synthesize_invocation(&request)?;
        self.execute(invocation, timeout, cancel).await
    }

    async fn execute(
        &self,
        mut invocation: Invocation,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, ToolError> {
        if timeout.is_some() {
            invocation.timeout = timeout;
        }
        let result = self.runner.run(&invocation, cancel).await?;
        Ok(ToolRun {
            result,
            artifacts: invocation.artifacts,
        })
    }
}

/// Render a simulation time with the largest exact unit (`100ms`, `20ns`)
pub fn format_sim_time(duration: Duration) -> String {
    const UNITS: [(&str, u128); 4] = [
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ];

    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0ns".to_string();
    }
    UNITS
        .iter()
        .find(|(_, factor)| nanos % factor == 0)
        .map_or_else(
            || format!("{nanos}ns"),
            |(unit, factor)| format!("{}{unit}", nanos / factor),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use std::cell::RefCell;

    struct StubBackend {
        caps: Capabilities,
        classifier: Classifier,
        installed: bool,
    }

    impl StubBackend {
        fn new(caps: Capabilities) -> Self {
            Self {
                caps,
                classifier: Classifier::new(Vec::new()),
                installed: true,
            }
        }
    }

    impl ToolBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }
        fn executable(&self) -> &str {
            "stub-sim"
        }
        fn flow(&self) -> Option<&str> {
            Some("vivado")
        }
        fn capabilities(&self) -> &Capabilities {
            &self.caps
        }
        fn classifier(&self) -> &Classifier {
            &self.classifier
        }
        fn is_installed(&self) -> bool {
            self.installed
        }
        fn simulate_invocation(&self, request: &SimulateRequest) -> Result<Invocation, ToolError> {
            Ok(Invocation::single(
                ToolCommand::new("stub-sim", &request.work_dir).arg(&request.entity),
            ))
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        calls: RefCell<Vec<Invocation>>,
    }

    impl CommandRunner for CountingRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            _cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            self.calls.borrow_mut().push(invocation.clone());
            Ok(ToolResult {
                status: ToolStatus::Exited(0),
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::ZERO,
            })
        }
    }

    fn simulate_request(generics: Generics) -> SimulateRequest {
        SimulateRequest {
            library: "lib".into(),
            entity: "tb".into(),
            generics,
            duration: None,
            files: Vec::new(),
            includes: Vec::new(),
            work_dir: PathBuf::from("/tmp/sim"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_override_fails_before_spawn() {
        let backend = StubBackend::new(
            Capabilities::new([Operation::Simulate]).with_generics([GenericKind::Integer]),
        );
        let runner = CountingRunner::default();
        let adapter = ToolAdapter::new(&backend, &runner);

        let request = simulate_request(Generics::new().with("ratio", 0.5));
        let err = adapter
            .simulate(&request, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ToolError::UnsupportedOverride {
                backend: "stub".into(),
                name: "ratio".into(),
                kind: "real".into(),
            }
        );
        assert!(runner.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_applied_to_invocation() {
        let backend = StubBackend::new(Capabilities::new([Operation::Simulate]));
        let runner = CountingRunner::default();
        let adapter = ToolAdapter::new(&backend, &runner);

        adapter
            .simulate(
                &simulate_request(Generics::new()),
                Some(Duration::from_secs(3)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(3)));
        assert_eq!(calls[0].steps[0].args, vec!["tb"]);
    }

    #[tokio::test]
    async fn test_missing_capability_and_install() {
        let backend = StubBackend::new(Capabilities::new([Operation::Simulate]));
        let runner = CountingRunner::default();
        let adapter = ToolAdapter::new(&backend, &runner);
        assert!(matches!(
            adapter.ensure_ready(Operation::Synthesize),
            Err(ToolError::UnsupportedOperation { .. })
        ));

        let mut missing = StubBackend::new(Capabilities::new([Operation::Simulate]));
        missing.installed = false;
        let adapter = ToolAdapter::new(&missing, &runner);
        assert_eq!(
            adapter.ensure_ready(Operation::Simulate),
            Err(ToolError::ToolNotInstalled {
                backend: "stub".into(),
                executable: "stub-sim".into(),
            })
        );
    }

    #[test]
    fn test_constraints_filtered_by_flow() {
        let backend = StubBackend::new(
            Capabilities::new([Operation::Synthesize]).with_constraint_flows(["ise".to_string()]),
        );
        let runner = CountingRunner::default();
        let adapter = ToolAdapter::new(&backend, &runner);

        let mut catalog = Catalog::new("/p");
        catalog.add_constraints("a.xdc", None);
        catalog.add_constraints("b.ucf", None);
        catalog.add_constraints("c.sdc", None);
        catalog.add_constraints("d.tcl", None);

        let kept: Vec<_> = adapter
            .select_constraints(catalog.constraints())
            .into_iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(kept, vec!["a.xdc", "b.ucf", "d.tcl"]);
    }

    #[test]
    fn test_flow_override_replaces_backend_flows() {
        let backend = StubBackend::new(Capabilities::new([Operation::Synthesize]));
        let runner = CountingRunner::default();
        let adapter = ToolAdapter::new(&backend, &runner).with_flow(Some("Quartus"));

        let mut catalog = Catalog::new("/p");
        catalog.add_constraints("a.xdc", None);
        catalog.add_constraints("b.sdc", None);
        catalog.add_constraints("pins.tcl", None);

        let kept: Vec<_> = adapter
            .select_constraints(catalog.constraints())
            .into_iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(kept, vec!["b.sdc", "pins.tcl"]);
    }

    #[test]
    fn test_format_sim_time() {
        assert_eq!(format_sim_time(Duration::from_secs(2)), "2s");
        assert_eq!(format_sim_time(Duration::from_millis(100)), "100ms");
        assert_eq!(format_sim_time(Duration::from_micros(1500)), "1500us");
        assert_eq!(format_sim_time(Duration::from_nanos(20)), "20ns");
        assert_eq!(format_sim_time(Duration::ZERO), "0ns");
    }
}
