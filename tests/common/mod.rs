//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! project directory, a scripted runner standing in for real tools, and a
//! backend that needs no installed executable.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use hdlbuild::core::catalog::GenericKind;
use hdlbuild::core::classify::Classifier;
use hdlbuild::core::tool::{
    Capabilities, CommandRunner, CompileRequest, Invocation, Operation, SimulateRequest,
    SynthesizeRequest, ToolBackend, ToolCommand, ToolResult, ToolStatus,
};
use hdlbuild::error::ToolError;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project, returning its path
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        self.create_bytes(name, content.as_bytes())
    }

    /// Create a file with raw contents, which need not be UTF-8
    pub fn create_bytes(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Names of entries directly under `name`, sorted
    pub fn list_dir(&self, name: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.dir.path().join(name)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a tool result
pub fn tool_result(code: i32, stdout: &str) -> ToolResult {
    ToolResult {
        status: ToolStatus::Exited(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
        elapsed: Duration::from_millis(5),
    }
}

/// What the scripted runner does for one call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return this result
    Result(ToolResult),
    /// Fail to start the process
    SpawnError,
    /// Cancel the token and report the process as cancelled
    Cancel,
}

/// Runner returning queued replies; an empty queue answers with a clean exit
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for the next calls
    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one more reply
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Every invocation received, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// First argument of every call
    pub fn call_subjects(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|i| i.steps[0].args.first().cloned().unwrap_or_default())
            .collect()
    }

    /// Number of invocations received
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(tool_result(0, "")),
            Some(Reply::Result(result)) => Ok(result),
            Some(Reply::SpawnError) => Err(ToolError::Invocation {
                program: invocation.program().to_string(),
                error: "No such file or directory".to_string(),
            }),
            Some(Reply::Cancel) => {
                cancel.cancel();
                Ok(ToolResult {
                    status: ToolStatus::Cancelled,
                    stdout: "partial".to_string(),
                    stderr: String::new(),
                    elapsed: Duration::from_millis(1),
                })
            }
        }
    }
}

/// Backend producing `fake <subject>` commands
///
/// Compile calls pass the file path, simulate/synthesize the entity name.
pub struct FakeBackend {
    name: String,
    caps: Capabilities,
    classifier: Classifier,
    installed: bool,
    flow: Option<String>,
    /// Files under the work dir declared as artifacts of simulate/synthesize
    artifacts: Vec<String>,
    /// Compiled libraries live in `<work_dir>/<library>`
    library_dirs: bool,
}

impl FakeBackend {
    /// Backend supporting compile, simulate and synthesize with all generic kinds
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            caps: Capabilities::new([Operation::Compile, Operation::Simulate, Operation::Synthesize])
                .with_generics([
                    GenericKind::Boolean,
                    GenericKind::Integer,
                    GenericKind::Real,
                    GenericKind::String,
                ]),
            classifier: Classifier::standard().expect("Default rules compile"),
            installed: true,
            flow: None,
            artifacts: Vec::new(),
            library_dirs: false,
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_flow(mut self, flow: &str) -> Self {
        self.flow = Some(flow.to_string());
        self
    }

    pub fn with_artifact(mut self, name: &str) -> Self {
        self.artifacts.push(name.to_string());
        self
    }

    pub fn with_library_dirs(mut self) -> Self {
        self.library_dirs = true;
        self
    }

    pub fn not_installed(mut self) -> Self {
        self.installed = false;
        self
    }
}

impl ToolBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn executable(&self) -> &str {
        "fake"
    }

    fn flow(&self) -> Option<&str> {
        self.flow.as_deref()
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

    fn library_dir(&self, library: &str, work_dir: &Path) -> Option<PathBuf> {
        self.library_dirs.then(|| work_dir.join(library))
    }

    fn compile_invocation(&self, request: &CompileRequest) -> Result<Invocation, ToolError> {
        Ok(Invocation::single(
            ToolCommand::new("fake", &request.work_dir)
                .arg(request.file.path.to_string_lossy())
                .arg(format!("--work={}", request.file.library)),
        ))
    }

    fn simulate_invocation(&self, request: &SimulateRequest) -> Result<Invocation, ToolError> {
        let mut command = ToolCommand::new("fake", &request.work_dir).arg(&request.entity);
        for (name, value) in request.generics.iter() {
            command = command.arg(format!("-g{name}={value}"));
        }
        let mut invocation = Invocation::single(command);
        invocation.artifacts = self.artifacts.iter().map(|a| request.work_dir.join(a)).collect();
        Ok(invocation)
    }

    fn synthesize_invocation(&self, request: &SynthesizeRequest) -> Result<Invocation, ToolError> {
        let command = ToolCommand::new("fake", &request.work_dir)
            .arg(&request.entity)
            .args(request.files.iter().map(|f| f.path.to_string_lossy().into_owned()))
            .args(
                request
                    .constraints
                    .iter()
                    .map(|c| format!("--constraints={}", c.path.display())),
            );
        let mut invocation = Invocation::single(command);
        invocation.artifacts = self.artifacts.iter().map(|a| request.work_dir.join(a)).collect();
        Ok(invocation)
    }
}

/// Package in library `util`
pub const UTIL_PKG: &str = r#"
library ieee;
use ieee.std_logic_1164.all;

package util_pkg is
    constant WIDTH : integer := 8;
end package util_pkg;
"#;

/// Entity in library `core` using `util`
pub const CORE_ALU: &str = r#"
library ieee;
use ieee.std_logic_1164.all;
library util;
use util.util_pkg.all;

entity alu is
    port (a, b : in std_logic_vector(WIDTH - 1 downto 0));
end entity alu;

architecture rtl of alu is
begin
end architecture rtl;
"#;

/// Testbench in library `tb` instantiating `core.alu`
pub const TB_TOP: &str = r#"
library ieee;
use ieee.std_logic_1164.all;
library core;

entity tb_top is
    generic (width : integer := 8);
end entity tb_top;

architecture sim of tb_top is
begin
    dut : entity core.alu port map (a => open, b => open);
end architecture sim;
"#;

/// Package in library `a` that uses library `b`
pub const CYCLE_A: &str = "library b;\nuse b.pkg_b.all;\npackage pkg_a is\nend package;\n";

/// Package in library `b` that uses library `a`
pub const CYCLE_B: &str = "library a;\nuse a.pkg_a.all;\npackage pkg_b is\nend package;\n";
