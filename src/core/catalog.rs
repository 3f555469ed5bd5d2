//! Source catalog
//!
//! Holds the declared source files of a project, grouped into libraries, together
//! with the per-file build attributes, project-level generics and constraints files.
//! The catalog is filled in by whatever loads the project and is never mutated by
//! the build engine.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_LIBRARY, FLOW_BY_EXTENSION};
use crate::error::CatalogError;

/// Kind of a source or constraints file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// VHDL source
    Vhdl,
    /// Verilog source
    Verilog,
    /// SystemVerilog source
    SystemVerilog,
    /// Precompiled netlist
    Netlist,
    /// TCL script
    Tcl,
    /// Xilinx user constraints
    Ucf,
    /// Synopsys design constraints
    Sdc,
    /// Xilinx design constraints
    Xdc,
}

impl FileKind {
    /// Infer the kind from a path's extension.
    ///
    /// Unknown extensions are treated as VHDL.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "v" => Self::Verilog,
            "sv" => Self::SystemVerilog,
            "ngc" => Self::Netlist,
            "tcl" => Self::Tcl,
            "ucf" => Self::Ucf,
            "sdc" => Self::Sdc,
            "xdc" => Self::Xdc,
            _ => Self::Vhdl,
        }
    }

    /// Whether library/package requirements can be inferred from the text
    pub fn supports_dependency_scan(self) -> bool {
        matches!(self, Self::Vhdl)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vhdl => "VHDL",
            Self::Verilog => "Verilog",
            Self::SystemVerilog => "SystemVerilog",
            Self::Netlist => "netlist",
            Self::Tcl => "TCL",
            Self::Ucf => "UCF",
            Self::Sdc => "SDC",
            Self::Xdc => "XDC",
        };
        write!(f, "{name}")
    }
}

/// Type of a generic/parameter override value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenericKind {
    /// Integer value
    Integer,
    /// Boolean value
    Boolean,
    /// Real value
    Real,
    /// String value
    String,
}

impl fmt::Display for GenericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
            Self::Real => write!(f, "real"),
            Self::String => write!(f, "string"),
        }
    }
}

/// A generic/parameter override value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenericValue {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
}

impl GenericValue {
    /// Type of this value
    pub fn kind(&self) -> GenericKind {
        match self {
            Self::Integer(_) => GenericKind::Integer,
            Self::Boolean(_) => GenericKind::Boolean,
            Self::Real(_) => GenericKind::Real,
            Self::String(_) => GenericKind::String,
        }
    }
}

impl fmt::Display for GenericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v:?}"),
            Self::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for GenericValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for GenericValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for GenericValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for GenericValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for GenericValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for GenericValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Ordered name → value mapping of generic overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generics(Vec<(String, GenericValue)>);

impl Generics {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, keeping the original position when the name already exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<GenericValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    /// Builder form of [`Generics::insert`]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<GenericValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a value by name
    pub fn get(&self, name: &str) -> Option<&GenericValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GenericValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of overrides
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no overrides
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Combine with `overrides`, whose values win on name collisions
    #[must_use]
    pub fn merged_with(&self, overrides: &Generics) -> Generics {
        let mut merged = self.clone();
        for (name, value) in overrides.iter() {
            merged.insert(name, value.clone());
        }
        merged
    }
}

/// Build attributes supplied when registering a file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAttributes {
    /// Include the file in synthesis
    pub synthesize: bool,
    /// Generic overrides attached to the file
    pub generics: Generics,
    /// Libraries this file must be compiled after, on top of inferred ones
    pub depends_on: Vec<String>,
    /// Extra tool arguments keyed by (tool, stage)
    pub tool_args: BTreeMap<(String, String), String>,
    /// Explicit file kind, overriding extension inference
    pub kind: Option<FileKind>,
}

impl Default for SourceAttributes {
    fn default() -> Self {
        Self {
            synthesize: true,
            generics: Generics::new(),
            depends_on: Vec::new(),
            tool_args: BTreeMap::new(),
            kind: None,
        }
    }
}

impl SourceAttributes {
    /// Create default attributes (synthesis enabled)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the synthesis flag
    #[must_use]
    pub fn synthesize(mut self, synthesize: bool) -> Self {
        self.synthesize = synthesize;
        self
    }

    /// Add a generic override
    #[must_use]
    pub fn generic(mut self, name: impl Into<String>, value: impl Into<GenericValue>) -> Self {
        self.generics.insert(name, value);
        self
    }

    /// Add an explicit library dependency hint
    #[must_use]
    pub fn depends_on(mut self, library: impl Into<String>) -> Self {
        self.depends_on.push(library.into().to_lowercase());
        self
    }

    /// Attach extra arguments for a tool stage
    #[must_use]
    pub fn tool_args(
        mut self,
        tool: impl Into<String>,
        stage: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        self.tool_args
            .insert((tool.into(), stage.into()), args.into());
        self
    }

    /// Force the file kind
    #[must_use]
    pub fn kind(mut self, kind: FileKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A registered source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Absolute path, unique within the catalog
    pub path: PathBuf,
    /// Library the file is compiled into
    pub library: String,
    /// HDL dialect or file type
    pub kind: FileKind,
    /// Include the file in synthesis
    pub synthesize: bool,
    /// Generic overrides attached to the file
    pub generics: Generics,
    /// Explicit library dependency hints
    pub depends_on: Vec<String>,
    /// Extra tool arguments keyed by (tool, stage)
    pub tool_args: BTreeMap<(String, String), String>,
}

impl SourceFile {
    /// Extra arguments attached to this file for a tool stage
    pub fn tool_arguments(&self, tool: &str, stage: &str) -> Option<&str> {
        self.tool_args
            .get(&(tool.to_string(), stage.to_string()))
            .map(String::as_str)
    }

    /// File name for log messages
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| {
                n.to_string_lossy().into_owned()
            })
    }
}

/// A named compilation namespace with its files in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    /// Library name (lower case)
    pub name: String,
    /// Files in declaration order
    pub files: Vec<SourceFile>,
}

/// A constraints file tagged with the flow it applies to
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintsFile {
    /// Absolute path
    pub path: PathBuf,
    /// File kind
    pub kind: FileKind,
    /// Explicit flow tag
    pub flow: Option<String>,
}

impl ConstraintsFile {
    /// Flow tag, falling back to the one implied by the extension.
    ///
    /// `None` means the file is not specific to any flow.
    pub fn effective_flow(&self) -> Option<String> {
        if let Some(flow) = &self.flow {
            return Some(flow.to_lowercase());
        }
        let ext = self.path.extension()?.to_str()?.to_ascii_lowercase();
        FLOW_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, flow)| (*flow).to_string())
    }
}

/// The declared set of source files of a project
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Root against which relative paths are resolved
    root: PathBuf,
    /// Libraries in insertion order
    libraries: Vec<Library>,
    /// Path → (library index, file index)
    index: HashMap<PathBuf, (usize, usize)>,
    /// Global declaration order
    order: Vec<PathBuf>,
    /// Constraints files in declaration order
    constraints: Vec<ConstraintsFile>,
    /// Project-level generics
    generics: Generics,
}

impl Catalog {
    /// Create an empty catalog whose relative paths resolve against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Root directory of the catalog
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a file in a library.
    ///
    /// Registering the same path again with identical library and attributes is
    /// a no-op; any difference is a [`CatalogError::DuplicateFile`].
    pub fn register(
        &mut self,
        path: impl AsRef<Path>,
        library: &str,
        attributes: SourceAttributes,
    ) -> Result<(), CatalogError> {
        let path = self.absolute(path.as_ref());
        let library = library.trim().to_lowercase();
        if library.is_empty() {
            return Err(CatalogError::EmptyLibrary { path });
        }

        let file = SourceFile {
            kind: attributes.kind.unwrap_or_else(|| FileKind::from_path(&path)),
            path: path.clone(),
            library: library.clone(),
            synthesize: attributes.synthesize,
            generics: attributes.generics,
            depends_on: attributes.depends_on,
            tool_args: attributes.tool_args,
        };

        if let Some(&(lib_idx, file_idx)) = self.index.get(&path) {
            let existing = &self.libraries[lib_idx].files[file_idx];
            if *existing == file {
                tracing::debug!("File already registered: {}", path.display());
                return Ok(());
            }
            return Err(CatalogError::DuplicateFile {
                path,
                existing_library: existing.library.clone(),
            });
        }

        let lib_idx = match self.libraries.iter().position(|l| l.name == library) {
            Some(idx) => idx,
            None => {
                self.libraries.push(Library {
                    name: library.clone(),
                    files: Vec::new(),
                });
                self.libraries.len() - 1
            }
        };

        tracing::debug!(
            "Registered {} ({}) in library {library}",
            path.display(),
            file.kind
        );
        let files = &mut self.libraries[lib_idx].files;
        files.push(file);
        self.index.insert(path.clone(), (lib_idx, files.len() - 1));
        self.order.push(path);
        Ok(())
    }

    /// Register a file into the default `work` library
    pub fn register_default(
        &mut self,
        path: impl AsRef<Path>,
        attributes: SourceAttributes,
    ) -> Result<(), CatalogError> {
        self.register(path, DEFAULT_LIBRARY, attributes)
    }

    /// Add a constraints file with an optional explicit flow tag
    pub fn add_constraints(&mut self, path: impl AsRef<Path>, flow: Option<&str>) {
        let path = self.absolute(path.as_ref());
        self.constraints.push(ConstraintsFile {
            kind: FileKind::from_path(&path),
            path,
            flow: flow.map(str::to_lowercase),
        });
    }

    /// Set a project-level generic
    pub fn add_generic(&mut self, name: impl Into<String>, value: impl Into<GenericValue>) {
        self.generics.insert(name, value);
    }

    /// Files of a library in declaration order
    pub fn files_for(&self, library: &str) -> &[SourceFile] {
        let library = library.to_lowercase();
        self.libraries
            .iter()
            .find(|l| l.name == library)
            .map_or(&[], |l| l.files.as_slice())
    }

    /// Library names in insertion order
    pub fn all_libraries(&self) -> Vec<&str> {
        self.libraries.iter().map(|l| l.name.as_str()).collect()
    }

    /// Libraries in insertion order
    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    /// Look up a file by path
    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        let path = self.absolute(path);
        self.index
            .get(&path)
            .map(|&(l, f)| &self.libraries[l].files[f])
    }

    /// All files in global declaration order
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.order
            .iter()
            .filter_map(|p| self.index.get(p))
            .map(|&(l, f)| &self.libraries[l].files[f])
    }

    /// Files flagged for synthesis, in global declaration order
    pub fn synthesis_fileset(&self) -> Vec<&SourceFile> {
        self.files().filter(|f| f.synthesize).collect()
    }

    /// Constraints files in declaration order
    pub fn constraints(&self) -> &[ConstraintsFile] {
        &self.constraints
    }

    /// Project-level generics
    pub fn generics(&self) -> &Generics {
        &self.generics
    }

    /// Number of registered files
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no files are registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Fail on the first registered file that does not exist on disk
    pub fn check_sources_exist(&self) -> Result<(), CatalogError> {
        match self.files().find(|f| !f.path.is_file()) {
            Some(missing) => Err(CatalogError::MissingSource {
                path: missing.path.clone(),
            }),
            None => Ok(()),
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        normalize(&joined)
    }
}

/// Lexically normalise a path (drop `.` and resolve `..`)
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
