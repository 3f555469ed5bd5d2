//! Error types for hdlbuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Source catalog errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Same path registered twice with different attributes
    #[error("File '{path}' is already registered with conflicting attributes (library '{existing_library}')")]
    DuplicateFile {
        path: PathBuf,
        existing_library: String,
    },

    /// Library name is empty
    #[error("Library name for '{path}' must not be empty")]
    EmptyLibrary { path: PathBuf },

    /// Registered source does not exist on disk
    #[error("Source file not found: {path}")]
    MissingSource { path: PathBuf },
}

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolverError {
    /// Libraries depend on each other
    #[error("Cyclic dependency between libraries: {}", libraries.join(" -> "))]
    CyclicDependency { libraries: Vec<String> },

    /// Source could not be read for dependency scanning
    #[error("Failed to read source '{path}' for dependency scanning: {error}")]
    MissingSource { path: PathBuf, error: String },

    /// Scanner pattern failed to compile
    #[error("Invalid scanner pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },
}

/// Build cache errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Persisted cache cannot be trusted
    #[error("Cache at '{path}' is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// IO error while reading or writing the cache
    #[error("Cache IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Tool adapter errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// Backend cannot express a generic override of this type
    #[error("Backend '{backend}' cannot express override '{name}' of type {kind}")]
    UnsupportedOverride {
        backend: String,
        name: String,
        kind: String,
    },

    /// Backend does not offer the requested operation
    #[error("Backend '{backend}' does not support {operation}")]
    UnsupportedOperation { backend: String, operation: String },

    /// Subprocess could not be started
    #[error("Failed to start '{program}': {error}")]
    Invocation { program: String, error: String },

    /// Subprocess exceeded its wall-clock timeout and was killed
    #[error("'{program}' timed out after {}s and was terminated", after.as_secs_f64())]
    TimedOut { program: String, after: Duration },

    /// Subprocess was terminated by an external cancellation
    #[error("'{program}' was cancelled")]
    Cancelled { program: String },

    /// Command template needs a value the request did not supply
    #[error("Backend '{backend}' needs a value for '{placeholder}'")]
    MissingValue {
        backend: String,
        placeholder: String,
    },

    /// Backend executable is not available on this system
    #[error("Backend '{backend}' is not installed: '{executable}' not found")]
    ToolNotInstalled { backend: String, executable: String },

    /// Script file could not be written before invocation
    #[error("Failed to write script '{path}': {error}")]
    ScriptWrite { path: PathBuf, error: String },
}

/// Archive errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchiveError {
    /// Bundle could not be written
    #[error("Failed to write archive '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: String, error: String },

    /// Severity rule pattern does not compile
    #[error("Invalid severity rule pattern '{pattern}': {error}")]
    InvalidRule { pattern: String, error: String },

    /// Backend section is unusable
    #[error("Invalid backend '{backend}': {message}")]
    InvalidBackend { backend: String, message: String },
}

/// Filesystem errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to copy file
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level hdlbuild error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HdlBuildError {
    /// Catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Tool error
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Archive error
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// No backend registered under this name
    #[error("No backend named '{name}'. Available: {}", available.join(", "))]
    UnknownBackend {
        name: String,
        available: Vec<String>,
    },

    /// Operation needs a backend but none was requested or configured
    #[error("No {role} backend requested or configured")]
    NoBackend { role: String },

    /// Target is not `library.entity`
    #[error("Invalid target '{target}': expected 'library.entity'")]
    InvalidTarget { target: String },

    /// Simulate/synthesize requested without a target
    #[error("Operation '{operation}' requires a 'library.entity' target")]
    MissingTarget { operation: String },

    /// Tool output was classified as a failure
    #[error("{operation} failed for '{subject}'")]
    ToolFailed { operation: String, subject: String },
}
