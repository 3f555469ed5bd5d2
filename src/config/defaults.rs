//! Default configuration values

/// Library assigned to files registered without one
pub const DEFAULT_LIBRARY: &str = "work";

/// Libraries provided by every toolchain; they never create ordering edges
pub const BUILTIN_LIBRARIES: &[&str] = &["ieee", "std"];

/// Version of the persisted cache layout; a mismatch discards the store
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Cache file name, relative to the simulation directory
pub const CACHE_FILE_NAME: &str = ".hdlbuild-cache.json";

/// Name of the per-user config directory
pub const CONFIG_DIR_NAME: &str = "hdlbuild";

/// Config file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Timestamp format used in archive bundle names
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Prefix applied to bundles of failed operations
pub const ARCHIVE_ERROR_PREFIX: &str = "ERROR";

/// Default simulation working directory
pub const DEFAULT_SIMULATION_DIR: &str = "simulation";

/// Default synthesis working directory
pub const DEFAULT_SYNTHESIS_DIR: &str = "synthesis";

/// Default archive directory
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// Default project identifier used in archive names
pub const DEFAULT_PROJECT_ID: &str = "project";

/// Constraint flow inferred from a constraints file extension
pub const FLOW_BY_EXTENSION: &[(&str, &str)] = &[
    ("ucf", "ise"),
    ("xdc", "vivado"),
    ("sdc", "quartus"),
    ("qsf", "quartus"),
];

/// Severity rules applied when no backend-specific rules are configured.
///
/// Order matters: the first matching pattern decides a line's severity.
pub const DEFAULT_SEVERITY_RULES: &[(&str, &str)] = &[
    (r"(?i)^[#\s]*\*\*\s*fatal\b", "fatal"),
    (r"(?i)^[#\s]*\*\*\s*error\b", "error"),
    (r"(?i)^\s*(error|fatal)\s*:", "error"),
    (r"(?i):\s*error\s*:", "error"),
    (r"(?i)^[#\s]*\*\*\s*warning\b", "warning"),
    (r"(?i)^\s*warning\s*:", "warning"),
];

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
