//! Build plans
//!
//! A [`BuildPlan`] is the resolver's ordered list of compile units. The cache
//! turns it into a [`FilteredPlan`] that marks each file build or skip. Both are
//! recomputed on every invocation and never persisted.

use std::fmt;

use crate::core::catalog::SourceFile;

/// One library's files, in compile order
#[derive(Debug, Clone, PartialEq)]
pub struct CompileUnit {
    /// Library name
    pub library: String,
    /// Files in compile order
    pub files: Vec<SourceFile>,
}

/// Dependency-respecting compile order across libraries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildPlan {
    units: Vec<CompileUnit>,
}

impl BuildPlan {
    /// Create a plan from ordered compile units
    pub fn new(units: Vec<CompileUnit>) -> Self {
        Self { units }
    }

    /// Compile units in order
    pub fn units(&self) -> &[CompileUnit] {
        &self.units
    }

    /// Library names in compile order
    pub fn libraries(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.library.as_str()).collect()
    }

    /// Every file in compile order
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.units.iter().flat_map(|u| u.files.iter())
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.units.iter().map(|u| u.files.len()).sum()
    }

    /// Whether the plan has no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a file must be compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildReason {
    /// No cache entry for this backend
    NotCached,
    /// Content differs from the cached fingerprint
    Changed,
    /// An earlier file in the plan is being rebuilt
    UpstreamRebuilt,
    /// An earlier file was compiled after this one's entry was written
    UpstreamNewer,
    /// The file could not be read for fingerprinting
    Unreadable,
    /// The compiled library is gone from the working directory
    LibraryMissing,
}

impl fmt::Display for BuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotCached => "not cached",
            Self::Changed => "changed",
            Self::UpstreamRebuilt => "upstream rebuilt",
            Self::UpstreamNewer => "upstream newer",
            Self::Unreadable => "unreadable",
            Self::LibraryMissing => "library missing",
        };
        write!(f, "{text}")
    }
}

/// Decision for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildAction {
    Build(BuildReason),
    Skip,
}

/// A file with its cache decision
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    pub file: SourceFile,
    pub action: BuildAction,
    /// Fingerprint of the current contents, recorded on success
    pub fingerprint: Option<String>,
}

impl PlannedFile {
    /// Whether the file must be compiled
    pub fn needs_build(&self) -> bool {
        matches!(self.action, BuildAction::Build(_))
    }
}

/// A build plan with every file marked build or skip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredPlan {
    entries: Vec<PlannedFile>,
}

impl FilteredPlan {
    /// Create from decisions in compile order
    pub fn new(entries: Vec<PlannedFile>) -> Self {
        Self { entries }
    }

    /// All decisions in compile order
    pub fn entries(&self) -> &[PlannedFile] {
        &self.entries
    }

    /// Files that must be compiled, in order
    pub fn to_build(&self) -> impl Iterator<Item = &PlannedFile> {
        self.entries.iter().filter(|e| e.needs_build())
    }

    /// Files that are skipped
    pub fn skipped(&self) -> impl Iterator<Item = &PlannedFile> {
        self.entries.iter().filter(|e| !e.needs_build())
    }

    /// Number of files to compile
    pub fn build_count(&self) -> usize {
        self.to_build().count()
    }
}
