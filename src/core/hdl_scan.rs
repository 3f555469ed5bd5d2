//! HDL dependency scanning
//!
//! Extracts provides/requires facts from VHDL text: library clauses, use
//! clauses, package and entity declarations and entity instantiations. This is
//! a header-level scan, not a parser; it only needs to be good enough to order
//! compilation.

use std::collections::BTreeSet;

use regex::Regex;

use crate::config::defaults::{BUILTIN_LIBRARIES, DEFAULT_LIBRARY};
use crate::error::ResolverError;

const LIBRARY_PATTERN: &str = r"\blibrary\s+(\w+(?:\s*,\s*\w+)*)\s*;";
const USE_PATTERN: &str = r"\buse\s+(\w+)\s*\.\s*(\w+)(?:\s*\.\s*\w+)?\s*;";
const PACKAGE_PATTERN: &str = r"\bpackage\s+(\w+)\s+is\b";
const ENTITY_PATTERN: &str = r"\bentity\s+(\w+)\s+is\b";
const INSTANCE_PATTERN: &str =
    r"\b\w+\s*:\s*(entity\s+)?(?:(\w+)\s*\.\s*)?(\w+)\s*(?:\(\s*\w+\s*\)\s*)?(?:generic|port)\s+map\b";

/// Reference to a design unit in a library
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnitRef {
    /// Library name as written, `None` when unqualified
    pub library: Option<String>,
    /// Unit name
    pub unit: String,
}

/// Facts extracted from one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdlFacts {
    /// Libraries named in `library` clauses
    pub libraries: BTreeSet<String>,
    /// Packages referenced by `use` clauses
    pub uses: BTreeSet<UnitRef>,
    /// Packages declared (not package bodies)
    pub packages: BTreeSet<String>,
    /// Entities declared
    pub entities: BTreeSet<String>,
    /// Instantiated units
    pub instances: BTreeSet<UnitRef>,
}

impl HdlFacts {
    /// Libraries this file needs compiled first.
    ///
    /// Built-in libraries, the `work` alias and `own_library` are excluded.
    pub fn required_libraries(&self, own_library: &str) -> BTreeSet<String> {
        let qualified = self
            .uses
            .iter()
            .chain(self.instances.iter())
            .filter_map(|r| r.library.clone());

        self.libraries
            .iter()
            .cloned()
            .chain(qualified)
            .filter(|lib| !is_implicit(lib, own_library))
            .collect()
    }

    /// Units referenced inside `own_library` (via `work` or its own name)
    pub fn local_references(&self, own_library: &str) -> BTreeSet<String> {
        let local = |r: &&UnitRef| match &r.library {
            Some(lib) => lib == DEFAULT_LIBRARY || lib == own_library,
            None => true,
        };
        let used = self
            .uses
            .iter()
            .filter(|r| r.library.is_some())
            .filter(local);
        let instantiated = self.instances.iter().filter(local);
        used.chain(instantiated).map(|r| r.unit.clone()).collect()
    }

    /// Units this file provides
    pub fn provided_units(&self) -> impl Iterator<Item = &String> {
        self.packages.iter().chain(self.entities.iter())
    }
}

fn is_implicit(library: &str, own_library: &str) -> bool {
    library == DEFAULT_LIBRARY || library == own_library || BUILTIN_LIBRARIES.contains(&library)
}

/// Compiled scanner for VHDL sources
#[derive(Debug, Clone)]
pub struct VhdlScanner {
    library: Regex,
    use_clause: Regex,
    package: Regex,
    entity: Regex,
    instance: Regex,
}

impl VhdlScanner {
    /// Compile the scanner patterns
    pub fn new() -> Result<Self, ResolverError> {
        Ok(Self {
            library: compile(LIBRARY_PATTERN)?,
            use_clause: compile(USE_PATTERN)?,
            package: compile(PACKAGE_PATTERN)?,
            entity: compile(ENTITY_PATTERN)?,
            instance: compile(INSTANCE_PATTERN)?,
        })
    }

    /// Scan VHDL source text
    pub fn scan(&self, text: &str) -> HdlFacts {
        let text = strip_comments(text).to_lowercase();
        let mut facts = HdlFacts::default();

        for caps in self.library.captures_iter(&text) {
            for name in caps[1].split(',') {
                facts.libraries.insert(name.trim().to_string());
            }
        }

        for caps in self.use_clause.captures_iter(&text) {
            facts.uses.insert(UnitRef {
                library: Some(caps[1].to_string()),
                unit: caps[2].to_string(),
            });
        }

        for caps in self.package.captures_iter(&text) {
            facts.packages.insert(caps[1].to_string());
        }

        for caps in self.entity.captures_iter(&text) {
            facts.entities.insert(caps[1].to_string());
        }

        for caps in self.instance.captures_iter(&text) {
            let unit = caps[3].to_string();
            // `component foo is` followed by `port map` is not an instance
            if caps.get(1).is_none() && caps.get(2).is_none() && is_keyword(&unit) {
                continue;
            }
            facts.instances.insert(UnitRef {
                library: caps.get(2).map(|m| m.as_str().to_string()),
                unit,
            });
        }

        facts
    }
}

fn compile(pattern: &str) -> Result<Regex, ResolverError> {
    Regex::new(pattern).map_err(|e| ResolverError::InvalidPattern {
        pattern: pattern.to_string(),
        error: e.to_string(),
    })
}

fn is_keyword(word: &str) -> bool {
    matches!(word, "entity" | "component" | "is" | "block" | "process")
}

/// Remove `--` comments up to end of line
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| line.find("--").map_or(line, |idx| &line[..idx]))
        .collect::<Vec<_>>()
        .join("\n")
}
