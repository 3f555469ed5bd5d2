//! Core business logic module
//!
//! Process and cache I/O is delegated to [`crate::infra`]; the resolver and
//! cache only read source files to scan and fingerprint them.
//!
//! # Submodules
//!
//! - [`catalog`] - Source files, libraries, generics and constraints
//! - [`hdl_scan`] - VHDL provides/requires extraction
//! - [`resolver`] - Dependency graph and compile order
//! - [`plan`] - Build plans and cache decisions
//! - [`cache`] - Incremental build cache
//! - [`classify`] - Severity rules over tool output
//! - [`tool`] - Backend capability interface and adapter
//! - [`backend`] - Declarative command backend
//! - [`builder`] - Operation orchestration
//! - [`archive`] - Output bundles

pub mod archive;
pub mod backend;
pub mod builder;
pub mod cache;
pub mod catalog;
pub mod classify;
pub mod hdl_scan;
pub mod plan;
pub mod resolver;
pub mod tool;
