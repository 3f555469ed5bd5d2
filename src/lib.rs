//! hdlbuild - Dependency-aware build and verification engine for HDL projects
//!
//! This library orders HDL sources by their library/package dependencies,
//! skips files that have not changed since the last successful compile, and
//! drives external simulation and synthesis tools against the result.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`core`] - Catalog, dependency resolution, caching, tool interface and orchestration
//! - [`infra`] - Infrastructure layer (subprocesses, cache persistence, filesystem)
//! - [`config`] - Settings and constants
//! - [`error`] - Error types and handling
//! - [`logging`] - Subscriber setup for front ends

pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod logging;

#[cfg(test)]
pub mod test_utils;
