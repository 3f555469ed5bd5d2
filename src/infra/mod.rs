//! Infrastructure layer
//!
//! Handles all I/O operations: subprocesses, cache persistence and filesystem.
//! This module is the only place where side effects occur.

pub mod cache_store;
pub mod filesystem;
pub mod process;
pub mod toolchain;
