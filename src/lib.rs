//! framecheck - differential regression harness for a native video engine
//!
//! This library parses annotated test scripts, executes each test case
//! against two engine builds in isolated worker processes, and compares the
//! captured frames or throughput samples.

#[cfg(not(unix))]
compile_error!("framecheck needs POSIX shared memory and wait4; only Unix targets are supported");

pub mod cli;
pub mod commands;
pub mod common;
pub mod compare;
pub mod engine;
pub mod frame;
pub mod ipc;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use ipc::TestResult;
pub use testing::TestCase;
