//! Test definitions and run orchestration
//!
//! Scripts are parsed into test cases, each of which the [`Runner`] executes
//! against the candidate and the reference build and compares.

mod case;
pub mod report;
mod runner;
pub mod script;

pub use case::{AccessMode, Parameter, TestCase, TestKind};
pub use report::{ConsoleReporter, MemoryReporter, ReportEvent, Reporter, Summary};
pub use runner::{load_scripts, CaseReport, RunOptions, RunReport, Runner, ScriptFilter};
pub use script::Script;
