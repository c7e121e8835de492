//! Common utilities shared between the orchestrator and the worker

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Failure, FailureCategory, Result};
