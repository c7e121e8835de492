//! Test case descriptors produced by the script parser
//!
//! A test case is immutable once built and is executed exactly twice, once
//! against each engine build.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the worker reaches the evaluated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Fetch the requested frame directly
    #[default]
    Random,
    /// Fetch and release every preceding frame first
    Sequential,
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("random") {
            Ok(Self::Random)
        } else if s.eq_ignore_ascii_case("sequential") {
            Ok(Self::Sequential)
        } else {
            Err(format!("expected 'Sequential' or 'Random', got '{}'", s))
        }
    }
}

/// Kind of evaluation requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Compare one frame byte for byte
    #[default]
    Correctness,
    /// Compare frames-per-second
    Performance,
}

impl TestKind {
    /// Parse a structured `kind:` value; anything not naming throughput is correctness
    pub fn from_directive(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "fps" | "perf" | "performance" => Self::Performance,
            _ => Self::Correctness,
        }
    }
}

/// One `name=value` script variable binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A fully resolved invocation of one script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Display name used in reports
    pub name: String,
    /// Fixture name, for reporting only
    pub image_name: Option<String>,
    /// Script text with parameters substituted
    pub script_text: String,
    /// Frame evaluated by correctness runs
    pub frame: u32,
    pub access: AccessMode,
    pub kind: TestKind,
    /// Frames timed by throughput runs
    pub frame_count: u32,
    /// Warm-up frames discarded before timing
    pub skip_first: u32,
    pub parameters: Vec<Parameter>,
}

impl TestCase {
    /// Report title: the name, followed by the bound parameters if any
    pub fn title(&self) -> String {
        if self.parameters.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        format!("{}: {}", self.name, params.join(", "))
    }
}
