//! Error types for the regression harness
//!
//! Everything below the run orchestrator is converted into data (a
//! [`Failure`] inside a test result, or a verdict) before it can unwind past
//! a single test case. The one exception is [`Error::Bug`], which marks a
//! defect in the harness itself rather than in the engine under test.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Script Errors ===
    #[error("Invalid directive on line {line}: {reason}")]
    Parsing { line: usize, reason: String },

    // === Engine Errors ===
    #[error("Failed to load engine build '{path}': {reason}")]
    EngineLoad { path: String, reason: String },

    #[error("Engine entry point '{symbol}' is missing: {reason}")]
    EngineDispatch { symbol: String, reason: String },

    #[error("Engine returned error: {0}")]
    EngineEvaluation(String),

    #[error("Cannot fetch frame {index}: {reason}")]
    FrameAccess { index: u32, reason: String },

    // === Worker Errors ===
    #[error("Failed to launch worker '{path}': {error}")]
    WorkerSpawn { path: String, error: String },

    #[error("Worker did not exit within {0:?} and was killed")]
    WorkerTimeout(Duration),

    #[error("Worker was killed because the run was cancelled")]
    WorkerCancelled,

    #[error("Worker exited without writing a result ({0})")]
    NoResult(String),

    #[error("Malformed shared memory envelope: {0}")]
    Protocol(String),

    #[error("Serialized result of {size} bytes exceeds the {capacity} byte region")]
    ResultTooLarge { size: usize, capacity: usize },

    // === Harness Defects ===
    #[error("Harness bug: {0}")]
    Bug(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a parsing error for a 1-based script line
    pub fn parsing(line: usize, reason: impl Into<String>) -> Self {
        Self::Parsing {
            line,
            reason: reason.into(),
        }
    }

    /// Create an engine load error
    pub fn engine_load(path: &str, reason: &str) -> Self {
        Self::EngineLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an engine dispatch error for a missing entry point
    pub fn engine_dispatch(symbol: &str, reason: &str) -> Self {
        Self::EngineDispatch {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a frame access error
    pub fn frame_access(index: u32, reason: &str) -> Self {
        Self::FrameAccess {
            index,
            reason: reason.to_string(),
        }
    }

    /// Whether this error indicates a defect in the harness rather than the engine
    pub fn is_bug(&self) -> bool {
        matches!(self, Error::Bug(_))
    }
}

/// Failure category carried across the process boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Parsing,
    EngineLoad,
    EngineDispatch,
    EngineEvaluation,
    FrameAccess,
    WorkerTimeout,
    WorkerCancelled,
    NoResult,
    Protocol,
    Internal,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Parsing => "ParsingError",
            Self::EngineLoad => "EngineLoadError",
            Self::EngineDispatch => "EngineDispatchError",
            Self::EngineEvaluation => "EngineEvaluationError",
            Self::FrameAccess => "FrameAccessError",
            Self::WorkerTimeout => "WorkerTimeout",
            Self::WorkerCancelled => "WorkerCancelled",
            Self::NoResult => "NoResult",
            Self::Protocol => "ProtocolError",
            Self::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

/// IPC-serializable failure for worker results
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Failure {
    pub category: FailureCategory,
    pub message: String,
}

impl Failure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl From<&Error> for Failure {
    fn from(e: &Error) -> Self {
        let category = match e {
            Error::Parsing { .. } => FailureCategory::Parsing,
            Error::EngineLoad { .. } => FailureCategory::EngineLoad,
            Error::EngineDispatch { .. } | Error::WorkerSpawn { .. } => {
                FailureCategory::EngineDispatch
            }
            Error::EngineEvaluation(_) => FailureCategory::EngineEvaluation,
            Error::FrameAccess { .. } => FailureCategory::FrameAccess,
            Error::WorkerTimeout(_) => FailureCategory::WorkerTimeout,
            Error::WorkerCancelled => FailureCategory::WorkerCancelled,
            Error::NoResult(_) => FailureCategory::NoResult,
            Error::Protocol(_)
            | Error::ResultTooLarge { .. }
            | Error::Encode(_)
            | Error::Decode(_) => FailureCategory::Protocol,
            _ => FailureCategory::Internal,
        };

        Self {
            category,
            message: e.to_string(),
        }
    }
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Self::from(&e)
    }
}
