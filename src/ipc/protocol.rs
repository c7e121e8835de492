//! Messages exchanged with a worker through its shared memory region
//!
//! The driver writes one [`StartupEnvelope`]; the worker overwrites it with
//! one [`TestResult`]. Only [`CapturedFrame`] can appear in a result, so live
//! engine frames cannot cross the process boundary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::common::{Error, Failure, FailureCategory};
use crate::frame::CapturedFrame;
use crate::testing::TestCase;

/// Message handed to a worker at launch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupEnvelope {
    /// Engine build the worker must load
    pub engine_path: PathBuf,
    /// Case to evaluate against it
    pub test_case: TestCase,
}

/// Throughput measurement of one worker run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub fps: f64,
    pub elapsed_ms: u64,
    /// Peak resident memory of the worker process, filled in by the driver
    pub peak_memory_bytes: Option<u64>,
}

/// Outcome of running one test case against one engine build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResultMessage", try_from = "ResultMessage")]
pub enum TestResult {
    Frame(CapturedFrame),
    Performance(PerformanceSample),
    Failure(Failure),
}

impl TestResult {
    pub fn failure(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(category, message))
    }

    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Frame(_) => ResultKind::Frame,
            Self::Performance(_) => ResultKind::Performance,
            Self::Failure(_) => ResultKind::Failure,
        }
    }
}

impl From<Error> for TestResult {
    fn from(e: Error) -> Self {
        Self::Failure(Failure::from(&e))
    }
}

/// Discriminator of a serialized result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Frame,
    Performance,
    Failure,
}

/// Wire form of a [`TestResult`]
///
/// Exactly one payload must be present and it must match `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub kind: ResultKind,
    pub frame: Option<CapturedFrame>,
    pub performance: Option<PerformanceSample>,
    pub failure: Option<Failure>,
}

impl From<TestResult> for ResultMessage {
    fn from(result: TestResult) -> Self {
        let kind = result.kind();
        let mut message = Self {
            kind,
            frame: None,
            performance: None,
            failure: None,
        };
        match result {
            TestResult::Frame(frame) => message.frame = Some(frame),
            TestResult::Performance(sample) => message.performance = Some(sample),
            TestResult::Failure(failure) => message.failure = Some(failure),
        }
        message
    }
}

impl TryFrom<ResultMessage> for TestResult {
    type Error = Error;

    fn try_from(message: ResultMessage) -> Result<Self, Self::Error> {
        match (message.kind, message.frame, message.performance, message.failure) {
            (ResultKind::Frame, Some(frame), None, None) => {
                frame.validate()?;
                Ok(Self::Frame(frame))
            }
            (ResultKind::Performance, None, Some(sample), None) => Ok(Self::Performance(sample)),
            (ResultKind::Failure, None, None, Some(failure)) => Ok(Self::Failure(failure)),
            (kind, frame, performance, failure) => Err(Error::Protocol(format!(
                "result of kind {:?} carries frame={}, performance={}, failure={}",
                kind,
                frame.is_some(),
                performance.is_some(),
                failure.is_some()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AccessMode, Parameter, TestKind};

    fn sample_case() -> TestCase {
        TestCase {
            name: "levels".into(),
            image_name: Some("ramp.png".into()),
            script_text: "a=1\nLevels(0, 1.0, 255, 0, a)\n".into(),
            frame: 12,
            access: AccessMode::Sequential,
            kind: TestKind::Performance,
            frame_count: 200,
            skip_first: 10,
            parameters: vec![Parameter {
                name: "a".into(),
                value: "1".into(),
            }],
        }
    }

    #[test]
    fn test_startup_envelope_round_trip() {
        let envelope = StartupEnvelope {
            engine_path: PathBuf::from("/opt/avs/candidate/libavisynth.so"),
            test_case: sample_case(),
        };
        let bytes = rmp_serde::to_vec(&envelope).unwrap();
        let decoded: StartupEnvelope = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_mismatched_kind_is_rejected() {
        let message = ResultMessage {
            kind: ResultKind::Frame,
            frame: None,
            performance: Some(PerformanceSample {
                fps: 10.0,
                elapsed_ms: 100,
                peak_memory_bytes: None,
            }),
            failure: None,
        };
        let bytes = rmp_serde::to_vec(&message).unwrap();
        let decoded = rmp_serde::from_slice::<TestResult>(&bytes);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_failure_result_round_trip() {
        let result = TestResult::failure(FailureCategory::EngineEvaluation, "Script error");
        let bytes = rmp_serde::to_vec(&result).unwrap();
        let decoded: TestResult = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, result);
    }
}
