//! Driver side of one isolated execution
//!
//! Each invocation gets a fresh shared memory region and a fresh worker
//! process. Whatever happens to the worker, the driver returns a
//! [`TestResult`]; failures are data, never errors.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::process;
use super::protocol::{StartupEnvelope, TestResult};
use super::shm::SharedRegion;
use super::transport::{self, SlotState};
use crate::common::{paths, Error, Result};
use crate::testing::TestCase;

/// Runs one test case against one engine build
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, engine: &Path, case: &TestCase) -> TestResult;
}

/// Executes test cases in isolated worker processes
#[derive(Debug, Clone)]
pub struct Driver {
    worker: PathBuf,
    region_size: usize,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Driver {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
    pub const DEFAULT_REGION_SIZE: usize = 64 * 1024 * 1024;

    pub fn new(worker: impl Into<PathBuf>) -> Self {
        Self {
            worker: worker.into(),
            region_size: Self::DEFAULT_REGION_SIZE,
            timeout: Self::DEFAULT_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_region_size(mut self, bytes: usize) -> Self {
        self.region_size = bytes;
        self
    }

    /// Kill in-flight workers when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn worker(&self) -> &Path {
        &self.worker
    }

    /// Run `case` against `engine` in a new worker
    pub async fn run(&self, engine: &Path, case: &TestCase) -> TestResult {
        match self.try_run(engine, case).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, engine = %engine.display(), test = %case.title(), "Worker produced no usable result");
                TestResult::from(e)
            }
        }
    }

    async fn try_run(&self, engine: &Path, case: &TestCase) -> Result<TestResult> {
        let mut region = SharedRegion::create(&paths::region_name(), self.region_size)?;
        let envelope = StartupEnvelope {
            engine_path: engine.to_path_buf(),
            test_case: case.clone(),
        };
        transport::write_message(&mut region, SlotState::Startup, &envelope)?;

        let child = Command::new(&self.worker)
            .arg(region.name())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::WorkerSpawn {
                path: self.worker.display().to_string(),
                error: e.to_string(),
            })?;
        let pid = child.id();
        debug!(pid, region = %region.name(), engine = %engine.display(), "Spawned worker");

        let exit = process::wait_for_exit(pid, self.timeout, &self.cancel).await?;
        if !exit.success() {
            warn!(pid, status = %exit.termination, "Worker exited abnormally");
        }

        match transport::read_state(&region)? {
            SlotState::Result => {}
            SlotState::Startup | SlotState::Empty => {
                return Err(Error::NoResult(exit.termination.to_string()));
            }
        }

        let mut result: TestResult = transport::read_message(&region, SlotState::Result)?;
        if let TestResult::Performance(sample) = &mut result {
            sample.peak_memory_bytes = exit.peak_memory_bytes;
        }
        Ok(result)
    }
}

#[async_trait]
impl Executor for Driver {
    async fn execute(&self, engine: &Path, case: &TestCase) -> TestResult {
        self.run(engine, case).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FailureCategory;
    use crate::testing::{AccessMode, TestKind};

    fn case() -> TestCase {
        TestCase {
            name: "noop".into(),
            image_name: None,
            script_text: String::new(),
            frame: 0,
            access: AccessMode::Random,
            kind: TestKind::Correctness,
            frame_count: 0,
            skip_first: 0,
            parameters: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_worker_binary_is_a_failure() {
        let driver = Driver::new("/nonexistent/framecheck-worker");
        let result = driver.run(Path::new("/builds/ref"), &case()).await;
        let TestResult::Failure(failure) = result else {
            panic!("expected a failure");
        };
        assert_eq!(failure.category, FailureCategory::EngineDispatch);
    }

    #[tokio::test]
    async fn test_worker_that_writes_nothing_is_no_result() {
        // `true` ignores its argument and exits cleanly without touching the region
        let driver = Driver::new("true");
        let result = driver.run(Path::new("/builds/ref"), &case()).await;
        let TestResult::Failure(failure) = result else {
            panic!("expected a failure");
        };
        assert_eq!(failure.category, FailureCategory::NoResult);
    }

    #[tokio::test]
    async fn test_region_too_small_for_envelope() {
        let driver = Driver::new("true").with_region_size(32);
        let result = driver.run(Path::new("/builds/ref"), &case()).await;
        assert!(matches!(
            result,
            TestResult::Failure(ref f) if f.category == FailureCategory::Protocol
        ));
    }
}
