//! Worker side of one isolated execution
//!
//! The worker reads its startup envelope, runs the case against the engine
//! build it names and writes exactly one result back. Every engine error is
//! turned into a failure result; only losing the region itself is fatal.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::protocol::{PerformanceSample, StartupEnvelope, TestResult};
use super::shm::SharedRegion;
use super::transport::{self, SlotState};
use crate::common::{Error, Result};
use crate::engine::{Clip, EngineLoader};
use crate::frame::CapturedFrame;
use crate::testing::{AccessMode, TestCase, TestKind};

/// Serve the single request waiting in `region_name`
pub fn serve(region_name: &str, loader: &dyn EngineLoader) -> Result<()> {
    let mut region = SharedRegion::open(region_name)?;

    let result = match transport::read_message::<StartupEnvelope>(&region, SlotState::Startup) {
        Ok(envelope) => {
            info!(
                engine = %envelope.engine_path.display(),
                test = %envelope.test_case.title(),
                "Running test case"
            );
            run_case(loader, &envelope.engine_path, &envelope.test_case)
        }
        Err(e) => {
            warn!(error = %e, "Unreadable startup envelope");
            TestResult::from(e)
        }
    };

    write_result(&mut region, &result)
}

/// Write a result, degrading to a failure when it does not fit
fn write_result(region: &mut SharedRegion, result: &TestResult) -> Result<()> {
    match transport::write_message(region, SlotState::Result, result) {
        Err(e @ Error::ResultTooLarge { .. }) => {
            warn!(error = %e, "Result does not fit the shared memory region");
            transport::write_message(region, SlotState::Result, &TestResult::from(e))
        }
        other => other,
    }
}

/// Evaluate one case against one engine build
pub fn run_case(loader: &dyn EngineLoader, engine: &Path, case: &TestCase) -> TestResult {
    match evaluate(loader, engine, case) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, test = %case.title(), "Test case failed in the engine");
            TestResult::from(e)
        }
    }
}

fn evaluate(loader: &dyn EngineLoader, engine: &Path, case: &TestCase) -> Result<TestResult> {
    let mut environment = loader.load(engine)?;
    let mut clip = environment.evaluate(&case.script_text)?;

    match case.kind {
        TestKind::Correctness => capture_frame(clip.as_mut(), case).map(TestResult::Frame),
        TestKind::Performance => measure_throughput(clip.as_mut(), case).map(TestResult::Performance),
    }
}

fn capture_frame(clip: &mut dyn Clip, case: &TestCase) -> Result<CapturedFrame> {
    let info = clip.info();
    if case.frame >= info.frame_count {
        return Err(Error::frame_access(
            case.frame,
            &format!("clip has {} frames", info.frame_count),
        ));
    }

    if case.access == AccessMode::Sequential {
        for index in 0..case.frame {
            drop(clip.get_frame(index)?);
        }
    }

    let frame = clip.get_frame(case.frame)?;
    CapturedFrame::capture(frame.as_ref())
}

fn measure_throughput(clip: &mut dyn Clip, case: &TestCase) -> Result<PerformanceSample> {
    if case.frame_count == 0 {
        return Err(Error::Config(
            "throughput test case requests zero timed frames".to_string(),
        ));
    }

    for index in 0..case.skip_first {
        drop(clip.get_frame(index)?);
    }

    // The warm-up only primes caches; timing restarts at frame 0
    let start = Instant::now();
    for index in 0..case.frame_count {
        drop(clip.get_frame(index)?);
        if (index + 1) % 100 == 0 {
            debug!(frames = index + 1, total = case.frame_count, "Throughput progress");
        }
    }
    let elapsed = start.elapsed();

    let fps = f64::from(case.frame_count) / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(fps, elapsed_ms = elapsed.as_millis() as u64, "Throughput measured");

    Ok(PerformanceSample {
        fps,
        elapsed_ms: elapsed.as_millis() as u64,
        peak_memory_bytes: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FailureCategory;
    use crate::engine::{ClipInfo, ScriptEnvironment};
    use crate::frame::{Colorspace, Frame, Plane};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every frame fetch
    struct FakeLoader {
        fetched: Rc<RefCell<Vec<u32>>>,
        frames: u32,
    }

    struct FakeEnvironment {
        fetched: Rc<RefCell<Vec<u32>>>,
        frames: u32,
    }

    struct FakeClip {
        fetched: Rc<RefCell<Vec<u32>>>,
        frames: u32,
    }

    struct FakeFrame {
        value: u8,
    }

    impl EngineLoader for FakeLoader {
        fn load(&self, path: &Path) -> Result<Box<dyn ScriptEnvironment>> {
            if path.ends_with("missing") {
                return Err(Error::engine_load("missing", "not found"));
            }
            Ok(Box::new(FakeEnvironment {
                fetched: self.fetched.clone(),
                frames: self.frames,
            }))
        }
    }

    impl ScriptEnvironment for FakeEnvironment {
        fn evaluate(&mut self, script: &str) -> Result<Box<dyn Clip + '_>> {
            if script.contains("Error") {
                return Err(Error::EngineEvaluation("Script error: syntax".into()));
            }
            Ok(Box::new(FakeClip {
                fetched: self.fetched.clone(),
                frames: self.frames,
            }))
        }
    }

    impl Clip for FakeClip {
        fn info(&self) -> ClipInfo {
            ClipInfo {
                width: 4,
                height: 2,
                frame_count: self.frames,
                colorspace: Colorspace::Y8,
            }
        }

        fn get_frame(&mut self, index: u32) -> Result<Box<dyn Frame + '_>> {
            if index >= self.frames {
                return Err(Error::frame_access(index, "out of range"));
            }
            self.fetched.borrow_mut().push(index);
            Ok(Box::new(FakeFrame { value: index as u8 }))
        }
    }

    impl Frame for FakeFrame {
        fn colorspace(&self) -> Colorspace {
            Colorspace::Y8
        }
        fn width(&self, plane: Plane) -> usize {
            if plane == Plane::Y { 4 } else { 0 }
        }
        fn height(&self, plane: Plane) -> usize {
            if plane == Plane::Y { 2 } else { 0 }
        }
        fn stride(&self, plane: Plane) -> usize {
            if plane == Plane::Y { 4 } else { 0 }
        }
        fn plane_data(&self, plane: Plane) -> &[u8] {
            static DATA: [[u8; 8]; 8] = [[0; 8], [1; 8], [2; 8], [3; 8], [4; 8], [5; 8], [6; 8], [7; 8]];
            if plane == Plane::Y {
                &DATA[self.value as usize % 8]
            } else {
                &[]
            }
        }
    }

    fn loader(frames: u32) -> (FakeLoader, Rc<RefCell<Vec<u32>>>) {
        let fetched = Rc::new(RefCell::new(Vec::new()));
        (
            FakeLoader {
                fetched: fetched.clone(),
                frames,
            },
            fetched,
        )
    }

    fn case(frame: u32, access: AccessMode) -> TestCase {
        TestCase {
            name: "blur".into(),
            image_name: None,
            script_text: "Blur(1.0)".into(),
            frame,
            access,
            kind: TestKind::Correctness,
            frame_count: 0,
            skip_first: 0,
            parameters: Vec::new(),
        }
    }

    #[test]
    fn test_random_access_fetches_only_requested_frame() {
        let (loader, fetched) = loader(10);
        let result = run_case(&loader, Path::new("/builds/ref"), &case(5, AccessMode::Random));
        assert!(matches!(result, TestResult::Frame(_)));
        assert_eq!(*fetched.borrow(), vec![5]);
    }

    #[test]
    fn test_sequential_access_walks_preceding_frames() {
        let (loader, fetched) = loader(10);
        let result = run_case(&loader, Path::new("/builds/ref"), &case(3, AccessMode::Sequential));
        let TestResult::Frame(frame) = result else {
            panic!("expected a frame");
        };
        assert_eq!(*fetched.borrow(), vec![0, 1, 2, 3]);
        assert_eq!(frame.plane_data(Plane::Y), &[3; 8]);
    }

    #[test]
    fn test_out_of_range_frame_is_frame_access_failure() {
        let (loader, _) = loader(10);
        let result = run_case(&loader, Path::new("/builds/ref"), &case(10, AccessMode::Random));
        let TestResult::Failure(failure) = result else {
            panic!("expected a failure");
        };
        assert_eq!(failure.category, FailureCategory::FrameAccess);
    }

    #[test]
    fn test_engine_errors_become_failures() {
        let (loader, _) = loader(10);
        let result = run_case(&loader, Path::new("/builds/missing"), &case(0, AccessMode::Random));
        assert!(matches!(
            result,
            TestResult::Failure(ref f) if f.category == FailureCategory::EngineLoad
        ));

        let mut bad = case(0, AccessMode::Random);
        bad.script_text = "Error(\"boom\")".into();
        let result = run_case(&loader, Path::new("/builds/ref"), &bad);
        assert!(matches!(
            result,
            TestResult::Failure(ref f) if f.category == FailureCategory::EngineEvaluation
        ));
    }

    #[test]
    fn test_throughput_skips_then_times_frames() {
        let (loader, fetched) = loader(100);
        let mut perf = case(0, AccessMode::Random);
        perf.kind = TestKind::Performance;
        perf.frame_count = 5;
        perf.skip_first = 2;

        let result = run_case(&loader, Path::new("/builds/ref"), &perf);
        let TestResult::Performance(sample) = result else {
            panic!("expected a performance sample");
        };
        assert!(sample.fps > 0.0);
        assert_eq!(sample.peak_memory_bytes, None);
        assert_eq!(*fetched.borrow(), vec![0, 1, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_throughput_over_whole_clip_after_warm_up() {
        let (loader, fetched) = loader(200);
        let mut perf = case(0, AccessMode::Random);
        perf.kind = TestKind::Performance;
        perf.frame_count = 200;
        perf.skip_first = 10;

        let result = run_case(&loader, Path::new("/builds/ref"), &perf);
        assert!(matches!(result, TestResult::Performance(_)), "{:?}", result.kind());
        let fetched = fetched.borrow();
        assert_eq!(fetched.len(), 210);
        assert_eq!(fetched.iter().max(), Some(&199));
        assert_eq!(fetched[10], 0);
    }

    #[test]
    fn test_throughput_with_zero_frames_fails() {
        let (loader, _) = loader(100);
        let mut perf = case(0, AccessMode::Random);
        perf.kind = TestKind::Performance;
        let result = run_case(&loader, Path::new("/builds/ref"), &perf);
        assert!(matches!(result, TestResult::Failure(_)));
    }
}
