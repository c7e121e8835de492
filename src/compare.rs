//! Comparison of candidate and reference results
//!
//! Rules are applied in a fixed order and the first that decides wins:
//! a failure on either side, colorspace, plane dimensions, pixel content.
//! Throughput results are compared against a relative drop threshold.
//! Geometry is checked before any pixel byte is read.

use serde::Serialize;
use std::fmt;

use crate::common::{Error, Failure, Result};
use crate::frame::{required_len, Colorspace, Frame, Plane};
use crate::ipc::protocol::{PerformanceSample, TestResult};

/// Default tolerated throughput drop, in percent
pub const DEFAULT_MAX_FPS_DROP_PERCENT: f64 = 5.0;

/// Which engine build a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Candidate,
    Reference,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidate => f.write_str("candidate"),
            Self::Reference => f.write_str("reference"),
        }
    }
}

/// Pixel statistics for one plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneDiff {
    pub plane: Plane,
    /// Sum of absolute differences over the visible area
    pub sad: i64,
    pub max_deviation: i64,
}

/// Geometry of one plane, for dimension mismatch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneShape {
    pub plane: Plane,
    pub width: usize,
    pub height: usize,
}

impl fmt::Display for PlaneShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}x{}", self.plane, self.width, self.height)
    }
}

/// Throughput comparison of two performance samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputDiff {
    pub candidate_fps: f64,
    pub reference_fps: f64,
    /// Positive when the candidate is slower
    pub change_percent: f64,
    pub max_drop_percent: f64,
    pub candidate_peak_memory: Option<u64>,
    pub reference_peak_memory: Option<u64>,
}

impl ThroughputDiff {
    pub fn passed(&self) -> bool {
        self.change_percent < self.max_drop_percent
    }

    /// "drop" for a slower candidate, "improvement" for a faster one
    pub fn label(&self) -> &'static str {
        if !self.change_percent.is_finite() {
            "not comparable"
        } else if self.change_percent > 0.0 {
            "drop"
        } else {
            "improvement"
        }
    }
}

/// Outcome of comparing one test case's two results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Identical { planes: Vec<PlaneDiff> },
    PixelMismatch { planes: Vec<PlaneDiff> },
    DimensionMismatch {
        candidate: Vec<PlaneShape>,
        reference: Vec<PlaneShape>,
    },
    ColorspaceMismatch {
        candidate: Colorspace,
        reference: Colorspace,
    },
    Throughput(ThroughputDiff),
    Failed { side: Side, failure: Failure },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        match self {
            Self::Identical { .. } => true,
            Self::Throughput(diff) => diff.passed(),
            _ => false,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical { .. } => f.write_str("Passed. Frames are identical"),
            Self::PixelMismatch { planes } => {
                f.write_str("Failed. Frames differ")?;
                for diff in planes.iter().filter(|d| d.sad != 0) {
                    write!(
                        f,
                        "; {}: SAD {}, max deviation {}",
                        diff.plane, diff.sad, diff.max_deviation
                    )?;
                }
                Ok(())
            }
            Self::DimensionMismatch {
                candidate,
                reference,
            } => write!(
                f,
                "Failed. Frame dimensions don't match (candidate {}, reference {})",
                join_shapes(candidate),
                join_shapes(reference)
            ),
            Self::ColorspaceMismatch {
                candidate,
                reference,
            } => write!(
                f,
                "Failed. Colorspace doesn't match (candidate {}, reference {})",
                candidate, reference
            ),
            Self::Throughput(diff) if !diff.change_percent.is_finite() => write!(
                f,
                "Failed. Candidate {:.2} fps, reference {:.2} fps: {}",
                diff.candidate_fps,
                diff.reference_fps,
                diff.label()
            ),
            Self::Throughput(diff) => write!(
                f,
                "{}. Candidate {:.2} fps, reference {:.2} fps: {:.2}% {}",
                if diff.passed() { "Passed" } else { "Failed" },
                diff.candidate_fps,
                diff.reference_fps,
                diff.change_percent.abs(),
                diff.label()
            ),
            Self::Failed { side, failure } => write!(f, "Failed. {} build: {}", side, failure),
        }
    }
}

fn join_shapes(shapes: &[PlaneShape]) -> String {
    shapes
        .iter()
        .map(PlaneShape::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compare two results of the same test case
///
/// Returns [`Error::Bug`] when the results are of different kinds or a
/// frame buffer is shorter than its geometry claims; neither can come from
/// a correctly working worker.
pub fn compare(
    candidate: &TestResult,
    reference: &TestResult,
    max_fps_drop_percent: f64,
) -> Result<Verdict> {
    match (candidate, reference) {
        (TestResult::Failure(failure), _) => Ok(Verdict::Failed {
            side: Side::Candidate,
            failure: failure.clone(),
        }),
        (_, TestResult::Failure(failure)) => Ok(Verdict::Failed {
            side: Side::Reference,
            failure: failure.clone(),
        }),
        (TestResult::Frame(a), TestResult::Frame(b)) => compare_frames(a, b),
        (TestResult::Performance(a), TestResult::Performance(b)) => {
            Ok(Verdict::Throughput(compare_throughput(a, b, max_fps_drop_percent)))
        }
        (a, b) => Err(Error::Bug(format!(
            "cannot compare a {:?} result with a {:?} result",
            a.kind(),
            b.kind()
        ))),
    }
}

/// Compare two frames by colorspace, geometry and then content
pub fn compare_frames(candidate: &dyn Frame, reference: &dyn Frame) -> Result<Verdict> {
    if !candidate.colorspace_matches(reference) {
        return Ok(Verdict::ColorspaceMismatch {
            candidate: candidate.colorspace(),
            reference: reference.colorspace(),
        });
    }
    if !candidate.dimensions_match(reference) {
        return Ok(Verdict::DimensionMismatch {
            candidate: shapes(candidate),
            reference: shapes(reference),
        });
    }

    let planes = diff_planes(candidate, reference)?;
    if planes.iter().all(|d| d.sad == 0) {
        Ok(Verdict::Identical { planes })
    } else {
        Ok(Verdict::PixelMismatch { planes })
    }
}

fn shapes(frame: &dyn Frame) -> Vec<PlaneShape> {
    frame
        .colorspace()
        .planes()
        .iter()
        .map(|&plane| PlaneShape {
            plane,
            width: frame.width(plane),
            height: frame.height(plane),
        })
        .collect()
}

/// Per-plane statistics of two frames with matching colorspace and geometry
pub fn diff_planes(a: &dyn Frame, b: &dyn Frame) -> Result<Vec<PlaneDiff>> {
    if !a.colorspace_matches(b) {
        return Err(Error::Bug(format!(
            "diffing frames of colorspace {} and {}",
            a.colorspace(),
            b.colorspace()
        )));
    }
    if !a.dimensions_match(b) {
        return Err(Error::Bug("diffing frames of different dimensions".to_string()));
    }

    let colorspace = a.colorspace();
    Plane::ALL
        .iter()
        .filter(|&&plane| colorspace.has_plane(plane))
        .filter(|&&plane| plane == Plane::Y || a.stride(plane) != 0)
        .map(|&plane| diff_plane(a, b, plane))
        .collect()
}

fn diff_plane(a: &dyn Frame, b: &dyn Frame, plane: Plane) -> Result<PlaneDiff> {
    let (width, height) = (a.width(plane), a.height(plane));
    let (stride_a, stride_b) = (a.stride(plane), b.stride(plane));
    let (data_a, data_b) = (a.plane_data(plane), b.plane_data(plane));

    if data_a.len() < required_len(width, height, stride_a)
        || data_b.len() < required_len(width, height, stride_b)
    {
        return Err(Error::Bug(format!(
            "plane {} buffer shorter than {}x{} geometry",
            plane, width, height
        )));
    }

    let mut sad = 0i64;
    let mut max_deviation = 0i64;
    if width > 0 {
        for row in 0..height {
            let row_a = &data_a[row * stride_a..row * stride_a + width];
            let row_b = &data_b[row * stride_b..row * stride_b + width];
            for (&pa, &pb) in row_a.iter().zip(row_b) {
                let deviation = (i64::from(pa) - i64::from(pb)).abs();
                sad += deviation;
                max_deviation = max_deviation.max(deviation);
            }
        }
    }

    Ok(PlaneDiff {
        plane,
        sad,
        max_deviation,
    })
}

/// Relative throughput change of the candidate against the reference
pub fn compare_throughput(
    candidate: &PerformanceSample,
    reference: &PerformanceSample,
    max_drop_percent: f64,
) -> ThroughputDiff {
    // A non-positive reference makes the change NaN, which never passes
    let change_percent = if reference.fps > 0.0 {
        (reference.fps - candidate.fps) / reference.fps * 100.0
    } else {
        f64::NAN
    };

    ThroughputDiff {
        candidate_fps: candidate.fps,
        reference_fps: reference.fps,
        change_percent,
        max_drop_percent,
        candidate_peak_memory: candidate.peak_memory_bytes,
        reference_peak_memory: reference.peak_memory_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FailureCategory;
    use crate::frame::{CapturedFrame, PlaneBuffer};

    fn plane(width: usize, height: usize, stride: usize, value: u8) -> PlaneBuffer {
        PlaneBuffer::new(width, height, stride, vec![value; stride * height])
    }

    fn yv12(width: usize, height: usize, stride: usize, value: u8) -> CapturedFrame {
        CapturedFrame::from_planes(
            Colorspace::YV12,
            plane(width, height, stride, value),
            Some((
                plane(width / 2, height / 2, stride / 2, value),
                plane(width / 2, height / 2, stride / 2, value),
            )),
        )
        .unwrap()
    }

    fn sample(fps: f64) -> TestResult {
        TestResult::Performance(PerformanceSample {
            fps,
            elapsed_ms: 1000,
            peak_memory_bytes: Some(1 << 20),
        })
    }

    #[test]
    fn test_identical_frames_with_different_strides_pass() {
        let a = TestResult::Frame(yv12(16, 8, 16, 100));
        let b = TestResult::Frame(yv12(16, 8, 32, 100));
        let verdict = compare(&a, &b, 5.0).unwrap();
        assert!(verdict.passed());
        let Verdict::Identical { planes } = verdict else {
            panic!("expected identical");
        };
        assert_eq!(planes.len(), 3);
    }

    #[test]
    fn test_padding_bytes_are_ignored() {
        let mut luma = vec![7u8; 32 * 8];
        for row in 0..8 {
            for byte in &mut luma[row * 32 + 16..row * 32 + 32] {
                *byte = 255;
            }
        }
        let padded = CapturedFrame::from_planes(
            Colorspace::Y8,
            PlaneBuffer::new(16, 8, 32, luma),
            None,
        )
        .unwrap();
        let tight =
            CapturedFrame::from_planes(Colorspace::Y8, plane(16, 8, 16, 7), None).unwrap();
        assert!(compare_frames(&padded, &tight).unwrap().passed());
    }

    #[test]
    fn test_sad_and_max_deviation() {
        let a = yv12(16, 8, 16, 100);
        let mut luma = vec![100u8; 16 * 8];
        luma[0] = 103;
        luma[17] = 90;
        let b = CapturedFrame::from_planes(
            Colorspace::YV12,
            PlaneBuffer::new(16, 8, 16, luma),
            Some((plane(8, 4, 8, 100), plane(8, 4, 8, 100))),
        )
        .unwrap();

        let verdict = compare_frames(&a, &b).unwrap();
        let Verdict::PixelMismatch { planes } = &verdict else {
            panic!("expected pixel mismatch");
        };
        assert_eq!(
            planes[0],
            PlaneDiff {
                plane: Plane::Y,
                sad: 13,
                max_deviation: 10
            }
        );
        for untouched in &planes[1..] {
            assert_eq!((untouched.sad, untouched.max_deviation), (0, 0), "{}", untouched.plane);
        }
        assert_eq!(
            verdict.to_string(),
            "Failed. Frames differ; Y: SAD 13, max deviation 10"
        );
    }

    #[test]
    fn test_single_chroma_byte_difference_with_padded_stride() {
        let reference = yv12(16, 8, 16, 100);

        // U plane is 8x4 with stride 24; change row 2, column 5
        let mut u = vec![0xEEu8; 24 * 4];
        for row in 0..4 {
            for byte in &mut u[row * 24..row * 24 + 8] {
                *byte = 100;
            }
        }
        u[2 * 24 + 5] = 93;
        let candidate = CapturedFrame::from_planes(
            Colorspace::YV12,
            plane(16, 8, 48, 100),
            Some((PlaneBuffer::new(8, 4, 24, u), plane(8, 4, 24, 100))),
        )
        .unwrap();

        let verdict = compare_frames(&candidate, &reference).unwrap();
        let Verdict::PixelMismatch { planes } = &verdict else {
            panic!("expected pixel mismatch, got {}", verdict);
        };
        let by_plane = |p: Plane| {
            let diff = planes.iter().find(|d| d.plane == p).unwrap();
            (diff.sad, diff.max_deviation)
        };
        assert_eq!(by_plane(Plane::U), (7, 7));
        assert_eq!(by_plane(Plane::Y), (0, 0));
        assert_eq!(by_plane(Plane::V), (0, 0));
        assert_eq!(
            verdict.to_string(),
            "Failed. Frames differ; U: SAD 7, max deviation 7"
        );
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let a = yv12(16, 8, 16, 10);
        let b = yv12(16, 8, 32, 30);
        let forward = diff_planes(&a, &b).unwrap();
        let backward = diff_planes(&b, &a).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward[0].sad, 20 * 16 * 8);
    }

    #[test]
    fn test_colorspace_mismatch_wins_over_dimensions() {
        let a = yv12(16, 8, 16, 0);
        let b = CapturedFrame::from_planes(
            Colorspace::I420,
            plane(32, 8, 32, 0),
            Some((plane(16, 4, 16, 0), plane(16, 4, 16, 0))),
        )
        .unwrap();
        let verdict = compare_frames(&a, &b).unwrap();
        assert_eq!(
            verdict,
            Verdict::ColorspaceMismatch {
                candidate: Colorspace::YV12,
                reference: Colorspace::I420,
            }
        );
        assert!(!verdict.passed());
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = yv12(16, 8, 16, 0);
        let b = yv12(32, 8, 32, 0);
        let verdict = compare_frames(&a, &b).unwrap();
        assert!(matches!(verdict, Verdict::DimensionMismatch { .. }));
        assert!(verdict.to_string().contains("Y 16x8"));
    }

    #[test]
    fn test_candidate_failure_reported_first() {
        let a = TestResult::failure(FailureCategory::EngineEvaluation, "Script error");
        let b = TestResult::failure(FailureCategory::NoResult, "crashed");
        let verdict = compare(&a, &b, 5.0).unwrap();
        let Verdict::Failed { side, failure } = &verdict else {
            panic!("expected failure verdict");
        };
        assert_eq!(*side, Side::Candidate);
        assert_eq!(failure.category, FailureCategory::EngineEvaluation);
        assert!(!verdict.passed());
    }

    #[test]
    fn test_reference_failure() {
        let a = TestResult::Frame(yv12(16, 8, 16, 0));
        let b = TestResult::failure(FailureCategory::EngineLoad, "missing");
        assert!(matches!(
            compare(&a, &b, 5.0).unwrap(),
            Verdict::Failed {
                side: Side::Reference,
                ..
            }
        ));
    }

    #[test]
    fn test_mixed_kinds_are_a_bug() {
        let a = TestResult::Frame(yv12(16, 8, 16, 0));
        let err = compare(&a, &sample(10.0), 5.0).unwrap_err();
        assert!(err.is_bug());
    }

    #[test]
    fn test_throughput_threshold() {
        let drop_of_4 = compare(&sample(96.0), &sample(100.0), 5.0).unwrap();
        assert!(drop_of_4.passed());
        assert_eq!(
            drop_of_4.to_string(),
            "Passed. Candidate 96.00 fps, reference 100.00 fps: 4.00% drop"
        );

        let drop_of_6 = compare(&sample(94.0), &sample(100.0), 5.0).unwrap();
        assert!(!drop_of_6.passed());

        let faster = compare(&sample(120.0), &sample(100.0), 5.0).unwrap();
        assert!(faster.passed());
        assert!(faster.to_string().ends_with("20.00% improvement"));
    }

    #[test]
    fn test_drop_exactly_at_threshold_fails() {
        let verdict = compare(&sample(95.0), &sample(100.0), 5.0).unwrap();
        assert!(!verdict.passed());
    }

    #[test]
    fn test_zero_reference_fps_fails() {
        let verdict = compare(&sample(10.0), &sample(0.0), 5.0).unwrap();
        assert!(!verdict.passed());
        assert_eq!(
            verdict.to_string(),
            "Failed. Candidate 10.00 fps, reference 0.00 fps: not comparable"
        );
        let Verdict::Throughput(diff) = verdict else {
            panic!("expected throughput verdict");
        };
        assert_eq!(diff.label(), "not comparable");
    }

    #[test]
    fn test_peak_memory_is_carried() {
        let Verdict::Throughput(diff) = compare(&sample(50.0), &sample(50.0), 5.0).unwrap() else {
            panic!("expected throughput verdict");
        };
        assert_eq!(diff.candidate_peak_memory, Some(1 << 20));
        assert!(diff.passed());
    }
}
