//! Run orchestration
//!
//! Loads scripts, runs every test case against both engine builds through an
//! [`Executor`], compares the results and accumulates totals. A failing case
//! never aborts the run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::case::{TestCase, TestKind};
use super::report::{Reporter, Summary};
use super::script::{self, Script};
use crate::common::Result;
use crate::compare::{self, Verdict, DEFAULT_MAX_FPS_DROP_PERCENT};
use crate::ipc::{Executor, TestResult};

/// Which scripts take part in a run, by display name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScriptFilter {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl ScriptFilter {
    /// Build a filter from CLI lists; names compare case-insensitively
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        if !include.is_empty() {
            Self::Include(include)
        } else if !exclude.is_empty() {
            Self::Exclude(exclude)
        } else {
            Self::All
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        let listed = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(name));
        match self {
            Self::All => true,
            Self::Include(names) => listed(names),
            Self::Exclude(names) => !listed(names),
        }
    }
}

/// Discover and parse every script under `dir`
///
/// Scripts that fail to parse are reported as warnings and skipped.
pub fn load_scripts(
    dir: &Path,
    extension: &str,
    filter: &ScriptFilter,
    reporter: &mut dyn Reporter,
) -> Result<Vec<Script>> {
    let mut scripts = Vec::new();
    for path in script::discover(dir, extension)? {
        match Script::from_path(&path) {
            Ok(script) if filter.accepts(script.name()) => scripts.push(script),
            Ok(script) => {
                tracing::debug!(script = script.name(), "Filtered out");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping script");
                reporter.warn(&format!("Error parsing script {}: {}", path.display(), e));
            }
        }
    }
    Ok(scripts)
}

/// Settings for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub candidate: PathBuf,
    pub reference: PathBuf,
    pub max_fps_drop_percent: f64,
    /// Run both builds of a case at the same time
    pub concurrent_builds: bool,
}

impl RunOptions {
    pub fn new(candidate: impl Into<PathBuf>, reference: impl Into<PathBuf>) -> Self {
        Self {
            candidate: candidate.into(),
            reference: reference.into(),
            max_fps_drop_percent: DEFAULT_MAX_FPS_DROP_PERCENT,
            concurrent_builds: false,
        }
    }
}

/// Outcome of one test case, as written to the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub title: String,
    pub name: String,
    pub image_name: Option<String>,
    pub kind: TestKind,
    pub passed: bool,
    /// Absent when the harness itself failed to compare the results
    pub verdict: Option<Verdict>,
    pub message: String,
}

/// Everything a run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub summary: Summary,
    pub cases: Vec<CaseReport>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Drives every test case of a run
pub struct Runner<'a> {
    executor: &'a dyn Executor,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<'a> Runner<'a> {
    pub fn new(executor: &'a dyn Executor, options: RunOptions) -> Self {
        Self {
            executor,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new cases once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, scripts: &[Script], reporter: &mut dyn Reporter) -> RunReport {
        let mut report = RunReport::default();

        'scripts: for script in scripts {
            for case in script.test_cases() {
                if self.cancel.is_cancelled() {
                    reporter.warn("Run cancelled, remaining test cases skipped");
                    report.cancelled = true;
                    break 'scripts;
                }

                let outcome = self.run_case(&case, reporter).await;
                report.summary.total += 1;
                if outcome.passed {
                    report.summary.passed += 1;
                } else {
                    report.summary.failed += 1;
                }
                report.cases.push(outcome);
            }
        }

        tracing::info!(
            total = report.summary.total,
            passed = report.summary.passed,
            failed = report.summary.failed,
            "Run finished"
        );
        reporter.summary(&report.summary);
        report
    }

    async fn run_case(&self, case: &TestCase, reporter: &mut dyn Reporter) -> CaseReport {
        let title = case.title();
        reporter.test_started(&title);
        if let Some(image) = &case.image_name {
            reporter.info(&format!("Image: {}", image));
        }

        let (candidate, reference) = self.execute_both(case).await;

        let (verdict, passed, message) =
            match compare::compare(&candidate, &reference, self.options.max_fps_drop_percent) {
                Ok(verdict) => {
                    let message = verdict.to_string();
                    let passed = verdict.passed();
                    if passed {
                        reporter.pass(&message);
                    } else {
                        reporter.fail(&message);
                    }
                    (Some(verdict), passed, message)
                }
                Err(e) => {
                    let message = if e.is_bug() {
                        tracing::error!(error = %e, test = %title, "Harness defect while comparing results");
                        format!("Harness defect: {}", e)
                    } else {
                        tracing::error!(error = %e, test = %title, "Comparison failed");
                        format!("Comparison failed: {}", e)
                    };
                    reporter.fail(&message);
                    (None, false, message)
                }
            };

        CaseReport {
            title,
            name: case.name.clone(),
            image_name: case.image_name.clone(),
            kind: case.kind,
            passed,
            verdict,
            message,
        }
    }

    async fn execute_both(&self, case: &TestCase) -> (TestResult, TestResult) {
        let candidate = self.executor.execute(&self.options.candidate, case);
        let reference = self.executor.execute(&self.options.reference, case);
        if self.options.concurrent_builds {
            tokio::join!(candidate, reference)
        } else {
            (candidate.await, reference.await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FailureCategory;
    use crate::frame::{CapturedFrame, Colorspace, PlaneBuffer};
    use crate::ipc::PerformanceSample;
    use crate::testing::report::MemoryReporter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers from the script text: `value=N` renders a Y8 frame filled with N,
    /// `fail` fails, `fps` returns a sample. The candidate build adds `bias`.
    struct FakeExecutor {
        bias: u8,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl FakeExecutor {
        fn new(bias: u8) -> Self {
            Self {
                bias,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(&self, engine: &Path, case: &TestCase) -> TestResult {
            self.calls.lock().unwrap().push(engine.to_path_buf());
            let bias = if engine.ends_with("candidate") { self.bias } else { 0 };

            if case.script_text.contains("fail") {
                return TestResult::failure(FailureCategory::EngineEvaluation, "Script error");
            }
            let mixed = case.script_text.contains("mixed") && engine.ends_with("candidate");
            if case.kind == TestKind::Performance || mixed {
                return TestResult::Performance(PerformanceSample {
                    fps: 100.0 - f64::from(bias),
                    elapsed_ms: 10,
                    peak_memory_bytes: None,
                });
            }
            let value = case
                .script_text
                .lines()
                .find_map(|l| l.strip_prefix("value="))
                .and_then(|v| v.trim().parse::<u8>().ok())
                .unwrap_or(0);
            let luma = PlaneBuffer::new(4, 2, 4, vec![value.wrapping_add(bias); 8]);
            TestResult::Frame(CapturedFrame::from_planes(Colorspace::Y8, luma, None).unwrap())
        }
    }

    fn script(name: &str, text: &str) -> Script {
        Script::parse(name, text).unwrap()
    }

    fn options() -> RunOptions {
        RunOptions::new("/builds/candidate", "/builds/reference")
    }

    #[tokio::test]
    async fn test_counts_passes_and_failures() {
        let executor = FakeExecutor::new(0);
        let scripts = vec![
            script("ok", "# test case: value=1\n# test case: value=2\nvalue=0\n"),
            script("broken", "fail\n"),
        ];
        let mut reporter = MemoryReporter::new();
        let report = Runner::new(&executor, options())
            .run(&scripts, &mut reporter)
            .await;

        assert_eq!(
            report.summary,
            Summary {
                total: 3,
                passed: 2,
                failed: 1
            }
        );
        assert_eq!(reporter.last_summary(), Some(report.summary));
        assert_eq!(
            reporter.started().collect::<Vec<_>>(),
            vec!["ok: value=1", "ok: value=2", "broken"]
        );
        assert_eq!(executor.calls.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_candidate_difference_fails() {
        let executor = FakeExecutor::new(3);
        let scripts = vec![script("levels", "value=10\n")];
        let mut reporter = MemoryReporter::new();
        let report = Runner::new(&executor, options())
            .run(&scripts, &mut reporter)
            .await;

        assert_eq!(report.summary.failed, 1);
        let failure = reporter.failures().next().unwrap().to_string();
        assert!(failure.contains("SAD 24"), "{}", failure);
    }

    #[tokio::test]
    async fn test_concurrent_builds_give_same_outcome() {
        let executor = FakeExecutor::new(0);
        let scripts = vec![script("perf", "# test case: {{kind: fps; frames: 10}}\n")];
        let mut reporter = MemoryReporter::new();
        let mut opts = options();
        opts.concurrent_builds = true;
        let report = Runner::new(&executor, opts).run(&scripts, &mut reporter).await;
        assert_eq!(report.summary.passed, 1);
        assert!(matches!(report.cases[0].verdict, Some(Verdict::Throughput(_))));
    }

    #[tokio::test]
    async fn test_mixed_result_kinds_count_as_harness_defect() {
        let executor = FakeExecutor::new(0);
        let scripts = vec![script("mixed", "mixed\nvalue=1\n")];
        let mut reporter = MemoryReporter::new();
        let report = Runner::new(&executor, options())
            .run(&scripts, &mut reporter)
            .await;

        assert_eq!(report.summary.failed, 1);
        assert!(report.cases[0].verdict.is_none());
        assert!(reporter.failures().next().unwrap().starts_with("Harness defect"));
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_no_cases() {
        let executor = FakeExecutor::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scripts = vec![script("ok", "value=1\n")];
        let mut reporter = MemoryReporter::new();
        let report = Runner::new(&executor, options())
            .with_cancellation(cancel)
            .run(&scripts, &mut reporter)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.summary.total, 0);
        assert!(executor.calls.lock().unwrap().is_empty());
        assert_eq!(reporter.warnings().count(), 1);
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let include = ScriptFilter::new(vec!["Blur".into(), "sharpen".into()], Vec::new());
        assert!(include.accepts("blur"));
        assert!(include.accepts("SHARPEN"));
        assert!(!include.accepts("resize"));

        let exclude = ScriptFilter::new(Vec::new(), vec!["resize".into()]);
        assert!(!exclude.accepts("Resize"));
        assert!(exclude.accepts("blur"));

        assert!(ScriptFilter::new(Vec::new(), Vec::new()).accepts("anything"));
    }

    #[test]
    fn test_load_scripts_skips_unparsable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.avs"), "# frame: 2\nBlur(1.0)\n").unwrap();
        std::fs::write(dir.path().join("bad.avs"), "# frame: many\nBlur(1.0)\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut reporter = MemoryReporter::new();
        let scripts =
            load_scripts(dir.path(), "avs", &ScriptFilter::All, &mut reporter).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name(), "good");

        let warning = reporter.warnings().next().unwrap();
        assert!(warning.starts_with("Error parsing script"));
        assert!(warning.contains("bad.avs"));
    }
}
