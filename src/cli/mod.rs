//! CLI command handling
//!
//! Resolves configuration, wires up the driver and reporter, and prints
//! results.

use std::path::Path;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::commands::{Commands, RunArgs};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::ipc::Driver;
use crate::testing::{
    load_scripts, ConsoleReporter, Reporter, RunOptions, Runner, ScriptFilter, TestCase,
};

/// Dispatch a CLI command
///
/// Returns whether everything succeeded; the caller turns that into the
/// process exit code.
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<bool> {
    let config = Config::load(config_path)?;

    match command {
        Commands::Run(args) => run(args, &config).await,
        Commands::List { scripts, json } => list(&scripts, json, &config),
    }
}

async fn run(args: RunArgs, config: &Config) -> Result<bool> {
    let worker = args
        .worker
        .or_else(|| config.worker.path.clone())
        .or_else(paths::default_worker_path)
        .ok_or_else(|| {
            Error::Config(format!(
                "Cannot find '{}'; pass --worker or set worker.path in the config file",
                paths::WORKER_BIN
            ))
        })?;

    let timeout = args
        .timeout
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.worker.timeout());

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let driver = Driver::new(&worker)
        .with_timeout(timeout)
        .with_region_size(config.worker.region_size_bytes())
        .with_cancellation(cancel.clone());

    tracing::info!(
        worker = %worker.display(),
        candidate = %args.candidate.display(),
        reference = %args.reference.display(),
        "Starting run"
    );

    let mut reporter = ConsoleReporter;
    let filter = ScriptFilter::new(args.include, args.exclude);
    let scripts = load_scripts(
        &args.scripts,
        &config.scripts.extension,
        &filter,
        &mut reporter,
    )?;
    if scripts.is_empty() {
        reporter.warn(&format!("No scripts found in {}", args.scripts.display()));
    }

    let options = RunOptions {
        candidate: args.candidate,
        reference: args.reference,
        max_fps_drop_percent: args
            .max_fps_drop
            .unwrap_or(config.comparison.max_fps_drop_percent),
        concurrent_builds: args.concurrent || config.run.concurrent_builds,
    };

    let report = Runner::new(&driver, options)
        .with_cancellation(cancel)
        .run(&scripts, &mut reporter)
        .await;

    if let Some(path) = &args.report {
        report.write_json(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(report.summary.all_passed() && !report.cancelled)
}

/// Cancel the run on the first Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping the run".yellow());
            cancel.cancel();
        }
    });
}

fn list(dir: &Path, json: bool, config: &Config) -> Result<bool> {
    let mut reporter = ConsoleReporter;
    let scripts = load_scripts(dir, &config.scripts.extension, &ScriptFilter::All, &mut reporter)?;
    let cases: Vec<TestCase> = scripts.iter().flat_map(|s| s.test_cases()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(true);
    }

    for script in &scripts {
        let location = script
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("{} {}", script.name().bold(), location.dimmed());
        for case in script.test_cases() {
            print_case(&case);
        }
    }
    println!("\n{} test case(s)", cases.len());
    Ok(true)
}

fn print_case(case: &TestCase) {
    let detail = match case.kind {
        crate::testing::TestKind::Correctness => {
            format!("frame {} ({:?} access)", case.frame, case.access)
        }
        crate::testing::TestKind::Performance => format!(
            "throughput over {} frames, {} skipped",
            case.frame_count, case.skip_first
        ),
    };
    println!("  {} {}", case.title(), detail.dimmed());
}
