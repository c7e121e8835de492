//! CLI command definitions
//!
//! Defines the clap commands for the framecheck CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run every test case against both engine builds and compare the results
    Run(RunArgs),

    /// Parse scripts and print the resolved test cases without running them
    List {
        /// Directory searched recursively for scripts
        #[arg(long, short)]
        scripts: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Engine build under test
    #[arg(long = "test", short = 't', alias = "test-dll")]
    pub candidate: PathBuf,

    /// Known-good engine build
    #[arg(
        long = "reference",
        short = 'r',
        alias = "ref-dll",
        default_value = "libavisynth.so"
    )]
    pub reference: PathBuf,

    /// Directory searched recursively for scripts
    #[arg(long, short)]
    pub scripts: PathBuf,

    /// Only run these scripts (colon-separated names)
    #[arg(long, value_delimiter = ':', conflicts_with = "exclude")]
    pub include: Vec<String>,

    /// Skip these scripts (colon-separated names)
    #[arg(long, value_delimiter = ':')]
    pub exclude: Vec<String>,

    /// Largest tolerated throughput drop, in percent
    #[arg(long)]
    pub max_fps_drop: Option<f64>,

    /// Kill a worker after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Worker executable (default: next to framecheck, then PATH)
    #[arg(long)]
    pub worker: Option<PathBuf>,

    /// Run both builds of a test case at the same time
    #[arg(long)]
    pub concurrent: bool,

    /// Write a JSON report of every verdict to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}
