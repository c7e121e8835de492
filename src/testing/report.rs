//! Report sinks for run progress and results

use colored::Colorize;
use serde::Serialize;

/// Totals of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Receives progress and outcome messages from the orchestrator
pub trait Reporter: Send {
    fn test_started(&mut self, title: &str);
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn pass(&mut self, message: &str);
    fn fail(&mut self, message: &str);
    fn summary(&mut self, summary: &Summary);
}

/// Colored terminal output; warnings go to stderr so stdout stays parseable
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn test_started(&mut self, title: &str) {
        println!("\n{} {}", "Test:".blue().bold(), title.white().bold());
    }

    fn info(&mut self, message: &str) {
        println!("  {}", message.dimmed());
    }

    fn warn(&mut self, message: &str) {
        eprintln!("  {} {}", "!".yellow(), message.yellow());
    }

    fn pass(&mut self, message: &str) {
        println!("  {} {}", "✓".green(), message);
    }

    fn fail(&mut self, message: &str) {
        println!("  {} {}", "✗".red(), message.red());
    }

    fn summary(&mut self, summary: &Summary) {
        println!();
        let line = format!(
            "Total: {}, passed: {}, failed: {}",
            summary.total, summary.passed, summary.failed
        );
        if summary.all_passed() {
            println!("{}", line.green().bold());
        } else {
            println!("{}", line.red().bold());
        }
    }
}

/// One recorded reporter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Started(String),
    Info(String),
    Warn(String),
    Pass(String),
    Fail(String),
    Summary(Summary),
}

/// Keeps every event in memory; used by tests and embedders
#[derive(Debug, Default)]
pub struct MemoryReporter {
    pub events: Vec<ReportEvent>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            ReportEvent::Warn(m) => Some(m.as_str()),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            ReportEvent::Fail(m) => Some(m.as_str()),
            _ => None,
        })
    }

    pub fn started(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            ReportEvent::Started(t) => Some(t.as_str()),
            _ => None,
        })
    }

    pub fn last_summary(&self) -> Option<Summary> {
        self.events.iter().rev().find_map(|e| match e {
            ReportEvent::Summary(s) => Some(*s),
            _ => None,
        })
    }
}

impl Reporter for MemoryReporter {
    fn test_started(&mut self, title: &str) {
        self.events.push(ReportEvent::Started(title.to_string()));
    }

    fn info(&mut self, message: &str) {
        self.events.push(ReportEvent::Info(message.to_string()));
    }

    fn warn(&mut self, message: &str) {
        self.events.push(ReportEvent::Warn(message.to_string()));
    }

    fn pass(&mut self, message: &str) {
        self.events.push(ReportEvent::Pass(message.to_string()));
    }

    fn fail(&mut self, message: &str) {
        self.events.push(ReportEvent::Fail(message.to_string()));
    }

    fn summary(&mut self, summary: &Summary) {
        self.events.push(ReportEvent::Summary(*summary));
    }
}
