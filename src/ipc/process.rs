//! Waiting on worker processes
//!
//! Workers are reaped with `wait4` so the driver gets the exit status and the
//! peak resident set size in one call. The wait is polled on the tokio timer,
//! which lets a timeout or a cancelled run kill the worker.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {}", code),
            Self::Signaled(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}

/// Exit status and resource usage of a reaped worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub termination: Termination,
    pub peak_memory_bytes: Option<u64>,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }
}

/// Wait for `pid` to exit, killing it on timeout or cancellation
pub async fn wait_for_exit(
    pid: u32,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ExitReport> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(report) = try_reap(pid)? {
            return Ok(report);
        }

        if Instant::now() >= deadline {
            tracing::warn!(pid, timeout = ?timeout, "Worker timed out, killing it");
            kill_and_reap(pid);
            return Err(Error::WorkerTimeout(timeout));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!(pid, "Run cancelled, killing worker");
                kill_and_reap(pid);
                return Err(Error::WorkerCancelled);
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

fn try_reap(pid: u32) -> Result<Option<ExitReport>> {
    let mut status: libc::c_int = 0;
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let ret = unsafe {
        libc::wait4(
            pid as libc::pid_t,
            &mut status,
            libc::WNOHANG,
            usage.as_mut_ptr(),
        )
    };

    match ret {
        0 => Ok(None),
        r if r == pid as libc::pid_t => {
            let usage = unsafe { usage.assume_init() };
            Ok(Some(ExitReport {
                termination: decode_status(status),
                peak_memory_bytes: peak_memory(&usage),
            }))
        }
        _ => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                Ok(None)
            } else {
                Err(Error::Io(err))
            }
        }
    }
}

fn kill_and_reap(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
        let mut status: libc::c_int = 0;
        libc::waitpid(pid as libc::pid_t, &mut status, 0);
    }
}

fn decode_status(status: libc::c_int) -> Termination {
    if libc::WIFSIGNALED(status) {
        Termination::Signaled(libc::WTERMSIG(status))
    } else {
        Termination::Exited(libc::WEXITSTATUS(status))
    }
}

fn peak_memory(usage: &libc::rusage) -> Option<u64> {
    let max_rss = u64::try_from(usage.ru_maxrss).ok().filter(|&v| v > 0)?;
    // Linux reports kilobytes, macOS bytes
    if cfg!(target_os = "macos") {
        Some(max_rss)
    } else {
        Some(max_rss * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[tokio::test]
    async fn test_reports_exit_code_and_memory() {
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let report = wait_for_exit(child.id(), Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.termination, Termination::Exited(3));
        assert!(!report.success());
        assert!(report.peak_memory_bytes.is_some());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = std::time::Instant::now();
        let err = wait_for_exit(child.id(), Duration::from_millis(200), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkerTimeout(t) if t == Duration::from_millis(200)));
        assert!(err.to_string().contains("200ms"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_exit(child.id(), Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkerCancelled));
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::Exited(0).to_string(), "exit code 0");
        assert_eq!(Termination::Signaled(6).to_string(), "killed by signal 6");
    }
}
