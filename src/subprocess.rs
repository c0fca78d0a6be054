//! External command execution with a hard timeout.
//!
//! Service health checks shell out to `systemctl` and `docker`, both of
//! which can block indefinitely on a wedged daemon. Every invocation
//! goes through [`run_with_timeout`] so one stuck command cannot stall
//! a collection cycle.

use std::process::{Command, Output};
use std::time::Duration;

/// Outcome of a command run under a timeout.
#[derive(Debug)]
pub enum CommandResult {
    /// The command ran to completion (any exit code).
    Completed(Output),
    /// The command did not finish within the timeout.
    TimedOut,
    /// The command could not be spawned (missing binary, permissions).
    SpawnFailed(String),
}

impl CommandResult {
    /// Returns true if the command completed with exit code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, Self::Completed(output) if output.status.success())
    }

    /// Returns true if the command timed out.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Returns trimmed stdout for completed commands, regardless of
    /// exit code (`systemctl is-active` reports the status word on
    /// stdout even when it exits non-zero).
    #[must_use]
    pub fn stdout_trimmed(&self) -> Option<String> {
        match self {
            Self::Completed(output) => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            _ => None,
        }
    }
}

/// Runs a command, waiting at most `timeout` for it to finish.
///
/// The blocking `output()` call runs on a detached thread; on timeout
/// the thread is abandoned and cleans up after itself when the child
/// eventually exits.
pub fn run_with_timeout(cmd: &str, args: &[&str], timeout: Duration) -> CommandResult {
    use std::sync::mpsc;
    use std::thread;

    let cmd = cmd.to_string();
    let args: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();

    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let result = Command::new(&cmd).args(&args).output();
        // Receiver may have timed out and dropped.
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(output)) => CommandResult::Completed(output),
        Ok(Err(e)) => CommandResult::SpawnFailed(e.to_string()),
        Err(mpsc::RecvTimeoutError::Timeout) => CommandResult::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            CommandResult::SpawnFailed("worker thread died".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_successful_command() {
        let result = run_with_timeout("echo", &["hello"], Duration::from_secs(1));

        assert!(result.success());
        assert_eq!(result.stdout_trimmed().unwrap(), "hello");
    }

    #[test]
    fn test_failed_command_still_exposes_stdout() {
        // sh -c prints then exits non-zero, like `systemctl is-active`
        // reporting "inactive".
        let result =
            run_with_timeout("sh", &["-c", "echo inactive; exit 3"], Duration::from_secs(1));

        assert!(!result.success());
        assert!(!result.timed_out());
        assert_eq!(result.stdout_trimmed().unwrap(), "inactive");
    }

    #[test]
    fn test_timeout_abandons_slow_command() {
        let start = Instant::now();
        let result = run_with_timeout("sleep", &["10"], Duration::from_millis(100));

        assert!(result.timed_out());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(result.stdout_trimmed().is_none());
    }

    #[test]
    fn test_nonexistent_command_is_spawn_failure() {
        let result =
            run_with_timeout("this_command_does_not_exist_42", &[], Duration::from_secs(1));

        assert!(matches!(result, CommandResult::SpawnFailed(_)));
    }

    #[test]
    fn test_repeated_timeouts_do_not_wedge() {
        for _ in 0..5 {
            let result = run_with_timeout("sleep", &["10"], Duration::from_millis(20));
            assert!(result.timed_out());
        }
    }
}
