//! Subprocess execution with a wall-clock deadline.
//!
//! Every git invocation runs through [`run_with_deadline`]: stdout and stderr
//! are drained on reader threads (so large outputs cannot deadlock the pipe),
//! and the child is bounded by a deadline. On timeout the child gets SIGTERM,
//! a short grace period, then SIGKILL.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::GitError;

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Captured result of a finished git process.
#[derive(Debug)]
pub(crate) struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// Spawn `cmd`, optionally feed `stdin_data`, and wait up to `deadline`.
///
/// `rendered` is the human-readable command line used in error messages.
pub(crate) fn run_with_deadline(
    mut cmd: Command,
    rendered: &str,
    stdin_data: Option<&[u8]>,
    deadline: Duration,
) -> Result<ExecResult, GitError> {
    cmd.stdin(if stdin_data.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(GitError::Io)?;

    if let Some(data) = stdin_data
        && let Some(mut pipe) = child.stdin.take()
    {
        // Closing the pipe (drop) signals EOF to git.
        pipe.write_all(data).map_err(GitError::Io)?;
    }

    let Some(mut out_pipe) = child.stdout.take() else {
        return Err(GitError::Io(std::io::Error::other(
            "child stdout was not captured",
        )));
    };
    let Some(mut err_pipe) = child.stderr.take() else {
        return Err(GitError::Io(std::io::Error::other(
            "child stderr was not captured",
        )));
    };

    let out_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = out_pipe.read_to_end(&mut buf);
        buf
    });
    let err_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = err_pipe.read_to_end(&mut buf);
        buf
    });

    match child.wait_timeout(deadline).map_err(GitError::Io)? {
        Some(status) => {
            let stdout = lossy(out_handle.join().unwrap_or_default());
            let stderr = lossy(err_handle.join().unwrap_or_default());
            Ok(ExecResult {
                stdout,
                stderr,
                exit_code: status.code(),
                success: status.success(),
            })
        }
        None => {
            terminate(&mut child);
            // Drain the reader threads so they don't leak.
            let _ = out_handle.join();
            let _ = err_handle.join();
            Err(GitError::Timeout {
                command: rendered.to_owned(),
                seconds: deadline.as_secs(),
            })
        }
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

/// SIGTERM, wait for the grace period, then SIGKILL.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid::from_raw(child.id() as i32);
        let _ = kill(pid, Signal::SIGTERM);
        if let Ok(Some(_)) = child.wait_timeout(TERM_GRACE) {
            return;
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello; exit 0"]);
        let res = run_with_deadline(cmd, "sh -c echo", None, Duration::from_secs(10)).unwrap();
        assert!(res.success);
        assert_eq!(res.stdout.trim(), "hello");
        assert_eq!(res.exit_code, Some(0));
    }

    #[test]
    fn captures_stderr_on_failure() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        let res = run_with_deadline(cmd, "sh -c fail", None, Duration::from_secs(10)).unwrap();
        assert!(!res.success);
        assert_eq!(res.stderr.trim(), "oops");
        assert_eq!(res.exit_code, Some(3));
    }

    #[test]
    fn feeds_stdin() {
        let mut cmd = Command::new("cat");
        cmd.arg("-");
        let res =
            run_with_deadline(cmd, "cat -", Some(b"ping"), Duration::from_secs(10)).unwrap();
        assert_eq!(res.stdout, "ping");
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 60"]);
        let err = run_with_deadline(cmd, "sh -c sleep", None, Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, GitError::Timeout { .. }), "got: {err}");
    }
}
