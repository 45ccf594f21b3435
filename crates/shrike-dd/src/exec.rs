//! Subprocess execution with a wall-clock cap.
//!
//! Children run as their own process-group leaders so a timeout can kill
//! the whole subtree; stdout/stderr are captured through temp files.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatusKind {
    Exited(i32),
    Signaled(i32),
    TimedOut,
}

impl ExitStatusKind {
    pub fn is_ok(self) -> bool {
        self == ExitStatusKind::Exited(0)
    }
}

/// Captured outcome of one child run.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub status: ExitStatusKind,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

fn read_back(file: &mut fs::File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

/// Run `cmd` to completion or until `timeout` elapses.
pub fn run_with_timeout(cmd: &mut Command, timeout: Option<Duration>) -> io::Result<ExecResult> {
    let stdout_tmp = tempfile::tempfile()?;
    let stderr_tmp = tempfile::tempfile()?;
    let mut stdout_file = stdout_tmp.try_clone()?;
    let mut stderr_file = stderr_tmp.try_clone()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout_tmp))
        .stderr(Stdio::from(stderr_tmp));

    // Make the child its own process-group leader so the timeout kill
    // reaches any solver processes it spawned.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id() as i32;
    let deadline = timeout.map(|t| start + t);

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break if let Some(code) = status.code() {
                ExitStatusKind::Exited(code)
            } else if let Some(signal) = status.signal() {
                ExitStatusKind::Signaled(signal)
            } else {
                ExitStatusKind::Exited(-1)
            };
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                unsafe {
                    let _ = libc::kill(-pid, libc::SIGKILL);
                }
                let _ = child.wait()?;
                break ExitStatusKind::TimedOut;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    Ok(ExecResult {
        status,
        stdout: read_back(&mut stdout_file)?,
        stderr: read_back(&mut stderr_file)?,
        duration: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_exit_code_and_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let result = run_with_timeout(&mut cmd, None).unwrap();
        assert_eq!(result.status, ExitStatusKind::Exited(3));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.status.is_ok());
    }

    #[test]
    fn zero_exit_is_ok() {
        let mut cmd = Command::new("true");
        let result = run_with_timeout(&mut cmd, None).unwrap();
        assert!(result.status.is_ok());
    }

    #[test]
    fn timeout_kills_the_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let result = run_with_timeout(&mut cmd, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(result.status, ExitStatusKind::TimedOut);
        assert!(result.duration < Duration::from_secs(5));
    }
}
