//! Interestingness oracles.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use std::io::Write as _;

use crate::exec::{run_with_timeout, ExecResult, ExitStatusKind};
use crate::DdError;

/// Decides whether a reduced trace still exhibits the target symptom.
/// Implementations must be pure: the same input yields the same verdict.
pub trait Oracle {
    fn interesting(&mut self, trace: &str) -> Result<bool, DdError>;
}

impl<F: FnMut(&str) -> bool> Oracle for F {
    fn interesting(&mut self, trace: &str) -> Result<bool, DdError> {
        Ok(self(trace))
    }
}

/// The reference output a reduction must keep reproducing.
#[derive(Debug, Clone)]
pub struct GoldenOutput {
    pub status: ExitStatusKind,
    pub stdout: String,
    pub stderr: String,
}

impl GoldenOutput {
    pub fn from_result(result: &ExecResult) -> Self {
        GoldenOutput {
            status: result.status,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        }
    }
}

/// Stream matching configuration for [`ExecOracle`].
#[derive(Debug, Clone, Default)]
pub struct MatchConfig {
    /// Substring that must occur on stdout (instead of full comparison).
    pub match_out: Option<String>,
    /// Substring that must occur on stderr (instead of full comparison).
    pub match_err: Option<String>,
    pub ignore_out: bool,
    pub ignore_err: bool,
}

/// Oracle that replays a candidate trace in a subprocess and compares its
/// outcome against the golden run.
pub struct ExecOracle {
    program: PathBuf,
    args: Vec<String>,
    golden: GoldenOutput,
    matching: MatchConfig,
    timeout: Option<Duration>,
    workdir: PathBuf,
}

impl ExecOracle {
    /// The candidate trace path is appended to `args` on every call.
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        golden: GoldenOutput,
        matching: MatchConfig,
        timeout: Option<Duration>,
        workdir: PathBuf,
    ) -> Self {
        ExecOracle {
            program,
            args,
            golden,
            matching,
            timeout,
            workdir,
        }
    }

    fn stream_matches(
        observed: &str,
        golden: &str,
        matcher: &Option<String>,
        ignore: bool,
    ) -> bool {
        if ignore {
            return true;
        }
        match matcher {
            Some(needle) => observed.contains(needle.as_str()),
            None => observed == golden,
        }
    }
}

impl Oracle for ExecOracle {
    fn interesting(&mut self, trace: &str) -> Result<bool, DdError> {
        let mut file = tempfile::Builder::new()
            .prefix("dd-")
            .suffix(".trace")
            .tempfile_in(&self.workdir)?;
        file.write_all(trace.as_bytes())?;
        file.flush()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(file.path());
        let result = run_with_timeout(&mut cmd, self.timeout)?;

        if result.status != self.golden.status {
            return Ok(false);
        }
        let err_ok = Self::stream_matches(
            &result.stderr,
            &self.golden.stderr,
            &self.matching.match_err,
            self.matching.ignore_err,
        );
        let out_ok = Self::stream_matches(
            &result.stdout,
            &self.golden.stdout,
            &self.matching.match_out,
            self.matching.ignore_out,
        );
        Ok(err_ok && out_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_oracles() {
        let mut oracle = |trace: &str| trace.contains("check-sat");
        assert!(oracle.interesting("mk-sort BV 8\ncheck-sat\n").unwrap());
        assert!(!oracle.interesting("mk-sort BV 8\n").unwrap());
    }

    #[test]
    fn exec_oracle_compares_exit_status() {
        // grep -q exits 0 iff the pattern occurs in the candidate file.
        let workdir = tempfile::tempdir().unwrap();
        let golden = GoldenOutput {
            status: ExitStatusKind::Exited(0),
            stdout: String::new(),
            stderr: String::new(),
        };
        let mut oracle = ExecOracle::new(
            PathBuf::from("grep"),
            vec!["-q".to_string(), "BV_AND".to_string()],
            golden,
            MatchConfig {
                ignore_out: true,
                ignore_err: true,
                ..MatchConfig::default()
            },
            Some(Duration::from_secs(5)),
            workdir.path().to_path_buf(),
        );
        assert!(oracle
            .interesting("mk-term BV_AND 2 t1 t2 0 returns t3 s1\n")
            .unwrap());
        assert!(!oracle.interesting("mk-term BV_OR 2 t1 t2 0\n").unwrap());
    }

    #[test]
    fn stream_matching_modes() {
        assert!(ExecOracle::stream_matches("anything", "golden", &None, true));
        assert!(ExecOracle::stream_matches("same", "same", &None, false));
        assert!(!ExecOracle::stream_matches("same", "other", &None, false));
        assert!(ExecOracle::stream_matches(
            "error: mismatch at t3",
            "",
            &Some("mismatch".to_string()),
            false
        ));
        assert!(!ExecOracle::stream_matches(
            "all good",
            "",
            &Some("mismatch".to_string()),
            false
        ));
    }
}
