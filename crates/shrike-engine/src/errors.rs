use thiserror::Error;

use shrike_smt::solver::SolverError;

/// Replay failure: the trace itself is malformed or references unknown ids.
#[derive(Debug, Error)]
#[error("untrace error at line {line}: {msg}")]
pub struct UntraceError {
    pub line: usize,
    pub msg: String,
}

impl UntraceError {
    pub fn new(line: usize, msg: impl Into<String>) -> Self {
        UntraceError {
            line,
            msg: msg.into(),
        }
    }
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad run configuration; never retried.
    #[error("configuration error: {0}")]
    Config(String),
    /// An error raised by the solver under test. When the action's
    /// preconditions held this is a finding, not an engine defect.
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Untrace(#[from] UntraceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrace_error_names_the_line() {
        let err = UntraceError::new(17, "unknown action `mk-frob`");
        assert_eq!(err.to_string(), "untrace error at line 17: unknown action `mk-frob`");
    }

    #[test]
    fn solver_errors_convert() {
        let err: EngineError = SolverError::Backend("boom".into()).into();
        assert!(matches!(err, EngineError::Solver(_)));
    }
}
