//! Continuous-mode supervision: per-seed workers, outcome classification,
//! and error aggregation.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use regex::Regex;
use tracing::{info, warn};

use shrike_dd::exec::{ExecResult, ExitStatusKind};

/// Worker exit codes, mirrored by `main`.
pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_SOLVER_FAIL: i32 = 3;

/// Classified worker outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunClass {
    Ok,
    Timeout,
    Crash,
    Assertion,
    WrongResult,
    Filtered,
}

/// Classify one worker result. `filters` are known-error substrings whose
/// matches are counted but not reported.
pub fn classify(result: &ExecResult, filters: &[String]) -> RunClass {
    match result.status {
        ExitStatusKind::TimedOut => RunClass::Timeout,
        ExitStatusKind::Signaled(_) => {
            if result.stderr.contains("assert") {
                RunClass::Assertion
            } else {
                RunClass::Crash
            }
        }
        ExitStatusKind::Exited(EXIT_OK) => RunClass::Ok,
        ExitStatusKind::Exited(_) => {
            if filters.iter().any(|f| result.stderr.contains(f.as_str())) {
                RunClass::Filtered
            } else if result.stderr.contains("cross-check mismatch") {
                RunClass::WrongResult
            } else if result.stderr.contains("assert") {
                RunClass::Assertion
            } else {
                RunClass::Crash
            }
        }
    }
}

/// Normalize an error message into a signature: memory addresses, file
/// paths, and line numbers vary between runs and must not split buckets.
pub fn normalize_signature(message: &str) -> String {
    let addr = Regex::new(r"0x[0-9a-fA-F]+").expect("static regex");
    let path = Regex::new(r"(/[\w.+~-]+){2,}").expect("static regex");
    let line_no = Regex::new(r":\d+").expect("static regex");
    let big_num = Regex::new(r"\b\d{4,}\b").expect("static regex");

    let s = addr.replace_all(message, "<addr>");
    let s = path.replace_all(&s, "<path>");
    let s = line_no.replace_all(&s, ":<line>");
    let s = big_num.replace_all(&s, "<num>");
    s.trim().to_string()
}

/// The message reported for a classified failure.
pub fn extract_message(result: &ExecResult) -> String {
    let tail: Vec<&str> = result
        .stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if tail.is_empty() {
        return match result.status {
            ExitStatusKind::TimedOut => "timeout".to_string(),
            ExitStatusKind::Signaled(sig) => format!("killed by signal {sig}"),
            ExitStatusKind::Exited(code) => format!("exit code {code}"),
        };
    }
    let start = tail.len().saturating_sub(4);
    tail[start..].join("\n")
}

/// Aggregated findings: normalized signature to original message and the
/// seeds that produced it.
#[derive(Debug, Default)]
pub struct ErrorMap {
    entries: IndexMap<String, (String, Vec<u64>)>,
}

impl ErrorMap {
    pub fn add(&mut self, message: String, seed: u64) {
        let signature = normalize_signature(&message);
        self.entries
            .entry(signature)
            .or_insert_with(|| (message, Vec::new()))
            .1
            .push(seed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &(String, Vec<u64>))> {
        self.entries.iter()
    }

    /// Human-readable or CSV error summary.
    pub fn render(&self, csv: bool) -> String {
        let mut out = String::new();
        if self.entries.is_empty() {
            return out;
        }
        out.push_str(&format!(
            "\nError statistics ({} in total):\n\n",
            self.entries.len()
        ));
        for (_, (message, seeds)) in &self.entries {
            if csv {
                let escaped = message.replace('\n', "\\n").replace('"', "\"\"");
                let seed_list = seeds
                    .iter()
                    .map(|s| format!("{s:x}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("shrike:csv:{},\"{escaped}\",{seed_list}\n", seeds.len()));
            } else {
                let shown = seeds
                    .iter()
                    .take(10)
                    .map(|s| format!("{s:x}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("{} errors: {shown}\n{message}\n\n", seeds.len()));
            }
        }
        out
    }

    /// JSON export for `--export-errors`.
    pub fn export_json(&self) -> serde_json::Value {
        let messages: Vec<&String> = self.entries.values().map(|(m, _)| m).collect();
        serde_json::json!({ "errors": { "exclude": messages } })
    }
}

/// Per-iteration record handed back to the caller.
#[derive(Debug)]
pub struct SupervisorReport {
    pub runs: u64,
    pub interrupted: bool,
}

/// The continuous-mode loop. `next_seed` draws a fresh seed, `worker` runs
/// one seeded subprocess; classification and aggregation happen here.
pub fn run_loop(
    max_runs: u64,
    filters: &[String],
    errors: &mut ErrorMap,
    stop: &AtomicBool,
    next_seed: &mut dyn FnMut() -> u64,
    worker: &mut dyn FnMut(u64) -> io::Result<ExecResult>,
) -> io::Result<SupervisorReport> {
    let mut runs = 0u64;
    while max_runs == 0 || runs < max_runs {
        if stop.load(Ordering::Relaxed) {
            return Ok(SupervisorReport {
                runs,
                interrupted: true,
            });
        }
        let seed = next_seed();
        let result = worker(seed)?;
        let class = classify(&result, filters);
        match class {
            RunClass::Ok | RunClass::Filtered => {}
            RunClass::Timeout => {
                info!(seed = format!("{seed:x}"), "worker timed out");
            }
            _ => {
                let message = extract_message(&result);
                warn!(seed = format!("{seed:x}"), class = ?class, "worker failed");
                errors.add(message, seed);
            }
        }
        runs += 1;
    }
    Ok(SupervisorReport {
        runs,
        interrupted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(status: ExitStatusKind, stderr: &str) -> ExecResult {
        ExecResult {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn classification_matrix() {
        assert_eq!(
            classify(&result(ExitStatusKind::Exited(0), ""), &[]),
            RunClass::Ok
        );
        assert_eq!(
            classify(&result(ExitStatusKind::TimedOut, ""), &[]),
            RunClass::Timeout
        );
        assert_eq!(
            classify(&result(ExitStatusKind::Signaled(11), ""), &[]),
            RunClass::Crash
        );
        assert_eq!(
            classify(
                &result(ExitStatusKind::Signaled(6), "solver.c:42: assertion failed"),
                &[]
            ),
            RunClass::Assertion
        );
        assert_eq!(
            classify(
                &result(
                    ExitStatusKind::Exited(EXIT_SOLVER_FAIL),
                    "cross-check mismatch: stub returned sat, smt2 returned unsat"
                ),
                &[]
            ),
            RunClass::WrongResult
        );
        assert_eq!(
            classify(
                &result(ExitStatusKind::Exited(EXIT_SOLVER_FAIL), "known bad thing"),
                &["known bad".to_string()]
            ),
            RunClass::Filtered
        );
        assert_eq!(
            classify(&result(ExitStatusKind::Exited(EXIT_ERROR), "boom"), &[]),
            RunClass::Crash
        );
    }

    #[test]
    fn signatures_strip_varying_details() {
        let a = normalize_signature(
            "SIGSEGV at 0xdeadbeef in /home/user/solvers/cvc5/src/solver.cpp:1234",
        );
        let b = normalize_signature(
            "SIGSEGV at 0xcafebabe in /tmp/build/cvc5/src/solver.cpp:987",
        );
        assert_eq!(a, b);
        assert!(a.contains("<addr>"));
        assert!(a.contains("<path>"));
    }

    #[test]
    fn error_map_groups_by_signature() {
        let mut errors = ErrorMap::default();
        errors.add("crash at 0x1000".to_string(), 1);
        errors.add("crash at 0x2000".to_string(), 2);
        errors.add("different failure".to_string(), 3);
        assert_eq!(errors.len(), 2);
        let rendered = errors.render(false);
        assert!(rendered.contains("2 errors: 1 2"));

        let csv = errors.render(true);
        assert!(csv.contains("shrike:csv:2,"));
        let json = errors.export_json();
        assert_eq!(json["errors"]["exclude"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn loop_counts_and_aggregates() {
        let mut errors = ErrorMap::default();
        let stop = AtomicBool::new(false);
        let mut seed = 0u64;
        let mut next_seed = || {
            seed += 1;
            seed
        };
        let mut worker = |s: u64| {
            Ok(if s % 3 == 0 {
                result(ExitStatusKind::Exited(EXIT_SOLVER_FAIL), "bug at 0xabc")
            } else {
                result(ExitStatusKind::Exited(EXIT_OK), "")
            })
        };
        let report =
            run_loop(9, &[], &mut errors, &stop, &mut next_seed, &mut worker).unwrap();
        assert_eq!(report.runs, 9);
        assert!(!report.interrupted);
        assert_eq!(errors.len(), 1);
        let (_, (_, seeds)) = errors.iter().next().unwrap();
        assert_eq!(seeds, &vec![3, 6, 9]);
    }

    #[test]
    fn clean_runs_leave_the_error_map_empty() {
        let mut errors = ErrorMap::default();
        let stop = AtomicBool::new(false);
        let mut seed = 0u64;
        let mut next_seed = || {
            seed += 1;
            seed
        };
        let mut worker = |_s: u64| Ok(result(ExitStatusKind::Exited(EXIT_OK), ""));
        let report =
            run_loop(1000, &[], &mut errors, &stop, &mut next_seed, &mut worker).unwrap();
        assert_eq!(report.runs, 1000);
        assert!(errors.is_empty());
    }

    #[test]
    fn stop_flag_interrupts_the_loop() {
        let mut errors = ErrorMap::default();
        let stop = AtomicBool::new(false);
        let mut count = 0u64;
        let mut next_seed = || {
            count += 1;
            count
        };
        let mut worker = |s: u64| {
            if s >= 5 {
                stop.store(true, Ordering::Relaxed);
            }
            Ok(result(ExitStatusKind::Exited(EXIT_OK), ""))
        };
        let report =
            run_loop(0, &[], &mut errors, &stop, &mut next_seed, &mut worker).unwrap();
        assert!(report.interrupted);
        assert_eq!(report.runs, 5);
    }
}
