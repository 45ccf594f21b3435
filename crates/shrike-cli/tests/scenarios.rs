//! End-to-end scenarios: generation, replay, cross-checking, minimization,
//! and supervision wired together the way the binary uses them.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use shrike_cli::supervisor::{self, ErrorMap};
use shrike_dd::exec::{ExecResult, ExitStatusKind};
use shrike_dd::minimize;
use shrike_engine::run::{run_once, untrace_once, RunConfig};
use shrike_engine::trace::{split_returns, tokenize};
use shrike_smt::backends::cross::CrossCheckSolver;
use shrike_smt::backends::stub::{StubBug, StubSolver};
use shrike_smt::solver::{SatResult, Solver};

fn narrow_stub() -> Box<dyn Solver> {
    Box::new(StubSolver::new().with_max_bv_width(8))
}

fn buggy_cross_check() -> Box<dyn Solver> {
    Box::new(CrossCheckSolver::new(
        Box::new(StubSolver::with_bug(StubBug::AndBecomesOr).with_max_bv_width(8)),
        Box::new(StubSolver::new().with_max_bv_width(8)),
    ))
}

fn config(seed: u64) -> RunConfig {
    RunConfig {
        seed,
        max_steps: 200,
        ..RunConfig::default()
    }
}

/// Seed 0x1 against a stub limited to BOOL and BV widths 1..=8: the run
/// checks sat with definite verdicts, never references an id before its
/// definition, and interns at most the eight BV widths plus Bool.
#[test]
fn narrow_stub_run_shape() {
    let mut out = Vec::new();
    let summary = run_once(&config(0x1), narrow_stub(), &mut out).unwrap();
    let trace = String::from_utf8(out).unwrap();

    assert!(summary.finding.is_none());
    assert!(trace.contains("check-sat"));
    assert!(!summary.verdicts.is_empty());
    for verdict in &summary.verdicts {
        assert!(matches!(verdict, SatResult::Sat | SatResult::Unsat));
    }

    let mut defined: BTreeSet<String> = BTreeSet::new();
    let mut sort_ids: BTreeSet<String> = BTreeSet::new();
    for line in trace.lines().skip(1) {
        let tokens = tokenize(line).unwrap();
        let (args, returns) = split_returns(tokens);
        for token in &args {
            let is_id = !token.quoted
                && token.text.len() > 1
                && (token.text.starts_with('s') || token.text.starts_with('t'))
                && token.text[1..].chars().all(|c| c.is_ascii_digit());
            if is_id {
                assert!(
                    defined.contains(&token.text),
                    "{} referenced before its returns in `{line}`",
                    token.text
                );
            }
        }
        for token in returns {
            if token.text.starts_with('s') {
                sort_ids.insert(token.text.clone());
            }
            defined.insert(token.text);
        }
    }
    // Bool plus BV widths 1..=8.
    assert!(sort_ids.len() <= 9, "interned {} sorts", sort_ids.len());
}

/// Replaying the generated trace yields the identical verdict sequence.
#[test]
fn narrow_stub_replay_round_trip() {
    let mut out = Vec::new();
    let summary = run_once(&config(0x1), narrow_stub(), &mut out).unwrap();
    let trace = String::from_utf8(out).unwrap();

    let replayed = untrace_once(&config(0x1), narrow_stub(), &trace).unwrap();
    assert!(replayed.finding.is_none());
    assert_eq!(replayed.verdicts, summary.verdicts);
}

/// Find a seed whose run flags the injected BV_AND bug through
/// cross-checking, and return its trace.
fn find_mismatching_trace() -> (u64, String) {
    for seed in 0..500 {
        let mut out = Vec::new();
        let summary = run_once(&config(seed), buggy_cross_check(), &mut out).unwrap();
        if let Some(finding) = &summary.finding {
            if finding.contains("cross-check mismatch") {
                return (seed, String::from_utf8(out).unwrap());
            }
        }
    }
    panic!("no seed in 0..500 exposed the injected BV_AND bug");
}

/// A stub with `BV_AND` rewritten to `BV_OR`, cross-checked against a
/// correct stub, produces a wrong-result finding.
#[test]
fn injected_bug_is_caught_by_cross_check() {
    let (_, trace) = find_mismatching_trace();
    assert!(trace.contains("BV_AND"));

    // The finding reproduces on replay.
    let replayed = untrace_once(&config(0), buggy_cross_check(), &trace).unwrap();
    let finding = replayed.finding.expect("replay must reproduce the finding");
    assert!(finding.contains("cross-check mismatch"));
}

/// Delta debugging the mismatching trace yields a small reproducer that
/// still contains the and-term construction and a sat check.
#[test]
fn injected_bug_trace_minimizes_to_a_small_reproducer() {
    let (_, trace) = find_mismatching_trace();

    // In-process oracle: the reduced trace must still replay into a
    // cross-check mismatch.
    let mut oracle = |candidate: &str| {
        untrace_once(&config(0), buggy_cross_check(), candidate)
            .map(|summary| {
                summary
                    .finding
                    .is_some_and(|f| f.contains("cross-check mismatch"))
            })
            .unwrap_or(false)
    };

    let report = minimize(&trace, &mut oracle).unwrap();
    assert!(report.final_lines <= report.original_lines);
    // Header, new-solver, one sort, operands, the and-term, and the failing
    // check; everything else must be gone.
    assert!(
        report.final_lines <= 12,
        "minimized trace still has {} lines:\n{}",
        report.final_lines,
        report.trace
    );
    assert!(report.trace.contains("mk-sort BV"));
    assert!(report.trace.contains("mk-term BV_AND"));
    assert!(report.trace.contains("check-sat"));

    // Idempotence at the fixed point.
    let again = minimize(&report.trace, &mut oracle).unwrap();
    assert_eq!(again.trace, report.trace);
}

/// A long supervised campaign over a correct stub finds nothing.
#[test]
fn continuous_runs_with_correct_stub_stay_clean() {
    let mut errors = ErrorMap::default();
    let stop = AtomicBool::new(false);
    let mut seed = 0u64;
    let mut next_seed = || {
        seed += 1;
        seed
    };
    let mut worker = |seed: u64| {
        let config = RunConfig {
            seed,
            max_steps: 60,
            ..RunConfig::default()
        };
        let mut sink = Vec::new();
        let summary = run_once(&config, Box::new(StubSolver::new()), &mut sink)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(ExecResult {
            status: match summary.finding {
                None => ExitStatusKind::Exited(0),
                Some(_) => ExitStatusKind::Exited(3),
            },
            stdout: String::new(),
            stderr: summary.finding.unwrap_or_default(),
            duration: Duration::from_millis(1),
        })
    };

    let report = supervisor::run_loop(
        1000,
        &[],
        &mut errors,
        &stop,
        &mut next_seed,
        &mut worker,
    )
    .unwrap();
    assert_eq!(report.runs, 1000);
    assert!(errors.is_empty(), "unexpected findings: {}", errors.render(false));
}

/// Identical seeds and configurations give byte-identical traces even
/// through the cross-checking wrapper.
#[test]
fn cross_checked_runs_are_deterministic() {
    let run = |seed: u64| {
        let mut out = Vec::new();
        let _ = run_once(
            &config(seed),
            Box::new(CrossCheckSolver::new(
                Box::new(StubSolver::new()),
                Box::new(StubSolver::new()),
            )),
            &mut out,
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    };
    assert_eq!(run(42), run(42));
}
