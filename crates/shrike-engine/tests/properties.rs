//! Randomized invariant checks over whole FSM runs.

use proptest::prelude::*;

use shrike_engine::actions::ActionRegistry;
use shrike_engine::fsm::Fsm;
use shrike_engine::manager::SolverManager;
use shrike_engine::rng::SeededRng;
use shrike_engine::run::{run_once, untrace_once, RunConfig};
use shrike_smt::backends::stub::StubSolver;
use shrike_smt::sort::SortKind;

fn config(seed: u64) -> RunConfig {
    RunConfig {
        seed,
        max_steps: 80,
        ..RunConfig::default()
    }
}

/// Drive a full FSM walk and hand back the manager for inspection.
fn walk(seed: u64) -> SolverManager {
    let registry = ActionRegistry::new();
    let mut fsm = Fsm::build(&registry);
    let mut mgr = SolverManager::new(
        Box::new(StubSolver::new()),
        SeededRng::new(seed),
        &config(seed),
    )
    .unwrap();
    let mut steps = 0;
    while !fsm.at_final() && steps < 120 {
        if steps >= 80 {
            fsm.force_delete();
        }
        fsm.step(&mut mgr).unwrap();
        steps += 1;
    }
    mgr
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Sort ids are dense in [1, n_sorts] and every sort sits in a bucket
    /// of its kind.
    #[test]
    fn sort_ids_stay_dense(seed in 0u64..10_000) {
        let mgr = walk(seed);
        let mut ids: Vec<u64> = mgr.sorts().iter().map(|s| s.id()).collect();
        ids.sort_unstable();
        prop_assert_eq!(ids.len() as u64, mgr.n_sorts());
        for (expected, id) in (1..).zip(ids) {
            prop_assert_eq!(expected, id);
        }
        for sort in mgr.sorts() {
            prop_assert!(sort.kind() != SortKind::Any);
            prop_assert!(sort.id() >= 1 && sort.id() <= mgr.n_sorts());
        }
    }

    /// Terms surviving the walk never report a scope level beyond the
    /// current push depth.
    #[test]
    fn term_levels_respect_push_depth(seed in 0u64..10_000) {
        let mut mgr = walk(seed);
        let depth = mgr.n_push_levels() as usize;
        for _ in 0..16 {
            if let Some(term) = mgr.pick_term() {
                if let Some(max) = term.max_level() {
                    prop_assert!(max <= depth);
                }
                prop_assert!(term.id() >= 1);
            }
        }
    }

    /// Generation is a pure function of the seed, and replay reproduces the
    /// verdict sequence.
    #[test]
    fn generate_replay_round_trip(seed in 0u64..10_000) {
        let mut out_a = Vec::new();
        let mut out_b = Vec::new();
        let summary_a = run_once(&config(seed), Box::new(StubSolver::new()), &mut out_a).unwrap();
        let summary_b = run_once(&config(seed), Box::new(StubSolver::new()), &mut out_b).unwrap();
        prop_assert_eq!(&out_a, &out_b);
        prop_assert_eq!(&summary_a.verdicts, &summary_b.verdicts);

        let trace = String::from_utf8(out_a).unwrap();
        let replayed = untrace_once(&config(seed), Box::new(StubSolver::new()), &trace).unwrap();
        prop_assert!(replayed.finding.is_none());
        prop_assert_eq!(&replayed.verdicts, &summary_a.verdicts);
    }
}
