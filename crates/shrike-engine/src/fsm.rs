//! The weighted finite-state machine driving a run.
//!
//! States are API phases; each holds weighted `(action, next-state)` tuples.
//! Selection draws over the actions whose preconditions hold; when none
//! does, the state's default successor is taken so runs cannot dead-end.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::actions::{Action, ActionRegistry, KIND_TRANSITION};
use crate::errors::EngineError;
use crate::manager::SolverManager;
use crate::trace::TraceLine;

pub type StateId = usize;

struct ActionTuple {
    action: Rc<dyn Action>,
    weight: u32,
    next: Option<StateId>,
}

struct State {
    kind: &'static str,
    is_final: bool,
    default_next: Option<StateId>,
    actions: Vec<ActionTuple>,
}

pub struct Fsm {
    states: Vec<State>,
    cur: StateId,
    delete_state: StateId,
}

/// State ids, fixed by construction order in [`Fsm::build`].
const S_NEW: StateId = 0;
const S_OPT: StateId = 1;
const S_SORTS: StateId = 2;
const S_INPUTS: StateId = 3;
const S_TERMS: StateId = 4;
const S_PUSH_POP: StateId = 5;
const S_ASSERT: StateId = 6;
const S_SAT: StateId = 7;
const S_CHECK_SAT_RESULT: StateId = 8;
const S_MODEL: StateId = 9;
const S_UNSAT: StateId = 10;
const S_DELETE: StateId = 11;
const S_FINAL: StateId = 12;

impl Fsm {
    pub fn build(registry: &ActionRegistry) -> Fsm {
        let get = |kind: &str| {
            registry
                .get(kind)
                .unwrap_or_else(|| panic!("action {kind} not registered"))
        };
        let tuple = |kind: &str, weight: u32, next: Option<StateId>| ActionTuple {
            action: get(kind),
            weight,
            next,
        };

        let states = vec![
            State {
                kind: "new",
                is_final: false,
                default_next: Some(S_OPT),
                actions: vec![tuple("new-solver", 1, Some(S_OPT))],
            },
            State {
                kind: "opt",
                is_final: false,
                default_next: Some(S_SORTS),
                actions: vec![
                    tuple("set-option", 5, None),
                    tuple(KIND_TRANSITION, 3, Some(S_SORTS)),
                ],
            },
            State {
                kind: "sorts",
                is_final: false,
                default_next: Some(S_INPUTS),
                actions: vec![
                    tuple("mk-sort", 10, None),
                    tuple(KIND_TRANSITION, 5, Some(S_INPUTS)),
                ],
            },
            State {
                kind: "inputs",
                is_final: false,
                default_next: Some(S_TERMS),
                actions: vec![
                    tuple("mk-const", 10, None),
                    tuple("mk-value", 6, None),
                    tuple("mk-special-value", 3, None),
                    tuple("mk-var", 2, None),
                    tuple("mk-sort", 2, None),
                    tuple(KIND_TRANSITION, 5, Some(S_TERMS)),
                ],
            },
            State {
                kind: "terms",
                is_final: false,
                default_next: Some(S_ASSERT),
                actions: vec![
                    tuple("mk-term", 15, None),
                    tuple("mk-const", 2, None),
                    tuple("mk-value", 2, None),
                    tuple("mk-sort", 1, None),
                    tuple(KIND_TRANSITION, 1, Some(S_PUSH_POP)),
                    tuple(KIND_TRANSITION, 5, Some(S_ASSERT)),
                ],
            },
            State {
                kind: "push-pop",
                is_final: false,
                default_next: Some(S_TERMS),
                actions: vec![
                    tuple("push", 5, Some(S_TERMS)),
                    tuple("pop", 5, Some(S_TERMS)),
                ],
            },
            State {
                kind: "assert",
                is_final: false,
                default_next: Some(S_SAT),
                actions: vec![
                    tuple("assert-formula", 10, None),
                    tuple("mk-term", 4, None),
                    tuple("reset-assertions", 1, None),
                    tuple("reset", 1, Some(S_OPT)),
                    tuple(KIND_TRANSITION, 6, Some(S_SAT)),
                ],
            },
            State {
                kind: "sat",
                is_final: false,
                default_next: Some(S_CHECK_SAT_RESULT),
                actions: vec![
                    tuple("check-sat", 10, Some(S_CHECK_SAT_RESULT)),
                    tuple("check-sat-assuming", 5, Some(S_CHECK_SAT_RESULT)),
                    tuple(KIND_TRANSITION, 1, Some(S_CHECK_SAT_RESULT)),
                ],
            },
            State {
                kind: "check-sat-result",
                is_final: false,
                default_next: Some(S_ASSERT),
                actions: vec![
                    tuple(KIND_TRANSITION, 3, Some(S_MODEL)),
                    tuple(KIND_TRANSITION, 3, Some(S_UNSAT)),
                    tuple(KIND_TRANSITION, 6, Some(S_ASSERT)),
                    tuple(KIND_TRANSITION, 1, Some(S_DELETE)),
                ],
            },
            State {
                kind: "model",
                is_final: false,
                default_next: Some(S_ASSERT),
                actions: vec![
                    tuple("get-value", 5, None),
                    tuple("print-model", 3, None),
                    tuple(KIND_TRANSITION, 3, Some(S_ASSERT)),
                ],
            },
            State {
                kind: "unsat",
                is_final: false,
                default_next: Some(S_ASSERT),
                actions: vec![
                    tuple("get-unsat-core", 5, None),
                    tuple("get-unsat-assumptions", 5, None),
                    tuple(KIND_TRANSITION, 3, Some(S_ASSERT)),
                ],
            },
            State {
                kind: "delete",
                is_final: false,
                default_next: Some(S_FINAL),
                actions: vec![tuple("delete-solver", 1, Some(S_FINAL))],
            },
            State {
                kind: "final",
                is_final: true,
                default_next: None,
                actions: Vec::new(),
            },
        ];

        Fsm {
            states,
            cur: S_NEW,
            delete_state: S_DELETE,
        }
    }

    pub fn at_final(&self) -> bool {
        self.states[self.cur].is_final
    }

    pub fn cur_state_kind(&self) -> &'static str {
        self.states[self.cur].kind
    }

    /// Route the machine to the delete state (step-budget exhaustion).
    pub fn force_delete(&mut self) {
        if self.cur != self.delete_state && !self.at_final() {
            self.cur = self.delete_state;
        }
    }

    fn transition(&mut self, target: StateId, mgr: &mut SolverManager) {
        if target == self.cur {
            return;
        }
        self.cur = target;
        // Entering the assert phase leaves sat mode; this is the one place
        // (besides reset and reset-assertions) that clears assumptions.
        if self.cur == S_ASSERT {
            mgr.reset_sat();
        }
    }

    /// Execute one step: weighted draw over applicable actions, run it,
    /// transition. Returns the trace line of the executed action, if any.
    pub fn step(&mut self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let state = &self.states[self.cur];
        mgr.stats.incr_state(state.kind);

        let applicable: Vec<usize> = state
            .actions
            .iter()
            .enumerate()
            .filter(|(_, t)| t.action.applicable(mgr))
            .map(|(i, _)| i)
            .collect();

        if applicable.is_empty() {
            let target = state.default_next.unwrap_or(self.cur);
            self.transition(target, mgr);
            return Ok(None);
        }

        let weights: Vec<u32> = applicable
            .iter()
            .map(|&i| state.actions[i].weight)
            .collect();
        let picked = applicable[mgr.rng_mut().pick_weighted(&weights)];
        let action = Rc::clone(&state.actions[picked].action);
        let next = state.actions[picked].next;

        mgr.stats.incr_action(action.kind());
        let line = action.run(mgr)?;
        mgr.take_pending_trace();
        if line.is_some() {
            mgr.stats.incr_action_ok(action.kind());
        }

        let target = next.unwrap_or(self.cur);
        self.transition(target, mgr);
        Ok(line)
    }

    /// Render the machine configuration for `--print-fsm`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, state) in self.states.iter().enumerate() {
            let _ = writeln!(
                out,
                "state {}{}{}",
                state.kind,
                if i == S_NEW { " (init)" } else { "" },
                if state.is_final { " (final)" } else { "" },
            );
            for t in &state.actions {
                let next = t
                    .next
                    .map(|n| self.states[n].kind)
                    .unwrap_or(state.kind);
                let _ = writeln!(out, "  [{:>3}] {:<24} -> {}", t.weight, t.action.kind(), next);
            }
            if let Some(d) = state.default_next {
                let _ = writeln!(out, "  default -> {}", self.states[d].kind);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRng;
    use crate::run::RunConfig;
    use shrike_smt::backends::stub::StubSolver;
    use shrike_smt::solver::Solver;

    fn manager(seed: u64) -> SolverManager {
        SolverManager::new(
            Box::new(StubSolver::new()),
            SeededRng::new(seed),
            &RunConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn first_step_creates_the_solver() {
        let registry = ActionRegistry::new();
        let mut fsm = Fsm::build(&registry);
        let mut mgr = manager(1);
        assert_eq!(fsm.cur_state_kind(), "new");
        let line = fsm.step(&mut mgr).unwrap().unwrap();
        assert_eq!(line.kind, "new-solver");
        assert_eq!(fsm.cur_state_kind(), "opt");
        assert!(mgr.solver().is_initialized());
    }

    #[test]
    fn machine_reaches_final_after_forced_delete() {
        let registry = ActionRegistry::new();
        let mut fsm = Fsm::build(&registry);
        let mut mgr = manager(2);
        for _ in 0..20 {
            if fsm.at_final() {
                break;
            }
            fsm.step(&mut mgr).unwrap();
        }
        fsm.force_delete();
        while !fsm.at_final() {
            fsm.step(&mut mgr).unwrap();
        }
        assert!(!mgr.solver().is_initialized());
    }

    #[test]
    fn dead_end_states_fall_through_to_default() {
        let registry = ActionRegistry::new();
        let mut fsm = Fsm::build(&registry);
        let mut mgr = manager(3);
        // Jump straight to push-pop: without incremental mode neither push
        // nor pop applies, so the default successor must be taken.
        fsm.step(&mut mgr).unwrap();
        fsm.cur = S_PUSH_POP;
        let line = fsm.step(&mut mgr).unwrap();
        assert!(line.is_none());
        assert_eq!(fsm.cur_state_kind(), "terms");
    }

    #[test]
    fn render_lists_all_states() {
        let registry = ActionRegistry::new();
        let fsm = Fsm::build(&registry);
        let text = fsm.render();
        for kind in [
            "new", "opt", "sorts", "inputs", "terms", "push-pop", "assert", "sat",
            "check-sat-result", "model", "unsat", "delete", "final",
        ] {
            assert!(text.contains(&format!("state {kind}")), "missing {kind}");
        }
        assert!(text.contains("check-sat"));
    }

    #[test]
    fn same_seed_same_walk() {
        let registry = ActionRegistry::new();
        let mut lines_a = Vec::new();
        let mut lines_b = Vec::new();
        for lines in [&mut lines_a, &mut lines_b] {
            let mut fsm = Fsm::build(&registry);
            let mut mgr = manager(0xfeed);
            for _ in 0..150 {
                if fsm.at_final() {
                    break;
                }
                if let Some(line) = fsm.step(&mut mgr).unwrap() {
                    lines.push(line.render());
                }
            }
        }
        assert_eq!(lines_a, lines_b);
        assert!(!lines_a.is_empty());
    }
}
