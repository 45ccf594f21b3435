//! Solver lifecycle and solving Actions.

use shrike_smt::solver::{SatResult, Solver, SolverError};
use shrike_smt::sort::SortKind;

use crate::actions::{expect_args, lookup_term, parse_u32, parse_usize, Action};
use crate::errors::EngineError;
use crate::manager::SolverManager;
use crate::trace::{Token, TraceLine};
use crate::{MAX_N_ASSUMPTIONS, MAX_N_PUSH_LEVELS, MAX_N_TERMS_GET_VALUE};

pub struct ActionNewSolver;

impl Action for ActionNewSolver {
    fn kind(&self) -> &'static str {
        "new-solver"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        !mgr.solver().is_initialized()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().new_solver()?;
        for (name, value) in mgr.preset_options() {
            mgr.solver_mut()
                .set_opt(&name, &value)
                .map_err(|e| EngineError::Config(format!("preset option {name}={value}: {e}")))?;
            mgr.note_option(&name, &value);
        }
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        self.run(mgr).map(|_| ())
    }
}

pub struct ActionDeleteSolver;

impl Action for ActionDeleteSolver {
    fn kind(&self) -> &'static str {
        "delete-solver"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().delete_solver()?;
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        self.run(mgr).map(|_| ())
    }
}

pub struct ActionSetOption;

impl Action for ActionSetOption {
    fn kind(&self) -> &'static str {
        "set-option"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let Some((name, value)) = mgr.pick_option() else {
            return Ok(None);
        };
        let line = TraceLine::new(self.kind())
            .arg(name.clone())
            .arg(value.clone());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().set_opt(&name, &value)?;
        mgr.note_option(&name, &value);
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 2)?;
        let (name, value) = (&args[0].text, &args[1].text);
        mgr.solver_mut().set_opt(name, value)?;
        mgr.note_option(name, value);
        Ok(())
    }
}

pub struct ActionAssertFormula;

impl Action for ActionAssertFormula {
    fn kind(&self) -> &'static str {
        "assert-formula"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && mgr.has_term_of_kind(SortKind::Bool)
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let Some(term) = mgr.pick_term_of_kind(SortKind::Bool) else {
            return Ok(None);
        };
        let line = TraceLine::new(self.kind()).arg(term.to_string());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().assert_formula(&term)?;
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 1)?;
        let term = lookup_term(mgr, &args[0])?;
        mgr.solver_mut().assert_formula(&term)?;
        Ok(())
    }
}

pub struct ActionCheckSat;

impl Action for ActionCheckSat {
    fn kind(&self) -> &'static str {
        "check-sat"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && (!mgr.sat_called() || mgr.incremental())
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        let result = mgr.solver_mut().check_sat()?;
        mgr.report_sat(result);
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        let result = mgr.solver_mut().check_sat()?;
        mgr.report_sat(result);
        Ok(())
    }
}

pub struct ActionCheckSatAssuming;

impl Action for ActionCheckSatAssuming {
    fn kind(&self) -> &'static str {
        "check-sat-assuming"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
            && (!mgr.sat_called() || mgr.incremental())
            && mgr.has_term_of_kind_at(SortKind::Bool, 0)
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let n = mgr.rng_mut().pick_usize(1, MAX_N_ASSUMPTIONS);
        let mut assumptions = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(term) = mgr.pick_assumption() else {
                return Ok(None);
            };
            assumptions.push(term);
        }
        let mut line = TraceLine::new(self.kind()).arg(assumptions.len().to_string());
        for t in &assumptions {
            line = line.arg(t.to_string());
        }
        mgr.set_pending_trace(line.clone());
        let result = mgr.solver_mut().check_sat_assuming(&assumptions)?;
        mgr.report_sat(result);
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        if args.is_empty() {
            return Err(EngineError::Config(
                "check-sat-assuming needs an assumption count".to_string(),
            ));
        }
        let n = parse_usize(self.kind(), &args[0])?;
        expect_args(self.kind(), args, 1 + n)?;
        let mut assumptions = Vec::with_capacity(n);
        for token in &args[1..] {
            let term = lookup_term(mgr, token)?;
            mgr.record_assumption(term.clone());
            assumptions.push(term);
        }
        let result = mgr.solver_mut().check_sat_assuming(&assumptions)?;
        mgr.report_sat(result);
        Ok(())
    }
}

pub struct ActionGetUnsatAssumptions;

impl Action for ActionGetUnsatAssumptions {
    fn kind(&self) -> &'static str {
        "get-unsat-assumptions"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
            && mgr.unsat_assumptions()
            && mgr.sat_called()
            && mgr.sat_result() == SatResult::Unsat
            && mgr.has_assumed()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        let failed = mgr.solver_mut().get_unsat_assumptions()?;
        for term in &failed {
            if !mgr.is_assumed(term) {
                return Err(EngineError::Solver(SolverError::Backend(format!(
                    "get-unsat-assumptions returned non-assumption {term}"
                ))));
            }
        }
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        let _ = mgr.solver_mut().get_unsat_assumptions()?;
        Ok(())
    }
}

pub struct ActionGetUnsatCore;

impl Action for ActionGetUnsatCore {
    fn kind(&self) -> &'static str {
        "get-unsat-core"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
            && mgr.unsat_cores()
            && mgr.sat_called()
            && mgr.sat_result() == SatResult::Unsat
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        let _ = mgr.solver_mut().get_unsat_core()?;
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        let _ = mgr.solver_mut().get_unsat_core()?;
        Ok(())
    }
}

pub struct ActionGetValue;

impl ActionGetValue {
    fn value_kinds(mgr: &SolverManager) -> Vec<SortKind> {
        let unsupported = mgr.solver().unsupported_get_value_sort_kinds();
        mgr.enabled_sort_kinds()
            .iter()
            .copied()
            .filter(|k| !unsupported.contains(k))
            .collect()
    }
}

impl Action for ActionGetValue {
    fn kind(&self) -> &'static str {
        "get-value"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
            && mgr.model_gen()
            && mgr.sat_called()
            && mgr.sat_result() == SatResult::Sat
            && Self::value_kinds(mgr)
                .iter()
                .any(|&k| mgr.has_term_of_kind(k))
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let kinds: Vec<SortKind> = Self::value_kinds(mgr)
            .into_iter()
            .filter(|&k| mgr.has_term_of_kind(k))
            .collect();
        if kinds.is_empty() {
            return Ok(None);
        }
        let n = mgr.rng_mut().pick_usize(1, MAX_N_TERMS_GET_VALUE);
        let mut terms = Vec::with_capacity(n);
        for _ in 0..n {
            let kind = *mgr.rng_mut().pick_from_slice(&kinds);
            let Some(term) = mgr.pick_term_of_kind(kind) else {
                return Ok(None);
            };
            terms.push(term);
        }
        let mut line = TraceLine::new(self.kind()).arg(terms.len().to_string());
        for t in &terms {
            line = line.arg(t.to_string());
        }
        mgr.set_pending_trace(line.clone());
        let values = mgr.solver_mut().get_value(&terms)?;
        if values.len() != terms.len() {
            return Err(EngineError::Solver(SolverError::Backend(format!(
                "get-value returned {} values for {} terms",
                values.len(),
                terms.len()
            ))));
        }
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        if args.is_empty() {
            return Err(EngineError::Config("get-value needs a term count".into()));
        }
        let n = parse_usize(self.kind(), &args[0])?;
        expect_args(self.kind(), args, 1 + n)?;
        let mut terms = Vec::with_capacity(n);
        for token in &args[1..] {
            terms.push(lookup_term(mgr, token)?);
        }
        let _ = mgr.solver_mut().get_value(&terms)?;
        Ok(())
    }
}

pub struct ActionPush;

impl Action for ActionPush {
    fn kind(&self) -> &'static str {
        "push"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && mgr.incremental()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let n = mgr.rng_mut().pick_u32(1, MAX_N_PUSH_LEVELS);
        let line = TraceLine::new(self.kind()).arg(n.to_string());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().push(n)?;
        mgr.push_levels(n);
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 1)?;
        let n = parse_u32(self.kind(), &args[0])?;
        mgr.solver_mut().push(n)?;
        mgr.push_levels(n);
        Ok(())
    }
}

pub struct ActionPop;

impl Action for ActionPop {
    fn kind(&self) -> &'static str {
        "pop"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && mgr.incremental() && mgr.n_push_levels() > 0
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let max = mgr.n_push_levels().min(MAX_N_PUSH_LEVELS);
        let n = mgr.rng_mut().pick_u32(1, max);
        let line = TraceLine::new(self.kind()).arg(n.to_string());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().pop(n)?;
        mgr.pop_levels(n);
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 1)?;
        let n = parse_u32(self.kind(), &args[0])?;
        mgr.solver_mut().pop(n)?;
        mgr.pop_levels(n);
        Ok(())
    }
}

pub struct ActionReset;

impl Action for ActionReset {
    fn kind(&self) -> &'static str {
        "reset"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().reset()?;
        mgr.reset();
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        mgr.solver_mut().reset()?;
        mgr.reset();
        Ok(())
    }
}

pub struct ActionResetAssertions;

impl Action for ActionResetAssertions {
    fn kind(&self) -> &'static str {
        "reset-assertions"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        mgr.solver_mut().reset_assertions()?;
        mgr.reset_assertions_state();
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        mgr.solver_mut().reset_assertions()?;
        mgr.reset_assertions_state();
        Ok(())
    }
}

pub struct ActionPrintModel;

impl Action for ActionPrintModel {
    fn kind(&self) -> &'static str {
        "print-model"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
            && mgr.model_gen()
            && mgr.sat_called()
            && mgr.sat_result() == SatResult::Sat
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let line = TraceLine::new(self.kind());
        mgr.set_pending_trace(line.clone());
        let _ = mgr.solver_mut().print_model()?;
        Ok(Some(line))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 0)?;
        let _ = mgr.solver_mut().print_model()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRng;
    use crate::run::RunConfig;
    use shrike_smt::backends::stub::StubSolver;

    fn fresh_manager() -> SolverManager {
        SolverManager::new(
            Box::new(StubSolver::new()),
            SeededRng::new(1),
            &RunConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn model_queries_are_inapplicable_in_the_initial_state() {
        // No solver instance, no sat call: every model-dependent action must
        // report itself inapplicable.
        let mgr = fresh_manager();
        assert!(!ActionGetValue.applicable(&mgr));
        assert!(!ActionPrintModel.applicable(&mgr));
        assert!(!ActionGetUnsatCore.applicable(&mgr));
        assert!(!ActionGetUnsatAssumptions.applicable(&mgr));
        assert!(ActionNewSolver.applicable(&mgr));
        assert!(!ActionDeleteSolver.applicable(&mgr));
    }

    #[test]
    fn get_value_stays_inapplicable_without_model_gen() {
        let mut mgr = fresh_manager();
        ActionNewSolver.run(&mut mgr).unwrap();
        ActionCheckSat.run(&mut mgr).unwrap();
        // Sat was called, but produce-models was never enabled.
        assert!(mgr.sat_called());
        assert!(!ActionGetValue.applicable(&mgr));
        mgr.note_option("produce-models", "true");
        // Still needs a term to query.
        assert!(!ActionGetValue.applicable(&mgr));
    }

    #[test]
    fn check_sat_requires_incremental_for_a_second_call() {
        let mut mgr = fresh_manager();
        ActionNewSolver.run(&mut mgr).unwrap();
        assert!(ActionCheckSat.applicable(&mgr));
        ActionCheckSat.run(&mut mgr).unwrap();
        assert!(!ActionCheckSat.applicable(&mgr));
        mgr.note_option("incremental", "true");
        assert!(ActionCheckSat.applicable(&mgr));
    }

    #[test]
    fn push_pop_track_scope_depth() {
        let mut mgr = fresh_manager();
        ActionNewSolver.run(&mut mgr).unwrap();
        assert!(!ActionPush.applicable(&mgr));
        mgr.note_option("incremental", "true");
        assert!(ActionPush.applicable(&mgr));
        assert!(!ActionPop.applicable(&mgr));

        let line = ActionPush.run(&mut mgr).unwrap().unwrap();
        let n: u32 = line.args[0].parse().unwrap();
        assert_eq!(mgr.n_push_levels(), n);
        assert!(ActionPop.applicable(&mgr));
        let line = ActionPop.run(&mut mgr).unwrap().unwrap();
        let m: u32 = line.args[0].parse().unwrap();
        assert_eq!(mgr.n_push_levels(), n - m);
    }

    #[test]
    fn set_option_records_toggles() {
        let mut mgr = fresh_manager();
        ActionNewSolver.run(&mut mgr).unwrap();
        for _ in 0..16 {
            if ActionSetOption.run(&mut mgr).unwrap().is_some() {
                break;
            }
        }
        assert!(!mgr.used_options().is_empty());
    }

    #[test]
    fn run_and_untrace_produce_matching_verdicts() {
        let mut mgr = fresh_manager();
        ActionNewSolver.run(&mut mgr).unwrap();
        ActionCheckSat.run(&mut mgr).unwrap();
        let recorded = mgr.verdicts().to_vec();

        let mut replay = fresh_manager();
        ActionNewSolver.untrace(&mut replay, &[], &[]).unwrap();
        ActionCheckSat.untrace(&mut replay, &[], &[]).unwrap();
        assert_eq!(replay.verdicts(), recorded.as_slice());
    }
}
