//! The solver manager: owns the RNG, the solver under test, and the sort
//! and term databases, and provides the typed sampling primitives Actions
//! consume.

use indexmap::{IndexMap, IndexSet};

use shrike_smt::op::{self, OpKind, OpKindManager};
use shrike_smt::options::SolverOption;
use shrike_smt::solver::{SatResult, Solver};
use shrike_smt::sort::{Sort, SortKind};
use shrike_smt::term::Term;
use shrike_smt::theory::Theory;

use crate::errors::EngineError;
use crate::options as opt_fuzz;
use crate::rng::SeededRng;
use crate::run::RunConfig;
use crate::stats::Stats;
use crate::term_db::TermDb;
use crate::trace::TraceLine;
use crate::MAX_SYMBOL_LEN;

pub struct SolverManager {
    rng: SeededRng,
    solver: Box<dyn Solver>,
    op_mgr: OpKindManager,
    enabled_theories: IndexSet<Theory>,
    /// Sort kinds available for `mk-sort`, derived from the enabled theories.
    enabled_sort_kinds: IndexSet<SortKind>,
    sorts: IndexSet<Sort>,
    kind_to_sorts: IndexMap<SortKind, IndexSet<Sort>>,
    term_db: TermDb,
    assumptions: IndexSet<Term>,
    string_char_values: IndexSet<Term>,
    option_table: Vec<SolverOption>,
    used_options: IndexSet<String>,
    preset_options: Vec<(String, String)>,
    simple_symbols: bool,
    arith_linear: bool,
    n_sorts: u64,
    n_symbols: u64,
    n_push_levels: u32,
    sat_called: bool,
    sat_result: SatResult,
    n_sat_calls: u64,
    incremental: bool,
    model_gen: bool,
    unsat_assumptions: bool,
    unsat_cores: bool,
    untraced_sorts: IndexMap<u64, Sort>,
    untraced_terms: IndexMap<u64, Term>,
    verdicts: Vec<SatResult>,
    /// Line of the action currently invoking the solver. When the call
    /// fails this is what goes into the preserved trace, so a reproducer
    /// always contains its failing step.
    pending_trace: Option<TraceLine>,
    pub stats: Stats,
}

fn sort_kinds_of(theory: Theory) -> &'static [SortKind] {
    match theory {
        Theory::Array => &[SortKind::Array],
        Theory::Bag => &[SortKind::Bag],
        Theory::Bool => &[SortKind::Bool],
        Theory::Bv => &[SortKind::Bv],
        Theory::Datatype => &[SortKind::Datatype],
        Theory::Fp => &[SortKind::Fp, SortKind::Rm],
        Theory::Int => &[SortKind::Int],
        Theory::Real => &[SortKind::Real],
        Theory::Seq => &[SortKind::Seq],
        Theory::Set => &[SortKind::Set],
        Theory::String => &[SortKind::String, SortKind::RegLan],
        Theory::Uf => &[SortKind::Fun],
        Theory::Quant | Theory::Transcendental => &[],
    }
}

impl SolverManager {
    pub fn new(
        solver: Box<dyn Solver>,
        rng: SeededRng,
        config: &RunConfig,
    ) -> Result<Self, EngineError> {
        let solver_theories: IndexSet<Theory> = solver.supported_theories().into_iter().collect();

        let mut requested: IndexSet<Theory> = if config.enabled_theories.is_empty() {
            Theory::ALL
                .iter()
                .copied()
                .filter(|t| !config.disabled_theories.contains(t))
                .collect()
        } else {
            let mut set: IndexSet<Theory> = config.enabled_theories.iter().copied().collect();
            set.insert(Theory::Bool);
            set
        };
        requested.retain(|t| solver_theories.contains(t));
        if requested.is_empty() {
            return Err(EngineError::Config(format!(
                "no enabled theory is supported by solver `{}`",
                solver.name()
            )));
        }

        let mut enabled_sort_kinds = IndexSet::new();
        for &theory in &requested {
            enabled_sort_kinds.extend(sort_kinds_of(theory).iter().copied());
        }

        let op_mgr = OpKindManager::new(&requested, &solver.unsupported_op_kinds());

        // The four standard toggles are always fuzzable; the back-end's own
        // table joins in with --fuzz-opts, restricted by the wildcard list.
        let mut option_table = vec![
            SolverOption::bool_opt(solver.option_name_incremental()),
            SolverOption::bool_opt(solver.option_name_model_gen()),
            SolverOption::bool_opt(solver.option_name_unsat_assumptions()),
            SolverOption::bool_opt(solver.option_name_unsat_cores()),
        ];
        if config.fuzz_options {
            option_table.extend(
                solver
                    .option_table()
                    .into_iter()
                    .filter(|o| opt_fuzz::matches_filter(&o.name, &config.fuzz_options_filter)),
            );
        }

        Ok(SolverManager {
            rng,
            solver,
            op_mgr,
            enabled_theories: requested,
            enabled_sort_kinds,
            sorts: IndexSet::new(),
            kind_to_sorts: IndexMap::new(),
            term_db: TermDb::new(),
            assumptions: IndexSet::new(),
            string_char_values: IndexSet::new(),
            option_table,
            used_options: IndexSet::new(),
            preset_options: config.preset_options.clone(),
            simple_symbols: config.simple_symbols,
            arith_linear: config.arith_linear,
            n_sorts: 0,
            n_symbols: 0,
            n_push_levels: 0,
            sat_called: false,
            sat_result: SatResult::Unknown,
            n_sat_calls: 0,
            incremental: false,
            model_gen: false,
            unsat_assumptions: false,
            unsat_cores: false,
            untraced_sorts: IndexMap::new(),
            untraced_terms: IndexMap::new(),
            verdicts: Vec::new(),
            pending_trace: None,
            stats: Stats::default(),
        })
    }

    /* ---------------------------------------------------------------- */
    /* Accessors                                                        */
    /* ---------------------------------------------------------------- */

    pub fn solver(&self) -> &dyn Solver {
        self.solver.as_ref()
    }

    pub fn solver_mut(&mut self) -> &mut dyn Solver {
        self.solver.as_mut()
    }

    pub fn rng_mut(&mut self) -> &mut SeededRng {
        &mut self.rng
    }

    pub fn op_mgr(&self) -> &OpKindManager {
        &self.op_mgr
    }

    pub fn enabled_theories(&self) -> &IndexSet<Theory> {
        &self.enabled_theories
    }

    pub fn enabled_sort_kinds(&self) -> &IndexSet<SortKind> {
        &self.enabled_sort_kinds
    }

    pub fn preset_options(&self) -> Vec<(String, String)> {
        self.preset_options.clone()
    }

    pub fn arith_linear(&self) -> bool {
        self.arith_linear
    }

    pub fn n_sorts(&self) -> u64 {
        self.n_sorts
    }

    pub fn n_terms(&self) -> u64 {
        self.term_db.n_terms()
    }

    pub fn n_push_levels(&self) -> u32 {
        self.n_push_levels
    }

    pub fn sat_called(&self) -> bool {
        self.sat_called
    }

    pub fn sat_result(&self) -> SatResult {
        self.sat_result
    }

    pub fn n_sat_calls(&self) -> u64 {
        self.n_sat_calls
    }

    pub fn incremental(&self) -> bool {
        self.incremental
    }

    pub fn model_gen(&self) -> bool {
        self.model_gen
    }

    pub fn unsat_assumptions(&self) -> bool {
        self.unsat_assumptions
    }

    pub fn unsat_cores(&self) -> bool {
        self.unsat_cores
    }

    pub fn verdicts(&self) -> &[SatResult] {
        &self.verdicts
    }

    pub fn set_pending_trace(&mut self, line: TraceLine) {
        self.pending_trace = Some(line);
    }

    pub fn take_pending_trace(&mut self) -> Option<TraceLine> {
        self.pending_trace.take()
    }

    /* ---------------------------------------------------------------- */
    /* Sort database                                                    */
    /* ---------------------------------------------------------------- */

    /// Intern a sort under the given kind, assigning an id on first sight.
    pub fn add_sort(&mut self, sort: Sort, kind: SortKind) -> Sort {
        if sort.kind() == SortKind::Any {
            sort.set_kind(kind);
        }
        let interned = if let Some(existing) = self.sorts.get(&sort) {
            existing.clone()
        } else {
            self.n_sorts += 1;
            sort.set_id(self.n_sorts);
            self.sorts.insert(sort.clone());
            sort
        };
        self.kind_to_sorts
            .entry(kind)
            .or_default()
            .insert(interned.clone());
        interned
    }

    pub fn find_sort(&self, sort: &Sort) -> Option<Sort> {
        self.sorts.get(sort).cloned()
    }

    pub fn sorts(&self) -> &IndexSet<Sort> {
        &self.sorts
    }

    pub fn has_sort(&self) -> bool {
        !self.sorts.is_empty()
    }

    pub fn has_sort_of_kind(&self, kind: SortKind) -> bool {
        if kind == SortKind::Any {
            return self.has_sort();
        }
        self.kind_to_sorts
            .get(&kind)
            .is_some_and(|sorts| !sorts.is_empty())
    }

    pub fn has_sort_excluding(&self, exclude: &[SortKind]) -> bool {
        self.sorts.iter().any(|s| !exclude.contains(&s.kind()))
    }

    pub fn has_sort_bv(&self, bw: u32) -> bool {
        self.sorts.iter().any(|s| s.is_bv() && s.bv_size() == bw)
    }

    pub fn has_sort_bv_max(&self, bw_max: u32) -> bool {
        self.sorts
            .iter()
            .any(|s| s.is_bv() && s.bv_size() <= bw_max)
    }

    pub fn pick_sort(&mut self) -> Option<Sort> {
        if self.sorts.is_empty() {
            return None;
        }
        Some(self.rng.pick_from_set(&self.sorts).clone())
    }

    /// Random sort of the given kind; `Any` first picks a kind.
    pub fn pick_sort_of_kind(&mut self, kind: SortKind, with_terms: bool) -> Option<Sort> {
        let kind = if kind == SortKind::Any {
            self.pick_sort_kind(with_terms)?
        } else {
            kind
        };
        if with_terms {
            self.term_db.pick_sort_with_terms(&mut self.rng, kind)
        } else {
            let sorts = self.kind_to_sorts.get(&kind)?;
            if sorts.is_empty() {
                return None;
            }
            Some(self.rng.pick_from_set(sorts).clone())
        }
    }

    pub fn pick_sort_excluding(&mut self, exclude: &[SortKind], with_terms: bool) -> Option<Sort> {
        let candidates: Vec<Sort> = self
            .sorts
            .iter()
            .filter(|s| !exclude.contains(&s.kind()))
            .filter(|s| !with_terms || self.term_db.has_term_of_sort(s))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.pick_index(candidates.len())].clone())
    }

    /// BV sort of exactly the given width; interning guarantees at most one.
    pub fn pick_sort_bv(&mut self, bw: u32, with_terms: bool) -> Option<Sort> {
        let pool: Vec<Sort> = if with_terms {
            self.term_db.sorts_with_terms().into_iter().collect()
        } else {
            self.sorts.iter().cloned().collect()
        };
        pool.into_iter().find(|s| s.is_bv() && s.bv_size() == bw)
    }

    pub fn pick_sort_bv_max(&mut self, bw_max: u32, with_terms: bool) -> Option<Sort> {
        let pool: Vec<Sort> = if with_terms {
            self.term_db.sorts_with_terms().into_iter().collect()
        } else {
            self.sorts.iter().cloned().collect()
        };
        let candidates: Vec<Sort> = pool
            .into_iter()
            .filter(|s| s.is_bv() && s.bv_size() <= bw_max)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.pick_index(candidates.len())].clone())
    }

    /// Pick among instantiated sort kinds (optionally only those that have
    /// terms already).
    pub fn pick_sort_kind(&mut self, with_terms: bool) -> Option<SortKind> {
        let kinds: IndexSet<SortKind> = if with_terms {
            self.term_db.kinds_with_terms()
        } else {
            self.kind_to_sorts
                .iter()
                .filter(|(_, sorts)| !sorts.is_empty())
                .map(|(k, _)| *k)
                .collect()
        };
        if kinds.is_empty() {
            return None;
        }
        Some(*self.rng.pick_from_set(&kinds))
    }

    /* ---------------------------------------------------------------- */
    /* Term database                                                    */
    /* ---------------------------------------------------------------- */

    pub fn add_input(&mut self, term: Term, sort: Sort) -> Term {
        self.term_db.add_input(term, sort)
    }

    pub fn add_value(&mut self, term: Term, sort: Sort) -> Term {
        term.set_is_value(true);
        self.term_db.add_input(term, sort)
    }

    pub fn add_string_char_value(&mut self, term: Term) {
        self.string_char_values.insert(term);
    }

    pub fn add_var(&mut self, term: Term, sort: Sort) -> Term {
        self.term_db.add_var(term, sort)
    }

    pub fn remove_var(&mut self, var: &Term) {
        self.term_db.remove_var(var);
    }

    /// Register an operation result: resolve and intern its sort, then file
    /// the term at the level induced by its arguments.
    pub fn add_term(
        &mut self,
        term: Term,
        sort_kind: SortKind,
        args: &[Term],
    ) -> Result<(Term, Sort), EngineError> {
        let fresh = self.solver.sort_of(&term, sort_kind)?;
        let kind = if fresh.kind() == SortKind::Any {
            sort_kind
        } else {
            fresh.kind()
        };
        let sort = self.add_sort(fresh, kind);
        let term = self.term_db.add_term(term, sort.clone(), args);
        Ok((term, sort))
    }

    pub fn has_term(&self) -> bool {
        self.term_db.has_term()
    }

    pub fn has_term_of_kind(&self, kind: SortKind) -> bool {
        self.term_db.has_term_of_kind(kind)
    }

    pub fn has_term_of_kind_at(&self, kind: SortKind, level: usize) -> bool {
        self.term_db.has_term_of_kind_at(kind, level)
    }

    pub fn has_term_of_sort(&self, sort: &Sort) -> bool {
        self.term_db.has_term_of_sort(sort)
    }

    pub fn has_value_of_sort(&self, sort: &Sort) -> bool {
        self.term_db.has_value_of_sort(sort)
    }

    pub fn has_var(&self) -> bool {
        self.term_db.has_var()
    }

    pub fn has_quant_body(&self) -> bool {
        self.term_db.has_quant_body()
    }

    pub fn has_string_char_value(&self) -> bool {
        !self.string_char_values.is_empty()
    }

    pub fn pick_term_of_sort(&mut self, sort: &Sort) -> Option<Term> {
        self.term_db.pick_term_of_sort(&mut self.rng, sort)
    }

    pub fn pick_term_of_kind(&mut self, kind: SortKind) -> Option<Term> {
        self.term_db.pick_term_of_kind(&mut self.rng, kind)
    }

    pub fn pick_term_of_kind_at(&mut self, kind: SortKind, level: usize) -> Option<Term> {
        self.term_db.pick_term_of_kind_at(&mut self.rng, kind, level)
    }

    pub fn pick_term(&mut self) -> Option<Term> {
        self.term_db.pick_term(&mut self.rng)
    }

    pub fn pick_var(&mut self) -> Option<Term> {
        if !self.term_db.has_var() {
            return None;
        }
        Some(self.term_db.pick_var(&mut self.rng))
    }

    pub fn pick_value_of_sort(&mut self, sort: &Sort) -> Option<Term> {
        self.term_db.pick_value_of_sort(&mut self.rng, sort)
    }

    pub fn pick_quant_body(&mut self) -> Option<Term> {
        self.term_db.pick_quant_body(&mut self.rng)
    }

    pub fn pick_string_char_value(&mut self) -> Option<Term> {
        if self.string_char_values.is_empty() {
            return None;
        }
        Some(self.rng.pick_from_set(&self.string_char_values).clone())
    }

    /// Pick a level-0 Bool term and record it as an assumption.
    pub fn pick_assumption(&mut self) -> Option<Term> {
        let term = self
            .term_db
            .pick_term_of_kind_at(&mut self.rng, SortKind::Bool, 0)?;
        self.assumptions.insert(term.clone());
        Some(term)
    }

    /// Mirror an assumption observed during replay.
    pub fn record_assumption(&mut self, term: Term) {
        self.assumptions.insert(term);
    }

    pub fn pick_assumed_assumption(&mut self) -> Option<Term> {
        if self.assumptions.is_empty() {
            return None;
        }
        Some(self.rng.pick_from_set(&self.assumptions).clone())
    }

    pub fn has_assumed(&self) -> bool {
        !self.assumptions.is_empty()
    }

    pub fn is_assumed(&self, term: &Term) -> bool {
        self.assumptions.contains(term)
    }

    /* ---------------------------------------------------------------- */
    /* Operators and options                                            */
    /* ---------------------------------------------------------------- */

    /// Pick an operator kind. With `with_terms`, restrict to operators
    /// whose argument sort kinds already have terms; the theory is drawn
    /// first so theories with many operators are not favored.
    pub fn pick_op_kind(&mut self, with_terms: bool) -> Option<OpKind> {
        if self.op_mgr.ops().is_empty() {
            return None;
        }
        if !with_terms {
            return Some(*self.rng.pick_from_map(self.op_mgr.ops()));
        }

        let mut by_theory: IndexMap<Theory, IndexSet<OpKind>> = IndexMap::new();
        for (&kind, op) in self.op_mgr.ops() {
            if (kind == op::OP_FORALL || kind == op::OP_EXISTS)
                && (!self.term_db.has_var() || !self.term_db.has_quant_body())
            {
                continue;
            }
            let available = match kind {
                op::OP_ARRAY_SELECT | op::OP_ARRAY_STORE => {
                    self.term_db.has_term_of_kind(SortKind::Array)
                }
                op::OP_UF_APPLY => self.term_db.has_term_of_kind(SortKind::Fun),
                op::OP_FORALL | op::OP_EXISTS => true,
                _ => (0..op.min_arity()).all(|i| {
                    let arg_kind = op.arg_sort_at(i);
                    match arg_kind {
                        SortKind::Any => self.term_db.has_term(),
                        SortKind::Real if self.solver.supports_arith_subtyping() => {
                            self.term_db.has_term_of_kind(SortKind::Real)
                                || self.term_db.has_term_of_kind(SortKind::Int)
                        }
                        k => self.term_db.has_term_of_kind(k),
                    }
                }),
            };
            if available {
                by_theory.entry(op.theory).or_default().insert(kind);
            }
        }
        if by_theory.is_empty() {
            return None;
        }
        let theory = *self.rng.pick_from_map(&by_theory);
        let kinds = &by_theory[&theory];
        Some(*self.rng.pick_from_set(kinds))
    }

    /// Pick a not-yet-conflicting, dependency-satisfied option and a value.
    pub fn pick_option(&mut self) -> Option<(String, String)> {
        let mut candidates = Vec::new();
        for (i, option) in self.option_table.iter().enumerate() {
            if option
                .conflicts
                .iter()
                .any(|c| self.used_options.contains(c))
            {
                continue;
            }
            if !option.depends.iter().all(|d| self.used_options.contains(d)) {
                continue;
            }
            candidates.push(i);
        }
        if candidates.is_empty() {
            return None;
        }
        let index = candidates[self.rng.pick_index(candidates.len())];
        let option = self.option_table[index].clone();
        let value = opt_fuzz::pick_value(&mut self.rng, &option);
        Some((option.name, value))
    }

    /// Record a successfully applied option and update the feature toggles.
    pub fn note_option(&mut self, name: &str, value: &str) {
        self.used_options.insert(name.to_string());
        let on = value == "true";
        if name == self.solver.option_name_incremental() {
            self.incremental = on;
        } else if name == self.solver.option_name_model_gen() {
            self.model_gen = on;
        } else if name == self.solver.option_name_unsat_assumptions() {
            self.unsat_assumptions = on;
        } else if name == self.solver.option_name_unsat_cores() {
            self.unsat_cores = on;
        }
    }

    pub fn used_options(&self) -> &IndexSet<String> {
        &self.used_options
    }

    /* ---------------------------------------------------------------- */
    /* Symbols                                                          */
    /* ---------------------------------------------------------------- */

    pub fn pick_symbol(&mut self) -> String {
        if self.simple_symbols {
            let symbol = format!("_x{}", self.n_symbols);
            self.n_symbols += 1;
            return symbol;
        }
        let len = self.rng.pick_usize(0, MAX_SYMBOL_LEN);
        if len > 0 && self.rng.flip_coin() {
            self.rng.pick_piped_symbol(len)
        } else {
            self.rng.pick_simple_symbol(len)
        }
    }

    /* ---------------------------------------------------------------- */
    /* Scope and sat state                                              */
    /* ---------------------------------------------------------------- */

    pub fn push_levels(&mut self, n: u32) {
        self.term_db.push(n);
        self.n_push_levels += n;
    }

    pub fn pop_levels(&mut self, n: u32) {
        let n = n.min(self.n_push_levels);
        self.term_db.pop(n);
        self.n_push_levels -= n;
    }

    pub fn report_sat(&mut self, result: SatResult) {
        self.sat_called = true;
        self.sat_result = result;
        self.n_sat_calls += 1;
        self.verdicts.push(result);
        self.stats.incr_result(result);
    }

    /// Leave sat mode; assumptions are cleared here and only here.
    pub fn reset_sat(&mut self) {
        if self.sat_called {
            self.assumptions.clear();
        }
        self.sat_called = false;
    }

    /// State change for `reset-assertions`: all scopes are discarded.
    pub fn reset_assertions_state(&mut self) {
        let levels = self.n_push_levels;
        self.pop_levels(levels);
        self.reset_sat();
    }

    /// Full reset: discard every database and option record.
    pub fn reset(&mut self) {
        self.sorts.clear();
        self.kind_to_sorts.clear();
        self.term_db.clear();
        self.assumptions.clear();
        self.string_char_values.clear();
        self.used_options.clear();
        self.untraced_sorts.clear();
        self.untraced_terms.clear();
        self.n_sorts = 0;
        self.n_symbols = 0;
        self.n_push_levels = 0;
        self.sat_called = false;
        self.sat_result = SatResult::Unknown;
        self.incremental = false;
        self.model_gen = false;
        self.unsat_assumptions = false;
        self.unsat_cores = false;
    }

    /* ---------------------------------------------------------------- */
    /* Untrace id bookkeeping                                           */
    /* ---------------------------------------------------------------- */

    pub fn register_sort(&mut self, untraced_id: u64, sort: Sort) {
        self.untraced_sorts.entry(untraced_id).or_insert(sort);
    }

    pub fn register_term(&mut self, untraced_id: u64, term: Term) {
        self.untraced_terms.entry(untraced_id).or_insert(term);
    }

    pub fn get_untraced_sort(&self, id: u64) -> Option<Sort> {
        self.untraced_sorts.get(&id).cloned()
    }

    pub fn get_untraced_term(&self, id: u64) -> Option<Term> {
        self.untraced_terms.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrike_smt::backends::stub::StubSolver;

    fn manager(seed: u64) -> SolverManager {
        let config = RunConfig::default();
        SolverManager::new(Box::new(StubSolver::new()), SeededRng::new(seed), &config).unwrap()
    }

    fn init_manager(seed: u64) -> SolverManager {
        let mut mgr = manager(seed);
        mgr.solver_mut().new_solver().unwrap();
        mgr
    }

    fn add_bv_sort(mgr: &mut SolverManager, width: u32) -> Sort {
        let sort = mgr.solver_mut().mk_sort_bv(width).unwrap();
        mgr.add_sort(sort, SortKind::Bv)
    }

    #[test]
    fn theories_intersect_with_solver_support() {
        let mgr = manager(1);
        // The stub supports Bool and Bv only.
        assert_eq!(mgr.enabled_theories().len(), 2);
        assert!(mgr.enabled_theories().contains(&Theory::Bool));
        assert!(mgr.enabled_theories().contains(&Theory::Bv));
        assert!(mgr.enabled_sort_kinds().contains(&SortKind::Bv));
        assert!(!mgr.enabled_sort_kinds().contains(&SortKind::Int));
    }

    #[test]
    fn explicit_theory_selection_keeps_bool() {
        let config = RunConfig {
            enabled_theories: vec![Theory::Bv],
            ..RunConfig::default()
        };
        let mgr =
            SolverManager::new(Box::new(StubSolver::new()), SeededRng::new(1), &config).unwrap();
        assert!(mgr.enabled_theories().contains(&Theory::Bool));
    }

    #[test]
    fn sort_interning_assigns_dense_ids() {
        let mut mgr = init_manager(2);
        let s8 = add_bv_sort(&mut mgr, 8);
        let s8_again = add_bv_sort(&mut mgr, 8);
        let s16 = add_bv_sort(&mut mgr, 16);
        assert_eq!(s8.id(), 1);
        assert_eq!(s8_again.id(), 1);
        assert_eq!(s16.id(), 2);
        assert_eq!(mgr.n_sorts(), 2);
        assert!(mgr.has_sort_of_kind(SortKind::Bv));
        assert!(!mgr.has_sort_of_kind(SortKind::Bool));
    }

    #[test]
    fn pick_sort_respects_constraints() {
        let mut mgr = init_manager(3);
        let bv = add_bv_sort(&mut mgr, 4);
        let bool_sort = mgr.solver_mut().mk_sort(SortKind::Bool).unwrap();
        let bool_sort = mgr.add_sort(bool_sort, SortKind::Bool);

        for _ in 0..10 {
            let s = mgr.pick_sort_of_kind(SortKind::Bv, false).unwrap();
            assert_eq!(s, bv);
        }
        let excluded = mgr.pick_sort_excluding(&[SortKind::Bv], false).unwrap();
        assert_eq!(excluded, bool_sort);
        assert!(mgr.pick_sort_bv_max(2, false).is_none());
        assert_eq!(mgr.pick_sort_bv_max(8, false).unwrap(), bv);
        assert!(mgr.has_sort_bv(4));
        assert!(!mgr.has_sort_bv(5));
        assert_eq!(mgr.pick_sort_bv(4, false).unwrap(), bv);
        assert!(mgr.pick_sort_bv(4, true).is_none());
    }

    #[test]
    fn assumptions_clear_on_reset_sat_only_after_sat() {
        let mut mgr = init_manager(4);
        let bool_sort = mgr.solver_mut().mk_sort(SortKind::Bool).unwrap();
        let bool_sort = mgr.add_sort(bool_sort, SortKind::Bool);
        let c = mgr.solver_mut().mk_const(&bool_sort, "_x0").unwrap();
        mgr.add_input(c, bool_sort);

        let a = mgr.pick_assumption().unwrap();
        assert!(mgr.is_assumed(&a));

        // Without an intervening sat call the set persists.
        mgr.reset_sat();
        assert!(mgr.has_assumed());

        mgr.report_sat(SatResult::Sat);
        mgr.reset_sat();
        assert!(!mgr.has_assumed());
        assert!(!mgr.sat_called());
    }

    #[test]
    fn used_options_survive_reset_sat_but_not_reset() {
        let mut mgr = init_manager(5);
        mgr.note_option("produce-models", "true");
        assert!(mgr.model_gen());
        mgr.report_sat(SatResult::Sat);
        mgr.reset_sat();
        assert!(mgr.used_options().contains("produce-models"));
        mgr.reset();
        assert!(mgr.used_options().is_empty());
        assert!(!mgr.model_gen());
    }

    #[test]
    fn option_conflicts_and_depends_are_honored() {
        let config = RunConfig {
            fuzz_options: true,
            ..RunConfig::default()
        };
        let mut mgr =
            SolverManager::new(Box::new(StubSolver::new()), SeededRng::new(6), &config).unwrap();
        mgr.solver_mut().new_solver().unwrap();

        // Exhaust picks; verify the invariant on every single one.
        for _ in 0..500 {
            let Some((name, value)) = mgr.pick_option() else {
                break;
            };
            let option = mgr
                .option_table
                .iter()
                .find(|o| o.name == name)
                .cloned()
                .unwrap();
            for conflict in &option.conflicts {
                assert!(
                    !mgr.used_options().contains(conflict),
                    "picked {name} conflicting with set {conflict}"
                );
            }
            for dep in &option.depends {
                assert!(
                    mgr.used_options().contains(dep),
                    "picked {name} with unmet dependency {dep}"
                );
            }
            mgr.solver_mut().set_opt(&name, &value).unwrap();
            mgr.note_option(&name, &value);
        }
    }

    #[test]
    fn pick_op_kind_requires_argument_terms() {
        let mut mgr = init_manager(7);
        assert!(mgr.pick_op_kind(true).is_none());

        let bv = add_bv_sort(&mut mgr, 8);
        let c = mgr.solver_mut().mk_const(&bv, "_x0").unwrap();
        mgr.add_input(c, bv);
        for _ in 0..50 {
            let kind = mgr.pick_op_kind(true).unwrap();
            let op = mgr.op_mgr().get(kind).unwrap();
            // Only BV-argument (or Any-argument) operators can be offered.
            for i in 0..op.min_arity() {
                let k = op.arg_sort_at(i);
                assert!(
                    k == SortKind::Bv || k == SortKind::Any,
                    "op {kind} needs {k} but only BV terms exist"
                );
            }
        }
    }

    #[test]
    fn simple_symbols_are_sequential() {
        let mut mgr = init_manager(8);
        assert_eq!(mgr.pick_symbol(), "_x0");
        assert_eq!(mgr.pick_symbol(), "_x1");
        assert_eq!(mgr.pick_symbol(), "_x2");
    }

    #[test]
    fn untraced_registration_keeps_first_binding() {
        let mut mgr = init_manager(9);
        let s = add_bv_sort(&mut mgr, 8);
        mgr.register_sort(3, s.clone());
        let other = add_bv_sort(&mut mgr, 16);
        mgr.register_sort(3, other);
        assert_eq!(mgr.get_untraced_sort(3).unwrap(), s);
        assert!(mgr.get_untraced_sort(4).is_none());
    }
}
