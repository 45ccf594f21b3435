//! Cross-checking mirror back-end.
//!
//! Wraps a primary and a secondary solver and replays every call on both.
//! At `check_sat`/`check_sat_assuming` the verdicts are compared; a sat vs
//! unsat disagreement surfaces as [`SolverError::CrossCheck`], the
//! wrong-result finding class. Model-dependent queries are answered by the
//! primary solver only.

use std::any::Any;

use indexmap::IndexSet;

use crate::op::OpKind;
use crate::options::SolverOption;
use crate::solver::{SatResult, Solver, SolverError, SpecialValue, Value};
use crate::sort::{Sort, SortHandle, SortKind};
use crate::term::{Term, TermHandle};
use crate::theory::Theory;

#[derive(Debug)]
struct CrossSortHandle {
    a: Sort,
    b: Sort,
}

impl SortHandle for CrossSortHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_key(&self) -> u64 {
        self.a.handle().hash_key()
    }

    fn equals(&self, other: &dyn SortHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<CrossSortHandle>()
            .is_some_and(|o| self.a.handle().equals(o.a.handle()))
    }

    fn render(&self) -> String {
        self.a.handle().render()
    }
}

#[derive(Debug)]
struct CrossTermHandle {
    a: Term,
    b: Term,
}

impl TermHandle for CrossTermHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_key(&self) -> u64 {
        self.a.handle().hash_key()
    }

    fn equals(&self, other: &dyn TermHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<CrossTermHandle>()
            .is_some_and(|o| self.a.handle().equals(o.a.handle()))
    }

    fn render(&self) -> String {
        self.a.handle().render()
    }
}

/// The mirroring back-end.
pub struct CrossCheckSolver {
    primary: Box<dyn Solver>,
    secondary: Box<dyn Solver>,
    last_assumptions: Vec<Term>,
}

impl CrossCheckSolver {
    pub fn new(primary: Box<dyn Solver>, secondary: Box<dyn Solver>) -> Self {
        CrossCheckSolver {
            primary,
            secondary,
            last_assumptions: Vec::new(),
        }
    }

    fn split_sort(sort: &Sort) -> Result<(Sort, Sort), SolverError> {
        sort.handle()
            .as_any()
            .downcast_ref::<CrossSortHandle>()
            .map(|h| (h.a.clone(), h.b.clone()))
            .ok_or_else(|| SolverError::Backend("foreign sort handle".to_string()))
    }

    fn split_term(term: &Term) -> Result<(Term, Term), SolverError> {
        term.handle()
            .as_any()
            .downcast_ref::<CrossTermHandle>()
            .map(|h| (h.a.clone(), h.b.clone()))
            .ok_or_else(|| SolverError::Backend("foreign term handle".to_string()))
    }

    fn split_terms(terms: &[Term]) -> Result<(Vec<Term>, Vec<Term>), SolverError> {
        let mut a = Vec::with_capacity(terms.len());
        let mut b = Vec::with_capacity(terms.len());
        for t in terms {
            let (ta, tb) = Self::split_term(t)?;
            a.push(ta);
            b.push(tb);
        }
        Ok((a, b))
    }

    /// Pair two component sorts into one engine-facing sort, carrying the
    /// primary's kind and attributes.
    fn pair_sort(a: Sort, b: Sort, children: Vec<Sort>) -> Sort {
        let kind = a.kind();
        let handle = Box::new(CrossSortHandle {
            a: a.clone(),
            b,
        });
        match kind {
            SortKind::Bv => Sort::new_bv(a.bv_size(), handle),
            SortKind::Fp => Sort::new_fp(a.fp_exp_size(), a.fp_sig_size(), handle),
            SortKind::Array | SortKind::Fun => Sort::new_with_sorts(kind, children, handle),
            other => Sort::new(other, handle),
        }
    }

    fn pair_term(a: Term, b: Term, sort: Sort) -> Term {
        Term::new(sort, Box::new(CrossTermHandle { a, b }))
    }

    fn compare(&self, ra: SatResult, rb: SatResult) -> Result<SatResult, SolverError> {
        match (ra, rb) {
            (SatResult::Sat, SatResult::Unsat) | (SatResult::Unsat, SatResult::Sat) => {
                Err(SolverError::CrossCheck {
                    primary_name: self.primary.name(),
                    primary: ra,
                    secondary_name: self.secondary.name(),
                    secondary: rb,
                })
            }
            (SatResult::Unknown, other) => Ok(other),
            (other, _) => Ok(other),
        }
    }
}

impl Solver for CrossCheckSolver {
    fn name(&self) -> &'static str {
        "cross-check"
    }

    fn new_solver(&mut self) -> Result<(), SolverError> {
        self.primary.new_solver()?;
        self.secondary.new_solver()
    }

    fn delete_solver(&mut self) -> Result<(), SolverError> {
        self.primary.delete_solver()?;
        self.secondary.delete_solver()
    }

    fn is_initialized(&self) -> bool {
        self.primary.is_initialized()
    }

    fn supported_theories(&self) -> Vec<Theory> {
        let b: IndexSet<Theory> = self.secondary.supported_theories().into_iter().collect();
        self.primary
            .supported_theories()
            .into_iter()
            .filter(|t| b.contains(t))
            .collect()
    }

    fn unsupported_op_kinds(&self) -> Vec<OpKind> {
        let mut out: IndexSet<OpKind> = self.primary.unsupported_op_kinds().into_iter().collect();
        out.extend(self.secondary.unsupported_op_kinds());
        out.into_iter().collect()
    }

    fn unsupported_var_sort_kinds(&self) -> Vec<SortKind> {
        let mut out: IndexSet<SortKind> =
            self.primary.unsupported_var_sort_kinds().into_iter().collect();
        out.extend(self.secondary.unsupported_var_sort_kinds());
        out.into_iter().collect()
    }

    fn bv_width_range(&self) -> (u32, u32) {
        let (a_lo, a_hi) = self.primary.bv_width_range();
        let (b_lo, b_hi) = self.secondary.bv_width_range();
        (a_lo.max(b_lo), a_hi.min(b_hi))
    }

    fn fp_format_pairs(&self) -> Vec<(u32, u32)> {
        let b: IndexSet<(u32, u32)> = self.secondary.fp_format_pairs().into_iter().collect();
        self.primary
            .fp_format_pairs()
            .into_iter()
            .filter(|p| b.contains(p))
            .collect()
    }

    fn supports_arith_subtyping(&self) -> bool {
        self.primary.supports_arith_subtyping() && self.secondary.supports_arith_subtyping()
    }

    fn special_values(&self, kind: SortKind) -> Vec<SpecialValue> {
        let b: IndexSet<SpecialValue> = self.secondary.special_values(kind).into_iter().collect();
        self.primary
            .special_values(kind)
            .into_iter()
            .filter(|v| b.contains(v))
            .collect()
    }

    fn option_table(&self) -> Vec<SolverOption> {
        self.primary.option_table()
    }

    fn mk_sort(&mut self, kind: SortKind) -> Result<Sort, SolverError> {
        let a = self.primary.mk_sort(kind)?;
        let b = self.secondary.mk_sort(kind)?;
        Ok(Self::pair_sort(a, b, Vec::new()))
    }

    fn mk_sort_bv(&mut self, bv_size: u32) -> Result<Sort, SolverError> {
        let a = self.primary.mk_sort_bv(bv_size)?;
        let b = self.secondary.mk_sort_bv(bv_size)?;
        Ok(Self::pair_sort(a, b, Vec::new()))
    }

    fn mk_sort_fp(&mut self, exp: u32, sig: u32) -> Result<Sort, SolverError> {
        let a = self.primary.mk_sort_fp(exp, sig)?;
        let b = self.secondary.mk_sort_fp(exp, sig)?;
        Ok(Self::pair_sort(a, b, Vec::new()))
    }

    fn mk_sort_with_sorts(&mut self, kind: SortKind, sorts: &[Sort]) -> Result<Sort, SolverError> {
        let mut a_parts = Vec::with_capacity(sorts.len());
        let mut b_parts = Vec::with_capacity(sorts.len());
        for s in sorts {
            let (sa, sb) = Self::split_sort(s)?;
            a_parts.push(sa);
            b_parts.push(sb);
        }
        let a = self.primary.mk_sort_with_sorts(kind, &a_parts)?;
        let b = self.secondary.mk_sort_with_sorts(kind, &b_parts)?;
        Ok(Self::pair_sort(a, b, sorts.to_vec()))
    }

    fn mk_const(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        let (sa, sb) = Self::split_sort(sort)?;
        let a = self.primary.mk_const(&sa, symbol)?;
        let b = self.secondary.mk_const(&sb, symbol)?;
        Ok(Self::pair_term(a, b, sort.clone()))
    }

    fn mk_var(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        let (sa, sb) = Self::split_sort(sort)?;
        let a = self.primary.mk_var(&sa, symbol)?;
        let b = self.secondary.mk_var(&sb, symbol)?;
        Ok(Self::pair_term(a, b, sort.clone()))
    }

    fn mk_value(&mut self, sort: &Sort, value: &Value) -> Result<Term, SolverError> {
        let (sa, sb) = Self::split_sort(sort)?;
        let a = self.primary.mk_value(&sa, value)?;
        let b = self.secondary.mk_value(&sb, value)?;
        Ok(Self::pair_term(a, b, sort.clone()))
    }

    fn mk_special_value(&mut self, sort: &Sort, value: SpecialValue) -> Result<Term, SolverError> {
        let (sa, sb) = Self::split_sort(sort)?;
        let a = self.primary.mk_special_value(&sa, value)?;
        let b = self.secondary.mk_special_value(&sb, value)?;
        Ok(Self::pair_term(a, b, sort.clone()))
    }

    fn mk_term(
        &mut self,
        kind: OpKind,
        args: &[Term],
        indices: &[u32],
    ) -> Result<Term, SolverError> {
        let (a_args, b_args) = Self::split_terms(args)?;
        let a = self.primary.mk_term(kind, &a_args, indices)?;
        let b = self.secondary.mk_term(kind, &b_args, indices)?;
        let sa = self.primary.sort_of(&a, SortKind::Any)?;
        let sb = self.secondary.sort_of(&b, SortKind::Any)?;
        let sort = Self::pair_sort(sa, sb, Vec::new());
        Ok(Self::pair_term(a, b, sort))
    }

    fn sort_of(&mut self, term: &Term, hint: SortKind) -> Result<Sort, SolverError> {
        let (a, b) = Self::split_term(term)?;
        let sa = self.primary.sort_of(&a, hint)?;
        let sb = self.secondary.sort_of(&b, hint)?;
        Ok(Self::pair_sort(sa, sb, Vec::new()))
    }

    fn assert_formula(&mut self, term: &Term) -> Result<(), SolverError> {
        let (a, b) = Self::split_term(term)?;
        self.primary.assert_formula(&a)?;
        self.secondary.assert_formula(&b)
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        let ra = self.primary.check_sat()?;
        let rb = self.secondary.check_sat()?;
        self.compare(ra, rb)
    }

    fn check_sat_assuming(&mut self, assumptions: &[Term]) -> Result<SatResult, SolverError> {
        let (a, b) = Self::split_terms(assumptions)?;
        self.last_assumptions = assumptions.to_vec();
        let ra = self.primary.check_sat_assuming(&a)?;
        let rb = self.secondary.check_sat_assuming(&b)?;
        self.compare(ra, rb)
    }

    fn get_unsat_assumptions(&mut self) -> Result<Vec<Term>, SolverError> {
        let failed = self.primary.get_unsat_assumptions()?;
        Ok(self
            .last_assumptions
            .iter()
            .filter(|t| {
                Self::split_term(t)
                    .map(|(a, _)| failed.iter().any(|f| f == &a))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn get_unsat_core(&mut self) -> Result<Vec<Term>, SolverError> {
        // Core terms stay in the primary's domain; they are only inspected,
        // never fed back into term construction.
        let _ = self.primary.get_unsat_core()?;
        Ok(Vec::new())
    }

    fn is_unsat_assumption(&self, term: &Term) -> bool {
        self.last_assumptions.iter().any(|a| a == term)
    }

    fn get_value(&mut self, terms: &[Term]) -> Result<Vec<Term>, SolverError> {
        let (a, _) = Self::split_terms(terms)?;
        let values = self.primary.get_value(&a)?;
        // Values are reported from the primary; wrap them against the
        // original sorts so callers can still inspect them.
        Ok(values
            .into_iter()
            .zip(terms)
            .map(|(v, t)| Self::pair_term(v.clone(), v, t.sort()))
            .collect())
    }

    fn push(&mut self, n_levels: u32) -> Result<(), SolverError> {
        self.primary.push(n_levels)?;
        self.secondary.push(n_levels)
    }

    fn pop(&mut self, n_levels: u32) -> Result<(), SolverError> {
        self.primary.pop(n_levels)?;
        self.secondary.pop(n_levels)
    }

    fn print_model(&mut self) -> Result<String, SolverError> {
        self.primary.print_model()
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.last_assumptions.clear();
        self.primary.reset()?;
        self.secondary.reset()
    }

    fn reset_assertions(&mut self) -> Result<(), SolverError> {
        self.last_assumptions.clear();
        self.primary.reset_assertions()?;
        self.secondary.reset_assertions()
    }

    fn set_opt(&mut self, name: &str, value: &str) -> Result<(), SolverError> {
        self.primary.set_opt(name, value)?;
        // Mirror the four standard toggles so push/pop and model queries
        // stay legal on the secondary; other options are primary-specific.
        if name == self.option_name_incremental()
            || name == self.option_name_model_gen()
            || name == self.option_name_unsat_assumptions()
            || name == self.option_name_unsat_cores()
        {
            self.secondary.set_opt(name, value)?;
        }
        Ok(())
    }

    fn option_incremental_enabled(&self) -> bool {
        self.primary.option_incremental_enabled()
    }

    fn option_model_gen_enabled(&self) -> bool {
        self.primary.option_model_gen_enabled()
    }

    fn option_unsat_assumptions_enabled(&self) -> bool {
        self.primary.option_unsat_assumptions_enabled()
    }

    fn option_unsat_cores_enabled(&self) -> bool {
        self.primary.option_unsat_cores_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{StubBug, StubSolver};
    use crate::op::{OP_BV_AND, OP_EQUAL};
    use crate::solver::Base;

    fn cross(bug: StubBug) -> CrossCheckSolver {
        let primary = Box::new(StubSolver::with_bug(bug));
        let secondary = Box::new(StubSolver::new());
        let mut s = CrossCheckSolver::new(primary, secondary);
        s.new_solver().unwrap();
        s
    }

    fn bv_val(s: &mut CrossCheckSolver, width: u32, bits: u128) -> Term {
        let sort = s.mk_sort_bv(width).unwrap();
        s.mk_value(
            &sort,
            &Value::Bv {
                digits: format!("{bits}"),
                base: Base::Dec,
            },
        )
        .unwrap()
    }

    #[test]
    fn agreeing_solvers_pass_through() {
        let mut s = cross(StubBug::None);
        let a = bv_val(&mut s, 4, 0b1010);
        let b = bv_val(&mut s, 4, 0b0101);
        let and = s.mk_term(OP_BV_AND, &[a, b], &[]).unwrap();
        let zero = bv_val(&mut s, 4, 0);
        let eq = s.mk_term(OP_EQUAL, &[and, zero], &[]).unwrap();
        s.assert_formula(&eq).unwrap();
        assert_eq!(s.check_sat().unwrap(), SatResult::Sat);
    }

    #[test]
    fn verdict_disagreement_is_a_cross_check_error() {
        let mut s = cross(StubBug::AndBecomesOr);
        let a = bv_val(&mut s, 4, 0b1010);
        let b = bv_val(&mut s, 4, 0b0101);
        let and = s.mk_term(OP_BV_AND, &[a, b], &[]).unwrap();
        let zero = bv_val(&mut s, 4, 0);
        let eq = s.mk_term(OP_EQUAL, &[and, zero], &[]).unwrap();
        s.assert_formula(&eq).unwrap();
        let err = s.check_sat().unwrap_err();
        assert!(matches!(err, SolverError::CrossCheck { .. }));
        assert!(err.to_string().contains("cross-check mismatch"));
    }

    #[test]
    fn capability_intersection() {
        let primary = Box::new(StubSolver::new().with_max_bv_width(16));
        let secondary = Box::new(StubSolver::new().with_max_bv_width(8));
        let s = CrossCheckSolver::new(primary, secondary);
        assert_eq!(s.bv_width_range(), (1, 8));
        assert_eq!(
            s.supported_theories(),
            vec![Theory::Bool, Theory::Bv]
        );
    }

    #[test]
    fn push_pop_mirror_both_solvers() {
        let mut s = cross(StubBug::None);
        let bool_sort = s.mk_sort(SortKind::Bool).unwrap();
        let t = s.mk_value(&bool_sort, &Value::Bool(false)).unwrap();
        s.push(1).unwrap();
        s.assert_formula(&t).unwrap();
        assert_eq!(s.check_sat().unwrap(), SatResult::Unsat);
        s.pop(1).unwrap();
        assert_eq!(s.check_sat().unwrap(), SatResult::Sat);
    }
}
