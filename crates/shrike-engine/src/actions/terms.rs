//! The `mk-term` Action: operator pick, well-typed argument sampling, and
//! index synthesis.

use shrike_smt::op::{self, Op, MK_TERM_MAX_ARGS};
use shrike_smt::solver::Solver;
use shrike_smt::sort::SortKind;
use shrike_smt::term::Term;

use crate::actions::{bind_sort, bind_term, lookup_term, parse_u32, parse_usize, Action};
use crate::errors::EngineError;
use crate::manager::SolverManager;
use crate::trace::{Token, TraceLine};

pub struct ActionMkTerm;

impl ActionMkTerm {
    /// Pick one argument term of the required sort kind, honoring Int/Real
    /// subtyping when the solver permits it.
    fn pick_arg(mgr: &mut SolverManager, kind: SortKind) -> Option<Term> {
        match kind {
            SortKind::Any => mgr.pick_term(),
            SortKind::Real if mgr.solver().supports_arith_subtyping() => {
                let has_real = mgr.has_term_of_kind(SortKind::Real);
                let has_int = mgr.has_term_of_kind(SortKind::Int);
                let kind = match (has_real, has_int) {
                    (true, true) => {
                        if mgr.rng_mut().flip_coin() {
                            SortKind::Real
                        } else {
                            SortKind::Int
                        }
                    }
                    (true, false) => SortKind::Real,
                    (false, true) => SortKind::Int,
                    (false, false) => return None,
                };
                mgr.pick_term_of_kind(kind)
            }
            k => mgr.pick_term_of_kind(k),
        }
    }

    /// Synthesize arguments and indices for the operator; `None` means the
    /// databases cannot currently supply a well-typed application.
    fn pick_args(
        mgr: &mut SolverManager,
        op: &'static Op,
    ) -> Result<Option<(Vec<Term>, Vec<u32>)>, EngineError> {
        let kind = op.kind;
        let mut indices = Vec::new();

        // Linear fragment: nonlinear operators take one free operand, every
        // other operand must be a concrete value.
        if mgr.arith_linear() && op::is_nonlinear_arith(kind) {
            let Some(sort) = mgr.pick_sort_of_kind(op.arg_sort_at(0), true) else {
                return Ok(None);
            };
            let n = mgr.rng_mut().pick_usize(op.min_arity().max(2), 3);
            let Some(free) = mgr.pick_term_of_sort(&sort) else {
                return Ok(None);
            };
            let mut args = vec![free];
            for _ in 1..n {
                let Some(value) = mgr.pick_value_of_sort(&sort) else {
                    return Ok(None);
                };
                args.push(value);
            }
            return Ok(Some((args, indices)));
        }

        let args = match kind {
            op::OP_EQUAL | op::OP_DISTINCT => {
                let Some(sort) = mgr.pick_sort_of_kind(SortKind::Any, true) else {
                    return Ok(None);
                };
                let n = mgr.rng_mut().pick_usize(2, 4);
                let mut args = Vec::with_capacity(n);
                for _ in 0..n {
                    let Some(t) = mgr.pick_term_of_sort(&sort) else {
                        return Ok(None);
                    };
                    args.push(t);
                }
                args
            }
            op::OP_ITE => {
                let Some(cond) = mgr.pick_term_of_kind(SortKind::Bool) else {
                    return Ok(None);
                };
                let Some(sort) = mgr.pick_sort_of_kind(SortKind::Any, true) else {
                    return Ok(None);
                };
                let (Some(then_t), Some(else_t)) =
                    (mgr.pick_term_of_sort(&sort), mgr.pick_term_of_sort(&sort))
                else {
                    return Ok(None);
                };
                vec![cond, then_t, else_t]
            }
            op::OP_ARRAY_SELECT | op::OP_ARRAY_STORE => {
                let Some(array) = mgr.pick_term_of_kind(SortKind::Array) else {
                    return Ok(None);
                };
                let array_sort = array.sort();
                let (Some(index_sort), Some(element_sort)) = (
                    array_sort.array_index_sort().cloned(),
                    array_sort.array_element_sort().cloned(),
                ) else {
                    return Ok(None);
                };
                let Some(index) = mgr.pick_term_of_sort(&index_sort) else {
                    return Ok(None);
                };
                if kind == op::OP_ARRAY_SELECT {
                    vec![array, index]
                } else {
                    let Some(element) = mgr.pick_term_of_sort(&element_sort) else {
                        return Ok(None);
                    };
                    vec![array, index, element]
                }
            }
            op::OP_UF_APPLY => {
                let Some(fun) = mgr.pick_term_of_kind(SortKind::Fun) else {
                    return Ok(None);
                };
                let fun_sort = fun.sort();
                let domain: Vec<_> = fun_sort.fun_domain_sorts().to_vec();
                let mut args = vec![fun];
                for sort in &domain {
                    let Some(t) = mgr.pick_term_of_sort(sort) else {
                        return Ok(None);
                    };
                    args.push(t);
                }
                args
            }
            op::OP_FORALL | op::OP_EXISTS => {
                let (Some(var), Some(body)) = (mgr.pick_var(), mgr.pick_quant_body()) else {
                    return Ok(None);
                };
                vec![var, body]
            }
            op::OP_RE_RANGE => {
                let (Some(lo), Some(hi)) = (
                    mgr.pick_string_char_value(),
                    mgr.pick_string_char_value(),
                ) else {
                    return Ok(None);
                };
                vec![lo, hi]
            }
            _ if op.is_indexed() => {
                let Some(arg) = mgr.pick_term_of_kind(SortKind::Bv) else {
                    return Ok(None);
                };
                let width = arg.sort().bv_size();
                let max_width = mgr.solver().bv_width_range().1;
                match kind {
                    op::OP_BV_EXTRACT => {
                        let lo = mgr.rng_mut().pick_u32(0, width - 1);
                        let hi = mgr.rng_mut().pick_u32(lo, width - 1);
                        indices = vec![hi, lo];
                    }
                    op::OP_BV_ZERO_EXTEND | op::OP_BV_SIGN_EXTEND => {
                        let n = mgr.rng_mut().pick_u32(0, max_width.saturating_sub(width));
                        indices = vec![n];
                    }
                    op::OP_BV_ROTATE_LEFT | op::OP_BV_ROTATE_RIGHT => {
                        indices = vec![mgr.rng_mut().pick_u32(0, width)];
                    }
                    op::OP_BV_REPEAT => {
                        let max_rep = (max_width / width).max(1);
                        indices = vec![mgr.rng_mut().pick_u32(1, max_rep)];
                    }
                    other => {
                        return Err(EngineError::Config(format!(
                            "no index synthesis for operator {other}"
                        )))
                    }
                }
                vec![arg]
            }
            op::OP_BV_CONCAT => {
                let max_width = mgr.solver().bv_width_range().1;
                let n = mgr.rng_mut().pick_usize(2, 4);
                let mut args = Vec::with_capacity(n);
                let mut total = 0;
                for _ in 0..n {
                    let remaining = max_width - total;
                    if remaining == 0 {
                        break;
                    }
                    let Some(sort) = mgr.pick_sort_bv_max(remaining, true) else {
                        break;
                    };
                    let Some(t) = mgr.pick_term_of_sort(&sort) else {
                        break;
                    };
                    total += sort.bv_size();
                    args.push(t);
                }
                if args.len() < 2 {
                    return Ok(None);
                }
                args
            }
            _ => {
                let n = if op.is_nary() {
                    mgr.rng_mut().pick_usize(op.min_arity(), MK_TERM_MAX_ARGS)
                } else {
                    op.min_arity()
                };
                // Operands of one parametric kind (BV widths, FP formats)
                // must share a concrete sort; fix one per kind up front.
                let mut sort_memo: Vec<(SortKind, shrike_smt::sort::Sort)> = Vec::new();
                let mut args = Vec::with_capacity(n);
                for i in 0..n {
                    let arg_kind = op.arg_sort_at(i);
                    let term = match arg_kind {
                        SortKind::Any => mgr.pick_term(),
                        SortKind::Real if mgr.solver().supports_arith_subtyping() => {
                            Self::pick_arg(mgr, arg_kind)
                        }
                        k => {
                            let sort = match sort_memo.iter().find(|(mk, _)| *mk == k) {
                                Some((_, s)) => s.clone(),
                                None => {
                                    let Some(s) = mgr.pick_sort_of_kind(k, true) else {
                                        return Ok(None);
                                    };
                                    sort_memo.push((k, s.clone()));
                                    s
                                }
                            };
                            mgr.pick_term_of_sort(&sort)
                        }
                    };
                    let Some(term) = term else {
                        return Ok(None);
                    };
                    args.push(term);
                }
                args
            }
        };
        Ok(Some((args, indices)))
    }

    fn lookup_op(kind: &str) -> Result<&'static Op, EngineError> {
        op::OPS
            .iter()
            .find(|o| o.kind == kind)
            .ok_or_else(|| EngineError::Config(format!("unknown operator kind `{kind}`")))
    }
}

impl Action for ActionMkTerm {
    fn kind(&self) -> &'static str {
        "mk-term"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && mgr.has_term()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let Some(kind) = mgr.pick_op_kind(true) else {
            return Ok(None);
        };
        let op = mgr
            .op_mgr()
            .get(kind)
            .ok_or_else(|| EngineError::Config(format!("operator {kind} not registered")))?;
        let Some((args, indices)) = Self::pick_args(mgr, op)? else {
            return Ok(None);
        };
        let mut line = TraceLine::new(self.kind())
            .arg(kind)
            .arg(args.len().to_string());
        for t in &args {
            line = line.arg(t.to_string());
        }
        line = line.arg(indices.len().to_string());
        for i in &indices {
            line = line.arg(i.to_string());
        }
        mgr.set_pending_trace(line.clone());

        mgr.stats.incr_op(kind);
        let term = mgr.solver_mut().mk_term(kind, &args, &indices)?;
        let (term, sort) = mgr.add_term(term, op.result_sort, &args)?;
        if matches!(kind, op::OP_FORALL | op::OP_EXISTS) {
            mgr.remove_var(&args[0]);
        }
        mgr.stats.incr_op_ok(kind);
        Ok(Some(line.ret(term.to_string()).ret(sort.to_string())))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError> {
        if args.len() < 2 {
            return Err(EngineError::Config(
                "mk-term needs an operator and an argument count".into(),
            ));
        }
        let op = Self::lookup_op(&args[0].text)?;
        let n_args = parse_usize(self.kind(), &args[1])?;
        if args.len() < 2 + n_args + 1 {
            return Err(EngineError::Config(format!(
                "mk-term {} declares {n_args} argument(s) but the line is short",
                op.kind
            )));
        }
        let mut arg_terms = Vec::with_capacity(n_args);
        for token in &args[2..2 + n_args] {
            arg_terms.push(lookup_term(mgr, token)?);
        }
        let n_indices = parse_usize(self.kind(), &args[2 + n_args])?;
        if args.len() != 2 + n_args + 1 + n_indices {
            return Err(EngineError::Config(format!(
                "mk-term {} declares {n_indices} index(es) but the line has {}",
                op.kind,
                args.len() - 2 - n_args - 1
            )));
        }
        let mut indices = Vec::with_capacity(n_indices);
        for token in &args[2 + n_args + 1..] {
            indices.push(parse_u32(self.kind(), token)?);
        }

        let term = mgr.solver_mut().mk_term(op.kind, &arg_terms, &indices)?;
        let (term, sort) = mgr.add_term(term, op.result_sort, &arg_terms)?;
        if matches!(op.kind, op::OP_FORALL | op::OP_EXISTS) {
            mgr.remove_var(&arg_terms[0]);
        }
        bind_term(mgr, returns, 0, term)?;
        bind_sort(mgr, returns, 1, sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionMkConst, ActionMkSort};
    use crate::rng::SeededRng;
    use crate::run::RunConfig;
    use crate::trace::tokenize;
    use shrike_smt::backends::stub::StubSolver;
    use shrike_smt::solver::Solver;

    fn init_manager(seed: u64) -> SolverManager {
        let mut mgr = SolverManager::new(
            Box::new(StubSolver::new()),
            SeededRng::new(seed),
            &RunConfig::default(),
        )
        .unwrap();
        mgr.solver_mut().new_solver().unwrap();
        mgr
    }

    fn tokens(line: &str) -> Vec<Token> {
        tokenize(line).unwrap()
    }

    fn seed_bv_terms(mgr: &mut SolverManager) {
        ActionMkSort
            .untrace(mgr, &tokens("BV 8"), &tokens("s1"))
            .unwrap();
        ActionMkConst
            .untrace(mgr, &tokens("s1 \"_x0\""), &tokens("t1"))
            .unwrap();
        ActionMkConst
            .untrace(mgr, &tokens("s1 \"_x1\""), &tokens("t2"))
            .unwrap();
    }

    #[test]
    fn inapplicable_without_terms() {
        let mgr = init_manager(1);
        assert!(!ActionMkTerm.applicable(&mgr));
    }

    #[test]
    fn generated_terms_are_well_typed_and_traced() {
        let mut mgr = init_manager(2);
        seed_bv_terms(&mut mgr);
        let mut produced = 0;
        for _ in 0..50 {
            if let Some(line) = ActionMkTerm.run(&mut mgr).unwrap() {
                produced += 1;
                assert_eq!(line.kind, "mk-term");
                // kind, n_args, args..., n_idx, indices...
                let n_args: usize = line.args[1].parse().unwrap();
                let n_idx: usize = line.args[2 + n_args].parse().unwrap();
                assert_eq!(line.args.len(), 2 + n_args + 1 + n_idx);
                assert_eq!(line.returns.len(), 2);
                assert!(line.returns[0].starts_with('t'));
                assert!(line.returns[1].starts_with('s'));
            }
        }
        assert!(produced > 10, "only {produced} terms were produced");
    }

    #[test]
    fn untrace_rebuilds_the_same_application() {
        let mut mgr = init_manager(3);
        seed_bv_terms(&mut mgr);
        ActionMkTerm
            .untrace(&mut mgr, &tokens("BV_AND 2 t1 t2 0"), &tokens("t3 s1"))
            .unwrap();
        let term = mgr.get_untraced_term(3).unwrap();
        assert_eq!(term.sort().bv_size(), 8);

        // Extract with indices.
        ActionMkTerm
            .untrace(&mut mgr, &tokens("BV_EXTRACT 1 t3 2 5 2"), &tokens("t4 s2"))
            .unwrap();
        let slice = mgr.get_untraced_term(4).unwrap();
        assert_eq!(slice.sort().bv_size(), 4);
        let new_sort = mgr.get_untraced_sort(2).unwrap();
        assert_eq!(new_sort.bv_size(), 4);
    }

    #[test]
    fn untrace_rejects_malformed_lines() {
        let mut mgr = init_manager(4);
        seed_bv_terms(&mut mgr);
        assert!(ActionMkTerm
            .untrace(&mut mgr, &tokens("BV_FROB 2 t1 t2 0"), &tokens("t3 s1"))
            .is_err());
        assert!(ActionMkTerm
            .untrace(&mut mgr, &tokens("BV_AND 3 t1 t2 0"), &tokens("t3 s1"))
            .is_err());
        assert!(ActionMkTerm
            .untrace(&mut mgr, &tokens("BV_AND 2 t1 t9 0"), &tokens("t3 s1"))
            .is_err());
    }

    #[test]
    fn extract_indices_respect_operand_width() {
        let mut mgr = init_manager(5);
        seed_bv_terms(&mut mgr);
        for _ in 0..200 {
            if let Some(line) = ActionMkTerm.run(&mut mgr).unwrap() {
                if line.args[0] == "BV_EXTRACT" {
                    let n_args: usize = line.args[1].parse().unwrap();
                    let hi: u32 = line.args[2 + n_args + 1].parse().unwrap();
                    let lo: u32 = line.args[2 + n_args + 2].parse().unwrap();
                    assert!(lo <= hi);
                    assert!(hi < 8 || hi < 128);
                }
            }
        }
    }

    #[test]
    fn result_widths_never_exceed_the_backend_cap() {
        let mut mgr = init_manager(6);
        seed_bv_terms(&mut mgr);
        let (_, max_width) = mgr.solver().bv_width_range();
        for _ in 0..300 {
            let _ = ActionMkTerm.run(&mut mgr).unwrap();
        }
        for sort in mgr.sorts() {
            if sort.is_bv() {
                assert!(
                    sort.bv_size() >= 1 && sort.bv_size() <= max_width,
                    "interned BV sort of width {}",
                    sort.bv_size()
                );
            }
        }
    }
}
