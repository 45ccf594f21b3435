//! Sort and input-term creation Actions.

use shrike_smt::solver::{Base, Solver, SpecialValue, Value};
use shrike_smt::sort::{Sort, SortKind};
use shrike_smt::theory::Theory;

use crate::actions::{bind_sort, bind_term, expect_args, lookup_sort, parse_u32, Action};
use crate::errors::EngineError;
use crate::manager::SolverManager;
use crate::rng::SeededRng;
use crate::trace::{quote, Token, TraceLine};
use crate::{MAX_INT_LEN, MAX_STR_LEN};

/// Alphabet for generated string literals: printable ASCII minus the two
/// characters the trace quoting escapes.
const STR_ALPHABET: &[u8] =
    b" !#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[]^_`abcdefghijklmnopqrstuvwxyz{|}~";

pub struct ActionMkSort;

impl ActionMkSort {
    /// Sort kinds that can be instantiated right now.
    fn instantiable_kinds(mgr: &SolverManager) -> Vec<SortKind> {
        let solver = mgr.solver();
        let mut kinds = Vec::new();
        for &kind in mgr.enabled_sort_kinds() {
            let ok = match kind {
                SortKind::Array => {
                    mgr.has_sort_excluding(&solver.unsupported_array_index_sort_kinds())
                        && mgr.has_sort_excluding(&solver.unsupported_array_element_sort_kinds())
                }
                SortKind::Fun => {
                    mgr.has_sort_excluding(&solver.unsupported_fun_domain_sort_kinds())
                        && mgr.has_sort_excluding(&solver.unsupported_fun_codomain_sort_kinds())
                }
                SortKind::Fp => !solver.fp_format_pairs().is_empty(),
                _ => true,
            };
            if ok {
                kinds.push(kind);
            }
        }
        kinds
    }
}

impl Action for ActionMkSort {
    fn kind(&self) -> &'static str {
        "mk-sort"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && !Self::instantiable_kinds(mgr).is_empty()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let kinds = Self::instantiable_kinds(mgr);
        if kinds.is_empty() {
            return Ok(None);
        }
        let kind = *mgr.rng_mut().pick_from_slice(&kinds);
        let mut line = TraceLine::new(self.kind()).arg(kind.name());
        let sort = match kind {
            SortKind::Bv => {
                let (lo, hi) = mgr.solver().bv_width_range();
                let bw = mgr.rng_mut().pick_u32(lo, hi);
                line = line.arg(bw.to_string());
                mgr.set_pending_trace(line.clone());
                mgr.solver_mut().mk_sort_bv(bw)?
            }
            SortKind::Fp => {
                let pairs = mgr.solver().fp_format_pairs();
                let &(exp, sig) = mgr.rng_mut().pick_from_slice(&pairs);
                line = line.arg(exp.to_string()).arg(sig.to_string());
                mgr.set_pending_trace(line.clone());
                mgr.solver_mut().mk_sort_fp(exp, sig)?
            }
            SortKind::Array => {
                let unsupported_index = mgr.solver().unsupported_array_index_sort_kinds();
                let unsupported_element = mgr.solver().unsupported_array_element_sort_kinds();
                let index = mgr.pick_sort_excluding(&unsupported_index, false);
                let element = mgr.pick_sort_excluding(&unsupported_element, false);
                let (Some(index), Some(element)) = (index, element) else {
                    return Ok(None);
                };
                line = line.arg(index.to_string()).arg(element.to_string());
                mgr.set_pending_trace(line.clone());
                mgr.solver_mut()
                    .mk_sort_with_sorts(SortKind::Array, &[index, element])?
            }
            SortKind::Fun => {
                let unsupported_domain = mgr.solver().unsupported_fun_domain_sort_kinds();
                let unsupported_codomain = mgr.solver().unsupported_fun_codomain_sort_kinds();
                let n_domain = mgr.rng_mut().pick_usize(1, 3);
                let mut sorts = Vec::with_capacity(n_domain + 1);
                for _ in 0..n_domain {
                    let Some(s) = mgr.pick_sort_excluding(&unsupported_domain, false) else {
                        return Ok(None);
                    };
                    sorts.push(s);
                }
                let Some(codomain) = mgr.pick_sort_excluding(&unsupported_codomain, false) else {
                    return Ok(None);
                };
                sorts.push(codomain);
                for s in &sorts {
                    line = line.arg(s.to_string());
                }
                mgr.set_pending_trace(line.clone());
                mgr.solver_mut().mk_sort_with_sorts(SortKind::Fun, &sorts)?
            }
            simple => {
                mgr.set_pending_trace(line.clone());
                mgr.solver_mut().mk_sort(simple)?
            }
        };
        let sort = mgr.add_sort(sort, kind);
        Ok(Some(line.ret(sort.to_string())))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError> {
        if args.is_empty() {
            return Err(EngineError::Config("mk-sort needs a sort kind".into()));
        }
        let kind: SortKind = args[0]
            .text
            .parse()
            .map_err(EngineError::Config)?;
        let sort = match kind {
            SortKind::Bv => {
                expect_args(self.kind(), args, 2)?;
                let bw = parse_u32(self.kind(), &args[1])?;
                mgr.solver_mut().mk_sort_bv(bw)?
            }
            SortKind::Fp => {
                expect_args(self.kind(), args, 3)?;
                let exp = parse_u32(self.kind(), &args[1])?;
                let sig = parse_u32(self.kind(), &args[2])?;
                mgr.solver_mut().mk_sort_fp(exp, sig)?
            }
            SortKind::Array | SortKind::Fun => {
                let mut sorts = Vec::with_capacity(args.len() - 1);
                for token in &args[1..] {
                    sorts.push(lookup_sort(mgr, token)?);
                }
                mgr.solver_mut().mk_sort_with_sorts(kind, &sorts)?
            }
            simple => {
                expect_args(self.kind(), args, 1)?;
                mgr.solver_mut().mk_sort(simple)?
            }
        };
        let sort = mgr.add_sort(sort, kind);
        bind_sort(mgr, returns, 0, sort)
    }
}

pub struct ActionMkConst;

impl Action for ActionMkConst {
    fn kind(&self) -> &'static str {
        "mk-const"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && mgr.has_sort()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let Some(sort) = mgr.pick_sort() else {
            return Ok(None);
        };
        let symbol = mgr.pick_symbol();
        let line = TraceLine::new(self.kind())
            .arg(sort.to_string())
            .arg(quote(&symbol));
        mgr.set_pending_trace(line.clone());
        let term = mgr.solver_mut().mk_const(&sort, &symbol)?;
        let term = mgr.add_input(term, sort.clone());
        Ok(Some(line.ret(term.to_string())))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 2)?;
        let sort = lookup_sort(mgr, &args[0])?;
        let term = mgr.solver_mut().mk_const(&sort, &args[1].text)?;
        let term = mgr.add_input(term, sort);
        bind_term(mgr, returns, 0, term)
    }
}

pub struct ActionMkVar;

impl Action for ActionMkVar {
    fn kind(&self) -> &'static str {
        "mk-var"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized()
            && mgr.enabled_theories().contains(&Theory::Quant)
            && mgr.has_sort_excluding(&mgr.solver().unsupported_var_sort_kinds())
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let unsupported = mgr.solver().unsupported_var_sort_kinds();
        let Some(sort) = mgr.pick_sort_excluding(&unsupported, false) else {
            return Ok(None);
        };
        let symbol = mgr.pick_symbol();
        let line = TraceLine::new(self.kind())
            .arg(sort.to_string())
            .arg(quote(&symbol));
        mgr.set_pending_trace(line.clone());
        let term = mgr.solver_mut().mk_var(&sort, &symbol)?;
        let term = mgr.add_var(term, sort.clone());
        Ok(Some(line.ret(term.to_string())))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 2)?;
        let sort = lookup_sort(mgr, &args[0])?;
        let term = mgr.solver_mut().mk_var(&sort, &args[1].text)?;
        let term = mgr.add_var(term, sort);
        bind_term(mgr, returns, 0, term)
    }
}

pub struct ActionMkValue;

/// Sort kinds for which concrete values can be synthesized.
const VALUE_KINDS: &[SortKind] = &[
    SortKind::Bool,
    SortKind::Bv,
    SortKind::Int,
    SortKind::Real,
    SortKind::String,
];

fn gen_bv_bits(rng: &mut SeededRng, width: u32) -> u128 {
    let raw = (u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64());
    if width >= 128 {
        raw
    } else {
        raw & ((1u128 << width) - 1)
    }
}

fn gen_digits(rng: &mut SeededRng, len: usize) -> String {
    let mut out = String::with_capacity(len);
    for i in 0..len {
        let digit = if i == 0 && len > 1 {
            rng.pick_u32(1, 9)
        } else {
            rng.pick_u32(0, 9)
        };
        out.push(char::from(b'0' + digit as u8));
    }
    out
}

impl ActionMkValue {
    fn value_sort_kinds(mgr: &SolverManager) -> Vec<SortKind> {
        VALUE_KINDS
            .iter()
            .copied()
            .filter(|&k| mgr.has_sort_of_kind(k))
            .collect()
    }

    /// Synthesize a value for the sort; returns the trace payload tokens.
    fn synthesize(mgr: &mut SolverManager, sort: &Sort) -> (Value, Vec<String>) {
        match sort.kind() {
            SortKind::Bool => {
                let b = mgr.rng_mut().flip_coin();
                (Value::Bool(b), vec![b.to_string()])
            }
            SortKind::Bv => {
                let width = sort.bv_size();
                let bits = gen_bv_bits(mgr.rng_mut(), width);
                let base = *mgr.rng_mut().pick_from_slice(Base::ALL);
                let digits = match base {
                    Base::Bin => format!("{bits:0width$b}", width = width as usize),
                    Base::Dec => bits.to_string(),
                    Base::Hex => format!("{bits:x}"),
                };
                (
                    Value::Bv { digits: digits.clone(), base },
                    vec![base.name().to_string(), quote(&digits)],
                )
            }
            SortKind::Int => {
                let len = mgr.rng_mut().pick_usize(1, MAX_INT_LEN);
                let mut digits = gen_digits(mgr.rng_mut(), len);
                if digits != "0" && mgr.rng_mut().flip_coin() {
                    digits.insert(0, '-');
                }
                (Value::Int(digits.clone()), vec![quote(&digits)])
            }
            SortKind::Real => {
                if mgr.rng_mut().flip_coin() {
                    let int_len = mgr.rng_mut().pick_usize(1, MAX_INT_LEN / 2);
                    let frac_len = mgr.rng_mut().pick_usize(1, 5);
                    let int_part = gen_digits(mgr.rng_mut(), int_len);
                    let frac_part = gen_digits(mgr.rng_mut(), frac_len);
                    let digits = format!("{int_part}.{frac_part}");
                    (Value::Real(digits.clone()), vec![quote(&digits)])
                } else {
                    let num_len = mgr.rng_mut().pick_usize(1, 5);
                    let den_len = mgr.rng_mut().pick_usize(1, 5);
                    let num = gen_digits(mgr.rng_mut(), num_len);
                    let mut den = gen_digits(mgr.rng_mut(), den_len);
                    if den.chars().all(|c| c == '0') {
                        den = "1".to_string();
                    }
                    (
                        Value::Rational {
                            num: num.clone(),
                            den: den.clone(),
                        },
                        vec![quote(&num), quote(&den)],
                    )
                }
            }
            SortKind::String => {
                let len = mgr.rng_mut().pick_usize(0, MAX_STR_LEN);
                let mut s = String::with_capacity(len);
                for _ in 0..len {
                    s.push(*mgr.rng_mut().pick_from_slice(STR_ALPHABET) as char);
                }
                (Value::Str(s.clone()), vec![quote(&s)])
            }
            other => unreachable!("no value synthesis for sort kind {other}"),
        }
    }
}

impl Action for ActionMkValue {
    fn kind(&self) -> &'static str {
        "mk-value"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && !Self::value_sort_kinds(mgr).is_empty()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let kinds = Self::value_sort_kinds(mgr);
        if kinds.is_empty() {
            return Ok(None);
        }
        let kind = *mgr.rng_mut().pick_from_slice(&kinds);
        let Some(sort) = mgr.pick_sort_of_kind(kind, false) else {
            return Ok(None);
        };
        let (value, payload) = Self::synthesize(mgr, &sort);
        let mut line = TraceLine::new(self.kind()).arg(sort.to_string());
        for p in payload {
            line = line.arg(p);
        }
        mgr.set_pending_trace(line.clone());
        let term = mgr.solver_mut().mk_value(&sort, &value)?;
        let term = mgr.add_value(term, sort.clone());
        if let Value::Str(s) = &value {
            if s.chars().count() == 1 {
                mgr.add_string_char_value(term.clone());
            }
        }
        Ok(Some(line.ret(term.to_string())))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError> {
        if args.is_empty() {
            return Err(EngineError::Config("mk-value needs a sort".into()));
        }
        let sort = lookup_sort(mgr, &args[0])?;
        let value = match sort.kind() {
            SortKind::Bool => {
                expect_args(self.kind(), args, 2)?;
                match args[1].text.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    other => {
                        return Err(EngineError::Config(format!(
                            "`{other}` is not a Boolean value"
                        )))
                    }
                }
            }
            SortKind::Bv => {
                expect_args(self.kind(), args, 3)?;
                let base: Base = args[1]
                    .text
                    .parse()
                    .map_err(EngineError::Config)?;
                Value::Bv {
                    digits: args[2].text.clone(),
                    base,
                }
            }
            SortKind::Int => {
                expect_args(self.kind(), args, 2)?;
                Value::Int(args[1].text.clone())
            }
            SortKind::Real => match args.len() {
                2 => Value::Real(args[1].text.clone()),
                3 => Value::Rational {
                    num: args[1].text.clone(),
                    den: args[2].text.clone(),
                },
                n => {
                    return Err(EngineError::Config(format!(
                        "mk-value on Real expects 2 or 3 arguments, got {n}"
                    )))
                }
            },
            SortKind::String => {
                expect_args(self.kind(), args, 2)?;
                Value::Str(args[1].text.clone())
            }
            other => {
                return Err(EngineError::Config(format!(
                    "mk-value on sort kind {other}"
                )))
            }
        };
        let term = mgr.solver_mut().mk_value(&sort, &value)?;
        let term = mgr.add_value(term, sort);
        if let Value::Str(s) = &value {
            if s.chars().count() == 1 {
                mgr.add_string_char_value(term.clone());
            }
        }
        bind_term(mgr, returns, 0, term)
    }
}

pub struct ActionMkSpecialValue;

impl ActionMkSpecialValue {
    fn special_kinds(mgr: &SolverManager) -> Vec<SortKind> {
        [SortKind::Bv, SortKind::Fp, SortKind::Rm, SortKind::RegLan]
            .into_iter()
            .filter(|&k| mgr.has_sort_of_kind(k) && !mgr.solver().special_values(k).is_empty())
            .collect()
    }
}

impl Action for ActionMkSpecialValue {
    fn kind(&self) -> &'static str {
        "mk-special-value"
    }

    fn applicable(&self, mgr: &SolverManager) -> bool {
        mgr.solver().is_initialized() && !Self::special_kinds(mgr).is_empty()
    }

    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        let kinds = Self::special_kinds(mgr);
        if kinds.is_empty() {
            return Ok(None);
        }
        let kind = *mgr.rng_mut().pick_from_slice(&kinds);
        let Some(sort) = mgr.pick_sort_of_kind(kind, false) else {
            return Ok(None);
        };
        let values = mgr.solver().special_values(kind);
        let value = *mgr.rng_mut().pick_from_slice(&values);
        let line = TraceLine::new(self.kind())
            .arg(sort.to_string())
            .arg(value.name());
        mgr.set_pending_trace(line.clone());
        let term = mgr.solver_mut().mk_special_value(&sort, value)?;
        let term = mgr.add_value(term, sort.clone());
        Ok(Some(line.ret(term.to_string())))
    }

    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError> {
        expect_args(self.kind(), args, 2)?;
        let sort = lookup_sort(mgr, &args[0])?;
        let value: SpecialValue = args[1]
            .text
            .parse()
            .map_err(EngineError::Config)?;
        let term = mgr.solver_mut().mk_special_value(&sort, value)?;
        let term = mgr.add_value(term, sort);
        bind_term(mgr, returns, 0, term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRng;
    use crate::run::RunConfig;
    use crate::trace::tokenize;
    use shrike_smt::backends::stub::StubSolver;

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

    #[test]
    fn mk_sort_produces_interned_sorts_with_trace_lines() {
        let mut mgr = init_manager(1);
        let line = ActionMkSort.run(&mut mgr).unwrap().unwrap();
        assert_eq!(line.kind, "mk-sort");
        assert_eq!(line.returns, vec!["s1"]);
        assert_eq!(mgr.n_sorts(), 1);
    }

    #[test]
    fn mk_sort_untrace_binds_the_traced_id() {
        let mut mgr = init_manager(2);
        ActionMkSort
            .untrace(&mut mgr, &tokens("BV 8"), &tokens("s7"))
            .unwrap();
        let sort = mgr.get_untraced_sort(7).unwrap();
        assert_eq!(sort.kind(), SortKind::Bv);
        assert_eq!(sort.bv_size(), 8);
        // The database id is fresh; the traced id is only a binding.
        assert_eq!(sort.id(), 1);
    }

    #[test]
    fn mk_const_round_trips_through_untrace() {
        let mut mgr = init_manager(3);
        ActionMkSort
            .untrace(&mut mgr, &tokens("BV 4"), &tokens("s1"))
            .unwrap();
        ActionMkConst
            .untrace(&mut mgr, &tokens("s1 \"_x0\""), &tokens("t1"))
            .unwrap();
        let term = mgr.get_untraced_term(1).unwrap();
        assert_eq!(term.sort().bv_size(), 4);
        assert!(mgr.has_term_of_kind(SortKind::Bv));
    }

    #[test]
    fn mk_value_generates_well_formed_bv_literals() {
        let mut mgr = init_manager(4);
        ActionMkSort
            .untrace(&mut mgr, &tokens("BV 8"), &tokens("s1"))
            .unwrap();
        for _ in 0..20 {
            let line = ActionMkValue.run(&mut mgr).unwrap().unwrap();
            assert_eq!(line.kind, "mk-value");
            // Payload: sort, base, quoted digits.
            assert_eq!(line.args.len(), 3);
            assert!(["bin", "dec", "hex"].contains(&line.args[1].as_str()));
        }
    }

    #[test]
    fn mk_value_untrace_handles_all_bases() {
        let mut mgr = init_manager(5);
        ActionMkSort
            .untrace(&mut mgr, &tokens("BV 8"), &tokens("s1"))
            .unwrap();
        ActionMkValue
            .untrace(&mut mgr, &tokens("s1 bin \"00001111\""), &tokens("t1"))
            .unwrap();
        ActionMkValue
            .untrace(&mut mgr, &tokens("s1 dec \"15\""), &tokens("t2"))
            .unwrap();
        ActionMkValue
            .untrace(&mut mgr, &tokens("s1 hex \"f\""), &tokens("t3"))
            .unwrap();
        // All three literals denote the same value and intern to one term.
        let a = mgr.get_untraced_term(1).unwrap();
        let b = mgr.get_untraced_term(2).unwrap();
        let c = mgr.get_untraced_term(3).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(a.is_value());
    }

    #[test]
    fn mk_special_value_covers_bv_catalog() {
        let mut mgr = init_manager(6);
        ActionMkSort
            .untrace(&mut mgr, &tokens("BV 4"), &tokens("s1"))
            .unwrap();
        for name in ["zero", "one", "ones", "min-signed", "max-signed"] {
            let args = tokens(&format!("s1 {name}"));
            let rets = tokens(&format!("t{}", name.len()));
            ActionMkSpecialValue.untrace(&mut mgr, &args, &rets).unwrap();
        }
    }

    #[test]
    fn mk_var_requires_quantifier_theory() {
        // The stub does not support quantifiers, so mk-var never applies.
        let mut mgr = init_manager(7);
        ActionMkSort
            .untrace(&mut mgr, &tokens("BOOL"), &tokens("s1"))
            .unwrap();
        assert!(!ActionMkVar.applicable(&mgr));
    }

    #[test]
    fn unresolved_sort_id_is_reported() {
        let mut mgr = init_manager(8);
        let err = ActionMkConst
            .untrace(&mut mgr, &tokens("s99 \"x\""), &tokens("t1"))
            .unwrap_err();
        assert!(err.to_string().contains("unresolved sort id s99"));
    }
}
