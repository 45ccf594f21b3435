//! Deterministic in-process back-end over Bool and BV.
//!
//! The stub gives the fuzzer a solver with observable verdict semantics and
//! no external dependency: every assertion is evaluated bottom-up under a
//! canonical assignment (each fresh constant receives a value derived from
//! its symbol), and `check_sat` reports `sat` iff all assertions evaluate to
//! true. Two stubs always agree on the same trace, so the stub doubles as a
//! cross-check reference; [`StubBug`] injects reproducible wrong-result bugs
//! for the test suite.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::op::{self, OpKind};
use crate::options::SolverOption;
use crate::solver::{Base, SatResult, Solver, SolverError, SpecialValue, Value};
use crate::sort::{Sort, SortHandle, SortKind};
use crate::term::{Term, TermHandle};
use crate::theory::Theory;

/// Injectable deterministic misbehavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubBug {
    #[default]
    None,
    /// `mk_term(BV_AND, ..)` silently builds `BV_OR` instead.
    AndBecomesOr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Repr {
    Bool,
    Bv(u32),
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Expr {
    Const { symbol: String, sort: Repr },
    BoolVal(bool),
    BvVal { bits: u128, width: u32 },
    App {
        kind: OpKind,
        indices: Vec<u32>,
        args: Vec<Rc<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Val {
    B(bool),
    Bv { bits: u128, width: u32 },
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// FNV-1a, pinned here so canonical assignments are stable across builds.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[derive(Debug)]
struct StubSortHandle {
    repr: Repr,
}

impl SortHandle for StubSortHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_key(&self) -> u64 {
        match self.repr {
            Repr::Bool => 1,
            Repr::Bv(w) => 0x4000_0000_0000_0000 | u64::from(w),
        }
    }

    fn equals(&self, other: &dyn SortHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<StubSortHandle>()
            .is_some_and(|o| o.repr == self.repr)
    }

    fn render(&self) -> String {
        match self.repr {
            Repr::Bool => "Bool".to_string(),
            Repr::Bv(w) => format!("(_ BitVec {w})"),
        }
    }
}

#[derive(Debug)]
struct StubTermHandle {
    expr: Rc<Expr>,
    sort: Repr,
}

impl TermHandle for StubTermHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_key(&self) -> u64 {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        self.expr.hash(&mut h);
        h.finish()
    }

    fn equals(&self, other: &dyn TermHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<StubTermHandle>()
            .is_some_and(|o| o.expr == self.expr)
    }

    fn render(&self) -> String {
        format!("{:?}", self.expr)
    }
}

/// The stub solver.
pub struct StubSolver {
    initialized: bool,
    bug: StubBug,
    max_bv_width: u32,
    /// Assertion scope stack; index 0 is the global scope.
    scopes: Vec<Vec<Rc<Expr>>>,
    options: IndexMap<String, String>,
    incremental: bool,
    model_gen: bool,
    unsat_assumptions: bool,
    unsat_cores: bool,
    last_assumptions: Vec<Term>,
}

impl StubSolver {
    pub fn new() -> Self {
        StubSolver {
            initialized: false,
            bug: StubBug::None,
            max_bv_width: 128,
            scopes: vec![Vec::new()],
            options: IndexMap::new(),
            incremental: false,
            model_gen: false,
            unsat_assumptions: false,
            unsat_cores: false,
            last_assumptions: Vec::new(),
        }
    }

    pub fn with_bug(bug: StubBug) -> Self {
        let mut solver = Self::new();
        solver.bug = bug;
        solver
    }

    pub fn with_max_bv_width(mut self, max: u32) -> Self {
        self.max_bv_width = max.min(128);
        self
    }

    fn expr_of(term: &Term) -> Result<Rc<Expr>, SolverError> {
        term.handle()
            .as_any()
            .downcast_ref::<StubTermHandle>()
            .map(|h| Rc::clone(&h.expr))
            .ok_or_else(|| SolverError::Backend("foreign term handle".to_string()))
    }

    fn repr_of(term: &Term) -> Result<Repr, SolverError> {
        term.handle()
            .as_any()
            .downcast_ref::<StubTermHandle>()
            .map(|h| h.sort.clone())
            .ok_or_else(|| SolverError::Backend("foreign term handle".to_string()))
    }

    fn sort_repr(sort: &Sort) -> Result<Repr, SolverError> {
        sort.handle()
            .as_any()
            .downcast_ref::<StubSortHandle>()
            .map(|h| h.repr.clone())
            .ok_or_else(|| SolverError::Backend("foreign sort handle".to_string()))
    }

    fn wrap_sort(repr: Repr) -> Sort {
        match repr {
            Repr::Bool => Sort::new(SortKind::Bool, Box::new(StubSortHandle { repr: Repr::Bool })),
            Repr::Bv(w) => Sort::new_bv(w, Box::new(StubSortHandle { repr: Repr::Bv(w) })),
        }
    }

    fn wrap_term(expr: Rc<Expr>, repr: Repr) -> Term {
        let sort = Self::wrap_sort(repr.clone());
        Term::new(sort, Box::new(StubTermHandle { expr, sort: repr }))
    }

    fn canonical(symbol: &str, sort: &Repr) -> Val {
        let h = fnv1a(symbol.as_bytes());
        match sort {
            Repr::Bool => Val::B(h & 1 == 1),
            Repr::Bv(w) => Val::Bv {
                bits: u128::from(h) & mask(*w),
                width: *w,
            },
        }
    }

    fn eval(expr: &Expr) -> Result<Val, SolverError> {
        match expr {
            Expr::Const { symbol, sort } => Ok(Self::canonical(symbol, sort)),
            Expr::BoolVal(b) => Ok(Val::B(*b)),
            Expr::BvVal { bits, width } => Ok(Val::Bv {
                bits: *bits,
                width: *width,
            }),
            Expr::App { kind, indices, args } => Self::eval_app(kind, indices, args),
        }
    }

    fn eval_bool(expr: &Expr) -> Result<bool, SolverError> {
        match Self::eval(expr)? {
            Val::B(b) => Ok(b),
            Val::Bv { .. } => Err(SolverError::Backend("expected Bool operand".to_string())),
        }
    }

    fn eval_bv(expr: &Expr) -> Result<(u128, u32), SolverError> {
        match Self::eval(expr)? {
            Val::Bv { bits, width } => Ok((bits, width)),
            Val::B(_) => Err(SolverError::Backend("expected BV operand".to_string())),
        }
    }

    fn to_signed(bits: u128, width: u32) -> i128 {
        let sign_bit = 1u128 << (width - 1);
        if bits & sign_bit != 0 {
            (bits as i128) - ((mask(width) as i128) + 1)
        } else {
            bits as i128
        }
    }

    fn from_signed(value: i128, width: u32) -> u128 {
        (value as u128) & mask(width)
    }

    fn eval_app(kind: &str, indices: &[u32], args: &[Rc<Expr>]) -> Result<Val, SolverError> {
        match kind {
            op::OP_AND => {
                for a in args {
                    if !Self::eval_bool(a)? {
                        return Ok(Val::B(false));
                    }
                }
                Ok(Val::B(true))
            }
            op::OP_OR => {
                for a in args {
                    if Self::eval_bool(a)? {
                        return Ok(Val::B(true));
                    }
                }
                Ok(Val::B(false))
            }
            op::OP_XOR => {
                let mut acc = false;
                for a in args {
                    acc ^= Self::eval_bool(a)?;
                }
                Ok(Val::B(acc))
            }
            op::OP_NOT => Ok(Val::B(!Self::eval_bool(&args[0])?)),
            op::OP_IMPLIES => {
                // Right-associative: a => b => c is a => (b => c).
                let mut acc = Self::eval_bool(&args[args.len() - 1])?;
                for a in args[..args.len() - 1].iter().rev() {
                    acc = !Self::eval_bool(a)? || acc;
                }
                Ok(Val::B(acc))
            }
            op::OP_EQUAL => {
                let first = Self::eval(&args[0])?;
                for a in &args[1..] {
                    if Self::eval(a)? != first {
                        return Ok(Val::B(false));
                    }
                }
                Ok(Val::B(true))
            }
            op::OP_DISTINCT => {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(Self::eval(a)?);
                }
                for i in 0..vals.len() {
                    for j in i + 1..vals.len() {
                        if vals[i] == vals[j] {
                            return Ok(Val::B(false));
                        }
                    }
                }
                Ok(Val::B(true))
            }
            op::OP_ITE => {
                if Self::eval_bool(&args[0])? {
                    Self::eval(&args[1])
                } else {
                    Self::eval(&args[2])
                }
            }
            op::OP_BV_CONCAT => {
                let (mut bits, mut width) = Self::eval_bv(&args[0])?;
                for a in &args[1..] {
                    let (b, w) = Self::eval_bv(a)?;
                    bits = (bits << w) | b;
                    width += w;
                }
                Ok(Val::Bv { bits: bits & mask(width), width })
            }
            op::OP_BV_NOT => {
                let (bits, width) = Self::eval_bv(&args[0])?;
                Ok(Val::Bv { bits: !bits & mask(width), width })
            }
            op::OP_BV_NEG => {
                let (bits, width) = Self::eval_bv(&args[0])?;
                Ok(Val::Bv {
                    bits: bits.wrapping_neg() & mask(width),
                    width,
                })
            }
            op::OP_BV_AND | op::OP_BV_OR | op::OP_BV_XOR | op::OP_BV_NAND | op::OP_BV_NOR
            | op::OP_BV_XNOR | op::OP_BV_ADD | op::OP_BV_SUB | op::OP_BV_MUL | op::OP_BV_UDIV
            | op::OP_BV_UREM | op::OP_BV_SDIV | op::OP_BV_SREM | op::OP_BV_SMOD
            | op::OP_BV_SHL | op::OP_BV_LSHR | op::OP_BV_ASHR => {
                let (a, width) = Self::eval_bv(&args[0])?;
                let (b, _) = Self::eval_bv(&args[1])?;
                let m = mask(width);
                let bits = match kind {
                    op::OP_BV_AND => a & b,
                    op::OP_BV_OR => a | b,
                    op::OP_BV_XOR => a ^ b,
                    op::OP_BV_NAND => !(a & b),
                    op::OP_BV_NOR => !(a | b),
                    op::OP_BV_XNOR => !(a ^ b),
                    op::OP_BV_ADD => a.wrapping_add(b),
                    op::OP_BV_SUB => a.wrapping_sub(b),
                    op::OP_BV_MUL => a.wrapping_mul(b),
                    op::OP_BV_UDIV => {
                        if b == 0 {
                            m
                        } else {
                            a / b
                        }
                    }
                    op::OP_BV_UREM => {
                        if b == 0 {
                            a
                        } else {
                            a % b
                        }
                    }
                    op::OP_BV_SDIV => {
                        let (sa, sb) = (Self::to_signed(a, width), Self::to_signed(b, width));
                        if sb == 0 {
                            if sa >= 0 {
                                m
                            } else {
                                1
                            }
                        } else {
                            Self::from_signed(sa.wrapping_div(sb), width)
                        }
                    }
                    op::OP_BV_SREM => {
                        let (sa, sb) = (Self::to_signed(a, width), Self::to_signed(b, width));
                        if sb == 0 {
                            a
                        } else {
                            Self::from_signed(sa.wrapping_rem(sb), width)
                        }
                    }
                    op::OP_BV_SMOD => {
                        let (sa, sb) = (Self::to_signed(a, width), Self::to_signed(b, width));
                        if sb == 0 {
                            a
                        } else {
                            let r = sa.rem_euclid(sb.abs());
                            let r = if sb < 0 && r != 0 { r + sb } else { r };
                            Self::from_signed(r, width)
                        }
                    }
                    op::OP_BV_SHL => {
                        if b >= u128::from(width) {
                            0
                        } else {
                            a << b
                        }
                    }
                    op::OP_BV_LSHR => {
                        if b >= u128::from(width) {
                            0
                        } else {
                            a >> b
                        }
                    }
                    op::OP_BV_ASHR => {
                        let sign = a & (1u128 << (width - 1)) != 0;
                        if b >= u128::from(width) {
                            if sign {
                                m
                            } else {
                                0
                            }
                        } else {
                            let shifted = a >> b;
                            if sign {
                                let fill = m & !(m >> b);
                                shifted | fill
                            } else {
                                shifted
                            }
                        }
                    }
                    _ => unreachable!(),
                };
                Ok(Val::Bv { bits: bits & m, width })
            }
            op::OP_BV_COMP => {
                let (a, _) = Self::eval_bv(&args[0])?;
                let (b, _) = Self::eval_bv(&args[1])?;
                Ok(Val::Bv {
                    bits: u128::from(a == b),
                    width: 1,
                })
            }
            op::OP_BV_ULT | op::OP_BV_ULE | op::OP_BV_UGT | op::OP_BV_UGE => {
                let (a, _) = Self::eval_bv(&args[0])?;
                let (b, _) = Self::eval_bv(&args[1])?;
                Ok(Val::B(match kind {
                    op::OP_BV_ULT => a < b,
                    op::OP_BV_ULE => a <= b,
                    op::OP_BV_UGT => a > b,
                    _ => a >= b,
                }))
            }
            op::OP_BV_SLT | op::OP_BV_SLE | op::OP_BV_SGT | op::OP_BV_SGE => {
                let (a, width) = Self::eval_bv(&args[0])?;
                let (b, _) = Self::eval_bv(&args[1])?;
                let (sa, sb) = (Self::to_signed(a, width), Self::to_signed(b, width));
                Ok(Val::B(match kind {
                    op::OP_BV_SLT => sa < sb,
                    op::OP_BV_SLE => sa <= sb,
                    op::OP_BV_SGT => sa > sb,
                    _ => sa >= sb,
                }))
            }
            op::OP_BV_EXTRACT => {
                let (bits, _) = Self::eval_bv(&args[0])?;
                let (hi, lo) = (indices[0], indices[1]);
                let width = hi - lo + 1;
                Ok(Val::Bv {
                    bits: (bits >> lo) & mask(width),
                    width,
                })
            }
            op::OP_BV_ZERO_EXTEND => {
                let (bits, width) = Self::eval_bv(&args[0])?;
                Ok(Val::Bv {
                    bits,
                    width: width + indices[0],
                })
            }
            op::OP_BV_SIGN_EXTEND => {
                let (bits, width) = Self::eval_bv(&args[0])?;
                let new_width = width + indices[0];
                let sign = bits & (1u128 << (width - 1)) != 0;
                let bits = if sign {
                    bits | (mask(new_width) & !mask(width))
                } else {
                    bits
                };
                Ok(Val::Bv { bits, width: new_width })
            }
            op::OP_BV_ROTATE_LEFT | op::OP_BV_ROTATE_RIGHT => {
                let (bits, width) = Self::eval_bv(&args[0])?;
                let n = indices[0] % width;
                let bits = if n == 0 {
                    bits
                } else if kind == op::OP_BV_ROTATE_LEFT {
                    ((bits << n) | (bits >> (width - n))) & mask(width)
                } else {
                    ((bits >> n) | (bits << (width - n))) & mask(width)
                };
                Ok(Val::Bv { bits, width })
            }
            op::OP_BV_REPEAT => {
                let (bits, width) = Self::eval_bv(&args[0])?;
                let n = indices[0];
                let mut acc = 0u128;
                for _ in 0..n {
                    acc = (acc << width) | bits;
                }
                Ok(Val::Bv {
                    bits: acc & mask(width * n),
                    width: width * n,
                })
            }
            other => Err(SolverError::Unsupported(format!(
                "stub cannot evaluate operator {other}"
            ))),
        }
    }

    /// Result sort of an application, validated against operand sorts.
    fn result_repr(
        kind: &str,
        indices: &[u32],
        args: &[Rc<Expr>],
        arg_reprs: &[Repr],
    ) -> Result<Repr, SolverError> {
        let bv_width = |r: &Repr| match r {
            Repr::Bv(w) => Ok(*w),
            Repr::Bool => Err(SolverError::Backend(format!(
                "operator {kind} expects BV operands"
            ))),
        };
        match kind {
            op::OP_AND | op::OP_OR | op::OP_XOR | op::OP_NOT | op::OP_IMPLIES | op::OP_EQUAL
            | op::OP_DISTINCT | op::OP_BV_ULT | op::OP_BV_ULE | op::OP_BV_UGT | op::OP_BV_UGE
            | op::OP_BV_SLT | op::OP_BV_SLE | op::OP_BV_SGT | op::OP_BV_SGE => Ok(Repr::Bool),
            op::OP_ITE => Ok(arg_reprs[1].clone()),
            op::OP_BV_CONCAT => {
                let mut width = 0;
                for r in arg_reprs {
                    width += bv_width(r)?;
                }
                Ok(Repr::Bv(width))
            }
            op::OP_BV_COMP => Ok(Repr::Bv(1)),
            op::OP_BV_EXTRACT => {
                let width = bv_width(&arg_reprs[0])?;
                let (hi, lo) = (indices[0], indices[1]);
                if lo > hi || hi >= width {
                    return Err(SolverError::Backend(format!(
                        "extract indices [{hi}:{lo}] out of range for width {width}"
                    )));
                }
                Ok(Repr::Bv(hi - lo + 1))
            }
            op::OP_BV_ZERO_EXTEND | op::OP_BV_SIGN_EXTEND => {
                Ok(Repr::Bv(bv_width(&arg_reprs[0])? + indices[0]))
            }
            op::OP_BV_ROTATE_LEFT | op::OP_BV_ROTATE_RIGHT => {
                Ok(Repr::Bv(bv_width(&arg_reprs[0])?))
            }
            op::OP_BV_REPEAT => {
                let width = bv_width(&arg_reprs[0])?;
                if indices[0] == 0 {
                    return Err(SolverError::Backend("repeat count must be positive".into()));
                }
                Ok(Repr::Bv(width * indices[0]))
            }
            _ if args.is_empty() => Err(SolverError::Backend(format!(
                "operator {kind} needs arguments"
            ))),
            // Remaining BV operators preserve their first operand's width.
            _ => Ok(Repr::Bv(bv_width(&arg_reprs[0])?)),
        }
    }

    fn all_assertions(&self) -> impl Iterator<Item = &Rc<Expr>> {
        self.scopes.iter().flatten()
    }

    fn verdict(&self, extra: &[Rc<Expr>]) -> Result<SatResult, SolverError> {
        for a in self.all_assertions().chain(extra.iter()) {
            if !Self::eval_bool(a)? {
                return Ok(SatResult::Unsat);
            }
        }
        Ok(SatResult::Sat)
    }

    fn collect_consts<'a>(expr: &'a Expr, out: &mut IndexMap<&'a str, &'a Repr>) {
        match expr {
            Expr::Const { symbol, sort } => {
                out.entry(symbol.as_str()).or_insert(sort);
            }
            Expr::App { args, .. } => {
                for a in args {
                    Self::collect_consts(a, out);
                }
            }
            _ => {}
        }
    }
}

impl Default for StubSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for StubSolver {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn new_solver(&mut self) -> Result<(), SolverError> {
        self.initialized = true;
        Ok(())
    }

    fn delete_solver(&mut self) -> Result<(), SolverError> {
        self.initialized = false;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn supported_theories(&self) -> Vec<Theory> {
        vec![Theory::Bool, Theory::Bv]
    }

    fn bv_width_range(&self) -> (u32, u32) {
        (1, self.max_bv_width)
    }

    fn option_table(&self) -> Vec<SolverOption> {
        vec![
            SolverOption::list_opt("sat-engine", &["dpll", "cdcl", "lookahead"]),
            SolverOption::int_opt("rewrite-level", 0, 3),
            SolverOption::bool_opt("eager-bit-blast").with_conflicts(&["lazy-bit-blast"]),
            SolverOption::bool_opt("lazy-bit-blast").with_conflicts(&["eager-bit-blast"]),
            SolverOption::bool_opt("model-compress").with_depends(&["produce-models"]),
        ]
    }

    fn mk_sort(&mut self, kind: SortKind) -> Result<Sort, SolverError> {
        match kind {
            SortKind::Bool => Ok(Self::wrap_sort(Repr::Bool)),
            other => Err(SolverError::Unsupported(format!(
                "stub has no sort kind {other}"
            ))),
        }
    }

    fn mk_sort_bv(&mut self, bv_size: u32) -> Result<Sort, SolverError> {
        if bv_size == 0 || bv_size > self.max_bv_width {
            return Err(SolverError::Unsupported(format!(
                "stub supports BV widths 1..={}, got {bv_size}",
                self.max_bv_width
            )));
        }
        Ok(Self::wrap_sort(Repr::Bv(bv_size)))
    }

    fn mk_sort_fp(&mut self, _exp: u32, _sig: u32) -> Result<Sort, SolverError> {
        Err(SolverError::Unsupported("stub has no FP sorts".to_string()))
    }

    fn mk_sort_with_sorts(&mut self, kind: SortKind, _sorts: &[Sort]) -> Result<Sort, SolverError> {
        Err(SolverError::Unsupported(format!(
            "stub has no composite sort kind {kind}"
        )))
    }

    fn mk_const(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        let repr = Self::sort_repr(sort)?;
        let expr = Rc::new(Expr::Const {
            symbol: symbol.to_string(),
            sort: repr.clone(),
        });
        Ok(Self::wrap_term(expr, repr))
    }

    fn mk_var(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        self.mk_const(sort, symbol)
    }

    fn mk_value(&mut self, sort: &Sort, value: &Value) -> Result<Term, SolverError> {
        let repr = Self::sort_repr(sort)?;
        let expr = match (&repr, value) {
            (Repr::Bool, Value::Bool(b)) => Expr::BoolVal(*b),
            (Repr::Bv(w), Value::Bv { digits, base }) => {
                let radix = match base {
                    Base::Bin => 2,
                    Base::Dec => 10,
                    Base::Hex => 16,
                };
                let bits = u128::from_str_radix(digits, radix)
                    .map_err(|e| SolverError::Backend(format!("bad BV literal `{digits}`: {e}")))?;
                Expr::BvVal {
                    bits: bits & mask(*w),
                    width: *w,
                }
            }
            (_, value) => {
                return Err(SolverError::Backend(format!(
                    "value {value:?} does not fit sort {}",
                    sort.handle().render()
                )))
            }
        };
        Ok(Self::wrap_term(Rc::new(expr), repr))
    }

    fn mk_special_value(&mut self, sort: &Sort, value: SpecialValue) -> Result<Term, SolverError> {
        let repr = Self::sort_repr(sort)?;
        let Repr::Bv(w) = repr else {
            return Err(SolverError::Unsupported(format!(
                "stub has no special values for {}",
                sort.handle().render()
            )));
        };
        let bits = match value {
            SpecialValue::BvZero => 0,
            SpecialValue::BvOne => 1,
            SpecialValue::BvOnes => mask(w),
            SpecialValue::BvMinSigned => 1u128 << (w - 1),
            SpecialValue::BvMaxSigned => mask(w) >> 1,
            other => {
                return Err(SolverError::Unsupported(format!(
                    "special value {other} is not a BV value"
                )))
            }
        };
        Ok(Self::wrap_term(
            Rc::new(Expr::BvVal { bits, width: w }),
            Repr::Bv(w),
        ))
    }

    fn mk_term(
        &mut self,
        kind: OpKind,
        args: &[Term],
        indices: &[u32],
    ) -> Result<Term, SolverError> {
        let kind = match (self.bug, kind) {
            (StubBug::AndBecomesOr, op::OP_BV_AND) => op::OP_BV_OR,
            (_, k) => k,
        };
        let mut exprs = Vec::with_capacity(args.len());
        let mut reprs = Vec::with_capacity(args.len());
        for a in args {
            exprs.push(Self::expr_of(a)?);
            reprs.push(Self::repr_of(a)?);
        }
        let result = Self::result_repr(kind, indices, &exprs, &reprs)?;
        let expr = Rc::new(Expr::App {
            kind,
            indices: indices.to_vec(),
            args: exprs,
        });
        // Reject ill-typed applications eagerly so the engine sees the
        // failure on the mk-term call, not on a later check-sat.
        Self::eval(&expr)?;
        Ok(Self::wrap_term(expr, result))
    }

    fn sort_of(&mut self, term: &Term, _hint: SortKind) -> Result<Sort, SolverError> {
        Ok(Self::wrap_sort(Self::repr_of(term)?))
    }

    fn assert_formula(&mut self, term: &Term) -> Result<(), SolverError> {
        let expr = Self::expr_of(term)?;
        Self::eval_bool(&expr)?;
        self.scopes
            .last_mut()
            .ok_or_else(|| SolverError::Backend("no assertion scope".to_string()))?
            .push(expr);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        self.last_assumptions.clear();
        self.verdict(&[])
    }

    fn check_sat_assuming(&mut self, assumptions: &[Term]) -> Result<SatResult, SolverError> {
        let mut extra = Vec::with_capacity(assumptions.len());
        for a in assumptions {
            extra.push(Self::expr_of(a)?);
        }
        self.last_assumptions = assumptions.to_vec();
        self.verdict(&extra)
    }

    fn get_unsat_assumptions(&mut self) -> Result<Vec<Term>, SolverError> {
        let mut failed = Vec::new();
        for a in &self.last_assumptions {
            let expr = Self::expr_of(a)?;
            if !Self::eval_bool(&expr)? {
                failed.push(a.clone());
            }
        }
        Ok(failed)
    }

    fn get_unsat_core(&mut self) -> Result<Vec<Term>, SolverError> {
        let mut core = Vec::new();
        for expr in self.all_assertions() {
            if !Self::eval_bool(expr)? {
                core.push(Self::wrap_term(
                    Rc::clone(expr),
                    Repr::Bool,
                ));
            }
        }
        Ok(core)
    }

    fn is_unsat_assumption(&self, term: &Term) -> bool {
        self.last_assumptions.iter().any(|a| a == term)
    }

    fn get_value(&mut self, terms: &[Term]) -> Result<Vec<Term>, SolverError> {
        let mut out = Vec::with_capacity(terms.len());
        for t in terms {
            let expr = Self::expr_of(t)?;
            let value = match Self::eval(&expr)? {
                Val::B(b) => Self::wrap_term(Rc::new(Expr::BoolVal(b)), Repr::Bool),
                Val::Bv { bits, width } => Self::wrap_term(
                    Rc::new(Expr::BvVal { bits, width }),
                    Repr::Bv(width),
                ),
            };
            out.push(value);
        }
        Ok(out)
    }

    fn push(&mut self, n_levels: u32) -> Result<(), SolverError> {
        for _ in 0..n_levels {
            self.scopes.push(Vec::new());
        }
        Ok(())
    }

    fn pop(&mut self, n_levels: u32) -> Result<(), SolverError> {
        if n_levels as usize >= self.scopes.len() {
            return Err(SolverError::Backend(format!(
                "cannot pop {n_levels} of {} scopes",
                self.scopes.len() - 1
            )));
        }
        for _ in 0..n_levels {
            self.scopes.pop();
        }
        Ok(())
    }

    fn print_model(&mut self) -> Result<String, SolverError> {
        let mut consts = IndexMap::new();
        for a in self.all_assertions() {
            Self::collect_consts(a, &mut consts);
        }
        let mut out = String::from("(\n");
        for (symbol, sort) in consts {
            let rendered = match Self::canonical(symbol, sort) {
                Val::B(b) => b.to_string(),
                Val::Bv { bits, width } => format!("#b{bits:0>width$b}", width = width as usize),
            };
            let sort_str = StubSortHandle { repr: sort.clone() }.render();
            out.push_str(&format!("  (define-fun {symbol} () {sort_str} {rendered})\n"));
        }
        out.push(')');
        Ok(out)
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.scopes = vec![Vec::new()];
        self.options.clear();
        self.incremental = false;
        self.model_gen = false;
        self.unsat_assumptions = false;
        self.unsat_cores = false;
        self.last_assumptions.clear();
        Ok(())
    }

    fn reset_assertions(&mut self) -> Result<(), SolverError> {
        self.scopes = vec![Vec::new()];
        self.last_assumptions.clear();
        Ok(())
    }

    fn set_opt(&mut self, name: &str, value: &str) -> Result<(), SolverError> {
        let on = value == "true";
        if name == self.option_name_incremental() {
            self.incremental = on;
        } else if name == self.option_name_model_gen() {
            self.model_gen = on;
        } else if name == self.option_name_unsat_assumptions() {
            self.unsat_assumptions = on;
        } else if name == self.option_name_unsat_cores() {
            self.unsat_cores = on;
        }
        self.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn option_incremental_enabled(&self) -> bool {
        self.incremental
    }

    fn option_model_gen_enabled(&self) -> bool {
        self.model_gen
    }

    fn option_unsat_assumptions_enabled(&self) -> bool {
        self.unsat_assumptions
    }

    fn option_unsat_cores_enabled(&self) -> bool {
        self.unsat_cores
    }
}
