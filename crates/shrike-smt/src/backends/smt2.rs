//! SMT-LIB 2 pipe back-end.
//!
//! Talks to an arbitrary SMT-LIB 2 compliant solver binary over
//! stdin/stdout, or dumps the command stream to a writer when no binary is
//! configured. Sort and term handles carry the printed SMT-LIB text, so
//! equality is text equality.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::op::{self, OpKind};
use crate::options::SolverOption;
use crate::solver::{Base, SatResult, Solver, SolverError, SpecialValue, Value};
use crate::sort::{Sort, SortHandle, SortKind};
use crate::term::{Term, TermHandle};
use crate::theory::Theory;

#[derive(Debug)]
struct Smt2SortHandle {
    repr: String,
}

impl SortHandle for Smt2SortHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_key(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.repr.hash(&mut h);
        h.finish()
    }

    fn equals(&self, other: &dyn SortHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<Smt2SortHandle>()
            .is_some_and(|o| o.repr == self.repr)
    }

    fn render(&self) -> String {
        self.repr.clone()
    }
}

#[derive(Debug)]
struct Smt2TermHandle {
    repr: String,
    sort: Sort,
}

impl TermHandle for Smt2TermHandle {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn hash_key(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.repr.hash(&mut h);
        h.finish()
    }

    fn equals(&self, other: &dyn TermHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<Smt2TermHandle>()
            .is_some_and(|o| o.repr == self.repr)
    }

    fn render(&self) -> String {
        self.repr.clone()
    }
}

enum Channel {
    /// Connected to a running solver process.
    Online {
        child: Child,
        stdin: ChildStdin,
        stdout: BufReader<ChildStdout>,
    },
    /// Dump-only; responses are synthesized as `unknown`.
    Offline { sink: Box<dyn Write> },
    /// Not yet started.
    Idle,
}

/// The SMT-LIB 2 back-end.
pub struct Smt2Solver {
    binary: Option<String>,
    binary_args: Vec<String>,
    channel: Channel,
    started: bool,
    incremental: bool,
    model_gen: bool,
    unsat_assumptions: bool,
    unsat_cores: bool,
    last_assumptions: Vec<Term>,
}

impl Smt2Solver {
    /// Pipe into `binary`; commands are answered by the live process.
    pub fn online(binary: &str, args: &[String]) -> Self {
        Smt2Solver {
            binary: Some(binary.to_string()),
            binary_args: args.to_vec(),
            channel: Channel::Idle,
            started: false,
            incremental: false,
            model_gen: false,
            unsat_assumptions: false,
            unsat_cores: false,
            last_assumptions: Vec::new(),
        }
    }

    /// Dump the command stream to `sink`; checks answer `unknown`.
    pub fn offline(sink: Box<dyn Write>) -> Self {
        Smt2Solver {
            binary: None,
            binary_args: Vec::new(),
            channel: Channel::Offline { sink },
            started: false,
            incremental: false,
            model_gen: false,
            unsat_assumptions: false,
            unsat_cores: false,
            last_assumptions: Vec::new(),
        }
    }

    fn send(&mut self, cmd: &str) -> Result<(), SolverError> {
        match &mut self.channel {
            Channel::Online { stdin, .. } => {
                writeln!(stdin, "{cmd}")?;
                stdin.flush()?;
                Ok(())
            }
            Channel::Offline { sink } => {
                writeln!(sink, "{cmd}")?;
                Ok(())
            }
            Channel::Idle => Err(SolverError::Backend(
                "solver process not started".to_string(),
            )),
        }
    }

    /// Send a command and read one line of response (online only).
    fn query(&mut self, cmd: &str) -> Result<Option<String>, SolverError> {
        self.send(cmd)?;
        match &mut self.channel {
            Channel::Online { stdout, .. } => {
                let mut response = String::new();
                stdout.read_line(&mut response)?;
                if response.is_empty() {
                    return Err(SolverError::Backend(format!(
                        "no response from solver for command `{cmd}`"
                    )));
                }
                Ok(Some(response.trim_end().to_string()))
            }
            _ => Ok(None),
        }
    }

    /// Read a response until its parentheses balance (online only).
    fn query_sexpr(&mut self, cmd: &str) -> Result<Option<String>, SolverError> {
        self.send(cmd)?;
        match &mut self.channel {
            Channel::Online { stdout, .. } => {
                let mut response = String::new();
                loop {
                    let before = response.len();
                    stdout.read_line(&mut response)?;
                    if response.len() == before {
                        return Err(SolverError::Backend(format!(
                            "truncated response for command `{cmd}`"
                        )));
                    }
                    let depth: i64 = response
                        .chars()
                        .map(|c| match c {
                            '(' => 1,
                            ')' => -1,
                            _ => 0,
                        })
                        .sum();
                    if depth <= 0 && response.trim_start().starts_with('(') {
                        break;
                    }
                    if !response.trim_start().starts_with('(') {
                        // Single-token response (e.g. an error message).
                        break;
                    }
                }
                Ok(Some(response.trim_end().to_string()))
            }
            _ => Ok(None),
        }
    }

    fn parse_sat(&self, response: Option<String>) -> Result<SatResult, SolverError> {
        match response {
            None => Ok(SatResult::Unknown),
            Some(line) => line
                .parse::<SatResult>()
                .map_err(|_| SolverError::Backend(format!("unexpected solver output: {line}"))),
        }
    }

    fn repr_of(term: &Term) -> Result<&str, SolverError> {
        term.handle()
            .as_any()
            .downcast_ref::<Smt2TermHandle>()
            .map(|h| h.repr.as_str())
            .ok_or_else(|| SolverError::Backend("foreign term handle".to_string()))
    }

    fn sort_repr(sort: &Sort) -> Result<&str, SolverError> {
        sort.handle()
            .as_any()
            .downcast_ref::<Smt2SortHandle>()
            .map(|h| h.repr.as_str())
            .ok_or_else(|| SolverError::Backend("foreign sort handle".to_string()))
    }

    fn wrap_term(repr: String, sort: Sort) -> Term {
        Term::new(sort.clone(), Box::new(Smt2TermHandle { repr, sort }))
    }

    fn simple_sort(kind: SortKind) -> Result<Sort, SolverError> {
        let repr = match kind {
            SortKind::Bool => "Bool",
            SortKind::Int => "Int",
            SortKind::Real => "Real",
            SortKind::String => "String",
            SortKind::RegLan => "RegLan",
            SortKind::Rm => "RoundingMode",
            other => {
                return Err(SolverError::Unsupported(format!(
                    "sort kind {other} needs parameters"
                )))
            }
        };
        Ok(Sort::new(
            kind,
            Box::new(Smt2SortHandle {
                repr: repr.to_string(),
            }),
        ))
    }

    /// SMT-LIB operator symbol (indexed operators handled separately).
    fn op_symbol(kind: OpKind) -> Result<&'static str, SolverError> {
        Ok(match kind {
            op::OP_AND => "and",
            op::OP_OR => "or",
            op::OP_XOR => "xor",
            op::OP_NOT => "not",
            op::OP_IMPLIES => "=>",
            op::OP_EQUAL => "=",
            op::OP_DISTINCT => "distinct",
            op::OP_ITE => "ite",
            op::OP_BV_CONCAT => "concat",
            op::OP_BV_AND => "bvand",
            op::OP_BV_OR => "bvor",
            op::OP_BV_XOR => "bvxor",
            op::OP_BV_NAND => "bvnand",
            op::OP_BV_NOR => "bvnor",
            op::OP_BV_XNOR => "bvxnor",
            op::OP_BV_NOT => "bvnot",
            op::OP_BV_NEG => "bvneg",
            op::OP_BV_ADD => "bvadd",
            op::OP_BV_SUB => "bvsub",
            op::OP_BV_MUL => "bvmul",
            op::OP_BV_UDIV => "bvudiv",
            op::OP_BV_UREM => "bvurem",
            op::OP_BV_SDIV => "bvsdiv",
            op::OP_BV_SREM => "bvsrem",
            op::OP_BV_SMOD => "bvsmod",
            op::OP_BV_SHL => "bvshl",
            op::OP_BV_LSHR => "bvlshr",
            op::OP_BV_ASHR => "bvashr",
            op::OP_BV_COMP => "bvcomp",
            op::OP_BV_ULT => "bvult",
            op::OP_BV_ULE => "bvule",
            op::OP_BV_UGT => "bvugt",
            op::OP_BV_UGE => "bvuge",
            op::OP_BV_SLT => "bvslt",
            op::OP_BV_SLE => "bvsle",
            op::OP_BV_SGT => "bvsgt",
            op::OP_BV_SGE => "bvsge",
            op::OP_INT_NEG | op::OP_INT_SUB | op::OP_REAL_NEG | op::OP_REAL_SUB => "-",
            op::OP_INT_ABS => "abs",
            op::OP_INT_ADD | op::OP_REAL_ADD => "+",
            op::OP_INT_MUL | op::OP_REAL_MUL => "*",
            op::OP_INT_DIV => "div",
            op::OP_INT_MOD => "mod",
            op::OP_REAL_DIV => "/",
            op::OP_INT_LT | op::OP_REAL_LT => "<",
            op::OP_INT_LE | op::OP_REAL_LE => "<=",
            op::OP_INT_GT | op::OP_REAL_GT => ">",
            op::OP_INT_GE | op::OP_REAL_GE => ">=",
            op::OP_INT_TO_REAL => "to_real",
            op::OP_REAL_IS_INT => "is_int",
            op::OP_REAL_TO_INT => "to_int",
            op::OP_ARRAY_SELECT => "select",
            op::OP_ARRAY_STORE => "store",
            op::OP_FP_ABS => "fp.abs",
            op::OP_FP_NEG => "fp.neg",
            op::OP_FP_ADD => "fp.add",
            op::OP_FP_SUB => "fp.sub",
            op::OP_FP_MUL => "fp.mul",
            op::OP_FP_DIV => "fp.div",
            op::OP_FP_FMA => "fp.fma",
            op::OP_FP_SQRT => "fp.sqrt",
            op::OP_FP_REM => "fp.rem",
            op::OP_FP_RTI => "fp.roundToIntegral",
            op::OP_FP_MIN => "fp.min",
            op::OP_FP_MAX => "fp.max",
            op::OP_FP_EQ => "fp.eq",
            op::OP_FP_LEQ => "fp.leq",
            op::OP_FP_LT => "fp.lt",
            op::OP_FP_GEQ => "fp.geq",
            op::OP_FP_GT => "fp.gt",
            op::OP_FP_IS_NORMAL => "fp.isNormal",
            op::OP_FP_IS_SUBNORMAL => "fp.isSubnormal",
            op::OP_FP_IS_ZERO => "fp.isZero",
            op::OP_FP_IS_INF => "fp.isInfinite",
            op::OP_FP_IS_NAN => "fp.isNaN",
            op::OP_FP_IS_NEG => "fp.isNegative",
            op::OP_FP_IS_POS => "fp.isPositive",
            op::OP_STR_CONCAT => "str.++",
            op::OP_STR_LEN => "str.len",
            op::OP_STR_LT => "str.<",
            op::OP_STR_AT => "str.at",
            op::OP_STR_SUBSTR => "str.substr",
            op::OP_STR_PREFIXOF => "str.prefixof",
            op::OP_STR_SUFFIXOF => "str.suffixof",
            op::OP_STR_CONTAINS => "str.contains",
            op::OP_STR_INDEXOF => "str.indexof",
            op::OP_STR_REPLACE => "str.replace",
            op::OP_STR_REPLACE_ALL => "str.replace_all",
            op::OP_STR_IS_DIGIT => "str.is_digit",
            op::OP_STR_TO_INT => "str.to_int",
            op::OP_STR_FROM_INT => "str.from_int",
            op::OP_STR_TO_RE => "str.to_re",
            op::OP_STR_IN_RE => "str.in_re",
            op::OP_RE_CONCAT => "re.++",
            op::OP_RE_UNION => "re.union",
            op::OP_RE_INTER => "re.inter",
            op::OP_RE_STAR => "re.*",
            op::OP_RE_PLUS => "re.+",
            op::OP_RE_OPT => "re.opt",
            op::OP_RE_RANGE => "re.range",
            other => {
                return Err(SolverError::Unsupported(format!(
                    "no SMT-LIB rendering for operator {other}"
                )))
            }
        })
    }

    fn indexed_op_symbol(kind: OpKind, indices: &[u32]) -> Result<String, SolverError> {
        Ok(match kind {
            op::OP_BV_EXTRACT => format!("(_ extract {} {})", indices[0], indices[1]),
            op::OP_BV_ZERO_EXTEND => format!("(_ zero_extend {})", indices[0]),
            op::OP_BV_SIGN_EXTEND => format!("(_ sign_extend {})", indices[0]),
            op::OP_BV_ROTATE_LEFT => format!("(_ rotate_left {})", indices[0]),
            op::OP_BV_ROTATE_RIGHT => format!("(_ rotate_right {})", indices[0]),
            op::OP_BV_REPEAT => format!("(_ repeat {})", indices[0]),
            other => {
                return Err(SolverError::Unsupported(format!(
                    "operator {other} is not indexed"
                )))
            }
        })
    }

    /// Compute the concrete result sort of an application from the operator
    /// record, the argument sorts, and the indices.
    fn result_sort(
        &mut self,
        kind: OpKind,
        args: &[Term],
        indices: &[u32],
    ) -> Result<Sort, SolverError> {
        let table_op = op::OPS
            .iter()
            .find(|o| o.kind == kind)
            .ok_or_else(|| SolverError::Unsupported(format!("unknown operator {kind}")))?;
        let arg_sort = |i: usize| -> Result<Sort, SolverError> {
            args.get(i)
                .map(|t| t.sort())
                .ok_or_else(|| SolverError::Backend(format!("operator {kind} missing argument {i}")))
        };
        match table_op.result_sort {
            SortKind::Bool => self.mk_sort(SortKind::Bool),
            SortKind::Int => self.mk_sort(SortKind::Int),
            SortKind::Real => self.mk_sort(SortKind::Real),
            SortKind::String => self.mk_sort(SortKind::String),
            SortKind::RegLan => self.mk_sort(SortKind::RegLan),
            SortKind::Rm => self.mk_sort(SortKind::Rm),
            SortKind::Fp => {
                // FP operations preserve the format of their FP operand.
                let fp = args
                    .iter()
                    .map(|t| t.sort())
                    .find(|s| s.kind() == SortKind::Fp)
                    .ok_or_else(|| {
                        SolverError::Backend(format!("operator {kind} needs an FP operand"))
                    })?;
                Ok(fp)
            }
            SortKind::Bv => {
                let width_of = |s: &Sort| -> Result<u32, SolverError> {
                    if s.kind() == SortKind::Bv {
                        Ok(s.bv_size())
                    } else {
                        Err(SolverError::Backend(format!(
                            "operator {kind} expects BV operands"
                        )))
                    }
                };
                let width = match kind {
                    op::OP_BV_CONCAT => {
                        let mut w = 0;
                        for t in args {
                            w += width_of(&t.sort())?;
                        }
                        w
                    }
                    op::OP_BV_COMP => 1,
                    op::OP_BV_EXTRACT => {
                        let w = width_of(&arg_sort(0)?)?;
                        let (hi, lo) = (indices[0], indices[1]);
                        if lo > hi || hi >= w {
                            return Err(SolverError::Backend(format!(
                                "extract indices [{hi}:{lo}] out of range for width {w}"
                            )));
                        }
                        hi - lo + 1
                    }
                    op::OP_BV_ZERO_EXTEND | op::OP_BV_SIGN_EXTEND => {
                        width_of(&arg_sort(0)?)? + indices[0]
                    }
                    op::OP_BV_REPEAT => width_of(&arg_sort(0)?)? * indices[0].max(1),
                    _ => width_of(&arg_sort(0)?)?,
                };
                self.mk_sort_bv(width)
            }
            SortKind::Array => arg_sort(0),
            SortKind::Any => match kind {
                op::OP_ITE => arg_sort(1),
                op::OP_ARRAY_SELECT => arg_sort(0)?
                    .array_element_sort()
                    .cloned()
                    .ok_or_else(|| SolverError::Backend("select on non-array".to_string())),
                op::OP_UF_APPLY => arg_sort(0)?
                    .fun_codomain_sort()
                    .cloned()
                    .ok_or_else(|| SolverError::Backend("apply on non-function".to_string())),
                other => Err(SolverError::Unsupported(format!(
                    "cannot infer result sort of {other}"
                ))),
            },
            other => Err(SolverError::Unsupported(format!(
                "operator {kind} has unsupported result kind {other}"
            ))),
        }
    }

    fn quote_string(value: &str) -> String {
        // SMT-LIB escapes `"` by doubling it.
        format!("\"{}\"", value.replace('"', "\"\""))
    }

    fn fp_widths(sort: &Sort) -> (u32, u32) {
        (sort.fp_exp_size(), sort.fp_sig_size())
    }
}

impl Drop for Smt2Solver {
    fn drop(&mut self) {
        if let Channel::Online { child, stdin, .. } = &mut self.channel {
            let _ = writeln!(stdin, "(exit)");
            let _ = stdin.flush();
            let _ = child.wait();
        }
    }
}

impl Solver for Smt2Solver {
    fn name(&self) -> &'static str {
        "smt2"
    }

    fn new_solver(&mut self) -> Result<(), SolverError> {
        if let Some(binary) = &self.binary {
            let mut child = Command::new(binary)
                .args(&self.binary_args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| SolverError::Backend(format!("cannot start `{binary}`: {e}")))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| SolverError::Backend("failed to capture solver stdin".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| SolverError::Backend("failed to capture solver stdout".into()))?;
            self.channel = Channel::Online {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            };
        }
        self.send("(set-logic ALL)")?;
        self.started = true;
        Ok(())
    }

    fn delete_solver(&mut self) -> Result<(), SolverError> {
        self.send("(exit)")?;
        if let Channel::Online { child, .. } = &mut self.channel {
            let _ = child.wait();
        }
        self.channel = Channel::Idle;
        self.started = false;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.started
    }

    fn supported_theories(&self) -> Vec<Theory> {
        vec![
            Theory::Array,
            Theory::Bool,
            Theory::Bv,
            Theory::Fp,
            Theory::Int,
            Theory::Quant,
            Theory::Real,
            Theory::String,
            Theory::Uf,
        ]
    }

    fn supports_arith_subtyping(&self) -> bool {
        true
    }

    fn option_table(&self) -> Vec<SolverOption> {
        vec![
            SolverOption::int_opt("random-seed", 0, 65535),
            SolverOption::int_opt("verbosity", 0, 2),
            SolverOption::bool_opt("produce-assertions"),
            SolverOption::bool_opt("produce-assignments").with_depends(&["produce-models"]),
            SolverOption::bool_opt("global-declarations"),
        ]
    }

    fn mk_sort(&mut self, kind: SortKind) -> Result<Sort, SolverError> {
        Self::simple_sort(kind)
    }

    fn mk_sort_bv(&mut self, bv_size: u32) -> Result<Sort, SolverError> {
        if bv_size == 0 {
            return Err(SolverError::Unsupported("BV width must be positive".into()));
        }
        Ok(Sort::new_bv(
            bv_size,
            Box::new(Smt2SortHandle {
                repr: format!("(_ BitVec {bv_size})"),
            }),
        ))
    }

    fn mk_sort_fp(&mut self, exp: u32, sig: u32) -> Result<Sort, SolverError> {
        Ok(Sort::new_fp(
            exp,
            sig,
            Box::new(Smt2SortHandle {
                repr: format!("(_ FloatingPoint {exp} {sig})"),
            }),
        ))
    }

    fn mk_sort_with_sorts(&mut self, kind: SortKind, sorts: &[Sort]) -> Result<Sort, SolverError> {
        match kind {
            SortKind::Array => {
                if sorts.len() != 2 {
                    return Err(SolverError::Backend(
                        "array sorts take index and element sort".into(),
                    ));
                }
                let repr = format!(
                    "(Array {} {})",
                    Self::sort_repr(&sorts[0])?,
                    Self::sort_repr(&sorts[1])?
                );
                Ok(Sort::new_with_sorts(
                    kind,
                    sorts.to_vec(),
                    Box::new(Smt2SortHandle { repr }),
                ))
            }
            SortKind::Fun => {
                if sorts.len() < 2 {
                    return Err(SolverError::Backend(
                        "function sorts take domain and codomain".into(),
                    ));
                }
                let mut parts = Vec::with_capacity(sorts.len());
                for s in sorts {
                    parts.push(Self::sort_repr(s)?.to_string());
                }
                let repr = format!(
                    "({}) {}",
                    parts[..parts.len() - 1].join(" "),
                    parts[parts.len() - 1]
                );
                Ok(Sort::new_with_sorts(
                    kind,
                    sorts.to_vec(),
                    Box::new(Smt2SortHandle { repr }),
                ))
            }
            other => Err(SolverError::Unsupported(format!(
                "sort kind {other} takes no sort parameters"
            ))),
        }
    }

    fn mk_const(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        if sort.kind() == SortKind::Fun {
            let domain = sort
                .fun_domain_sorts()
                .iter()
                .map(Self::sort_repr)
                .collect::<Result<Vec<_>, _>>()?
                .join(" ");
            let codomain = sort
                .fun_codomain_sort()
                .ok_or_else(|| SolverError::Backend("function sort without codomain".into()))?;
            self.send(&format!(
                "(declare-fun {symbol} ({domain}) {})",
                Self::sort_repr(codomain)?
            ))?;
        } else {
            self.send(&format!(
                "(declare-const {symbol} {})",
                Self::sort_repr(sort)?
            ))?;
        }
        Ok(Self::wrap_term(symbol.to_string(), sort.clone()))
    }

    fn mk_var(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        // Bound variable: no declaration, the binder introduces it.
        Ok(Self::wrap_term(symbol.to_string(), sort.clone()))
    }

    fn mk_value(&mut self, sort: &Sort, value: &Value) -> Result<Term, SolverError> {
        let repr = match value {
            Value::Bool(b) => b.to_string(),
            Value::Int(digits) => {
                if let Some(rest) = digits.strip_prefix('-') {
                    format!("(- {rest})")
                } else {
                    digits.clone()
                }
            }
            Value::Real(digits) => {
                let with_point = if digits.contains('.') {
                    digits.clone()
                } else {
                    format!("{digits}.0")
                };
                if let Some(rest) = with_point.strip_prefix('-') {
                    format!("(- {rest})")
                } else {
                    with_point
                }
            }
            Value::Rational { num, den } => format!("(/ {num} {den})"),
            Value::Bv { digits, base } => match base {
                Base::Bin => format!("#b{digits}"),
                Base::Hex => format!("#x{digits}"),
                Base::Dec => format!("(_ bv{digits} {})", sort.bv_size()),
            },
            Value::Str(s) => Self::quote_string(s),
        };
        Ok(Self::wrap_term(repr, sort.clone()))
    }

    fn mk_special_value(&mut self, sort: &Sort, value: SpecialValue) -> Result<Term, SolverError> {
        let repr = match (sort.kind(), value) {
            (SortKind::Bv, v) => {
                let w = sort.bv_size();
                let bits: u128 = match v {
                    SpecialValue::BvZero => 0,
                    SpecialValue::BvOne => 1,
                    SpecialValue::BvOnes => {
                        if w >= 128 {
                            u128::MAX
                        } else {
                            (1u128 << w) - 1
                        }
                    }
                    SpecialValue::BvMinSigned => 1u128 << (w - 1),
                    SpecialValue::BvMaxSigned => (1u128 << (w - 1)) - 1,
                    other => {
                        return Err(SolverError::Unsupported(format!(
                            "{other} is not a BV special value"
                        )))
                    }
                };
                format!("(_ bv{bits} {w})")
            }
            (SortKind::Fp, v) => {
                let (e, s) = Self::fp_widths(sort);
                let name = match v {
                    SpecialValue::FpNan => "NaN",
                    SpecialValue::FpPosInf => "+oo",
                    SpecialValue::FpNegInf => "-oo",
                    SpecialValue::FpPosZero => "+zero",
                    SpecialValue::FpNegZero => "-zero",
                    other => {
                        return Err(SolverError::Unsupported(format!(
                            "{other} is not an FP special value"
                        )))
                    }
                };
                format!("(_ {name} {e} {s})")
            }
            (SortKind::Rm, v) => match v {
                SpecialValue::RmRne => "RNE".to_string(),
                SpecialValue::RmRna => "RNA".to_string(),
                SpecialValue::RmRtn => "RTN".to_string(),
                SpecialValue::RmRtp => "RTP".to_string(),
                SpecialValue::RmRtz => "RTZ".to_string(),
                other => {
                    return Err(SolverError::Unsupported(format!(
                        "{other} is not a rounding mode"
                    )))
                }
            },
            (SortKind::RegLan, v) => match v {
                SpecialValue::ReNone => "re.none".to_string(),
                SpecialValue::ReAll => "re.all".to_string(),
                SpecialValue::ReAllchar => "re.allchar".to_string(),
                other => {
                    return Err(SolverError::Unsupported(format!(
                        "{other} is not a RegLan special value"
                    )))
                }
            },
            (kind, v) => {
                return Err(SolverError::Unsupported(format!(
                    "sort kind {kind} has no special value {v}"
                )))
            }
        };
        Ok(Self::wrap_term(repr, sort.clone()))
    }

    fn mk_term(
        &mut self,
        kind: OpKind,
        args: &[Term],
        indices: &[u32],
    ) -> Result<Term, SolverError> {
        let sort = self.result_sort(kind, args, indices)?;
        let arg_reprs = args
            .iter()
            .map(Self::repr_of)
            .collect::<Result<Vec<_>, _>>()?;
        let repr = match kind {
            op::OP_FORALL | op::OP_EXISTS => {
                let binder = if kind == op::OP_FORALL {
                    "forall"
                } else {
                    "exists"
                };
                let var = &args[0];
                let var_sort = var.sort();
                format!(
                    "({binder} (({} {})) {})",
                    arg_reprs[0],
                    Self::sort_repr(&var_sort)?,
                    arg_reprs[1]
                )
            }
            op::OP_UF_APPLY => format!("({})", arg_reprs.join(" ")),
            _ if !indices.is_empty() => {
                format!(
                    "({} {})",
                    Self::indexed_op_symbol(kind, indices)?,
                    arg_reprs.join(" ")
                )
            }
            _ => format!("({} {})", Self::op_symbol(kind)?, arg_reprs.join(" ")),
        };
        Ok(Self::wrap_term(repr, sort))
    }

    fn sort_of(&mut self, term: &Term, _hint: SortKind) -> Result<Sort, SolverError> {
        term.handle()
            .as_any()
            .downcast_ref::<Smt2TermHandle>()
            .map(|h| h.sort.clone())
            .ok_or_else(|| SolverError::Backend("foreign term handle".to_string()))
    }

    fn assert_formula(&mut self, term: &Term) -> Result<(), SolverError> {
        let repr = Self::repr_of(term)?.to_string();
        self.send(&format!("(assert {repr})"))
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        let response = self.query("(check-sat)")?;
        self.parse_sat(response)
    }

    fn check_sat_assuming(&mut self, assumptions: &[Term]) -> Result<SatResult, SolverError> {
        let payload = assumptions
            .iter()
            .map(Self::repr_of)
            .collect::<Result<Vec<_>, _>>()?
            .join(" ");
        self.last_assumptions = assumptions.to_vec();
        let response = self.query(&format!("(check-sat-assuming ({payload}))"))?;
        self.parse_sat(response)
    }

    fn get_unsat_assumptions(&mut self) -> Result<Vec<Term>, SolverError> {
        let response = self.query_sexpr("(get-unsat-assumptions)")?;
        let Some(response) = response else {
            return Ok(Vec::new());
        };
        let names = parse_symbol_list(&response);
        Ok(self
            .last_assumptions
            .iter()
            .filter(|t| {
                Self::repr_of(t)
                    .map(|r| names.iter().any(|n| n == r))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn get_unsat_core(&mut self) -> Result<Vec<Term>, SolverError> {
        // Cores name asserted formulas; we do not attach names, so the
        // response is consumed but no terms can be mapped back.
        let _ = self.query_sexpr("(get-unsat-core)")?;
        Ok(Vec::new())
    }

    fn is_unsat_assumption(&self, term: &Term) -> bool {
        self.last_assumptions.iter().any(|a| a == term)
    }

    fn get_value(&mut self, terms: &[Term]) -> Result<Vec<Term>, SolverError> {
        let payload = terms
            .iter()
            .map(Self::repr_of)
            .collect::<Result<Vec<_>, _>>()?
            .join(" ");
        let response = self.query_sexpr(&format!("(get-value ({payload}))"))?;
        match response {
            None => Ok(terms.to_vec()),
            Some(response) => {
                let values = parse_value_list(&response);
                if values.len() != terms.len() {
                    return Err(SolverError::Backend(format!(
                        "get-value returned {} entries for {} terms: {response}",
                        values.len(),
                        terms.len()
                    )));
                }
                Ok(terms
                    .iter()
                    .zip(values)
                    .map(|(t, v)| Self::wrap_term(v, t.sort()))
                    .collect())
            }
        }
    }

    fn push(&mut self, n_levels: u32) -> Result<(), SolverError> {
        self.send(&format!("(push {n_levels})"))
    }

    fn pop(&mut self, n_levels: u32) -> Result<(), SolverError> {
        self.send(&format!("(pop {n_levels})"))
    }

    fn print_model(&mut self) -> Result<String, SolverError> {
        Ok(self.query_sexpr("(get-model)")?.unwrap_or_default())
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.send("(reset)")?;
        self.send("(set-logic ALL)")?;
        self.incremental = false;
        self.model_gen = false;
        self.unsat_assumptions = false;
        self.unsat_cores = false;
        self.last_assumptions.clear();
        Ok(())
    }

    fn reset_assertions(&mut self) -> Result<(), SolverError> {
        self.send("(reset-assertions)")?;
        self.last_assumptions.clear();
        Ok(())
    }

    fn set_opt(&mut self, name: &str, value: &str) -> Result<(), SolverError> {
        self.send(&format!("(set-option :{name} {value})"))?;
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

/// Split a one-level s-expression list into symbols, honoring `|..|` quoting.
fn parse_symbol_list(response: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quoted = false;
    for ch in response.trim().chars() {
        match ch {
            '(' | ')' if !in_quoted => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            '|' => {
                in_quoted = !in_quoted;
                buf.push('|');
                if !in_quoted {
                    out.push(std::mem::take(&mut buf));
                }
            }
            c if c.is_whitespace() && !in_quoted => {
                if !buf.is_empty() {
                    out.push(std::mem::take(&mut buf));
                }
            }
            other => buf.push(other),
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

/// Parse a `get-value` response `((term value) (term value) ...)` into the
/// printed value of each pair.
fn parse_value_list(response: &str) -> Vec<String> {
    let chars: Vec<char> = response.trim().chars().collect();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut pair_start = None;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' => {
                depth += 1;
                if depth == 2 {
                    pair_start = Some(i);
                }
            }
            ')' => {
                if depth == 2 {
                    if let Some(start) = pair_start.take() {
                        let pair: String = chars[start + 1..i].iter().collect();
                        // The value is everything after the first top-level
                        // separator of the pair.
                        if let Some(value) = split_pair_value(&pair) {
                            out.push(value);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }
    out
}

/// Split `term value` at the end of the term, where the term itself may be a
/// parenthesized expression.
fn split_pair_value(pair: &str) -> Option<String> {
    let pair = pair.trim();
    let mut depth = 0i64;
    let mut in_string = false;
    for (i, c) in pair.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            c if c.is_whitespace() && depth == 0 && !in_string && i > 0 => {
                return Some(pair[i..].trim().to_string());
            }
            _ => {}
        }
    }
    None
}
