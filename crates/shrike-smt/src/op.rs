//! Static operator catalog.
//!
//! Every operator is a tagged record: kind string (stable, written to the
//! trace), arity, index count, result sort kind, argument sort kinds, and
//! owning theory. Actions match on the record at generation time; there is
//! no per-operator dispatch hierarchy.

use indexmap::{IndexMap, IndexSet};

use crate::sort::SortKind;
use crate::theory::Theory;

/// Stable operator identifier as written to traces.
pub type OpKind = &'static str;

/// Arity marker: n-ary with at least one argument.
pub const N_ARGS: i32 = -1;
/// Arity marker: n-ary with at least two arguments.
pub const N_ARGS_BIN: i32 = -2;
/// Upper bound on argument count for n-ary operators.
pub const MK_TERM_MAX_ARGS: usize = 11;

// Core / Boolean operators.
pub const OP_AND: OpKind = "AND";
pub const OP_OR: OpKind = "OR";
pub const OP_XOR: OpKind = "XOR";
pub const OP_NOT: OpKind = "NOT";
pub const OP_IMPLIES: OpKind = "IMPLIES";
pub const OP_EQUAL: OpKind = "EQUAL";
pub const OP_DISTINCT: OpKind = "DISTINCT";
pub const OP_ITE: OpKind = "ITE";

// Bit-vector operators.
pub const OP_BV_CONCAT: OpKind = "BV_CONCAT";
pub const OP_BV_AND: OpKind = "BV_AND";
pub const OP_BV_OR: OpKind = "BV_OR";
pub const OP_BV_XOR: OpKind = "BV_XOR";
pub const OP_BV_NAND: OpKind = "BV_NAND";
pub const OP_BV_NOR: OpKind = "BV_NOR";
pub const OP_BV_XNOR: OpKind = "BV_XNOR";
pub const OP_BV_NOT: OpKind = "BV_NOT";
pub const OP_BV_NEG: OpKind = "BV_NEG";
pub const OP_BV_ADD: OpKind = "BV_ADD";
pub const OP_BV_SUB: OpKind = "BV_SUB";
pub const OP_BV_MUL: OpKind = "BV_MUL";
pub const OP_BV_UDIV: OpKind = "BV_UDIV";
pub const OP_BV_UREM: OpKind = "BV_UREM";
pub const OP_BV_SDIV: OpKind = "BV_SDIV";
pub const OP_BV_SREM: OpKind = "BV_SREM";
pub const OP_BV_SMOD: OpKind = "BV_SMOD";
pub const OP_BV_SHL: OpKind = "BV_SHL";
pub const OP_BV_LSHR: OpKind = "BV_LSHR";
pub const OP_BV_ASHR: OpKind = "BV_ASHR";
pub const OP_BV_COMP: OpKind = "BV_COMP";
pub const OP_BV_ULT: OpKind = "BV_ULT";
pub const OP_BV_ULE: OpKind = "BV_ULE";
pub const OP_BV_UGT: OpKind = "BV_UGT";
pub const OP_BV_UGE: OpKind = "BV_UGE";
pub const OP_BV_SLT: OpKind = "BV_SLT";
pub const OP_BV_SLE: OpKind = "BV_SLE";
pub const OP_BV_SGT: OpKind = "BV_SGT";
pub const OP_BV_SGE: OpKind = "BV_SGE";
pub const OP_BV_EXTRACT: OpKind = "BV_EXTRACT";
pub const OP_BV_ZERO_EXTEND: OpKind = "BV_ZERO_EXTEND";
pub const OP_BV_SIGN_EXTEND: OpKind = "BV_SIGN_EXTEND";
pub const OP_BV_ROTATE_LEFT: OpKind = "BV_ROTATE_LEFT";
pub const OP_BV_ROTATE_RIGHT: OpKind = "BV_ROTATE_RIGHT";
pub const OP_BV_REPEAT: OpKind = "BV_REPEAT";

// Integer operators.
pub const OP_INT_NEG: OpKind = "INT_NEG";
pub const OP_INT_ABS: OpKind = "INT_ABS";
pub const OP_INT_ADD: OpKind = "INT_ADD";
pub const OP_INT_SUB: OpKind = "INT_SUB";
pub const OP_INT_MUL: OpKind = "INT_MUL";
pub const OP_INT_DIV: OpKind = "INT_DIV";
pub const OP_INT_MOD: OpKind = "INT_MOD";
pub const OP_INT_LT: OpKind = "INT_LT";
pub const OP_INT_LE: OpKind = "INT_LE";
pub const OP_INT_GT: OpKind = "INT_GT";
pub const OP_INT_GE: OpKind = "INT_GE";
pub const OP_INT_TO_REAL: OpKind = "INT_TO_REAL";

// Real operators.
pub const OP_REAL_NEG: OpKind = "REAL_NEG";
pub const OP_REAL_ADD: OpKind = "REAL_ADD";
pub const OP_REAL_SUB: OpKind = "REAL_SUB";
pub const OP_REAL_MUL: OpKind = "REAL_MUL";
pub const OP_REAL_DIV: OpKind = "REAL_DIV";
pub const OP_REAL_LT: OpKind = "REAL_LT";
pub const OP_REAL_LE: OpKind = "REAL_LE";
pub const OP_REAL_GT: OpKind = "REAL_GT";
pub const OP_REAL_GE: OpKind = "REAL_GE";
pub const OP_REAL_IS_INT: OpKind = "REAL_IS_INT";
pub const OP_REAL_TO_INT: OpKind = "REAL_TO_INT";

// Array operators.
pub const OP_ARRAY_SELECT: OpKind = "ARRAY_SELECT";
pub const OP_ARRAY_STORE: OpKind = "ARRAY_STORE";

// Floating-point operators.
pub const OP_FP_ABS: OpKind = "FP_ABS";
pub const OP_FP_NEG: OpKind = "FP_NEG";
pub const OP_FP_ADD: OpKind = "FP_ADD";
pub const OP_FP_SUB: OpKind = "FP_SUB";
pub const OP_FP_MUL: OpKind = "FP_MUL";
pub const OP_FP_DIV: OpKind = "FP_DIV";
pub const OP_FP_FMA: OpKind = "FP_FMA";
pub const OP_FP_SQRT: OpKind = "FP_SQRT";
pub const OP_FP_REM: OpKind = "FP_REM";
pub const OP_FP_RTI: OpKind = "FP_RTI";
pub const OP_FP_MIN: OpKind = "FP_MIN";
pub const OP_FP_MAX: OpKind = "FP_MAX";
pub const OP_FP_EQ: OpKind = "FP_EQ";
pub const OP_FP_LEQ: OpKind = "FP_LEQ";
pub const OP_FP_LT: OpKind = "FP_LT";
pub const OP_FP_GEQ: OpKind = "FP_GEQ";
pub const OP_FP_GT: OpKind = "FP_GT";
pub const OP_FP_IS_NORMAL: OpKind = "FP_IS_NORMAL";
pub const OP_FP_IS_SUBNORMAL: OpKind = "FP_IS_SUBNORMAL";
pub const OP_FP_IS_ZERO: OpKind = "FP_IS_ZERO";
pub const OP_FP_IS_INF: OpKind = "FP_IS_INF";
pub const OP_FP_IS_NAN: OpKind = "FP_IS_NAN";
pub const OP_FP_IS_NEG: OpKind = "FP_IS_NEG";
pub const OP_FP_IS_POS: OpKind = "FP_IS_POS";

// String and regular-language operators.
pub const OP_STR_CONCAT: OpKind = "STR_CONCAT";
pub const OP_STR_LEN: OpKind = "STR_LEN";
pub const OP_STR_LT: OpKind = "STR_LT";
pub const OP_STR_AT: OpKind = "STR_AT";
pub const OP_STR_SUBSTR: OpKind = "STR_SUBSTR";
pub const OP_STR_PREFIXOF: OpKind = "STR_PREFIXOF";
pub const OP_STR_SUFFIXOF: OpKind = "STR_SUFFIXOF";
pub const OP_STR_CONTAINS: OpKind = "STR_CONTAINS";
pub const OP_STR_INDEXOF: OpKind = "STR_INDEXOF";
pub const OP_STR_REPLACE: OpKind = "STR_REPLACE";
pub const OP_STR_REPLACE_ALL: OpKind = "STR_REPLACE_ALL";
pub const OP_STR_IS_DIGIT: OpKind = "STR_IS_DIGIT";
pub const OP_STR_TO_INT: OpKind = "STR_TO_INT";
pub const OP_STR_FROM_INT: OpKind = "STR_FROM_INT";
pub const OP_STR_TO_RE: OpKind = "STR_TO_RE";
pub const OP_STR_IN_RE: OpKind = "STR_IN_RE";
pub const OP_RE_CONCAT: OpKind = "RE_CONCAT";
pub const OP_RE_UNION: OpKind = "RE_UNION";
pub const OP_RE_INTER: OpKind = "RE_INTER";
pub const OP_RE_STAR: OpKind = "RE_STAR";
pub const OP_RE_PLUS: OpKind = "RE_PLUS";
pub const OP_RE_OPT: OpKind = "RE_OPT";
pub const OP_RE_RANGE: OpKind = "RE_RANGE";

// Uninterpreted functions and quantifiers.
pub const OP_UF_APPLY: OpKind = "UF_APPLY";
pub const OP_FORALL: OpKind = "FORALL";
pub const OP_EXISTS: OpKind = "EXISTS";

/// One entry of the operator catalog.
#[derive(Debug, Clone, Copy)]
pub struct Op {
    pub kind: OpKind,
    /// Exact arity when >= 0, [`N_ARGS`] / [`N_ARGS_BIN`] for n-ary.
    pub arity: i32,
    pub num_indices: u32,
    /// `SortKind::Any` when the result sort depends on the arguments.
    pub result_sort: SortKind,
    /// One entry per argument; n-ary operators list a single entry that
    /// applies to every argument.
    pub arg_sorts: &'static [SortKind],
    pub theory: Theory,
}

impl Op {
    pub fn is_nary(&self) -> bool {
        self.arity < 0
    }

    /// Minimum number of arguments for this operator.
    pub fn min_arity(&self) -> usize {
        if self.arity < 0 {
            (-self.arity) as usize
        } else {
            self.arity as usize
        }
    }

    /// Argument sort kind for position `i`; n-ary operators repeat their
    /// last declared kind for the tail positions.
    pub fn arg_sort_at(&self, i: usize) -> SortKind {
        if i < self.arg_sorts.len() {
            self.arg_sorts[i]
        } else {
            self.arg_sorts[self.arg_sorts.len() - 1]
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.num_indices > 0
    }
}

use SortKind::*;
use Theory as T;

macro_rules! op {
    ($kind:expr, $arity:expr, $nidx:expr, $result:expr, $args:expr, $theory:expr) => {
        Op {
            kind: $kind,
            arity: $arity,
            num_indices: $nidx,
            result_sort: $result,
            arg_sorts: $args,
            theory: $theory,
        }
    };
}

/// The full operator table.
pub const OPS: &[Op] = &[
    // Core.
    op!(OP_AND, N_ARGS_BIN, 0, Bool, &[Bool], T::Bool),
    op!(OP_OR, N_ARGS_BIN, 0, Bool, &[Bool], T::Bool),
    op!(OP_XOR, N_ARGS_BIN, 0, Bool, &[Bool], T::Bool),
    op!(OP_NOT, 1, 0, Bool, &[Bool], T::Bool),
    op!(OP_IMPLIES, N_ARGS_BIN, 0, Bool, &[Bool], T::Bool),
    op!(OP_EQUAL, N_ARGS_BIN, 0, Bool, &[Any], T::Bool),
    op!(OP_DISTINCT, N_ARGS_BIN, 0, Bool, &[Any], T::Bool),
    op!(OP_ITE, 3, 0, Any, &[Bool, Any, Any], T::Bool),
    // Bit-vectors.
    op!(OP_BV_CONCAT, N_ARGS_BIN, 0, Bv, &[Bv], T::Bv),
    op!(OP_BV_AND, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_OR, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_XOR, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_NAND, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_NOR, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_XNOR, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_NOT, 1, 0, Bv, &[Bv], T::Bv),
    op!(OP_BV_NEG, 1, 0, Bv, &[Bv], T::Bv),
    op!(OP_BV_ADD, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_SUB, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_MUL, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_UDIV, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_UREM, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_SDIV, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_SREM, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_SMOD, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_SHL, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_LSHR, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_ASHR, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_COMP, 2, 0, Bv, &[Bv, Bv], T::Bv),
    op!(OP_BV_ULT, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_ULE, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_UGT, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_UGE, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_SLT, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_SLE, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_SGT, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_SGE, 2, 0, Bool, &[Bv, Bv], T::Bv),
    op!(OP_BV_EXTRACT, 1, 2, Bv, &[Bv], T::Bv),
    op!(OP_BV_ZERO_EXTEND, 1, 1, Bv, &[Bv], T::Bv),
    op!(OP_BV_SIGN_EXTEND, 1, 1, Bv, &[Bv], T::Bv),
    op!(OP_BV_ROTATE_LEFT, 1, 1, Bv, &[Bv], T::Bv),
    op!(OP_BV_ROTATE_RIGHT, 1, 1, Bv, &[Bv], T::Bv),
    op!(OP_BV_REPEAT, 1, 1, Bv, &[Bv], T::Bv),
    // Integers.
    op!(OP_INT_NEG, 1, 0, Int, &[Int], T::Int),
    op!(OP_INT_ABS, 1, 0, Int, &[Int], T::Int),
    op!(OP_INT_ADD, N_ARGS_BIN, 0, Int, &[Int], T::Int),
    op!(OP_INT_SUB, N_ARGS_BIN, 0, Int, &[Int], T::Int),
    op!(OP_INT_MUL, N_ARGS_BIN, 0, Int, &[Int], T::Int),
    op!(OP_INT_DIV, N_ARGS_BIN, 0, Int, &[Int], T::Int),
    op!(OP_INT_MOD, 2, 0, Int, &[Int, Int], T::Int),
    op!(OP_INT_LT, N_ARGS_BIN, 0, Bool, &[Int], T::Int),
    op!(OP_INT_LE, N_ARGS_BIN, 0, Bool, &[Int], T::Int),
    op!(OP_INT_GT, N_ARGS_BIN, 0, Bool, &[Int], T::Int),
    op!(OP_INT_GE, N_ARGS_BIN, 0, Bool, &[Int], T::Int),
    op!(OP_INT_TO_REAL, 1, 0, Real, &[Int], T::Int),
    // Reals.
    op!(OP_REAL_NEG, 1, 0, Real, &[Real], T::Real),
    op!(OP_REAL_ADD, N_ARGS_BIN, 0, Real, &[Real], T::Real),
    op!(OP_REAL_SUB, N_ARGS_BIN, 0, Real, &[Real], T::Real),
    op!(OP_REAL_MUL, N_ARGS_BIN, 0, Real, &[Real], T::Real),
    op!(OP_REAL_DIV, N_ARGS_BIN, 0, Real, &[Real], T::Real),
    op!(OP_REAL_LT, N_ARGS_BIN, 0, Bool, &[Real], T::Real),
    op!(OP_REAL_LE, N_ARGS_BIN, 0, Bool, &[Real], T::Real),
    op!(OP_REAL_GT, N_ARGS_BIN, 0, Bool, &[Real], T::Real),
    op!(OP_REAL_GE, N_ARGS_BIN, 0, Bool, &[Real], T::Real),
    op!(OP_REAL_IS_INT, 1, 0, Bool, &[Real], T::Real),
    op!(OP_REAL_TO_INT, 1, 0, Int, &[Real], T::Real),
    // Arrays.
    op!(OP_ARRAY_SELECT, 2, 0, Any, &[Array, Any], T::Array),
    op!(OP_ARRAY_STORE, 3, 0, Array, &[Array, Any, Any], T::Array),
    // Floating-point.
    op!(OP_FP_ABS, 1, 0, Fp, &[Fp], T::Fp),
    op!(OP_FP_NEG, 1, 0, Fp, &[Fp], T::Fp),
    op!(OP_FP_ADD, 3, 0, Fp, &[Rm, Fp, Fp], T::Fp),
    op!(OP_FP_SUB, 3, 0, Fp, &[Rm, Fp, Fp], T::Fp),
    op!(OP_FP_MUL, 3, 0, Fp, &[Rm, Fp, Fp], T::Fp),
    op!(OP_FP_DIV, 3, 0, Fp, &[Rm, Fp, Fp], T::Fp),
    op!(OP_FP_FMA, 4, 0, Fp, &[Rm, Fp, Fp, Fp], T::Fp),
    op!(OP_FP_SQRT, 2, 0, Fp, &[Rm, Fp], T::Fp),
    op!(OP_FP_REM, 2, 0, Fp, &[Fp, Fp], T::Fp),
    op!(OP_FP_RTI, 2, 0, Fp, &[Rm, Fp], T::Fp),
    op!(OP_FP_MIN, 2, 0, Fp, &[Fp, Fp], T::Fp),
    op!(OP_FP_MAX, 2, 0, Fp, &[Fp, Fp], T::Fp),
    op!(OP_FP_EQ, N_ARGS_BIN, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_LEQ, N_ARGS_BIN, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_LT, N_ARGS_BIN, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_GEQ, N_ARGS_BIN, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_GT, N_ARGS_BIN, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_NORMAL, 1, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_SUBNORMAL, 1, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_ZERO, 1, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_INF, 1, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_NAN, 1, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_NEG, 1, 0, Bool, &[Fp], T::Fp),
    op!(OP_FP_IS_POS, 1, 0, Bool, &[Fp], T::Fp),
    // Strings and regular languages.
    op!(OP_STR_CONCAT, N_ARGS_BIN, 0, String, &[String], T::String),
    op!(OP_STR_LEN, 1, 0, Int, &[String], T::String),
    op!(OP_STR_LT, 2, 0, Bool, &[String, String], T::String),
    op!(OP_STR_AT, 2, 0, String, &[String, Int], T::String),
    op!(OP_STR_SUBSTR, 3, 0, String, &[String, Int, Int], T::String),
    op!(OP_STR_PREFIXOF, 2, 0, Bool, &[String, String], T::String),
    op!(OP_STR_SUFFIXOF, 2, 0, Bool, &[String, String], T::String),
    op!(OP_STR_CONTAINS, 2, 0, Bool, &[String, String], T::String),
    op!(OP_STR_INDEXOF, 3, 0, Int, &[String, String, Int], T::String),
    op!(OP_STR_REPLACE, 3, 0, String, &[String, String, String], T::String),
    op!(
        OP_STR_REPLACE_ALL,
        3,
        0,
        String,
        &[String, String, String],
        T::String
    ),
    op!(OP_STR_IS_DIGIT, 1, 0, Bool, &[String], T::String),
    op!(OP_STR_TO_INT, 1, 0, Int, &[String], T::String),
    op!(OP_STR_FROM_INT, 1, 0, String, &[Int], T::String),
    op!(OP_STR_TO_RE, 1, 0, RegLan, &[String], T::String),
    op!(OP_STR_IN_RE, 2, 0, Bool, &[String, RegLan], T::String),
    op!(OP_RE_CONCAT, N_ARGS_BIN, 0, RegLan, &[RegLan], T::String),
    op!(OP_RE_UNION, N_ARGS_BIN, 0, RegLan, &[RegLan], T::String),
    op!(OP_RE_INTER, N_ARGS_BIN, 0, RegLan, &[RegLan], T::String),
    op!(OP_RE_STAR, 1, 0, RegLan, &[RegLan], T::String),
    op!(OP_RE_PLUS, 1, 0, RegLan, &[RegLan], T::String),
    op!(OP_RE_OPT, 1, 0, RegLan, &[RegLan], T::String),
    op!(OP_RE_RANGE, 2, 0, RegLan, &[String, String], T::String),
    // Uninterpreted functions and quantifiers.
    op!(OP_UF_APPLY, N_ARGS, 0, Any, &[Fun, Any], T::Uf),
    op!(OP_FORALL, 2, 0, Bool, &[Any, Bool], T::Quant),
    op!(OP_EXISTS, 2, 0, Bool, &[Any, Bool], T::Quant),
];

/// True for operators restricted by the linear-arithmetic fragment.
pub fn is_nonlinear_arith(kind: OpKind) -> bool {
    matches!(
        kind,
        OP_INT_MUL | OP_INT_DIV | OP_INT_MOD | OP_REAL_MUL | OP_REAL_DIV
    )
}

/// Per-run registry of operator kinds: the static table restricted to the
/// enabled theories, minus the kinds the solver declares unsupported.
#[derive(Debug)]
pub struct OpKindManager {
    ops: IndexMap<OpKind, &'static Op>,
}

impl OpKindManager {
    pub fn new(enabled_theories: &IndexSet<Theory>, unsupported: &[OpKind]) -> Self {
        let mut ops = IndexMap::new();
        for op in OPS {
            if !enabled_theories.contains(&op.theory) {
                continue;
            }
            if unsupported.contains(&op.kind) {
                continue;
            }
            // Operators whose result or arguments reach into another theory
            // need that theory enabled as well.
            let result_ok = op.result_sort == Any
                || enabled_theories.contains(&op.result_sort.theory());
            let args_ok = op
                .arg_sorts
                .iter()
                .all(|&k| k == Any || enabled_theories.contains(&k.theory()));
            if result_ok && args_ok {
                ops.insert(op.kind, op);
            }
        }
        OpKindManager { ops }
    }

    pub fn get(&self, kind: &str) -> Option<&'static Op> {
        self.ops.get(kind).copied()
    }

    pub fn ops(&self) -> &IndexMap<OpKind, &'static Op> {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theories(list: &[Theory]) -> IndexSet<Theory> {
        list.iter().copied().collect()
    }

    #[test]
    fn catalog_has_no_duplicate_kinds() {
        let mut seen = IndexSet::new();
        for op in OPS {
            assert!(seen.insert(op.kind), "duplicate op kind {}", op.kind);
        }
    }

    #[test]
    fn arity_and_arg_sorts_are_consistent() {
        for op in OPS {
            if op.is_nary() {
                assert!(!op.arg_sorts.is_empty(), "{}", op.kind);
                assert!(op.min_arity() >= 1);
            } else {
                assert_eq!(op.arg_sorts.len(), op.arity as usize, "{}", op.kind);
            }
        }
    }

    #[test]
    fn manager_filters_by_theory() {
        let mgr = OpKindManager::new(&theories(&[Theory::Bool, Theory::Bv]), &[]);
        assert!(mgr.get(OP_BV_ADD).is_some());
        assert!(mgr.get(OP_AND).is_some());
        assert!(mgr.get(OP_INT_ADD).is_none());
        assert!(mgr.get(OP_FORALL).is_none());
    }

    #[test]
    fn manager_filters_cross_theory_results() {
        // INT_TO_REAL produces a Real term; without the Real theory it must
        // not be offered.
        let mgr = OpKindManager::new(&theories(&[Theory::Bool, Theory::Int]), &[]);
        assert!(mgr.get(OP_INT_ADD).is_some());
        assert!(mgr.get(OP_INT_TO_REAL).is_none());

        let with_reals =
            OpKindManager::new(&theories(&[Theory::Bool, Theory::Int, Theory::Real]), &[]);
        assert!(with_reals.get(OP_INT_TO_REAL).is_some());
    }

    #[test]
    fn manager_honors_unsupported_kinds() {
        let mgr = OpKindManager::new(&theories(&[Theory::Bool, Theory::Bv]), &[OP_BV_SMOD]);
        assert!(mgr.get(OP_BV_SMOD).is_none());
        assert!(mgr.get(OP_BV_SREM).is_some());
    }

    #[test]
    fn indexed_ops_declare_their_index_counts() {
        let extract = OPS.iter().find(|o| o.kind == OP_BV_EXTRACT).unwrap();
        assert_eq!(extract.num_indices, 2);
        assert!(extract.is_indexed());
        let repeat = OPS.iter().find(|o| o.kind == OP_BV_REPEAT).unwrap();
        assert_eq!(repeat.num_indices, 1);
    }

    #[test]
    fn nonlinear_classification() {
        assert!(is_nonlinear_arith(OP_INT_MUL));
        assert!(is_nonlinear_arith(OP_REAL_DIV));
        assert!(!is_nonlinear_arith(OP_INT_ADD));
        assert!(!is_nonlinear_arith(OP_BV_MUL));
    }
}
