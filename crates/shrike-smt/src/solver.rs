//! The solver capability contract.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::op::OpKind;
use crate::options::SolverOption;
use crate::sort::{Sort, SortKind};
use crate::term::Term;
use crate::theory::Theory;

/// Result of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

impl fmt::Display for SatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SatResult::Sat => f.write_str("sat"),
            SatResult::Unsat => f.write_str("unsat"),
            SatResult::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for SatResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => Ok(SatResult::Unknown),
            other => Err(format!("not a sat result: `{other}`")),
        }
    }
}

/// A concrete value payload for `mk_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    /// Decimal integer digits, possibly with a leading `-`.
    Int(String),
    /// Decimal real literal (`12.34` or plain digits).
    Real(String),
    /// Rational as numerator/denominator.
    Rational { num: String, den: String },
    /// Bit-vector digits in the given base.
    Bv { digits: String, base: Base },
    Str(String),
}

/// Numeric base of a bit-vector value literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Bin,
    Dec,
    Hex,
}

impl Base {
    pub const ALL: &'static [Base] = &[Base::Bin, Base::Dec, Base::Hex];

    pub fn name(self) -> &'static str {
        match self {
            Base::Bin => "bin",
            Base::Dec => "dec",
            Base::Hex => "hex",
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Base {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bin" => Ok(Base::Bin),
            "dec" => Ok(Base::Dec),
            "hex" => Ok(Base::Hex),
            other => Err(format!("not a bit-vector base: `{other}`")),
        }
    }
}

/// Canonical special constants per sort kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialValue {
    BvZero,
    BvOne,
    BvOnes,
    BvMinSigned,
    BvMaxSigned,
    FpNan,
    FpPosInf,
    FpNegInf,
    FpPosZero,
    FpNegZero,
    RmRne,
    RmRna,
    RmRtn,
    RmRtp,
    RmRtz,
    ReNone,
    ReAll,
    ReAllchar,
}

impl SpecialValue {
    pub fn name(self) -> &'static str {
        match self {
            SpecialValue::BvZero => "zero",
            SpecialValue::BvOne => "one",
            SpecialValue::BvOnes => "ones",
            SpecialValue::BvMinSigned => "min-signed",
            SpecialValue::BvMaxSigned => "max-signed",
            SpecialValue::FpNan => "NaN",
            SpecialValue::FpPosInf => "+oo",
            SpecialValue::FpNegInf => "-oo",
            SpecialValue::FpPosZero => "+zero",
            SpecialValue::FpNegZero => "-zero",
            SpecialValue::RmRne => "RNE",
            SpecialValue::RmRna => "RNA",
            SpecialValue::RmRtn => "RTN",
            SpecialValue::RmRtp => "RTP",
            SpecialValue::RmRtz => "RTZ",
            SpecialValue::ReNone => "re.none",
            SpecialValue::ReAll => "re.all",
            SpecialValue::ReAllchar => "re.allchar",
        }
    }

    pub const ALL: &'static [SpecialValue] = &[
        SpecialValue::BvZero,
        SpecialValue::BvOne,
        SpecialValue::BvOnes,
        SpecialValue::BvMinSigned,
        SpecialValue::BvMaxSigned,
        SpecialValue::FpNan,
        SpecialValue::FpPosInf,
        SpecialValue::FpNegInf,
        SpecialValue::FpPosZero,
        SpecialValue::FpNegZero,
        SpecialValue::RmRne,
        SpecialValue::RmRna,
        SpecialValue::RmRtn,
        SpecialValue::RmRtp,
        SpecialValue::RmRtz,
        SpecialValue::ReNone,
        SpecialValue::ReAll,
        SpecialValue::ReAllchar,
    ];
}

impl fmt::Display for SpecialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpecialValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecialValue::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| format!("unknown special value `{s}`"))
    }
}

/// The fixed special-value catalog; adapters may extend it.
pub fn special_values_for(kind: SortKind) -> &'static [SpecialValue] {
    match kind {
        SortKind::Bv => &[
            SpecialValue::BvZero,
            SpecialValue::BvOne,
            SpecialValue::BvOnes,
            SpecialValue::BvMinSigned,
            SpecialValue::BvMaxSigned,
        ],
        SortKind::Fp => &[
            SpecialValue::FpNan,
            SpecialValue::FpPosInf,
            SpecialValue::FpNegInf,
            SpecialValue::FpPosZero,
            SpecialValue::FpNegZero,
        ],
        SortKind::Rm => &[
            SpecialValue::RmRne,
            SpecialValue::RmRna,
            SpecialValue::RmRtn,
            SpecialValue::RmRtp,
            SpecialValue::RmRtz,
        ],
        SortKind::RegLan => &[
            SpecialValue::ReNone,
            SpecialValue::ReAll,
            SpecialValue::ReAllchar,
        ],
        _ => &[],
    }
}

/// Errors surfaced by solver back-ends.
///
/// Any error raised by an operation whose preconditions the engine verified
/// is treated as a finding against the solver under test.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("solver error: {0}")]
    Backend(String),
    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cross-check mismatch: {primary_name} returned {primary}, {secondary_name} returned {secondary}")]
    CrossCheck {
        primary_name: &'static str,
        primary: SatResult,
        secondary_name: &'static str,
        secondary: SatResult,
    },
}

/// Capability contract every back-end adapter implements.
///
/// The engine only ever talks to a `Box<dyn Solver>`; adapters wrap their
/// native sort/term objects in [`Sort`]/[`Term`] handles with hashing and
/// equality delegated to the native representation.
pub trait Solver {
    fn name(&self) -> &'static str;

    fn new_solver(&mut self) -> Result<(), SolverError>;
    fn delete_solver(&mut self) -> Result<(), SolverError>;
    fn is_initialized(&self) -> bool;

    fn supported_theories(&self) -> Vec<Theory>;

    fn unsupported_op_kinds(&self) -> Vec<OpKind> {
        Vec::new()
    }

    /// Sort kinds that may not be used for quantified variables.
    fn unsupported_var_sort_kinds(&self) -> Vec<SortKind> {
        vec![SortKind::Fun]
    }

    fn unsupported_array_index_sort_kinds(&self) -> Vec<SortKind> {
        vec![SortKind::Fun, SortKind::RegLan]
    }

    fn unsupported_array_element_sort_kinds(&self) -> Vec<SortKind> {
        vec![SortKind::Fun, SortKind::RegLan]
    }

    fn unsupported_fun_domain_sort_kinds(&self) -> Vec<SortKind> {
        vec![SortKind::Fun, SortKind::RegLan]
    }

    fn unsupported_fun_codomain_sort_kinds(&self) -> Vec<SortKind> {
        vec![SortKind::Fun, SortKind::RegLan]
    }

    /// Sort kinds whose terms may not be passed to `get_value`.
    fn unsupported_get_value_sort_kinds(&self) -> Vec<SortKind> {
        vec![SortKind::Fun, SortKind::RegLan]
    }

    /// Inclusive range of supported bit-vector widths.
    fn bv_width_range(&self) -> (u32, u32) {
        (1, 128)
    }

    /// Legal `(exponent, significand)` width pairs for FP sorts.
    fn fp_format_pairs(&self) -> Vec<(u32, u32)> {
        vec![(5, 11), (8, 24), (11, 53), (15, 113)]
    }

    /// Whether an Int term is accepted where a Real is expected.
    fn supports_arith_subtyping(&self) -> bool {
        false
    }

    fn special_values(&self, kind: SortKind) -> Vec<SpecialValue> {
        special_values_for(kind).to_vec()
    }

    /// Fuzzable options published by this back-end (the four standard
    /// toggles are queried separately).
    fn option_table(&self) -> Vec<SolverOption> {
        Vec::new()
    }

    fn mk_sort(&mut self, kind: SortKind) -> Result<Sort, SolverError>;
    fn mk_sort_bv(&mut self, bv_size: u32) -> Result<Sort, SolverError>;
    fn mk_sort_fp(&mut self, exp: u32, sig: u32) -> Result<Sort, SolverError>;
    /// Array: index then element sort. Fun: domain sorts then codomain.
    fn mk_sort_with_sorts(&mut self, kind: SortKind, sorts: &[Sort]) -> Result<Sort, SolverError>;

    fn mk_const(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError>;
    fn mk_var(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError>;

    /// Function symbols default to plain constants of function sort.
    fn mk_fun(&mut self, sort: &Sort, symbol: &str) -> Result<Term, SolverError> {
        self.mk_const(sort, symbol)
    }

    fn mk_value(&mut self, sort: &Sort, value: &Value) -> Result<Term, SolverError>;
    fn mk_special_value(&mut self, sort: &Sort, value: SpecialValue) -> Result<Term, SolverError>;

    fn mk_term(
        &mut self,
        kind: OpKind,
        args: &[Term],
        indices: &[u32],
    ) -> Result<Term, SolverError>;

    /// Freshly wrapped, unclassified sort of a created term. The database
    /// interns the result (assigning kind and id) before it becomes visible.
    fn sort_of(&mut self, term: &Term, hint: SortKind) -> Result<Sort, SolverError>;

    fn assert_formula(&mut self, term: &Term) -> Result<(), SolverError>;
    fn check_sat(&mut self) -> Result<SatResult, SolverError>;
    fn check_sat_assuming(&mut self, assumptions: &[Term]) -> Result<SatResult, SolverError>;

    fn get_unsat_assumptions(&mut self) -> Result<Vec<Term>, SolverError> {
        Ok(Vec::new())
    }

    fn get_unsat_core(&mut self) -> Result<Vec<Term>, SolverError> {
        Ok(Vec::new())
    }

    fn is_unsat_assumption(&self, _term: &Term) -> bool {
        false
    }

    fn get_value(&mut self, terms: &[Term]) -> Result<Vec<Term>, SolverError>;

    fn push(&mut self, n_levels: u32) -> Result<(), SolverError>;
    fn pop(&mut self, n_levels: u32) -> Result<(), SolverError>;

    fn print_model(&mut self) -> Result<String, SolverError>;

    fn reset(&mut self) -> Result<(), SolverError>;
    fn reset_assertions(&mut self) -> Result<(), SolverError>;

    fn set_opt(&mut self, name: &str, value: &str) -> Result<(), SolverError>;

    fn option_name_incremental(&self) -> &'static str {
        "incremental"
    }

    fn option_name_model_gen(&self) -> &'static str {
        "produce-models"
    }

    fn option_name_unsat_assumptions(&self) -> &'static str {
        "produce-unsat-assumptions"
    }

    fn option_name_unsat_cores(&self) -> &'static str {
        "produce-unsat-cores"
    }

    fn option_incremental_enabled(&self) -> bool;
    fn option_model_gen_enabled(&self) -> bool;
    fn option_unsat_assumptions_enabled(&self) -> bool;
    fn option_unsat_cores_enabled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sat_result_round_trips() {
        for r in [SatResult::Sat, SatResult::Unsat, SatResult::Unknown] {
            assert_eq!(r.to_string().parse::<SatResult>(), Ok(r));
        }
        assert!("maybe".parse::<SatResult>().is_err());
    }

    #[test]
    fn special_value_names_round_trip() {
        for &v in SpecialValue::ALL {
            assert_eq!(v.name().parse::<SpecialValue>(), Ok(v));
        }
    }

    #[test]
    fn special_value_catalog_matches_sort_kinds() {
        assert_eq!(special_values_for(SortKind::Bv).len(), 5);
        assert_eq!(special_values_for(SortKind::Fp).len(), 5);
        assert_eq!(special_values_for(SortKind::Rm).len(), 5);
        assert_eq!(special_values_for(SortKind::RegLan).len(), 3);
        assert!(special_values_for(SortKind::Bool).is_empty());
        assert!(special_values_for(SortKind::Int).is_empty());
    }

    #[test]
    fn base_names_round_trip() {
        for &b in Base::ALL {
            assert_eq!(b.name().parse::<Base>(), Ok(b));
        }
    }
}
