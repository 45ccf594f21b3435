use std::fmt;
use std::str::FromStr;

/// A background theory a solver may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Theory {
    Array,
    Bag,
    Bool,
    Bv,
    Datatype,
    Fp,
    Int,
    Quant,
    Real,
    Seq,
    Set,
    String,
    Transcendental,
    Uf,
}

impl Theory {
    /// All theories known to the fuzzer, in a fixed order.
    pub const ALL: &'static [Theory] = &[
        Theory::Array,
        Theory::Bag,
        Theory::Bool,
        Theory::Bv,
        Theory::Datatype,
        Theory::Fp,
        Theory::Int,
        Theory::Quant,
        Theory::Real,
        Theory::Seq,
        Theory::Set,
        Theory::String,
        Theory::Transcendental,
        Theory::Uf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Theory::Array => "arrays",
            Theory::Bag => "bags",
            Theory::Bool => "bool",
            Theory::Bv => "bv",
            Theory::Datatype => "dt",
            Theory::Fp => "fp",
            Theory::Int => "ints",
            Theory::Quant => "quant",
            Theory::Real => "reals",
            Theory::Seq => "seq",
            Theory::Set => "sets",
            Theory::String => "strings",
            Theory::Transcendental => "trans",
            Theory::Uf => "uf",
        }
    }
}

impl fmt::Display for Theory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Theory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theory::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown theory `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theory_names_round_trip() {
        for &theory in Theory::ALL {
            assert_eq!(theory.name().parse::<Theory>(), Ok(theory));
        }
    }

    #[test]
    fn unknown_theory_name_is_rejected() {
        assert!("transfinite".parse::<Theory>().is_err());
    }
}
