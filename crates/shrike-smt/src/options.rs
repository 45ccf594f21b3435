//! Solver option descriptions published by back-ends.
//!
//! Value selection lives in the engine (it needs the run RNG); this module
//! only carries the data: name, value domain, conflicts, dependencies.

/// Value domain of a solver option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    /// Inclusive integer range.
    Int { min: i64, max: i64 },
    /// One of a fixed list of values.
    List(Vec<String>),
}

/// A single fuzzable solver option.
#[derive(Debug, Clone)]
pub struct SolverOption {
    pub name: String,
    pub kind: OptionKind,
    /// Options that must not be set together with this one.
    pub conflicts: Vec<String>,
    /// Options that must already be set before this one.
    pub depends: Vec<String>,
}

impl SolverOption {
    pub fn bool_opt(name: &str) -> Self {
        SolverOption {
            name: name.to_string(),
            kind: OptionKind::Bool,
            conflicts: Vec::new(),
            depends: Vec::new(),
        }
    }

    pub fn int_opt(name: &str, min: i64, max: i64) -> Self {
        SolverOption {
            name: name.to_string(),
            kind: OptionKind::Int { min, max },
            conflicts: Vec::new(),
            depends: Vec::new(),
        }
    }

    pub fn list_opt(name: &str, values: &[&str]) -> Self {
        SolverOption {
            name: name.to_string(),
            kind: OptionKind::List(values.iter().map(|v| v.to_string()).collect()),
            conflicts: Vec::new(),
            depends: Vec::new(),
        }
    }

    pub fn with_conflicts(mut self, conflicts: &[&str]) -> Self {
        self.conflicts = conflicts.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_depends(mut self, depends: &[&str]) -> Self {
        self.depends = depends.iter().map(|d| d.to_string()).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_populate_fields() {
        let opt = SolverOption::list_opt("sat-solver", &["cadical", "kissat"])
            .with_conflicts(&["legacy-sat"])
            .with_depends(&["incremental"]);
        assert_eq!(opt.name, "sat-solver");
        assert_eq!(
            opt.kind,
            OptionKind::List(vec!["cadical".to_string(), "kissat".to_string()])
        );
        assert_eq!(opt.conflicts, vec!["legacy-sat"]);
        assert_eq!(opt.depends, vec!["incremental"]);
    }
}
