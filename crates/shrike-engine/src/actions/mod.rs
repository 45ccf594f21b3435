//! The Action catalog.
//!
//! Every Action has a stable kind string (written to the trace), a
//! precondition against the manager state, a `run` that synthesizes
//! arguments and invokes the solver, and an `untrace` that replays a
//! recorded invocation from its trace tokens.

mod inputs;
mod solver;
mod terms;

use std::rc::Rc;

use indexmap::IndexMap;

use shrike_smt::sort::Sort;
use shrike_smt::term::Term;

use crate::errors::EngineError;
use crate::manager::SolverManager;
use crate::trace::{Token, TraceLine};

pub use inputs::{
    ActionMkConst, ActionMkSort, ActionMkSpecialValue, ActionMkValue, ActionMkVar,
};
pub use solver::{
    ActionAssertFormula, ActionCheckSat, ActionCheckSatAssuming, ActionDeleteSolver,
    ActionGetUnsatAssumptions, ActionGetUnsatCore, ActionGetValue, ActionNewSolver, ActionPop,
    ActionPrintModel, ActionPush, ActionReset, ActionResetAssertions, ActionSetOption,
};
pub use terms::ActionMkTerm;

/// Kind string of the built-in no-op transition.
pub const KIND_TRANSITION: &str = "t-default";

pub trait Action {
    /// Stable identifier, written to the trace.
    fn kind(&self) -> &'static str;

    /// Precondition check against the manager state.
    fn applicable(&self, mgr: &SolverManager) -> bool;

    /// Synthesize arguments, invoke the solver, update the databases.
    /// `Ok(None)` means the action declined without side effects.
    fn run(&self, mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError>;

    /// Replay a recorded invocation. `args` and `returns` are the tokens of
    /// the trace line after the kind, split at the `returns` marker.
    fn untrace(
        &self,
        mgr: &mut SolverManager,
        args: &[Token],
        returns: &[Token],
    ) -> Result<(), EngineError>;
}

/// The no-op transition action used to wire weighted state changes.
pub struct ActionTransition;

impl Action for ActionTransition {
    fn kind(&self) -> &'static str {
        KIND_TRANSITION
    }

    fn applicable(&self, _mgr: &SolverManager) -> bool {
        true
    }

    fn run(&self, _mgr: &mut SolverManager) -> Result<Option<TraceLine>, EngineError> {
        Ok(None)
    }

    fn untrace(
        &self,
        _mgr: &mut SolverManager,
        _args: &[Token],
        _returns: &[Token],
    ) -> Result<(), EngineError> {
        Err(EngineError::Config(
            "transitions are never recorded in traces".to_string(),
        ))
    }
}

/// All Actions by kind; the untracer dispatches through this table.
pub struct ActionRegistry {
    actions: IndexMap<&'static str, Rc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        let mut actions: IndexMap<&'static str, Rc<dyn Action>> = IndexMap::new();
        let all: Vec<Rc<dyn Action>> = vec![
            Rc::new(ActionNewSolver),
            Rc::new(ActionDeleteSolver),
            Rc::new(ActionSetOption),
            Rc::new(ActionMkSort),
            Rc::new(ActionMkConst),
            Rc::new(ActionMkVar),
            Rc::new(ActionMkValue),
            Rc::new(ActionMkSpecialValue),
            Rc::new(ActionMkTerm),
            Rc::new(ActionAssertFormula),
            Rc::new(ActionCheckSat),
            Rc::new(ActionCheckSatAssuming),
            Rc::new(ActionGetUnsatAssumptions),
            Rc::new(ActionGetUnsatCore),
            Rc::new(ActionGetValue),
            Rc::new(ActionPush),
            Rc::new(ActionPop),
            Rc::new(ActionReset),
            Rc::new(ActionResetAssertions),
            Rc::new(ActionPrintModel),
            Rc::new(ActionTransition),
        ];
        for action in all {
            actions.insert(action.kind(), action);
        }
        ActionRegistry { actions }
    }

    pub fn get(&self, kind: &str) -> Option<Rc<dyn Action>> {
        self.actions.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.keys().copied()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/* -------------------------------------------------------------------- */
/* Untrace parsing helpers                                              */
/* -------------------------------------------------------------------- */

pub(crate) fn expect_args(kind: &str, args: &[Token], n: usize) -> Result<(), EngineError> {
    if args.len() != n {
        return Err(EngineError::Config(format!(
            "{kind} expects {n} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn parse_u32(kind: &str, token: &Token) -> Result<u32, EngineError> {
    token
        .text
        .parse::<u32>()
        .map_err(|_| EngineError::Config(format!("{kind}: `{}` is not an integer", token.text)))
}

pub(crate) fn parse_usize(kind: &str, token: &Token) -> Result<usize, EngineError> {
    token
        .text
        .parse::<usize>()
        .map_err(|_| EngineError::Config(format!("{kind}: `{}` is not a count", token.text)))
}

fn parse_id(prefix: char, token: &Token) -> Option<u64> {
    if token.quoted {
        return None;
    }
    token.text.strip_prefix(prefix)?.parse::<u64>().ok()
}

/// Resolve a `s<N>` token through the untraced-sort table.
pub(crate) fn lookup_sort(mgr: &SolverManager, token: &Token) -> Result<Sort, EngineError> {
    let id = parse_id('s', token)
        .ok_or_else(|| EngineError::Config(format!("`{}` is not a sort id", token.text)))?;
    mgr.get_untraced_sort(id)
        .ok_or_else(|| EngineError::Config(format!("unresolved sort id s{id}")))
}

/// Resolve a `t<N>` token through the untraced-term table.
pub(crate) fn lookup_term(mgr: &SolverManager, token: &Token) -> Result<Term, EngineError> {
    let id = parse_id('t', token)
        .ok_or_else(|| EngineError::Config(format!("`{}` is not a term id", token.text)))?;
    mgr.get_untraced_term(id)
        .ok_or_else(|| EngineError::Config(format!("unresolved term id t{id}")))
}

/// Bind the first returned id to a freshly created sort.
pub(crate) fn bind_sort(
    mgr: &mut SolverManager,
    returns: &[Token],
    index: usize,
    sort: Sort,
) -> Result<(), EngineError> {
    let token = returns
        .get(index)
        .ok_or_else(|| EngineError::Config("missing returned sort id".to_string()))?;
    let id = parse_id('s', token)
        .ok_or_else(|| EngineError::Config(format!("`{}` is not a sort id", token.text)))?;
    mgr.register_sort(id, sort);
    Ok(())
}

/// Bind a returned id to a freshly created term.
pub(crate) fn bind_term(
    mgr: &mut SolverManager,
    returns: &[Token],
    index: usize,
    term: Term,
) -> Result<(), EngineError> {
    let token = returns
        .get(index)
        .ok_or_else(|| EngineError::Config("missing returned term id".to_string()))?;
    let id = parse_id('t', token)
        .ok_or_else(|| EngineError::Config(format!("`{}` is not a term id", token.text)))?;
    mgr.register_term(id, term);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_every_catalog_kind() {
        let registry = ActionRegistry::new();
        for kind in [
            "new-solver",
            "delete-solver",
            "set-option",
            "mk-sort",
            "mk-const",
            "mk-var",
            "mk-value",
            "mk-special-value",
            "mk-term",
            "assert-formula",
            "check-sat",
            "check-sat-assuming",
            "get-unsat-assumptions",
            "get-unsat-core",
            "get-value",
            "push",
            "pop",
            "reset",
            "reset-assertions",
            "print-model",
        ] {
            assert!(registry.get(kind).is_some(), "missing action {kind}");
        }
        assert!(registry.get("mk-frobnicate").is_none());
    }

    #[test]
    fn id_tokens_parse_strictly() {
        let good = Token {
            text: "t17".to_string(),
            quoted: false,
        };
        assert_eq!(parse_id('t', &good), Some(17));
        let quoted = Token {
            text: "t17".to_string(),
            quoted: true,
        };
        assert_eq!(parse_id('t', &quoted), None);
        let wrong = Token {
            text: "s17".to_string(),
            quoted: false,
        };
        assert_eq!(parse_id('t', &wrong), None);
    }
}
