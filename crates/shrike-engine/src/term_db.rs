//! The term database: per-scope-level, per-sort bags of interned terms.

use indexmap::{IndexMap, IndexSet};

use shrike_smt::sort::{Sort, SortKind};
use shrike_smt::term::Term;

use crate::rng::SeededRng;

/// Terms bucketed by push/pop scope level and sort, plus the variable stack
/// used for quantifier construction.
#[derive(Debug, Default)]
pub struct TermDb {
    /// One bucket map per scope level; index 0 is the global scope.
    levels: Vec<IndexMap<Sort, IndexSet<Term>>>,
    vars: Vec<Term>,
    next_id: u64,
}

impl TermDb {
    pub fn new() -> Self {
        TermDb {
            levels: vec![IndexMap::new()],
            vars: Vec::new(),
            next_id: 0,
        }
    }

    pub fn clear(&mut self) {
        self.levels = vec![IndexMap::new()];
        self.vars.clear();
        self.next_id = 0;
    }

    pub fn n_terms(&self) -> u64 {
        self.next_id
    }

    pub fn cur_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn push(&mut self, n: u32) {
        for _ in 0..n {
            self.levels.push(IndexMap::new());
        }
    }

    /// Drop `n` scope levels; terms only reachable above the new depth
    /// disappear from every bag.
    pub fn pop(&mut self, n: u32) {
        let n = (n as usize).min(self.cur_level());
        let new_depth = self.cur_level() - n;
        for bucket in self.levels.drain(new_depth + 1..) {
            for (_, terms) in bucket {
                for term in terms {
                    term.prune_levels_above(new_depth);
                }
            }
        }
    }

    /// Find an equal term already present in any bag.
    pub fn find(&self, term: &Term) -> Option<Term> {
        for bucket in &self.levels {
            for terms in bucket.values() {
                if let Some(existing) = terms.get(term) {
                    return Some(existing.clone());
                }
            }
        }
        None
    }

    fn insert_at(&mut self, term: Term, sort: Sort, level: usize) -> Term {
        if let Some(existing) = self.find(&term) {
            existing.add_level(level);
            self.levels[level]
                .entry(sort)
                .or_default()
                .insert(existing.clone());
            return existing;
        }
        self.next_id += 1;
        term.set_id(self.next_id);
        term.set_sort(sort.clone());
        term.add_level(level);
        self.levels[level].entry(sort).or_default().insert(term.clone());
        term
    }

    /// Add an input (constant or value) at the current scope depth.
    pub fn add_input(&mut self, term: Term, sort: Sort) -> Term {
        let level = self.cur_level();
        self.insert_at(term, sort, level)
    }

    /// Add an operation result. Its level is the highest level any argument
    /// is reachable at: a term built only from global-scope terms stays in
    /// the global scope even under open pushes.
    pub fn add_term(&mut self, term: Term, sort: Sort, args: &[Term]) -> Term {
        let level = args
            .iter()
            .filter_map(|a| a.max_level())
            .max()
            .unwrap_or_else(|| self.cur_level())
            .min(self.cur_level());
        self.insert_at(term, sort, level)
    }

    /// Register a fresh quantifier variable. Variables live on their own
    /// stack and are retired when the binder consuming them is built.
    pub fn add_var(&mut self, var: Term, sort: Sort) -> Term {
        self.next_id += 1;
        var.set_id(self.next_id);
        var.set_sort(sort);
        self.vars.push(var.clone());
        var
    }

    pub fn remove_var(&mut self, var: &Term) {
        self.vars.retain(|v| v != var);
    }

    pub fn has_var(&self) -> bool {
        !self.vars.is_empty()
    }

    pub fn pick_var(&self, rng: &mut SeededRng) -> Term {
        self.vars[rng.pick_index(self.vars.len())].clone()
    }

    pub fn has_term(&self) -> bool {
        self.levels.iter().any(|b| b.values().any(|t| !t.is_empty()))
    }

    pub fn has_term_of_kind(&self, kind: SortKind) -> bool {
        if kind == SortKind::Any {
            return self.has_term();
        }
        self.levels.iter().any(|b| {
            b.iter()
                .any(|(sort, terms)| sort.kind() == kind && !terms.is_empty())
        })
    }

    pub fn has_term_of_kind_at(&self, kind: SortKind, level: usize) -> bool {
        self.levels.get(level).is_some_and(|b| {
            b.iter()
                .any(|(sort, terms)| sort.kind() == kind && !terms.is_empty())
        })
    }

    pub fn has_term_of_sort(&self, sort: &Sort) -> bool {
        self.levels
            .iter()
            .any(|b| b.get(sort).is_some_and(|t| !t.is_empty()))
    }

    pub fn has_value_of_sort(&self, sort: &Sort) -> bool {
        self.levels.iter().any(|b| {
            b.get(sort)
                .is_some_and(|terms| terms.iter().any(|t| t.is_value()))
        })
    }

    fn collect<F: Fn(&Sort, &Term) -> bool>(&self, pred: F) -> Vec<Term> {
        let mut out = Vec::new();
        let mut seen: IndexSet<Term> = IndexSet::new();
        for bucket in &self.levels {
            for (sort, terms) in bucket {
                for term in terms {
                    if pred(sort, term) && seen.insert(term.clone()) {
                        out.push(term.clone());
                    }
                }
            }
        }
        out
    }

    pub fn pick_term_of_sort(&self, rng: &mut SeededRng, sort: &Sort) -> Option<Term> {
        let candidates = self.collect(|s, _| s == sort);
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.pick_index(candidates.len())].clone())
    }

    pub fn pick_term_of_kind(&self, rng: &mut SeededRng, kind: SortKind) -> Option<Term> {
        let candidates = self.collect(|s, _| kind == SortKind::Any || s.kind() == kind);
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.pick_index(candidates.len())].clone())
    }

    /// Pick a term of the given kind reachable at exactly `level`.
    pub fn pick_term_of_kind_at(
        &self,
        rng: &mut SeededRng,
        kind: SortKind,
        level: usize,
    ) -> Option<Term> {
        let bucket = self.levels.get(level)?;
        let mut candidates = Vec::new();
        for (sort, terms) in bucket {
            if kind == SortKind::Any || sort.kind() == kind {
                candidates.extend(terms.iter().cloned());
            }
        }
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.pick_index(candidates.len())].clone())
    }

    pub fn pick_term(&self, rng: &mut SeededRng) -> Option<Term> {
        self.pick_term_of_kind(rng, SortKind::Any)
    }

    pub fn pick_value_of_sort(&self, rng: &mut SeededRng, sort: &Sort) -> Option<Term> {
        let candidates = self.collect(|s, t| s == sort && t.is_value());
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.pick_index(candidates.len())].clone())
    }

    pub fn has_quant_body(&self) -> bool {
        self.has_term_of_kind(SortKind::Bool)
    }

    pub fn pick_quant_body(&self, rng: &mut SeededRng) -> Option<Term> {
        self.pick_term_of_kind(rng, SortKind::Bool)
    }

    /// Sort kinds that currently have at least one term.
    pub fn kinds_with_terms(&self) -> IndexSet<SortKind> {
        let mut out = IndexSet::new();
        for bucket in &self.levels {
            for (sort, terms) in bucket {
                if !terms.is_empty() {
                    out.insert(sort.kind());
                }
            }
        }
        out
    }

    /// Sorts that currently have at least one term.
    pub fn sorts_with_terms(&self) -> IndexSet<Sort> {
        let mut out = IndexSet::new();
        for bucket in &self.levels {
            for (sort, terms) in bucket {
                if !terms.is_empty() {
                    out.insert(sort.clone());
                }
            }
        }
        out
    }

    pub fn pick_sort_with_terms(&self, rng: &mut SeededRng, kind: SortKind) -> Option<Sort> {
        let sorts: Vec<Sort> = self
            .sorts_with_terms()
            .into_iter()
            .filter(|s| kind == SortKind::Any || s.kind() == kind)
            .collect();
        if sorts.is_empty() {
            return None;
        }
        Some(sorts[rng.pick_index(sorts.len())].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use shrike_smt::sort::SortHandle;
    use shrike_smt::term::TermHandle;

    #[derive(Debug)]
    struct KeyedSort(String);

    impl SortHandle for KeyedSort {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn hash_key(&self) -> u64 {
            let mut h = DefaultHasher::new();
            self.0.hash(&mut h);
            h.finish()
        }
        fn equals(&self, other: &dyn SortHandle) -> bool {
            other
                .as_any()
                .downcast_ref::<KeyedSort>()
                .is_some_and(|o| o.0 == self.0)
        }
        fn render(&self) -> String {
            self.0.clone()
        }
    }

    #[derive(Debug)]
    struct KeyedTerm(String);

    impl TermHandle for KeyedTerm {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn hash_key(&self) -> u64 {
            let mut h = DefaultHasher::new();
            self.0.hash(&mut h);
            h.finish()
        }
        fn equals(&self, other: &dyn TermHandle) -> bool {
            other
                .as_any()
                .downcast_ref::<KeyedTerm>()
                .is_some_and(|o| o.0 == self.0)
        }
        fn render(&self) -> String {
            self.0.clone()
        }
    }

    fn bool_sort() -> Sort {
        Sort::new(SortKind::Bool, Box::new(KeyedSort("Bool".into())))
    }

    fn bv_sort(w: u32) -> Sort {
        Sort::new_bv(w, Box::new(KeyedSort(format!("bv{w}"))))
    }

    fn term(name: &str, sort: &Sort) -> Term {
        Term::new(sort.clone(), Box::new(KeyedTerm(name.into())))
    }

    #[test]
    fn inputs_get_monotonic_ids() {
        let mut db = TermDb::new();
        let s = bool_sort();
        let a = db.add_input(term("a", &s), s.clone());
        let b = db.add_input(term("b", &s), s.clone());
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(db.n_terms(), 2);
    }

    #[test]
    fn duplicate_inputs_are_interned() {
        let mut db = TermDb::new();
        let s = bool_sort();
        let a1 = db.add_input(term("a", &s), s.clone());
        let a2 = db.add_input(term("a", &s), s.clone());
        assert_eq!(a1.id(), a2.id());
        assert_eq!(db.n_terms(), 1);
    }

    #[test]
    fn popped_terms_vanish() {
        let mut db = TermDb::new();
        let mut rng = SeededRng::new(1);
        let s = bool_sort();
        db.add_input(term("base", &s), s.clone());
        db.push(2);
        let inner = db.add_input(term("inner", &s), s.clone());
        assert_eq!(inner.levels(), vec![2]);
        assert!(db.has_term_of_kind_at(SortKind::Bool, 2));
        db.pop(2);
        assert!(!db.has_term_of_kind_at(SortKind::Bool, 2));
        // Only "base" is left pickable.
        for _ in 0..20 {
            let t = db.pick_term_of_kind(&mut rng, SortKind::Bool).unwrap();
            assert_eq!(t.handle().render(), "base");
        }
        assert!(inner.levels().is_empty());
    }

    #[test]
    fn term_level_is_max_of_argument_levels() {
        let mut db = TermDb::new();
        let s = bool_sort();
        let base = db.add_input(term("base", &s), s.clone());
        db.push(1);
        // Built only from level-0 terms: stays at level 0 and survives pop.
        let derived = db.add_term(term("(not base)", &s), s.clone(), &[base.clone()]);
        assert_eq!(derived.levels(), vec![0]);
        let local = db.add_input(term("local", &s), s.clone());
        let mixed = db.add_term(
            term("(and base local)", &s),
            s.clone(),
            &[base.clone(), local.clone()],
        );
        assert_eq!(mixed.levels(), vec![1]);
        db.pop(1);
        assert!(db.find(&derived).is_some());
        assert!(db.find(&mixed).is_none());
    }

    #[test]
    fn picks_honor_sort_and_level() {
        let mut db = TermDb::new();
        let mut rng = SeededRng::new(9);
        let b = bool_sort();
        let v8 = bv_sort(8);
        db.add_input(term("x", &b), b.clone());
        db.push(1);
        db.add_input(term("y", &v8), v8.clone());

        let picked = db.pick_term_of_sort(&mut rng, &v8).unwrap();
        assert_eq!(picked.sort(), v8);
        assert!(picked.has_level(1));

        let at0 = db.pick_term_of_kind_at(&mut rng, SortKind::Bool, 0).unwrap();
        assert!(at0.has_level(0));
        assert!(db.pick_term_of_kind_at(&mut rng, SortKind::Bv, 0).is_none());
    }

    #[test]
    fn values_are_filtered() {
        let mut db = TermDb::new();
        let mut rng = SeededRng::new(2);
        let s = bv_sort(4);
        db.add_input(term("c", &s), s.clone());
        assert!(!db.has_value_of_sort(&s));
        let v = term("#b0001", &s);
        v.set_is_value(true);
        db.add_input(v, s.clone());
        assert!(db.has_value_of_sort(&s));
        let picked = db.pick_value_of_sort(&mut rng, &s).unwrap();
        assert!(picked.is_value());
    }

    #[test]
    fn var_stack_round_trip() {
        let mut db = TermDb::new();
        let mut rng = SeededRng::new(3);
        let s = bool_sort();
        assert!(!db.has_var());
        let v = db.add_var(term("q", &s), s.clone());
        assert!(v.id() > 0);
        assert!(db.has_var());
        assert_eq!(db.pick_var(&mut rng), v);
        db.remove_var(&v);
        assert!(!db.has_var());
    }

    #[test]
    fn kind_views_track_contents() {
        let mut db = TermDb::new();
        let b = bool_sort();
        let v = bv_sort(8);
        db.add_input(term("x", &b), b.clone());
        db.add_input(term("y", &v), v.clone());
        let kinds = db.kinds_with_terms();
        assert!(kinds.contains(&SortKind::Bool));
        assert!(kinds.contains(&SortKind::Bv));
        assert_eq!(db.sorts_with_terms().len(), 2);
    }
}
