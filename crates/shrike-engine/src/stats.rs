//! Run statistics, carried as an explicit handle on the manager.

use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;

use shrike_smt::solver::SatResult;

/// Per-run counters: states entered, actions attempted/completed, operator
/// kinds exercised, and check-sat verdicts.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub states: IndexMap<String, u64>,
    pub actions: IndexMap<String, u64>,
    pub actions_ok: IndexMap<String, u64>,
    pub ops: IndexMap<String, u64>,
    pub ops_ok: IndexMap<String, u64>,
    pub results: IndexMap<String, u64>,
}

impl Stats {
    pub fn incr_state(&mut self, kind: &str) {
        *self.states.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn incr_action(&mut self, kind: &str) {
        *self.actions.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn incr_action_ok(&mut self, kind: &str) {
        *self.actions_ok.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn incr_op(&mut self, kind: &str) {
        *self.ops.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn incr_op_ok(&mut self, kind: &str) {
        *self.ops_ok.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn incr_result(&mut self, result: SatResult) {
        *self.results.entry(result.to_string()).or_insert(0) += 1;
    }

    /// Human-readable summary for `--stats`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "results:");
        for (k, v) in &self.results {
            let _ = writeln!(out, "  {k:<24} {v}");
        }
        let _ = writeln!(out, "states:");
        for (k, v) in &self.states {
            let _ = writeln!(out, "  {k:<24} {v}");
        }
        let _ = writeln!(out, "actions (executed/ok):");
        for (k, v) in &self.actions {
            let ok = self.actions_ok.get(k).copied().unwrap_or(0);
            let _ = writeln!(out, "  {k:<24} {v} / {ok}");
        }
        let _ = writeln!(out, "ops (executed/ok):");
        for (k, v) in &self.ops {
            let ok = self.ops_ok.get(k).copied().unwrap_or(0);
            let _ = writeln!(out, "  {k:<24} {v} / {ok}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut stats = Stats::default();
        stats.incr_action("mk-term");
        stats.incr_action("mk-term");
        stats.incr_action_ok("mk-term");
        stats.incr_result(SatResult::Sat);
        assert_eq!(stats.actions["mk-term"], 2);
        assert_eq!(stats.actions_ok["mk-term"], 1);
        assert_eq!(stats.results["sat"], 1);
    }

    #[test]
    fn render_mentions_all_sections() {
        let mut stats = Stats::default();
        stats.incr_state("assert");
        stats.incr_op("BV_ADD");
        let text = stats.render();
        assert!(text.contains("assert"));
        assert!(text.contains("BV_ADD"));
    }

    #[test]
    fn serializes_to_json() {
        let mut stats = Stats::default();
        stats.incr_action("check-sat");
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("check-sat"));
    }
}
