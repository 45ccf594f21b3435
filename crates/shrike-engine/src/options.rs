//! Option-fuzzing helpers: wildcard filters and random value selection.

use shrike_smt::options::{OptionKind, SolverOption};

use crate::rng::SeededRng;

/// Match an option name against the `--fuzz-opts` wildcard list. A pattern
/// starting with `^` must match the beginning of the name, any other
/// pattern matches as a substring. An empty list matches everything.
pub fn matches_filter(name: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| {
        if let Some(anchored) = p.strip_prefix('^') {
            name.starts_with(anchored)
        } else {
            name.contains(p.as_str())
        }
    })
}

/// Draw a random value from the option's value domain.
pub fn pick_value(rng: &mut SeededRng, option: &SolverOption) -> String {
    match &option.kind {
        OptionKind::Bool => {
            if rng.flip_coin() {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        OptionKind::Int { min, max } => rng.pick_i64(*min, *max).to_string(),
        OptionKind::List(values) => rng.pick_from_slice(values).clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filter("produce-models", &[]));
    }

    #[test]
    fn substring_and_anchored_patterns() {
        let pats = patterns(&["model", "^produce"]);
        assert!(matches_filter("produce-models", &pats));
        assert!(matches_filter("model-compress", &pats));
        assert!(matches_filter("produce-assertions", &pats));
        assert!(!matches_filter("incremental", &pats));

        let anchored = patterns(&["^model"]);
        assert!(matches_filter("model-compress", &anchored));
        assert!(!matches_filter("produce-models", &anchored));
    }

    #[test]
    fn values_come_from_the_declared_domain() {
        let mut rng = SeededRng::new(5);
        let b = SolverOption::bool_opt("flag");
        for _ in 0..10 {
            let v = pick_value(&mut rng, &b);
            assert!(v == "true" || v == "false");
        }
        let i = SolverOption::int_opt("level", 2, 4);
        for _ in 0..20 {
            let v: i64 = pick_value(&mut rng, &i).parse().unwrap();
            assert!((2..=4).contains(&v));
        }
        let l = SolverOption::list_opt("engine", &["a", "b"]);
        for _ in 0..10 {
            let v = pick_value(&mut rng, &l);
            assert!(v == "a" || v == "b");
        }
    }
}
