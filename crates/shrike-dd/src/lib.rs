//! Trace minimization by multi-granularity delta debugging.
//!
//! The minimizer shrinks a trace while an [`Oracle`] keeps confirming that
//! the reduced file still exhibits the target symptom. Passes run to a
//! fixed point: chunked line removal (with a dependency scan so no retained
//! line references an id whose every definition was removed), token-level
//! reductions, and a final consistent id renumbering.

pub mod exec;
pub mod oracle;

use std::collections::BTreeSet;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

pub use exec::{run_with_timeout, ExecResult, ExitStatusKind};
pub use oracle::{ExecOracle, GoldenOutput, MatchConfig, Oracle};

/// Lines beginning with this prefix are never removed or rewritten.
const HEADER_PREFIX: &str = "set-shrike-options";

#[derive(Debug, Error)]
pub enum DdError {
    #[error("the oracle rejects the unreduced input trace")]
    UninterestingInput,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a minimization.
#[derive(Debug)]
pub struct MinimizeReport {
    pub trace: String,
    pub original_lines: usize,
    pub final_lines: usize,
    pub oracle_calls: usize,
}

/* ------------------------------------------------------------------ */
/* Line scanning                                                      */
/* ------------------------------------------------------------------ */

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tok {
    text: String,
    quoted: bool,
}

/// Quote-aware token scan; malformed quoting falls back to a plain split so
/// the minimizer never chokes on a line it merely wants to delete.
fn scan(line: &str) -> Vec<Tok> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };
        if first == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    None | Some('"') => break,
                    Some('\\') => {
                        if let Some(c) = chars.next() {
                            text.push(c);
                        }
                    }
                    Some(c) => text.push(c),
                }
            }
            out.push(Tok { text, quoted: true });
        } else {
            let mut text = String::new();
            while matches!(chars.peek(), Some(c) if !c.is_whitespace()) {
                text.push(chars.next().unwrap());
            }
            out.push(Tok {
                text,
                quoted: false,
            });
        }
    }
    out
}

fn render_tok(tok: &Tok) -> String {
    if tok.quoted {
        let mut out = String::with_capacity(tok.text.len() + 2);
        out.push('"');
        for c in tok.text.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                other => out.push(other),
            }
        }
        out.push('"');
        out
    } else {
        tok.text.clone()
    }
}

fn render_toks(toks: &[Tok]) -> String {
    toks.iter().map(render_tok).collect::<Vec<_>>().join(" ")
}

fn is_id(tok: &Tok) -> bool {
    !tok.quoted
        && tok.text.len() > 1
        && (tok.text.starts_with('s') || tok.text.starts_with('t'))
        && tok.text[1..].chars().all(|c| c.is_ascii_digit())
}

/// Ids a line defines (after `returns`) and ids it uses (before it).
fn defs_and_uses(line: &str) -> (Vec<String>, Vec<String>) {
    let toks = scan(line);
    let marker = toks
        .iter()
        .position(|t| !t.quoted && t.text == "returns")
        .unwrap_or(toks.len());
    let uses = toks[..marker]
        .iter()
        .filter(|t| is_id(t))
        .map(|t| t.text.clone())
        .collect();
    let defs = toks
        .get(marker + 1..)
        .unwrap_or(&[])
        .iter()
        .filter(|t| is_id(t))
        .map(|t| t.text.clone())
        .collect();
    (defs, uses)
}

fn is_protected(line: &str) -> bool {
    line.starts_with(HEADER_PREFIX)
}

fn render_subset(lines: &[String], keep: &BTreeSet<usize>) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if keep.contains(&i) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

struct CountingOracle<'a> {
    inner: &'a mut dyn Oracle,
    calls: usize,
}

impl CountingOracle<'_> {
    fn test(&mut self, trace: &str) -> Result<bool, DdError> {
        self.calls += 1;
        self.inner.interesting(trace)
    }
}

/* ------------------------------------------------------------------ */
/* Passes                                                             */
/* ------------------------------------------------------------------ */

/// Extend a removal seed with every line whose used ids would lose all of
/// their (preceding) definitions.
fn dependency_closure(
    lines: &[String],
    keep: &BTreeSet<usize>,
    seed: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    let parsed: Vec<(Vec<String>, Vec<String>)> =
        lines.iter().map(|l| defs_and_uses(l)).collect();
    let mut removed = seed.clone();
    loop {
        let mut changed = false;
        for &j in keep.iter() {
            if removed.contains(&j) {
                continue;
            }
            let (_, uses) = &parsed[j];
            for u in uses {
                let still_defined = keep.iter().any(|&i| {
                    i < j && !removed.contains(&i) && parsed[i].0.iter().any(|d| d == u)
                });
                if !still_defined {
                    removed.insert(j);
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }
    removed
}

/// One ddmin round over whole lines.
fn line_pass(
    lines: &[String],
    keep: &mut BTreeSet<usize>,
    oracle: &mut CountingOracle<'_>,
) -> Result<bool, DdError> {
    let mut shrunk = false;
    let mut n = 2usize;
    loop {
        let removable: Vec<usize> = keep
            .iter()
            .copied()
            .filter(|&i| !is_protected(&lines[i]))
            .collect();
        if removable.len() < 2 {
            break;
        }
        let chunk = removable.len().div_ceil(n);
        let mut improved = false;
        for start in (0..removable.len()).step_by(chunk.max(1)) {
            let seed: BTreeSet<usize> = removable[start..(start + chunk).min(removable.len())]
                .iter()
                .copied()
                .collect();
            let removal = dependency_closure(lines, keep, &seed);
            let candidate: BTreeSet<usize> =
                keep.iter().copied().filter(|i| !removal.contains(i)).collect();
            if candidate.len() == keep.len() {
                continue;
            }
            if oracle.test(&render_subset(lines, &candidate))? {
                debug!(
                    removed = keep.len() - candidate.len(),
                    remaining = candidate.len(),
                    "line chunk removed"
                );
                *keep = candidate;
                shrunk = true;
                improved = true;
                n = n.saturating_sub(1).max(2);
                break;
            }
        }
        if !improved {
            if chunk <= 1 {
                break;
            }
            n = (n * 2).min(removable.len());
        }
    }
    Ok(shrunk)
}

/// Shrink candidates for one token.
fn shrink_candidates(tok: &Tok) -> Vec<Tok> {
    if tok.quoted {
        let mut out = Vec::new();
        if !tok.text.is_empty() {
            out.push(Tok {
                text: String::new(),
                quoted: true,
            });
            let half: String = tok.text.chars().take(tok.text.chars().count() / 2).collect();
            if !half.is_empty() {
                out.push(Tok {
                    text: half,
                    quoted: true,
                });
            }
        }
        out
    } else if !is_id(tok)
        && !tok.text.is_empty()
        && tok.text.chars().all(|c| c.is_ascii_digit())
        && tok.text != "0"
    {
        let mut out = vec![
            Tok {
                text: "0".to_string(),
                quoted: false,
            },
            Tok {
                text: "1".to_string(),
                quoted: false,
            },
        ];
        if let Ok(v) = tok.text.parse::<u128>() {
            let half = (v / 2).to_string();
            out.push(Tok {
                text: half,
                quoted: false,
            });
        }
        out.retain(|c| c.text != tok.text);
        out.dedup_by(|a, b| a.text == b.text);
        out
    } else {
        Vec::new()
    }
}

/// One round of token reductions: integer literals toward 0, widths toward
/// 1, strings toward empty. The oracle vetoes anything that breaks replay.
fn token_pass(
    lines: &mut [String],
    keep: &BTreeSet<usize>,
    oracle: &mut CountingOracle<'_>,
) -> Result<bool, DdError> {
    let mut shrunk = false;
    for &i in keep.iter() {
        if is_protected(&lines[i]) {
            continue;
        }
        let mut toks = scan(&lines[i]);
        let mut line_changed = false;
        for pos in 1..toks.len() {
            for candidate in shrink_candidates(&toks[pos]) {
                let original = toks[pos].clone();
                toks[pos] = candidate;
                let new_line = render_toks(&toks);
                let old_line = std::mem::replace(&mut lines[i], new_line);
                if oracle.test(&render_subset(lines, keep))? {
                    line_changed = true;
                    shrunk = true;
                    break;
                }
                lines[i] = old_line;
                toks[pos] = original;
            }
        }
        if line_changed {
            debug!(line = i, "token reduction applied");
        }
    }
    Ok(shrunk)
}

/// Compact sort/term ids consistently, in first-definition order.
fn renumber(lines: &[String], keep: &BTreeSet<usize>) -> Vec<String> {
    let mut map: IndexMap<String, String> = IndexMap::new();
    let mut next_sort = 0u64;
    let mut next_term = 0u64;
    for &i in keep.iter() {
        let (defs, _) = defs_and_uses(&lines[i]);
        for d in defs {
            map.entry(d.clone()).or_insert_with(|| {
                if d.starts_with('s') {
                    next_sort += 1;
                    format!("s{next_sort}")
                } else {
                    next_term += 1;
                    format!("t{next_term}")
                }
            });
        }
    }
    keep.iter()
        .map(|&i| {
            let mut toks = scan(&lines[i]);
            for tok in &mut toks {
                if is_id(tok) {
                    if let Some(new) = map.get(&tok.text) {
                        tok.text = new.clone();
                    }
                }
            }
            render_toks(&toks)
        })
        .collect()
}

/* ------------------------------------------------------------------ */
/* Driver                                                             */
/* ------------------------------------------------------------------ */

/// Minimize `trace` under `oracle`.
///
/// Guarantees on success: the result is no longer than the input, the
/// oracle accepts it, and running the minimizer again returns it unchanged.
pub fn minimize(trace: &str, oracle: &mut dyn Oracle) -> Result<MinimizeReport, DdError> {
    let mut lines: Vec<String> = trace.lines().map(|l| l.trim_end().to_string()).collect();
    let original_lines = lines.len();
    let mut keep: BTreeSet<usize> = (0..lines.len())
        .filter(|&i| !lines[i].trim().is_empty())
        .collect();

    let mut oracle = CountingOracle {
        inner: oracle,
        calls: 0,
    };
    if !oracle.test(&render_subset(&lines, &keep))? {
        return Err(DdError::UninterestingInput);
    }

    loop {
        let removed_lines = line_pass(&lines, &mut keep, &mut oracle)?;
        let shrunk_tokens = token_pass(&mut lines, &keep, &mut oracle)?;
        if !removed_lines && !shrunk_tokens {
            break;
        }
    }

    // Renumbering happens once, on the final output; an oracle that matches
    // on concrete ids may veto it, in which case ids stay as they are.
    let renumbered = renumber(&lines, &keep);
    let renumbered_text = {
        let mut out = String::new();
        for line in &renumbered {
            out.push_str(line);
            out.push('\n');
        }
        out
    };
    let final_text = if oracle.test(&renumbered_text)? {
        renumbered_text
    } else {
        render_subset(&lines, &keep)
    };

    Ok(MinimizeReport {
        final_lines: final_text.lines().count(),
        original_lines,
        oracle_calls: oracle.calls,
        trace: final_text,
    })
}
