//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use shrike_engine::run::RunConfig;
use shrike_smt::theory::Theory;

pub(crate) const CLI_LONG_ABOUT: &str =
    "Model-based API fuzzer for SMT solvers.\n\n\
    Typical sessions:\n  \
    1. shrike --stub                       continuous fuzzing of the stub back-end\n  \
    2. shrike --smt2 cvc5 -s deadbeef      one seeded run against a solver binary\n  \
    3. shrike --stub -u failing.trace      replay a recorded trace\n  \
    4. shrike --stub -s deadbeef -d        minimize the failing run's trace\n\n\
    Cross-checking (-c) replays every call on a second solver and flags\n\
    sat/unsat disagreements as wrong-result findings.";

#[derive(Parser, Debug, Clone)]
#[command(name = "shrike")]
#[command(about = "Model-based API fuzzer for SMT solvers")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub struct Options {
    /// Seed for the random generator (hex or decimal); disables continuous mode
    #[arg(short = 's', long = "seed", value_parser = parse_seed)]
    pub seed: Option<u64>,

    /// Record a set-seed line before every trace step
    #[arg(short = 'S', long = "trace-seeds")]
    pub trace_seeds: bool,

    /// Wall-clock limit per run, in seconds (0 disables)
    #[arg(short = 't', long = "time", default_value_t = 0.0)]
    pub time: f64,

    /// Stop after N runs in continuous mode (0 means no limit)
    #[arg(short = 'm', long = "max-runs", default_value_t = 0)]
    pub max_runs: u64,

    /// Write the API trace to a file instead of stdout
    #[arg(short = 'a', long = "api-trace")]
    pub api_trace: Option<PathBuf>,

    /// Replay a recorded API trace
    #[arg(short = 'u', long = "untrace")]
    pub untrace: Option<PathBuf>,

    /// Delta-debug the trace of the current run
    #[arg(short = 'd', long = "dd")]
    pub dd: bool,

    /// Interestingness: require this substring on stdout
    #[arg(long = "dd-match-out")]
    pub dd_match_out: Option<String>,

    /// Interestingness: require this substring on stderr
    #[arg(long = "dd-match-err")]
    pub dd_match_err: Option<String>,

    /// Ignore stdout when delta debugging
    #[arg(long = "dd-ignore-out")]
    pub dd_ignore_out: bool,

    /// Ignore stderr when delta debugging
    #[arg(long = "dd-ignore-err")]
    pub dd_ignore_err: bool,

    /// Output path for the minimized trace
    #[arg(short = 'D', long = "dd-trace")]
    pub dd_trace: Option<PathBuf>,

    /// Cross-check with a second solver: `stub` or a solver binary path
    #[arg(short = 'c', long = "cross-check")]
    pub cross_check: Option<String>,

    /// Check unsat cores and model values with a second solver
    /// (`stub`, a binary path, or no value for an instance of the same kind)
    #[arg(long = "check", num_args = 0..=1, default_missing_value = "")]
    pub check: Option<String>,

    /// Use randomized symbol strings instead of `_x<N>`
    #[arg(short = 'y', long = "random-symbols")]
    pub random_symbols: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbosity", action = ArgAction::Count)]
    pub verbosity: u8,

    /// Print statistics after the run
    #[arg(long = "stats")]
    pub stats: bool,

    /// Print the FSM configuration and exit
    #[arg(long = "print-fsm")]
    pub print_fsm: bool,

    /// Print the error summary in CSV format
    #[arg(long = "csv")]
    pub csv: bool,

    /// Export found error messages to a JSON file
    #[arg(long = "export-errors")]
    pub export_errors: Option<PathBuf>,

    /// FSM step budget per run
    #[arg(long = "max-steps", default_value_t = 250)]
    pub max_steps: usize,

    /// Restrict arithmetic to the linear fragment
    #[arg(long = "linear")]
    pub linear: bool,

    /// Fuzz back-end options, optionally filtered by wildcard patterns
    /// (comma separated; `^` anchors a pattern to the option-name start)
    #[arg(long = "fuzz-opts", num_args = 0..=1, default_missing_value = "")]
    pub fuzz_opts: Option<String>,

    /// Test an SMT-LIB 2 solver binary over a pipe (command dump when the
    /// binary is omitted)
    #[arg(long = "smt2", num_args = 0..=1, default_missing_value = "")]
    pub smt2: Option<String>,

    /// Test the built-in deterministic stub back-end
    #[arg(long = "stub")]
    pub stub: bool,

    /// Preset solver options, `name=value` comma separated
    #[arg(short = 'o', value_delimiter = ',')]
    pub solver_options: Vec<String>,

    /// Directory for temporary files
    #[arg(short = 'T', long = "tmp-dir", default_value = "/tmp")]
    pub tmp_dir: PathBuf,

    /// Directory for output files
    #[arg(short = 'O', long = "out-dir")]
    pub out_dir: Option<PathBuf>,

    // Enable only specific theories.
    /// Enable the theory of arrays
    #[arg(long = "arrays")]
    pub arrays: bool,
    /// Enable the theory of bags
    #[arg(long = "bags")]
    pub bags: bool,
    /// Enable the theory of bit-vectors
    #[arg(long = "bv")]
    pub bv: bool,
    /// Enable the theory of datatypes
    #[arg(long = "dt")]
    pub dt: bool,
    /// Enable the theory of floating-points
    #[arg(long = "fp")]
    pub fp: bool,
    /// Enable the theory of integers
    #[arg(long = "ints")]
    pub ints: bool,
    /// Enable quantifiers
    #[arg(long = "quant")]
    pub quant: bool,
    /// Enable the theory of reals
    #[arg(long = "reals")]
    pub reals: bool,
    /// Enable the theory of sequences
    #[arg(long = "seq")]
    pub seq: bool,
    /// Enable the theory of sets
    #[arg(long = "sets")]
    pub sets: bool,
    /// Enable the theory of strings
    #[arg(long = "strings")]
    pub strings: bool,
    /// Enable the theory of transcendentals
    #[arg(long = "trans")]
    pub trans: bool,
    /// Enable uninterpreted functions
    #[arg(long = "uf")]
    pub uf: bool,

    // Disable enabled theories.
    /// Disable the theory of arrays
    #[arg(long = "no-arrays")]
    pub no_arrays: bool,
    /// Disable the theory of bags
    #[arg(long = "no-bags")]
    pub no_bags: bool,
    /// Disable the theory of bit-vectors
    #[arg(long = "no-bv")]
    pub no_bv: bool,
    /// Disable the theory of datatypes
    #[arg(long = "no-dt")]
    pub no_dt: bool,
    /// Disable the theory of floating-points
    #[arg(long = "no-fp")]
    pub no_fp: bool,
    /// Disable the theory of integers
    #[arg(long = "no-ints")]
    pub no_ints: bool,
    /// Disable quantifiers
    #[arg(long = "no-quant")]
    pub no_quant: bool,
    /// Disable the theory of reals
    #[arg(long = "no-reals")]
    pub no_reals: bool,
    /// Disable the theory of sequences
    #[arg(long = "no-seq")]
    pub no_seq: bool,
    /// Disable the theory of sets
    #[arg(long = "no-sets")]
    pub no_sets: bool,
    /// Disable the theory of strings
    #[arg(long = "no-strings")]
    pub no_strings: bool,
    /// Disable the theory of transcendentals
    #[arg(long = "no-trans")]
    pub no_trans: bool,
    /// Disable uninterpreted functions
    #[arg(long = "no-uf")]
    pub no_uf: bool,
}

/// Seeds parse as hex when every character is a hex digit, decimal
/// otherwise.
fn parse_seed(s: &str) -> Result<u64, String> {
    if s.is_empty() {
        return Err("empty seed".to_string());
    }
    if s.chars().all(|c| c.is_ascii_hexdigit()) {
        u64::from_str_radix(s, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<u64>().map_err(|e| e.to_string())
    }
}

impl Options {
    pub fn enabled_theories(&self) -> Vec<Theory> {
        let flags = [
            (self.arrays, Theory::Array),
            (self.bags, Theory::Bag),
            (self.bv, Theory::Bv),
            (self.dt, Theory::Datatype),
            (self.fp, Theory::Fp),
            (self.ints, Theory::Int),
            (self.quant, Theory::Quant),
            (self.reals, Theory::Real),
            (self.seq, Theory::Seq),
            (self.sets, Theory::Set),
            (self.strings, Theory::String),
            (self.trans, Theory::Transcendental),
            (self.uf, Theory::Uf),
        ];
        flags
            .into_iter()
            .filter_map(|(on, theory)| on.then_some(theory))
            .collect()
    }

    pub fn disabled_theories(&self) -> Vec<Theory> {
        let mut disabled = RunConfig::default().disabled_theories;
        let flags = [
            (self.no_arrays, Theory::Array),
            (self.no_bags, Theory::Bag),
            (self.no_bv, Theory::Bv),
            (self.no_dt, Theory::Datatype),
            (self.no_fp, Theory::Fp),
            (self.no_ints, Theory::Int),
            (self.no_quant, Theory::Quant),
            (self.no_reals, Theory::Real),
            (self.no_seq, Theory::Seq),
            (self.no_sets, Theory::Set),
            (self.no_strings, Theory::String),
            (self.no_trans, Theory::Transcendental),
            (self.no_uf, Theory::Uf),
        ];
        for (on, theory) in flags {
            if on && !disabled.contains(&theory) {
                disabled.push(theory);
            }
        }
        disabled
    }

    /// Parse `-o name=value,...` presets.
    pub fn preset_options(&self) -> Result<Vec<(String, String)>, String> {
        let mut out = Vec::new();
        for entry in &self.solver_options {
            if entry.is_empty() {
                continue;
            }
            let Some((name, value)) = entry.split_once('=') else {
                return Err(format!(
                    "invalid solver option format `{entry}`, expected name=value"
                ));
            };
            out.push((name.to_string(), value.to_string()));
        }
        Ok(out)
    }

    pub fn fuzz_options_filter(&self) -> Vec<String> {
        match &self.fuzz_opts {
            Some(patterns) if !patterns.is_empty() => patterns
                .split(',')
                .filter(|p| !p.is_empty())
                .map(|p| p.to_string())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Build the engine run configuration for one seed.
    pub fn run_config(&self, seed: u64, cmd_line: String) -> Result<RunConfig, String> {
        Ok(RunConfig {
            seed,
            max_steps: self.max_steps,
            simple_symbols: !self.random_symbols,
            trace_seeds: self.trace_seeds,
            arith_linear: self.linear,
            fuzz_options: self.fuzz_opts.is_some(),
            fuzz_options_filter: self.fuzz_options_filter(),
            enabled_theories: self.enabled_theories(),
            disabled_theories: self.disabled_theories(),
            preset_options: self.preset_options()?,
            cmd_line,
        })
    }
}

/// Rebuild the command line for the trace header, dropping the flags that
/// must not survive into a replay configuration (`-s`, `-a`, `-u`, `-d`).
pub fn cmd_line_trace(args: &[String]) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-s" | "--seed" | "-a" | "--api-trace" | "-u" | "--untrace" => {
                let _ = iter.next();
            }
            "-d" | "--dd" | "-D" | "--dd-trace" => {
                if arg == "-D" || arg == "--dd-trace" {
                    let _ = iter.next();
                }
            }
            other => out.push(other),
        }
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Options {
        let mut argv = vec!["shrike"];
        argv.extend(args);
        Options::parse_from(argv)
    }

    #[test]
    fn seeds_parse_hex_first() {
        let opts = parse(&["-s", "deadbeef"]);
        assert_eq!(opts.seed, Some(0xdeadbeef));
        let opts = parse(&["-s", "123"]);
        assert_eq!(opts.seed, Some(0x123));
        // Not all hex digits: decimal.
        assert_eq!(parse_seed("99z"), Err("invalid digit found in string".to_string()));
    }

    #[test]
    fn theory_flags_collect() {
        let opts = parse(&["--bv", "--ints", "--no-strings"]);
        let enabled = opts.enabled_theories();
        assert_eq!(enabled, vec![Theory::Bv, Theory::Int]);
        assert!(opts.disabled_theories().contains(&Theory::String));
        // Defaults stay disabled.
        assert!(opts.disabled_theories().contains(&Theory::Bag));
    }

    #[test]
    fn preset_options_parse() {
        let opts = parse(&["-o", "incremental=true,produce-models=false"]);
        assert_eq!(
            opts.preset_options().unwrap(),
            vec![
                ("incremental".to_string(), "true".to_string()),
                ("produce-models".to_string(), "false".to_string()),
            ]
        );
        let opts = parse(&["-o", "broken"]);
        assert!(opts.preset_options().is_err());
    }

    #[test]
    fn fuzz_opts_filter_splits_patterns() {
        let opts = parse(&["--fuzz-opts", "^produce,model"]);
        assert_eq!(opts.fuzz_options_filter(), vec!["^produce", "model"]);
        let opts = parse(&["--fuzz-opts"]);
        assert!(opts.fuzz_opts.is_some());
        assert!(opts.fuzz_options_filter().is_empty());
    }

    #[test]
    fn cmd_line_trace_drops_per_run_flags() {
        let args: Vec<String> = ["--stub", "-s", "1f", "-a", "out.trace", "--bv", "-d", "-m", "5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(cmd_line_trace(&args), "--stub --bv -m 5");
    }

    #[test]
    fn smt2_accepts_optional_binary() {
        let opts = parse(&["--smt2"]);
        assert_eq!(opts.smt2.as_deref(), Some(""));
        let opts = parse(&["--smt2", "cvc5"]);
        assert_eq!(opts.smt2.as_deref(), Some("cvc5"));
        let opts = parse(&["--stub"]);
        assert!(opts.smt2.is_none());
    }
}
