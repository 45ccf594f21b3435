//! The `shrike` binary: mode dispatch, temp-directory management, signal
//! handling, and exit-code mapping.

use shrike_cli::supervisor;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::IntoDiagnostic;
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shrike_dd::exec::run_with_timeout;
use shrike_dd::{minimize, DdError, ExecOracle, GoldenOutput, MatchConfig};
use shrike_engine::actions::ActionRegistry;
use shrike_engine::fsm::Fsm;
use shrike_engine::run::{run_once, untrace_once, RunSummary, TRACE_HEADER};
use shrike_engine::EngineError;
use shrike_smt::backends::{CrossCheckSolver, Smt2Solver, StubSolver};
use shrike_smt::solver::Solver;

use shrike_cli::cli::{cmd_line_trace, Options};
use shrike_cli::supervisor::{ErrorMap, EXIT_CONFIG, EXIT_ERROR, EXIT_OK, EXIT_SOLVER_FAIL};

enum Failure {
    Config(String),
    Fatal(miette::Report),
}

impl From<miette::Report> for Failure {
    fn from(report: miette::Report) -> Self {
        Failure::Fatal(report)
    }
}

fn main() {
    std::process::exit(real_main());
}

fn real_main() -> i32 {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let merged = match merge_untrace_options(&raw_args) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("shrike: ERROR: {msg}");
            return EXIT_CONFIG;
        }
    };
    let opts = match Options::try_parse_from(
        std::iter::once("shrike".to_string()).chain(merged.iter().cloned()),
    ) {
        Ok(opts) => opts,
        Err(err) => err.exit(),
    };
    init_tracing(opts.verbosity);

    match run(&opts, &merged) {
        Ok(code) => code,
        Err(Failure::Config(msg)) => {
            eprintln!("shrike: ERROR: {msg}");
            EXIT_CONFIG
        }
        Err(Failure::Fatal(report)) => {
            eprintln!("shrike: ERROR: {report:?}");
            EXIT_ERROR
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// A trace beginning with the header line doubles as a run configuration:
/// prepend its recorded flags before parsing the command line.
fn merge_untrace_options(args: &[String]) -> Result<Vec<String>, String> {
    let mut trace_file = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-u" || arg == "--untrace" {
            trace_file = iter.next();
        }
    }
    let Some(trace_file) = trace_file else {
        return Ok(args.to_vec());
    };
    let content = fs::read_to_string(trace_file)
        .map_err(|e| format!("cannot read trace file `{trace_file}`: {e}"))?;
    let Some(first) = content.lines().next() else {
        return Ok(args.to_vec());
    };
    let Some(flags) = first.strip_prefix(TRACE_HEADER) else {
        return Ok(args.to_vec());
    };
    let mut merged: Vec<String> = flags.split_whitespace().map(|s| s.to_string()).collect();
    merged.extend(args.iter().cloned());
    Ok(merged)
}

fn run(opts: &Options, raw_args: &[String]) -> Result<i32, Failure> {
    let cmd_line = cmd_line_trace(raw_args);

    if opts.print_fsm {
        let registry = ActionRegistry::new();
        print!("{}", Fsm::build(&registry).render());
        return Ok(EXIT_OK);
    }

    if let (Some(trace), Some(untrace)) = (&opts.api_trace, &opts.untrace) {
        if trace == untrace {
            return Err(Failure::Config(
                "tracing into the file that is untraced is not supported".to_string(),
            ));
        }
    }

    let tmp_dir = opts
        .tmp_dir
        .join(format!("shrike-{}", std::process::id()));
    fs::create_dir_all(&tmp_dir).into_diagnostic()?;

    let stop = Arc::new(AtomicBool::new(false));
    let sig_id = {
        let stop = Arc::clone(&stop);
        unsafe {
            signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
                stop.store(true, Ordering::Relaxed)
            })
        }
        .ok()
    };

    let outcome = if opts.untrace.is_some() {
        untrace_mode(opts, &cmd_line, &tmp_dir)
    } else if let Some(seed) = opts.seed {
        seeded_mode(opts, &cmd_line, &tmp_dir, seed)
    } else {
        continuous_mode(opts, &cmd_line, &tmp_dir, &stop)
    };

    let _ = fs::remove_dir_all(&tmp_dir);

    if stop.load(Ordering::Relaxed) {
        if let Some(id) = sig_id {
            signal_hook::low_level::unregister(id);
        }
        let _ = signal_hook::low_level::raise(signal_hook::consts::SIGINT);
    }
    outcome
}

/* -------------------------------------------------------------------- */
/* Solver construction                                                  */
/* -------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolverChoice {
    Stub,
    Smt2Dump,
    Smt2Binary,
}

fn primary_choice(opts: &Options) -> Result<SolverChoice, Failure> {
    match (&opts.smt2, opts.stub) {
        (Some(_), true) => Err(Failure::Config("multiple solvers selected".to_string())),
        (Some(bin), false) if bin.is_empty() => Ok(SolverChoice::Smt2Dump),
        (Some(_), false) => Ok(SolverChoice::Smt2Binary),
        // The stub is the default back-end: it works out of the box.
        (None, _) => Ok(SolverChoice::Stub),
    }
}

fn make_primary(opts: &Options) -> Result<Box<dyn Solver>, Failure> {
    Ok(match primary_choice(opts)? {
        SolverChoice::Stub => Box::new(StubSolver::new()),
        SolverChoice::Smt2Dump => Box::new(Smt2Solver::offline(Box::new(io::sink()))),
        SolverChoice::Smt2Binary => {
            let binary = opts.smt2.as_deref().unwrap_or_default();
            Box::new(Smt2Solver::online(binary, &[]))
        }
    })
}

fn make_named(name: &str) -> Box<dyn Solver> {
    if name == "stub" {
        Box::new(StubSolver::new())
    } else {
        Box::new(Smt2Solver::online(name, &[]))
    }
}

fn build_solver(opts: &Options) -> Result<Box<dyn Solver>, Failure> {
    let primary = make_primary(opts)?;
    if let Some(name) = &opts.cross_check {
        return Ok(Box::new(CrossCheckSolver::new(primary, make_named(name))));
    }
    if let Some(name) = &opts.check {
        // An empty value means "a second instance of the primary's kind".
        let secondary = if name.is_empty() {
            make_primary(opts)?
        } else {
            make_named(name)
        };
        return Ok(Box::new(CrossCheckSolver::new(primary, secondary)));
    }
    Ok(primary)
}

/* -------------------------------------------------------------------- */
/* Modes                                                                */
/* -------------------------------------------------------------------- */

fn write_atomically(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn report_summary(opts: &Options, summary: &RunSummary) {
    if opts.stats {
        print!("{}", summary.stats.render());
    }
}

fn finding_exit(summary: &RunSummary) -> i32 {
    match &summary.finding {
        Some(message) => {
            eprintln!("shrike: ERROR: {message}");
            EXIT_SOLVER_FAIL
        }
        None => EXIT_OK,
    }
}

fn seeded_mode(
    opts: &Options,
    cmd_line: &str,
    tmp_dir: &Path,
    seed: u64,
) -> Result<i32, Failure> {
    let config = opts
        .run_config(seed, cmd_line.to_string())
        .map_err(Failure::Config)?;
    let solver = build_solver(opts)?;

    // With delta debugging the trace must land in a file, stdout otherwise.
    let trace_path = match (&opts.api_trace, opts.dd) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(tmp_dir.join("tmp.trace")),
        (None, false) => None,
    };

    let mut buffer = Vec::new();
    let summary = run_engine(run_once(&config, solver, &mut buffer))?;

    match &trace_path {
        Some(path) => write_atomically(path, &buffer).into_diagnostic()?,
        None => io::stdout().write_all(&buffer).into_diagnostic()?,
    }

    report_summary(opts, &summary);
    let code = finding_exit(&summary);

    if opts.dd {
        let trace_path = trace_path.expect("dd mode always traces into a file");
        dd_mode(opts, cmd_line, tmp_dir, &trace_path, Some(seed))?;
    }
    Ok(code)
}

fn untrace_mode(opts: &Options, cmd_line: &str, tmp_dir: &Path) -> Result<i32, Failure> {
    let path = opts.untrace.as_ref().expect("untrace mode requires -u");
    let content = fs::read_to_string(path).into_diagnostic()?;
    let config = opts
        .run_config(opts.seed.unwrap_or(0), cmd_line.to_string())
        .map_err(Failure::Config)?;
    let solver = build_solver(opts)?;

    let summary = match untrace_once(&config, solver, &content) {
        Ok(summary) => summary,
        Err(EngineError::Untrace(err)) => {
            eprintln!("shrike: ERROR: {err}");
            return Ok(EXIT_ERROR);
        }
        Err(err) => return Err(engine_failure(err)),
    };

    // Replay prints the verdict sequence; oracles and users compare it.
    let mut stdout = io::stdout();
    for verdict in &summary.verdicts {
        writeln!(stdout, "{verdict}").into_diagnostic()?;
    }

    report_summary(opts, &summary);
    let code = finding_exit(&summary);

    if opts.dd {
        dd_mode(opts, cmd_line, tmp_dir, path, opts.seed)?;
    }
    Ok(code)
}

fn continuous_mode(
    opts: &Options,
    cmd_line: &str,
    tmp_dir: &Path,
    stop: &AtomicBool,
) -> Result<i32, Failure> {
    let exe = std::env::current_exe().into_diagnostic()?;
    let out_dir = opts.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let flags: Vec<String> = cmd_line.split_whitespace().map(|s| s.to_string()).collect();
    let timeout = time_budget(opts);

    let mut seed_rng = rand::thread_rng();
    let mut next_seed = || u64::from(seed_rng.gen::<u32>());

    let tmp = tmp_dir.to_path_buf();
    let mut worker = move |seed: u64| {
        let trace_file = tmp.join(format!("shrike-{seed:x}.trace"));
        let mut cmd = Command::new(&exe);
        cmd.args(&flags)
            .arg("-s")
            .arg(format!("{seed:x}"))
            .arg("-a")
            .arg(&trace_file);
        let result = run_with_timeout(&mut cmd, timeout)?;
        if result.status.is_ok() {
            let _ = fs::remove_file(&trace_file);
        } else if trace_file.exists() {
            // Keep the erroneous trace next to the user.
            let kept = out_dir.join(format!("shrike-{seed:x}.trace"));
            let _ = fs::copy(&trace_file, &kept);
            let _ = fs::remove_file(&trace_file);
            info!(trace = %kept.display(), "kept failing trace");
        }
        Ok(result)
    };

    let mut errors = ErrorMap::default();
    let report = supervisor::run_loop(
        opts.max_runs,
        &[],
        &mut errors,
        stop,
        &mut next_seed,
        &mut worker,
    )
    .into_diagnostic()?;

    print!("{}", errors.render(opts.csv));
    if let Some(path) = &opts.export_errors {
        let json = errors.export_json();
        fs::write(path, format!("{json:#}\n")).into_diagnostic()?;
    }
    info!(runs = report.runs, errors = errors.len(), "continuous mode done");

    if errors.is_empty() {
        Ok(EXIT_OK)
    } else {
        Ok(EXIT_SOLVER_FAIL)
    }
}

fn time_budget(opts: &Options) -> Option<Duration> {
    if opts.time > 0.0 {
        Some(Duration::from_secs_f64(opts.time))
    } else {
        None
    }
}

fn dd_mode(
    opts: &Options,
    cmd_line: &str,
    tmp_dir: &Path,
    trace_path: &Path,
    seed: Option<u64>,
) -> Result<(), Failure> {
    let exe = std::env::current_exe().into_diagnostic()?;
    let mut replay_flags: Vec<String> =
        cmd_line.split_whitespace().map(|s| s.to_string()).collect();
    replay_flags.push("-u".to_string());
    let timeout = time_budget(opts);

    // The golden run fixes the symptom a reduction must keep reproducing.
    let mut golden_cmd = Command::new(&exe);
    golden_cmd.args(&replay_flags).arg(trace_path);
    let golden_result = run_with_timeout(&mut golden_cmd, timeout).into_diagnostic()?;
    let golden = GoldenOutput::from_result(&golden_result);

    // Default comparison is exit status plus stderr equality; stdout only
    // participates when a match pattern asks for it.
    let matching = MatchConfig {
        match_out: opts.dd_match_out.clone(),
        match_err: opts.dd_match_err.clone(),
        ignore_out: opts.dd_ignore_out || opts.dd_match_out.is_none(),
        ignore_err: opts.dd_ignore_err,
    };

    let mut oracle = ExecOracle::new(
        exe,
        replay_flags,
        golden,
        matching,
        timeout,
        tmp_dir.to_path_buf(),
    );

    let content = fs::read_to_string(trace_path).into_diagnostic()?;
    let report = match minimize(&content, &mut oracle) {
        Ok(report) => report,
        Err(DdError::UninterestingInput) => {
            return Err(Failure::Fatal(miette::miette!(
                "the interestingness oracle rejects the unreduced trace"
            )))
        }
        Err(DdError::Io(e)) => return Err(Failure::Fatal(miette::miette!(e))),
    };

    let out_path = match &opts.dd_trace {
        Some(path) => path.clone(),
        None => {
            let name = match seed {
                Some(seed) => format!("shrike-dd-{seed:x}.trace"),
                None => {
                    let base = trace_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "input.trace".to_string());
                    format!("shrike-dd-{base}")
                }
            };
            opts.out_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(name)
        }
    };
    write_atomically(&out_path, report.trace.as_bytes()).into_diagnostic()?;
    eprintln!(
        "shrike: dd: {} of {} lines kept after {} oracle calls, written to {}",
        report.final_lines,
        report.original_lines,
        report.oracle_calls,
        out_path.display()
    );
    Ok(())
}

fn engine_failure(err: EngineError) -> Failure {
    match err {
        EngineError::Config(msg) => Failure::Config(msg),
        other => Failure::Fatal(miette::miette!("{other}")),
    }
}

fn run_engine(result: Result<RunSummary, EngineError>) -> Result<RunSummary, Failure> {
    result.map_err(engine_failure)
}
