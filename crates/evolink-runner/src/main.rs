//! The evolink CLI
//!
//! `run` executes a suite directory, `list` and `check` inspect it, and
//! the hidden `exec-image` subcommand is the sandbox's child mode: it
//! reads a serialized linked image, interprets it in-process, and writes
//! the outcome as JSON on stdout. Logs go to stderr so that protocol
//! stays clean.

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use evolink_artifact::{Diagnostic, DiagnosticOrigin};
use evolink_runner::{CaseRegistry, SuiteConfig, SuiteRunner};
use evolink_sandbox::{execute, ExecOutcome, Isolation, LinkedImage};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Command::new("evolink")
        .version(evolink_runner::VERSION)
        .about("Binary-compatibility verification for evolving ulib libraries")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run a suite of evolution cases")
                .arg(suite_arg())
                .arg(
                    Arg::new("case")
                        .long("case")
                        .action(ArgAction::Append)
                        .help("Run only the named case ids"),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .value_parser(value_parser!(usize))
                        .help("Max cases in flight at once"),
                )
                .arg(
                    Arg::new("timeout-secs")
                        .long("timeout-secs")
                        .value_parser(value_parser!(u64))
                        .help("Per-execution timeout in seconds"),
                )
                .arg(
                    Arg::new("in-process")
                        .long("in-process")
                        .action(ArgAction::SetTrue)
                        .help("Execute images inside this process instead of a child"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Emit the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List the registered cases of a suite")
                .arg(suite_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Verify registry/file completeness without running")
                .arg(suite_arg()),
        )
        .subcommand(
            Command::new("exec-image")
                .about("Execute a serialized linked image (internal)")
                .hide(true)
                .arg(
                    Arg::new("image")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the image file"),
                ),
        );

    let matches = cli.get_matches();
    let code = match matches.subcommand() {
        Some(("run", args)) => cmd_run(args).await,
        Some(("list", args)) => cmd_list(args),
        Some(("check", args)) => cmd_check(args),
        Some(("exec-image", args)) => cmd_exec_image(args),
        _ => 2,
    };
    std::process::exit(code);
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn suite_arg() -> Arg {
    Arg::new("suite")
        .long("suite")
        .default_value("cases")
        .value_parser(value_parser!(PathBuf))
        .help("Suite directory")
}

fn suite_dir(args: &ArgMatches) -> PathBuf {
    args.get_one::<PathBuf>("suite").unwrap().clone()
}

async fn cmd_run(args: &ArgMatches) -> i32 {
    match try_run(args).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("error: {err:#}");
            2
        }
    }
}

async fn try_run(args: &ArgMatches) -> anyhow::Result<bool> {
    let dir = suite_dir(args);
    let mut registry = CaseRegistry::load(&dir)
        .with_context(|| format!("loading suite at {}", dir.display()))?;

    let ids: Vec<String> = args
        .get_many::<String>("case")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    if !ids.is_empty() {
        registry = registry.subset(&ids)?;
    }

    let mut config = SuiteConfig::new();
    if let Some(parallel) = args.get_one::<usize>("parallel") {
        config = config.with_max_parallel_cases(*parallel);
    }
    if let Some(secs) = args.get_one::<u64>("timeout-secs") {
        config = config.with_exec_timeout(Duration::from_secs(*secs));
    }
    if args.get_flag("in-process") {
        config = config.with_isolation(Isolation::InProcess);
    }

    let report = SuiteRunner::new(config).run(&registry).await;
    if args.get_flag("json") {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(report.is_success())
}

fn cmd_list(args: &ArgMatches) -> i32 {
    match CaseRegistry::load(&suite_dir(args)) {
        Ok(registry) => {
            for case in registry.cases() {
                match &case.title {
                    Some(title) => {
                        println!("{:<28} [{:<14}] {title}", case.id, case.expected.kind());
                    }
                    None => println!("{:<28} [{}]", case.id, case.expected.kind()),
                }
            }
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            2
        }
    }
}

fn cmd_check(args: &ArgMatches) -> i32 {
    let dir = suite_dir(args);
    match CaseRegistry::load(&dir) {
        Ok(registry) => {
            println!(
                "suite {}: {} cases registered, completeness ok",
                registry.name(),
                registry.len()
            );
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn cmd_exec_image(args: &ArgMatches) -> i32 {
    let path = args.get_one::<PathBuf>("image").unwrap();
    match run_image(path) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            2
        }
    }
}

fn run_image(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading image at {}", path.display()))?;
    let image = LinkedImage::from_bytes(&bytes).context("decoding linked image")?;
    let outcome = if image.verify() {
        execute(&image)
    } else {
        ExecOutcome {
            exit_code: 1,
            stdout: String::new(),
            diagnostics: vec![Diagnostic::error(
                DiagnosticOrigin::Infra,
                "image integrity check failed".to_owned(),
            )],
        }
    };
    Ok(serde_json::to_string(&outcome)?)
}
