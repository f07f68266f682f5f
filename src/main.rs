use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tutorcc::ast::Program;
use tutorcc::error::EvalError;
use tutorcc::interpreter::Interpreter;
use tutorcc::io::Input;
use tutorcc::stepper::Stepper;
use tutorcc::translate::{Lang, Translator};

#[derive(Parser)]
#[command(name = "tutorcc")]
#[command(version)]
#[command(about = "Run or single-step programs written in a teaching subset of C++")]
struct Cli {
    /// Path to the source file to run
    file: PathBuf,
    /// Print every step: source range, excerpt, explanation and output
    #[arg(long)]
    step: bool,
    /// With --step, also print the environment after each step
    #[arg(long, requires = "step")]
    env: bool,
    /// Language of messages and step explanations
    #[arg(long, value_enum, env = "TUTORCC_LANG", default_value = "en")]
    lang: Lang,
    /// Log interpreter internals at debug level to stderr
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    debug!(
        git = option_env!("TUTORCC_GIT_HASH").unwrap_or("unknown"),
        tree = env!("TUTORCC_GIT_DIRTY"),
        built = env!("TUTORCC_BUILD_UNIX"),
        "tutorcc starting"
    );

    let tr = Translator::new(cli.lang);
    let src = fs::read_to_string(&cli.file)
        .with_context(|| format!("cannot read {}", cli.file.display()))?;
    let program = match tutorcc::parse_source(&src) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("<{}>: {}", tr.tr("Compilation Error", &[]), e);
            process::exit(1);
        }
    };

    let ok = if cli.step {
        step_program(&program, &src, tr, cli.env)?
    } else {
        run_program(&program, tr)
    };
    if !ok {
        process::exit(1);
    }
    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("tutorcc=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_program(program: &Program, tr: Translator) -> bool {
    let input = Input::new(Box::new(io::stdin().lock()));
    let mut interp = Interpreter::new(input, Box::new(io::stdout()), tr);
    match interp.run(program) {
        Ok(()) => true,
        Err(e) => {
            report(tr, &e);
            false
        }
    }
}

fn step_program(program: &Program, src: &str, tr: Translator, show_env: bool) -> anyhow::Result<bool> {
    let input = Input::new(Box::new(io::stdin().lock()));
    let mut stepper = Stepper::with_input(input, tr);
    let mut out = io::stdout().lock();
    stepper.start(program);
    let mut n = 0;
    while let Some(span) = stepper.span() {
        n += 1;
        writeln!(out, "[{}] {}  {}", n, span, first_line(span.excerpt(src)))?;
        if !stepper.step() {
            break;
        }
        writeln!(out, "    {}", stepper.status())?;
        for line in stepper.output().lines() {
            writeln!(out, "    | {}", line)?;
        }
        if show_env {
            writeln!(out, "    {}", stepper.env_json())?;
        }
    }
    for line in stepper.output().lines() {
        writeln!(out, "    | {}", line)?;
    }
    out.flush()?;
    match stepper.error() {
        Some(e) => {
            report(tr, e);
            Ok(false)
        }
        None => Ok(true),
    }
}

fn report(tr: Translator, e: &EvalError) {
    let _ = io::stdout().flush();
    eprintln!("<{}>: {}", tr.tr("Execution Error", &[]), e);
}

fn first_line(s: &str) -> String {
    let mut lines = s.lines();
    let first = lines.next().unwrap_or("").trim_end();
    if lines.next().is_some() {
        format!("{} ...", first)
    } else {
        first.to_string()
    }
}
