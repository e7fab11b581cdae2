use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use alany_core::kernel::config;
use alany_core::{ExprRoutine, Memory, Raw};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Bind values and evaluate expressions against a fresh global scope.
#[derive(Debug, Parser)]
#[command(name = "alany-core", version)]
struct Cli {
    /// Directory holding `.alany.toml` (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Define an expression routine: `name(a, b)=body`
    #[arg(long = "def", value_name = "SIGNATURE")]
    defs: Vec<String>,

    /// Bind NAME=RAW in the global scope
    #[arg(long = "bind", value_name = "NAME=RAW")]
    binds: Vec<String>,

    /// Declare NAME=RAW global from inside a call scope
    #[arg(long = "global", value_name = "NAME=RAW")]
    globals: Vec<String>,

    /// Context file reported to routines
    #[arg(long, default_value = "")]
    file: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Expressions to evaluate
    exprs: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let root = match cli.root {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let cfg = config::load(Some(&root));
    let mut mem = Memory::new(cfg);
    let global = mem.global();

    for src in &cli.defs {
        let (name, routine) = ExprRoutine::parse(&mut mem, global, src)?;
        tracing::debug!(%name, body = routine.body(), "defined routine");
        mem.bind(global, &name, Raw::Callable(Rc::new(routine)))
            .with_context(|| format!("defining `{name}`"))?;
    }
    for pair in &cli.binds {
        let (name, raw) = split_pair(pair)?;
        mem.bind(global, name, raw).with_context(|| format!("binding `{name}`"))?;
    }
    if !cli.globals.is_empty() {
        let call = mem.spawn(global)?;
        for pair in &cli.globals {
            let (name, raw) = split_pair(pair)?;
            mem.bind_global(call, name, raw)
                .with_context(|| format!("declaring `{name}` global"))?;
        }
        mem.release(call);
    }

    for expr in &cli.exprs {
        let value = mem
            .evaluate_value(global, expr, &cli.file)
            .with_context(|| format!("evaluating `{expr}`"))?;
        if cli.json {
            println!("{}", value.to_json());
        } else {
            println!("{value}");
        }
    }
    Ok(())
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(name, raw)| (name.trim(), raw))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("expected NAME=RAW, got `{pair}`"))
}

fn setup_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
