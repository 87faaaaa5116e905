use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use multiway::{Command, Flow, Shell, ShellResult, TreeConfig, Variant};

/// Interactive shell over a classic B-Tree or a B+Tree
#[derive(Debug, Parser)]
#[command(name = "multiway", version, about)]
struct Cli {
    /// JSON file with `degree` and `variant`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum branching degree (overrides the config file)
    #[arg(short, long)]
    degree: Option<usize>,

    /// Tree family (overrides the config file)
    #[arg(long, value_enum)]
    variant: Option<Variant>,

    /// CSV file of key,value rows to load before running commands
    #[arg(short, long)]
    load: Option<PathBuf>,

    /// Run these commands and exit instead of starting the REPL
    #[arg(short = 'e', long = "execute")]
    execute: Vec<String>,

    /// Log structural events (splits, joins, rotations) to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn tree_config(&self) -> ShellResult<TreeConfig> {
        let mut config = match &self.config {
            Some(path) => TreeConfig::load(path)?,
            None => TreeConfig::default(),
        };
        if let Some(degree) = self.degree {
            config.degree = degree;
        }
        if let Some(variant) = self.variant {
            config.variant = variant;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print a command's output; returns false once the shell should stop
fn print_outcome(result: ShellResult<Flow>) -> bool {
    match result {
        Ok(Flow::Output(text)) => {
            if !text.is_empty() {
                println!("{}", text.trim_end());
            }
            true
        }
        Ok(Flow::Quit) => false,
        Err(e) => {
            eprintln!("Error: {}", e);
            true
        }
    }
}

fn repl(shell: &mut Shell) -> ShellResult<()> {
    let mut editor = DefaultEditor::new()?;
    let prompt = format!("{}({})> ", shell.config().variant, shell.config().degree);

    loop {
        match editor.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = editor.add_history_entry(line.as_str()) {
                        warn!(error = %e, "could not record history entry");
                    }
                }
                if !print_outcome(shell.run_line(&line)) {
                    return Ok(());
                }
            }
            // Ctrl-C drops the current line, Ctrl-D leaves
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn run(cli: Cli) -> ShellResult<()> {
    let config = cli.tree_config()?;
    info!(degree = config.degree, variant = %config.variant, "starting shell");
    let mut shell = Shell::new(config)?;

    if let Some(path) = cli.load {
        print_outcome(shell.execute(Command::Load { path }));
    }

    if cli.execute.is_empty() {
        return repl(&mut shell);
    }

    for line in &cli.execute {
        if !print_outcome(shell.run_line(line)) {
            break;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            warn!(error = %e, "shell stopped");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
