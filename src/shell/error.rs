use crate::config::ConfigError;
use crate::error::TreeError;
use rustyline::error::ReadlineError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Readline error: {0}")]
    Readline(#[from] ReadlineError),

    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown command: {0} (try `help`)")]
    UnknownCommand(String),
}

pub type ShellResult<T> = Result<T, ShellError>;
