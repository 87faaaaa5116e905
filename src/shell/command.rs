use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use super::error::{ShellError, ShellResult};

/// One line of shell input, parsed by clap with the command name in first position
#[derive(Debug, Parser)]
#[command(
    name = "multiway",
    multicall = true,
    disable_help_subcommand = true,
    help_template = "Commands:\n{subcommands}"
)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Add an entry (keys are integers)
    #[command(visible_alias = "i")]
    Insert {
        #[arg(allow_negative_numbers = true)]
        key: i64,
        /// Words of the value, joined by single spaces
        #[arg(
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        value: Vec<String>,
    },
    /// Remove an entry
    #[command(visible_alias = "d")]
    Delete {
        #[arg(allow_negative_numbers = true)]
        key: i64,
    },
    /// Look up a value
    #[command(visible_alias = "s")]
    Search {
        #[arg(allow_negative_numbers = true)]
        key: i64,
    },
    /// Entries with lower <= key <= upper
    Range {
        #[arg(allow_negative_numbers = true)]
        lower: i64,
        #[arg(allow_negative_numbers = true)]
        upper: i64,
    },
    /// All entries as a table
    Dump,
    /// Tree structure as JSON
    Shape,
    /// Keys of every leaf, left to right
    Leaves,
    /// Size, height and node count
    Stats,
    /// Most keys a tree of that height can hold
    Capacity { levels: usize },
    /// Bulk insert key,value rows from a CSV file
    Load { path: PathBuf },
    /// Verify structural invariants
    Check,
    /// Drop every entry
    Clear,
    /// Show this message
    #[command(visible_alias = "?")]
    Help,
    /// Leave the shell
    #[command(visible_aliases = ["exit", "q"])]
    Quit,
}

impl Command {
    /// Parse a line; blank lines and `#` comments yield `None`
    pub fn parse(line: &str) -> ShellResult<Option<Command>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();
        let args = std::iter::once(name.as_str()).chain(words);

        match Line::try_parse_from(args) {
            Ok(parsed) => Ok(Some(parsed.command)),
            Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
                Err(ShellError::UnknownCommand(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Command summary rendered from the definitions above
    pub fn help() -> String {
        Line::command().render_help().to_string()
    }
}
