//! Line-oriented command shell over either tree variant
//!
//! Keys are `i64` and values are `String`. The binary feeds it lines from a
//! REPL or from `--execute`; every command produces text for stdout.

mod command;
mod error;
mod loader;

pub use command::Command;
pub use error::{ShellError, ShellResult};
pub use loader::{LoadReport, load_csv};

use prettytable::{Table, row};
use tracing::debug;

use crate::config::TreeConfig;
use crate::index::OrderedIndex;

/// What the caller should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Output(String),
    Quit,
}

pub struct Shell {
    index: Box<dyn OrderedIndex<i64, String>>,
    config: TreeConfig,
}

impl Shell {
    pub fn new(config: TreeConfig) -> ShellResult<Self> {
        let index = config.build()?;
        Ok(Self { index, config })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn index(&self) -> &dyn OrderedIndex<i64, String> {
        &*self.index
    }

    /// Parse and run one line; blank lines produce no output
    pub fn run_line(&mut self, line: &str) -> ShellResult<Flow> {
        match Command::parse(line)? {
            Some(command) => self.execute(command),
            None => Ok(Flow::Output(String::new())),
        }
    }

    pub fn execute(&mut self, command: Command) -> ShellResult<Flow> {
        debug!(?command, "execute");

        let output = match command {
            Command::Insert { key, value } => {
                self.index.insert(key, value.join(" "))?;
                format!("inserted {key}")
            }
            Command::Delete { key } => {
                if self.index.delete(&key) {
                    format!("deleted {key}")
                } else {
                    format!("key {key} not found")
                }
            }
            Command::Search { key } => match self.index.search(&key) {
                Some(value) => value.clone(),
                None => format!("key {key} not found"),
            },
            Command::Range { lower, upper } => {
                entry_table(self.index.range_search(&lower, &upper))
            }
            Command::Dump => entry_table(self.index.sorted_entries()),
            Command::Shape => match self.index.shape() {
                Some(shape) => serde_json::to_string_pretty(&shape)?,
                None => "(empty)".to_string(),
            },
            Command::Leaves => {
                let leaves: Vec<String> = self
                    .index
                    .leaf_keys()
                    .iter()
                    .map(|keys| format!("{keys:?}"))
                    .collect();
                if leaves.is_empty() {
                    "(empty)".to_string()
                } else {
                    leaves.join(" -> ")
                }
            }
            Command::Stats => self.stats_table(),
            Command::Capacity { levels } => format!(
                "a {} tree of degree {} and height {levels} holds at most {} keys",
                self.index.variant_name(),
                self.index.degree(),
                self.index.capacity_for_height(levels)
            ),
            Command::Load { path } => {
                let report = load_csv(&mut *self.index, &path)?;
                format!(
                    "loaded {} entries ({} duplicates skipped)",
                    report.inserted, report.duplicates
                )
            }
            Command::Check => {
                self.index.check_invariants()?;
                "ok".to_string()
            }
            Command::Clear => {
                self.index.clear();
                "cleared".to_string()
            }
            Command::Help => Command::help(),
            Command::Quit => return Ok(Flow::Quit),
        };

        Ok(Flow::Output(output))
    }

    fn stats_table(&self) -> String {
        let mut table = Table::new();
        table.set_titles(row!["Property", "Value"]);
        table.add_row(row!["variant", self.index.variant_name()]);
        table.add_row(row!["degree", self.index.degree()]);
        table.add_row(row!["entries", self.index.len()]);
        table.add_row(row!["height", self.index.height()]);
        table.add_row(row!["nodes", self.index.node_count()]);
        table.to_string()
    }
}

fn entry_table(entries: Vec<(i64, String)>) -> String {
    let count = entries.len();
    let mut table = Table::new();
    table.set_titles(row!["Key", "Value"]);
    for (key, value) in entries {
        table.add_row(row![key, value]);
    }
    format!("{table}({count} entries)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::error::TreeError;
    use std::fs;
    use tempfile::TempDir;

    fn shell(variant: Variant) -> Shell {
        Shell::new(TreeConfig::new(3, variant)).unwrap()
    }

    fn output(shell: &mut Shell, line: &str) -> String {
        match shell.run_line(line).unwrap() {
            Flow::Output(text) => text,
            Flow::Quit => panic!("unexpected quit for {line}"),
        }
    }

    #[test]
    fn test_insert_search_delete() {
        for variant in [Variant::Classic, Variant::BPlus] {
            let mut shell = shell(variant);

            assert_eq!(output(&mut shell, "insert 5 five"), "inserted 5");
            assert_eq!(output(&mut shell, "search 5"), "five");
            assert_eq!(output(&mut shell, "search 6"), "key 6 not found");
            assert_eq!(output(&mut shell, "delete 5"), "deleted 5");
            assert_eq!(output(&mut shell, "delete 5"), "key 5 not found");
        }
    }

    #[test]
    fn test_duplicate_insert_is_an_error() {
        let mut shell = shell(Variant::BPlus);
        output(&mut shell, "insert 1 a");

        assert!(matches!(
            shell.run_line("insert 1 b"),
            Err(ShellError::Tree(TreeError::DuplicateKey))
        ));
        assert_eq!(output(&mut shell, "search 1"), "a");
    }

    #[test]
    fn test_dump_and_range_tables() {
        let mut shell = shell(Variant::Classic);
        for key in [30, 10, 20] {
            output(&mut shell, &format!("insert {key} v{key}"));
        }

        let dump = output(&mut shell, "dump");
        assert!(dump.contains("v10") && dump.contains("v30"));
        assert!(dump.ends_with("(3 entries)"));
        assert!(dump.find("v10") < dump.find("v20"));

        let range = output(&mut shell, "range 15 25");
        assert!(range.contains("v20"));
        assert!(!range.contains("v10"));
        assert!(range.ends_with("(1 entries)"));
    }

    #[test]
    fn test_shape_and_leaves() {
        let mut shell = shell(Variant::BPlus);
        assert_eq!(output(&mut shell, "shape"), "(empty)");
        assert_eq!(output(&mut shell, "leaves"), "(empty)");

        for key in [10, 20, 30] {
            output(&mut shell, &format!("insert {key} x"));
        }

        let shape: serde_json::Value = serde_json::from_str(&output(&mut shell, "shape")).unwrap();
        assert_eq!(shape["keys"], serde_json::json!([30]));
        assert_eq!(output(&mut shell, "leaves"), "[10, 20] -> [30]");
    }

    #[test]
    fn test_stats_and_capacity() {
        let mut shell = shell(Variant::Classic);
        output(&mut shell, "insert 1 a");

        let stats = output(&mut shell, "stats");
        assert!(stats.contains("classic"));
        assert!(stats.contains("entries"));

        assert_eq!(
            output(&mut shell, "capacity 2"),
            "a classic tree of degree 3 and height 2 holds at most 8 keys"
        );
    }

    #[test]
    fn test_load_check_clear() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rows.csv");
        fs::write(&path, "1,a\n2,b\n2,c\n3,d\n").unwrap();

        let mut shell = shell(Variant::BPlus);
        assert_eq!(
            output(&mut shell, &format!("load {}", path.display())),
            "loaded 3 entries (1 duplicates skipped)"
        );
        assert_eq!(output(&mut shell, "check"), "ok");
        assert_eq!(shell.index().len(), 3);

        assert_eq!(output(&mut shell, "clear"), "cleared");
        assert!(shell.index().is_empty());
    }

    #[test]
    fn test_quit_blank_and_unknown() {
        let mut shell = shell(Variant::BPlus);

        assert_eq!(shell.run_line("quit").unwrap(), Flow::Quit);
        assert_eq!(output(&mut shell, "   "), "");
        assert!(output(&mut shell, "help").contains("insert"));
        assert!(matches!(
            shell.run_line("bogus"),
            Err(ShellError::UnknownCommand(_))
        ));
    }
}
