use csv::{ReaderBuilder, Trim};
use std::path::Path;
use tracing::{debug, info};

use super::error::{ShellError, ShellResult};
use crate::error::TreeError;
use crate::index::OrderedIndex;

/// Outcome of a bulk load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    /// Rows whose key was already present; they are skipped
    pub duplicates: usize,
}

/// Insert every `key,value` row of a CSV file
///
/// A first row whose key is not an integer is taken as a header. Missing
/// values load as empty strings; fields past the second are ignored.
pub fn load_csv(
    index: &mut dyn OrderedIndex<i64, String>,
    path: &Path,
) -> ShellResult<LoadReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields per row
        .trim(Trim::All)
        .from_path(path)?;

    let mut report = LoadReport::default();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let Some(key_field) = record.get(0).filter(|field| !field.is_empty()) else {
            continue;
        };

        let key: i64 = match key_field.parse() {
            Ok(key) => key,
            Err(_) if row == 0 => {
                debug!(header = key_field, "skipping csv header");
                continue;
            }
            Err(_) => {
                return Err(ShellError::Parse(format!(
                    "row {}: invalid key {key_field}",
                    row + 1
                )));
            }
        };
        let value = record.get(1).unwrap_or_default().to_string();

        match index.insert(key, value) {
            Ok(()) => report.inserted += 1,
            Err(TreeError::DuplicateKey) => report.duplicates += 1,
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        path = %path.display(),
        inserted = report.inserted,
        duplicates = report.duplicates,
        "loaded csv"
    );
    Ok(report)
}
