//! Append-only result ledger (`Reports.csv`)

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{Error, Result, Verdict};

const HEADER: [&str; 3] = ["Test ID", "Result", "Execution Time (s)"];

/// One finished test case
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: String,
    pub verdict: Verdict,
    pub elapsed: Duration,
}

/// Totals for a finished run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn from_entries(entries: &[LedgerEntry], elapsed: Duration) -> Self {
        let passed = entries.iter().filter(|e| e.verdict.is_pass()).count();
        Self {
            total: entries.len(),
            passed,
            failed: entries.len() - passed,
            elapsed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// In-memory ledger mirrored row by row into a CSV file
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Create (or truncate) the CSV at `path` and write the header row
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = File::create(&path)?;
        writeln!(file, "{}", csv_row(&HEADER))?;
        Ok(Self {
            path,
            entries: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Keep `entry` in memory and append it to the file.
    ///
    /// The in-memory row is kept even when the file write fails.
    pub fn record(&mut self, entry: LedgerEntry) -> Result<()> {
        let row = csv_row(&[
            entry.id.as_str(),
            &entry.verdict.to_string(),
            &format!("{:.2}", entry.elapsed.as_secs_f64()),
        ]);
        self.entries.push(entry);
        self.append(&row)
    }

    /// Blank line, then `Total Tests,<n>,Pass: <p>,Fail: <f>,Total Time: <t>s`
    pub fn write_trailer(&self, summary: &RunSummary) -> Result<()> {
        let trailer = csv_row(&[
            "Total Tests",
            &summary.total.to_string(),
            &format!("Pass: {}", summary.passed),
            &format!("Fail: {}", summary.failed),
            &format!("Total Time: {:.2}s", summary.elapsed.as_secs_f64()),
        ]);
        self.append(&format!("\n{trailer}"))
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::file_read(&self.path, e))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn csv_row(fields: &[&str]) -> String {
    fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",")
}

/// Quote a field when it holds a separator, quote or line break
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
