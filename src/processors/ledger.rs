//! The label ledger: one CSV row per processed scan.
//!
//! The ledger is append-only in memory and rewritten in full on every
//! persist. There is no partial-write recovery; the in-memory table is the
//! authority until the next successful flush.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// One processed scan: original name, assigned name, labels, and the
/// rotation (in degrees) that was applied before export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub original_filename: String,
    pub new_filename: String,
    pub side: String,
    pub band: String,
    pub rotation_x: f64,
    pub rotation_y: f64,
    pub rotation_z: f64,
}

/// In-memory ledger table, preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct LabelLedger {
    rows: Vec<LedgerRow>,
}

impl LabelLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger from a CSV file, or start empty if none exists.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::new());
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            rows.push(record?);
        }
        Ok(Self { rows })
    }

    /// Append one row to the in-memory table.
    pub fn append(&mut self, row: LedgerRow) {
        self.rows.push(row);
    }

    /// Rewrite the full table (header plus all rows) to `path`.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// All rows in insertion order.
    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no scan has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_row() -> LedgerRow {
        LedgerRow {
            original_filename: "a.stl".to_string(),
            new_filename: "1L_1.stl".to_string(),
            side: "L".to_string(),
            band: "1st band".to_string(),
            rotation_x: 15.0,
            rotation_y: -90.0,
            rotation_z: 0.0,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = LabelLedger::load(&dir.path().join("labels.csv")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");

        let mut ledger = LabelLedger::new();
        ledger.append(sample_row());
        ledger.persist(&path).unwrap();

        let reloaded = LabelLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.rows()[0], sample_row());
    }

    #[test]
    fn test_persist_writes_fixed_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");

        let mut ledger = LabelLedger::new();
        ledger.append(sample_row());
        ledger.persist(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "original_filename,new_filename,side,band,rotation_x,rotation_y,rotation_z"
        );
    }

    #[test]
    fn test_persist_rewrites_full_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");

        let mut ledger = LabelLedger::new();
        ledger.append(sample_row());
        ledger.persist(&path).unwrap();

        let mut second = sample_row();
        second.original_filename = "b.stl".to_string();
        second.new_filename = "2R_2.stl".to_string();
        ledger.append(second);
        ledger.persist(&path).unwrap();

        let reloaded = LabelLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.rows()[1].new_filename, "2R_2.stl");
    }
}
