//! Session state for one labeling run.
//!
//! Tracks the pending orientation edit and label choices for the file under
//! the cursor, the scan counter used to number output files, and the ordered
//! queue of input files. Pending state always describes the file at the
//! cursor and is reset atomically with cursor advancement.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing label vocabulary or editing session state.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("unknown side '{0}', expected L or R")]
    UnknownSide(String),

    #[error("unknown band '{0}', expected 'too short', '1st band', '2nd band' or a code 0-2")]
    UnknownBand(String),

    #[error("rotation {value}° for axis {axis} outside [{min}°, {max}°]")]
    RotationOutOfRange {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// One of the three rotation axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// Which ear the impression was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Single-letter code used in output file names and the ledger.
    pub fn code(self) -> &'static str {
        match self {
            Side::Left => "L",
            Side::Right => "R",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Side {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "L" | "l" => Ok(Side::Left),
            "R" | "r" => Ok(Side::Right),
            other => Err(SessionError::UnknownSide(other.to_string())),
        }
    }
}

/// Canal-length classification of a scanned impression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    TooShort,
    FirstBand,
    SecondBand,
}

impl Band {
    /// Numeric code used in output file names.
    pub fn code(self) -> u8 {
        match self {
            Band::TooShort => 0,
            Band::FirstBand => 1,
            Band::SecondBand => 2,
        }
    }

    /// Human-readable label stored in the ledger.
    pub fn label(self) -> &'static str {
        match self {
            Band::TooShort => "too short",
            Band::FirstBand => "1st band",
            Band::SecondBand => "2nd band",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Band {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "too short" | "0" => Ok(Band::TooShort),
            "1st band" | "1" => Ok(Band::FirstBand),
            "2nd band" | "2" => Ok(Band::SecondBand),
            other => Err(SessionError::UnknownBand(other.to_string())),
        }
    }
}

/// Pending orientation edit in degrees, one angle per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RotationState {
    /// Returns true when no rotation is pending.
    pub fn is_identity(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

/// Pending label choices; both must be set for a save to succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelSelection {
    pub side: Option<Side>,
    pub band: Option<Band>,
}

impl LabelSelection {
    /// Returns true when both side and band have been chosen.
    pub fn is_complete(&self) -> bool {
        self.side.is_some() && self.band.is_some()
    }
}

/// Mutable per-session state: pending edits plus the scan counter.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub rotation: RotationState,
    pub labels: LabelSelection,
    /// Monotonic counter prefixing output file names. Never reused once
    /// issued; incremented on save and on skip to keep numbering continuous.
    pub scan_counter: u64,
}

impl SessionState {
    /// Creates session state with the counter seeded from existing outputs.
    pub fn new(scan_counter: u64) -> Self {
        Self {
            rotation: RotationState::default(),
            labels: LabelSelection::default(),
            scan_counter,
        }
    }

    /// Set one pending rotation angle, validated against the given range.
    pub fn set_rotation(
        &mut self,
        axis: Axis,
        degrees: f64,
        min: f64,
        max: f64,
    ) -> Result<(), SessionError> {
        if !(min..=max).contains(&degrees) || !degrees.is_finite() {
            return Err(SessionError::RotationOutOfRange {
                axis,
                value: degrees,
                min,
                max,
            });
        }
        match axis {
            Axis::X => self.rotation.x = degrees,
            Axis::Y => self.rotation.y = degrees,
            Axis::Z => self.rotation.z = degrees,
        }
        Ok(())
    }

    /// Clear the pending rotation and labels for the next file.
    pub fn reset_pending(&mut self) {
        self.rotation = RotationState::default();
        self.labels = LabelSelection::default();
    }
}

/// Seed the scan counter from a processed-output directory.
///
/// Counts existing entries and starts one past them, so numbering continues
/// across separate runs against the same output location. A missing
/// directory seeds the counter at 1.
pub fn seed_scan_counter(processed_dir: &Path) -> u64 {
    let existing = fs::read_dir(processed_dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count() as u64)
        .unwrap_or(0);
    existing + 1
}

/// Ordered queue of input files with a cursor at the next unprocessed one.
#[derive(Debug, Clone)]
pub struct FileQueue {
    files: Vec<PathBuf>,
    cursor: usize,
}

impl FileQueue {
    /// Build a queue from an explicit file list (kept in the given order).
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self { files, cursor: 0 }
    }

    /// Scan a directory for mesh files with the given extension.
    ///
    /// Matching is case-insensitive; files are sorted by name so queue order
    /// is reproducible across runs.
    pub fn scan(dir: &Path, extension: &str) -> std::io::Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case(extension))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(Self { files, cursor: 0 })
    }

    /// The file under the cursor, or `None` when processing is complete.
    pub fn current(&self) -> Option<&Path> {
        self.files.get(self.cursor).map(PathBuf::as_path)
    }

    /// Move the cursor past the current file.
    ///
    /// Saturates at the queue length, preserving `cursor <= len`.
    pub fn advance(&mut self) {
        if self.cursor < self.files.len() {
            self.cursor += 1;
        }
    }

    /// Number of files not yet processed.
    pub fn remaining(&self) -> usize {
        self.files.len() - self.cursor
    }

    /// Total number of files in the queue.
    pub fn total(&self) -> usize {
        self.files.len()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// True once every file has been saved or skipped.
    pub fn is_complete(&self) -> bool {
        self.cursor == self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_side_codes_and_parsing() {
        assert_eq!(Side::Left.code(), "L");
        assert_eq!("r".parse::<Side>(), Ok(Side::Right));
        assert!(matches!(
            "left".parse::<Side>(),
            Err(SessionError::UnknownSide(_))
        ));
    }

    #[test]
    fn test_band_codes_are_total() {
        assert_eq!(Band::TooShort.code(), 0);
        assert_eq!(Band::FirstBand.code(), 1);
        assert_eq!(Band::SecondBand.code(), 2);
        assert_eq!(Band::FirstBand.label(), "1st band");
    }

    #[test]
    fn test_band_parses_label_and_code() {
        assert_eq!("too short".parse::<Band>(), Ok(Band::TooShort));
        assert_eq!("2ND BAND".parse::<Band>(), Ok(Band::SecondBand));
        assert_eq!("1".parse::<Band>(), Ok(Band::FirstBand));
        assert!("3".parse::<Band>().is_err());
    }

    #[test]
    fn test_set_rotation_range_check() {
        let mut session = SessionState::new(1);
        session.set_rotation(Axis::X, -180.0, -180.0, 180.0).unwrap();
        assert_eq!(session.rotation.x, -180.0);

        let err = session.set_rotation(Axis::Y, 185.0, -180.0, 180.0);
        assert!(matches!(
            err,
            Err(SessionError::RotationOutOfRange { axis: Axis::Y, .. })
        ));
        assert_eq!(session.rotation.y, 0.0);
    }

    #[test]
    fn test_reset_pending_clears_edits_only() {
        let mut session = SessionState::new(7);
        session.set_rotation(Axis::Z, 45.0, -180.0, 180.0).unwrap();
        session.labels.side = Some(Side::Left);
        session.labels.band = Some(Band::TooShort);

        session.reset_pending();

        assert!(session.rotation.is_identity());
        assert!(!session.labels.is_complete());
        assert_eq!(session.scan_counter, 7);
    }

    #[test]
    fn test_queue_cursor_invariants() {
        let mut queue =
            FileQueue::from_files(vec![PathBuf::from("a.stl"), PathBuf::from("b.stl")]);
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.current().unwrap(), Path::new("a.stl"));

        queue.advance();
        assert_eq!(queue.current().unwrap(), Path::new("b.stl"));
        queue.advance();
        assert!(queue.is_complete());
        assert!(queue.current().is_none());

        // Advancing past the end keeps cursor <= len.
        queue.advance();
        assert_eq!(queue.position(), 2);
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.stl", "a.STL", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let queue = FileQueue::scan(dir.path(), "stl").unwrap();
        assert_eq!(queue.total(), 2);
        assert_eq!(
            queue.current().unwrap().file_name().unwrap(),
            "a.STL"
        );
    }

    #[test]
    fn test_seed_scan_counter() {
        let dir = TempDir::new().unwrap();
        assert_eq!(seed_scan_counter(&dir.path().join("missing")), 1);

        File::create(dir.path().join("1L_1.stl")).unwrap();
        File::create(dir.path().join("2R_0.stl")).unwrap();
        assert_eq!(seed_scan_counter(dir.path()), 3);
    }
}
