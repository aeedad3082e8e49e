//! Pure rendering of session state.
//!
//! `render` derives a [`ViewModel`] from the current state with no side
//! effects; the CLI invokes it once after every controller action instead of
//! re-rendering reactively on each mutation.

use std::fmt;

use crate::processors::session::{Band, FileQueue, RotationState, SessionState, Side};

/// Snapshot of everything the presentation layer shows for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    /// Name of the file under the cursor, or `None` when complete.
    pub current_file: Option<String>,
    pub remaining: usize,
    pub total: usize,
    pub rotation: RotationState,
    pub side: Option<Side>,
    pub band: Option<Band>,
    pub ledger_rows: usize,
    pub next_scan_number: u64,
    pub complete: bool,
}

/// Derive the view model for the current state.
pub fn render(session: &SessionState, queue: &FileQueue, ledger_rows: usize) -> ViewModel {
    ViewModel {
        current_file: queue
            .current()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string()),
        remaining: queue.remaining(),
        total: queue.total(),
        rotation: session.rotation,
        side: session.labels.side,
        band: session.labels.band,
        ledger_rows,
        next_scan_number: session.scan_counter,
        complete: queue.is_complete(),
    }
}

impl fmt::Display for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.complete {
            return writeln!(
                f,
                "All {} files processed ({} ledger rows)",
                self.total, self.ledger_rows
            );
        }

        writeln!(f, "Files remaining: {} / {}", self.remaining, self.total)?;
        if let Some(name) = &self.current_file {
            writeln!(f, "File in use: {name} (next scan number {})", self.next_scan_number)?;
        }
        writeln!(
            f,
            "Rotation: X {:+.0}°  Y {:+.0}°  Z {:+.0}°",
            self.rotation.x, self.rotation.y, self.rotation.z
        )?;
        writeln!(
            f,
            "Side: {}   Band: {}",
            self.side.map_or("-", Side::code),
            self.band.map_or("-", Band::label)
        )?;
        write!(f, "Ledger rows: {}", self.ledger_rows)
    }
}
