//! The file workflow controller.
//!
//! Walks the input queue one scan at a time: load, preview, then either save
//! (transform + export + ledger row) or skip (relocate the source, no ledger
//! row). Pending session state is reset atomically with every cursor
//! advancement. All errors are recoverable; the caller stays on the same
//! file and may retry.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::config::LabelerConfig;
use crate::core::loaders::{self, LoaderError, TriangleMesh};
use crate::core::transforms::{self, GeometryError};
use crate::core::writers::{self, WriteError};
use crate::processors::ledger::{LabelLedger, LedgerError, LedgerRow};
use crate::processors::session::{
    seed_scan_counter, Axis, Band, FileQueue, SessionError, SessionState, Side,
};
use crate::processors::view::{render, ViewModel};

/// Errors from controller operations.
///
/// `Load`, `Validation`, `Geometry` and `Export` leave the queue cursor, the
/// scan counter and the ledger untouched.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("all files in the queue have been processed")]
    QueueExhausted,

    #[error("failed to load '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: LoaderError,
    },

    #[error("incomplete label selection: {missing} not chosen")]
    Validation { missing: &'static str },

    #[error("degenerate geometry in '{name}': {source}")]
    Geometry {
        name: String,
        #[source]
        source: GeometryError,
    },

    #[error("failed to export '{name}': {source}")]
    Export {
        name: String,
        #[source]
        source: WriteError,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// What a successful save produced.
#[derive(Debug)]
pub struct SaveOutcome {
    pub original_filename: String,
    pub new_filename: String,
    /// Set when the output file was written but the ledger flush failed.
    /// The row is retained in memory and rewritten on the next successful
    /// persist; until then the output has no durable ledger record.
    pub persist_warning: Option<LedgerError>,
}

/// Drives one labeling session over a directory of input scans.
pub struct WorkflowController {
    config: LabelerConfig,
    processed_dir: PathBuf,
    skipped_dir: PathBuf,
    ledger_path: PathBuf,
    queue: FileQueue,
    session: SessionState,
    ledger: LabelLedger,
}

impl WorkflowController {
    /// Open a session over `input_dir`.
    ///
    /// Scans the directory for mesh files, creates the processed/skipped
    /// subdirectories, seeds the scan counter from existing outputs, and
    /// loads any existing ledger.
    pub fn open<P: AsRef<Path>>(input_dir: P, config: LabelerConfig) -> Result<Self> {
        let input_dir = input_dir.as_ref();
        let processed_dir = input_dir.join(&config.output.processed_dir);
        let skipped_dir = input_dir.join(&config.output.skipped_dir);
        let ledger_path = input_dir.join(&config.output.ledger_filename);

        fs::create_dir_all(&processed_dir)?;
        fs::create_dir_all(&skipped_dir)?;

        let queue = FileQueue::scan(input_dir, &config.output.mesh_extension)?;
        let counter = seed_scan_counter(&processed_dir);
        let ledger = LabelLedger::load(&ledger_path)?;

        info!(
            "session opened: {} files queued, counter seeded at {}, {} ledger rows",
            queue.total(),
            counter,
            ledger.len()
        );

        Ok(Self {
            config,
            processed_dir,
            skipped_dir,
            ledger_path,
            queue,
            session: SessionState::new(counter),
            ledger,
        })
    }

    /// The file under the cursor, or `None` when the session is complete.
    pub fn current_file(&self) -> Option<&Path> {
        self.queue.current()
    }

    /// True once every queued file has been saved or skipped.
    pub fn is_complete(&self) -> bool {
        self.queue.is_complete()
    }

    pub fn queue(&self) -> &FileQueue {
        &self.queue
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn ledger(&self) -> &LabelLedger {
        &self.ledger
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Set one pending rotation angle, validated against the configured range.
    pub fn set_rotation(&mut self, axis: Axis, degrees: f64) -> Result<()> {
        self.session.set_rotation(
            axis,
            degrees,
            self.config.rotation.min_deg,
            self.config.rotation.max_deg,
        )?;
        Ok(())
    }

    pub fn select_side(&mut self, side: Side) {
        self.session.labels.side = Some(side);
    }

    pub fn select_band(&mut self, band: Band) {
        self.session.labels.band = Some(band);
    }

    /// Parse the file under the cursor into a mesh.
    ///
    /// A failure blocks the file (the cursor does not move); the user decides
    /// whether to skip it or fix the input.
    pub fn load_current(&self) -> Result<TriangleMesh> {
        let path = self.queue.current().ok_or(WorkflowError::QueueExhausted)?;
        loaders::load_stl(path).map_err(|source| WorkflowError::Load {
            name: display_name(path),
            source,
        })
    }

    /// Rotate a disposable copy of `mesh` by the pending angles.
    ///
    /// The canonical loaded mesh is never mutated, so repeated angle edits
    /// stay idempotent against the original.
    pub fn preview(&self, mesh: &TriangleMesh) -> TriangleMesh {
        let r = self.session.rotation;
        transforms::rotated(mesh, r.x, r.y, r.z)
    }

    /// Save the current file: validate labels, transform, export, record.
    ///
    /// On success the scan counter increments, pending state resets, and the
    /// cursor advances. A ledger flush failure after a successful export is
    /// reported through [`SaveOutcome::persist_warning`] rather than an
    /// error: the output exists and the session can continue, but the row
    /// has no durable record until the next flush.
    pub fn save_current(&mut self) -> Result<SaveOutcome> {
        let path = self
            .queue
            .current()
            .ok_or(WorkflowError::QueueExhausted)?
            .to_path_buf();
        let original = display_name(&path);

        let (side, band) = match (self.session.labels.side, self.session.labels.band) {
            (Some(s), Some(b)) => (s, b),
            (None, None) => return Err(WorkflowError::Validation { missing: "side and band" }),
            (None, _) => return Err(WorkflowError::Validation { missing: "side" }),
            (_, None) => return Err(WorkflowError::Validation { missing: "band" }),
        };

        let mut mesh = loaders::load_stl(&path).map_err(|source| WorkflowError::Load {
            name: original.clone(),
            source,
        })?;

        let rotation = self.session.rotation;
        transforms::rotate(&mut mesh, rotation.x, rotation.y, rotation.z);
        transforms::recenter(&mut mesh).map_err(|source| WorkflowError::Geometry {
            name: original.clone(),
            source,
        })?;

        let new_filename = format!(
            "{}{}_{}.{}",
            self.session.scan_counter,
            side.code(),
            band.code(),
            self.config.output.mesh_extension
        );
        let output_path = self.processed_dir.join(&new_filename);
        writers::write_stl(&output_path, &mesh, self.config.output.binary_stl).map_err(
            |source| WorkflowError::Export {
                name: new_filename.clone(),
                source,
            },
        )?;

        // Ledger write strictly after a successful export: no row may ever
        // describe a file that was not written.
        self.ledger.append(LedgerRow {
            original_filename: original.clone(),
            new_filename: new_filename.clone(),
            side: side.code().to_string(),
            band: band.label().to_string(),
            rotation_x: rotation.x,
            rotation_y: rotation.y,
            rotation_z: rotation.z,
        });
        let persist_warning = self.ledger.persist(&self.ledger_path).err();

        info!("saved '{original}' as '{new_filename}'");
        self.session.scan_counter += 1;
        self.advance();

        Ok(SaveOutcome {
            original_filename: original,
            new_filename,
            persist_warning,
        })
    }

    /// Skip the current file without transforming or recording it.
    ///
    /// The source file is relocated into the skipped subdirectory so a later
    /// directory re-scan will not queue it again. The scan counter still
    /// increments to keep output numbering continuous.
    ///
    /// # Returns
    ///
    /// The file's new location.
    pub fn skip_current(&mut self) -> Result<PathBuf> {
        let path = self
            .queue
            .current()
            .ok_or(WorkflowError::QueueExhausted)?
            .to_path_buf();
        let name = path.file_name().ok_or_else(|| {
            WorkflowError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "queued path has no file name",
            ))
        })?;
        let dest = self.skipped_dir.join(name);

        fs::rename(&path, &dest)?;

        info!("skipped '{}'", name.to_string_lossy());
        self.session.scan_counter += 1;
        self.advance();

        Ok(dest)
    }

    /// Bundle every processed output plus the ledger into a zip archive.
    ///
    /// The ledger is flushed first so the archived copy is current.
    ///
    /// # Returns
    ///
    /// The number of entries written.
    pub fn bundle(&self, archive_path: &Path) -> Result<usize> {
        if !self.ledger.is_empty() {
            self.ledger.persist(&self.ledger_path)?;
        }
        writers::write_bundle(archive_path, &self.processed_dir, &self.ledger_path).map_err(
            |source| WorkflowError::Export {
                name: display_name(archive_path),
                source,
            },
        )
    }

    /// Render the current session state for the presentation layer.
    pub fn view(&self) -> ViewModel {
        render(&self.session, &self.queue, self.ledger.len())
    }

    /// Reset pending edits and move the cursor, as one step.
    fn advance(&mut self) {
        self.session.reset_pending();
        self.queue.advance();
        debug!(
            "advanced to {}/{}",
            self.queue.position(),
            self.queue.total()
        );
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transforms::center_of_mass;
    use nalgebra::Point3;
    use tempfile::TempDir;

    fn offset_triangle() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![
                Point3::new(5.0, 5.0, 5.0),
                Point3::new(6.0, 5.0, 5.0),
                Point3::new(5.0, 6.0, 5.0),
            ],
            faces: vec![[0, 1, 2]],
        }
    }

    fn session_dir(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            writers::write_stl(&dir.path().join(name), &offset_triangle(), true).unwrap();
        }
        dir
    }

    #[test]
    fn test_save_scenario() {
        let dir = session_dir(&["a.stl", "b.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();

        assert_eq!(controller.queue().total(), 2);
        assert_eq!(controller.session().scan_counter, 1);

        controller.set_rotation(Axis::X, 15.0).unwrap();
        controller.select_side(Side::Left);
        controller.select_band(Band::FirstBand);
        let outcome = controller.save_current().unwrap();

        assert_eq!(outcome.original_filename, "a.stl");
        assert_eq!(outcome.new_filename, "1L_1.stl");
        assert!(outcome.persist_warning.is_none());
        assert!(dir.path().join("processed/1L_1.stl").exists());

        assert_eq!(controller.queue().position(), 1);
        assert_eq!(controller.session().scan_counter, 2);
        assert!(controller.session().rotation.is_identity());

        let ledger = controller.ledger();
        assert_eq!(ledger.len(), 1);
        let row = &ledger.rows()[0];
        assert_eq!(row.original_filename, "a.stl");
        assert_eq!(row.new_filename, "1L_1.stl");
        assert_eq!(row.side, "L");
        assert_eq!(row.band, "1st band");
        assert_eq!(row.rotation_x, 15.0);
    }

    #[test]
    fn test_saved_output_is_recentered() {
        let dir = session_dir(&["a.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();
        controller.select_side(Side::Right);
        controller.select_band(Band::TooShort);
        controller.save_current().unwrap();

        let saved = loaders::load_stl(dir.path().join("processed/1R_0.stl")).unwrap();
        let center = center_of_mass(&saved).unwrap();
        // Binary STL stores f32, so tolerance is loose.
        assert!(center.coords.norm() < 1e-5);
    }

    #[test]
    fn test_save_without_labels_mutates_nothing() {
        let dir = session_dir(&["a.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();

        match controller.save_current() {
            Err(WorkflowError::Validation { missing }) => {
                assert_eq!(missing, "side and band");
            }
            other => panic!("expected Validation, got {other:?}"),
        }

        controller.select_side(Side::Left);
        match controller.save_current() {
            Err(WorkflowError::Validation { missing }) => assert_eq!(missing, "band"),
            other => panic!("expected Validation, got {other:?}"),
        }

        assert_eq!(controller.queue().position(), 0);
        assert_eq!(controller.session().scan_counter, 1);
        assert!(controller.ledger().is_empty());
    }

    #[test]
    fn test_skip_relocates_without_ledger_row() {
        let dir = session_dir(&["a.stl", "b.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();

        let dest = controller.skip_current().unwrap();

        assert_eq!(dest, dir.path().join("skipped/a.stl"));
        assert!(dest.exists());
        assert!(!dir.path().join("a.stl").exists());
        assert!(controller.ledger().is_empty());
        assert_eq!(controller.queue().position(), 1);
        // Counter increments on skip to keep numbering continuous.
        assert_eq!(controller.session().scan_counter, 2);
    }

    #[test]
    fn test_export_failure_leaves_ledger_untouched() {
        let dir = session_dir(&["a.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();

        // Occupy the export destination with a directory so write_stl fails
        // after the transform succeeded.
        std::fs::create_dir(dir.path().join("processed/1L_1.stl")).unwrap();

        controller.select_side(Side::Left);
        controller.select_band(Band::FirstBand);
        match controller.save_current() {
            Err(WorkflowError::Export { name, .. }) => assert_eq!(name, "1L_1.stl"),
            other => panic!("expected Export, got {other:?}"),
        }

        // No ledger row may describe a file that was never written, and the
        // session stays on the same file for a retry.
        assert!(controller.ledger().is_empty());
        assert!(!dir.path().join("labels.csv").exists());
        assert_eq!(controller.session().scan_counter, 1);
        assert_eq!(controller.queue().position(), 0);
        assert!(controller.session().labels.is_complete());
    }

    #[test]
    fn test_load_failure_blocks_file() {
        let dir = session_dir(&[]);
        std::fs::write(dir.path().join("bad.stl"), b"not a mesh at all").unwrap();
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();

        controller.select_side(Side::Left);
        controller.select_band(Band::SecondBand);
        assert!(matches!(
            controller.save_current(),
            Err(WorkflowError::Load { .. })
        ));
        // Still on the same file, labels intact for a retry.
        assert_eq!(controller.queue().position(), 0);
        assert!(controller.session().labels.is_complete());
    }

    #[test]
    fn test_preview_leaves_canonical_mesh_untouched() {
        let dir = session_dir(&["a.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();
        controller.set_rotation(Axis::Z, 90.0).unwrap();

        let mesh = controller.load_current().unwrap();
        let before = mesh.vertices.clone();
        let preview = controller.preview(&mesh);

        assert_eq!(mesh.vertices, before);
        assert_ne!(preview.vertices[1], mesh.vertices[1]);
    }

    #[test]
    fn test_rotation_out_of_range_rejected() {
        let dir = session_dir(&["a.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();
        assert!(matches!(
            controller.set_rotation(Axis::X, 200.0),
            Err(WorkflowError::Session(_))
        ));
    }

    #[test]
    fn test_full_session_and_bundle() {
        let dir = session_dir(&["a.stl", "b.stl", "c.stl"]);
        let mut controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();

        controller.select_side(Side::Left);
        controller.select_band(Band::FirstBand);
        controller.save_current().unwrap();

        controller.skip_current().unwrap();

        controller.select_side(Side::Right);
        controller.select_band(Band::SecondBand);
        let outcome = controller.save_current().unwrap();
        // Counter advanced through the skip as well.
        assert_eq!(outcome.new_filename, "3R_2.stl");

        assert!(controller.is_complete());
        assert!(matches!(
            controller.save_current(),
            Err(WorkflowError::QueueExhausted)
        ));

        // Bundle: two saved outputs plus the ledger.
        let archive = dir.path().join("bundle.zip");
        let entries = controller.bundle(&archive).unwrap();
        assert_eq!(entries, 3);
        assert!(archive.exists());
    }

    #[test]
    fn test_counter_seeded_from_existing_outputs() {
        let dir = session_dir(&["a.stl"]);
        std::fs::create_dir_all(dir.path().join("processed")).unwrap();
        std::fs::write(dir.path().join("processed/1L_1.stl"), b"x").unwrap();
        std::fs::write(dir.path().join("processed/2R_0.stl"), b"x").unwrap();

        let controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();
        assert_eq!(controller.session().scan_counter, 3);
    }

    #[test]
    fn test_ledger_reloaded_across_sessions() {
        let dir = session_dir(&["a.stl", "b.stl"]);
        {
            let mut controller =
                WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();
            controller.select_side(Side::Left);
            controller.select_band(Band::TooShort);
            controller.save_current().unwrap();
        }

        let controller =
            WorkflowController::open(dir.path(), LabelerConfig::default()).unwrap();
        assert_eq!(controller.ledger().len(), 1);
        assert_eq!(controller.ledger().rows()[0].new_filename, "1L_0.stl");
        // b.stl is still queued; a.stl stays in place after a save, so a
        // re-scan sees it again. Saved originals are tracked via the ledger.
        assert_eq!(controller.queue().total(), 2);
    }
}
