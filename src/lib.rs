//! Labeling and reorientation pipeline for STL impression scans.
//!
//! This crate provides tools for:
//! - Loading and exporting STL meshes (ASCII and binary)
//! - Composing axis rotations and recentering meshes on their center of mass
//! - Walking an input directory one scan at a time, assigning side/band
//!   labels and writing relabeled outputs
//! - Maintaining a CSV ledger of every processed scan
//! - Bundling processed outputs plus the ledger into a zip archive
//!
//! # Example
//!
//! ```no_run
//! use impression_pipeline::config::LabelerConfig;
//! use impression_pipeline::processors::session::{Band, Side};
//! use impression_pipeline::processors::workflow::WorkflowController;
//!
//! let mut controller =
//!     WorkflowController::open("scans/", LabelerConfig::default()).unwrap();
//! controller.select_side(Side::Left);
//! controller.select_band(Band::FirstBand);
//! let outcome = controller.save_current().unwrap();
//! println!("saved as {}", outcome.new_filename);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::LabelerConfig;
pub use core::loaders::TriangleMesh;
pub use processors::ledger::{LabelLedger, LedgerRow};
pub use processors::session::{Band, Side};
pub use processors::workflow::{WorkflowController, WorkflowError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
