//! Labeling session processing.
//!
//! - [`session`]: label vocabulary, pending edit state, and the file queue
//! - [`ledger`]: the CSV record of processed scans
//! - [`workflow`]: the save/skip controller tying everything together
//! - [`view`]: pure rendering of session state for the presentation layer

pub mod ledger;
pub mod session;
pub mod view;
pub mod workflow;
