//! Core mesh functionality: loading, geometric transforms, and export.

pub mod loaders;
pub mod transforms;
pub mod writers;
