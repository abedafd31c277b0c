//! Persisted summary index for MBOX folders.

pub mod builder;
pub mod format;
