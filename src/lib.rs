//! G-code package consolidation for 3D-print production.
//!
//! printforge tracks print orders through their lifecycle, discovers
//! opportunities to merge queued jobs that share a printer, a job, or a
//! material, and rebuilds the vendor package archive with the machine-code
//! stream replaced by the replicated, concatenated content. Every merged
//! package is validated against the container contract before it is
//! offered for download.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod package;
pub mod printer;
pub mod queue;
pub mod service;
pub mod store;
pub mod web;

pub use error::{Error, Result};
