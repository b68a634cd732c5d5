//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - isochrone points, dust parameters and model SEDs (`ModelGrid`)
//! - fake observations (`FakeDataset`)
//! - fit outputs (`FitResult`, `SummaryRow`)
//! - resolved run configuration (`StudyConfig`)

pub mod types;

pub use types::*;
