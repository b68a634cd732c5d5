//! `sed-sensitivity` library crate.
//!
//! The binary (`sedsens`) is a thin wrapper around this library so that:
//!
//! - every stage is testable without spawning processes
//! - the physics (spectra, filters, dust) is reusable outside the CLI
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod noise;
pub mod plot;
pub mod report;
