//! Likelihood fitting of fake observations against the model grid.
//!
//! Responsibilities:
//!
//! - evaluate one observation against every grid model (`Fitter`)
//! - fit a whole dataset in parallel with per-row failure isolation
//! - reduce likelihood vectors to parameter estimates and recovery statistics

pub mod driver;
pub mod fitter;
pub mod summary;

pub use driver::*;
pub use fitter::*;
pub use summary::*;
