//! Mathematical utilities: interpolation/integration, weighted statistics and
//! covariance estimation.

pub mod covariance;
pub mod integrate;
pub mod stats;

pub use covariance::*;
pub use integrate::*;
pub use stats::*;
