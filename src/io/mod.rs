//! Input/output helpers.
//!
//! - shared CSV plumbing (`table`)
//! - grid, isochrone sample and warning files (`grid`)
//! - fake datasets (`fake`)
//! - likelihoods, summary tables and the run record (`results`)
//! - observation chunks (`chunks`) and the project directory (`project`)

pub mod chunks;
pub mod fake;
pub mod grid;
pub mod project;
pub mod results;
pub mod table;

pub use chunks::*;
pub use fake::*;
pub use grid::*;
pub use project::*;
pub use results::*;
