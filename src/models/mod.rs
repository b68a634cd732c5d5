//! Physical models behind the grid: extinction curves and SED synthesis.

pub mod dust;
pub mod sed;

pub use dust::{BumpMixtureLaw, ExtinctionLaw};
pub use sed::{GridBuild, GridInputs, build_grid};
