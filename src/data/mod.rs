//! Reference data and synthetic data sources.
//!
//! - `isochrone`: stellar-evolution table and table-native sampling
//! - `spectral`: spectral libraries (blackbody or tabulated)
//! - `filters`: transmission curves and AB photometry
//! - `fake`: seeded fake observations drawn from a model grid

pub mod fake;
pub mod filters;
pub mod isochrone;
pub mod spectral;

pub use fake::{FakeOutput, FakeStats, generate_fake};
pub use filters::{BandSampling, Filter, FilterSet};
pub use isochrone::{IsochroneSampling, IsochroneTable, SampleSpec};
pub use spectral::{BlackbodyLibrary, CoverageError, SpectralLibrary, Spectrum, TabulatedLibrary};
