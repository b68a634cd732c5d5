//! Plots: ASCII for the terminal, SVG for files.

pub mod ascii;
pub mod svg;

pub use ascii::*;
pub use svg::*;
