//! Observation noise models beyond the proportional-sigma default.

pub mod ast;

pub use ast::{AstNoiseModel, ModelNoise, NoiseGrid};
