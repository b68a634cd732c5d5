//! Per-observation likelihood evaluation against the whole model grid.
//!
//! The `Fitter` trait is the seam the driver depends on; tests swap in mock
//! fitters. `ChiSquareFitter` is the reference implementation:
//!
//! - without an AST noise grid, a diagonal Gaussian in magnitude space whose
//!   per-band sigma is derived from the observation itself
//!   (`s_b = sqrt((sigma * m_obs_b)^2 + floor^2)`), so every model shares the
//!   same normalization and the exact model is the strict maximum when the
//!   observation is noiseless
//! - with an AST noise grid, a full-covariance Gaussian per model with that
//!   model's bias, inverse covariance, normalization and completeness

use std::f64::consts::PI;

use nalgebra::DVector;
use thiserror::Error;

use crate::domain::ModelGrid;
use crate::math::{argmax, quad_form};
use crate::noise::NoiseGrid;

/// Log-likelihood of one observation against every grid row (grid order).
#[derive(Debug, Clone, PartialEq)]
pub struct Likelihood {
    pub lnl: Vec<f64>,
    /// Position (not id) of the best row in `grid.rows`.
    pub best: usize,
}

impl Likelihood {
    /// Wrap a likelihood vector, locating its best entry.
    pub fn from_lnl(lnl: Vec<f64>) -> Result<Self, FitError> {
        let best = argmax(&lnl).ok_or(FitError::NoFiniteLikelihood)?;
        Ok(Self { lnl, best })
    }

    /// Check that this likelihood lines up with `grid` and that its best
    /// entry is finite.
    pub fn check(&self, grid: &ModelGrid) -> Result<(), FitError> {
        if self.lnl.len() != grid.len() {
            return Err(FitError::LengthMismatch {
                expected: grid.len(),
                got: self.lnl.len(),
            });
        }
        match self.lnl.get(self.best) {
            Some(v) if v.is_finite() => Ok(()),
            _ => Err(FitError::InvalidBest { best: self.best }),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("observation has {got} bands, grid has {expected}")]
    BandMismatch { expected: usize, got: usize },

    #[error("observation magnitude in band {band} is not finite")]
    NonFiniteObservation { band: usize },

    #[error("zero uncertainty in band {band} (sigma and floor both vanish)")]
    ZeroUncertainty { band: usize },

    #[error("grid is empty")]
    EmptyGrid,

    #[error("no grid model has a finite log-likelihood")]
    NoFiniteLikelihood,

    #[error("likelihood has {got} entries, grid has {expected} models")]
    LengthMismatch { expected: usize, got: usize },

    #[error("best model position {best} has no finite likelihood")]
    InvalidBest { best: usize },

    #[error("noise grid does not match the model grid ({noise} vs {grid} models)")]
    NoiseGridMismatch { noise: usize, grid: usize },
}

/// Fit one observation against a grid.
pub trait Fitter: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, obs_mags: &[f64], grid: &ModelGrid) -> Result<Likelihood, FitError>;
}

/// Gaussian chi-square fitter in magnitude space.
#[derive(Debug, Clone)]
pub struct ChiSquareFitter {
    pub sigma: f64,
    pub sigma_floor: f64,
    noise: Option<NoiseGrid>,
}

impl ChiSquareFitter {
    pub fn new(sigma: f64, sigma_floor: f64) -> Self {
        Self {
            sigma,
            sigma_floor,
            noise: None,
        }
    }

    /// Use per-model AST bias and covariance instead of the proportional sigma.
    pub fn with_noise(mut self, noise: NoiseGrid) -> Self {
        self.noise = Some(noise);
        self
    }

    fn check(&self, obs_mags: &[f64], grid: &ModelGrid) -> Result<(), FitError> {
        if grid.is_empty() {
            return Err(FitError::EmptyGrid);
        }
        if obs_mags.len() != grid.filters.len() {
            return Err(FitError::BandMismatch {
                expected: grid.filters.len(),
                got: obs_mags.len(),
            });
        }
        if let Some(band) = obs_mags.iter().position(|m| !m.is_finite()) {
            return Err(FitError::NonFiniteObservation { band });
        }
        Ok(())
    }

    fn diagonal_lnl(&self, obs_mags: &[f64], grid: &ModelGrid) -> Result<Vec<f64>, FitError> {
        let mut inv_var = Vec::with_capacity(obs_mags.len());
        let mut norm = 0.0;
        for (band, &m) in obs_mags.iter().enumerate() {
            let s2 = (self.sigma * m).powi(2) + self.sigma_floor.powi(2);
            if !(s2 > 0.0) {
                return Err(FitError::ZeroUncertainty { band });
            }
            inv_var.push(1.0 / s2);
            norm -= 0.5 * (2.0 * PI * s2).ln();
        }

        Ok(grid
            .rows
            .iter()
            .map(|row| {
                let chi2: f64 = obs_mags
                    .iter()
                    .zip(&row.mags)
                    .zip(&inv_var)
                    .map(|((o, m), iv)| (o - m).powi(2) * iv)
                    .sum();
                norm - 0.5 * chi2
            })
            .collect())
    }

    fn ast_lnl(&self, noise: &NoiseGrid, obs_mags: &[f64], grid: &ModelGrid) -> Result<Vec<f64>, FitError> {
        if noise.models.len() != grid.len() {
            return Err(FitError::NoiseGridMismatch {
                noise: noise.models.len(),
                grid: grid.len(),
            });
        }
        let n = obs_mags.len() as f64;
        let obs = DVector::from_column_slice(obs_mags);

        Ok(grid
            .rows
            .iter()
            .zip(&noise.models)
            .map(|(row, model_noise)| {
                let Some(mn) = model_noise else {
                    return f64::NEG_INFINITY;
                };
                if !(mn.completeness > 0.0) {
                    return f64::NEG_INFINITY;
                }
                let expected = DVector::from_column_slice(&row.mags) + &mn.bias;
                let r = &obs - expected;
                -0.5 * quad_form(&mn.icov, &r) + mn.q_norm - 0.5 * n * (2.0 * PI).ln()
                    + mn.completeness.ln()
            })
            .collect())
    }
}

impl Fitter for ChiSquareFitter {
    fn name(&self) -> &str {
        if self.noise.is_some() { "chi-square+ast" } else { "chi-square" }
    }

    fn fit(&self, obs_mags: &[f64], grid: &ModelGrid) -> Result<Likelihood, FitError> {
        self.check(obs_mags, grid)?;
        let lnl = match &self.noise {
            Some(noise) => self.ast_lnl(noise, obs_mags, grid)?,
            None => self.diagonal_lnl(obs_mags, grid)?,
        };
        Likelihood::from_lnl(lnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::tests::ramp_grid;
    use crate::noise::ModelNoise;
    use nalgebra::DMatrix;

    #[test]
    fn exact_model_is_the_strict_maximum() {
        let grid = ramp_grid(30);
        let fitter = ChiSquareFitter::new(0.05, 0.0);
        for row in &grid.rows {
            let lk = fitter.fit(&row.mags, &grid).unwrap();
            assert_eq!(lk.best, row.id);
            let runner_up = lk
                .lnl
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != lk.best)
                .map(|(_, v)| *v)
                .fold(f64::NEG_INFINITY, f64::max);
            assert!(lk.lnl[lk.best] > runner_up);
        }
    }

    #[test]
    fn observation_errors_are_typed() {
        let grid = ramp_grid(5);
        let fitter = ChiSquareFitter::new(0.05, 0.0);
        assert_eq!(
            fitter.fit(&[18.0], &grid),
            Err(FitError::BandMismatch { expected: 2, got: 1 })
        );
        assert_eq!(
            fitter.fit(&[18.0, f64::NAN], &grid),
            Err(FitError::NonFiniteObservation { band: 1 })
        );
        assert_eq!(
            ChiSquareFitter::new(0.0, 0.0).fit(&[18.0, 17.0], &grid),
            Err(FitError::ZeroUncertainty { band: 0 })
        );
    }

    #[test]
    fn ast_noise_applies_bias_and_skips_invalid_models() {
        let grid = ramp_grid(3);
        let good = |bias: f64| {
            Some(ModelNoise {
                bias: DVector::from_element(2, bias),
                sigma: DVector::from_element(2, 0.1),
                icov: DMatrix::identity(2, 2) * 100.0,
                q_norm: -0.5 * (0.01f64 * 0.01).ln(),
                completeness: 1.0,
            })
        };
        let noise = NoiseGrid {
            filters: grid.filters.clone(),
            models: vec![None, good(0.0), good(0.1)],
        };
        let fitter = ChiSquareFitter::new(0.05, 0.0).with_noise(noise);

        // Row 2 shifted by its bias is exact; row 0 is never allowed.
        let obs: Vec<f64> = grid.rows[2].mags.iter().map(|m| m + 0.1).collect();
        let lk = fitter.fit(&obs, &grid).unwrap();
        assert_eq!(lk.best, 2);
        assert_eq!(lk.lnl[0], f64::NEG_INFINITY);
    }

    #[test]
    fn all_invalid_models_fail_the_fit() {
        let grid = ramp_grid(2);
        let noise = NoiseGrid {
            filters: grid.filters.clone(),
            models: vec![None, None],
        };
        let fitter = ChiSquareFitter::new(0.05, 0.0).with_noise(noise);
        assert_eq!(
            fitter.fit(&grid.rows[0].mags, &grid),
            Err(FitError::NoFiniteLikelihood)
        );
    }
}
