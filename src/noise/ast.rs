//! Artificial-star-test (AST) noise model.
//!
//! ASTs are fake stars injected into real images and re-measured. Each AST
//! row has an input and an output magnitude per band (`<band>_IN`,
//! `<band>_OUT`); an output of 90 or fainter means the star was not
//! recovered. ASTs sharing an input magnitude in the last band are one
//! "group" (the same injected SED). For each usable group we keep the bias,
//! covariance and correlation of `out - in` plus the recovered fraction,
//! then carry those onto every grid model by inverse-distance weighting of
//! the nearest groups in input-magnitude space.

use std::path::Path;

use nalgebra::{DMatrix, DVector};

use crate::domain::ModelGrid;
use crate::error::AppError;
use crate::io::table::{open_csv, parse_f64, read_records};
use crate::math::{SampleMoments, inverse_and_logdet, sample_moments};

/// Output magnitudes at or above this mark a non-recovery.
pub const NOT_RECOVERED_MAG: f64 = 90.0;
/// A group needs strictly more recovered ASTs than this.
const MIN_RECOVERED: usize = 5;
/// Groups combined per grid model.
const NEAREST: usize = 10;
/// Input magnitudes closer than this belong to the same group.
const GROUP_TOL: f64 = 1e-6;

/// Statistics of one group of ASTs sharing an input SED.
#[derive(Debug, Clone)]
pub struct AstGroup {
    /// Mean input magnitude per band.
    pub input_mags: Vec<f64>,
    pub moments: SampleMoments,
    /// Fraction of the group recovered in every band.
    pub completeness: f64,
    pub n_asts: usize,
}

/// Noise terms for one grid model.
#[derive(Debug, Clone)]
pub struct ModelNoise {
    pub bias: DVector<f64>,
    pub sigma: DVector<f64>,
    pub icov: DMatrix<f64>,
    /// `-0.5 ln det C`
    pub q_norm: f64,
    pub completeness: f64,
}

/// Per-model noise aligned with `ModelGrid::rows`; `None` marks a model whose
/// interpolated covariance could not be inverted.
#[derive(Debug, Clone)]
pub struct NoiseGrid {
    pub filters: Vec<String>,
    pub models: Vec<Option<ModelNoise>>,
}

impl NoiseGrid {
    pub fn invalid_count(&self) -> usize {
        self.models.iter().filter(|m| m.is_none()).count()
    }
}

#[derive(Debug, Clone)]
pub struct AstNoiseModel {
    filters: Vec<String>,
    groups: Vec<AstGroup>,
}

impl AstNoiseModel {
    pub fn from_groups(filters: Vec<String>, groups: Vec<AstGroup>) -> Self {
        Self { filters, groups }
    }

    /// Load an AST table for the given filters and compute group statistics.
    pub fn load(path: &Path, filters: &[String]) -> Result<Self, AppError> {
        if filters.is_empty() {
            return Err(AppError::config("The AST noise model needs at least one filter."));
        }
        let (mut reader, header) = open_csv(path, "AST table")?;
        let mut cols = Vec::with_capacity(filters.len());
        for f in filters {
            let (name_in, name_out) = (format!("{f}_in"), format!("{f}_out"));
            let c_in = header.require(&[name_in.as_str()], path)?;
            let c_out = header.require(&[name_out.as_str()], path)?;
            cols.push((c_in, c_out));
        }

        let mut asts: Vec<(Vec<f64>, Vec<f64>)> = Vec::new();
        for (line, record) in read_records(&mut reader, path)? {
            let mut mag_in = Vec::with_capacity(cols.len());
            let mut mag_out = Vec::with_capacity(cols.len());
            for &(c_in, c_out) in &cols {
                mag_in.push(parse_f64(&record, c_in, line, path)?);
                mag_out.push(parse_f64(&record, c_out, line, path)?);
            }
            asts.push((mag_in, mag_out));
        }

        let model = Self::from_asts(filters.to_vec(), asts);
        if model.groups.is_empty() {
            return Err(AppError::config(format!(
                "AST table '{}' has no group with more than {MIN_RECOVERED} recovered stars.",
                path.display()
            )));
        }
        log::info!(
            "AST noise model: {} usable groups from {}",
            model.groups.len(),
            path.display()
        );
        Ok(model)
    }

    /// Group `(input, output)` magnitude pairs and compute their statistics.
    pub fn from_asts(filters: Vec<String>, mut asts: Vec<(Vec<f64>, Vec<f64>)>) -> Self {
        let key = filters.len() - 1;
        asts.sort_by(|a, b| a.0[key].total_cmp(&b.0[key]));

        let mut groups = Vec::new();
        let mut start = 0;
        while start < asts.len() {
            let anchor = asts[start].0[key];
            let end = start
                + asts[start..]
                    .iter()
                    .take_while(|a| (a.0[key] - anchor).abs() <= GROUP_TOL)
                    .count();
            match group_stats(&asts[start..end]) {
                Some(g) => groups.push(g),
                None => log::debug!("AST group at input {anchor} has too few recoveries"),
            }
            start = end;
        }
        Self { filters, groups }
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn groups(&self) -> &[AstGroup] {
        &self.groups
    }

    /// Interpolate group statistics onto every grid model.
    pub fn interpolate(&self, grid: &ModelGrid) -> Result<NoiseGrid, AppError> {
        if grid.filters.len() != self.filters.len() {
            return Err(AppError::config(format!(
                "AST table has {} filters but the grid has {}.",
                self.filters.len(),
                grid.filters.len()
            )));
        }
        if self.groups.is_empty() {
            return Err(AppError::config("AST noise model has no usable groups."));
        }

        let models: Vec<Option<ModelNoise>> =
            grid.rows.iter().map(|row| self.noise_at(&row.mags)).collect();
        let noise = NoiseGrid {
            filters: grid.filters.clone(),
            models,
        };
        let invalid = noise.invalid_count();
        if invalid > 0 {
            log::warn!("{invalid} grid models have a singular AST covariance and will never fit");
        }
        Ok(noise)
    }

    fn noise_at(&self, mags: &[f64]) -> Option<ModelNoise> {
        let mut nearest: Vec<(usize, f64)> = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (i, euclidean(&g.input_mags, mags)))
            .collect();
        nearest.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        nearest.truncate(NEAREST);

        let weights: Vec<(usize, f64)> = match nearest.first() {
            Some(&(i, d)) if d == 0.0 => vec![(i, 1.0)],
            _ => {
                let total: f64 = nearest.iter().map(|(_, d)| 1.0 / d).sum();
                nearest.iter().map(|&(i, d)| (i, (1.0 / d) / total)).collect()
            }
        };

        let n = self.filters.len();
        let mut cov: DMatrix<f64> = DMatrix::zeros(n, n);
        let mut bias: DVector<f64> = DVector::zeros(n);
        let mut completeness = 0.0;
        for &(i, w) in &weights {
            let g = &self.groups[i];
            cov += &g.moments.cov * w;
            bias += &g.moments.bias * w;
            completeness += g.completeness * w;
        }

        let (icov, logdet) = inverse_and_logdet(&cov)?;
        Some(ModelNoise {
            sigma: cov.diagonal().map(f64::sqrt),
            bias,
            icov,
            q_norm: -0.5 * logdet,
            completeness,
        })
    }
}

fn group_stats(asts: &[(Vec<f64>, Vec<f64>)]) -> Option<AstGroup> {
    let n_bands = asts.first()?.0.len();
    let recovered: Vec<&(Vec<f64>, Vec<f64>)> = asts
        .iter()
        .filter(|(_, out)| out.iter().all(|&m| m < NOT_RECOVERED_MAG))
        .collect();
    if recovered.len() <= MIN_RECOVERED {
        return None;
    }

    let diffs = DMatrix::from_fn(n_bands, recovered.len(), |b, k| {
        recovered[k].1[b] - recovered[k].0[b]
    });
    let moments = sample_moments(&diffs)?;
    let input_mags = (0..n_bands)
        .map(|b| asts.iter().map(|a| a.0[b]).sum::<f64>() / asts.len() as f64)
        .collect();

    Some(AstGroup {
        input_mags,
        moments,
        completeness: recovered.len() as f64 / asts.len() as f64,
        n_asts: asts.len(),
    })
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}
