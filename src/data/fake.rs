//! Fake observation generator.
//!
//! Draws grid rows uniformly with replacement, perturbs every band with
//! proportional Gaussian noise and keeps a draw only when its observed
//! magnitude in the cut band is at or brighter than the cutoff.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::domain::{FakeConfig, FakeDataset, FakeObservation, ModelGrid};
use crate::error::AppError;

/// Bookkeeping for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FakeStats {
    pub seed: u64,
    pub draws: usize,
    pub kept: usize,
    pub rejected: usize,
    pub sigma: f64,
    pub cutoff: f64,
    pub cut_band: String,
}

#[derive(Debug, Clone)]
pub struct FakeOutput {
    pub dataset: FakeDataset,
    pub stats: FakeStats,
}

/// Generate a fake dataset from `grid`.
///
/// Every draw consumes the same amount of randomness (one row index plus one
/// normal deviate per band) whether or not it survives the cut, so the
/// sequence of drawn rows depends on the seed alone.
pub fn generate_fake(grid: &ModelGrid, config: &FakeConfig) -> Result<FakeOutput, AppError> {
    config.validate()?;
    if grid.is_empty() {
        return Err(AppError::empty("Cannot draw fake observations from an empty grid."));
    }
    let cut = grid.filter_index(&config.cut_band).ok_or_else(|| {
        AppError::config(format!(
            "Cutoff band '{}' is not one of the grid filters ({}).",
            config.cut_band,
            grid.filters.join(", ")
        ))
    })?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut observations = Vec::new();
    let mut rejected = 0usize;

    for draw in 0..config.draws {
        let row = &grid.rows[rng.gen_range(0..grid.len())];
        let mags: Vec<f64> = row
            .mags
            .iter()
            .map(|&m| {
                let n: f64 = rng.sample(StandardNormal);
                m * (1.0 + config.sigma * n)
            })
            .collect();

        if mags[cut] <= config.cutoff {
            observations.push(FakeObservation {
                id: format!("fake-{draw}"),
                model_id: row.id,
                mags,
            });
        } else {
            rejected += 1;
        }
    }

    log::info!(
        "drew {} fake observations ({} kept, {} rejected by {} <= {})",
        config.draws,
        observations.len(),
        rejected,
        config.cut_band,
        config.cutoff
    );
    if observations.is_empty() {
        log::warn!("every fake observation was rejected by the cutoff");
    }

    Ok(FakeOutput {
        stats: FakeStats {
            seed: config.seed,
            draws: config.draws,
            kept: observations.len(),
            rejected,
            sigma: config.sigma,
            cutoff: config.cutoff,
            cut_band: grid.filters[cut].clone(),
        },
        dataset: FakeDataset {
            filters: grid.filters.clone(),
            observations,
        },
    })
}
