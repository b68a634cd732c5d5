//! Fit every fake observation against the grid.
//!
//! Observations are independent, so they are fitted in parallel; the output
//! keeps input order. A single failing observation never aborts the run: it
//! becomes a `FitStatus::Failed` row and the rest continue. A likelihood that
//! does not line up with the grid counts as a failure too.

use rayon::prelude::*;

use crate::domain::{FakeDataset, FitResult, FitStatus, ModelGrid};
use crate::error::AppError;

use super::fitter::Fitter;

/// Fit all observations of `dataset`.
///
/// Fatal only when the dataset and grid disagree on their filters.
pub fn fit_all(
    dataset: &FakeDataset,
    grid: &ModelGrid,
    fitter: &dyn Fitter,
) -> Result<Vec<FitResult>, AppError> {
    let same_filters = dataset.filters.len() == grid.filters.len()
        && dataset
            .filters
            .iter()
            .zip(&grid.filters)
            .all(|(a, b)| a.eq_ignore_ascii_case(b));
    if !same_filters {
        return Err(AppError::config(format!(
            "Observation filters ({}) do not match grid filters ({}).",
            dataset.filters.join(", "),
            grid.filters.join(", ")
        )));
    }

    log::info!(
        "fitting {} observations against {} models with {}",
        dataset.len(),
        grid.len(),
        fitter.name()
    );

    let results: Vec<FitResult> = dataset
        .observations
        .par_iter()
        .map(|obs| {
            let fitted = fitter
                .fit(&obs.mags, grid)
                .and_then(|lk| lk.check(grid).map(|()| lk));
            match fitted {
                Ok(lk) => FitResult {
                    obs_id: obs.id.clone(),
                    model_id: obs.model_id,
                    status: FitStatus::Ok,
                    best_model: Some(grid.rows[lk.best].id),
                    max_lnl: Some(lk.lnl[lk.best]),
                    lnl: lk.lnl,
                },
                Err(e) => {
                    log::warn!("fit failed for {}: {e}", obs.id);
                    FitResult::failed(obs, e.to_string())
                }
            }
        })
        .collect();

    let failed = results.iter().filter(|r| !r.is_ok()).count();
    log::info!(
        "fitted {} observations ({} failed)",
        results.len() - failed,
        failed
    );
    Ok(results)
}

/// Models kept in the sparse likelihood output: `(model_id, lnl)` with
/// `lnl - max >= threshold`, or every finite entry when `threshold` is `None`.
///
/// The best model is always kept. Failed fits keep nothing.
pub fn sparse_likelihood(result: &FitResult, grid: &ModelGrid, threshold: Option<f64>) -> Vec<(usize, f64)> {
    let Some(max) = result.max_lnl else {
        return Vec::new();
    };
    result
        .lnl
        .iter()
        .zip(&grid.rows)
        .filter(|(v, _)| v.is_finite() && threshold.is_none_or(|t| **v - max >= t))
        .map(|(v, row)| (row.id, *v))
        .collect()
}
