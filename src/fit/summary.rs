//! Marginal parameter estimates per observation, and recovery statistics
//! across a whole fake dataset.

use serde::Serialize;

use crate::domain::{FitResult, ModelGrid, Param, ParamEstimate, SummaryRow};
use crate::math::{median_mut, normalized_weights, rank_desc, weighted_mean, weighted_percentiles};

const PERCENTILES: [f64; 3] = [0.16, 0.50, 0.84];

/// Summarize one fit: likelihood-weighted estimates for every `Param`.
pub fn summarize(result: &FitResult, grid: &ModelGrid) -> SummaryRow {
    let mut row = SummaryRow {
        obs_id: result.obs_id.clone(),
        model_id: result.model_id,
        status: result.status.clone(),
        best_model: result.best_model,
        max_lnl: result.max_lnl,
        truth_rank: None,
        estimates: Vec::new(),
    };
    if !result.is_ok() {
        return row;
    }
    let Some(weights) = normalized_weights(&result.lnl) else {
        return row;
    };

    let truth = grid.get(result.model_id);
    let best = result.best_model.and_then(|id| grid.get(id));
    row.truth_rank = grid
        .rows
        .iter()
        .position(|r| r.id == result.model_id)
        .and_then(|idx| rank_desc(&result.lnl, idx));

    for param in Param::ALL {
        let values: Vec<f64> = grid.rows.iter().map(|r| param.of(r)).collect();
        let pct = weighted_percentiles(&values, &weights, &PERCENTILES)
            .unwrap_or_else(|| vec![f64::NAN; PERCENTILES.len()]);
        row.estimates.push((
            param,
            ParamEstimate {
                truth: truth.map(|m| param.of(m)).unwrap_or(f64::NAN),
                best: best.map(|m| param.of(m)).unwrap_or(f64::NAN),
                expectation: weighted_mean(&values, &weights).unwrap_or(f64::NAN),
                p16: pct[0],
                p50: pct[1],
                p84: pct[2],
            },
        ));
    }
    row
}

pub fn summarize_all(results: &[FitResult], grid: &ModelGrid) -> Vec<SummaryRow> {
    results.iter().map(|r| summarize(r, grid)).collect()
}

/// How well one parameter is recovered across the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamRecovery {
    pub param: Param,
    pub n: usize,
    /// Mean of `p50 - truth`.
    pub bias: f64,
    /// sqrt(mean((p50 - truth)^2))
    pub rms: f64,
    /// Fraction of truths within [p16, p84].
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryStats {
    pub n_fitted: usize,
    pub n_failed: usize,
    /// Fraction of fitted observations whose best model is the truth model.
    pub best_is_truth: f64,
    pub median_truth_rank: Option<f64>,
    pub params: Vec<ParamRecovery>,
}

pub fn recovery_stats(rows: &[SummaryRow]) -> RecoveryStats {
    let fitted: Vec<&SummaryRow> = rows.iter().filter(|r| !r.estimates.is_empty()).collect();
    let n_fitted = fitted.len();

    let hits = fitted
        .iter()
        .filter(|r| r.best_model == Some(r.model_id))
        .count();
    let mut ranks: Vec<f64> = fitted
        .iter()
        .filter_map(|r| r.truth_rank.map(|k| k as f64))
        .collect();

    let params = Param::ALL
        .iter()
        .map(|&param| {
            let pairs: Vec<&ParamEstimate> = fitted
                .iter()
                .filter_map(|r| r.estimate(param))
                .filter(|e| e.truth.is_finite() && e.p50.is_finite())
                .collect();
            let n = pairs.len();
            let (mut sum, mut sum_sq, mut inside) = (0.0, 0.0, 0usize);
            for e in &pairs {
                let d = e.p50 - e.truth;
                sum += d;
                sum_sq += d * d;
                if e.truth >= e.p16 && e.truth <= e.p84 {
                    inside += 1;
                }
            }
            let nf = n.max(1) as f64;
            ParamRecovery {
                param,
                n,
                bias: if n > 0 { sum / nf } else { f64::NAN },
                rms: if n > 0 { (sum_sq / nf).sqrt() } else { f64::NAN },
                coverage: if n > 0 { inside as f64 / nf } else { f64::NAN },
            }
        })
        .collect();

    RecoveryStats {
        n_fitted,
        n_failed: rows.len() - n_fitted,
        best_is_truth: if n_fitted > 0 { hits as f64 / n_fitted as f64 } else { f64::NAN },
        median_truth_rank: median_mut(&mut ranks),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::tests::ramp_grid;
    use crate::domain::FitStatus;

    fn result_peaked_at(grid: &ModelGrid, truth: usize, best: usize) -> FitResult {
        let lnl: Vec<f64> = grid
            .rows
            .iter()
            .map(|r| -((r.id as f64 - best as f64).powi(2)) * 10.0)
            .collect();
        FitResult {
            obs_id: format!("fake-{truth}"),
            model_id: truth,
            status: FitStatus::Ok,
            best_model: Some(best),
            max_lnl: Some(0.0),
            lnl,
        }
    }

    #[test]
    fn sharply_peaked_fit_recovers_truth() {
        let grid = ramp_grid(20);
        let row = summarize(&result_peaked_at(&grid, 7, 7), &grid);
        assert_eq!(row.truth_rank, Some(0));
        let av = row.estimate(Param::Av).unwrap();
        assert_eq!(av.truth, grid.rows[7].dust.av);
        assert_eq!(av.p50, av.truth);
        assert!((av.expectation - av.truth).abs() < 1e-3);
        assert_eq!(row.estimates.len(), Param::ALL.len());
    }

    #[test]
    fn failed_fit_has_no_estimates() {
        let grid = ramp_grid(5);
        let obs = crate::domain::FakeObservation {
            id: "fake-0".into(),
            model_id: 0,
            mags: vec![1.0, 2.0],
        };
        let row = summarize(&FitResult::failed(&obs, "boom"), &grid);
        assert!(row.estimates.is_empty());
        assert_eq!(row.status, FitStatus::Failed("boom".into()));
    }

    #[test]
    fn recovery_counts_hits_ranks_and_failures() {
        let grid = ramp_grid(20);
        let obs = crate::domain::FakeObservation {
            id: "fake-x".into(),
            model_id: 0,
            mags: vec![1.0, 2.0],
        };
        let rows = vec![
            summarize(&result_peaked_at(&grid, 3, 3), &grid),
            summarize(&result_peaked_at(&grid, 4, 6), &grid),
            summarize(&FitResult::failed(&obs, "boom"), &grid),
        ];
        let stats = recovery_stats(&rows);
        assert_eq!(stats.n_fitted, 2);
        assert_eq!(stats.n_failed, 1);
        assert!((stats.best_is_truth - 0.5).abs() < 1e-12);
        // Truth 4 with peak at 6: rows 5, 6, 7 are ahead of it.
        assert_eq!(stats.median_truth_rank, Some(1.5));
        let mass = stats.params.iter().find(|p| p.param == Param::Mass).unwrap();
        assert_eq!(mass.n, 2);
    }
}
