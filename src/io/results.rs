//! Fit-stage outputs: sparse likelihoods, the summary table, recovery
//! statistics and the run record.
//!
//! Failed fits appear in the summary table with `status=failed`, the error
//! message and empty numeric fields; they contribute no likelihood rows.

use std::fs::File;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::data::FakeStats;
use crate::domain::{FitResult, FitStatus, ModelGrid, Param, ParamEstimate, SummaryRow};
use crate::error::AppError;
use crate::fit::{RecoveryStats, sparse_likelihood};
use crate::io::table::{
    create_csv, finish, fmt_f64, fmt_opt_f64, open_csv, parse_opt_f64, read_records, write_row,
};

const ESTIMATE_FIELDS: [&str; 6] = ["truth", "best", "exp", "p16", "p50", "p84"];

/// Write `obs_id,model_id,lnl` for every kept model of every successful fit.
pub fn write_lnp(
    path: &Path,
    results: &[FitResult],
    grid: &ModelGrid,
    threshold: Option<f64>,
) -> Result<usize, AppError> {
    let what = "likelihood table";
    let mut w = create_csv(path, what)?;
    write_row(&mut w, ["obs_id", "model_id", "lnl"], what)?;
    let mut n = 0;
    for r in results {
        for (model_id, lnl) in sparse_likelihood(r, grid, threshold) {
            write_row(&mut w, [r.obs_id.clone(), model_id.to_string(), fmt_f64(lnl)], what)?;
            n += 1;
        }
    }
    finish(w, what)?;
    log::info!("wrote {n} likelihood rows to {}", path.display());
    Ok(n)
}

fn stats_header() -> Vec<String> {
    let mut h: Vec<String> = [
        "obs_id",
        "model_id",
        "status",
        "error",
        "best_model",
        "max_lnl",
        "truth_rank",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for p in Param::ALL {
        for f in ESTIMATE_FIELDS {
            h.push(format!("{}_{f}", p.label()));
        }
    }
    h
}

pub fn write_stats(path: &Path, rows: &[SummaryRow]) -> Result<(), AppError> {
    let what = "summary table";
    let mut w = create_csv(path, what)?;
    write_row(&mut w, stats_header(), what)?;
    for row in rows {
        let (status, error) = match &row.status {
            FitStatus::Ok => ("ok", String::new()),
            FitStatus::Failed(reason) => ("failed", reason.clone()),
        };
        let mut cells = vec![
            row.obs_id.clone(),
            row.model_id.to_string(),
            status.to_string(),
            error,
            row.best_model.map(|b| b.to_string()).unwrap_or_default(),
            fmt_opt_f64(row.max_lnl),
            row.truth_rank.map(|k| k.to_string()).unwrap_or_default(),
        ];
        for p in Param::ALL {
            match row.estimate(p) {
                Some(e) => cells.extend(
                    [e.truth, e.best, e.expectation, e.p16, e.p50, e.p84].map(fmt_f64),
                ),
                None => cells.extend(std::iter::repeat_n(String::new(), ESTIMATE_FIELDS.len())),
            }
        }
        write_row(&mut w, cells, what)?;
    }
    finish(w, what)
}

/// Reload a summary table written by `write_stats` (for re-plotting).
pub fn read_stats(path: &Path) -> Result<Vec<SummaryRow>, AppError> {
    let (mut reader, header) = open_csv(path, "summary table")?;
    let c_obs = header.require(&["obs_id"], path)?;
    let c_model = header.require(&["model_id"], path)?;
    let c_status = header.require(&["status"], path)?;
    let c_error = header.require(&["error"], path)?;
    let c_best = header.require(&["best_model"], path)?;
    let c_max = header.require(&["max_lnl"], path)?;
    let c_rank = header.require(&["truth_rank"], path)?;
    let mut param_cols = Vec::new();
    for p in Param::ALL {
        let mut cols = [0usize; ESTIMATE_FIELDS.len()];
        for (slot, f) in cols.iter_mut().zip(ESTIMATE_FIELDS) {
            let name = format!("{}_{f}", p.label());
            *slot = header.require(&[name.as_str()], path)?;
        }
        param_cols.push((p, cols));
    }

    let opt_usize = |raw: Option<&str>, line: usize| -> Result<Option<usize>, AppError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(|_| {
                AppError::config(format!(
                    "Invalid integer '{s}' at line {line} of '{}'.",
                    path.display()
                ))
            }),
        }
    };

    let mut rows = Vec::new();
    for (line, rec) in read_records(&mut reader, path)? {
        let status = match rec.get(c_status).unwrap_or("") {
            "ok" => FitStatus::Ok,
            _ => FitStatus::Failed(rec.get(c_error).unwrap_or("").to_string()),
        };
        let mut estimates = Vec::new();
        if status == FitStatus::Ok {
            for (p, cols) in &param_cols {
                let v = |i: usize| -> Result<f64, AppError> {
                    Ok(parse_opt_f64(&rec, cols[i], line, path)?.unwrap_or(f64::NAN))
                };
                estimates.push((
                    *p,
                    ParamEstimate {
                        truth: v(0)?,
                        best: v(1)?,
                        expectation: v(2)?,
                        p16: v(3)?,
                        p50: v(4)?,
                        p84: v(5)?,
                    },
                ));
            }
        }
        rows.push(SummaryRow {
            obs_id: rec.get(c_obs).unwrap_or("").to_string(),
            model_id: opt_usize(rec.get(c_model), line)?.unwrap_or_default(),
            status,
            best_model: opt_usize(rec.get(c_best), line)?,
            max_lnl: parse_opt_f64(&rec, c_max, line, path)?,
            truth_rank: opt_usize(rec.get(c_rank), line)?,
            estimates,
        });
    }
    Ok(rows)
}

pub fn write_recovery(path: &Path, stats: &RecoveryStats) -> Result<(), AppError> {
    let what = "recovery table";
    let mut w = create_csv(path, what)?;
    write_row(&mut w, ["param", "n", "bias", "rms", "coverage_68"], what)?;
    for p in &stats.params {
        write_row(
            &mut w,
            [
                p.param.label().to_string(),
                p.n.to_string(),
                fmt_f64(p.bias),
                fmt_f64(p.rms),
                fmt_f64(p.coverage),
            ],
            what,
        )?;
    }
    finish(w, what)
}

/// Counts recorded in the run file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunCounts {
    pub isochrone_points: Option<usize>,
    pub coverage_warnings: Option<usize>,
    pub grid_models: Option<usize>,
    pub fake: Option<FakeStats>,
    pub fitted: Option<usize>,
    pub failed: Option<usize>,
    pub likelihood_rows: Option<usize>,
}

#[derive(Serialize)]
struct RunRecord<'a, C: Serialize + ?Sized> {
    tool: &'static str,
    version: &'static str,
    stage: &'a str,
    created_at: String,
    config: &'a C,
    counts: &'a RunCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    recovery: Option<&'a RecoveryStats>,
}

/// Write the resolved configuration, counts and a UTC timestamp as JSON.
///
/// `config` is whatever the stage resolved: the full `StudyConfig` for `run`,
/// or just the stage's own section.
pub fn write_run_json<C: Serialize + ?Sized>(
    path: &Path,
    stage: &str,
    config: &C,
    counts: &RunCounts,
    recovery: Option<&RecoveryStats>,
) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::config(format!("Failed to create run file '{}': {e}", path.display()))
    })?;
    let record = RunRecord {
        tool: "sedsens",
        version: env!("CARGO_PKG_VERSION"),
        stage,
        created_at: Utc::now().to_rfc3339(),
        config,
        counts,
        recovery,
    };
    serde_json::to_writer_pretty(file, &record)
        .map_err(|e| AppError::config(format!("Failed to write run file: {e}")))?;
    log::debug!("wrote run record to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::tests::ramp_grid;
    use crate::domain::FakeObservation;
    use crate::fit::{ChiSquareFitter, fit_all, summarize_all};
    use crate::domain::FakeDataset;

    fn fitted() -> (ModelGrid, Vec<FitResult>) {
        let grid = ramp_grid(20);
        let mut observations: Vec<FakeObservation> = [2usize, 9]
            .iter()
            .map(|&i| FakeObservation {
                id: format!("fake-{i}"),
                model_id: i,
                mags: grid.rows[i].mags.clone(),
            })
            .collect();
        observations.push(FakeObservation {
            id: "fake-bad".into(),
            model_id: 0,
            mags: vec![f64::NAN, 1.0],
        });
        let data = FakeDataset {
            filters: grid.filters.clone(),
            observations,
        };
        let results = fit_all(&data, &grid, &ChiSquareFitter::new(0.005, 0.0)).unwrap();
        (grid, results)
    }

    #[test]
    fn failed_rows_have_status_and_empty_numbers() {
        let (grid, results) = fitted();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s_stats.csv");
        write_stats(&path, &summarize_all(&results, &grid)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let bad = text.lines().find(|l| l.starts_with("fake-bad")).unwrap();
        assert!(bad.contains(",failed,"), "{bad}");
        assert!(bad.ends_with(",,,,,,"), "{bad}");

        let back = read_stats(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].best_model, Some(2));
        assert_eq!(back[0].estimate(Param::Av).unwrap().truth, grid.rows[2].dust.av);
        assert!(matches!(back[2].status, FitStatus::Failed(_)));
    }

    #[test]
    fn lnp_skips_failed_fits() {
        let (grid, results) = fitted();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s_lnp.csv");
        let n = write_lnp(&path, &results, &grid, Some(-10.0)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), n + 1);
        assert!(!text.contains("fake-bad"));
        assert!(text.contains("fake-9,9,"));
    }
}
