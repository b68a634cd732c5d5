//! Formatted terminal output for each stage.
//!
//! We keep formatting code in one place so:
//! - the grid/fit code stays clean and testable
//! - output changes are localized

use crate::data::FakeStats;
use crate::domain::{CoverageWarning, FitStatus, ModelGrid, Param, SummaryRow};
use crate::fit::RecoveryStats;

/// Grid stage: size, filters and coverage skips.
pub fn format_grid_summary(grid: &ModelGrid, warnings: &[CoverageWarning]) -> String {
    let mut out = String::new();
    out.push_str("=== sedsens - SED sensitivity study ===\n");
    out.push_str(&format!(
        "Grid: {} models | filters: {}\n",
        grid.len(),
        grid.filters.join(", ")
    ));
    for (i, f) in grid.filters.iter().enumerate() {
        let (lo, hi) = grid
            .rows
            .iter()
            .map(|r| r.mags[i])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| (lo.min(m), hi.max(m)));
        if lo.is_finite() {
            out.push_str(&format!("  {f:<8} [{lo:.2}, {hi:.2}] mag\n"));
        }
    }
    if !warnings.is_empty() {
        out.push_str(&format!("Skipped samples: {}\n", warnings.len()));
        for w in warnings.iter().take(5) {
            out.push_str(&format!("  log_age={} z={}: {}\n", w.log_age, w.z, w.reason));
        }
        if warnings.len() > 5 {
            out.push_str(&format!("  ... and {} more\n", warnings.len() - 5));
        }
    }
    out
}

pub fn format_fake_summary(stats: &FakeStats) -> String {
    format!(
        "Fake: {} draws (seed {}) | kept {} | rejected {} by {} <= {} | sigma {}\n",
        stats.draws, stats.seed, stats.kept, stats.rejected, stats.cut_band, stats.cutoff, stats.sigma
    )
}

/// Fit stage: counts, recovery table and the worst-recovered observations.
pub fn format_fit_summary(stats: &RecoveryStats, rows: &[SummaryRow], param: Param, top_n: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Fit: {} fitted | {} failed | best = truth {} | median truth rank {}\n",
        stats.n_fitted,
        stats.n_failed,
        fmt_frac(stats.best_is_truth),
        stats
            .median_truth_rank
            .map(|r| format!("{r:.1}"))
            .unwrap_or_else(|| "-".to_string())
    ));

    out.push('\n');
    out.push_str(&format!(
        "{:<8} {:>5} {:>10} {:>10} {:>8}\n",
        "param", "n", "bias", "rms", "in68"
    ));
    out.push_str(&format!("{:-<8} {:->5} {:->10} {:->10} {:->8}\n", "", "", "", "", ""));
    for p in &stats.params {
        out.push_str(&format!(
            "{:<8} {:>5} {:>10} {:>10} {:>8}\n",
            p.param.label(),
            p.n,
            fmt_num(p.bias),
            fmt_num(p.rms),
            fmt_frac(p.coverage)
        ));
    }

    let worst = super::worst_recovered(rows, param, top_n);
    if !worst.is_empty() {
        out.push('\n');
        out.push_str(&format!("Worst recovered ({}):\n", param.label()));
        out.push_str(&format!(
            "{:<16} {:>8} {:>10} {:>10} {:>10}\n",
            "obs_id", "model", "truth", "p50", "rank"
        ));
        for r in worst {
            if let Some(e) = r.estimate(param) {
                out.push_str(&format!(
                    "{:<16} {:>8} {:>10} {:>10} {:>10}\n",
                    truncate(&r.obs_id, 16),
                    r.model_id,
                    fmt_num(e.truth),
                    fmt_num(e.p50),
                    r.truth_rank.map(|k| k.to_string()).unwrap_or_default()
                ));
            }
        }
    }

    let failed: Vec<&SummaryRow> = rows.iter().filter(|r| r.status != FitStatus::Ok).collect();
    if !failed.is_empty() {
        out.push('\n');
        out.push_str("Failed fits:\n");
        for r in failed.iter().take(top_n) {
            if let FitStatus::Failed(reason) = &r.status {
                out.push_str(&format!("  {}: {reason}\n", r.obs_id));
            }
        }
    }
    out
}

fn fmt_num(v: f64) -> String {
    if v.is_finite() { format!("{v:.4}") } else { "-".to_string() }
}

fn fmt_frac(v: f64) -> String {
    if v.is_finite() { format!("{:.1}%", v * 100.0) } else { "-".to_string() }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamEstimate;
    use crate::fit::recovery_stats;

    fn row(id: &str, truth: f64, p50: f64) -> SummaryRow {
        let e = ParamEstimate {
            truth,
            best: p50,
            expectation: p50,
            p16: p50 - 0.1,
            p50,
            p84: p50 + 0.1,
        };
        SummaryRow {
            obs_id: id.to_string(),
            model_id: 0,
            status: FitStatus::Ok,
            best_model: Some(0),
            max_lnl: Some(0.0),
            truth_rank: Some(0),
            estimates: Param::ALL.iter().map(|&p| (p, e)).collect(),
        }
    }

    #[test]
    fn worst_recovered_orders_by_error() {
        let rows = vec![row("a", 1.0, 1.05), row("b", 1.0, 2.0), row("c", 1.0, 0.5)];
        let worst = crate::report::worst_recovered(&rows, Param::Av, 2);
        let ids: Vec<&str> = worst.iter().map(|r| r.obs_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn fit_summary_lists_params_and_failures() {
        let mut rows = vec![row("fake-1", 1.0, 1.0)];
        rows.push(SummaryRow {
            obs_id: "fake-2".into(),
            model_id: 3,
            status: FitStatus::Failed("no grid model has a finite log-likelihood".into()),
            best_model: None,
            max_lnl: None,
            truth_rank: None,
            estimates: Vec::new(),
        });
        let text = format_fit_summary(&recovery_stats(&rows), &rows, Param::Mass, 3);
        assert!(text.contains("1 fitted | 1 failed"), "{text}");
        assert!(text.contains("fbump"));
        assert!(text.contains("fake-2: no grid model"));
    }

    #[test]
    fn truncate_marks_cut_ids() {
        assert_eq!(truncate("fake-123456789", 8), "fake-12.");
        assert_eq!(truncate("fake-1", 8), "fake-1");
    }
}
