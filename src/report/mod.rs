//! Reporting utilities: worst-recovered rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{Param, SummaryRow};

/// Observations whose recovered median is furthest from the truth for `param`.
pub fn worst_recovered(rows: &[SummaryRow], param: Param, top_n: usize) -> Vec<&SummaryRow> {
    let mut scored: Vec<(f64, &SummaryRow)> = rows
        .iter()
        .filter_map(|r| {
            let e = r.estimate(param)?;
            let err = (e.p50 - e.truth).abs();
            err.is_finite().then_some((err, r))
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.obs_id.cmp(&b.1.obs_id)));
    scored.into_iter().take(top_n).map(|(_, r)| r).collect()
}
