//! Small statistics helpers for likelihood summaries.
//!
//! All helpers ignore non-finite values or weights; they never panic on empty
//! input and return `None` instead.

use std::cmp::Ordering;

/// Convert log-likelihoods to normalized weights (`exp(lnl - max)` / sum).
pub fn normalized_weights(lnl: &[f64]) -> Option<Vec<f64>> {
    let max = lnl
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let raw: Vec<f64> = lnl
        .iter()
        .map(|&v| if v.is_finite() { (v - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = raw.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }
    Some(raw.into_iter().map(|w| w / total).collect())
}

/// Weighted mean of `values`.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    let mut sw = 0.0;
    let mut swx = 0.0;
    for (&x, &w) in values.iter().zip(weights) {
        if x.is_finite() && w.is_finite() && w > 0.0 {
            sw += w;
            swx += w * x;
        }
    }
    if sw > 0.0 { Some(swx / sw) } else { None }
}

/// Weighted percentiles (`qs` in [0, 1]) using the step CDF.
///
/// Returns the smallest value whose cumulative weight reaches `q`.
pub fn weighted_percentiles(values: &[f64], weights: &[f64], qs: &[f64]) -> Option<Vec<f64>> {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(weights)
        .filter(|(x, w)| x.is_finite() && w.is_finite() && **w > 0.0)
        .map(|(&x, &w)| (x, w))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    let total: f64 = pairs.iter().map(|p| p.1).sum();

    let mut out = Vec::with_capacity(qs.len());
    for &q in qs {
        let target = q.clamp(0.0, 1.0) * total;
        let mut cum = 0.0;
        let mut value = pairs[pairs.len() - 1].0;
        for &(x, w) in &pairs {
            cum += w;
            // Relative tolerance so q=1.0 does not miss the last value to rounding.
            if cum >= target * (1.0 - 1e-12) {
                value = x;
                break;
            }
        }
        out.push(value);
    }
    Some(out)
}

/// Median of a mutable slice (sorted in place).
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Index of the largest finite value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some(b) if values[b] >= v => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Rank (0 = best) of `values[idx]` among the finite values, counting strictly larger ones.
pub fn rank_desc(values: &[f64], idx: usize) -> Option<usize> {
    let v = *values.get(idx)?;
    if !v.is_finite() {
        return None;
    }
    Some(values.iter().filter(|&&x| x.is_finite() && x > v).count())
}
