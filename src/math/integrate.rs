//! Sampled-function helpers: linear interpolation and trapezoidal integration.
//!
//! Spectra and filter curves are both tabulated on ascending wavelength grids,
//! so every integral in the grid builder reduces to these two primitives.

/// `n` evenly spaced points between `lo` and `hi` (inclusive).
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let step = (hi - lo) / (n as f64 - 1.0);
    (0..n).map(|i| lo + step * i as f64).collect()
}

/// Linear interpolation of the table `(xs, ys)` at `x`.
///
/// `xs` must be ascending. Returns `None` outside `[xs[0], xs[last]]`.
pub fn interp_linear(xs: &[f64], ys: &[f64], x: f64) -> Option<f64> {
    if xs.len() != ys.len() || xs.is_empty() || !x.is_finite() {
        return None;
    }
    let last = xs.len() - 1;
    if x < xs[0] || x > xs[last] {
        return None;
    }
    // First index with xs[i] >= x.
    let hi = xs.partition_point(|&v| v < x);
    if hi == 0 {
        return Some(ys[0]);
    }
    let lo = hi - 1;
    let (x0, x1) = (xs[lo], xs[hi]);
    if (x1 - x0).abs() < 1e-300 {
        return Some(ys[lo]);
    }
    let u = (x - x0) / (x1 - x0);
    Some(ys[lo] + u * (ys[hi] - ys[lo]))
}

/// Trapezoidal integral of `ys` over `xs`.
pub fn trapezoid(xs: &[f64], ys: &[f64]) -> f64 {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

/// Trapezoidal integral of `f` sampled on `xs`.
pub fn trapezoid_fn<F>(xs: &[f64], f: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
    trapezoid(xs, &ys)
}
