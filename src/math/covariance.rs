//! Sample bias / covariance estimation and Gaussian normalisation terms.
//!
//! Used by the artificial-star-test noise model: each group of ASTs gives a
//! matrix of `out - in` differences (one row per band, one column per star).

use nalgebra::{DMatrix, DVector};

/// Moments of a set of per-band differences.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMoments {
    pub bias: DVector<f64>,
    /// Population standard deviation per band.
    pub stddev: DVector<f64>,
    /// Sample covariance (n - 1 normalisation).
    pub cov: DMatrix<f64>,
    pub corr: DMatrix<f64>,
}

/// Compute bias, standard deviation, covariance and correlation from a
/// `bands x samples` difference matrix. Requires at least two samples.
pub fn sample_moments(diffs: &DMatrix<f64>) -> Option<SampleMoments> {
    let (n_bands, n) = diffs.shape();
    if n < 2 || n_bands == 0 {
        return None;
    }
    let nf = n as f64;

    let bias = DVector::from_iterator(n_bands, diffs.row_iter().map(|r| r.sum() / nf));
    let mut centered = diffs.clone();
    for (i, mut row) in centered.row_iter_mut().enumerate() {
        row.add_scalar_mut(-bias[i]);
    }

    let stddev = DVector::from_iterator(
        n_bands,
        centered.row_iter().map(|r| (r.norm_squared() / nf).sqrt()),
    );
    let cov = (&centered * centered.transpose()) / (nf - 1.0);

    let mut corr = cov.clone();
    for k in 0..n_bands {
        for l in 0..n_bands {
            let denom = stddev[k] * stddev[l];
            corr[(k, l)] = if denom > 0.0 { cov[(k, l)] / denom } else { 0.0 };
        }
    }

    Some(SampleMoments {
        bias,
        stddev,
        cov,
        corr,
    })
}

/// Inverse and natural-log determinant of a symmetric positive-definite matrix.
///
/// Returns `None` when the matrix is not positive definite.
pub fn inverse_and_logdet(cov: &DMatrix<f64>) -> Option<(DMatrix<f64>, f64)> {
    let chol = cov.clone().cholesky()?;
    let l = chol.l();
    let logdet = 2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
    if !logdet.is_finite() {
        return None;
    }
    Some((chol.inverse(), logdet))
}

/// Quadratic form `r^T A r`.
pub fn quad_form(a: &DMatrix<f64>, r: &DVector<f64>) -> f64 {
    (r.transpose() * a * r)[(0, 0)]
}
