//! Photometric filter curves and synthetic AB photometry.
//!
//! A filter is a piecewise-linear transmission curve T(λ) that is zero at
//! both ends and outside its table. Band-averaged flux is the photon-weighted
//! mean of F_nu:
//!
//! ```text
//! <F_nu> = ∫ F_nu(λ) T(λ) / λ dλ  /  ∫ T(λ) / λ dλ
//! ```
//!
//! evaluated with the trapezoid rule on a uniform grid across the band.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::error::AppError;
use crate::io::table::{open_csv, parse_f64, read_records};
use crate::math::{interp_linear, linspace, trapezoid};

use super::spectral::{Cgs, Spectrum};

/// Uniform integration steps across a filter band.
pub const BAND_STEPS: usize = 200;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("wavelength and transmission tables must have the same length")]
    LengthMismatch,

    #[error("a transmission curve needs at least three points")]
    TooFewPoints,

    #[error("wavelengths must be strictly ascending")]
    NotAscending,

    #[error("first and last transmission values must be 0")]
    BoundaryNotZero,

    #[error("transmission values must be within [0, 1]")]
    OutOfRange,
}

/// Piecewise-linear filter transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    wavelengths_nm: Vec<f64>,
    transmission: Vec<f64>,
}

impl Filter {
    pub fn from_table(
        name: impl Into<String>,
        wavelengths_nm: Vec<f64>,
        transmission: Vec<f64>,
    ) -> Result<Self, FilterError> {
        if wavelengths_nm.len() != transmission.len() {
            return Err(FilterError::LengthMismatch);
        }
        if wavelengths_nm.len() < 3 {
            return Err(FilterError::TooFewPoints);
        }
        if wavelengths_nm.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(FilterError::NotAscending);
        }
        if transmission.first() != Some(&0.0) || transmission.last() != Some(&0.0) {
            return Err(FilterError::BoundaryNotZero);
        }
        if transmission.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(FilterError::OutOfRange);
        }
        Ok(Self {
            name: name.into(),
            wavelengths_nm,
            transmission,
        })
    }

    /// Flat-topped trapezoid: zero at `lo`/`hi`, `peak` between `top_lo` and `top_hi`.
    pub fn trapezoid(
        name: impl Into<String>,
        lo: f64,
        top_lo: f64,
        top_hi: f64,
        hi: f64,
        peak: f64,
    ) -> Result<Self, FilterError> {
        Self::from_table(
            name,
            vec![lo, top_lo, top_hi, hi],
            vec![0.0, peak, peak, 0.0],
        )
    }

    /// Transmission at a wavelength; zero outside the table.
    pub fn at(&self, wavelength_nm: f64) -> f64 {
        interp_linear(&self.wavelengths_nm, &self.transmission, wavelength_nm).unwrap_or(0.0)
    }

    /// Wavelength span of the table (nm).
    pub fn band(&self) -> (f64, f64) {
        (
            self.wavelengths_nm[0],
            self.wavelengths_nm[self.wavelengths_nm.len() - 1],
        )
    }

    /// Pivot wavelength, sqrt(∫Tλ dλ / ∫T/λ dλ), used to place bands on plots.
    pub fn pivot_nm(&self) -> f64 {
        let s = self.sampling();
        let num = trapezoid(
            &s.wavelengths_nm,
            &s.wavelengths_nm
                .iter()
                .map(|&w| self.at(w) * w)
                .collect::<Vec<_>>(),
        );
        (num / s.norm).sqrt()
    }

    /// Precompute the integration grid and photon weights for this band.
    pub fn sampling(&self) -> BandSampling {
        let (lo, hi) = self.band();
        let wavelengths_nm = linspace(lo, hi, BAND_STEPS + 1);
        let weights: Vec<f64> = wavelengths_nm.iter().map(|&w| self.at(w) / w).collect();
        let norm = trapezoid(&wavelengths_nm, &weights);
        BandSampling {
            wavelengths_nm,
            weights,
            norm,
        }
    }
}

/// Integration grid of one filter with the photon weights T(λ)/λ.
#[derive(Debug, Clone)]
pub struct BandSampling {
    pub wavelengths_nm: Vec<f64>,
    pub weights: Vec<f64>,
    /// ∫ T(λ)/λ dλ
    pub norm: f64,
}

impl BandSampling {
    /// Spectrum linearly interpolated onto the band grid.
    ///
    /// Returns `None` if the band reaches outside the spectrum's wavelengths.
    pub fn resample(&self, spectrum: &Spectrum) -> Option<Vec<f64>> {
        self.wavelengths_nm
            .iter()
            .map(|&w| interp_linear(&spectrum.wavelengths_nm, &spectrum.flux_nu, w))
            .collect()
    }

    /// Photon-weighted mean F_nu of band-sampled fluxes, optionally attenuated
    /// by a per-sample transmission factor.
    pub fn mean_flux_nu(&self, flux_nu: &[f64], attenuation: Option<&[f64]>) -> f64 {
        let integrand: Vec<f64> = match attenuation {
            Some(att) => flux_nu
                .iter()
                .zip(&self.weights)
                .zip(att)
                .map(|((f, w), a)| f * w * a)
                .collect(),
            None => flux_nu.iter().zip(&self.weights).map(|(f, w)| f * w).collect(),
        };
        trapezoid(&self.wavelengths_nm, &integrand) / self.norm
    }
}

/// AB magnitude of a mean flux density, shifted by a distance modulus.
///
/// Non-positive flux gives `+inf`, which callers treat as "not computable".
pub fn ab_magnitude(mean_flux_nu: f64, distance_modulus: f64) -> f64 {
    if mean_flux_nu > 0.0 && mean_flux_nu.is_finite() {
        -2.5 * mean_flux_nu.log10() - Cgs::AB_ZERO_POINT + distance_modulus
    } else {
        f64::INFINITY
    }
}

/// A named collection of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: BTreeMap<String, Filter>,
}

impl FilterSet {
    /// Approximate HST WFC3/ACS wide bands as flat-topped trapezoids.
    pub fn builtin() -> Self {
        const BANDS: [(&str, f64, f64, f64, f64, f64); 6] = [
            ("F275W", 240.0, 255.0, 295.0, 310.0, 0.15),
            ("F336W", 315.0, 325.0, 350.0, 360.0, 0.25),
            ("F475W", 395.0, 410.0, 540.0, 555.0, 0.45),
            ("F814W", 700.0, 720.0, 930.0, 960.0, 0.40),
            ("F110W", 880.0, 920.0, 1380.0, 1420.0, 0.50),
            ("F160W", 1390.0, 1410.0, 1650.0, 1700.0, 0.50),
        ];
        let mut set = Self::default();
        for (name, lo, top_lo, top_hi, hi, peak) in BANDS {
            if let Ok(f) = Filter::trapezoid(name, lo, top_lo, top_hi, hi, peak) {
                set.insert(f);
            }
        }
        set
    }

    /// Load filters from a wide CSV: `wavelength_nm,<name>,<name>,...`.
    ///
    /// Each non-wavelength column is one transmission curve sampled on the
    /// shared wavelength column.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let (mut reader, header) = open_csv(path, "filter file")?;
        let c_wave = header.require(&["wavelength_nm", "wavelength", "lambda"], path)?;
        let columns: Vec<(usize, String)> = header
            .names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != c_wave)
            .map(|(i, n)| (i, n.clone()))
            .collect();
        if columns.is_empty() {
            return Err(AppError::config(format!(
                "Filter file '{}' has no transmission columns.",
                path.display()
            )));
        }

        let mut wavelengths = Vec::new();
        let mut curves: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
        for (line, record) in read_records(&mut reader, path)? {
            wavelengths.push(parse_f64(&record, c_wave, line, path)?);
            for (curve, (col, _)) in curves.iter_mut().zip(&columns) {
                curve.push(parse_f64(&record, *col, line, path)?);
            }
        }

        let mut set = Self::default();
        for ((_, name), transmission) in columns.into_iter().zip(curves) {
            let filter = Filter::from_table(name.clone(), wavelengths.clone(), transmission)
                .map_err(|e| {
                    AppError::config(format!(
                        "Invalid filter '{name}' in '{}': {e}",
                        path.display()
                    ))
                })?;
            set.insert(filter);
        }
        log::info!("loaded {} filters from {}", set.filters.len(), path.display());
        Ok(set)
    }

    pub fn insert(&mut self, filter: Filter) {
        self.filters.insert(filter.name.to_ascii_uppercase(), filter);
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.values().map(|f| f.name.as_str()).collect()
    }

    /// Resolve requested filter names in order; unknown names are fatal.
    pub fn select(&self, names: &[String]) -> Result<Vec<Filter>, AppError> {
        names
            .iter()
            .map(|n| {
                self.get(n).cloned().ok_or_else(|| {
                    AppError::config(format!(
                        "Unknown filter '{n}'. Available: {}.",
                        self.names().join(", ")
                    ))
                })
            })
            .collect()
    }
}
