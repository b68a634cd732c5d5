//! Spectral libraries: map stellar parameters to a surface spectrum.
//!
//! A library answers one question: "what does the surface of a star with
//! (Teff, log g, Z) emit?" The grid builder scales that surface flux to 10 pc
//! with the stellar radius and takes it from there. Points outside a
//! library's coverage are reported with a `CoverageError` so the caller can
//! skip them.
//!
//! All fluxes are spectral flux densities per unit frequency in CGS
//! (erg s⁻¹ cm⁻² Hz⁻¹), wavelengths in nanometers.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::error::AppError;
use crate::io::table::{open_csv, parse_f64, read_records};
use crate::math::linspace;

/// Physical constants in CGS units.
pub struct Cgs;

impl Cgs {
    /// Planck's constant (erg s).
    pub const PLANCK: f64 = 6.626_070_15e-27;
    /// Speed of light (cm/s).
    pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e10;
    /// Boltzmann constant (erg/K).
    pub const BOLTZMANN: f64 = 1.380_649e-16;
    /// Stefan-Boltzmann constant (erg s⁻¹ cm⁻² K⁻⁴).
    pub const STEFAN_BOLTZMANN: f64 = 5.670_374_419e-5;
    /// Nominal solar luminosity (erg/s).
    pub const L_SUN: f64 = 3.828e33;
    /// Parsec (cm).
    pub const PARSEC: f64 = 3.085_677_581e18;
    /// AB magnitude zero point: m_AB = -2.5 log10(F_nu) - 48.60.
    pub const AB_ZERO_POINT: f64 = 48.60;
}

/// Why a library cannot produce a spectrum.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoverageError {
    #[error("Teff {teff:.0} K outside library coverage [{min:.0}, {max:.0}] K")]
    Temperature { teff: f64, min: f64, max: f64 },

    #[error("log g {log_g:.2} outside library coverage [{min:.2}, {max:.2}]")]
    Gravity { log_g: f64, min: f64, max: f64 },

    #[error("metallicity {z} outside library coverage")]
    Metallicity { z: f64 },

    #[error("no library node within tolerance of log Teff {log_teff:.3}, log g {log_g:.2}")]
    NoNearbyNode { log_teff: f64, log_g: f64 },
}

/// A sampled spectrum on an ascending wavelength grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wavelengths_nm: Arc<Vec<f64>>,
    pub flux_nu: Vec<f64>,
}

impl Spectrum {
    /// Multiply every flux sample by `factor`.
    pub fn scaled(&self, factor: f64) -> Spectrum {
        Spectrum {
            wavelengths_nm: Arc::clone(&self.wavelengths_nm),
            flux_nu: self.flux_nu.iter().map(|f| f * factor).collect(),
        }
    }
}

/// Narrow interface to an external spectral library.
pub trait SpectralLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Surface flux density for the given stellar parameters.
    fn spectrum(&self, log_teff: f64, log_g: f64, z: f64) -> Result<Spectrum, CoverageError>;
}

/// Planck surface spectra, `F_nu = pi * B_nu(T)`, inside a coverage box.
#[derive(Debug, Clone)]
pub struct BlackbodyLibrary {
    pub teff_min: f64,
    pub teff_max: f64,
    pub log_g_min: f64,
    pub log_g_max: f64,
    pub z_max: f64,
    wavelengths_nm: Arc<Vec<f64>>,
}

impl Default for BlackbodyLibrary {
    fn default() -> Self {
        Self::new(2500.0, 50_000.0, -1.0, 6.0, 0.1)
    }
}

impl BlackbodyLibrary {
    /// Wavelength sampling: 100 nm to 2500 nm in 2 nm steps.
    const LAMBDA_MIN_NM: f64 = 100.0;
    const LAMBDA_MAX_NM: f64 = 2500.0;
    const LAMBDA_STEPS: usize = 1201;

    pub fn new(teff_min: f64, teff_max: f64, log_g_min: f64, log_g_max: f64, z_max: f64) -> Self {
        Self {
            teff_min,
            teff_max,
            log_g_min,
            log_g_max,
            z_max,
            wavelengths_nm: Arc::new(linspace(
                Self::LAMBDA_MIN_NM,
                Self::LAMBDA_MAX_NM,
                Self::LAMBDA_STEPS,
            )),
        }
    }
}

/// Planck spectral radiance per unit frequency, B_nu(T) (erg s⁻¹ cm⁻² Hz⁻¹ sr⁻¹).
pub fn planck_nu(wavelength_nm: f64, teff: f64) -> f64 {
    if wavelength_nm <= 0.0 || teff <= 0.0 {
        return 0.0;
    }
    let nu = Cgs::SPEED_OF_LIGHT / (wavelength_nm * 1e-7);
    let x = Cgs::PLANCK * nu / (Cgs::BOLTZMANN * teff);
    let numer = 2.0 * Cgs::PLANCK * nu.powi(3) / (Cgs::SPEED_OF_LIGHT * Cgs::SPEED_OF_LIGHT);
    // exp_m1 keeps precision in the Rayleigh-Jeans limit; huge x underflows to 0.
    numer / x.exp_m1()
}

impl SpectralLibrary for BlackbodyLibrary {
    fn name(&self) -> &str {
        "blackbody"
    }

    fn spectrum(&self, log_teff: f64, log_g: f64, z: f64) -> Result<Spectrum, CoverageError> {
        let teff = 10f64.powf(log_teff);
        if !(teff.is_finite() && teff >= self.teff_min && teff <= self.teff_max) {
            return Err(CoverageError::Temperature {
                teff,
                min: self.teff_min,
                max: self.teff_max,
            });
        }
        if !(log_g.is_finite() && log_g >= self.log_g_min && log_g <= self.log_g_max) {
            return Err(CoverageError::Gravity {
                log_g,
                min: self.log_g_min,
                max: self.log_g_max,
            });
        }
        if !(z.is_finite() && z > 0.0 && z <= self.z_max) {
            return Err(CoverageError::Metallicity { z });
        }

        let flux_nu = self
            .wavelengths_nm
            .iter()
            .map(|&w| std::f64::consts::PI * planck_nu(w, teff))
            .collect();
        Ok(Spectrum {
            wavelengths_nm: Arc::clone(&self.wavelengths_nm),
            flux_nu,
        })
    }
}

#[derive(Debug, Clone)]
struct LibraryNode {
    log_teff: f64,
    log_g: f64,
    z: f64,
    flux_nu: Vec<f64>,
}

/// Tabulated spectra at library nodes; the nearest node is returned, never an
/// interpolation between nodes.
///
/// CSV layout: `log_teff,log_g,z,<wavelength_nm>,<wavelength_nm>,...` with one
/// row per node and surface `F_nu` values in the wavelength columns.
#[derive(Debug, Clone)]
pub struct TabulatedLibrary {
    name: String,
    wavelengths_nm: Arc<Vec<f64>>,
    nodes: Vec<LibraryNode>,
    /// Maximum |Δ log Teff| to the chosen node (dex).
    pub log_teff_tol: f64,
    /// Maximum |Δ log g| to the chosen node.
    pub log_g_tol: f64,
}

impl TabulatedLibrary {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let (mut reader, header) = open_csv(path, "spectral library")?;
        let c_teff = header.require(&["log_teff", "logt"], path)?;
        let c_g = header.require(&["log_g", "logg"], path)?;
        let c_z = header.require(&["z", "metallicity"], path)?;

        // Every other column whose name is a number is a wavelength sample.
        let mut wave_cols: Vec<(usize, f64)> = header
            .names
            .iter()
            .enumerate()
            .filter(|(i, _)| ![c_teff, c_g, c_z].contains(i))
            .filter_map(|(i, n)| n.parse::<f64>().ok().map(|w| (i, w)))
            .collect();
        wave_cols.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if wave_cols.len() < 2 || wave_cols.windows(2).any(|w| w[1].1 <= w[0].1) {
            return Err(AppError::config(format!(
                "Spectral library '{}' needs at least two distinct numeric wavelength columns.",
                path.display()
            )));
        }

        let mut nodes = Vec::new();
        for (line, record) in read_records(&mut reader, path)? {
            let mut flux_nu = Vec::with_capacity(wave_cols.len());
            for &(col, _) in &wave_cols {
                flux_nu.push(parse_f64(&record, col, line, path)?);
            }
            nodes.push(LibraryNode {
                log_teff: parse_f64(&record, c_teff, line, path)?,
                log_g: parse_f64(&record, c_g, line, path)?,
                z: parse_f64(&record, c_z, line, path)?,
                flux_nu,
            });
        }
        if nodes.is_empty() {
            return Err(AppError::config(format!(
                "Spectral library '{}' has no rows.",
                path.display()
            )));
        }

        log::info!(
            "loaded spectral library {} ({} nodes, {} wavelengths)",
            path.display(),
            nodes.len(),
            wave_cols.len()
        );
        Ok(Self {
            name: path.display().to_string(),
            wavelengths_nm: Arc::new(wave_cols.into_iter().map(|(_, w)| w).collect()),
            nodes,
            log_teff_tol: 0.02,
            log_g_tol: 0.5,
        })
    }
}

impl SpectralLibrary for TabulatedLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn spectrum(&self, log_teff: f64, log_g: f64, z: f64) -> Result<Spectrum, CoverageError> {
        let same_z = |a: f64| (a - z).abs() <= 1e-6 * a.abs().max(z.abs()).max(1e-12);
        let mut best: Option<(&LibraryNode, f64)> = None;
        for node in self.nodes.iter().filter(|n| same_z(n.z)) {
            let dt = (node.log_teff - log_teff).abs();
            let dg = (node.log_g - log_g).abs();
            if dt > self.log_teff_tol || dg > self.log_g_tol {
                continue;
            }
            let d = (dt / self.log_teff_tol).powi(2) + (dg / self.log_g_tol).powi(2);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((node, d));
            }
        }

        match best {
            Some((node, _)) => Ok(Spectrum {
                wavelengths_nm: Arc::clone(&self.wavelengths_nm),
                flux_nu: node.flux_nu.clone(),
            }),
            None if !self.nodes.iter().any(|n| same_z(n.z)) => Err(CoverageError::Metallicity { z }),
            None => Err(CoverageError::NoNearbyNode { log_teff, log_g }),
        }
    }
}

/// Open the configured library: a tabulated CSV if given, otherwise blackbodies.
pub fn open_library(path: Option<&Path>) -> Result<Box<dyn SpectralLibrary>, AppError> {
    match path {
        Some(p) => Ok(Box::new(TabulatedLibrary::load(p)?)),
        None => Ok(Box::new(BlackbodyLibrary::default())),
    }
}
