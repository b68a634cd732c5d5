//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory while building, sampling and fitting
//! - exported to CSV/JSON
//! - reloaded later for fitting chunks or re-plotting

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One row of an isochrone table: physical stellar parameters at a fixed
/// (age, initial mass, metallicity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsochronePoint {
    /// log10(age / yr)
    pub log_age: f64,
    /// Initial mass in solar masses.
    pub mass: f64,
    /// Metal mass fraction.
    pub z: f64,
    /// log10(Teff / K)
    pub log_teff: f64,
    /// log10(L / Lsun)
    pub log_l: f64,
    /// log10(g / cm s^-2)
    pub log_g: f64,
}

/// Dust attenuation parameters applied to a model SED.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DustParams {
    /// V-band extinction (mag).
    pub av: f64,
    /// Total-to-selective extinction ratio A(V)/E(B-V).
    pub rv: f64,
    /// Fraction of the 2175 A bump strength (0 = no bump, 1 = full bump).
    pub fbump: f64,
}

/// One model of the grid: isochrone point + dust + synthetic magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSed {
    pub id: usize,
    pub star: IsochronePoint,
    pub dust: DustParams,
    /// Apparent AB magnitudes, one per grid filter (same order as `ModelGrid::filters`).
    pub mags: Vec<f64>,
}

/// Flat table of model SEDs keyed by their synthetic id.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGrid {
    pub filters: Vec<String>,
    pub rows: Vec<ModelSed>,
}

impl ModelGrid {
    pub fn new(filters: Vec<String>, rows: Vec<ModelSed>) -> Self {
        Self { filters, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a filter by name (case-insensitive).
    pub fn filter_index(&self, name: &str) -> Option<usize> {
        filter_index(&self.filters, name)
    }

    /// Look up a model by id.
    ///
    /// Grids built in-process have `rows[i].id == i`; reloaded or trimmed
    /// grids fall back to a linear scan.
    pub fn get(&self, id: usize) -> Option<&ModelSed> {
        match self.rows.get(id) {
            Some(row) if row.id == id => Some(row),
            _ => self.rows.iter().find(|r| r.id == id),
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        self.get(id).is_some()
    }
}

pub fn filter_index(filters: &[String], name: &str) -> Option<usize> {
    filters.iter().position(|f| f.eq_ignore_ascii_case(name))
}

/// Physical parameters recovered by the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    LogAge,
    Mass,
    Z,
    Av,
    Rv,
    Fbump,
}

impl Param {
    pub const ALL: [Param; 6] = [
        Param::LogAge,
        Param::Mass,
        Param::Z,
        Param::Av,
        Param::Rv,
        Param::Fbump,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Param::LogAge => "log_age",
            Param::Mass => "mass",
            Param::Z => "z",
            Param::Av => "av",
            Param::Rv => "rv",
            Param::Fbump => "fbump",
        }
    }

    /// Value of this parameter for a grid model.
    pub fn of(self, model: &ModelSed) -> f64 {
        match self {
            Param::LogAge => model.star.log_age,
            Param::Mass => model.star.mass,
            Param::Z => model.star.z,
            Param::Av => model.dust.av,
            Param::Rv => model.dust.rv,
            Param::Fbump => model.dust.fbump,
        }
    }
}

/// A sample the grid builder could not turn into a model row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageWarning {
    pub log_age: f64,
    pub z: f64,
    pub mass: Option<f64>,
    pub reason: String,
}

/// One synthetic observation drawn from the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeObservation {
    pub id: String,
    /// Id of the grid row the observation was drawn from (ground truth).
    pub model_id: usize,
    pub mags: Vec<f64>,
}

/// Table of fake observations sharing the grid's filter order.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeDataset {
    pub filters: Vec<String>,
    pub observations: Vec<FakeObservation>,
}

impl FakeDataset {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Outcome of a single observation's fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "error")]
pub enum FitStatus {
    Ok,
    Failed(String),
}

/// Fit output for one fake observation.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub obs_id: String,
    /// Ground-truth grid id carried over from the observation.
    pub model_id: usize,
    pub status: FitStatus,
    /// Log-likelihood against every grid row (grid order); empty when failed.
    pub lnl: Vec<f64>,
    pub best_model: Option<usize>,
    pub max_lnl: Option<f64>,
}

impl FitResult {
    pub fn failed(obs: &FakeObservation, reason: impl Into<String>) -> Self {
        Self {
            obs_id: obs.id.clone(),
            model_id: obs.model_id,
            status: FitStatus::Failed(reason.into()),
            lnl: Vec::new(),
            best_model: None,
            max_lnl: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FitStatus::Ok
    }
}

/// Likelihood-weighted estimate of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub truth: f64,
    pub best: f64,
    pub expectation: f64,
    pub p16: f64,
    pub p50: f64,
    pub p84: f64,
}

/// Per-observation summary: best fit plus marginal estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub obs_id: String,
    pub model_id: usize,
    pub status: FitStatus,
    pub best_model: Option<usize>,
    pub max_lnl: Option<f64>,
    /// Rank (0 = best) of the truth model among all grid models.
    pub truth_rank: Option<usize>,
    /// One entry per `Param::ALL`; empty when the fit failed.
    pub estimates: Vec<(Param, ParamEstimate)>,
}

impl SummaryRow {
    pub fn estimate(&self, param: Param) -> Option<&ParamEstimate> {
        self.estimates.iter().find(|(p, _)| *p == param).map(|(_, e)| e)
    }
}

/// Where run outputs go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub project: String,
    pub outdir: PathBuf,
    /// Fit-stage outputs of one observation chunk use `<project>.part<k>` as stem.
    #[serde(default)]
    pub chunk: Option<usize>,
}

impl OutputConfig {
    pub fn new(project: impl Into<String>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            outdir: outdir.into(),
            chunk: None,
        }
    }

    /// `<outdir>/<project>`
    pub fn project_dir(&self) -> PathBuf {
        self.outdir.join(&self.project)
    }

    /// `<outdir>/<project>/<project><suffix>`, ignoring any chunk.
    pub fn shared_path(&self, suffix: &str) -> PathBuf {
        self.project_dir().join(format!("{}{suffix}", self.project))
    }

    /// Like `shared_path`, but chunk-specific when a chunk is selected.
    pub fn path(&self, suffix: &str) -> PathBuf {
        match self.chunk {
            Some(k) => self
                .project_dir()
                .join(format!("{}.part{k}{suffix}", self.project)),
            None => self.shared_path(suffix),
        }
    }
}

/// Model grid construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub isochrones: PathBuf,
    pub log_ages: Vec<f64>,
    pub zs: Vec<f64>,
    /// Explicit initial masses; `None` uses every table-native mass.
    pub masses: Option<Vec<f64>>,
    pub avs: Vec<f64>,
    pub rvs: Vec<f64>,
    pub fbumps: Vec<f64>,
    pub filters: Vec<String>,
    pub filter_file: Option<PathBuf>,
    pub spectral_library: Option<PathBuf>,
    pub distance_modulus: f64,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.log_ages.is_empty() || self.zs.is_empty() {
            return Err(AppError::config("At least one age and one metallicity are required."));
        }
        if let Some(masses) = &self.masses {
            if masses.is_empty() || masses.iter().any(|m| !(m.is_finite() && *m > 0.0)) {
                return Err(AppError::config("Masses must be finite and > 0."));
            }
        }
        if self.avs.is_empty() || self.avs.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(AppError::config("Av values must be finite and >= 0."));
        }
        if self.rvs.is_empty() || self.rvs.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(AppError::config("Rv values must be finite and > 0."));
        }
        if self.fbumps.is_empty()
            || self
                .fbumps
                .iter()
                .any(|v| !(v.is_finite() && (0.0..=1.0).contains(v)))
        {
            return Err(AppError::config("fbump values must be within [0, 1]."));
        }
        if self.filters.is_empty() {
            return Err(AppError::config("At least one filter is required."));
        }
        if !self.distance_modulus.is_finite() {
            return Err(AppError::config("Distance modulus must be finite."));
        }
        Ok(())
    }

    /// Every (Av, Rv, fbump) combination, Av varying slowest.
    pub fn dust_grid(&self) -> Vec<DustParams> {
        let mut out = Vec::with_capacity(self.avs.len() * self.rvs.len() * self.fbumps.len());
        for &av in &self.avs {
            for &rv in &self.rvs {
                for &fbump in &self.fbumps {
                    out.push(DustParams { av, rv, fbump });
                }
            }
        }
        out
    }
}

/// Fake observation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeConfig {
    pub seed: u64,
    pub draws: usize,
    /// Proportional noise: observed = true * (1 + N(0, sigma)).
    pub sigma: f64,
    pub cutoff: f64,
    pub cut_band: String,
}

impl FakeConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.draws == 0 {
            return Err(AppError::config("Number of draws must be > 0."));
        }
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err(AppError::config("Noise sigma must be finite and >= 0."));
        }
        if !self.cutoff.is_finite() {
            return Err(AppError::config("Cutoff magnitude must be finite."));
        }
        if self.cut_band.trim().is_empty() {
            return Err(AppError::config("Cutoff band must be named."));
        }
        Ok(())
    }
}

/// Likelihood fit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Noise level assumed by the chi-square fitter (matches the fake noise by default).
    pub sigma: f64,
    /// Magnitude uncertainty floor added in quadrature.
    pub sigma_floor: f64,
    /// Optional artificial-star-test table for the covariance noise model.
    pub ast_file: Option<PathBuf>,
    /// Sparse output keeps models with `lnl - max >= threshold`; `None` keeps all.
    pub threshold: Option<f64>,
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err(AppError::config("Fit sigma must be finite and >= 0."));
        }
        if !(self.sigma_floor.is_finite() && self.sigma_floor >= 0.0) {
            return Err(AppError::config("Sigma floor must be finite and >= 0."));
        }
        if self.sigma == 0.0 && self.sigma_floor == 0.0 && self.ast_file.is_none() {
            return Err(AppError::config(
                "Sigma and sigma floor cannot both be zero (the chi-square would be undefined).",
            ));
        }
        if let Some(t) = self.threshold {
            if !(t.is_finite() && t <= 0.0) {
                return Err(AppError::config("Likelihood threshold must be finite and <= 0."));
            }
        }
        Ok(())
    }
}

/// Terminal presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub plot: bool,
    pub plot_param: Param,
    pub plot_width: usize,
    pub plot_height: usize,
    /// Number of worst-recovered observations listed.
    pub top_n: usize,
}

/// Fully resolved configuration for a study run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    pub output: OutputConfig,
    pub grid: GridConfig,
    pub fake: FakeConfig,
    pub fit: FitConfig,
    pub display: DisplayConfig,
    pub reuse_grid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_config() -> GridConfig {
        GridConfig {
            isochrones: PathBuf::from("iso.csv"),
            log_ages: vec![7.0],
            zs: vec![0.019],
            masses: None,
            avs: vec![0.0, 1.0],
            rvs: vec![3.1],
            fbumps: vec![0.0, 0.5, 1.0],
            filters: vec!["F475W".into(), "F814W".into()],
            filter_file: None,
            spectral_library: None,
            distance_modulus: 24.47,
        }
    }

    #[test]
    fn dust_grid_is_full_product() {
        let dust = grid_config().dust_grid();
        assert_eq!(dust.len(), 6);
        assert_eq!(dust[0], DustParams { av: 0.0, rv: 3.1, fbump: 0.0 });
        assert_eq!(dust[5], DustParams { av: 1.0, rv: 3.1, fbump: 1.0 });
    }

    #[test]
    fn grid_config_rejects_bad_ranges() {
        let mut c = grid_config();
        c.fbumps = vec![1.5];
        assert!(c.validate().is_err());

        let mut c = grid_config();
        c.avs = vec![-0.1];
        assert!(c.validate().is_err());

        assert!(grid_config().validate().is_ok());
    }

    #[test]
    fn fit_config_needs_some_noise() {
        let c = FitConfig {
            sigma: 0.0,
            sigma_floor: 0.0,
            ast_file: None,
            threshold: Some(-10.0),
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn output_paths_are_prefixed_by_project() {
        let mut out = OutputConfig::new("beast", "runs");
        assert_eq!(out.path("_grid.csv"), PathBuf::from("runs/beast/beast_grid.csv"));

        out.chunk = Some(3);
        assert_eq!(out.path("_lnp.csv"), PathBuf::from("runs/beast/beast.part3_lnp.csv"));
        assert_eq!(out.shared_path("_grid.csv"), PathBuf::from("runs/beast/beast_grid.csv"));
    }

    #[test]
    fn grid_lookup_falls_back_to_scan() {
        let star = IsochronePoint {
            log_age: 7.0,
            mass: 1.0,
            z: 0.02,
            log_teff: 3.76,
            log_l: 0.0,
            log_g: 4.44,
        };
        let dust = DustParams { av: 0.0, rv: 3.1, fbump: 1.0 };
        let grid = ModelGrid::new(
            vec!["F814W".into()],
            vec![
                ModelSed { id: 5, star, dust, mags: vec![20.0] },
                ModelSed { id: 9, star, dust, mags: vec![21.0] },
            ],
        );
        assert_eq!(grid.get(9).map(|r| r.mags[0]), Some(21.0));
        assert!(grid.get(0).is_none());
        assert_eq!(grid.filter_index("f814w"), Some(0));
    }
}
