//! Model grid construction: isochrone points x dust -> synthetic magnitudes.
//!
//! For each isochrone point we:
//! - fetch the surface spectrum from the spectral library
//! - scale it to 10 pc with the stellar radius, R^2 = L / (4 pi sigma Teff^4)
//! - for each dust combination, attenuate and integrate through every filter
//! - convert to AB magnitudes and add the distance modulus
//!
//! Spectra are evaluated once per point; the extinction factors depend only
//! on the filter grids and the dust parameters, so they are precomputed.

use rayon::prelude::*;

use crate::data::filters::{BandSampling, Filter, ab_magnitude};
use crate::data::spectral::{Cgs, SpectralLibrary};
use crate::domain::{CoverageWarning, DustParams, IsochronePoint, ModelGrid, ModelSed};

use super::dust::ExtinctionLaw;

/// Grid plus every sample the builder had to skip.
#[derive(Debug, Clone)]
pub struct GridBuild {
    pub grid: ModelGrid,
    pub warnings: Vec<CoverageWarning>,
}

/// Inputs that stay fixed across isochrone points.
pub struct GridInputs<'a> {
    pub library: &'a dyn SpectralLibrary,
    pub law: &'a dyn ExtinctionLaw,
    pub dust: &'a [DustParams],
    pub filters: &'a [Filter],
    pub distance_modulus: f64,
}

/// (R / 10 pc)^2 for a star of the given log L and log Teff.
pub fn dilution_at_10pc(log_l: f64, log_teff: f64) -> f64 {
    let l = 10f64.powf(log_l) * Cgs::L_SUN;
    let teff = 10f64.powf(log_teff);
    let r2 = l / (4.0 * std::f64::consts::PI * Cgs::STEFAN_BOLTZMANN * teff.powi(4));
    r2 / (10.0 * Cgs::PARSEC).powi(2)
}

/// Outcome for one isochrone point: its rows (dust-ordered) and skips.
type PointRows = (Vec<(DustParams, Vec<f64>)>, Vec<CoverageWarning>);

/// Build the model grid.
///
/// Ids are assigned in build order: isochrone points in input order, then
/// dust combinations in `inputs.dust` order.
pub fn build_grid(points: &[IsochronePoint], inputs: &GridInputs<'_>) -> GridBuild {
    let bands: Vec<BandSampling> = inputs.filters.iter().map(Filter::sampling).collect();
    let attenuation: Vec<Vec<Vec<f64>>> = inputs
        .dust
        .iter()
        .map(|d| {
            bands
                .iter()
                .map(|b| inputs.law.transmission(&b.wavelengths_nm, d))
                .collect()
        })
        .collect();

    let per_point: Vec<PointRows> = points
        .par_iter()
        .map(|p| point_rows(p, inputs, &bands, &attenuation))
        .collect();

    let filters: Vec<String> = inputs.filters.iter().map(|f| f.name.clone()).collect();
    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for (point, (point_rows, point_warnings)) in points.iter().zip(per_point) {
        for (dust, mags) in point_rows {
            rows.push(ModelSed {
                id: rows.len(),
                star: *point,
                dust,
                mags,
            });
        }
        warnings.extend(point_warnings);
    }

    for w in &warnings {
        log::warn!(
            "skipped model log_age={} z={} mass={}: {}",
            w.log_age,
            w.z,
            w.mass.map(|m| m.to_string()).unwrap_or_default(),
            w.reason
        );
    }
    log::info!(
        "built {} model SEDs from {} isochrone points x {} dust combinations ({} skipped)",
        rows.len(),
        points.len(),
        inputs.dust.len(),
        warnings.len()
    );

    GridBuild {
        grid: ModelGrid::new(filters, rows),
        warnings,
    }
}

fn point_rows(
    point: &IsochronePoint,
    inputs: &GridInputs<'_>,
    bands: &[BandSampling],
    attenuation: &[Vec<Vec<f64>>],
) -> PointRows {
    let skip = |reason: String| CoverageWarning {
        log_age: point.log_age,
        z: point.z,
        mass: Some(point.mass),
        reason,
    };

    let spectrum = match inputs.library.spectrum(point.log_teff, point.log_g, point.z) {
        Ok(s) => s.scaled(dilution_at_10pc(point.log_l, point.log_teff)),
        Err(e) => return (Vec::new(), vec![skip(format!("spectral library: {e}"))]),
    };

    let mut band_flux = Vec::with_capacity(bands.len());
    for (band, filter) in bands.iter().zip(inputs.filters) {
        match band.resample(&spectrum) {
            Some(f) => band_flux.push(f),
            None => {
                return (
                    Vec::new(),
                    vec![skip(format!(
                        "spectrum does not cover filter {}",
                        filter.name
                    ))],
                );
            }
        }
    }

    let mut rows = Vec::with_capacity(inputs.dust.len());
    let mut warnings = Vec::new();
    for (dust, att) in inputs.dust.iter().zip(attenuation) {
        let mags: Vec<f64> = bands
            .iter()
            .zip(&band_flux)
            .zip(att)
            .map(|((band, flux), a)| {
                ab_magnitude(band.mean_flux_nu(flux, Some(a)), inputs.distance_modulus)
            })
            .collect();

        if mags.iter().all(|m| m.is_finite()) {
            rows.push((*dust, mags));
        } else {
            warnings.push(skip(format!(
                "non-finite magnitude at av={} rv={} fbump={}",
                dust.av, dust.rv, dust.fbump
            )));
        }
    }
    (rows, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filters::FilterSet;
    use crate::data::spectral::BlackbodyLibrary;
    use crate::models::dust::BumpMixtureLaw;

    fn filters() -> Vec<Filter> {
        FilterSet::builtin()
            .select(&["F475W".to_string(), "F814W".to_string()])
            .unwrap()
    }

    fn sun() -> IsochronePoint {
        IsochronePoint {
            log_age: 9.6,
            mass: 1.0,
            z: 0.019,
            log_teff: 5772f64.log10(),
            log_l: 0.0,
            log_g: 4.44,
        }
    }

    #[test]
    fn sun_radius_at_10pc() {
        let d = dilution_at_10pc(0.0, 5772f64.log10());
        let r_sun = 6.957e10;
        let expected = (r_sun / (10.0 * Cgs::PARSEC)).powi(2);
        assert!((d / expected - 1.0).abs() < 0.01, "{d} vs {expected}");
    }

    #[test]
    fn sun_has_plausible_absolute_magnitudes() {
        let library = BlackbodyLibrary::default();
        let law = BumpMixtureLaw;
        let dust = [DustParams { av: 0.0, rv: 3.1, fbump: 1.0 }];
        let filters = filters();
        let build = build_grid(
            &[sun()],
            &GridInputs {
                library: &library,
                law: &law,
                dust: &dust,
                filters: &filters,
                distance_modulus: 0.0,
            },
        );
        assert_eq!(build.grid.len(), 1);
        let mags = &build.grid.rows[0].mags;
        // A 5772 K blackbody is roughly M_AB ~ 5.1 at 500 nm and ~ 4.5 at 800 nm.
        assert!(mags[0] > 4.0 && mags[0] < 6.0, "{mags:?}");
        assert!(mags[1] > 3.5 && mags[1] < 5.5, "{mags:?}");
        assert!(mags[0] > mags[1], "sun should be redder than flat: {mags:?}");
    }

    #[test]
    fn dust_dims_and_reddens() {
        let library = BlackbodyLibrary::default();
        let law = BumpMixtureLaw;
        let dust = [
            DustParams { av: 0.0, rv: 3.1, fbump: 1.0 },
            DustParams { av: 1.0, rv: 3.1, fbump: 1.0 },
        ];
        let filters = filters();
        let build = build_grid(
            &[sun()],
            &GridInputs {
                library: &library,
                law: &law,
                dust: &dust,
                filters: &filters,
                distance_modulus: 24.47,
            },
        );
        let clear = &build.grid.rows[0].mags;
        let dusty = &build.grid.rows[1].mags;
        let d_blue = dusty[0] - clear[0];
        let d_red = dusty[1] - clear[1];
        assert!(d_blue > d_red && d_red > 0.0, "{d_blue} {d_red}");
    }

    #[test]
    fn out_of_coverage_points_are_skipped_with_one_warning() {
        let library = BlackbodyLibrary::default();
        let law = BumpMixtureLaw;
        let dust = [
            DustParams { av: 0.0, rv: 3.1, fbump: 1.0 },
            DustParams { av: 0.5, rv: 3.1, fbump: 1.0 },
        ];
        let filters = filters();
        let mut cold = sun();
        cold.log_teff = 3.0;
        cold.mass = 0.1;
        let build = build_grid(
            &[sun(), cold, sun()],
            &GridInputs {
                library: &library,
                law: &law,
                dust: &dust,
                filters: &filters,
                distance_modulus: 24.47,
            },
        );
        assert_eq!(build.grid.len(), 4);
        assert_eq!(build.warnings.len(), 1);
        assert_eq!(build.warnings[0].mass, Some(0.1));
        let ids: Vec<usize> = build.grid.rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(build.grid.rows.iter().all(|r| r.mags.iter().all(|m| m.is_finite())));
    }
}
