//! Isochrone reference table: loading and table-native sampling.
//!
//! The table maps (age, initial mass, metallicity) to (Teff, L, log g). We
//! never interpolate between isochrones: a requested age, metallicity or mass
//! must be a node of the table, otherwise that sample is skipped with a
//! recorded `CoverageWarning`.

use std::path::Path;

use crate::domain::{CoverageWarning, IsochronePoint};
use crate::error::AppError;
use crate::io::table::{open_csv, parse_f64, read_records};

/// Matching tolerance on log10(age) (dex).
const AGE_TOL: f64 = 1e-4;
/// Relative matching tolerance on metallicity and mass.
const REL_TOL: f64 = 1e-6;

/// Requested sampling of the isochrone table.
#[derive(Debug, Clone, Copy)]
pub struct SampleSpec<'a> {
    pub log_ages: &'a [f64],
    pub zs: &'a [f64],
    /// `None` keeps every table-native mass at each (age, Z).
    pub masses: Option<&'a [f64]>,
}

/// Result of sampling: the points kept and one warning per skipped sample.
#[derive(Debug, Clone, Default)]
pub struct IsochroneSampling {
    pub points: Vec<IsochronePoint>,
    pub warnings: Vec<CoverageWarning>,
}

/// Immutable, in-memory isochrone table.
#[derive(Debug, Clone)]
pub struct IsochroneTable {
    points: Vec<IsochronePoint>,
}

impl IsochroneTable {
    pub fn new(points: Vec<IsochronePoint>) -> Self {
        Self { points }
    }

    /// Load an isochrone CSV.
    ///
    /// Accepted column names (case-insensitive): `log_age|logA`, `z|Z`,
    /// `mass|M_ini`, `log_teff|logT`, `log_l|logL`, `log_g|logg`.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let (mut reader, header) = open_csv(path, "isochrone table")?;
        let c_age = header.require(&["log_age", "loga", "logage"], path)?;
        let c_z = header.require(&["z", "metallicity"], path)?;
        let c_mass = header.require(&["mass", "m_ini"], path)?;
        let c_teff = header.require(&["log_teff", "logt", "logte"], path)?;
        let c_l = header.require(&["log_l", "logl"], path)?;
        let c_g = header.require(&["log_g", "logg"], path)?;

        let mut points = Vec::new();
        for (line, record) in read_records(&mut reader, path)? {
            points.push(IsochronePoint {
                log_age: parse_f64(&record, c_age, line, path)?,
                z: parse_f64(&record, c_z, line, path)?,
                mass: parse_f64(&record, c_mass, line, path)?,
                log_teff: parse_f64(&record, c_teff, line, path)?,
                log_l: parse_f64(&record, c_l, line, path)?,
                log_g: parse_f64(&record, c_g, line, path)?,
            });
        }

        if points.is_empty() {
            return Err(AppError::config(format!(
                "Isochrone table '{}' has no rows.",
                path.display()
            )));
        }
        log::info!(
            "loaded {} isochrone points from {}",
            points.len(),
            path.display()
        );
        Ok(Self { points })
    }

    pub fn points(&self) -> &[IsochronePoint] {
        &self.points
    }

    /// Distinct table ages, ascending.
    pub fn ages(&self) -> Vec<f64> {
        distinct_sorted(self.points.iter().map(|p| p.log_age), same_age)
    }

    /// Distinct table metallicities, ascending.
    pub fn metallicities(&self) -> Vec<f64> {
        distinct_sorted(self.points.iter().map(|p| p.z), same_rel)
    }

    /// Sample the table at table-native values only.
    ///
    /// Produces one warning (and zero points) for each (age, Z) sample whose
    /// age or metallicity is outside the table or not a table node, and one
    /// warning for each requested mass missing at an otherwise valid (age, Z).
    pub fn sample(&self, spec: &SampleSpec<'_>) -> IsochroneSampling {
        let ages = self.ages();
        let zs = self.metallicities();
        let mut out = IsochroneSampling::default();

        for &log_age in &dedup(spec.log_ages, same_age) {
            for &z in &dedup(spec.zs, same_rel) {
                if let Some(reason) = node_problem("age", log_age, &ages, same_age)
                    .or_else(|| node_problem("metallicity", z, &zs, same_rel))
                {
                    out.warnings.push(warn(log_age, z, None, reason));
                    continue;
                }

                let at_node: Vec<&IsochronePoint> = self
                    .points
                    .iter()
                    .filter(|p| same_age(p.log_age, log_age) && same_rel(p.z, z))
                    .collect();
                if at_node.is_empty() {
                    out.warnings.push(warn(
                        log_age,
                        z,
                        None,
                        "no isochrone at this age and metallicity".to_string(),
                    ));
                    continue;
                }

                match spec.masses {
                    None => out.points.extend(at_node.iter().copied().copied()),
                    Some(masses) => {
                        for &mass in &dedup(masses, same_rel) {
                            match at_node.iter().find(|p| same_rel(p.mass, mass)) {
                                Some(p) => out.points.push(**p),
                                None => out.warnings.push(warn(
                                    log_age,
                                    z,
                                    Some(mass),
                                    "not a table-native mass (no interpolation)".to_string(),
                                )),
                            }
                        }
                    }
                }
            }
        }

        log::info!(
            "sampled {} isochrone points ({} samples skipped)",
            out.points.len(),
            out.warnings.len()
        );
        out
    }
}

fn warn(log_age: f64, z: f64, mass: Option<f64>, reason: String) -> CoverageWarning {
    match mass {
        Some(m) => log::warn!("skipping isochrone sample log_age={log_age} z={z} mass={m}: {reason}"),
        None => log::warn!("skipping isochrone sample log_age={log_age} z={z}: {reason}"),
    }
    CoverageWarning {
        log_age,
        z,
        mass,
        reason,
    }
}

/// Why `value` cannot be used as a node of `nodes`, if it cannot.
fn node_problem(what: &str, value: f64, nodes: &[f64], same: fn(f64, f64) -> bool) -> Option<String> {
    let (Some(&lo), Some(&hi)) = (nodes.first(), nodes.last()) else {
        return Some(format!("table has no {what} values"));
    };
    if !value.is_finite() || (value < lo && !same(value, lo)) || (value > hi && !same(value, hi)) {
        return Some(format!("{what} {value} outside table range [{lo}, {hi}]"));
    }
    if !nodes.iter().any(|&n| same(n, value)) {
        return Some(format!("{what} {value} is not a table-native value (no interpolation)"));
    }
    None
}

fn same_age(a: f64, b: f64) -> bool {
    (a - b).abs() <= AGE_TOL
}

fn same_rel(a: f64, b: f64) -> bool {
    (a - b).abs() <= REL_TOL * a.abs().max(b.abs()).max(1e-12)
}

fn dedup(values: &[f64], same: fn(f64, f64) -> bool) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(values.len());
    for &v in values {
        if !out.iter().any(|&o| same(o, v)) {
            out.push(v);
        }
    }
    out
}

fn distinct_sorted(values: impl Iterator<Item = f64>, same: fn(f64, f64) -> bool) -> Vec<f64> {
    let mut v: Vec<f64> = values.filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v.dedup_by(|a, b| same(*a, *b));
    v
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Two ages x two metallicities x three masses of plausible main-sequence stars.
    pub(crate) fn toy_table() -> IsochroneTable {
        let mut points = Vec::new();
        for &log_age in &[7.0, 8.0] {
            for &z in &[0.004, 0.019] {
                for &(mass, log_teff, log_l, log_g) in &[
                    (1.0, 3.76, 0.0, 4.44),
                    (2.0, 3.96, 1.2, 4.30),
                    (5.0, 4.20, 2.8, 4.10),
                ] {
                    points.push(IsochronePoint {
                        log_age,
                        mass,
                        z,
                        log_teff,
                        log_l,
                        log_g,
                    });
                }
            }
        }
        IsochroneTable::new(points)
    }

    #[test]
    fn samples_all_native_masses_by_default() {
        let table = toy_table();
        let s = table.sample(&SampleSpec {
            log_ages: &[7.0],
            zs: &[0.019],
            masses: None,
        });
        assert_eq!(s.points.len(), 3);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn age_outside_table_is_one_warning_and_no_points() {
        let table = toy_table();
        let s = table.sample(&SampleSpec {
            log_ages: &[10.5],
            zs: &[0.019],
            masses: None,
        });
        assert!(s.points.is_empty());
        assert_eq!(s.warnings.len(), 1);
        assert!(s.warnings[0].reason.contains("outside table range"));
    }

    #[test]
    fn non_native_age_is_not_interpolated() {
        let table = toy_table();
        let s = table.sample(&SampleSpec {
            log_ages: &[7.5, 8.0],
            zs: &[0.019],
            masses: None,
        });
        assert_eq!(s.points.len(), 3);
        assert_eq!(s.warnings.len(), 1);
        assert!(s.warnings[0].reason.contains("table-native"));
    }

    #[test]
    fn missing_mass_warns_per_mass() {
        let table = toy_table();
        let s = table.sample(&SampleSpec {
            log_ages: &[8.0],
            zs: &[0.004],
            masses: Some(&[1.0, 3.0, 5.0]),
        });
        assert_eq!(s.points.len(), 2);
        assert_eq!(s.warnings.len(), 1);
        assert_eq!(s.warnings[0].mass, Some(3.0));
    }

    #[test]
    fn duplicate_requests_do_not_duplicate_points() {
        let table = toy_table();
        let s = table.sample(&SampleSpec {
            log_ages: &[7.0, 7.0],
            zs: &[0.019],
            masses: Some(&[1.0, 1.0]),
        });
        assert_eq!(s.points.len(), 1);
    }

    #[test]
    fn load_accepts_aliases() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "logA,Z,M_ini,logT,logL,logg").unwrap();
        writeln!(file, "7.0,0.019,1.0,3.76,0.0,4.44").unwrap();
        writeln!(file, "7.0,0.019,2.0,3.96,1.2,4.30").unwrap();
        let table = IsochroneTable::load(file.path()).unwrap();
        assert_eq!(table.points().len(), 2);
        assert_eq!(table.ages(), vec![7.0]);
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let err = IsochroneTable::load(Path::new("/nonexistent/iso.csv")).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
