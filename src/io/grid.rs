//! Grid-stage CSV files: sampled isochrone points, the model grid and
//! coverage warnings.
//!
//! The grid file is self-describing: ten fixed parameter columns followed by
//! one magnitude column per filter, in grid filter order. It can be reloaded
//! to fake, fit or plot without rebuilding.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::{CoverageWarning, DustParams, IsochronePoint, ModelGrid, ModelSed};
use crate::error::AppError;
use crate::io::table::{
    create_csv, finish, fmt_f64, fmt_opt_f64, open_csv, parse_f64, parse_usize, read_records, write_row,
};

const GRID_COLUMNS: [&str; 10] = [
    "id", "log_age", "mass", "z", "log_teff", "log_l", "log_g", "av", "rv", "fbump",
];

pub fn write_isochrones(path: &Path, points: &[IsochronePoint]) -> Result<(), AppError> {
    let what = "isochrone sample";
    let mut w = create_csv(path, what)?;
    write_row(&mut w, ["log_age", "mass", "z", "log_teff", "log_l", "log_g"], what)?;
    for p in points {
        write_row(
            &mut w,
            [p.log_age, p.mass, p.z, p.log_teff, p.log_l, p.log_g].map(fmt_f64),
            what,
        )?;
    }
    finish(w, what)
}

pub fn write_warnings(path: &Path, warnings: &[CoverageWarning]) -> Result<(), AppError> {
    let what = "coverage warnings";
    let mut w = create_csv(path, what)?;
    write_row(&mut w, ["log_age", "z", "mass", "reason"], what)?;
    for c in warnings {
        write_row(
            &mut w,
            [fmt_f64(c.log_age), fmt_f64(c.z), fmt_opt_f64(c.mass), c.reason.clone()],
            what,
        )?;
    }
    finish(w, what)
}

pub fn write_grid(path: &Path, grid: &ModelGrid) -> Result<(), AppError> {
    let what = "model grid";
    let mut w = create_csv(path, what)?;
    let header: Vec<&str> = GRID_COLUMNS
        .iter()
        .copied()
        .chain(grid.filters.iter().map(String::as_str))
        .collect();
    write_row(&mut w, header, what)?;

    for row in &grid.rows {
        let s = &row.star;
        let d = &row.dust;
        let mut cells = vec![row.id.to_string()];
        cells.extend(
            [s.log_age, s.mass, s.z, s.log_teff, s.log_l, s.log_g, d.av, d.rv, d.fbump]
                .into_iter()
                .chain(row.mags.iter().copied())
                .map(fmt_f64),
        );
        write_row(&mut w, cells, what)?;
    }
    finish(w, what)?;
    log::info!("wrote {} models to {}", grid.len(), path.display());
    Ok(())
}

/// Reload a grid written by `write_grid`.
///
/// Every magnitude must be finite and every id unique, as in a freshly built grid.
pub fn read_grid(path: &Path) -> Result<ModelGrid, AppError> {
    let (mut reader, header) = open_csv(path, "model grid")?;
    let mut cols = [0usize; GRID_COLUMNS.len()];
    for (slot, name) in cols.iter_mut().zip(GRID_COLUMNS) {
        *slot = header.require(&[name], path)?;
    }
    let filter_cols: Vec<usize> = (0..header.names.len())
        .filter(|i| !cols.contains(i))
        .collect();
    if filter_cols.is_empty() {
        return Err(AppError::config(format!(
            "Model grid '{}' has no filter columns.",
            path.display()
        )));
    }
    let filters = filter_cols.iter().map(|&i| header.names[i].clone()).collect();

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for (line, rec) in read_records(&mut reader, path)? {
        let id = parse_usize(&rec, cols[0], line, path)?;
        if !seen.insert(id) {
            return Err(AppError::config(format!(
                "Duplicate model id {id} at line {line} of '{}'.",
                path.display()
            )));
        }
        let f = |k: usize| parse_f64(&rec, cols[k], line, path);
        let mags = filter_cols
            .iter()
            .map(|&c| parse_f64(&rec, c, line, path))
            .collect::<Result<Vec<f64>, AppError>>()?;
        rows.push(ModelSed {
            id,
            star: IsochronePoint {
                log_age: f(1)?,
                mass: f(2)?,
                z: f(3)?,
                log_teff: f(4)?,
                log_l: f(5)?,
                log_g: f(6)?,
            },
            dust: DustParams {
                av: f(7)?,
                rv: f(8)?,
                fbump: f(9)?,
            },
            mags,
        });
    }

    log::info!("loaded {} models from {}", rows.len(), path.display());
    Ok(ModelGrid::new(filters, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::tests::ramp_grid;

    #[test]
    fn grid_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g_grid.csv");
        let grid = ramp_grid(12);
        write_grid(&path, &grid).unwrap();
        let back = read_grid(&path).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn rewriting_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g_grid.csv");
        write_grid(&path, &ramp_grid(12)).unwrap();
        write_grid(&path, &ramp_grid(3)).unwrap();
        assert_eq!(read_grid(&path).unwrap().len(), 3);
    }

    #[test]
    fn reload_rejects_duplicate_ids_and_bad_magnitudes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g_grid.csv");
        let header = "id,log_age,mass,z,log_teff,log_l,log_g,av,rv,fbump,F475W,F814W\n";
        let row = |id: usize, mag: &str| format!("{id},7,1,0.019,3.8,0.5,4.3,0,3.1,1,18.0,{mag}\n");

        std::fs::write(&path, format!("{header}{}{}", row(0, "17.0"), row(0, "17.5"))).unwrap();
        let err = read_grid(&path).unwrap_err();
        assert!(err.message().contains("Duplicate model id 0"), "{err}");

        for bad in ["nan", "inf", ""] {
            std::fs::write(&path, format!("{header}{}{}", row(0, "17.0"), row(1, bad))).unwrap();
            assert!(read_grid(&path).is_err(), "accepted magnitude '{bad}'");
        }

        std::fs::write(&path, format!("{header}{}{}", row(0, "17.0"), row(1, "17.5"))).unwrap();
        assert_eq!(read_grid(&path).unwrap().len(), 2);
    }

    #[test]
    fn warnings_file_leaves_mass_empty_when_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.csv");
        write_warnings(
            &path,
            &[CoverageWarning {
                log_age: 10.5,
                z: 0.019,
                mass: None,
                reason: "age 10.5 outside table range [7, 8]".into(),
            }],
        )
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("10.5,0.019,,\"age 10.5 outside table range [7, 8]\""), "{text}");
    }
}
