//! Stage pipeline shared by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! isochrones -> model grid -> fake observations -> likelihood fits -> summaries
//!
//! Each stage writes its own files under the project directory and returns
//! what it computed, so the CLI only has to decide what to print.

use std::path::{Path, PathBuf};

use crate::data::spectral::open_library;
use crate::data::{FakeOutput, FilterSet, IsochroneTable, SampleSpec, generate_fake};
use crate::domain::{
    CoverageWarning, FakeConfig, FakeDataset, FitConfig, FitResult, GridConfig, IsochronePoint, ModelGrid,
    OutputConfig, StudyConfig, SummaryRow,
};
use crate::error::AppError;
use crate::fit::{ChiSquareFitter, RecoveryStats, fit_all, recovery_stats, summarize_all};
use crate::io::{
    RunCounts, ensure_project_dir, find_part, read_fake, read_grid, write_fake, write_grid, write_isochrones,
    write_lnp, write_recovery, write_run_json, write_stats, write_warnings,
};
use crate::models::{BumpMixtureLaw, GridInputs, build_grid};
use crate::noise::AstNoiseModel;
use crate::plot::{write_cmd_svg, write_recovery_svg};

/// Output of the grid stage.
#[derive(Debug, Clone)]
pub struct GridStage {
    pub points: Vec<IsochronePoint>,
    pub grid: ModelGrid,
    pub warnings: Vec<CoverageWarning>,
}

/// Output of the fit stage.
#[derive(Debug, Clone)]
pub struct FitStage {
    pub results: Vec<FitResult>,
    pub rows: Vec<SummaryRow>,
    pub recovery: RecoveryStats,
    pub likelihood_rows: usize,
}

/// Everything a full `run` produced.
#[derive(Debug, Clone)]
pub struct StudyRun {
    /// `None` when the grid was reloaded instead of rebuilt.
    pub grid_stage: Option<GridStage>,
    pub grid: ModelGrid,
    pub fake: FakeOutput,
    pub fit: FitStage,
}

/// Sample `table` and synthesise the grid. Writes nothing.
pub fn grid_from_table(table: &IsochroneTable, config: &GridConfig) -> Result<GridStage, AppError> {
    config.validate()?;
    let sampling = table.sample(&SampleSpec {
        log_ages: &config.log_ages,
        zs: &config.zs,
        masses: config.masses.as_deref(),
    });

    let filter_set = match &config.filter_file {
        Some(path) => FilterSet::load(path)?,
        None => FilterSet::builtin(),
    };
    let filters = filter_set.select(&config.filters)?;
    let library = open_library(config.spectral_library.as_deref())?;
    let dust = config.dust_grid();

    let inputs = GridInputs {
        library: &*library,
        law: &BumpMixtureLaw,
        dust: &dust,
        filters: &filters,
        distance_modulus: config.distance_modulus,
    };
    let build = build_grid(&sampling.points, &inputs);

    let mut warnings = sampling.warnings;
    warnings.extend(build.warnings);
    Ok(GridStage {
        points: sampling.points,
        grid: build.grid,
        warnings,
    })
}

/// Grid stage: build the grid and write `_isochrones`, `_grid` and `_warnings`.
///
/// An empty grid is fatal, but only after the warnings explaining it are on disk.
pub fn run_grid(config: &GridConfig, output: &OutputConfig) -> Result<GridStage, AppError> {
    config.validate()?;
    ensure_project_dir(output)?;
    let table = IsochroneTable::load(&config.isochrones)?;
    let stage = grid_from_table(&table, config)?;

    write_isochrones(&output.shared_path("_isochrones.csv"), &stage.points)?;
    write_warnings(&output.shared_path("_warnings.csv"), &stage.warnings)?;
    if stage.grid.is_empty() {
        return Err(AppError::empty(format!(
            "The model grid is empty ({} samples skipped, see {}).",
            stage.warnings.len(),
            output.shared_path("_warnings.csv").display()
        )));
    }
    write_grid(&output.shared_path("_grid.csv"), &stage.grid)?;

    let counts = RunCounts {
        isochrone_points: Some(stage.points.len()),
        coverage_warnings: Some(stage.warnings.len()),
        grid_models: Some(stage.grid.len()),
        ..RunCounts::default()
    };
    write_run_json(&output.shared_path("_run.json"), "grid", config, &counts, None)?;
    Ok(stage)
}

/// Grid file to read: `explicit` or the project's `_grid.csv`.
pub fn load_grid(output: &OutputConfig, explicit: Option<&Path>) -> Result<ModelGrid, AppError> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output.shared_path("_grid.csv"));
    let grid = read_grid(&path)?;
    if grid.is_empty() {
        return Err(AppError::empty(format!("Model grid '{}' has no rows.", path.display())));
    }
    Ok(grid)
}

/// Fake stage: draw observations, write `_fake.csv` and the colour-magnitude diagram.
///
/// An empty dataset is written as-is; the fit stage refuses it.
pub fn run_fake(grid: &ModelGrid, config: &FakeConfig, output: &OutputConfig) -> Result<FakeOutput, AppError> {
    ensure_project_dir(output)?;
    let fake = generate_fake(grid, config)?;
    write_fake(&output.shared_path("_fake.csv"), &fake.dataset)?;
    write_cmd_svg(
        &output.shared_path("_cmd.svg"),
        grid,
        &fake.dataset,
        &config.cut_band,
        config.cutoff,
    )?;

    let counts = RunCounts {
        grid_models: Some(grid.len()),
        fake: Some(fake.stats.clone()),
        ..RunCounts::default()
    };
    write_run_json(&output.shared_path("_run.json"), "fake", config, &counts, None)?;
    Ok(fake)
}

/// Observation file to fit: `explicit` or the project's `_fake.csv`, narrowed
/// to part `output.chunk` when one is selected.
pub fn fake_path(output: &OutputConfig, explicit: Option<&Path>) -> Result<PathBuf, AppError> {
    let base = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output.shared_path("_fake.csv"));
    match output.chunk {
        Some(k) => find_part(&base, k),
        None => Ok(base),
    }
}

pub fn load_fake(output: &OutputConfig, explicit: Option<&Path>) -> Result<FakeDataset, AppError> {
    let path = fake_path(output, explicit)?;
    log::info!("reading observations from {}", path.display());
    read_fake(&path)
}

/// Fit stage: fit every observation, then write `_lnp`, `_stats`,
/// `_recovery` and the recovery figure.
pub fn run_fit(
    grid: &ModelGrid,
    dataset: &FakeDataset,
    config: &FitConfig,
    output: &OutputConfig,
) -> Result<FitStage, AppError> {
    config.validate()?;
    if dataset.is_empty() {
        return Err(AppError::empty("No observations to fit (every draw was rejected by the cutoff)."));
    }
    ensure_project_dir(output)?;

    let mut fitter = ChiSquareFitter::new(config.sigma, config.sigma_floor);
    if let Some(path) = &config.ast_file {
        let noise = AstNoiseModel::load(path, &grid.filters)?.interpolate(grid)?;
        fitter = fitter.with_noise(noise);
    }

    let results = fit_all(dataset, grid, &fitter)?;
    let rows = summarize_all(&results, grid);
    let recovery = recovery_stats(&rows);

    let likelihood_rows = write_lnp(&output.path("_lnp.csv"), &results, grid, config.threshold)?;
    write_stats(&output.path("_stats.csv"), &rows)?;
    write_recovery(&output.path("_recovery.csv"), &recovery)?;
    write_recovery_svg(&output.path("_recovery.svg"), &rows)?;

    let stage = FitStage {
        results,
        rows,
        recovery,
        likelihood_rows,
    };
    let counts = RunCounts {
        grid_models: Some(grid.len()),
        ..fit_counts(&stage)
    };
    write_run_json(&output.path("_run.json"), "fit", config, &counts, Some(&stage.recovery))?;

    log::info!(
        "fit stage done: {} fitted, {} failed, best = truth for {:.1}%",
        stage.recovery.n_fitted,
        stage.recovery.n_failed,
        stage.recovery.best_is_truth * 100.0
    );
    Ok(stage)
}

fn fit_counts(fit: &FitStage) -> RunCounts {
    RunCounts {
        fitted: Some(fit.recovery.n_fitted),
        failed: Some(fit.recovery.n_failed),
        likelihood_rows: Some(fit.likelihood_rows),
        ..RunCounts::default()
    }
}

/// Every stage in sequence, with one `_run.json` covering the whole run.
pub fn run_study(config: &StudyConfig) -> Result<StudyRun, AppError> {
    let output = &config.output;
    ensure_project_dir(output)?;

    let (grid_stage, grid) = if config.reuse_grid {
        log::info!("reusing existing grid");
        (None, load_grid(output, None)?)
    } else {
        let stage = run_grid(&config.grid, output)?;
        let grid = stage.grid.clone();
        (Some(stage), grid)
    };

    let fake = run_fake(&grid, &config.fake, output)?;
    let fit = run_fit(&grid, &fake.dataset, &config.fit, output)?;

    let counts = RunCounts {
        isochrone_points: grid_stage.as_ref().map(|s| s.points.len()),
        coverage_warnings: grid_stage.as_ref().map(|s| s.warnings.len()),
        grid_models: Some(grid.len()),
        fake: Some(fake.stats.clone()),
        ..fit_counts(&fit)
    };
    write_run_json(&output.path("_run.json"), "run", config, &counts, Some(&fit.recovery))?;

    Ok(StudyRun {
        grid_stage,
        grid,
        fake,
        fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::tests::ramp_grid;
    use crate::data::isochrone::tests::toy_table;
    use crate::domain::{DisplayConfig, FakeObservation, FitStatus, Param};
    use crate::io::split_file;

    fn grid_config(isochrones: PathBuf, log_ages: Vec<f64>) -> GridConfig {
        GridConfig {
            isochrones,
            log_ages,
            zs: vec![0.019],
            masses: None,
            avs: vec![0.0, 1.0],
            rvs: vec![3.1],
            fbumps: vec![1.0],
            filters: vec!["F475W".into(), "F814W".into()],
            filter_file: None,
            spectral_library: None,
            distance_modulus: 18.5,
        }
    }

    fn fake_config(seed: u64, draws: usize, sigma: f64, cutoff: f64) -> FakeConfig {
        FakeConfig {
            seed,
            draws,
            sigma,
            cutoff,
            cut_band: "F814W".into(),
        }
    }

    fn fit_config(sigma: f64) -> FitConfig {
        FitConfig {
            sigma,
            sigma_floor: 0.01,
            ast_file: None,
            threshold: Some(-10.0),
        }
    }

    fn write_toy_isochrones(dir: &Path) -> PathBuf {
        let path = dir.join("iso.csv");
        write_isochrones(&path, toy_table().points()).unwrap();
        path
    }

    #[test]
    fn out_of_range_age_is_a_warning_not_an_error() {
        let table = toy_table();
        let stage = grid_from_table(&table, &grid_config(PathBuf::new(), vec![10.5])).unwrap();
        assert!(stage.grid.is_empty());
        assert_eq!(stage.warnings.len(), 1);
    }

    #[test]
    fn grid_has_one_row_per_point_and_dust() {
        let stage = grid_from_table(&toy_table(), &grid_config(PathBuf::new(), vec![7.0, 10.5])).unwrap();
        assert_eq!(stage.points.len(), 3);
        assert_eq!(stage.grid.len(), 3 * 2);
        assert_eq!(stage.warnings.len(), 1);
        assert!(stage.grid.rows.iter().all(|r| r.mags.iter().all(|m| m.is_finite())));
        let ids: Vec<usize> = stage.grid.rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn grid_stage_writes_its_files_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let iso = write_toy_isochrones(tmp.path());
        let output = OutputConfig::new("toy", tmp.path());

        let stage = run_grid(&grid_config(iso, vec![8.0]), &output).unwrap();
        for suffix in ["_isochrones.csv", "_grid.csv", "_warnings.csv", "_run.json"] {
            assert!(output.path(suffix).is_file(), "{suffix}");
        }
        let back = load_grid(&output, None).unwrap();
        assert_eq!(back.len(), stage.grid.len());
        assert_eq!(back.filters, stage.grid.filters);
    }

    #[test]
    fn empty_grid_stage_exits_with_empty_code() {
        let tmp = tempfile::tempdir().unwrap();
        let iso = write_toy_isochrones(tmp.path());
        let output = OutputConfig::new("toy", tmp.path());

        let err = run_grid(&grid_config(iso, vec![10.5]), &output).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_EMPTY);
        assert!(output.path("_warnings.csv").is_file());
    }

    #[test]
    fn fake_scenario_respects_cutoff_and_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let output = OutputConfig::new("scenario", tmp.path());
        let grid = ramp_grid(100);

        let fake = run_fake(&grid, &fake_config(42, 50, 0.05, 20.0), &output).unwrap();
        assert!(fake.dataset.len() <= 50);
        assert_eq!(fake.stats.kept + fake.stats.rejected, 50);
        for obs in &fake.dataset.observations {
            assert!(obs.mags[1] <= 20.0);
            assert!(grid.contains(obs.model_id));
        }
        assert_eq!(load_fake(&output, None).unwrap(), fake.dataset);
        assert!(output.path("_cmd.svg").is_file());

        let again = generate_fake(&grid, &fake_config(42, 50, 0.05, 20.0)).unwrap();
        assert_eq!(again.dataset, fake.dataset);
    }

    #[test]
    fn noiseless_round_trip_recovers_every_origin() {
        let tmp = tempfile::tempdir().unwrap();
        let output = OutputConfig::new("exact", tmp.path());
        let grid = ramp_grid(40);

        let fake = run_fake(&grid, &fake_config(5, 30, 0.0, 99.0), &output).unwrap();
        let fit = run_fit(&grid, &fake.dataset, &fit_config(0.0), &output).unwrap();
        assert_eq!(fit.recovery.n_fitted, 30);
        assert_eq!(fit.recovery.best_is_truth, 1.0);
        for r in &fit.results {
            assert_eq!(r.best_model, Some(r.model_id));
        }
        for suffix in ["_lnp.csv", "_stats.csv", "_recovery.csv", "_recovery.svg", "_run.json"] {
            assert!(output.path(suffix).is_file(), "{suffix}");
        }
    }

    #[test]
    fn one_bad_observation_does_not_stop_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let output = OutputConfig::new("iso", tmp.path());
        let grid = ramp_grid(20);
        let mut observations: Vec<FakeObservation> = (0..4)
            .map(|i| FakeObservation {
                id: format!("fake-{i}"),
                model_id: i * 3,
                mags: grid.rows[i * 3].mags.clone(),
            })
            .collect();
        observations[1].mags[0] = f64::NAN;
        let data = FakeDataset {
            filters: grid.filters.clone(),
            observations,
        };

        let fit = run_fit(&grid, &data, &fit_config(0.05), &output).unwrap();
        assert_eq!(fit.recovery.n_fitted, 3);
        assert_eq!(fit.recovery.n_failed, 1);
        assert!(matches!(fit.results[1].status, FitStatus::Failed(_)));
        let stats = std::fs::read_to_string(output.path("_stats.csv")).unwrap();
        assert!(stats.contains(",failed,"));
    }

    #[test]
    fn empty_dataset_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let output = OutputConfig::new("none", tmp.path());
        let grid = ramp_grid(5);
        let data = FakeDataset {
            filters: grid.filters.clone(),
            observations: Vec::new(),
        };
        let err = run_fit(&grid, &data, &fit_config(0.05), &output).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_EMPTY);
    }

    #[test]
    fn chunked_fit_writes_part_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let mut output = OutputConfig::new("chunky", tmp.path());
        let grid = ramp_grid(30);
        run_fake(&grid, &fake_config(9, 25, 0.02, 99.0), &output).unwrap();
        let parts = split_file(&output.path("_fake.csv"), 10).unwrap();
        assert_eq!(parts.len(), 3);

        output.chunk = Some(2);
        let data = load_fake(&output, None).unwrap();
        assert_eq!(data.len(), 5);
        run_fit(&grid, &data, &fit_config(0.02), &output).unwrap();
        assert!(tmp.path().join("chunky/chunky.part2_stats.csv").is_file());

        output.chunk = Some(3);
        assert!(load_fake(&output, None).is_err());
    }

    #[test]
    fn full_study_with_grid_reuse() {
        let tmp = tempfile::tempdir().unwrap();
        let iso = write_toy_isochrones(tmp.path());
        let mut config = StudyConfig {
            output: OutputConfig::new("study", tmp.path()),
            grid: grid_config(iso, vec![7.0, 8.0]),
            fake: fake_config(11, 40, 0.02, 99.0),
            fit: fit_config(0.02),
            display: DisplayConfig {
                plot: false,
                plot_param: Param::Av,
                plot_width: 40,
                plot_height: 10,
                top_n: 5,
            },
            reuse_grid: false,
        };

        let first = run_study(&config).unwrap();
        assert_eq!(first.grid.len(), 12);
        assert_eq!(first.fit.results.len(), first.fake.dataset.len());
        assert!(config.output.path("_cmd.svg").is_file());
        let run_json = std::fs::read_to_string(config.output.path("_run.json")).unwrap();
        assert!(run_json.contains("\"stage\": \"run\""));

        config.reuse_grid = true;
        let second = run_study(&config).unwrap();
        assert!(second.grid_stage.is_none());
        assert_eq!(second.grid.len(), first.grid.len());
        assert_eq!(second.fake.dataset.observations.len(), first.fake.dataset.observations.len());
    }
}
