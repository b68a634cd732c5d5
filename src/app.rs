//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - resolves them into stage configurations
//! - runs the requested stages through `pipeline`
//! - prints summaries and plots

use clap::Parser;

use crate::cli::range::expand;
use crate::cli::{
    Cli, Command, DEFAULT_SIGMA, DisplayOpts, FakeArgs, FakeOpts, FitArgs, FitOpts, GridArgs, GridOpts,
    OutputArgs, PlotArgs, RunArgs, SplitArgs,
};
use crate::domain::{
    DisplayConfig, FakeConfig, FakeDataset, FitConfig, GridConfig, ModelGrid, OutputConfig, StudyConfig,
    SummaryRow,
};
use crate::error::AppError;
use crate::fit::RecoveryStats;
use crate::io::{read_fake, read_stats, split_file};
use crate::plot::{render_recovery_plot, write_cmd_svg, write_recovery_svg};
use crate::report::{format_fake_summary, format_fit_summary, format_grid_summary};

pub mod pipeline;

/// Entry point for the `sedsens` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    if let Some(n) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .map_err(|e| AppError::config(format!("Failed to start {n} worker threads: {e}")))?;
    }

    match cli.command {
        Command::Grid(args) => handle_grid(args),
        Command::Fake(args) => handle_fake(args),
        Command::Fit(args) => handle_fit(args),
        Command::Run(args) => handle_run(args),
        Command::Split(args) => handle_split(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_grid(args: GridArgs) -> Result<(), AppError> {
    let output = output_config(&args.output, None);
    let config = grid_config_from_opts(&args.grid);
    let stage = pipeline::run_grid(&config, &output)?;
    print!("{}", format_grid_summary(&stage.grid, &stage.warnings));
    Ok(())
}

fn handle_fake(args: FakeArgs) -> Result<(), AppError> {
    let output = output_config(&args.output, None);
    let grid = pipeline::load_grid(&output, args.grid.as_deref())?;
    let config = fake_config_from_opts(&args.fake, &grid.filters)?;
    let fake = pipeline::run_fake(&grid, &config, &output)?;
    print!("{}", format_fake_summary(&fake.stats));
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let output = output_config(&args.output, args.chunk);
    let grid = pipeline::load_grid(&output, args.grid.as_deref())?;
    let dataset = pipeline::load_fake(&output, args.fake.as_deref())?;
    let config = fit_config_from_opts(&args.fit, DEFAULT_SIGMA);
    let display = display_config(&args.display);

    let stage = pipeline::run_fit(&grid, &dataset, &config, &output)?;
    print_fit(&stage.recovery, &stage.rows, &display);
    Ok(())
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = study_config_from_args(&args)?;
    let run = pipeline::run_study(&config)?;

    if let Some(stage) = &run.grid_stage {
        print!("{}", format_grid_summary(&stage.grid, &stage.warnings));
    }
    print!("{}", format_fake_summary(&run.fake.stats));
    print_fit(&run.fit.recovery, &run.fit.rows, &config.display);
    Ok(())
}

fn handle_split(args: SplitArgs) -> Result<(), AppError> {
    let output = output_config(&args.output, None);
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| output.shared_path("_fake.csv"));
    let parts = split_file(&input, args.chunk_size)?;
    println!("Split {} into {} part(s):", input.display(), parts.len());
    for part in &parts {
        println!("  {}", part.display());
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let output = output_config(&args.output, args.chunk);
    let display = display_config(&args.display);
    let grid = pipeline::load_grid(&output, None)?;
    let fake = read_fake(&output.shared_path("_fake.csv"))?;
    let rows = read_stats(&output.path("_stats.csv"))?;

    let recovery_svg = output.path("_recovery.svg");
    write_recovery_svg(&recovery_svg, &rows)?;
    println!("Wrote {}", recovery_svg.display());

    let (cut_band, cutoff) = cmd_cutoff(&grid, &fake, args.cut_band.as_deref(), args.cutoff)?;
    let cmd_svg = output.shared_path("_cmd.svg");
    write_cmd_svg(&cmd_svg, &grid, &fake, &cut_band, cutoff)?;
    println!("Wrote {}", cmd_svg.display());

    if display.plot {
        println!(
            "{}",
            render_recovery_plot(&rows, display.plot_param, display.plot_width, display.plot_height)
        );
    }
    Ok(())
}

/// Band and cutoff line for the colour-magnitude diagram.
///
/// Without an explicit cutoff the line sits at the faintest fake observation,
/// or at the faintest model when the dataset is empty.
fn cmd_cutoff(
    grid: &ModelGrid,
    fake: &FakeDataset,
    cut_band: Option<&str>,
    cutoff: Option<f64>,
) -> Result<(String, f64), AppError> {
    let same_filters = fake.filters.len() == grid.filters.len()
        && fake
            .filters
            .iter()
            .zip(&grid.filters)
            .all(|(a, b)| a.eq_ignore_ascii_case(b));
    if !same_filters {
        return Err(AppError::config(format!(
            "Fake dataset filters ({}) do not match grid filters ({}).",
            fake.filters.join(", "),
            grid.filters.join(", ")
        )));
    }

    let cut_band = cut_band
        .map(str::to_string)
        .or_else(|| grid.filters.last().cloned())
        .ok_or_else(|| AppError::config("Grid has no filters."))?;
    let cut = grid
        .filter_index(&cut_band)
        .ok_or_else(|| AppError::config(format!("Cutoff band '{cut_band}' is not a grid filter.")))?;
    if let Some(cutoff) = cutoff {
        return Ok((cut_band, cutoff));
    }

    let cutoff = faintest(fake.observations.iter().map(|o| o.mags[cut]))
        .or_else(|| faintest(grid.rows.iter().map(|r| r.mags[cut])))
        .ok_or_else(|| AppError::empty("Nothing to plot: grid and fake dataset are empty."))?;
    Ok((cut_band, cutoff))
}

fn faintest(mags: impl Iterator<Item = f64>) -> Option<f64> {
    mags.filter(|m| m.is_finite())
        .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))))
}

fn print_fit(recovery: &RecoveryStats, rows: &[SummaryRow], display: &DisplayConfig) {
    print!(
        "{}",
        format_fit_summary(recovery, rows, display.plot_param, display.top_n)
    );
    if display.plot {
        println!(
            "{}",
            render_recovery_plot(rows, display.plot_param, display.plot_width, display.plot_height)
        );
    }
}

fn output_config(args: &OutputArgs, chunk: Option<usize>) -> OutputConfig {
    OutputConfig {
        chunk,
        ..OutputConfig::new(args.project.clone(), args.outdir.clone())
    }
}

pub fn grid_config_from_opts(opts: &GridOpts) -> GridConfig {
    GridConfig {
        isochrones: opts.isochrones.clone(),
        log_ages: expand(&opts.log_ages),
        zs: expand(&opts.zs),
        masses: opts.masses.as_deref().map(expand),
        avs: expand(&opts.av),
        rvs: expand(&opts.rv),
        fbumps: expand(&opts.fbump),
        filters: opts.filters.clone(),
        filter_file: opts.filter_file.clone(),
        spectral_library: opts.spectral_library.clone(),
        distance_modulus: opts.distance_modulus,
    }
}

/// The cutoff band defaults to the last filter.
pub fn fake_config_from_opts(opts: &FakeOpts, filters: &[String]) -> Result<FakeConfig, AppError> {
    let cut_band = opts
        .cut_band
        .clone()
        .or_else(|| filters.last().cloned())
        .ok_or_else(|| AppError::config("No filters to apply the cutoff to."))?;
    Ok(FakeConfig {
        seed: opts.seed,
        draws: opts.draws,
        sigma: opts.sigma,
        cutoff: opts.cutoff,
        cut_band,
    })
}

/// `default_sigma` applies when `--fit-sigma` is absent.
pub fn fit_config_from_opts(opts: &FitOpts, default_sigma: f64) -> FitConfig {
    FitConfig {
        sigma: opts.fit_sigma.unwrap_or(default_sigma),
        sigma_floor: opts.sigma_floor,
        ast_file: opts.ast_file.clone(),
        threshold: (!opts.keep_all).then_some(opts.threshold),
    }
}

pub fn display_config(opts: &DisplayOpts) -> DisplayConfig {
    DisplayConfig {
        plot: opts.plot,
        plot_param: opts.plot_param,
        plot_width: opts.width,
        plot_height: opts.height,
        top_n: opts.top,
    }
}

/// Resolve a `run` invocation; the fitter assumes the fake noise level unless told otherwise.
pub fn study_config_from_args(args: &RunArgs) -> Result<StudyConfig, AppError> {
    let grid = grid_config_from_opts(&args.grid);
    let fake = fake_config_from_opts(&args.fake, &grid.filters)?;
    let fit = fit_config_from_opts(&args.fit, fake.sigma);
    Ok(StudyConfig {
        output: output_config(&args.output, None),
        grid,
        fake,
        fit,
        display: display_config(&args.display),
        reuse_grid: args.reuse_grid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec![
            "sedsens",
            "run",
            "--isochrones",
            "iso.csv",
            "--log-ages",
            "7:8:1",
            "--zs",
            "0.019",
        ];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_resolves_defaults() {
        let config = study_config_from_args(&run_args(&[])).unwrap();
        assert_eq!(config.grid.log_ages, vec![7.0, 8.0]);
        assert_eq!(config.grid.masses, None);
        assert_eq!(config.fake.cut_band, "F814W");
        assert_eq!(config.fit.sigma, config.fake.sigma);
        assert_eq!(config.fit.threshold, Some(-10.0));
        assert_eq!(config.output.path("_grid.csv"), std::path::PathBuf::from("./sedsens/sedsens_grid.csv"));
    }

    fn fake_of(grid: &ModelGrid, ids: &[usize]) -> FakeDataset {
        FakeDataset {
            filters: grid.filters.clone(),
            observations: ids
                .iter()
                .map(|&i| crate::domain::FakeObservation {
                    id: format!("fake-{i}"),
                    model_id: i,
                    mags: grid.rows[i].mags.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn cmd_cutoff_defaults_to_faintest_observation() {
        let grid = crate::data::fake::tests::ramp_grid(10);
        let fake = fake_of(&grid, &[2, 6]);
        let (band, cutoff) = cmd_cutoff(&grid, &fake, None, None).unwrap();
        assert_eq!(band, "F814W");
        assert_eq!(cutoff, grid.rows[6].mags[1]);
        assert_eq!(cmd_cutoff(&grid, &fake, Some("F475W"), Some(21.0)).unwrap().1, 21.0);
        assert!(cmd_cutoff(&grid, &fake, Some("F160W"), None).is_err());
    }

    #[test]
    fn cmd_cutoff_handles_empty_and_mismatched_datasets() {
        let grid = crate::data::fake::tests::ramp_grid(10);
        let empty = fake_of(&grid, &[]);
        let (_, cutoff) = cmd_cutoff(&grid, &empty, None, None).unwrap();
        assert_eq!(cutoff, grid.rows[9].mags[1]);

        let mut narrow = fake_of(&grid, &[3]);
        narrow.filters.truncate(1);
        for obs in &mut narrow.observations {
            obs.mags.truncate(1);
        }
        let err = cmd_cutoff(&grid, &narrow, None, None).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn run_honours_overrides() {
        let config = study_config_from_args(&run_args(&[
            "--keep-all",
            "--fit-sigma",
            "0.1",
            "--cut-band",
            "F475W",
            "--masses",
            "1,2",
            "--project",
            "deep",
        ]))
        .unwrap();
        assert_eq!(config.fit.threshold, None);
        assert_eq!(config.fit.sigma, 0.1);
        assert_eq!(config.fake.cut_band, "F475W");
        assert_eq!(config.grid.masses, Some(vec![1.0, 2.0]));
        assert_eq!(config.output.project, "deep");
    }
}
