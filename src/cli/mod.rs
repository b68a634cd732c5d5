//! Command-line parsing for the SED sensitivity study.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the physics and fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::Param;

pub mod range;

pub use range::RangeArg;

/// Noise level assumed by `fit` when `--fit-sigma` is not given.
pub const DEFAULT_SIGMA: f64 = 0.05;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sedsens",
    version,
    about = "SED fitting sensitivity study: model grid, fake observations, likelihood fits"
)]
pub struct Cli {
    /// Size of the worker pool (defaults to one thread per core).
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the model grid from an isochrone table, a spectral library and a dust grid.
    Grid(GridArgs),
    /// Draw fake observations from an existing grid.
    Fake(FakeArgs),
    /// Fit a fake dataset (or one chunk of it) against the grid.
    Fit(FitArgs),
    /// Run grid, fake and fit in sequence.
    Run(RunArgs),
    /// Split an observation file into numbered chunks.
    Split(SplitArgs),
    /// Re-render plots from a finished run.
    Plot(PlotArgs),
}

/// Where outputs go.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Project name; outputs are `<outdir>/<project>/<project>_*`.
    #[arg(short = 'p', long, default_value = "sedsens")]
    pub project: String,

    /// Parent directory of the project directory.
    #[arg(short = 'o', long, default_value = ".")]
    pub outdir: PathBuf,
}

/// Model grid axes and inputs.
#[derive(Debug, Args, Clone)]
pub struct GridOpts {
    /// Isochrone table (CSV).
    #[arg(long, value_name = "CSV")]
    pub isochrones: PathBuf,

    /// log10(age/yr) values, each `v` or `start:stop:step`, comma separated.
    #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
    pub log_ages: Vec<RangeArg>,

    /// Metallicities (mass fraction Z).
    #[arg(long, value_delimiter = ',', required = true)]
    pub zs: Vec<RangeArg>,

    /// Initial masses (solar masses); defaults to every table-native mass.
    #[arg(long, value_delimiter = ',')]
    pub masses: Option<Vec<RangeArg>>,

    /// V-band extinction values.
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub av: Vec<RangeArg>,

    /// Total-to-selective extinction ratios.
    #[arg(long, value_delimiter = ',', default_value = "3.1")]
    pub rv: Vec<RangeArg>,

    /// Bump mixture fractions in [0, 1].
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub fbump: Vec<RangeArg>,

    /// Filters, in output column order.
    #[arg(long, value_delimiter = ',', default_values_t = [String::from("F475W"), String::from("F814W")])]
    pub filters: Vec<String>,

    /// Filter transmission curves (CSV: `wavelength_nm,<name>,...`); default is the built-in set.
    #[arg(long, value_name = "CSV")]
    pub filter_file: Option<PathBuf>,

    /// Tabulated spectral library (CSV); default is the blackbody library.
    #[arg(long, value_name = "CSV")]
    pub spectral_library: Option<PathBuf>,

    /// Distance modulus applied to every magnitude.
    #[arg(long, default_value_t = 24.47, allow_hyphen_values = true)]
    pub distance_modulus: f64,
}

/// Fake observation settings.
#[derive(Debug, Args, Clone)]
pub struct FakeOpts {
    /// Random seed; the same seed reproduces the same dataset.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of grid draws (with replacement) before the cutoff.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub draws: usize,

    /// Proportional noise level: observed = true * (1 + N(0, sigma)).
    #[arg(long, default_value_t = DEFAULT_SIGMA)]
    pub sigma: f64,

    /// Faintest observed magnitude kept in the cut band.
    #[arg(long, default_value_t = 28.0, allow_hyphen_values = true)]
    pub cutoff: f64,

    /// Band the cutoff applies to (default: the last filter).
    #[arg(long)]
    pub cut_band: Option<String>,
}

/// Likelihood fit settings.
#[derive(Debug, Args, Clone)]
pub struct FitOpts {
    /// Noise level assumed by the fitter (default: the fake `--sigma`).
    #[arg(long)]
    pub fit_sigma: Option<f64>,

    /// Magnitude uncertainty floor, added in quadrature.
    #[arg(long, default_value_t = 0.01)]
    pub sigma_floor: f64,

    /// Artificial star tests (CSV with `<band>_IN`/`<band>_OUT` columns).
    #[arg(long, value_name = "CSV")]
    pub ast_file: Option<PathBuf>,

    /// Keep models with `lnl - max_lnl >= threshold` in the likelihood file.
    #[arg(long, default_value_t = -10.0, allow_hyphen_values = true)]
    pub threshold: f64,

    /// Write the likelihood of every model instead of a thresholded subset.
    #[arg(long)]
    pub keep_all: bool,
}

/// Terminal presentation.
#[derive(Debug, Args, Clone)]
pub struct DisplayOpts {
    /// Render an ASCII recovered-vs-true plot in the terminal.
    #[arg(long)]
    pub plot: bool,

    /// Parameter shown in the terminal plot and worst-recovered list.
    #[arg(long, value_enum, default_value_t = Param::Av)]
    pub plot_param: Param,

    /// Plot width (columns).
    #[arg(long, default_value_t = 60)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Number of worst-recovered observations listed.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Args)]
pub struct GridArgs {
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub grid: GridOpts,
}

#[derive(Debug, Args)]
pub struct FakeArgs {
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub fake: FakeOpts,

    /// Grid CSV (default: the project grid).
    #[arg(long, value_name = "CSV")]
    pub grid: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FitArgs {
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub fit: FitOpts,
    #[command(flatten)]
    pub display: DisplayOpts,

    /// Grid CSV (default: the project grid).
    #[arg(long, value_name = "CSV")]
    pub grid: Option<PathBuf>,

    /// Fake dataset CSV (default: the project fake dataset).
    #[arg(long, value_name = "CSV")]
    pub fake: Option<PathBuf>,

    /// Fit only part `k` of a split dataset.
    #[arg(long)]
    pub chunk: Option<usize>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub grid: GridOpts,
    #[command(flatten)]
    pub fake: FakeOpts,
    #[command(flatten)]
    pub fit: FitOpts,
    #[command(flatten)]
    pub display: DisplayOpts,

    /// Load the project's existing grid instead of rebuilding it.
    #[arg(long)]
    pub reuse_grid: bool,
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// Observation CSV to split (default: the project fake dataset).
    #[arg(long, value_name = "CSV")]
    pub input: Option<PathBuf>,

    /// Maximum observations per part; 0 leaves the file unsplit.
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,
}

#[derive(Debug, Args)]
pub struct PlotArgs {
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub display: DisplayOpts,

    /// Read the summary table of part `k`.
    #[arg(long)]
    pub chunk: Option<usize>,

    /// Band of the magnitude axis and cutoff line (default: the last filter).
    #[arg(long)]
    pub cut_band: Option<String>,

    /// Cutoff line drawn on the colour-magnitude diagram.
    #[arg(long, allow_hyphen_values = true)]
    pub cutoff: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_run_with_ranges() {
        let cli = Cli::parse_from([
            "sedsens",
            "run",
            "--isochrones",
            "iso.csv",
            "--log-ages",
            "7:8:0.5,9",
            "--zs",
            "0.019",
            "--av",
            "0:1:0.5",
            "--filters",
            "F336W,F814W",
            "--threads",
            "2",
        ]);
        assert_eq!(cli.threads, Some(2));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(range::expand(&args.grid.log_ages), vec![7.0, 7.5, 8.0, 9.0]);
        assert_eq!(range::expand(&args.grid.av), vec![0.0, 0.5, 1.0]);
        assert_eq!(range::expand(&args.grid.rv), vec![3.1]);
        assert_eq!(args.grid.filters, vec!["F336W", "F814W"]);
        assert_eq!(args.fit.threshold, -10.0);
        assert!(!args.reuse_grid);
    }

    #[test]
    fn default_filters_and_fit_options() {
        let cli = Cli::parse_from(["sedsens", "grid", "--isochrones", "i.csv", "--log-ages", "7", "--zs", "0.019"]);
        let Command::Grid(args) = cli.command else {
            panic!("expected grid");
        };
        assert_eq!(args.grid.filters, vec!["F475W", "F814W"]);
        assert_eq!(args.output.project, "sedsens");

        let cli = Cli::parse_from(["sedsens", "fit", "--chunk", "3", "--keep-all"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.chunk, Some(3));
        assert!(args.fit.keep_all);
        assert_eq!(args.fit.fit_sigma, None);
    }
}
