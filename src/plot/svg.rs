//! SVG figures written next to the run outputs.
//!
//! - recovery panels: recovered median (with the 16-84% interval) against the
//!   true value, one panel per parameter
//! - colour-magnitude diagram: grid models, fake observations and the cutoff
//!
//! Magnitudes are plotted as their negatives so brighter is up; tick labels
//! undo the sign.

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;

use crate::domain::{FakeDataset, ModelGrid, Param, SummaryRow};
use crate::error::AppError;

const PANEL_SIZE: (u32, u32) = (400, 360);

fn to_app_error(what: &str, path: &Path, e: Box<dyn Error>) -> AppError {
    AppError::config(format!("Failed to draw {what} '{}': {e}", path.display()))
}

/// Padded `(min, max)` of finite values, or `None` if there are none.
fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return None;
    }
    let pad = ((hi - lo) * 0.05).max(0.05);
    Some((lo - pad, hi + pad))
}

/// Recovered-vs-true panels for every parameter.
pub fn write_recovery_svg(path: &Path, rows: &[SummaryRow]) -> Result<(), AppError> {
    draw_recovery(path, rows).map_err(|e| to_app_error("recovery plot", path, e))?;
    log::debug!("wrote recovery plot to {}", path.display());
    Ok(())
}

fn draw_recovery(path: &Path, rows: &[SummaryRow]) -> Result<(), Box<dyn Error>> {
    let (cols, grid_rows) = (3u32, Param::ALL.len().div_ceil(3) as u32);
    let root = SVGBackend::new(path, (PANEL_SIZE.0 * cols, PANEL_SIZE.1 * grid_rows))
        .into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((grid_rows as usize, cols as usize));

    for (panel, param) in panels.iter().zip(Param::ALL) {
        let estimates: Vec<_> = rows
            .iter()
            .filter_map(|r| r.estimate(param))
            .filter(|e| e.truth.is_finite() && e.p50.is_finite())
            .collect();
        let Some((lo, hi)) = bounds(
            estimates
                .iter()
                .flat_map(|e| [e.truth, e.p16, e.p84]),
        ) else {
            continue;
        };

        let mut chart = ChartBuilder::on(panel)
            .caption(param.label(), ("sans-serif", 18))
            .margin(8)
            .x_label_area_size(30)
            .y_label_area_size(45)
            .build_cartesian_2d(lo..hi, lo..hi)?;
        chart
            .configure_mesh()
            .x_desc("true")
            .y_desc("recovered")
            .x_labels(5)
            .y_labels(5)
            .light_line_style(BLACK.mix(0.05))
            .draw()?;

        chart.draw_series(LineSeries::new([(lo, lo), (hi, hi)], BLACK.mix(0.5)))?;
        chart.draw_series(estimates.iter().map(|e| {
            PathElement::new(vec![(e.truth, e.p16), (e.truth, e.p84)], BLUE.mix(0.3))
        }))?;
        chart.draw_series(
            estimates
                .iter()
                .map(|e| Circle::new((e.truth, e.p50), 3, BLUE.filled())),
        )?;
    }

    root.present()?;
    Ok(())
}

/// Colour-magnitude diagram: `filters[0] - filters[last]` against the cut band.
pub fn write_cmd_svg(
    path: &Path,
    grid: &ModelGrid,
    fake: &FakeDataset,
    cut_band: &str,
    cutoff: f64,
) -> Result<(), AppError> {
    if grid.filters.len() < 2 {
        log::info!("skipping colour-magnitude diagram (needs two filters)");
        return Ok(());
    }
    let cut = grid.filter_index(cut_band).ok_or_else(|| {
        AppError::config(format!("Cutoff band '{cut_band}' is not a grid filter."))
    })?;
    draw_cmd(path, grid, fake, cut, cutoff).map_err(|e| to_app_error("colour-magnitude diagram", path, e))?;
    log::debug!("wrote colour-magnitude diagram to {}", path.display());
    Ok(())
}

fn draw_cmd(
    path: &Path,
    grid: &ModelGrid,
    fake: &FakeDataset,
    cut: usize,
    cutoff: f64,
) -> Result<(), Box<dyn Error>> {
    let (blue, red) = (0, grid.filters.len() - 1);
    let point = |mags: &[f64]| (mags[blue] - mags[red], -mags[cut]);
    let models: Vec<(f64, f64)> = grid.rows.iter().map(|r| point(r.mags.as_slice())).collect();
    let observed: Vec<(f64, f64)> = fake.observations.iter().map(|o| point(o.mags.as_slice())).collect();

    let all = models.iter().chain(&observed);
    let (Some((x0, x1)), Some((y0, y1))) = (
        bounds(all.clone().map(|p| p.0)),
        bounds(all.map(|p| p.1).chain(std::iter::once(-cutoff))),
    ) else {
        return Ok(());
    };

    let root = SVGBackend::new(path, (640, 640)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("colour-magnitude diagram", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc(format!("{} - {}", grid.filters[blue], grid.filters[red]))
        .y_desc(grid.filters[cut].as_str())
        .y_label_formatter(&|v| format!("{:.1}", -v))
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    chart
        .draw_series(models.iter().map(|&p| Circle::new(p, 1, BLACK.mix(0.25).filled())))?
        .label("grid")
        .legend(|(x, y)| Circle::new((x, y), 3, BLACK.mix(0.25).filled()));
    chart
        .draw_series(observed.iter().map(|&p| Circle::new(p, 2, RED.filled())))?
        .label("fake")
        .legend(|(x, y)| Circle::new((x, y), 3, RED.filled()));
    chart
        .draw_series(LineSeries::new([(x0, -cutoff), (x1, -cutoff)], BLUE))?
        .label(format!("cutoff {cutoff}"))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::LowerRight)
        .draw()?;

    root.present()?;
    Ok(())
}
