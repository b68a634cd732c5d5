//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - one-to-one line (perfect recovery): `-`
//! - recovered median vs truth per observation: `o`
//! - several observations in one cell: `#`

use crate::domain::{Param, SummaryRow};

/// Render recovered (p50) against true values of `param`.
pub fn render_recovery_plot(rows: &[SummaryRow], param: Param, width: usize, height: usize) -> String {
    let points: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| r.estimate(param))
        .filter(|e| e.truth.is_finite() && e.p50.is_finite())
        .map(|e| (e.truth, e.p50))
        .collect();
    render_plot(&points, param.label(), width, height)
}

fn render_plot(points: &[(f64, f64)], label: &str, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    // Shared range on both axes so the one-to-one line is the diagonal.
    let (lo, hi) = range(points).unwrap_or((0.0, 1.0));
    let (lo, hi) = pad_range(lo, hi, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    draw_line(
        &mut grid,
        map_x(lo, lo, hi, width),
        map_y(lo, lo, hi, height),
        map_x(hi, lo, hi, width),
        map_y(hi, lo, hi, height),
        '-',
    );

    for &(truth, recovered) in points {
        let x = map_x(truth, lo, hi, width);
        let y = map_y(recovered, lo, hi, height);
        grid[y][x] = match grid[y][x] {
            'o' | '#' => '#',
            _ => 'o',
        };
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {label} recovered (y) vs true (x) | range=[{lo:.3}, {hi:.3}] | n={}\n",
        points.len()
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for &(x, y) in points {
        min_v = min_v.min(x).min(y);
        max_v = max_v.max(x).max(y);
    }
    if min_v.is_finite() && max_v.is_finite() && max_v > min_v {
        Some((min_v, max_v))
    } else if min_v.is_finite() {
        Some((min_v - 0.5, min_v + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
