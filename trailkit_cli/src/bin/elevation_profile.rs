use std::fs::File;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trailkit::{samples_from_path, ElevationSample};

/// Canvas size in pixels: 17x6 inches at 300 DPI.
const CANVAS: (u32, u32) = (5100, 1800);
/// Pixels per typographic point at 300 DPI.
const PX_PER_PT: f64 = 300.0 / 72.0;
/// The area fill reaches this far below the lowest elevation.
const FILL_DROP_M: f64 = 10.0;

const SKY_FILL: RGBColor = RGBColor(135, 206, 250);
const GRID_GRAY: RGBColor = RGBColor(176, 176, 176);

#[derive(Parser, Debug)]
#[command(author, version, about = "Render a GPX track as an elevation-vs-distance chart", long_about = None)]
struct Cli {
    /// GPX track file
    #[arg(value_hint = ValueHint::FilePath)]
    track: Option<PathBuf>,

    /// Output PNG path
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Also dump the (distance, elevation) samples as CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Exit non-zero when profiling fails
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let (Some(track), Some(output)) = (cli.track.as_deref(), cli.output.as_deref()) else {
        println!("Usage: elevation_profile <track.gpx> <output.png>");
        println!();
        println!("Example: elevation_profile my_route.gpx elevation_profile.png");
        return ExitCode::from(1);
    };

    match run(track, output, cli.csv.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            if cli.strict {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

fn run(track: &Path, output: &Path, csv: Option<&Path>) -> Result<()> {
    let samples = samples_from_path(track)
        .with_context(|| format!("cannot profile {}", track.display()))?;
    info!(
        "{}: {} samples over {:.2} km",
        track.display(),
        samples.len(),
        samples.last().map(|s| s.distance_km).unwrap_or(0.0)
    );

    if let Some(csv_path) = csv {
        write_samples_csv(&samples, csv_path)?;
        info!("Wrote sample CSV: {}", csv_path.display());
    }

    render_chart_guard(&samples, output)
        .map_err(|reason| anyhow!("failed to render {}: {}", output.display(), reason))?;
    info!("Wrote chart: {}", output.display());
    Ok(())
}

fn write_samples_csv(samples: &[ElevationSample], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["distance_km", "elevation_m"])?;
    for sample in samples {
        writer.write_record([
            format!("{:.6}", sample.distance_km),
            format!("{:.6}", sample.elevation_m),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Run the plotters render behind a panic guard. The bitmap context lives
/// inside the call, so it is dropped on success and failure alike.
fn render_chart_guard(samples: &[ElevationSample], path: &Path) -> Result<(), String> {
    let render =
        || draw_profile_chart(samples, path).map_err(|e| format!("plotting error: {}", e));
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn draw_profile_chart(samples: &[ElevationSample], path: &Path) -> Result<()> {
    let x_max = samples.last().map(|s| s.distance_km).unwrap_or(0.0);
    let (ele_min, ele_max) = samples.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), s| (lo.min(s.elevation_m), hi.max(s.elevation_m)),
    );
    let fill_floor = ele_min - FILL_DROP_M;

    // 5% data padding keeps the line and fill off the plot frame.
    let x_pad = (x_max * 0.05).max(0.05);
    let y_pad = (ele_max - fill_floor).max(1.0) * 0.05;
    let x_range = -x_pad..(x_max + x_pad);
    let y_range = (fill_floor - y_pad)..(ele_max + y_pad);

    let root = BitMapBackend::new(path, CANVAS).into_drawing_area();
    root.fill(&WHITE)?;

    let title_font = FontDesc::new(FontFamily::SansSerif, 14.0 * PX_PER_PT, FontStyle::Normal);
    let axis_font = FontDesc::new(FontFamily::SansSerif, 11.0 * PX_PER_PT, FontStyle::Normal);

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption("Profil Wysokości Trasy", title_font)
        .set_label_area_size(LabelAreaPosition::Left, 180)
        .set_label_area_size(LabelAreaPosition::Bottom, 140)
        .build_cartesian_2d(x_range.clone(), y_range.clone())?;

    let x_ticks = nice_ticks(x_range.start, x_range.end, 12);
    let y_ticks = nice_ticks(y_range.start, y_range.end, 8);

    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .bold_line_style(&TRANSPARENT)
        .x_labels(x_ticks.len().max(2))
        .y_labels(y_ticks.len().max(2))
        .x_desc("Dystans [km]")
        .y_desc("Wysokość [m]")
        .axis_desc_style(axis_font.clone().color(&BLACK))
        .label_style(axis_font.clone().color(&BLACK.mix(0.85)))
        .x_label_formatter(&|v| format_tick(*v))
        .y_label_formatter(&|v| format_tick(*v))
        .draw()?;

    // Mesh lines stay transparent; the grid is drawn dashed instead.
    let grid_style = ShapeStyle {
        color: GRID_GRAY.mix(0.6),
        filled: false,
        stroke_width: 3,
    };
    for &x in &x_ticks {
        chart.draw_series(DashedLineSeries::new(
            [(x, y_range.start), (x, y_range.end)],
            18,
            12,
            grid_style,
        ))?;
    }
    for &y in &y_ticks {
        chart.draw_series(DashedLineSeries::new(
            [(x_range.start, y), (x_range.end, y)],
            18,
            12,
            grid_style,
        ))?;
    }

    chart.draw_series(AreaSeries::new(
        samples.iter().map(|s| (s.distance_km, s.elevation_m)),
        fill_floor,
        SKY_FILL.mix(0.3),
    ))?;

    let line_style = ShapeStyle {
        color: BLUE.to_rgba(),
        filled: false,
        stroke_width: (2.0 * PX_PER_PT).round() as u32,
    };
    chart.draw_series(LineSeries::new(
        samples.iter().map(|s| (s.distance_km, s.elevation_m)),
        line_style,
    ))?;

    root.present()?;
    Ok(())
}

/// Round tick positions covering `[lo, hi]` with a 1-2-5 step, at most
/// `max_ticks` of them.
fn nice_ticks(lo: f64, hi: f64, max_ticks: usize) -> Vec<f64> {
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 || max_ticks == 0 {
        return Vec::new();
    }
    let magnitude = 10f64.powf((span / max_ticks as f64).log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| span / s <= max_ticks as f64)
        .unwrap_or(magnitude * 10.0);
    let mut ticks = Vec::new();
    let mut tick = (lo / step).ceil() * step;
    while tick <= hi + step * 1e-9 {
        ticks.push((tick / step).round() * step);
        tick += step;
    }
    ticks
}

fn format_tick(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    if (v - v.round()).abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}
