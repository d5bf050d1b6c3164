//! SVG comparison charts
//!
//! One panel per metric. Each panel shades the two-tailed p-value curve of
//! the custom (blue) and native (red) samples, marks both means and prints
//! the difference of the custom mean relative to the native one.

use std::error::Error;
use std::path::Path;

use criterion_stats::{Distribution, Tails};
use human_format::{Formatter, Scales};
use plotters::{coord::Shift, prelude::*};
use tracing as trc;

use crate::error::{BenchError, Result};
use crate::metrics::PerformanceMetric;

/// The height in pixels of each panel
static PANEL_HEIGHT: u32 = 400;

/// The width in pixels of each panel
static PANEL_WIDTH: u32 = 600;

const BYTES_PER_MB: f64 = 1024. * 1024.;

type DrawResult<T> = std::result::Result<T, Box<dyn Error>>;

/// A metric series to chart
struct Series<'a> {
    title: &'a str,
    x_desc: &'a str,
    /// Whether a larger custom mean is an improvement
    higher_is_better: bool,
    custom: Vec<f64>,
    native: Vec<f64>,
}

/// Draw the FPS, memory and CPU distributions of both sides into an SVG file
#[trc::instrument(skip(custom, native), fields(custom = custom.len(), native = native.len()))]
pub fn render_comparison_chart(
    path: &Path,
    title: &str,
    custom: &[PerformanceMetric],
    native: &[PerformanceMetric],
) -> Result<()> {
    if custom.len() < 2 || native.len() < 2 {
        return Err(BenchError::EmptyInput {
            what: "chart (two samples per side)",
        });
    }

    let series = [
        Series {
            title: "Frame Rate",
            x_desc: "FPS",
            higher_is_better: true,
            custom: custom.iter().map(|m| m.fps).collect(),
            native: native.iter().map(|m| m.fps).collect(),
        },
        Series {
            title: "Memory In Use",
            x_desc: "Memory",
            higher_is_better: false,
            custom: custom.iter().map(|m| m.memory_used_mb * BYTES_PER_MB).collect(),
            native: native.iter().map(|m| m.memory_used_mb * BYTES_PER_MB).collect(),
        },
        Series {
            title: "CPU Usage",
            x_desc: "CPU",
            higher_is_better: false,
            custom: custom.iter().map(|m| m.cpu_percent).collect(),
            native: native.iter().map(|m| m.cpu_percent).collect(),
        },
    ];

    if series
        .iter()
        .flat_map(|s| s.custom.iter().chain(&s.native))
        .any(|x| !x.is_finite())
    {
        return Err(BenchError::Chart("non-finite sample".to_string()));
    }

    draw(path, title, series).map_err(|e| BenchError::Chart(e.to_string()))?;
    trc::info!(path = %path.display(), "Chart written");
    Ok(())
}

fn draw(path: &Path, title: &str, series: [Series; 3]) -> DrawResult<()> {
    let root = SVGBackend::new(path, (PANEL_WIDTH * series.len() as u32, PANEL_HEIGHT))
        .into_drawing_area();
    root.fill(&WHITE)?;

    // Create a title area for the chart
    let (title_area, graph_area) = root.split_vertically(8.percent_height());
    title_area.draw_text(
        title,
        &TextStyle::from(
            ("Sans", title_area.relative_to_height(1.))
                .into_font()
                .color(&BLACK),
        ),
        (10, 5),
    )?;

    let mut memory_formatter = Formatter::new();
    memory_formatter.with_scales(Scales::Binary()).with_units("B");
    let fps_formatter = |x: &f64| format!("{:.1}", x);
    let memory_formatter = |x: &f64| memory_formatter.format(*x);
    let cpu_formatter = |x: &f64| format!("{:.1}%", x);
    let formatters: [&dyn Fn(&f64) -> String; 3] = [&fps_formatter, &memory_formatter, &cpu_formatter];

    let areas = graph_area.split_evenly((1, series.len()));
    for ((series, area), formatter) in series.into_iter().zip(&areas).zip(formatters) {
        graph_series(series, area, formatter)?;
    }

    root.present()?;
    Ok(())
}

fn sorted(mut data: Vec<f64>) -> Vec<f64> {
    data.sort_unstable_by(f64::total_cmp);
    data
}

fn graph_series(
    series: Series,
    drawing_area: &DrawingArea<SVGBackend<'_>, Shift>,
    x_label_formatter: &dyn Fn(&f64) -> String,
) -> DrawResult<()> {
    let custom = Distribution::from(sorted(series.custom).into_boxed_slice());
    let native = Distribution::from(sorted(series.native).into_boxed_slice());

    let mut x_min = custom.min().min(native.min());
    let mut x_max = custom.max().max(native.max());
    // A constant series still needs a visible axis
    if x_max - x_min < f64::EPSILON {
        x_min -= 1.;
        x_max += 1.;
    }

    let mut chart = ChartBuilder::on(drawing_area)
        .caption(series.title, ("Sans", 20))
        .set_label_area_size(LabelAreaPosition::Left, 40)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(5)
        .build_cartesian_2d(x_min..x_max, 0f64..1f64)?;

    chart
        .configure_mesh()
        .axis_desc_style(("Sans", 15))
        .y_desc("Probability")
        .x_desc(series.x_desc)
        .light_line_style(&TRANSPARENT)
        .x_label_formatter(x_label_formatter)
        .draw()?;

    let mean_label_x_offset = (x_max - x_min) / 20.;

    let mut draw_for_dist = |dist: &Distribution<f64>, color: &RGBColor, label: &str, label_pos: f64| -> DrawResult<()> {
        let mean = dist.mean();

        // Shaded probability indicator
        chart.draw_series(AreaSeries::new(
            dist.iter().map(|x| (*x, dist.p_value(*x, &Tails::Two))),
            0.,
            &color.mix(0.3),
        ))?;

        chart.draw_series(LineSeries::new(
            [(mean, 0f64), (mean, dist.p_value(mean, &Tails::Two))],
            color,
        ))?;

        chart.plotting_area().draw(&Text::new(
            format!("{} avg. {}", label, x_label_formatter(&mean)),
            (mean + mean_label_x_offset, label_pos),
            TextStyle::from(("Sans", 12).into_font()).color(color),
        ))?;

        Ok(())
    };

    draw_for_dist(&native, &RED, "Native", 0.5)?;
    draw_for_dist(&custom, &BLUE, "Custom", 0.7)?;

    let native_mean = native.mean();
    if native_mean != 0. {
        let percentage_diff = (custom.mean() - native_mean) / native_mean * 100.;
        let improved = if series.higher_is_better {
            percentage_diff > 0.
        } else {
            percentage_diff < 0.
        };

        let color = if percentage_diff.abs() < 2. {
            &BLACK
        } else if improved {
            // Dark green
            &RGBColor(0, 170, 0)
        } else {
            &RED
        };

        chart.plotting_area().draw(&Text::new(
            format!("{:+.2}%", percentage_diff),
            (native_mean + mean_label_x_offset, 0.6),
            TextStyle::from(("Sans", 20).into_font()).color(color),
        ))?;
    }

    Ok(())
}
