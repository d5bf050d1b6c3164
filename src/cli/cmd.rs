use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::thread;
use std::time::Duration;

use color_eyre::{Section, SectionExt};
use eyre::WrapErr;
use human_format::{Formatter, Scales};
use tracing as trc;

use widget_benchmark::{
    chart,
    compare::{compare, describe_outcome},
    stats::Summary,
    workload::{presets, ComponentPair, SyntheticComponent},
    BatchCollector, BatchReport, BenchConfig, Category, Comparison, PerformanceMetric,
    ReportExporter,
};

use super::{BatchArgs, CompareFilesArgs, RunArgs};

const BYTES_PER_MB: f64 = 1024. * 1024.;

/// Run one custom/native pair, export it and return its score
#[trc::instrument(skip(config, args), fields(preset = ?args.preset))]
pub fn run_pair(config: &BenchConfig, args: &RunArgs) -> eyre::Result<f64> {
    let pair = match &args.preset {
        Some(name) => find_preset(name)?,
        None => ComponentPair::new(
            &format!("{}_vs_{}", args.custom, args.native),
            &args.scenario,
            SyntheticComponent::new(&args.custom, Category::Custom)
                .with_fps(args.custom_fps)
                .with_allocation(args.custom_kb * 1024, 16)
                .with_busy_work(20_000)
                .with_seed(1),
            SyntheticComponent::new(&args.native, Category::Native)
                .with_fps(args.native_fps)
                .with_allocation(args.native_kb * 1024, 4)
                .with_busy_work(2_000)
                .with_seed(2),
        ),
    };
    let duration = recording_length(config, args.seconds)?;

    trc::info!(
        "Benchmarking {} against {} for {:.1}s each",
        pair.custom.name,
        pair.native.name,
        duration.as_secs_f64()
    );
    let run = pair
        .run(duration, config)
        .wrap_err_with(|| format!("Could not benchmark `{}`", pair.test_name))?;

    let comparison = &run.entry.comparison;
    let path = ReportExporter::from_config(config)
        .export_comparison(&pair.test_name, &run.custom, &run.native, comparison)
        .wrap_err("Could not export report")?;
    print_comparison(comparison);
    trc::info!("Report is in `{}`", path.display());

    if args.chart {
        draw_chart(&path, &pair.test_name, &run.custom, &run.native)?;
    }
    if args.json {
        write_json(&path, comparison)?;
    }

    Ok(comparison.score)
}

/// Run every preset, export a batch summary and return the average score
#[trc::instrument(skip(config, args))]
pub fn run_batch(config: &BenchConfig, args: &BatchArgs) -> eyre::Result<f64> {
    let duration = recording_length(config, args.seconds)?;
    let with_chart = args.chart;
    let pairs = presets();
    let exporter = ReportExporter::from_config(config);

    let collector = BatchCollector::new();
    let sender = collector.sender();

    // One pair at a time: concurrent pairs would share the process CPU figures
    let failures = thread::scope(|scope| {
        let pairs = &pairs;
        let exporter = &exporter;
        scope
            .spawn(move || {
                let mut failures = 0;
                for (i, pair) in pairs.iter().enumerate() {
                    trc::info!("Test {}/{}: {}", i + 1, pairs.len(), pair.test_name);
                    let run = match pair.run(duration, config) {
                        Ok(run) => run,
                        Err(e) => {
                            trc::error!("Benchmark `{}` failed: {}", pair.test_name, e);
                            failures += 1;
                            continue;
                        }
                    };

                    match exporter.export_comparison(
                        &pair.test_name,
                        &run.custom,
                        &run.native,
                        &run.entry.comparison,
                    ) {
                        Ok(path) => {
                            if with_chart {
                                if let Err(e) = draw_chart(&path, &pair.test_name, &run.custom, &run.native) {
                                    trc::warn!("{:?}", e);
                                }
                            }
                        }
                        Err(e) => trc::error!("Could not export `{}`: {}", pair.test_name, e),
                    }

                    sender.submit(run.entry);
                }
                failures
            })
            .join()
    })
    .map_err(|_| eyre::format_err!("Batch worker panicked"))?;

    let entries = collector.finish();
    if failures > 0 {
        trc::warn!("{} of {} benchmarks failed", failures, pairs.len());
    }

    let report = BatchReport::from_entries(&entries)
        .wrap_err("No benchmark in the batch succeeded")
        .suggestion("Run with `RUST_LOG=debug` to see why each benchmark failed")?;

    let path = ReportExporter::new(config.output_dir.join("batch_summaries"))
        .with_extension(&config.extension)
        .export_batch(&report)
        .wrap_err("Could not export batch summary")?;

    println!("{}", report.render_text());
    trc::info!("Batch summary is in `{}`", path.display());
    if args.json {
        write_json(&path, &report)?;
    }

    Ok(report.average_score)
}

/// Compare the custom rows of one report with the native rows of another
#[trc::instrument(skip(config, args), fields(custom = %args.custom.display(), native = %args.native.display()))]
pub fn compare_files(config: &BenchConfig, args: &CompareFilesArgs) -> eyre::Result<f64> {
    let custom = read_side(&args.custom, Category::Custom)?;
    let native = read_side(&args.native, Category::Native)?;

    let outcome = compare(&custom, &native);
    if outcome.is_err() {
        trc::warn!("{}", describe_outcome(&outcome));
    }
    let comparison = outcome.wrap_err("Could not compare reports")?;

    let test_name = "file_comparison";
    let path = ReportExporter::from_config(config)
        .export_comparison(test_name, &custom, &native, &comparison)
        .wrap_err("Could not export report")?;
    print_comparison(&comparison);
    trc::info!("Report is in `{}`", path.display());

    if args.chart {
        draw_chart(&path, test_name, &custom, &native)?;
    }
    if args.json {
        write_json(&path, &comparison)?;
    }

    Ok(comparison.score)
}

fn read_side(path: &Path, category: Category) -> eyre::Result<Vec<PerformanceMetric>> {
    let metrics = widget_benchmark::read_metrics(path)
        .wrap_err_with(|| format!("Could not read report `{}`", path.display()))
        .suggestion("Reports written by the `run` and `batch` commands can be read back")?;

    let side: Vec<PerformanceMetric> = metrics.into_iter().filter(|m| m.category == category).collect();
    trc::debug!(path = %path.display(), %category, rows = side.len(), "Read report side");
    Ok(side)
}

fn find_preset(name: &str) -> eyre::Result<ComponentPair> {
    let presets = presets();
    let names = presets
        .iter()
        .map(|p| p.test_name.clone())
        .collect::<Vec<_>>()
        .join("\n");

    presets
        .into_iter()
        .find(|p| p.test_name == name)
        .ok_or_else(|| eyre::format_err!("Unknown preset `{}`", name))
        .with_section(move || names.header("Presets:"))
}

fn recording_length(config: &BenchConfig, seconds: Option<f64>) -> eyre::Result<Duration> {
    match seconds {
        None => Ok(config.recording_length()),
        Some(s) if s.is_finite() && s > 0. => Ok(Duration::from_secs_f64(s)),
        Some(s) => Err(eyre::format_err!("Recording length must be positive, got {}", s)),
    }
}

#[trc::instrument(level = "debug", skip(custom, native))]
fn draw_chart(
    report: &Path,
    title: &str,
    custom: &[PerformanceMetric],
    native: &[PerformanceMetric],
) -> eyre::Result<()> {
    let path = report.with_extension("svg");
    chart::render_comparison_chart(&path, title, custom, native).wrap_err("Could not draw chart")?;
    trc::info!("Chart is in `{}` and can be opened in a web browser", path.display());
    Ok(())
}

/// Write `value` as pretty JSON beside `report`
fn write_json<T: serde::Serialize>(report: &Path, value: &T) -> eyre::Result<()> {
    let path = report.with_extension("json");
    let file = File::create(&path).wrap_err_with(|| format!("Could not create `{}`", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).wrap_err("Could not write JSON")?;
    trc::info!("JSON is in `{}`", path.display());
    Ok(())
}

fn print_comparison(comparison: &Comparison) {
    println!("{}", comparison.render_text());

    let mut formatter = Formatter::new();
    formatter.with_scales(Scales::Binary()).with_units("B");
    for summary in [&comparison.custom, &comparison.native] {
        println!("{}", memory_line(&formatter, summary));
    }
}

fn memory_line(formatter: &Formatter, summary: &Summary) -> String {
    format!(
        "{:<7} memory: {} avg, {} peak",
        summary.category.as_str(),
        formatter.format(summary.memory.avg * BYTES_PER_MB),
        formatter.format(summary.memory.max * BYTES_PER_MB)
    )
}
