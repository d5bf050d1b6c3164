use std::path::PathBuf;

use argh::FromArgs;
use thiserror::Error;
use tracing as trc;

use widget_benchmark::BenchConfig;

mod cmd;

/// Exit code used when a score falls below `--fail-under`
static FAIL_UNDER_EXIT_CODE: i32 = 2;

/// An error that indicates that the program should exit with the given code
#[derive(Error, Debug)]
#[error("Program exited {0}")]
struct Exit(i32);

#[derive(FromArgs)]
/// Measure custom widgets against native ones.
struct Args {
    /// path to a TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// directory reports are written to
    #[argh(option, short = 'o')]
    output_dir: Option<PathBuf>,

    /// sampler interval in milliseconds
    #[argh(option)]
    interval_ms: Option<u64>,

    /// report extension, `csv` or `tsv`
    #[argh(option)]
    extension: Option<String>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArgs),
    Batch(BatchArgs),
    CompareFiles(CompareFilesArgs),
}

#[derive(FromArgs)]
/// Measure one synthetic custom widget against a native one.
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// run a preset pair by test name instead of the component options
    #[argh(option)]
    preset: Option<String>,

    /// custom component name
    #[argh(option, default = "String::from(\"CustomWidget\")")]
    custom: String,

    /// native component name
    #[argh(option, default = "String::from(\"NativeWidget\")")]
    native: String,

    /// scenario label
    #[argh(option, default = "String::from(\"static_render\")")]
    scenario: String,

    /// seconds to record each component
    #[argh(option)]
    seconds: Option<f64>,

    /// frame rate the custom component paces itself to
    #[argh(option, default = "60.")]
    custom_fps: f64,

    /// frame rate the native component paces itself to
    #[argh(option, default = "60.")]
    native_fps: f64,

    /// kilobytes the custom component allocates per frame
    #[argh(option, default = "16")]
    custom_kb: usize,

    /// kilobytes the native component allocates per frame
    #[argh(option, default = "2")]
    native_kb: usize,

    /// also draw an SVG chart next to the report
    #[argh(switch)]
    chart: bool,

    /// also write the comparison as JSON next to the report
    #[argh(switch)]
    json: bool,

    /// exit with code 2 if the score is below this value
    #[argh(option)]
    fail_under: Option<f64>,
}

#[derive(FromArgs)]
/// Run every preset pair and write a batch summary.
#[argh(subcommand, name = "batch")]
struct BatchArgs {
    /// seconds to record each component
    #[argh(option)]
    seconds: Option<f64>,

    /// also draw an SVG chart for every pair
    #[argh(switch)]
    chart: bool,

    /// also write the batch report as JSON next to the summary
    #[argh(switch)]
    json: bool,

    /// exit with code 2 if the average score is below this value
    #[argh(option)]
    fail_under: Option<f64>,
}

#[derive(FromArgs)]
/// Compare two previously exported reports.
#[argh(subcommand, name = "compare-files")]
struct CompareFilesArgs {
    /// report holding the custom component's metrics
    #[argh(positional)]
    custom: PathBuf,

    /// report holding the native component's metrics
    #[argh(positional)]
    native: PathBuf,

    /// also draw an SVG chart next to the report
    #[argh(switch)]
    chart: bool,

    /// also write the comparison as JSON next to the report
    #[argh(switch)]
    json: bool,

    /// exit with code 2 if the score is below this value
    #[argh(option)]
    fail_under: Option<f64>,
}

/// Load the config file, then apply command line overrides
fn load_config(args: &Args) -> eyre::Result<BenchConfig> {
    use eyre::WrapErr;

    let mut config = match &args.config {
        Some(path) => BenchConfig::load(path)
            .wrap_err_with(|| format!("Could not load config `{}`", path.display()))?,
        None => BenchConfig::default(),
    };

    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(interval) = args.interval_ms {
        config.sample_interval_ms = interval;
    }
    if let Some(extension) = &args.extension {
        config.extension = extension.clone();
    }

    trc::debug!(?config, "Loaded configuration");
    Ok(config)
}

fn check_threshold(score: f64, fail_under: Option<f64>) -> eyre::Result<()> {
    match fail_under {
        Some(threshold) if score < threshold => {
            trc::error!("Score {:.1} is below the required {:.1}", score, threshold);
            Err(Exit(FAIL_UNDER_EXIT_CODE).into())
        }
        _ => Ok(()),
    }
}

/// Start program logic
fn start() -> eyre::Result<()> {
    let args: Args = trc::debug_span!("Parsing commandline args").in_scope(|| argh::from_env());
    let config = load_config(&args)?;

    match args.command {
        Command::Run(run) => {
            let score = cmd::run_pair(&config, &run)?;
            check_threshold(score, run.fail_under)
        }
        Command::Batch(batch) => {
            let average = cmd::run_batch(&config, &batch)?;
            check_threshold(average, batch.fail_under)
        }
        Command::CompareFiles(files) => {
            let score = cmd::compare_files(&config, &files)?;
            check_threshold(score, files.fail_under)
        }
    }
}

/// Run the ClI
pub fn run() {
    // Install tracing for logs
    install_tracing();
    // Install color error printing
    if let Err(e) = color_eyre::install() {
        eprintln!("Could not install error handler: {}", e);
    }

    // Start the application and capture errors
    match start() {
        // Do nothing for happy runs!
        Ok(()) => (),
        // Handle errors
        Err(report) => {
            // If the error is an exit code
            if let Some(e) = report.downcast_ref::<Exit>() {
                let code = e.0;

                // If the code is zero, exit cleanly
                if code == 0 {
                    std::process::exit(0);

                // If the code is non-zero print the error and then exit with that code
                } else {
                    trc::error!("{:?}", report);
                    std::process::exit(code);
                }
            // If the error is any other kind of error print it and exit 1
            } else {
                trc::error!("{:?}", report);
                std::process::exit(1);
            }
        }
    }
}

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    // Build the tracing layers
    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Add all of the layers to the subscriber and initialize it
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}
