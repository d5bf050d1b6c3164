//! Delimited text reports
//!
//! A report is a header row, one row per metric, a blank separator, and a
//! free-form summary section whose shape depends on the [`ReportPayload`].
//! Only the metric table is meant to be read back ([`read_metrics`]).
//!
//! Files are written in place. A failure halfway through leaves a partial
//! file behind.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use chrono::{Local, NaiveDateTime, TimeZone};
use tracing as trc;

use crate::batch::BatchReport;
use crate::compare::{Comparison, MetricDelta};
use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::metrics::{Category, PerformanceMetric, SystemInfo};
use crate::stats::{SessionSummary, Summary};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const FILENAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Metric table columns, in order
pub const HEADER: [&str; 14] = [
    "timestamp",
    "component",
    "category",
    "scenario",
    "fps",
    "memory_used_mb",
    "memory_allocated_mb",
    "gc_count",
    "gc_time_ms",
    "cpu_percent",
    "render_time_ms",
    "update_time_ms",
    "workers",
    "cores",
];

/// What goes in the summary section after the metric table
#[derive(Clone, Copy, Debug)]
pub enum ReportPayload<'a> {
    None,
    /// Plain session summary with a performance evaluation
    Session(&'a SessionSummary),
    /// Comparison result only
    Comparison {
        test_name: &'a str,
        comparison: &'a Comparison,
    },
    /// Detailed custom and native summaries followed by the comparison
    Paired {
        test_name: &'a str,
        comparison: &'a Comparison,
    },
}

/// Writes reports into one directory
#[derive(Clone, Debug)]
pub struct ReportExporter {
    dir: PathBuf,
    prefix: String,
    extension: String,
    filename: Option<String>,
}

impl ReportExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ReportExporter {
            dir: dir.into(),
            prefix: "benchmark".to_string(),
            extension: "csv".to_string(),
            filename: None,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(&config.output_dir)
            .with_prefix(&config.file_prefix)
            .with_extension(&config.extension)
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// `tsv` switches the delimiter to a tab, anything else uses commas
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Use a fixed file name instead of a timestamped one. The extension is
    /// appended when the file is named if missing.
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn delimiter(&self) -> char {
        delimiter_for(&self.extension)
    }

    /// Path the next report will be written to
    pub fn path(&self) -> PathBuf {
        self.dir.join(self.file_name(&self.prefix))
    }

    fn file_name(&self, prefix: &str) -> String {
        match &self.filename {
            Some(name) if name.ends_with(&format!(".{}", self.extension)) => name.clone(),
            Some(name) => format!("{}.{}", name, self.extension),
            None => format!(
                "{}_{}.{}",
                prefix,
                Local::now().format(FILENAME_TIME_FORMAT),
                self.extension
            ),
        }
    }

    /// Write metrics and a summary section to a new report file
    pub fn export(&self, metrics: &[PerformanceMetric], payload: ReportPayload) -> Result<PathBuf> {
        if metrics.is_empty() {
            return Err(BenchError::EmptyInput { what: "export" });
        }
        let path = self.path();
        self.write_file(&path, |out| self.write_report(out, metrics, payload))?;
        trc::info!(path = %path.display(), rows = metrics.len(), "Report exported");
        Ok(path)
    }

    /// Export both sides of a comparison with the paired summary
    pub fn export_comparison(
        &self,
        test_name: &str,
        custom: &[PerformanceMetric],
        native: &[PerformanceMetric],
        comparison: &Comparison,
    ) -> Result<PathBuf> {
        let metrics: Vec<PerformanceMetric> = custom.iter().chain(native).cloned().collect();
        let exporter = self.clone().with_prefix("comparison");
        exporter.export(
            &metrics,
            ReportPayload::Paired {
                test_name,
                comparison,
            },
        )
    }

    /// Export only the summary section, without a metric table
    pub fn export_summary_only(&self, payload: ReportPayload) -> Result<PathBuf> {
        let path = self.dir.join(self.file_name("summary"));
        self.write_file(&path, |out| {
            let mut rows = RowWriter::new(out, self.delimiter());
            write_payload(&mut rows, payload)
        })?;
        trc::info!(path = %path.display(), "Summary exported");
        Ok(path)
    }

    pub fn export_batch(&self, report: &BatchReport) -> Result<PathBuf> {
        let path = self.dir.join(self.file_name("batch_summary"));
        self.write_file(&path, |out| {
            let mut rows = RowWriter::new(out, self.delimiter());
            write_batch(&mut rows, report)
        })?;
        trc::info!(path = %path.display(), tests = report.lines.len(), "Batch summary exported");
        Ok(path)
    }

    /// Write a full report to any writer
    pub fn write_report<W: Write>(
        &self,
        out: W,
        metrics: &[PerformanceMetric],
        payload: ReportPayload,
    ) -> io::Result<()> {
        let mut rows = RowWriter::new(out, self.delimiter());
        rows.row(HEADER)?;
        for metric in metrics {
            rows.row(metric_fields(metric))?;
        }
        write_payload(&mut rows, payload)
    }

    fn write_file(
        &self,
        path: &Path,
        write: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| BenchError::io(&self.dir, e))?;
        let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
        let mut out = BufWriter::new(file);
        write(&mut out).map_err(|e| BenchError::io(path, e))?;
        out.flush().map_err(|e| BenchError::io(path, e))
    }
}

fn delimiter_for(extension: &str) -> char {
    if extension.eq_ignore_ascii_case("tsv") {
        '\t'
    } else {
        ','
    }
}

fn metric_fields(metric: &PerformanceMetric) -> [String; 14] {
    [
        metric.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        metric.component.clone(),
        metric.category.to_string(),
        metric.scenario.clone(),
        format!("{:.2}", metric.fps),
        format!("{:.2}", metric.memory_used_mb),
        format!("{:.2}", metric.memory_allocated_mb),
        metric.gc_count.to_string(),
        format!("{:.2}", metric.gc_time_ms),
        format!("{:.2}", metric.cpu_percent),
        format!("{:.2}", metric.render_time_ms),
        format!("{:.2}", metric.update_time_ms),
        metric.workers.to_string(),
        metric.cores.to_string(),
    ]
}

/// Line-oriented writer that quotes fields containing the delimiter
struct RowWriter<W> {
    out: W,
    delimiter: char,
}

impl<W: Write> RowWriter<W> {
    fn new(out: W, delimiter: char) -> Self {
        RowWriter { out, delimiter }
    }

    fn row<I, S>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = String::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            let field = field.as_ref();
            if field.contains(|c: char| c == self.delimiter || c == '"' || c == '\n' || c == '\r') {
                line.push('"');
                line.push_str(&field.replace('"', "\"\""));
                line.push('"');
            } else {
                line.push_str(field);
            }
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())
    }

    fn pair(&mut self, key: &str, value: impl AsRef<str>) -> io::Result<()> {
        self.row([key, value.as_ref()])
    }

    fn title(&mut self, title: &str) -> io::Result<()> {
        self.row([title])
    }

    fn blank(&mut self) -> io::Result<()> {
        self.out.write_all(b"\n")
    }
}

fn write_payload<W: Write>(rows: &mut RowWriter<W>, payload: ReportPayload) -> io::Result<()> {
    if let ReportPayload::None = payload {
        return Ok(());
    }

    rows.blank()?;
    rows.title("=== Benchmark summary ===")?;
    match payload {
        ReportPayload::None => Ok(()),
        ReportPayload::Session(summary) => write_session(rows, summary),
        ReportPayload::Comparison {
            test_name,
            comparison,
        } => write_comparison(rows, test_name, comparison),
        ReportPayload::Paired {
            test_name,
            comparison,
        } => write_paired(rows, test_name, comparison),
    }
}

fn write_session<W: Write>(rows: &mut RowWriter<W>, s: &SessionSummary) -> io::Result<()> {
    rows.pair("Test name", &s.test_name)?;
    rows.pair("Component", &s.component)?;
    rows.pair("Category", s.category.as_str())?;
    rows.pair("Scenario", &s.scenario)?;
    rows.pair("Samples", s.total_samples.to_string())?;
    rows.pair("Duration", format!("{:.1} s", s.duration_secs))?;
    rows.pair("Total frames", s.total_frames.to_string())?;

    rows.blank()?;
    rows.title("=== Performance statistics ===")?;
    rows.pair("Average FPS", format!("{:.2}", s.fps.avg))?;
    rows.pair("Min FPS", format!("{:.2}", s.fps.min))?;
    rows.pair("Max FPS", format!("{:.2}", s.fps.max))?;
    rows.pair("FPS std dev", format!("{:.2}", s.fps.std_dev))?;
    rows.blank()?;
    rows.pair("Average memory (MB)", format!("{:.2}", s.memory.avg))?;
    rows.pair("Min memory (MB)", format!("{:.2}", s.memory.min))?;
    rows.pair("Max memory (MB)", format!("{:.2}", s.memory.max))?;
    rows.pair("Memory std dev", format!("{:.2}", s.memory.std_dev))?;
    rows.blank()?;
    rows.pair("Average CPU (%)", format!("{:.2}", s.cpu.avg))?;
    rows.pair("CPU std dev", format!("{:.2}", s.cpu.std_dev))?;

    write_system(rows, &s.system)?;

    let evaluation = Evaluation::new(s.fps.avg, s.memory.avg, s.cpu.avg);
    rows.blank()?;
    rows.title("=== Performance evaluation ===")?;
    rows.pair("Evaluation", evaluation.overall)?;
    rows.pair("FPS", &evaluation.fps)?;
    rows.pair("Memory", &evaluation.memory)?;
    rows.pair("CPU", &evaluation.cpu)?;
    if !evaluation.suggestions.is_empty() {
        rows.blank()?;
        rows.title("Suggestions")?;
        for suggestion in &evaluation.suggestions {
            rows.pair("•", suggestion)?;
        }
    }
    Ok(())
}

fn write_comparison<W: Write>(rows: &mut RowWriter<W>, test_name: &str, c: &Comparison) -> io::Result<()> {
    rows.pair("Test name", test_name)?;
    rows.pair("Test type", "comparison")?;
    rows.blank()?;
    rows.title("=== Comparison result ===")?;
    rows.pair("Performance score", format!("{:.1}/100", c.score))?;
    rows.pair("FPS ratio", format!("{:.3}", c.fps.ratio))?;
    rows.pair("Memory ratio", format!("{:.3}", c.memory.ratio))?;
    rows.pair("CPU ratio", format!("{:.3}", c.cpu.ratio))?;
    rows.blank()?;
    rows.pair("FPS difference", format!("{:.1}%", c.fps.diff_percent))?;
    rows.pair("Memory difference", format!("{:.1}%", c.memory.diff_percent))?;
    rows.pair("CPU difference", format!("{:.1}%", c.cpu.diff_percent))?;

    write_significance(rows, c)?;

    rows.blank()?;
    rows.title("=== Grades ===")?;
    rows.pair("FPS", c.fps.grade.as_str())?;
    rows.pair("Memory", c.memory.grade.as_str())?;
    rows.pair("CPU", c.cpu.grade.as_str())?;

    write_conclusion(rows, c)?;
    write_system(rows, &SystemInfo::current())
}

fn write_paired<W: Write>(rows: &mut RowWriter<W>, test_name: &str, c: &Comparison) -> io::Result<()> {
    rows.pair("Test name", test_name)?;
    rows.pair("Test type", "paired comparison")?;

    for summary in [&c.custom, &c.native] {
        rows.blank()?;
        let title = match summary.category {
            Category::Custom => "=== Custom component ===",
            Category::Native => "=== Native component ===",
        };
        rows.title(title)?;
        write_component(rows, summary)?;
    }

    rows.blank()?;
    rows.title("=== Comparison analysis ===")?;
    for (name, delta) in [("FPS", &c.fps), ("Memory", &c.memory), ("CPU", &c.cpu)] {
        write_delta(rows, name, delta)?;
    }
    rows.blank()?;
    rows.pair("Performance score", format!("{:.1}/100", c.score))?;

    write_significance(rows, c)?;
    write_conclusion(rows, c)?;
    write_system(rows, &SystemInfo::current())
}

fn write_component<W: Write>(rows: &mut RowWriter<W>, s: &Summary) -> io::Result<()> {
    rows.pair("Category", s.category.as_str())?;
    rows.pair("Samples", s.sample_count.to_string())?;
    for (name, unit, stats) in [("FPS", "", &s.fps), ("Memory", " (MB)", &s.memory), ("CPU", " (%)", &s.cpu)] {
        rows.blank()?;
        rows.pair(&format!("Average {}{}", name, unit), format!("{:.2}", stats.avg))?;
        rows.pair(&format!("{} range", name), format!("{:.2}-{:.2}", stats.min, stats.max))?;
        rows.pair(&format!("{} std dev", name), format!("{:.2}", stats.std_dev))?;
        rows.pair(&format!("{} CV", name), format!("{:.1}%", stats.cv))?;
    }
    if let Some(low) = s.fps_low {
        rows.pair("FPS 5th percentile", format!("{:.2}", low))?;
    }
    Ok(())
}

fn write_delta<W: Write>(rows: &mut RowWriter<W>, name: &str, delta: &MetricDelta) -> io::Result<()> {
    rows.pair(&format!("{} ratio", name), format!("{:.3}", delta.ratio))?;
    rows.pair(&format!("{} difference", name), format!("{:.1}%", delta.diff_percent))?;
    rows.pair(&format!("{} grade", name), delta.grade.as_str())
}

fn write_significance<W: Write>(rows: &mut RowWriter<W>, c: &Comparison) -> io::Result<()> {
    rows.blank()?;
    rows.title("=== Significance ===")?;
    for (name, delta) in [("FPS", &c.fps), ("Memory", &c.memory), ("CPU", &c.cpu)] {
        rows.pair(&format!("{} significant", name), delta.significant.to_string())?;
        rows.pair(&format!("{} confidence", name), delta.confidence.as_str())?;
    }
    Ok(())
}

fn write_conclusion<W: Write>(rows: &mut RowWriter<W>, c: &Comparison) -> io::Result<()> {
    rows.blank()?;
    rows.title("=== Conclusion ===")?;
    rows.pair("Conclusion", &c.conclusion)
}

fn write_system<W: Write>(rows: &mut RowWriter<W>, info: &SystemInfo) -> io::Result<()> {
    rows.blank()?;
    rows.title("=== System ===")?;
    rows.pair("Crate version", &info.crate_version)?;
    rows.pair("Cores", info.cores.to_string())?;
    rows.pair("OS", &info.os)?;
    rows.pair("Architecture", &info.arch)
}

fn write_batch<W: Write>(rows: &mut RowWriter<W>, report: &BatchReport) -> io::Result<()> {
    let system = SystemInfo::current();
    rows.title("Batch benchmark summary")?;
    rows.pair("Generated", report.generated.format("%Y-%m-%d %H:%M:%S").to_string())?;
    rows.pair("Tests", report.lines.len().to_string())?;
    rows.pair(
        "System",
        format!(
            "{} {}, {} {}, {} cores",
            env!("CARGO_PKG_NAME"),
            system.crate_version,
            system.os,
            system.arch,
            system.cores
        ),
    )?;
    rows.blank()?;

    rows.row([
        "test_name",
        "custom_component",
        "native_component",
        "score",
        "fps_ratio",
        "memory_ratio",
        "cpu_ratio",
        "conclusion",
    ])?;
    for line in &report.lines {
        rows.row([
            line.test_name.clone(),
            line.custom_component.clone(),
            line.native_component.clone(),
            format!("{:.1}", line.score),
            format!("{:.3}", line.fps_ratio),
            format!("{:.3}", line.memory_ratio),
            format!("{:.3}", line.cpu_ratio),
            line.conclusion.clone(),
        ])?;
    }

    rows.blank()?;
    rows.title("=== Statistics ===")?;
    rows.pair("Average score", format!("{:.1}/100", report.average_score))?;
    rows.pair("Pass rate", format!("{:.1}%", report.pass_rate))?;
    rows.pair("Recommendation", &report.recommendation)?;
    rows.pair("Conclusion", &report.conclusion)
}

/// Qualitative reading of a session's averages
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub overall: &'static str,
    pub fps: String,
    pub memory: String,
    pub cpu: String,
    pub suggestions: Vec<&'static str>,
}

impl Evaluation {
    pub fn new(fps: f64, memory_mb: f64, cpu: f64) -> Self {
        let mut suggestions = Vec::new();
        let overall = if fps >= 55. && memory_mb < 10. && cpu < 20. {
            "Excellent - high frame rate, low memory and CPU use"
        } else if fps >= 45. && memory_mb < 20. && cpu < 30. {
            "Good - balanced performance"
        } else if fps >= 30. && memory_mb < 30. && cpu < 40. {
            if fps < 45. {
                suggestions.push("Consider optimizing rendering");
            }
            if memory_mb >= 20. {
                suggestions.push("Watch memory use");
            }
            if cpu >= 30. {
                suggestions.push("Reduce CPU use");
            }
            "Fair - acceptable performance"
        } else {
            if fps < 30. {
                suggestions.push("Frame rate too low, rendering needs focused work");
            }
            if memory_mb >= 30. {
                suggestions.push("Memory use too high");
            }
            if cpu >= 40. {
                suggestions.push("CPU use too high");
            }
            "Needs optimization - heavy overhead"
        };

        Evaluation {
            overall,
            fps: format!("{} ({:.1} FPS)", band(fps, &[55., 45., 30., 15.], true), fps),
            memory: format!("{} ({:.2} MB)", band(memory_mb, &[10., 20., 30., 50.], false), memory_mb),
            cpu: format!("{} ({:.1}%)", band(cpu, &[10., 20., 30., 40.], false), cpu),
            suggestions,
        }
    }
}

/// Label a value against four descending (or ascending) thresholds
fn band(value: f64, thresholds: &[f64; 4], higher_is_better: bool) -> &'static str {
    const LABELS: [&str; 5] = ["excellent", "good", "fair", "high", "too high"];
    const FPS_LABELS: [&str; 5] = ["excellent", "good", "fair", "poor", "very poor"];

    let position = thresholds
        .iter()
        .position(|&t| if higher_is_better { value >= t } else { value < t })
        .unwrap_or(4);
    if higher_is_better {
        FPS_LABELS[position]
    } else {
        LABELS[position]
    }
}

/// Parse the metric table of a report back into metrics
pub fn read_metrics(path: &Path) -> Result<Vec<PerformanceMetric>> {
    let text = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("csv");
    let mut records = Records::new(&text, delimiter_for(extension));

    let header = records
        .next()
        .ok_or(BenchError::EmptyInput { what: "report" })?;
    if header.fields != HEADER {
        return Err(BenchError::Parse {
            line: header.line,
            reason: "unexpected header".to_string(),
        });
    }

    let mut metrics = Vec::new();
    for record in records {
        // The metric table ends at the first blank line
        if record.is_blank() {
            break;
        }
        metrics.push(parse_metric(&record.fields).map_err(|reason| BenchError::Parse {
            line: record.line,
            reason,
        })?);
    }

    trc::debug!(path = %path.display(), rows = metrics.len(), "Read report");
    Ok(metrics)
}

fn parse_metric(fields: &[String]) -> std::result::Result<PerformanceMetric, String> {
    if fields.len() != HEADER.len() {
        return Err(format!("expected {} fields, found {}", HEADER.len(), fields.len()));
    }

    let naive = NaiveDateTime::parse_from_str(&fields[0], TIMESTAMP_FORMAT)
        .map_err(|e| format!("bad timestamp `{}`: {}", fields[0], e))?;
    let timestamp = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("timestamp `{}` does not exist locally", fields[0]))?;

    let float = |i: usize| -> std::result::Result<f64, String> {
        fields[i]
            .parse()
            .map_err(|_| format!("bad {} `{}`", HEADER[i], fields[i]))
    };
    let int = |i: usize| -> std::result::Result<usize, String> {
        fields[i]
            .parse()
            .map_err(|_| format!("bad {} `{}`", HEADER[i], fields[i]))
    };

    Ok(PerformanceMetric {
        timestamp,
        component: fields[1].clone(),
        category: fields[2].parse()?,
        scenario: fields[3].clone(),
        fps: float(4)?,
        memory_used_mb: float(5)?,
        memory_allocated_mb: float(6)?,
        gc_count: u32::try_from(int(7)?).map_err(|e| e.to_string())?,
        gc_time_ms: float(8)?,
        cpu_percent: float(9)?,
        render_time_ms: float(10)?,
        update_time_ms: float(11)?,
        workers: int(12)?,
        cores: int(13)?,
    })
}

/// One delimited record and the line it starts on
#[derive(Debug, PartialEq)]
struct Record {
    line: usize,
    fields: Vec<String>,
    quoted: bool,
}

impl Record {
    fn is_blank(&self) -> bool {
        !self.quoted && self.fields.len() == 1 && self.fields[0].trim().is_empty()
    }
}

/// Splits delimited text into records. Quoted fields may span lines.
struct Records<'a> {
    chars: Peekable<Chars<'a>>,
    delimiter: char,
    line: usize,
}

impl<'a> Records<'a> {
    fn new(text: &'a str, delimiter: char) -> Self {
        Records {
            chars: text.chars().peekable(),
            delimiter,
            line: 1,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.chars.peek()?;

        let mut record = Record {
            line: self.line,
            fields: Vec::new(),
            quoted: false,
        };
        let mut field = String::new();
        let mut in_quotes = false;

        while let Some(c) = self.chars.next() {
            if c == '\n' {
                self.line += 1;
            }
            match c {
                '"' if in_quotes => {
                    if self.chars.peek() == Some(&'"') {
                        self.chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                '"' if field.is_empty() => {
                    in_quotes = true;
                    record.quoted = true;
                }
                '\r' if !in_quotes && self.chars.peek() == Some(&'\n') => {}
                '\n' if !in_quotes => break,
                c if c == self.delimiter && !in_quotes => record.fields.push(std::mem::take(&mut field)),
                c => field.push(c),
            }
        }

        record.fields.push(field);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::entry;
    use crate::compare::compare;
    use crate::stats::summarize_session;
    use crate::stats::tests::metric;
    use std::time::Duration;

    fn sample_metrics(n: usize) -> Vec<PerformanceMetric> {
        let start = Local::now();
        (0..n)
            .map(|i| {
                let mut m = metric(30. + (i % 31) as f64 * 1.017, 10. + i as f64 / 7., (i % 9) as f64 * 3.33);
                m.timestamp = start + chrono::Duration::milliseconds(i as i64 * 100);
                m.memory_allocated_mb = i as f64 * 0.125;
                m.gc_count = i as u32;
                m.gc_time_ms = i as f64 * 0.019;
                m.workers = 4;
                m.cores = 8;
                if i % 2 == 0 {
                    m.category = Category::Native;
                }
                m
            })
            .collect()
    }

    fn report_text(exporter: &ReportExporter, metrics: &[PerformanceMetric], payload: ReportPayload) -> String {
        let mut out = Vec::new();
        exporter.write_report(&mut out, metrics, payload).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn round_trip_to_printed_precision() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = sample_metrics(100);
        let path = ReportExporter::new(dir.path())
            .export(&metrics, ReportPayload::None)
            .unwrap();

        let read = read_metrics(&path).unwrap();
        assert_eq!(read.len(), 100);
        for (a, b) in metrics.iter().zip(&read) {
            assert_eq!(a.timestamp.timestamp_millis(), b.timestamp.timestamp_millis());
            assert_eq!(a.component, b.component);
            assert_eq!(a.category, b.category);
            assert_eq!(a.gc_count, b.gc_count);
            assert_eq!(a.workers, b.workers);
            for (x, y) in [
                (a.fps, b.fps),
                (a.memory_used_mb, b.memory_used_mb),
                (a.memory_allocated_mb, b.memory_allocated_mb),
                (a.gc_time_ms, b.gc_time_ms),
                (a.cpu_percent, b.cpu_percent),
                (a.render_time_ms, b.render_time_ms),
                (a.update_time_ms, b.update_time_ms),
            ] {
                assert!((x - y).abs() <= 0.005 + 1e-9, "{} vs {}", x, y);
            }
        }
    }

    #[test]
    fn reads_back_past_a_summary_section() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = sample_metrics(5);
        let comparison = compare(&metrics[..3], &metrics[3..]).unwrap();
        let path = ReportExporter::new(dir.path())
            .with_extension("tsv")
            .export(
                &metrics,
                ReportPayload::Comparison {
                    test_name: "t",
                    comparison: &comparison,
                },
            )
            .unwrap();

        assert_eq!(path.extension().unwrap(), "tsv");
        assert_eq!(read_metrics(&path).unwrap().len(), 5);
    }

    #[test]
    fn filename_is_prefix_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = ReportExporter::new(dir.path())
            .with_prefix("button")
            .export(&sample_metrics(1), ReportPayload::None)
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        // button_YYYYMMDD_HHMMSS.csv
        assert!(name.starts_with("button_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "button_".len() + 15 + ".csv".len());
        assert!(name[7..15].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn fixed_filename_gets_extension() {
        let exporter = ReportExporter::new("out").with_filename("run");
        assert_eq!(exporter.path(), Path::new("out").join("run.csv"));
        let exporter = ReportExporter::new("out").with_filename("run.csv");
        assert_eq!(exporter.path(), Path::new("out").join("run.csv"));

        // The extension is resolved when the file is named, whatever the order
        let exporter = ReportExporter::new("out").with_filename("run").with_extension("tsv");
        assert_eq!(exporter.path(), Path::new("out").join("run.tsv"));
        assert_eq!(exporter.delimiter(), '\t');
    }

    #[test]
    fn empty_metrics_fail() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReportExporter::new(dir.path())
            .export(&[], ReportPayload::None)
            .unwrap_err();
        assert!(matches!(err, BenchError::EmptyInput { .. }));
    }

    #[test]
    fn unwritable_directory_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let target = blocker.join("reports");
        let err = ReportExporter::new(&target)
            .export(&sample_metrics(2), ReportPayload::None)
            .unwrap_err();
        match err {
            BenchError::Io { path, .. } => assert_eq!(path, target),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn header_then_rows_then_blank() {
        let exporter = ReportExporter::new(".");
        let text = report_text(&exporter, &sample_metrics(2), ReportPayload::None);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(",Widget,native,static_render,30.00,"));
    }

    #[test]
    fn fields_with_delimiters_are_quoted() {
        let mut m = metric(60., 1., 1.);
        m.component = "Tabs, \"step\"".to_string();
        let exporter = ReportExporter::new(".");
        let text = report_text(&exporter, &[m], ReportPayload::None);
        assert!(text.contains("\"Tabs, \"\"step\"\"\""));

        let row = Records::new(&text, ',').nth(1).unwrap();
        assert_eq!(row.fields[1], "Tabs, \"step\"");
    }

    #[test]
    fn labels_with_line_breaks_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut metrics = sample_metrics(3);
        metrics[1].scenario = "click\nanimation".to_string();
        metrics[2].component = "Step\r\nTabs".to_string();

        let path = ReportExporter::new(dir.path())
            .export(&metrics, ReportPayload::None)
            .unwrap();
        let read = read_metrics(&path).unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[1].scenario, "click\nanimation");
        assert_eq!(read[2].component, "Step\r\nTabs");
    }

    #[test]
    fn records_track_their_first_line() {
        let text = "a,b\n\"x\ny\",z\n\nafter\r\n";
        let records: Vec<Record> = Records::new(text, ',').collect();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].line, 2);
        assert_eq!(records[1].fields, vec!["x\ny", "z"]);
        assert!(records[2].is_blank());
        assert_eq!(records[2].line, 4);
        assert_eq!(records[3].fields, vec!["after"]);
        // A quoted empty field is data, not a separator
        assert!(!Records::new("\"\"\n", ',').next().unwrap().is_blank());
    }

    #[test]
    fn session_payload_has_evaluation() {
        let metrics = vec![metric(58., 8., 12.), metric(60., 9., 14.)];
        let summary = summarize_session("button", &metrics, Duration::from_secs(3), 180).unwrap();
        let text = report_text(&ReportExporter::new("."), &metrics, ReportPayload::Session(&summary));

        assert!(text.contains("\n\n=== Benchmark summary ===\n"));
        assert!(text.contains("Test name,button"));
        assert!(text.contains("Duration,3.0 s"));
        assert!(text.contains("Evaluation,\"Excellent - high frame rate, low memory and CPU use\""));
        assert!(text.contains("FPS,excellent (59.0 FPS)"));
    }

    #[test]
    fn paired_payload_has_both_sides() {
        let custom: Vec<_> = (0..3).map(|_| metric(45., 30., 15.)).collect();
        let native: Vec<_> = (0..3).map(|_| metric(60., 20., 10.)).collect();
        let comparison = compare(&custom, &native).unwrap();
        let metrics: Vec<_> = custom.iter().chain(&native).cloned().collect();
        let text = report_text(
            &ReportExporter::new("."),
            &metrics,
            ReportPayload::Paired {
                test_name: "button",
                comparison: &comparison,
            },
        );

        assert!(text.contains("=== Custom component ==="));
        assert!(text.contains("=== Native component ==="));
        assert!(text.contains("FPS ratio,0.750"));
        assert!(text.contains("Memory difference,50.0%"));
        assert!(text.contains("Performance score,69.2/100"));
        assert!(text.contains("=== Significance ==="));
    }

    #[test]
    fn summary_only_and_batch_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path());

        let report = BatchReport::from_entries(&[entry("a", 20.), entry("b", 30.)]).unwrap();
        let path = exporter.export_batch(&report).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("batch_summary_"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Pass rate,100.0%"));
        assert!(text.contains("a,aCustom,aNative,100.0,1.000,1.000,1.000,"));

        let comparison = entry("x", 20.).comparison;
        let path = exporter
            .export_summary_only(ReportPayload::Comparison {
                test_name: "only",
                comparison: &comparison,
            })
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains(&HEADER.join(",")));
        assert!(text.contains("Test name,only"));
    }

    #[test]
    fn evaluation_bands() {
        let poor = Evaluation::new(25., 35., 45.);
        assert!(poor.overall.starts_with("Needs optimization"));
        assert_eq!(poor.suggestions.len(), 3);
        assert_eq!(poor.fps, "poor (25.0 FPS)");
        assert_eq!(poor.memory, "high (35.00 MB)");
        assert_eq!(poor.cpu, "too high (45.0%)");

        let fair = Evaluation::new(40., 22., 10.);
        assert!(fair.overall.starts_with("Fair"));
        assert_eq!(fair.suggestions, vec!["Consider optimizing rendering", "Watch memory use"]);

        assert_eq!(Evaluation::new(10., 5., 5.).fps, "very poor (10.0 FPS)");
    }

    #[test]
    fn bad_rows_are_located() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        let mut text = HEADER.join(",");
        text.push_str("\n2024-01-02 03:04:05.006,A,custom,s,abc,1,1,1,1,1,1,1,1,1\n");
        fs::write(&path, text).unwrap();

        match read_metrics(&path).unwrap_err() {
            BenchError::Parse { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("fps"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
