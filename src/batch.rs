//! Aggregation of many comparisons into one batch report
//!
//! Each comparison run hands its result to a [`BatchSender`]. The
//! [`BatchCollector`] is the only reader and owns the accumulated entries.

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing as trc;

use crate::compare::Comparison;
use crate::error::{BenchError, Result};
use crate::stats::round_to;

/// Score at or above which a comparison counts as passed
pub const PASS_SCORE: f64 = 70.;

/// Outcome of one custom versus native run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BatchEntry {
    pub test_name: String,
    pub custom_component: String,
    pub native_component: String,
    pub comparison: Comparison,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
}

impl BatchEntry {
    pub fn score(&self) -> f64 {
        self.comparison.score
    }

    pub fn passed(&self) -> bool {
        self.score() >= PASS_SCORE
    }
}

/// Producer handle, cheap to clone and send to other threads
#[derive(Clone, Debug)]
pub struct BatchSender(Sender<BatchEntry>);

impl BatchSender {
    /// Submit an entry. Returns `false` if the collector is gone.
    pub fn submit(&self, entry: BatchEntry) -> bool {
        trc::debug!(test = %entry.test_name, score = entry.score(), "Submitting batch entry");
        self.0.send(entry).is_ok()
    }
}

pub struct BatchCollector {
    sender: Sender<BatchEntry>,
    receiver: Receiver<BatchEntry>,
    entries: Vec<BatchEntry>,
}

impl BatchCollector {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        BatchCollector {
            sender,
            receiver,
            entries: Vec::new(),
        }
    }

    pub fn sender(&self) -> BatchSender {
        BatchSender(self.sender.clone())
    }

    /// Move everything submitted so far into the collector
    pub fn drain(&mut self) -> &[BatchEntry] {
        self.entries.extend(self.receiver.try_iter());
        &self.entries
    }

    /// Wait for every outstanding sender to be dropped and return all entries
    /// in submission order
    pub fn finish(self) -> Vec<BatchEntry> {
        let BatchCollector {
            sender,
            receiver,
            mut entries,
        } = self;
        drop(sender);
        entries.extend(receiver.iter());
        trc::info!(entries = entries.len(), "Batch collection finished");
        entries
    }
}

impl Default for BatchCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// One line of the batch table
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BatchLine {
    pub test_name: String,
    pub custom_component: String,
    pub native_component: String,
    pub score: f64,
    pub fps_ratio: f64,
    pub memory_ratio: f64,
    pub cpu_ratio: f64,
    pub conclusion: String,
}

impl From<&BatchEntry> for BatchLine {
    fn from(entry: &BatchEntry) -> Self {
        BatchLine {
            test_name: entry.test_name.clone(),
            custom_component: entry.custom_component.clone(),
            native_component: entry.native_component.clone(),
            score: entry.comparison.score,
            fps_ratio: entry.comparison.fps.ratio,
            memory_ratio: entry.comparison.memory.ratio,
            cpu_ratio: entry.comparison.cpu.ratio,
            conclusion: entry.comparison.conclusion.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub generated: DateTime<Local>,
    pub lines: Vec<BatchLine>,
    pub average_score: f64,
    /// Share of entries at or above [`PASS_SCORE`], in percent
    pub pass_rate: f64,
    pub best: BatchLine,
    pub worst: BatchLine,
    pub recommendation: String,
    pub conclusion: String,
}

impl BatchReport {
    pub fn from_entries(entries: &[BatchEntry]) -> Result<Self> {
        let first = entries.first().ok_or(BenchError::EmptyInput {
            what: "batch report",
        })?;

        let mut best = first;
        let mut worst = first;
        for entry in entries {
            // First entry wins ties
            if entry.score() > best.score() {
                best = entry;
            }
            if entry.score() < worst.score() {
                worst = entry;
            }
        }

        let n = entries.len() as f64;
        let average_score = entries.iter().map(BatchEntry::score).sum::<f64>() / n;
        let passed = entries.iter().filter(|e| e.passed()).count() as f64;
        let pass_rate = passed / n * 100.;

        Ok(BatchReport {
            generated: Local::now(),
            lines: entries.iter().map(BatchLine::from).collect(),
            average_score: round_to(average_score, 1),
            pass_rate: round_to(pass_rate, 1),
            best: best.into(),
            worst: worst.into(),
            recommendation: recommendation(average_score).to_string(),
            conclusion: conclusion(average_score, pass_rate),
        })
    }

    pub fn passed(&self) -> usize {
        self.lines.iter().filter(|l| l.score >= PASS_SCORE).count()
    }

    /// Console rendering
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "========== Batch report ==========\n\
             Tests: {}  Passed: {}  Average score: {:.1}/100  Pass rate: {:.1}%\n\n",
            self.lines.len(),
            self.passed(),
            self.average_score,
            self.pass_rate
        );
        for line in &self.lines {
            out.push_str(&format!(
                "{:<20} {:>18} vs {:<14} {:>5.1}\n",
                line.test_name, line.custom_component, line.native_component, line.score
            ));
        }
        out.push_str(&format!(
            "\nBest:  {} ({:.1}) {}\nWorst: {} ({:.1}) {}\n\nRecommendation: {}\nConclusion: {}\n",
            self.best.test_name,
            self.best.score,
            self.best.conclusion,
            self.worst.test_name,
            self.worst.score,
            self.worst.conclusion,
            self.recommendation,
            self.conclusion
        ));
        out
    }
}

fn recommendation(average_score: f64) -> &'static str {
    if average_score >= 85. {
        "Overall performance is excellent; the custom components are of high quality."
    } else if average_score >= 75. {
        "Overall performance is good; some components may need tuning."
    } else if average_score >= 65. {
        "Overall performance is fair; focus optimization on the low scorers."
    } else {
        "Overall performance is poor; the custom components need systematic optimization."
    }
}

fn conclusion(average_score: f64, pass_rate: f64) -> String {
    let label = if average_score >= 85. {
        "Excellent"
    } else if average_score >= 75. {
        "Good"
    } else if average_score >= 65. {
        "Fair"
    } else {
        "Needs optimization"
    };
    format!(
        "{} - average score {:.1}, pass rate {:.1}%",
        label, average_score, pass_rate
    )
}
