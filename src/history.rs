//! Turn history.
//!
//! Stores one JSON line per conversation turn in daily files
//! `{dir}/{YYYY-MM-DD}.jsonl`. Write failures are logged and never abort a turn.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error};

/// Record of a single turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub timestamp: String,
    pub product_id: String,
    /// `spoken`, `not_found` or `failed`
    pub outcome: String,
    pub product_name: Option<String>,
    pub prompt_chars: usize,
    pub reply: Option<String>,
    pub error: Option<String>,
    pub completion_latency_ms: Option<i64>,
    pub speech_latency_ms: Option<i64>,
    pub total_latency_ms: i64,
}

impl TurnRecord {
    pub fn new(product_id: &str, outcome: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            product_id: product_id.to_string(),
            outcome: outcome.to_string(),
            product_name: None,
            prompt_chars: 0,
            reply: None,
            error: None,
            completion_latency_ms: None,
            speech_latency_ms: None,
            total_latency_ms: 0,
        }
    }
}

pub struct TurnHistory {
    dir: PathBuf,
}

impl TurnHistory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{date}.jsonl"))
    }

    /// Append a record to today's history file.
    pub fn save(&self, record: &TurnRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create history dir: {e}");
            return;
        }

        let path = self.file_for(&Local::now().format("%Y-%m-%d").to_string());
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => match serde_json::to_string(record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write history record: {e}");
                    } else {
                        debug!("Saved turn record to {}", path.display());
                    }
                }
                Err(e) => error!("Failed to serialize record: {e}"),
            },
            Err(e) => error!("Failed to open history file: {e}"),
        }
    }

    /// Load all records for a date (`YYYY-MM-DD`). Unparsable lines are skipped.
    pub fn load(&self, date: &str) -> Vec<TurnRecord> {
        let Ok(contents) = fs::read_to_string(self.file_for(date)) else {
            return Vec::new();
        };

        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

/// Markdown summary of one day's turns.
pub fn generate_report(records: &[TurnRecord], date: &str) -> String {
    if records.is_empty() {
        return format!("No turns recorded for {date}.");
    }

    let total = records.len();
    let count = |outcome: &str| records.iter().filter(|r| r.outcome == outcome).count();

    let latencies: Vec<i64> = records
        .iter()
        .filter_map(|r| r.completion_latency_ms)
        .collect();
    let avg_completion = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<i64>() as f64 / latencies.len() as f64
    };

    let mut products: Vec<&str> = records
        .iter()
        .filter(|r| r.outcome == "spoken")
        .filter_map(|r| r.product_name.as_deref())
        .collect();
    products.sort_unstable();
    products.dedup();

    let mut report = format!(
        "# Product Speaker Report for {date}\n\n\
        - Turns: {total}\n\
        - Spoken: {}\n\
        - Not found: {}\n\
        - Failed: {}\n\
        - Avg completion latency: {avg_completion:.0}ms\n\n\
        ## Products\n",
        count("spoken"),
        count("not_found"),
        count("failed"),
    );
    for name in products {
        report.push_str(&format!("- {name}\n"));
    }
    report
}
