//! CSV replay of a recorded range session.
//!
//! Expected CSV format (header optional):
//! ```text
//! offset_ms,distance_cm
//! 0,182.5
//! 100,
//! 200,176.0
//! ```
//! An empty distance is a missing echo. Rows are released at their recorded
//! offset from the first read, so gaps in the recording show up as reads
//! that do not answer in time.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{RangeSource, SensorError};
use crate::types::SensorReading;

/// One recorded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayRow {
    pub offset: Duration,
    pub distance_cm: Option<f64>,
}

/// Replays recorded range samples paced by their offsets.
pub struct ReplayRangeSource {
    rows: VecDeque<ReplayRow>,
    started: Option<Instant>,
    finished_logged: bool,
}

impl ReplayRangeSource {
    pub fn from_rows(rows: Vec<ReplayRow>) -> Self {
        Self {
            rows: rows.into(),
            started: None,
            finished_logged: false,
        }
    }

    /// Load a recording from disk. Malformed lines are skipped with a warning.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();

        for (idx, line_result) in reader.lines().enumerate() {
            let line_num = idx + 1;
            let line = line_result?;

            if line.trim().is_empty() || (line_num == 1 && line.starts_with("offset")) {
                continue;
            }

            match parse_row(&line, line_num) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(line = line_num, error = %e, "Skipping replay line"),
            }
        }

        info!(count = rows.len(), path = %path.display(), "Loaded range recording");
        Ok(Self::from_rows(rows))
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

fn parse_row(line: &str, line_num: usize) -> Result<ReplayRow, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 2 {
        return Err(format!("Expected 2 fields, got {} on line {}", fields.len(), line_num));
    }

    let offset_ms: u64 = fields[0]
        .parse()
        .map_err(|e| format!("Invalid offset_ms '{}': {}", fields[0], e))?;
    let distance_cm = if fields[1].is_empty() {
        None
    } else {
        Some(
            fields[1]
                .parse::<f64>()
                .map_err(|e| format!("Invalid distance_cm '{}': {}", fields[1], e))?,
        )
    };

    Ok(ReplayRow {
        offset: Duration::from_millis(offset_ms),
        distance_cm,
    })
}

#[async_trait]
impl RangeSource for ReplayRangeSource {
    async fn read(&mut self) -> Result<SensorReading, SensorError> {
        let started = *self.started.get_or_insert_with(Instant::now);

        // Skip rows already overtaken by the clock; the newest due one wins
        while self.rows.len() > 1 && started + self.rows[1].offset <= Instant::now() {
            self.rows.pop_front();
        }

        // Peek, wait, then take: a read cancelled by the poller's timeout
        // must leave the row in place
        let Some(row) = self.rows.front().copied() else {
            if !self.finished_logged {
                info!("Range recording finished");
                self.finished_logged = true;
            }
            return Err(SensorError::Timeout("recording finished".to_string()));
        };

        tokio::time::sleep_until(started + row.offset).await;
        self.rows.pop_front();
        let now = Instant::now();
        Ok(match row.distance_cm {
            Some(d) => SensorReading::valid(d, now),
            None => SensorReading::invalid(now),
        })
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
