//! Log-backed output devices.
//!
//! Stand-ins for the speaker and vibration motor when running on a
//! development machine: each rendered command is logged and occupies the
//! channel for as long as the real device would. An optional `OutputJournal`
//! records every render so a run can be inspected afterwards.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::{AudioOutput, HapticOutput, OutputError};
use crate::config::defaults::{MIN_SPEECH_MS, SPEECH_CHARS_PER_SEC};
use crate::types::{HapticPattern, OutputChannel};

// ============================================================================
// Journal
// ============================================================================

/// One render attempt on a physical channel.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub channel: OutputChannel,
    /// Spoken text, or a pulse summary such as "500/100 500/100 500/500"
    pub content: String,
    pub started_at: Instant,
    /// False when the render was interrupted (preempted or cut off)
    pub finished: bool,
}

/// Shared, cloneable record of everything the outputs rendered.
#[derive(Debug, Clone, Default)]
pub struct OutputJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl OutputJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.lock().clone()
    }

    /// Entries rendered on `channel`, in start order.
    pub fn on(&self, channel: OutputChannel) -> Vec<JournalEntry> {
        self.lock()
            .iter()
            .filter(|e| e.channel == channel)
            .cloned()
            .collect()
    }

    fn start(&self, channel: OutputChannel, content: String) -> usize {
        let mut entries = self.lock();
        entries.push(JournalEntry {
            channel,
            content,
            started_at: Instant::now(),
            finished: false,
        });
        entries.len() - 1
    }

    fn finish(&self, index: usize) {
        if let Some(entry) = self.lock().get_mut(index) {
            entry.finished = true;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JournalEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time a speech engine needs for `message`.
pub fn speech_duration(message: &str) -> Duration {
    let ms = (message.chars().count() as f64 / SPEECH_CHARS_PER_SEC * 1000.0) as u64;
    Duration::from_millis(ms.max(MIN_SPEECH_MS))
}

fn describe(pattern: &HapticPattern) -> String {
    pattern
        .pulses
        .iter()
        .map(|p| format!("{}/{}", p.on_ms, p.off_ms))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Audio
// ============================================================================

#[derive(Debug, Default)]
pub struct LogAudioOutput {
    journal: Option<OutputJournal>,
}

impl LogAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: OutputJournal) -> Self {
        self.journal = Some(journal);
        self
    }
}

#[async_trait]
impl AudioOutput for LogAudioOutput {
    async fn play(&mut self, message: &str) -> Result<(), OutputError> {
        info!(target: "canne::speech", message = %message, "🔊 speaking");
        let entry = self
            .journal
            .as_ref()
            .map(|j| j.start(OutputChannel::Audio, message.to_string()));

        tokio::time::sleep(speech_duration(message)).await;

        if let (Some(journal), Some(index)) = (&self.journal, entry) {
            journal.finish(index);
        }
        Ok(())
    }
}

// ============================================================================
// Haptic
// ============================================================================

#[derive(Debug, Default)]
pub struct LogHapticOutput {
    journal: Option<OutputJournal>,
}

impl LogHapticOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: OutputJournal) -> Self {
        self.journal = Some(journal);
        self
    }
}

#[async_trait]
impl HapticOutput for LogHapticOutput {
    async fn pulse(&mut self, pattern: &HapticPattern) -> Result<(), OutputError> {
        let summary = describe(pattern);
        info!(target: "canne::haptic", pulses = %summary, intensity = pattern.intensity, "📳 vibrating");
        let entry = self
            .journal
            .as_ref()
            .map(|j| j.start(OutputChannel::Haptic, summary));

        tokio::time::sleep(pattern.duration()).await;

        if let (Some(journal), Some(index)) = (&self.journal, entry) {
            journal.finish(index);
        }
        Ok(())
    }
}
