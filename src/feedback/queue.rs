//! Feedback Queue - serialises commands onto the audio and haptic channels
//!
//! Each channel has one executing command and at most one pending command.
//! Submission is a short synchronous critical section, so the fusion task is
//! never held up by slow outputs; one worker per channel does the waiting.
//!
//! Rules per channel:
//! - A pending command is replaced by an incoming one of equal or higher
//!   severity; a lower one is rejected.
//! - An executing Danger is interrupted only by a Danger with a different
//!   message; anything lower is rejected rather than queued behind it.
//! - An executing Warning/Info is interrupted by a strictly higher command;
//!   equal or lower ones wait as pending.
//! - A `Both` command is admitted on both channels or on neither.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AudioOutput, HapticOutput, OutputError};
use crate::types::{FeedbackCommand, OutputChannel, Severity};

/// What `submit` did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Placed into empty pending slot(s)
    Queued,
    /// Took the place of an older pending command
    Replaced,
    /// Interrupts the command currently playing
    Preempting,
    /// Not admitted on any channel
    Rejected,
}

/// Queue counters.
///
/// `submitted`, `replaced` and `rejected` count commands; `dispatched`,
/// `preempted`, `failed` and `abandoned` count per-channel renders, so a
/// `Both` command can contribute twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub replaced: u64,
    pub rejected: u64,
    pub dispatched: u64,
    pub preempted: u64,
    pub failed: u64,
    pub abandoned: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Audio,
    Haptic,
}

impl Lane {
    fn for_channel(channel: OutputChannel) -> &'static [Lane] {
        match channel {
            OutputChannel::Audio => &[Lane::Audio],
            OutputChannel::Haptic => &[Lane::Haptic],
            OutputChannel::Both => &[Lane::Audio, Lane::Haptic],
        }
    }

    fn name(self) -> &'static str {
        match self {
            Lane::Audio => "audio",
            Lane::Haptic => "haptic",
        }
    }
}

struct InFlight {
    id: u64,
    severity: Severity,
    message: String,
    preempt: CancellationToken,
}

#[derive(Default)]
struct Slot {
    pending: Option<FeedbackCommand>,
    executing: Option<InFlight>,
}

#[derive(Default)]
struct Slots {
    audio: Slot,
    haptic: Slot,
}

impl Slots {
    fn lane(&self, lane: Lane) -> &Slot {
        match lane {
            Lane::Audio => &self.audio,
            Lane::Haptic => &self.haptic,
        }
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut Slot {
        match lane {
            Lane::Audio => &mut self.audio,
            Lane::Haptic => &mut self.haptic,
        }
    }
}

enum Admission {
    Accept { replaces: Option<u64>, preempt: bool },
    Reject(&'static str),
}

fn admit(slot: &Slot, cmd: &FeedbackCommand) -> Admission {
    let mut preempt = false;
    if let Some(current) = &slot.executing {
        if current.severity == Severity::Danger {
            if cmd.severity < Severity::Danger {
                return Admission::Reject("danger playing");
            }
            preempt = current.message != cmd.message;
        } else {
            preempt = cmd.severity > current.severity;
        }
    }
    if let Some(pending) = &slot.pending {
        if cmd.severity < pending.severity {
            return Admission::Reject("higher severity pending");
        }
    }
    Admission::Accept {
        replaces: slot.pending.as_ref().map(|p| p.id),
        preempt,
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    replaced: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    preempted: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Default)]
struct QueueInner {
    slots: Mutex<Slots>,
    audio_ready: Notify,
    haptic_ready: Notify,
    closed: AtomicBool,
    counters: Counters,
}

/// Output device a channel worker drives.
enum Sink {
    Audio(Box<dyn AudioOutput>),
    Haptic(Box<dyn HapticOutput>),
}

impl Sink {
    async fn render(&mut self, cmd: &FeedbackCommand) -> Result<(), OutputError> {
        match self {
            Sink::Audio(output) => output.play(&cmd.message).await,
            Sink::Haptic(output) => output.pulse(&cmd.pattern).await,
        }
    }
}

/// Cloneable handle; clones share the same slots.
#[derive(Clone, Default)]
pub struct FeedbackQueue {
    inner: Arc<QueueInner>,
}

impl FeedbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a command to its channel(s). Never blocks on output.
    pub fn submit(&self, cmd: FeedbackCommand) -> SubmitOutcome {
        let counters = &self.inner.counters;
        bump(&counters.submitted);

        if self.inner.closed.load(Ordering::Acquire) {
            bump(&counters.rejected);
            debug!(id = cmd.id, "Feedback queue closed, command rejected");
            return SubmitOutcome::Rejected;
        }

        let lanes = Lane::for_channel(cmd.channel);
        let mut replaced_ids: Vec<u64> = Vec::new();
        let mut preempting = false;
        {
            let mut slots = self.slots();

            let mut plan = Vec::with_capacity(lanes.len());
            for &lane in lanes {
                match admit(slots.lane(lane), &cmd) {
                    Admission::Accept { replaces, preempt } => plan.push((lane, replaces, preempt)),
                    Admission::Reject(reason) => {
                        bump(&counters.rejected);
                        debug!(
                            id = cmd.id,
                            severity = %cmd.severity,
                            channel = lane.name(),
                            reason,
                            "Feedback command rejected"
                        );
                        return SubmitOutcome::Rejected;
                    }
                }
            }

            for (lane, replaces, preempt) in plan {
                let slot = slots.lane_mut(lane);
                slot.pending = Some(cmd.clone());
                if let Some(old) = replaces {
                    if !replaced_ids.contains(&old) {
                        replaced_ids.push(old);
                    }
                }
                if preempt {
                    if let Some(current) = &slot.executing {
                        debug!(
                            interrupted = current.id,
                            by = cmd.id,
                            channel = lane.name(),
                            "Preempting feedback"
                        );
                        current.preempt.cancel();
                    }
                    preempting = true;
                }
            }
        }

        for &lane in lanes {
            self.ready(lane).notify_one();
        }

        counters
            .replaced
            .fetch_add(replaced_ids.len() as u64, Ordering::Relaxed);
        if preempting {
            SubmitOutcome::Preempting
        } else if !replaced_ids.is_empty() {
            SubmitOutcome::Replaced
        } else {
            SubmitOutcome::Queued
        }
    }

    /// Drive both channels until `shutdown` fires.
    ///
    /// After shutdown an in-flight render may finish within `grace`, then it
    /// is cut off. Pending commands are abandoned and the devices dropped.
    pub async fn run(
        &self,
        audio: Box<dyn AudioOutput>,
        haptic: Box<dyn HapticOutput>,
        shutdown: CancellationToken,
        grace: Duration,
    ) {
        info!("Feedback dispatcher started");
        tokio::join!(
            self.worker(Lane::Audio, Sink::Audio(audio), &shutdown, grace),
            self.worker(Lane::Haptic, Sink::Haptic(haptic), &shutdown, grace),
        );

        self.inner.closed.store(true, Ordering::Release);
        for lane in [Lane::Audio, Lane::Haptic] {
            self.abandon_pending(lane);
        }

        let stats = self.stats();
        info!(
            dispatched = stats.dispatched,
            preempted = stats.preempted,
            failed = stats.failed,
            abandoned = stats.abandoned,
            "Feedback dispatcher stopped"
        );
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.inner.counters;
        QueueStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            replaced: c.replaced.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            preempted: c.preempted.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Whether nothing is pending or playing on either channel.
    pub fn is_idle(&self) -> bool {
        let slots = self.slots();
        [Lane::Audio, Lane::Haptic].iter().all(|&lane| {
            let slot = slots.lane(lane);
            slot.pending.is_none() && slot.executing.is_none()
        })
    }

    async fn worker(&self, lane: Lane, mut sink: Sink, shutdown: &CancellationToken, grace: Duration) {
        let counters = &self.inner.counters;

        while let Some((cmd, preempt)) = self.next_command(lane, shutdown).await {
            let started = Instant::now();
            tokio::select! {
                biased;
                result = sink.render(&cmd) => match result {
                    Ok(()) => {
                        bump(&counters.dispatched);
                        debug!(
                            id = cmd.id,
                            severity = %cmd.severity,
                            channel = lane.name(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Feedback rendered"
                        );
                    }
                    Err(e) => {
                        bump(&counters.failed);
                        warn!(id = cmd.id, channel = lane.name(), error = %e, "Feedback output failed, command dropped");
                    }
                },
                _ = preempt.cancelled() => {
                    bump(&counters.preempted);
                    debug!(id = cmd.id, channel = lane.name(), "Feedback interrupted");
                }
                _ = cut_off(shutdown, grace) => {
                    bump(&counters.abandoned);
                    info!(id = cmd.id, channel = lane.name(), grace_ms = grace.as_millis() as u64, "Feedback cut off at shutdown");
                }
            }

            self.slots().lane_mut(lane).executing = None;
        }
    }

    /// Wait for the next pending command on `lane` and mark it executing.
    async fn next_command(
        &self,
        lane: Lane,
        shutdown: &CancellationToken,
    ) -> Option<(FeedbackCommand, CancellationToken)> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            {
                let mut slots = self.slots();
                let slot = slots.lane_mut(lane);
                if let Some(cmd) = slot.pending.take() {
                    let token = CancellationToken::new();
                    slot.executing = Some(InFlight {
                        id: cmd.id,
                        severity: cmd.severity,
                        message: cmd.message.clone(),
                        preempt: token.clone(),
                    });
                    return Some((cmd, token));
                }
            }
            tokio::select! {
                _ = self.ready(lane).notified() => {}
                _ = shutdown.cancelled() => {}
            }
        }
    }

    fn abandon_pending(&self, lane: Lane) {
        if let Some(cmd) = self.slots().lane_mut(lane).pending.take() {
            bump(&self.inner.counters.abandoned);
            debug!(id = cmd.id, channel = lane.name(), "Pending feedback abandoned at shutdown");
        }
    }

    fn ready(&self, lane: Lane) -> &Notify {
        match lane {
            Lane::Audio => &self.inner.audio_ready,
            Lane::Haptic => &self.inner.haptic_ready,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn cut_off(shutdown: &CancellationToken, grace: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(grace).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::console::{LogAudioOutput, LogHapticOutput, OutputJournal};
    use crate::feedback::patterns::pattern_for;
    use async_trait::async_trait;
    use crate::types::HapticPattern;

    fn cmd(id: u64, severity: Severity, channel: OutputChannel, message: &str) -> FeedbackCommand {
        FeedbackCommand {
            id,
            channel,
            message: message.to_string(),
            pattern: pattern_for(severity, 1.0),
            severity,
            issued_at: Instant::now(),
        }
    }

    fn start(queue: &FeedbackQueue, journal: &OutputJournal) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let shutdown = CancellationToken::new();
        let q = queue.clone();
        let audio = Box::new(LogAudioOutput::new().with_journal(journal.clone()));
        let haptic = Box::new(LogHapticOutput::new().with_journal(journal.clone()));
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            q.run(audio, haptic, token, Duration::from_millis(500)).await;
        });
        (shutdown, handle)
    }

    fn spoken(journal: &OutputJournal) -> Vec<String> {
        journal.on(OutputChannel::Audio).into_iter().map(|e| e.content).collect()
    }

    #[test]
    fn test_pending_replaced_by_higher() {
        let queue = FeedbackQueue::new();
        assert_eq!(queue.submit(cmd(1, Severity::Warning, OutputChannel::Both, "w")), SubmitOutcome::Queued);
        assert_eq!(queue.submit(cmd(2, Severity::Danger, OutputChannel::Both, "d")), SubmitOutcome::Replaced);
        assert_eq!(queue.stats().replaced, 1);
    }

    #[test]
    fn test_pending_keeps_higher_over_lower() {
        let queue = FeedbackQueue::new();
        queue.submit(cmd(1, Severity::Danger, OutputChannel::Audio, "d"));
        assert_eq!(queue.submit(cmd(2, Severity::Info, OutputChannel::Audio, "i")), SubmitOutcome::Rejected);
        assert_eq!(queue.stats().rejected, 1);
    }

    #[test]
    fn test_both_is_all_or_nothing() {
        let queue = FeedbackQueue::new();
        queue.submit(cmd(1, Severity::Danger, OutputChannel::Audio, "d"));
        assert_eq!(queue.submit(cmd(2, Severity::Warning, OutputChannel::Both, "w")), SubmitOutcome::Rejected);
        // Haptic slot untouched: a Haptic-only Info still queues without replacing anything
        assert_eq!(queue.submit(cmd(3, Severity::Info, OutputChannel::Haptic, "i")), SubmitOutcome::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_danger_replaces_pending_warning_before_dispatch() {
        let queue = FeedbackQueue::new();
        let journal = OutputJournal::new();
        queue.submit(cmd(1, Severity::Warning, OutputChannel::Both, "Obstacle at 80 centimeters"));
        queue.submit(cmd(2, Severity::Danger, OutputChannel::Both, "Warning! Obstacle at 45 centimeters"));

        let (shutdown, handle) = start(&queue, &journal);
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(spoken(&journal), vec!["Warning! Obstacle at 45 centimeters"]);
        assert_eq!(journal.on(OutputChannel::Haptic).len(), 1);
        assert_eq!(queue.stats().dispatched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executing_danger_rejects_lower_and_yields_to_new_danger() {
        let queue = FeedbackQueue::new();
        let journal = OutputJournal::new();
        let (shutdown, handle) = start(&queue, &journal);

        queue.submit(cmd(1, Severity::Danger, OutputChannel::Audio, "Warning! Obstacle at 45 centimeters"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(queue.submit(cmd(2, Severity::Warning, OutputChannel::Audio, "Obstacle at 80 centimeters")), SubmitOutcome::Rejected);
        assert_eq!(
            queue.submit(cmd(3, Severity::Danger, OutputChannel::Audio, "Warning! Obstacle at 30 centimeters")),
            SubmitOutcome::Preempting
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let entries = journal.on(OutputChannel::Audio);
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].finished);
        assert_eq!(entries[1].content, "Warning! Obstacle at 30 centimeters");
        assert!(entries[1].finished);
        assert_eq!(queue.stats().preempted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_danger_waits_instead_of_interrupting() {
        let queue = FeedbackQueue::new();
        let journal = OutputJournal::new();
        let (shutdown, handle) = start(&queue, &journal);

        queue.submit(cmd(1, Severity::Danger, OutputChannel::Audio, "Warning! Obstacle at 45 centimeters"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            queue.submit(cmd(2, Severity::Danger, OutputChannel::Audio, "Warning! Obstacle at 45 centimeters")),
            SubmitOutcome::Queued
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let entries = journal.on(OutputChannel::Audio);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.finished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_preempted_by_danger() {
        let queue = FeedbackQueue::new();
        let journal = OutputJournal::new();
        let (shutdown, handle) = start(&queue, &journal);

        queue.submit(cmd(1, Severity::Warning, OutputChannel::Both, "Obstacle at 80 centimeters"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            queue.submit(cmd(2, Severity::Danger, OutputChannel::Both, "Warning! Obstacle at 45 centimeters")),
            SubmitOutcome::Preempting
        );
        // Nothing lower may queue behind the pending Danger
        assert_eq!(queue.submit(cmd(3, Severity::Info, OutputChannel::Both, "Detected: a chair.")), SubmitOutcome::Rejected);

        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(
            spoken(&journal),
            vec!["Obstacle at 80 centimeters", "Warning! Obstacle at 45 centimeters"]
        );
        let stats = queue.stats();
        assert_eq!(stats.preempted, 2);
        assert_eq!(stats.dispatched, 2);
    }

    struct BrokenSpeaker;

    #[async_trait]
    impl AudioOutput for BrokenSpeaker {
        async fn play(&mut self, _message: &str) -> Result<(), OutputError> {
            Err(OutputError::Busy("codec locked".to_string()))
        }
    }

    struct SilentMotor;

    #[async_trait]
    impl HapticOutput for SilentMotor {
        async fn pulse(&mut self, _pattern: &HapticPattern) -> Result<(), OutputError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_failure_drops_command_and_continues() {
        let queue = FeedbackQueue::new();
        let shutdown = CancellationToken::new();
        let q = queue.clone();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            q.run(Box::new(BrokenSpeaker), Box::new(SilentMotor), token, Duration::ZERO).await;
        });

        queue.submit(cmd(1, Severity::Danger, OutputChannel::Both, "d1"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.submit(cmd(2, Severity::Warning, OutputChannel::Both, "w"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let stats = queue.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.dispatched, 2);
        assert!(queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_off_after_grace_and_abandons_pending() {
        let queue = FeedbackQueue::new();
        let journal = OutputJournal::new();
        let (shutdown, handle) = start(&queue, &journal);

        queue.submit(cmd(1, Severity::Danger, OutputChannel::Haptic, "d"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.submit(cmd(2, Severity::Danger, OutputChannel::Haptic, "d"));

        let stopped_at = Instant::now();
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(stopped_at.elapsed(), Duration::from_millis(500));

        let stats = queue.stats();
        assert_eq!(stats.abandoned, 2);
        assert_eq!(stats.dispatched, 0);
        assert_eq!(queue.submit(cmd(3, Severity::Danger, OutputChannel::Audio, "late")), SubmitOutcome::Rejected);
    }
}
