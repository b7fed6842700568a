//! Published status of the core.
//!
//! The worker thread is the only publisher. Readers load the current
//! snapshot through an epoch-protected pointer, so `latest()` never waits on
//! `publish()` and never observes a half-written value.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::epoch::{self, Atomic, Owned};
use serde::Serialize;

use crate::session::SessionState;

const SUBSCRIBER_BACKLOG: usize = 8;

/// Point-in-time status record; never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Strictly increasing across publications; 0 for the initial value.
    pub sequence: u64,
    pub state: SessionState,
    pub running: bool,
    pub rom_name: Option<String>,
    pub rom_size_bytes: Option<u64>,
    /// Emulated video fields per wall-clock second.
    pub fps: f64,
    pub instructions_per_second: f64,
    /// Bytes of RDRAM the program has touched, in whole pages.
    pub memory_used: u64,
    pub memory_total: u64,
    pub cycles: u64,
    /// Emulated video fields since the machine booted.
    pub video_fields: u64,
    pub pc: Option<u32>,
    pub fault: Option<String>,
    pub recent_log_lines: Vec<String>,
    /// Lines ever logged, including those evicted from `recent_log_lines`.
    pub log_total: u64,
}

impl Snapshot {
    pub fn idle() -> Self {
        Snapshot {
            sequence: 0,
            state: SessionState::Idle,
            running: false,
            rom_name: None,
            rom_size_bytes: None,
            fps: 0.0,
            instructions_per_second: 0.0,
            memory_used: 0,
            memory_total: 0,
            cycles: 0,
            video_fields: 0,
            pc: None,
            fault: None,
            recent_log_lines: Vec::new(),
            log_total: 0,
        }
    }

    /// One-line summary for status bars and the headless runner.
    pub fn status_line(&self) -> String {
        let mut line = format!("{:?}", self.state).to_uppercase();
        if let Some(name) = &self.rom_name {
            line.push_str(&format!(" | {}", name));
        }
        line.push_str(&format!(
            " | {:.1} fps | {:.2} MIPS | {:.1}/{:.1} MB",
            self.fps,
            self.instructions_per_second / 1_000_000.0,
            self.memory_used as f64 / (1024.0 * 1024.0),
            self.memory_total as f64 / (1024.0 * 1024.0),
        ));
        if let Some(fault) = &self.fault {
            line.push_str(&format!(" | FAULT: {}", fault));
        }
        line
    }
}

pub struct TelemetryPort {
    latest: Atomic<Arc<Snapshot>>,
    sequence: AtomicU64,
    subscribers: Mutex<Vec<Sender<Arc<Snapshot>>>>,
}

impl TelemetryPort {
    pub fn new() -> Self {
        TelemetryPort {
            latest: Atomic::new(Arc::new(Snapshot::idle())),
            sequence: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Stamps the next sequence number and makes `snapshot` the latest.
    pub fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        snapshot.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(snapshot);

        let guard = epoch::pin();
        let previous = self.latest.swap(
            Owned::new(Arc::clone(&snapshot)),
            Ordering::AcqRel,
            &guard,
        );
        if !previous.is_null() {
            // SAFETY: `previous` is unlinked; readers still holding it are pinned.
            unsafe { guard.defer_destroy(previous) };
        }

        self.notify(&snapshot);
        snapshot
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        let guard = epoch::pin();
        let current = self.latest.load(Ordering::Acquire, &guard);
        // SAFETY: the pointer is only reclaimed after every pinned reader is done.
        match unsafe { current.as_ref() } {
            Some(snapshot) => Arc::clone(snapshot),
            None => Arc::new(Snapshot::idle()),
        }
    }

    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        let (tx, rx) = channel::bounded(SUBSCRIBER_BACKLOG);
        // Start the subscriber off with the current state
        let _ = tx.try_send(self.latest());
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    fn notify(&self, snapshot: &Arc<Snapshot>) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| match tx.try_send(Arc::clone(snapshot)) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl Default for TelemetryPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TelemetryPort {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no reader can still be loading the pointer.
        unsafe {
            let guard = epoch::unprotected();
            let current = self
                .latest
                .swap(epoch::Shared::null(), Ordering::AcqRel, guard);
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

/// Bounded history of session log lines.
pub struct LogRing {
    lines: VecDeque<String>,
    capacity: usize,
    total: u64,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LogRing {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.total += 1;
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Lines of `snapshot` logged after the first `seen` lines, oldest first.
/// Lines that already fell out of the ring are skipped.
pub fn lines_since(snapshot: &Snapshot, seen: u64) -> &[String] {
    let new = snapshot.log_total.saturating_sub(seen);
    let lines = &snapshot.recent_log_lines;
    let take = (new.min(lines.len() as u64)) as usize;
    &lines[lines.len() - take..]
}
