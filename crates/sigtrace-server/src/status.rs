//! Shared pipeline status: the processing flag, the throughput sampler and
//! timing accumulators.
//!
//! Everything here is diagnostic except the processing flag, which callers
//! poll through [`crate::SignatureServer::is_processing_requests`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Reads between two throughput samples.
pub const SAMPLE_INTERVAL: u64 = 1 << 12;

#[derive(Debug)]
pub struct PipelineStatus {
    processing: AtomicBool,
    reads: AtomicU64,
    /// Start of the current throughput sample window
    sample_started: Mutex<Instant>,
    read_nanos: AtomicU64,
    decode_nanos: AtomicU64,
    merge_nanos: AtomicU64,
}

/// Accumulated time spent in each pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub read: Duration,
    pub decode: Duration,
    pub merge: Duration,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStatus {
    pub fn new() -> Self {
        PipelineStatus {
            processing: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            sample_started: Mutex::new(Instant::now()),
            read_nanos: AtomicU64::new(0),
            decode_nanos: AtomicU64::new(0),
            merge_nanos: AtomicU64::new(0),
        }
    }

    /// True while work is queued or in flight since the last idle flush.
    ///
    /// Readers raise the flag after their push, so a merge loop that drains
    /// the record and flushes first can leave it set until the next idle
    /// flush. Treat it as a hint, never as a commit barrier.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Relaxed)
    }

    pub fn set_processing(&self, processing: bool) {
        self.processing.store(processing, Ordering::Relaxed);
    }

    /// Counts one read record. Every [`SAMPLE_INTERVAL`] reads, returns the
    /// records-per-second rate over the window that just closed.
    pub fn record_read(&self) -> Option<f64> {
        let reads = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        if reads % SAMPLE_INTERVAL != 0 {
            return None;
        }
        let mut started = self.sample_started.lock().ok()?;
        let elapsed = started.elapsed();
        *started = Instant::now();
        Some(SAMPLE_INTERVAL as f64 / elapsed.as_secs_f64().max(1e-9))
    }

    /// Total records read across all connections.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn add_read_time(&self, elapsed: Duration) {
        add_nanos(&self.read_nanos, elapsed);
    }

    pub fn add_decode_time(&self, elapsed: Duration) {
        add_nanos(&self.decode_nanos, elapsed);
    }

    pub fn add_merge_time(&self, elapsed: Duration) {
        add_nanos(&self.merge_nanos, elapsed);
    }

    pub fn timings(&self) -> StageTimings {
        StageTimings {
            read: Duration::from_nanos(self.read_nanos.load(Ordering::Relaxed)),
            decode: Duration::from_nanos(self.decode_nanos.load(Ordering::Relaxed)),
            merge: Duration::from_nanos(self.merge_nanos.load(Ordering::Relaxed)),
        }
    }
}

fn add_nanos(counter: &AtomicU64, elapsed: Duration) {
    let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    counter.fetch_add(nanos, Ordering::Relaxed);
}
