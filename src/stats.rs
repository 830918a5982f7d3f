//! Transfer statistics for tracks and whole runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics for one finished track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackStats {
    /// Bytes received in this run.
    pub bytes: u64,
    /// Bytes already on disk from an earlier run when the transfer resumed.
    pub resumed_from: u64,
    /// Time spent on the transfer.
    pub elapsed: Duration,
    /// Average speed in bytes per second.
    pub average_speed: u64,
    /// Peak speed in bytes per second.
    pub peak_speed: u64,
}

/// Aggregate statistics for one `download_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Tracks transferred in this run.
    pub tracks_downloaded: usize,
    /// Tracks already present on disk.
    pub tracks_skipped: usize,
    /// Tracks that failed.
    pub tracks_failed: usize,
    /// Tracks never started because the run was aborted.
    pub tracks_not_attempted: usize,
    /// Bytes received in this run.
    pub total_bytes: u64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Highest per-track speed observed.
    pub peak_speed: u64,
}

impl DownloadSummary {
    /// Average speed over the whole run in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_sec(self.total_bytes, self.elapsed)
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_sec(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Live counters for a track transfer in progress.
pub struct TransferTracker {
    started: Instant,
    resumed_from: u64,
    received: AtomicU64,
    peak_speed: AtomicU64,
}

impl TransferTracker {
    /// Starts tracking a transfer that begins at byte `resumed_from`.
    #[must_use]
    pub fn new(resumed_from: u64) -> Self {
        Self {
            started: Instant::now(),
            resumed_from,
            received: AtomicU64::new(0),
            peak_speed: AtomicU64::new(0),
        }
    }

    /// Records a received chunk and returns the current average speed.
    pub fn record_bytes(&self, bytes: u64) -> u64 {
        let total = self.received.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let speed = bytes_per_sec(total, self.started.elapsed());
        self.peak_speed.fetch_max(speed, Ordering::Relaxed);
        speed
    }

    /// Bytes received so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Highest speed seen so far.
    #[must_use]
    pub fn peak_speed(&self) -> u64 {
        self.peak_speed.load(Ordering::Relaxed)
    }

    /// Freezes the counters into [`TrackStats`].
    #[must_use]
    pub fn finish(&self) -> TrackStats {
        let elapsed = self.started.elapsed();
        let bytes = self.received();
        TrackStats {
            bytes,
            resumed_from: self.resumed_from,
            elapsed,
            average_speed: bytes_per_sec(bytes, elapsed),
            peak_speed: self.peak_speed(),
        }
    }
}

/// Accumulates a [`DownloadSummary`].
pub struct SummaryBuilder {
    started: Instant,
    summary: DownloadSummary,
}

impl Default for SummaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryBuilder {
    /// Starts the run clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            summary: DownloadSummary::default(),
        }
    }

    /// Records a transferred track.
    pub fn add_download(&mut self, stats: &TrackStats) {
        self.summary.tracks_downloaded += 1;
        self.summary.total_bytes += stats.bytes;
        self.summary.peak_speed = self.summary.peak_speed.max(stats.peak_speed);
    }

    /// Records a track that was already on disk.
    pub const fn add_skipped(&mut self) {
        self.summary.tracks_skipped += 1;
    }

    /// Records a failed track.
    pub const fn add_failed(&mut self) {
        self.summary.tracks_failed += 1;
    }

    /// Records a track that never started.
    pub const fn add_not_attempted(&mut self) {
        self.summary.tracks_not_attempted += 1;
    }

    /// Stops the clock and returns the summary.
    #[must_use]
    pub fn build(mut self) -> DownloadSummary {
        self.summary.elapsed = self.started.elapsed();
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_average_speed_zero_elapsed() {
        let summary = DownloadSummary {
            total_bytes: 1000,
            ..DownloadSummary::default()
        };
        assert_eq!(summary.average_speed(), 0);
    }

    #[test]
    fn summary_average_speed() {
        let summary = DownloadSummary {
            total_bytes: 1000,
            elapsed: Duration::from_secs(2),
            ..DownloadSummary::default()
        };
        assert_eq!(summary.average_speed(), 500);
    }

    #[test]
    fn tracker_counts_bytes() {
        let tracker = TransferTracker::new(10);
        tracker.record_bytes(100);
        tracker.record_bytes(50);
        let stats = tracker.finish();
        assert_eq!(stats.bytes, 150);
        assert_eq!(stats.resumed_from, 10);
    }

    #[test]
    fn builder_accumulates() {
        let mut builder = SummaryBuilder::new();
        builder.add_download(&TrackStats {
            bytes: 500,
            resumed_from: 0,
            elapsed: Duration::from_secs(1),
            average_speed: 500,
            peak_speed: 600,
        });
        builder.add_download(&TrackStats {
            bytes: 300,
            resumed_from: 0,
            elapsed: Duration::from_secs(1),
            average_speed: 300,
            peak_speed: 900,
        });
        builder.add_skipped();
        builder.add_failed();
        builder.add_not_attempted();

        let summary = builder.build();
        assert_eq!(summary.tracks_downloaded, 2);
        assert_eq!(summary.tracks_skipped, 1);
        assert_eq!(summary.tracks_failed, 1);
        assert_eq!(summary.tracks_not_attempted, 1);
        assert_eq!(summary.total_bytes, 800);
        assert_eq!(summary.peak_speed, 900);
    }
}
