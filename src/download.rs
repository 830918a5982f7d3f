//! Track download orchestration.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::{StreamExt, stream};
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::http::Gateway;
use crate::playlist::{Playlist, Track};
use crate::retry::with_retry;
use crate::stats::{DownloadSummary, SummaryBuilder, TrackStats, TransferTracker};

/// Classification of a destination's current state on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// The final file exists and is not empty.
    Complete,
    /// A `.part` file from an earlier run holds `existing` bytes.
    Partial {
        /// Bytes already on disk.
        existing: u64,
    },
    /// Nothing usable on disk.
    Missing,
}

/// Trait for receiving download progress updates.
///
/// All methods have default no-op implementations. `index` is the track's
/// position in the playlist.
pub trait DownloadProgress: Send + Sync {
    /// Called before a track's transfer begins, in playlist order.
    fn on_track_start(&self, _index: usize, _track: &Track, _path: &Path) {}

    /// Called once the server answered; `total` includes resumed bytes when known.
    fn on_transfer_start(&self, _index: usize, _total: Option<u64>, _resumed_from: u64) {}

    /// Called for every received chunk.
    fn on_progress(&self, _index: usize, _bytes_delta: u64, _speed: u64) {}

    /// Called when a track is fully written.
    ///
    /// During [`Downloader::download_all`] completions and errors are held
    /// back until every earlier track has finished, so they arrive in
    /// playlist order.
    fn on_track_complete(&self, _index: usize, _path: &Path, _stats: &TrackStats) {}

    /// Called when a track's file already exists and is left alone.
    fn on_track_skipped(&self, _index: usize, _path: &Path) {}

    /// Called when a track fails for good.
    fn on_error(&self, _index: usize, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// What happened to one track.
#[derive(Debug)]
pub enum TrackOutcome {
    /// Transferred in this run.
    Downloaded {
        /// Written file.
        path: PathBuf,
        /// Transfer statistics.
        stats: TrackStats,
    },
    /// Already on disk.
    Skipped {
        /// Existing file.
        path: PathBuf,
    },
    /// Failed after all retries.
    Failed {
        /// Intended destination.
        path: PathBuf,
        /// Final error.
        error: Error,
    },
    /// Never started because an earlier failure aborted the run.
    NotAttempted {
        /// Intended destination.
        path: PathBuf,
    },
}

impl TrackOutcome {
    /// The file on disk, for downloaded or skipped tracks.
    #[must_use]
    pub fn completed_path(&self) -> Option<&Path> {
        match self {
            Self::Downloaded { path, .. } | Self::Skipped { path } => Some(path),
            Self::Failed { .. } | Self::NotAttempted { .. } => None,
        }
    }
}

/// Outcome of one track, keyed by its playlist index.
#[derive(Debug)]
pub struct TrackReport {
    /// Position in the playlist.
    pub index: usize,
    /// What happened.
    pub outcome: TrackOutcome,
}

/// Per-track results of [`Downloader::download_all`], sorted by track index.
#[derive(Debug)]
pub struct DownloadReport {
    /// One entry per track.
    pub tracks: Vec<TrackReport>,
    /// Aggregate statistics.
    pub summary: DownloadSummary,
}

impl DownloadReport {
    /// Returns true if every track is on disk.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tracks
            .iter()
            .all(|t| t.outcome.completed_path().is_some())
    }

    /// Files on disk, in track order.
    #[must_use]
    pub fn completed_paths(&self) -> Vec<&Path> {
        self.tracks
            .iter()
            .filter_map(|t| t.outcome.completed_path())
            .collect()
    }

    /// Failed tracks with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.tracks.iter().filter_map(|t| match &t.outcome {
            TrackOutcome::Failed { error, .. } => Some((t.index, error)),
            _ => None,
        })
    }

    /// Converts the report into the list of files, or the first real failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the lowest-index failed track, preferring a
    /// genuine failure over a cancellation it caused.
    pub fn into_paths(self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.tracks.len());
        let mut cancelled = None;
        for report in self.tracks {
            match report.outcome {
                TrackOutcome::Downloaded { path, .. } | TrackOutcome::Skipped { path } => {
                    paths.push(path);
                }
                TrackOutcome::Failed {
                    error: Error::Cancelled,
                    ..
                } => cancelled = cancelled.or(Some(Error::Cancelled)),
                TrackOutcome::Failed { error, .. } => return Err(error),
                TrackOutcome::NotAttempted { .. } => {}
            }
        }
        cancelled.map_or(Ok(paths), Err)
    }
}

/// Returns the `.part` file path for a given final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// A track waiting for a transfer slot.
struct QueuedTrack {
    index: usize,
    track: Track,
    path: PathBuf,
    /// Resolves once the previous track writing the same file is done.
    after: Option<oneshot::Receiver<()>>,
    /// Dropped when this track is done, releasing the next writer.
    done: Option<oneshot::Sender<()>>,
}

/// Links tracks that resolve to the same file so they run one after another
/// in track order. The later track's audio ends up on disk.
fn chain_shared_destinations(queued: Vec<(usize, Track, PathBuf)>) -> Vec<QueuedTrack> {
    let mut jobs: Vec<QueuedTrack> = Vec::with_capacity(queued.len());
    let mut last_writer: HashMap<PathBuf, usize> = HashMap::new();
    for (index, track, path) in queued {
        let mut after = None;
        if let Some(&prev) = last_writer.get(&path) {
            log::warn!(
                "Tracks {} and {index} both write {}; keeping track {index}",
                jobs[prev].index,
                path.display()
            );
            let (done, wait) = oneshot::channel();
            jobs[prev].done = Some(done);
            after = Some(wait);
        }
        last_writer.insert(path.clone(), jobs.len());
        jobs.push(QueuedTrack {
            index,
            track,
            path,
            after,
            done: None,
        });
    }
    jobs
}

/// A completion or error waiting for its turn.
enum TrackEvent {
    Complete(PathBuf, TrackStats),
    Failed(String),
}

impl TrackEvent {
    fn from_outcome(outcome: &TrackOutcome) -> Option<Self> {
        match outcome {
            TrackOutcome::Downloaded { path, stats } => {
                Some(Self::Complete(path.clone(), stats.clone()))
            }
            TrackOutcome::Failed {
                error: Error::Cancelled,
                ..
            }
            | TrackOutcome::Skipped { .. }
            | TrackOutcome::NotAttempted { .. } => None,
            TrackOutcome::Failed { error, .. } => Some(Self::Failed(error.to_string())),
        }
    }
}

#[derive(Default)]
struct PendingEvents {
    /// Queue slot whose event goes out next.
    next: usize,
    ready: BTreeMap<usize, (usize, Option<TrackEvent>)>,
}

/// Releases per-track events in queue order, whatever order tracks finish in.
struct OrderedEvents<'a> {
    progress: &'a Arc<dyn DownloadProgress>,
    pending: Mutex<PendingEvents>,
}

impl<'a> OrderedEvents<'a> {
    fn new(progress: &'a Arc<dyn DownloadProgress>) -> Self {
        Self {
            progress,
            pending: Mutex::new(PendingEvents::default()),
        }
    }

    /// Records the outcome of queue slot `slot` and emits every event whose
    /// predecessors have all finished.
    fn finish(&self, slot: usize, index: usize, outcome: &TrackOutcome) {
        let Ok(mut guard) = self.pending.lock() else {
            return;
        };
        let pending = &mut *guard;
        pending
            .ready
            .insert(slot, (index, TrackEvent::from_outcome(outcome)));
        while let Some((index, event)) = pending.ready.remove(&pending.next) {
            pending.next += 1;
            match event {
                Some(TrackEvent::Complete(path, stats)) => {
                    self.progress.on_track_complete(index, &path, &stats);
                }
                Some(TrackEvent::Failed(error)) => self.progress.on_error(index, &error),
                None => {}
            }
        }
    }
}

/// Downloads playlist tracks to local files.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    gateway: Gateway,
    config: DownloadConfig,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub const fn new(gateway: Gateway, config: DownloadConfig) -> Self {
        Self {
            gateway,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(gateway: Gateway, config: DownloadConfig, fs: F) -> Self {
        Self {
            gateway,
            config,
            fs,
        }
    }

    /// Returns a reference to the HTTP gateway.
    #[must_use]
    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Classifies a destination's current status on disk.
    async fn classify_file(&self, path: &Path) -> FileStatus {
        if !self.config.force_overwrite
            && self.fs.file_size(path).await.is_some_and(|size| size > 0)
        {
            return FileStatus::Complete;
        }
        if self.config.resume_partial
            && let Some(existing) = self.fs.file_size(&part_path(path)).await.filter(|&n| n > 0)
        {
            return FileStatus::Partial { existing };
        }
        FileStatus::Missing
    }

    /// Ensures the parent directory exists for a file path.
    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// One attempt at transferring a track into `{path}.part` and renaming it.
    async fn transfer(
        &self,
        index: usize,
        track: &Track,
        path: &Path,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<TrackStats> {
        let part = part_path(path);
        let existing = match self.classify_file(path).await {
            FileStatus::Partial { existing } => existing,
            FileStatus::Complete | FileStatus::Missing => 0,
        };

        let response = self
            .gateway
            .open_stream(track.stream_url(), Some(existing))
            .await?;
        let resumed_from = if existing > 0 && response.status() == StatusCode::PARTIAL_CONTENT {
            existing
        } else {
            0
        };
        if existing > 0 && resumed_from == 0 {
            log::debug!("Server ignored range for track {index}, restarting");
        }

        let mut file = if resumed_from > 0 {
            self.fs.append_file(&part).await?
        } else {
            self.fs.create_file(&part).await?
        };

        let total = response.content_length().map(|len| len + resumed_from);
        progress.on_transfer_start(index, total, resumed_from);
        let tracker = TransferTracker::new(resumed_from);

        let mut body = response.bytes_stream();
        let written: Result<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                let delta = chunk.len() as u64;
                let speed = tracker.record_bytes(delta);
                progress.on_progress(index, delta, speed);
            }
            Ok(())
        }
        .await;

        // Flush on every exit path; the handle closes when dropped.
        let flushed = file.flush().await;
        drop(file);
        written?;
        flushed?;

        self.fs.rename_file(&part, path).await?;
        Ok(tracker.finish())
    }

    /// Removes a track's `.part` file. Only a missing file is expected.
    async fn discard_part(&self, path: &Path) {
        let part = part_path(path);
        match self.fs.remove_file(&part).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove {}: {e}", part.display()),
        }
    }

    /// Retries [`Self::transfer`] until it succeeds, fails for good or is
    /// cancelled. Reports nothing to `progress` beyond transfer events.
    async fn run_track(
        &self,
        index: usize,
        track: &Track,
        path: &Path,
        progress: &Arc<dyn DownloadProgress>,
        cancellation_token: Option<&CancellationToken>,
    ) -> Result<TrackStats> {
        self.ensure_parent_dir(path).await?;

        let label = format!("track {index}");
        let result = with_retry(&self.config.retry, &label, move |_| async move {
            match cancellation_token {
                Some(token) => tokio::select! {
                    res = self.transfer(index, track, path, progress) => res,
                    () = token.cancelled() => Err(Error::Cancelled),
                },
                None => self.transfer(index, track, path, progress).await,
            }
        })
        .await;

        if result.is_err() && self.config.cleanup_on_error {
            self.discard_part(path).await;
        }
        result
    }

    /// Downloads a single track, retrying transient failures.
    ///
    /// Writes to `{path}.part` and renames to `{path}` on success. On final
    /// failure the `.part` file is removed if `cleanup_on_error` is set.
    /// If a `cancellation_token` is provided, the download can be cancelled.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, or [`Error::Cancelled`].
    pub async fn download_track(
        &self,
        index: usize,
        track: &Track,
        path: &Path,
        progress: &Arc<dyn DownloadProgress>,
        cancellation_token: Option<CancellationToken>,
    ) -> Result<TrackStats> {
        let result = self
            .run_track(index, track, path, progress, cancellation_token.as_ref())
            .await;
        if let Err(e) = &result
            && !matches!(e, Error::Cancelled)
        {
            progress.on_error(index, &e.to_string());
        }
        result
    }

    /// Runs one queued track to completion and converts the result.
    async fn fetch_track(
        &self,
        index: usize,
        track: &Track,
        path: PathBuf,
        progress: &Arc<dyn DownloadProgress>,
        token: &CancellationToken,
    ) -> TrackOutcome {
        match self
            .run_track(index, track, &path, progress, Some(token))
            .await
        {
            Ok(stats) => TrackOutcome::Downloaded { path, stats },
            Err(error) => {
                if self.config.fail_fast && !matches!(error, Error::Cancelled) {
                    token.cancel();
                }
                TrackOutcome::Failed { path, error }
            }
        }
    }

    /// Downloads every track of `playlist` with bounded concurrency.
    ///
    /// Tracks already on disk are skipped. Progress events reach `progress`
    /// in track order: starts as transfer slots free up, completions and
    /// errors once every earlier track has finished. Tracks sharing a
    /// destination run one after another, so the later one is kept. Files on
    /// disk afterwards are recorded in the playlist in track order. With
    /// `fail_fast`, the first failure cancels in-flight transfers and leaves
    /// the remaining tracks unattempted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the output directory cannot be created;
    /// per-track failures are reported in the [`DownloadReport`].
    pub async fn download_all(
        &self,
        playlist: &mut Playlist,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<DownloadReport> {
        let mut builder = SummaryBuilder::new();

        if playlist.is_empty() {
            return Ok(DownloadReport {
                tracks: Vec::new(),
                summary: builder.build(),
            });
        }

        self.fs.create_dir_all(&self.config.output_dir).await?;

        let mut tracks = Vec::with_capacity(playlist.len());
        let mut queued: Vec<(usize, Track, PathBuf)> = Vec::new();
        for (index, track) in playlist.tracks().iter().enumerate() {
            let path = playlist.destination(track, &self.config.output_dir, &self.config.extension);
            if self.classify_file(&path).await == FileStatus::Complete {
                log::info!("Skipping track {index}: {} exists", path.display());
                progress.on_track_skipped(index, &path);
                tracks.push(TrackReport {
                    index,
                    outcome: TrackOutcome::Skipped { path },
                });
            } else {
                queued.push((index, track.clone(), path));
            }
        }

        log::info!(
            "Downloading {} of {} track(s) of \"{}\" ({} at a time)",
            queued.len(),
            playlist.len(),
            playlist.title(),
            self.config.concurrent_tracks.max(1)
        );

        let jobs = chain_shared_destinations(queued);
        let events = OrderedEvents::new(progress);
        let token = CancellationToken::new();
        let fetched: Vec<TrackReport> = stream::iter(jobs.into_iter().enumerate())
            .map(|(slot, job)| {
                let token = token.clone();
                let events = &events;
                let started = !token.is_cancelled();
                if started {
                    progress.on_track_start(job.index, &job.track, &job.path);
                }
                async move {
                    let QueuedTrack {
                        index,
                        track,
                        path,
                        after,
                        done,
                    } = job;
                    let outcome = if started {
                        if let Some(after) = after {
                            let _ = after.await;
                            // The earlier writer's leftovers are not ours to resume.
                            if !token.is_cancelled() {
                                self.discard_part(&path).await;
                            }
                        }
                        self.fetch_track(index, &track, path, progress, &token).await
                    } else {
                        TrackOutcome::NotAttempted { path }
                    };
                    drop(done);
                    events.finish(slot, index, &outcome);
                    TrackReport { index, outcome }
                }
            })
            .buffer_unordered(self.config.concurrent_tracks.max(1))
            .collect()
            .await;

        tracks.extend(fetched);
        tracks.sort_by_key(|t| t.index);

        for report in &tracks {
            match &report.outcome {
                TrackOutcome::Downloaded { path, stats } => {
                    builder.add_download(stats);
                    playlist.record_download(path.clone());
                }
                TrackOutcome::Skipped { path } => {
                    builder.add_skipped();
                    playlist.record_download(path.clone());
                }
                TrackOutcome::Failed { error, .. } => {
                    log::error!("Track {} failed: {error}", report.index);
                    builder.add_failed();
                }
                TrackOutcome::NotAttempted { .. } => builder.add_not_attempted(),
            }
        }

        Ok(DownloadReport {
            tracks,
            summary: builder.build(),
        })
    }
}
