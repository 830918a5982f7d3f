//! Progress bars and summary reporting for CLI downloads.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::config::DownloadConfig;
use crate::download::{DownloadProgress, DownloadReport, TrackOutcome};
use crate::format::{format_bytes, format_duration, format_rate};
use crate::playlist::{PlaylistSource, Track};
use crate::session::Session;
use crate::stats::TrackStats;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single track.
fn make_track_bar(total: Option<u64>, name: &str) -> ProgressBar {
    let bar = total.map_or_else(ProgressBar::no_length, ProgressBar::new);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(name.to_string());
    bar
}

/// [`DownloadProgress`] that draws one bar per in-flight track.
pub struct IndicatifProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
}

impl IndicatifProgress {
    #[must_use]
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn take_bar(&self, index: usize) -> Option<ProgressBar> {
        self.bars.lock().ok()?.remove(&index)
    }
}

impl DownloadProgress for IndicatifProgress {
    fn on_track_start(&self, index: usize, track: &Track, path: &Path) {
        let _ = self.multi.println(format!(
            "Downloading chapter-{} ({}) to \"{}\"",
            track.chapter_number(),
            track.stream_url(),
            path.display()
        ));
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let bar = self.multi.add(make_track_bar(None, &name));
        bar.enable_steady_tick(std::time::Duration::from_millis(250));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(index, bar);
        }
    }

    fn on_transfer_start(&self, index: usize, total: Option<u64>, resumed_from: u64) {
        if let Ok(bars) = self.bars.lock()
            && let Some(bar) = bars.get(&index)
        {
            if let Some(total) = total {
                bar.set_length(total);
            }
            bar.set_position(resumed_from);
        }
    }

    fn on_progress(&self, index: usize, bytes_delta: u64, _speed: u64) {
        if let Ok(bars) = self.bars.lock()
            && let Some(bar) = bars.get(&index)
        {
            bar.inc(bytes_delta);
        }
    }

    fn on_track_complete(&self, index: usize, path: &Path, stats: &TrackStats) {
        if let Some(bar) = self.take_bar(index) {
            bar.finish_and_clear();
        }
        let resumed = if stats.resumed_from > 0 {
            format!(", resumed at {}", format_bytes(stats.resumed_from))
        } else {
            String::new()
        };
        let _ = self.multi.println(format!(
            "  {} {} - {} in {} ({} avg, {} peak{resumed})",
            style("✓").green(),
            path.display(),
            format_bytes(stats.bytes),
            format_duration(stats.elapsed),
            format_rate(stats.average_speed),
            format_rate(stats.peak_speed),
        ));
    }

    fn on_track_skipped(&self, _index: usize, path: &Path) {
        let _ = self.multi.println(format!(
            "  {} {} (already downloaded)",
            style("-").dim(),
            path.display()
        ));
    }

    fn on_error(&self, index: usize, error: &str) {
        if let Some(bar) = self.take_bar(index) {
            bar.abandon();
        }
        let _ = self
            .multi
            .println(format!("  {} track {index}: {error}", style("✗").red()));
    }
}

/// Prints the resolved playlist and where its files will go.
pub fn print_playlist(session: &Session, config: &DownloadConfig) {
    let playlist = session.playlist();

    println!("\n{SEPARATOR}");
    println!("{}", style(playlist.title()).bold());
    println!("{SEPARATOR}");
    match session.source() {
        PlaylistSource::Premium(license) => {
            println!("  Premium playlist (license {license})");
        }
        PlaylistSource::PreviewOnly => {
            println!(
                "  {}",
                style("Preview only: no account entitlement found on the page").yellow()
            );
        }
    }
    println!(
        "  Work {}, content {}",
        session.work_id(),
        session.content_id()
    );
    if let Some(expires) = playlist.expires() {
        println!("  Stream links expire at {expires}");
    }
    println!("{SEPARATOR}");

    for track in playlist.tracks() {
        println!(
            "  part {:>3}  chapter {:>3}  -> {}",
            track.part_number(),
            track.chapter_number(),
            playlist
                .destination(track, &config.output_dir, &config.extension)
                .display()
        );
    }

    println!("{SEPARATOR}");
    println!("  {} track(s)", playlist.len());
    println!("{SEPARATOR}\n");
}

/// Prints a summary of a finished download run.
pub fn print_summary(report: &DownloadReport) {
    let summary = &report.summary;

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    if summary.tracks_downloaded > 0 {
        println!("  Tracks downloaded: {}", summary.tracks_downloaded);
        println!("  Total size:        {}", format_bytes(summary.total_bytes));
        println!("  Total time:        {}", format_duration(summary.elapsed));
        println!("  Average speed:     {}", format_rate(summary.average_speed()));
        println!("  Peak speed:        {}", format_rate(summary.peak_speed));
    }
    if summary.tracks_skipped > 0 {
        println!("  Tracks skipped:    {}", summary.tracks_skipped);
    }
    if summary.tracks_failed > 0 {
        println!(
            "  Tracks failed:     {}",
            style(summary.tracks_failed).red()
        );
        for report in &report.tracks {
            if let TrackOutcome::Failed { path, error } = &report.outcome {
                println!("    {}: {error}", path.display());
            }
        }
    }
    if summary.tracks_not_attempted > 0 {
        println!("  Not attempted:     {}", summary.tracks_not_attempted);
    }

    println!("{SEPARATOR}");
}
