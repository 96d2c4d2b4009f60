use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive;
use crate::fetcher::{FetchError, MediaContent, VideoClient, VideoDescriptor};
use crate::record::{ExportRecord, VideoId};
use crate::writer;
use crate::{ProcessOptions, ProgressCallback};

/// Blocking pause between requests.
pub type PauseFn = dyn Fn(Duration) + Send + Sync;

/// How hard to try a single video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per video before giving up for this run.
    pub attempts: u32,
    /// Wait after a network error before the next attempt.
    pub retry_pause: Duration,
    /// Wait after a saved video before starting the next one.
    pub politeness_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_pause: Duration::from_secs(10),
            politeness_pause: Duration::from_secs(1),
        }
    }
}

/// Token for cooperative cancellation between videos.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What happened to the videos of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Records left after skipping saved (and ledgered) videos.
    pub pending: u64,
    pub saved: u64,
    /// Videos the platform reported unavailable this run.
    pub failures: Vec<VideoId>,
    /// Gave up after repeated network errors; retried next run.
    pub abandoned: u64,
    /// Unexpected platform errors; retried next run.
    pub errored: u64,
    /// Records without a usable link or date.
    pub malformed: u64,
    pub cancelled: bool,
}

impl RunReport {
    pub fn nothing_to_do() -> Self {
        Self::default()
    }

    pub fn is_nothing_to_do(&self) -> bool {
        self.pending == 0
    }
}

/// Result of fetching one video, after retries.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(VideoDescriptor, MediaContent),
    NotAvailable,
    /// Every attempt hit a network error.
    Exhausted(FetchError),
    Failed(FetchError),
}

fn resolve_and_download<C: VideoClient>(
    client: &C,
    id: &VideoId,
) -> Result<(VideoDescriptor, MediaContent), FetchError> {
    let descriptor = client.resolve(id)?;
    let media = client.download(&descriptor)?;
    Ok((descriptor, media))
}

/// Resolve and download `id`, retrying network errors per `policy`.
pub fn fetch_with_retry<C: VideoClient>(
    client: &C,
    id: &VideoId,
    policy: &RetryPolicy,
    pause: &PauseFn,
) -> FetchOutcome {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        tracing::debug!(%id, attempt, "fetching video");
        match resolve_and_download(client, id) {
            Ok((descriptor, media)) => return FetchOutcome::Fetched(descriptor, media),
            Err(FetchError::NotFound(_)) => return FetchOutcome::NotAvailable,
            Err(e) if e.is_transient() => {
                if attempt >= attempts {
                    return FetchOutcome::Exhausted(e);
                }
                tracing::warn!(%id, attempt, error = %e, "network error, retrying");
                pause(policy.retry_pause);
                attempt += 1;
            }
            Err(e) => return FetchOutcome::Failed(e),
        }
    }
}

/// Download every record in `pending`, one at a time.
///
/// Saved videos are written to `options.destination` and, in failure-checking
/// mode, cleared from the ledger. Unavailable videos are added to the ledger.
/// File system errors abort the run.
pub fn download_all<C: VideoClient>(
    client: &C,
    pending: &[ExportRecord],
    options: &ProcessOptions,
    cancel_token: Option<&CancellationToken>,
    progress: &ProgressCallback<'_>,
    pause: &PauseFn,
) -> anyhow::Result<RunReport> {
    let total = pending.len() as u64;
    let mut report = RunReport {
        pending: total,
        ..RunReport::default()
    };

    for (index, record) in pending.iter().enumerate() {
        if cancel_token.map_or(false, |t| t.is_cancelled()) {
            tracing::info!(remaining = total - index as u64, "cancelled");
            report.cancelled = true;
            break;
        }

        let (id, timestamp) = match record.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(link = ?record.link(), error = %e, "skipping record");
                report.malformed += 1;
                progress("download", index as u64, total, "skipped malformed record");
                continue;
            }
        };

        match fetch_with_retry(client, &id, &options.retry, pause) {
            FetchOutcome::Fetched(descriptor, media) => {
                let saved = writer::save(
                    &options.destination,
                    &descriptor,
                    &media,
                    timestamp,
                    &id,
                    options.pretty_names,
                    options.save_json,
                )?;
                if options.check_failures {
                    archive::clear_failure(&id, &options.destination)?;
                }
                tracing::info!(%id, path = %saved.media.display(), "saved");
                report.saved += 1;
                progress("download", index as u64, total, id.as_str());

                if index + 1 < pending.len() {
                    pause(options.retry.politeness_pause);
                }
            }
            FetchOutcome::NotAvailable => {
                tracing::warn!(%id, "video not available");
                archive::record_failure(&id, &options.destination)?;
                report.failures.push(id.clone());
                progress("download", index as u64, total, id.as_str());
            }
            FetchOutcome::Exhausted(e) => {
                tracing::warn!(%id, error = %e, "giving up after repeated network errors");
                report.abandoned += 1;
                progress("download", index as u64, total, id.as_str());
            }
            FetchOutcome::Failed(e) => {
                tracing::warn!(%id, error = %e, "download failed");
                report.errored += 1;
                progress("download", index as u64, total, id.as_str());
            }
        }
    }

    Ok(report)
}
