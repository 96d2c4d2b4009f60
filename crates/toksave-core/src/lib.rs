pub mod archive;
pub mod download;
pub mod export;
pub mod fetcher;
pub mod http;
pub mod ledger;
pub mod record;
pub mod writer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_save_json() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub mode: export::Mode,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Retry videos recorded in the failure ledger.
    #[serde(default)]
    pub check_failures: bool,
    #[serde(default)]
    pub pretty_names: bool,
    #[serde(default = "default_save_json")]
    pub save_json: bool,
    #[serde(default)]
    pub retry: download::RetryPolicy,
}

/// Control options for process execution (cancellation, pacing).
#[derive(Clone, Default)]
pub struct ProcessControl {
    /// Cancellation token checked between videos.
    pub cancel_token: Option<download::CancellationToken>,
    /// Replaces `std::thread::sleep` for retry and politeness pauses.
    pub pause: Option<Arc<download::PauseFn>>,
}

impl ProcessControl {
    /// Create a new ProcessControl with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create ProcessControl with a cancellation token.
    pub fn with_cancel_token(mut self, token: download::CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Create ProcessControl with a custom pause function.
    pub fn with_pause(mut self, pause: Arc<download::PauseFn>) -> Self {
        self.pause = Some(pause);
        self
    }
}

// Re-export the types most callers need
pub use download::{CancellationToken, RetryPolicy, RunReport};
pub use export::Mode;
pub use fetcher::{FetchError, MediaContent, VideoClient, VideoDescriptor};
pub use http::{HttpClientConfig, HttpVideoClient};
pub use ledger::{FailureLedger, LEDGER_FILENAME};
pub use record::{ExportRecord, RecordError, Timestamp, VideoId};

/// Type alias for progress callback
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

fn thread_pause(duration: Duration) {
    std::thread::sleep(duration);
}

/// Download everything new in the export with progress reporting.
pub fn process<C: VideoClient>(
    options: &ProcessOptions,
    client: &C,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<RunReport> {
    process_with_control(options, client, &ProcessControl::default(), progress_callback)
}

/// Download everything new in the export with progress reporting and control options.
pub fn process_with_control<C: VideoClient>(
    options: &ProcessOptions,
    client: &C,
    control: &ProcessControl,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<RunReport> {
    // Stage 1: Read the export
    let records = export::load_export(&options.source, options.mode)?;

    // Stage 2: Skip what is already saved or known to be gone
    let pending = archive::filter_pending(&records, &options.destination, options.check_failures)?;
    tracing::info!(
        total = records.len(),
        pending = pending.len(),
        "checked {}",
        options.destination.display()
    );

    if pending.is_empty() {
        return Ok(RunReport::nothing_to_do());
    }

    // Stage 3: Download one at a time
    let pause: &download::PauseFn = match control.pause.as_deref() {
        Some(pause) => pause,
        None => &thread_pause,
    };
    let report = download::download_all(
        client,
        &pending,
        options,
        control.cancel_token.as_ref(),
        progress_callback,
        pause,
    )?;

    tracing::info!(
        saved = report.saved,
        failed = report.failures.len(),
        abandoned = report.abandoned,
        errored = report.errored,
        malformed = report.malformed,
        "run finished"
    );

    Ok(report)
}
