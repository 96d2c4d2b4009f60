mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use toksave_core::{
    CancellationToken, HttpClientConfig, HttpVideoClient, Mode, ProcessControl, ProcessOptions,
    RetryPolicy,
};

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Videos from the "Like List"
    Liked,
    /// Videos from "Favorite Videos"
    Bookmarked,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Liked => Mode::Liked,
            ModeArg::Bookmarked => Mode::Bookmarked,
        }
    }
}

#[derive(Parser)]
#[command(name = "toksave", version, about = "Save liked and bookmarked videos from an activity export to disk")]
struct Cli {
    /// Which list to download
    #[arg(value_enum)]
    mode: ModeArg,

    /// Activity export JSON file
    source: PathBuf,

    /// Folder to save videos to
    destination: PathBuf,

    /// Retry videos that previously failed as unavailable
    #[arg(long)]
    failures: bool,

    /// Include author and caption in video file names
    #[arg(long)]
    pretty_names: bool,

    /// Skip saving the JSON metadata next to each video
    #[arg(long)]
    no_json: bool,

    /// Base URL of the platform web API
    #[arg(long, env = "TOKSAVE_API_BASE", default_value = toksave_core::http::DEFAULT_API_BASE)]
    api_base: String,

    /// Device id sent with API requests (random if omitted)
    #[arg(long)]
    device_id: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Log every saved or skipped video
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the progress bar and warnings
    #[arg(short, long)]
    quiet: bool,
}

/// Cancel `token`. Returns false if it was already cancelled.
fn request_stop(token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    token.cancel();
    true
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    logging::init(level)?;

    let options = ProcessOptions {
        mode: cli.mode.into(),
        source: cli.source,
        destination: cli.destination,
        check_failures: cli.failures,
        pretty_names: cli.pretty_names,
        save_json: !cli.no_json,
        retry: RetryPolicy::default(),
    };

    let client = HttpVideoClient::new(&HttpClientConfig {
        api_base: cli.api_base,
        device_id: cli.device_id,
        timeout_secs: cli.timeout_secs,
    })?;

    // First Ctrl-C finishes the current video, the second exits immediately.
    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            if !request_stop(&token) {
                std::process::exit(130);
            }
        })
        .context("install Ctrl-C handler")?;
    }

    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}")
                .context("progress bar template")?,
        );
        bar
    };

    let progress = |_stage: &str, current: u64, total: u64, message: &str| {
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    };

    let control = ProcessControl::new().with_cancel_token(token);
    let report = toksave_core::process_with_control(&options, &client, &control, &progress)?;
    pb.finish_and_clear();

    if report.is_nothing_to_do() {
        println!("Nothing new to download");
        return Ok(());
    }

    if report.cancelled {
        eprintln!("Interrupted after saving {} videos", report.saved);
    }

    if !report.failures.is_empty() {
        println!("Failed downloads: {}", report.failures.len());
    }

    Ok(())
}
