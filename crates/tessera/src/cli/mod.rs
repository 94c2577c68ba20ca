use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tessera_fetch::{DownloadSpec, Downloader, FetchOptions, ProgressSink};
use tracing::debug;

use crate::utils::client::ClientSetting;
use crate::utils::ui::tracker::{BarTracker, BarTrackerConfig, Tracker};

pub mod app;

pub use app::App;

pub fn run(app: App) -> Result<()> {
    let url = app.url().context("no URL given")?.clone();

    let client = ClientSetting {
        proxies: (!app.proxies.is_empty()).then(|| app.proxies.clone()),
        connect_timeout: app.timeout.map(Duration::from_secs),
    }
    .build()
    .context("failed to build HTTP client")?;

    let spec = DownloadSpec::new(url.as_str(), &app.output)
        .concurrency(app.concurrency)
        .block_size(app.block_size);
    let options = FetchOptions::default()
        .max_retries(app.retries)
        .headers(app.headers.clone());
    debug!(?spec, ?options, "starting");

    let tracker = Arc::new(BarTracker::new(BarTrackerConfig::default()));
    let downloader = Downloader::new(client, spec)
        .with_options(options)
        .with_progress(Arc::clone(&tracker) as Arc<dyn ProgressSink>);

    let token = downloader.cancellation_token();
    ctrlc::set_handler(move || token.cancel()).context("failed to install Ctrl-C handler")?;

    let outcome = match downloader.run_blocking() {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            tracker.finish(Some("interrupted".to_string()));
            bail!("download interrupted; run the same command again to resume");
        }
        Err(e) => {
            tracker.finish(Some("failed".to_string()));
            return Err(e).with_context(|| format!("failed to download {url}"));
        }
    };
    tracker.finish(None);

    let resumed = if outcome.ranges_resumed > 0 {
        format!(", {} ranges resumed", outcome.ranges_resumed)
    } else {
        String::new()
    };
    println!("{} bytes written to {}{resumed}", outcome.bytes_written, outcome.path.display());
    Ok(())
}
