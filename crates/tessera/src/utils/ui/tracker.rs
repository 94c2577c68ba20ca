use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use tessera_fetch::{FetchPhase, Progress, ProgressSink};

pub trait Tracker {
    type Ctx: Clone;
    fn new(ctx: Self::Ctx) -> Self;
    fn finish(&self, msg: Option<String>);
}

const PB_STYLE: &str =
    "{spinner:.blue} {prefix:.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    let pb_style = match ProgressStyle::with_template(PB_STYLE) {
        Ok(pb_style) => pb_style.tick_chars(TICK).progress_chars(PB_CHARS),
        Err(_) => return None,
    };

    Some(pb_style)
});

/// Terminal progress bar fed by the download's progress snapshots.
pub struct BarTracker {
    pub pb: ProgressBar,
    shown:  AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct BarTrackerConfig {
    pub len: Option<u64>,
}

impl Tracker for BarTracker {
    type Ctx = BarTrackerConfig;

    fn new(ctx: Self::Ctx) -> Self {
        let pb = if let Some(len) = ctx.len {
            ProgressBar::new(len)
        } else {
            ProgressBar::no_length()
        };

        let pb_style = PB_TEMPLATE.as_ref().cloned().unwrap_or_else(ProgressStyle::default_bar);
        pb.set_style(pb_style);
        BarTracker { pb, shown: AtomicU64::new(0) }
    }

    fn finish(&self, msg: Option<String>) {
        if let Some(msg) = msg {
            self.pb.finish_with_message(msg);
        }
        self.pb.finish();
    }
}

impl ProgressSink for BarTracker {
    fn render(&self, progress: &Progress) -> io::Result<()> {
        if let Some(total) = progress.total_bytes {
            if self.pb.length() != Some(total) {
                self.pb.set_length(total);
            }
        }

        // Snapshots from concurrent workers may arrive out of order.
        let bytes = progress.bytes_downloaded;
        if self.shown.fetch_max(bytes, Ordering::Relaxed) < bytes {
            self.pb.set_position(bytes);
        }

        match progress.phase {
            FetchPhase::Connecting | FetchPhase::Downloading => {}
            FetchPhase::Merging => self.pb.set_message("merging"),
            FetchPhase::Completed => self.pb.set_message("done"),
        }
        Ok(())
    }

    fn label(&self, output: &Path) {
        if let Some(name) = output.file_name() {
            self.pb.set_prefix(name.to_string_lossy().into_owned());
        }
    }
}
