//! Logging and the `pip update` progress bar.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pip_update::ProgressCallback;

const WAITING_TEMPLATE: &str = "{spinner:.green} {msg} ({elapsed})";
const COUNTING_TEMPLATE: &str = "{msg:>18} [{bar:40.green/dim}] {pos}/{len} ({per_sec}, eta {eta})";

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`). Log lines are
/// printed through the returned [`MultiProgress`] so they don't tear the
/// bars drawn on it.
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}

/// Counts resolved records.
pub struct RecordsBar {
    bar: ProgressBar,
    counting: ProgressStyle,
}

impl RecordsBar {
    /// Spins while the spatial sources are indexed, then counts records
    /// once their number is known.
    #[must_use]
    pub fn start(multi: &MultiProgress) -> Arc<dyn ProgressCallback> {
        let waiting = ProgressStyle::with_template(WAITING_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let counting = ProgressStyle::with_template(COUNTING_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bar = multi.add(ProgressBar::new_spinner().with_style(waiting));
        bar.enable_steady_tick(Duration::from_millis(120));

        Arc::new(Self { bar, counting })
    }
}

impl ProgressCallback for RecordsBar {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counting.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}
