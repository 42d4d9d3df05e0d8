//! Terminal progress bars fed from mediator progress sinks.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use reqflow_core::progress::{Progress, ProgressSink};

/// A percentage bar and the sink that drives it.
pub fn percent_bar(prefix: &str) -> (ProgressBar, ProgressSink) {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_prefix(prefix.to_string());

    let handle = bar.clone();
    let sink: ProgressSink = Arc::new(move |p: Progress| {
        handle.set_position(u64::from(p.percent));
        handle.set_message(p.message);
    });
    (bar, sink)
}
