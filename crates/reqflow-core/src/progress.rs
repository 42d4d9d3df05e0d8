//! Advisory progress reporting.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A progress update, as a percentage plus a short status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub percent: u8,
    pub message: String,
}

impl Progress {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
        }
    }

    /// Progress of `done` out of `total` items.
    pub fn fraction(done: usize, total: usize, message: impl Into<String>) -> Self {
        let percent = if total == 0 { 100 } else { (done.min(total) * 100 / total) as u8 };
        Self::new(percent, message)
    }
}

/// Caller-supplied progress callback.
pub type ProgressSink = Arc<dyn Fn(Progress) + Send + Sync>;

/// Fans a progress update out to zero or more sinks.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sinks: Vec<ProgressSink>,
}

impl ProgressReporter {
    /// A reporter that drops every update.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn new(sink: Option<ProgressSink>) -> Self {
        Self {
            sinks: sink.into_iter().collect(),
        }
    }

    /// Add another sink.
    pub fn with_sink(mut self, sink: ProgressSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        self.emit(Progress::new(percent, message));
    }

    pub fn emit(&self, progress: Progress) {
        for sink in &self.sinks {
            sink(progress.clone());
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fraction() {
        assert_eq!(Progress::fraction(1, 4, "").percent, 25);
        assert_eq!(Progress::fraction(3, 3, "").percent, 100);
        assert_eq!(Progress::fraction(0, 0, "").percent, 100);
        assert_eq!(Progress::new(250, "").percent, 100);
    }

    #[test]
    fn test_reporter_fans_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&seen);
        let b = Arc::clone(&seen);
        let reporter = ProgressReporter::new(Some(Arc::new(move |p: Progress| a.lock().unwrap().push(p.percent))))
            .with_sink(Arc::new(move |p: Progress| b.lock().unwrap().push(p.percent + 1)));

        reporter.report(50, "halfway");
        assert_eq!(*seen.lock().unwrap(), vec![50, 51]);

        ProgressReporter::silent().report(10, "nobody listens");
    }
}
