// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress reporting from long-running pipeline work.
//
// Sinks are fire-and-forget: the pipeline never waits on them and a sink that
// panics is silenced rather than allowed to abort the run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::SyncSender;

use tracing::warn;

/// Receiver of fractional progress in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f32);
}

impl<F> ProgressSink for F
where
    F: Fn(f32) + Send + Sync,
{
    fn report(&self, fraction: f32) {
        self(fraction)
    }
}

/// Bounded channel sink. A full channel drops the update instead of blocking.
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub SyncSender<f32>);

impl ProgressSink for ChannelProgress {
    fn report(&self, fraction: f32) {
        let _ = self.0.try_send(fraction);
    }
}

/// Sink that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f32) {}
}

/// Wraps a sink so that values reaching it are clamped, never decrease, and
/// cannot take the caller down with them.
pub(crate) struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    last: f32,
    sink_failed: bool,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: 0.0,
            sink_failed: false,
        }
    }

    pub(crate) fn report(&mut self, fraction: f32) {
        if self.sink_failed || !fraction.is_finite() {
            return;
        }
        let value = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = value;
        let sink = self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.report(value))).is_err() {
            warn!("progress sink panicked; further updates suppressed");
            self.sink_failed = true;
        }
    }

    pub(crate) fn last(&self) -> f32 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn reporter_is_monotonic_and_clamped() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: f32| seen.lock().expect("lock").push(p);
        let mut reporter = ProgressReporter::new(&sink);
        for p in [0.1, 0.4, 0.2, 1.7, -3.0, f32::NAN] {
            reporter.report(p);
        }
        assert_eq!(*seen.lock().expect("lock"), vec![0.1, 0.4, 0.4, 1.0, 1.0]);
        assert_eq!(reporter.last(), 1.0);
    }

    #[test]
    fn full_channel_does_not_block() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let sink = ChannelProgress(tx);
        let mut reporter = ProgressReporter::new(&sink);
        reporter.report(0.2);
        reporter.report(0.5);
        reporter.report(0.9);
        assert_eq!(rx.try_recv().expect("first update"), 0.2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn panicking_sink_is_silenced() {
        let sink = |p: f32| assert!(p < 0.0, "sink exploded");
        let mut reporter = ProgressReporter::new(&sink);
        reporter.report(0.3);
        reporter.report(0.6);
        assert_eq!(reporter.last(), 0.3);
    }
}
