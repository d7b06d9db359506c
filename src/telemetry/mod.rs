//! Structured log trail for client calls.
//!
//! Every logical call (one `tokenize` or one `payments().create`) allocates a correlation id and
//! wraps the configured [`LogSink`] in a [`Logger`] bound to that id. All entries of that call,
//! across all of its attempts, carry the same id.
//!
//! # Entries
//!
//! - `request`, `response`, `aborted`, `closing stream`: emitted by the transport.
//! - `request failed`: emitted by the client after each failed attempt, with the attempt number,
//!   the policy's decision and the error.
//!
//! # Sinks
//!
//! `NullSink`, `TracingSink` (default), `MemorySink`, `JsonLinesSink`, `StreamingSink` and
//! `MulticastSink` are provided; any `Fn(&LogRecord)` closure works too.

pub mod events;
pub mod sinks;

pub use events::{LogEntry, LogRecord};
pub use sinks::{
    JsonLinesSink, LogSink, MemorySink, MulticastSink, NullSink, StreamingSink, TracingSink,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate the next process-wide correlation id. Ids start at 0 and are never reused.
pub fn next_correlation_id() -> u64 {
    NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A sink bound to one correlation id.
#[derive(Clone)]
pub struct Logger {
    id: u64,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(id: u64, sink: Arc<dyn LogSink>) -> Self {
        Self { id, sink }
    }

    /// Bind `sink` to a freshly allocated correlation id.
    pub fn create(sink: Arc<dyn LogSink>) -> Self {
        Self::new(next_correlation_id(), sink)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn log(&self, entry: LogEntry) {
        self.sink.emit(&LogRecord { id: self.id, entry });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("id", &self.id).field("sink", &"<sink>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_tags_entries_with_its_id() {
        let sink = MemorySink::new();
        let logger = Logger::new(42, Arc::new(sink.clone()));
        logger.log(LogEntry::ClosingStream);
        assert_eq!(sink.records(), vec![LogRecord { id: 42, entry: LogEntry::ClosingStream }]);
    }

    #[test]
    fn correlation_ids_are_monotonic() {
        let a = Logger::create(Arc::new(NullSink));
        let b = Logger::create(Arc::new(NullSink));
        assert!(b.id() > a.id());
    }

    #[test]
    fn correlation_ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| next_correlation_id()).collect::<Vec<_>>()))
            .collect();
        let mut ids: Vec<u64> =
            handles.into_iter().flat_map(|h| h.join().expect("thread")).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
