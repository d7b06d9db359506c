use super::events::LogRecord;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Consumer of log records.
///
/// Sinks are called inline from the request path and must not block for long. Any
/// `Fn(&LogRecord)` closure is a sink.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

impl<F> LogSink for F
where
    F: Fn(&LogRecord) + Send + Sync,
{
    fn emit(&self, record: &LogRecord) {
        self(record)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Discards all records.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _record: &LogRecord) {}
}

/// Forwards records to `tracing` at info level, with the correlation id as a field.
#[derive(Clone, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        tracing::info!(id = record.id, t = record.entry.kind(), entry = %record.entry, "paylike");
    }
}

/// Keeps records in memory, evicting the oldest once `capacity` is reached.
#[derive(Clone, Debug)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }

    /// Records belonging to one correlation id, in emission order.
    pub fn records_for(&self, id: u64) -> Vec<LogRecord> {
        lock(&self.records).iter().filter(|r| r.id == id).cloned().collect()
    }

    pub fn clear(&self) {
        lock(&self.records).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        let mut guard = lock(&self.records);
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(record.clone());
    }
}

/// Writes each record as one JSON object per line.
///
/// Write errors are counted and otherwise ignored; logging never fails a request.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
    failed: AtomicU64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer), failed: AtomicU64::new(0) }
    }

    /// Records that could not be written.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> LogSink for JsonLinesSink<W> {
    fn emit(&self, record: &LogRecord) {
        let mut writer = lock(&self.writer);
        let written = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if written.is_err() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Broadcasts records to any number of subscribers.
#[derive(Clone, Debug)]
pub struct StreamingSink {
    sender: tokio::sync::broadcast::Sender<LogRecord>,
    dropped: Arc<AtomicU64>,
}

impl StreamingSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender, dropped: Arc::new(AtomicU64::new(0)) }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LogRecord> {
        self.sender.subscribe()
    }

    /// Records emitted while nobody was subscribed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl LogSink for StreamingSink {
    fn emit(&self, record: &LogRecord) {
        if self.sender.send(record.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Delivers every record to two sinks.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A: LogSink, B: LogSink> LogSink for MulticastSink<A, B> {
    fn emit(&self, record: &LogRecord) {
        self.sink_a.emit(record);
        self.sink_b.emit(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::events::LogEntry;

    fn record(id: u64) -> LogRecord {
        LogRecord { id, entry: LogEntry::ClosingStream }
    }

    #[test]
    fn memory_sink_evicts_oldest() {
        let sink = MemorySink::with_capacity(2);
        assert!(sink.is_empty());

        sink.emit(&record(1));
        sink.emit(&record(2));
        sink.emit(&record(3));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.records(), vec![record(2), record(3)]);
        assert_eq!(sink.records_for(3), vec![record(3)]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(&record(1));
        sink.emit(&record(2));
        assert_eq!(sink.failed(), 0);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            lines,
            vec![r#"{"id":1,"t":"closing stream"}"#, r#"{"id":2,"t":"closing stream"}"#]
        );
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |r: &LogRecord| seen.lock().unwrap().push(r.id);
        sink.emit(&record(9));
        NullSink.emit(&record(10));
        assert_eq!(*seen.lock().unwrap(), vec![9]);
    }

    #[test]
    fn multicast_reaches_both() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        MulticastSink::new(a.clone(), b.clone()).emit(&record(4));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn streaming_sink_delivers_to_subscriber() {
        let sink = StreamingSink::new(8);
        sink.emit(&record(0));
        assert_eq!(sink.dropped_count(), 1);

        let mut rx = sink.subscribe();
        sink.emit(&record(5));
        assert_eq!(rx.recv().await.expect("record"), record(5));
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        TracingSink.emit(&record(1));
    }
}
