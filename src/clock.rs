//! Time sources used to schedule retries and attempt timeouts.
//!
//! A [`Clock`] can schedule a callback after a delay and cancel it again. Production code uses
//! [`TokioClock`]; tests substitute [`ManualClock`], whose time only moves when the test advances
//! it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Callback fired when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle identifying a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub(crate) u64);

/// Clock abstraction so timing can be faked in tests.
///
/// Implementations must fire a callback no earlier than `delay` after it was scheduled, according
/// to their own notion of time. Clearing a timer that already fired is a no-op. A cleared timer's
/// callback is dropped without being called.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds elapsed on this clock.
    fn now_millis(&self) -> u64;

    /// Schedule `callback` to run after `delay`.
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancel a pending timer.
    fn clear_timeout(&self, handle: TimerHandle);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Clock backed by the tokio timer.
///
/// Each timer is a spawned task, so `set_timeout` must be called from within a tokio runtime.
/// Under `#[tokio::test(start_paused = true)]` the clock follows tokio's paused time.
#[derive(Debug, Clone)]
pub struct TokioClock {
    start: tokio::time::Instant,
    next_id: Arc<AtomicU64>,
    timers: Arc<Mutex<HashMap<u64, tokio::task::AbortHandle>>>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of timers scheduled but not yet fired or cleared.
    pub fn pending(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> u64 {
        saturating_millis(self.start.elapsed())
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        // Hold the lock across the spawn so a zero-delay timer cannot remove itself before it is
        // registered.
        let mut guard = lock(&self.timers);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if lock(&timers).remove(&id).is_some() {
                callback();
            }
        });
        guard.insert(id, task.abort_handle());
        TimerHandle(id)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        if let Some(task) = lock(&self.timers).remove(&handle.0) {
            task.abort();
        }
    }
}

#[derive(Default)]
struct ManualState {
    now: u64,
    next_id: u64,
    // Keyed by (due, id) so timers with equal deadlines fire in scheduling order.
    queue: BTreeMap<(u64, u64), TimerCallback>,
    due: HashMap<u64, u64>,
}

/// Virtual clock for deterministic tests.
///
/// Time starts at the given origin and only moves through [`ManualClock::advance`] or
/// [`ManualClock::advance_to_next`]. Callbacks run on the thread that advances the clock, outside
/// the clock's internal lock, so they may schedule further timers.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

impl ManualClock {
    /// Create a clock reading `origin_millis`.
    pub fn new(origin_millis: u64) -> Self {
        let state = ManualState { now: origin_millis, ..ManualState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<u64> {
        lock(&self.state).queue.keys().next().map(|(due, _)| *due)
    }

    /// Move time forward by `by`, firing every timer that falls due on the way in deadline order.
    ///
    /// Timers scheduled by a callback are fired too when they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = {
            let state = lock(&self.state);
            state.now.saturating_add(saturating_millis(by))
        };
        while self.fire_next(Some(target)) {}
        let mut state = lock(&self.state);
        state.now = state.now.max(target);
    }

    /// Jump to the earliest pending deadline and fire that single timer.
    ///
    /// Returns `false` when nothing is pending.
    pub fn advance_to_next(&self) -> bool {
        self.fire_next(None)
    }

    fn fire_next(&self, limit: Option<u64>) -> bool {
        let callback = {
            let mut state = lock(&self.state);
            let key = match state.queue.keys().next() {
                Some(&(due, id)) if limit.map_or(true, |limit| due <= limit) => (due, id),
                _ => return false,
            };
            let Some(callback) = state.queue.remove(&key) else {
                return false;
            };
            state.due.remove(&key.1);
            state.now = state.now.max(key.0);
            callback
        };
        callback();
        true
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        lock(&self.state).now
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now.saturating_add(saturating_millis(delay));
        state.queue.insert((due, id), callback);
        state.due.insert(id, due);
        TimerHandle(id)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        let mut state = lock(&self.state);
        if let Some(due) = state.due.remove(&handle.0) {
            state.queue.remove(&(due, handle.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> TimerCallback) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let make = move |name: &'static str| -> TimerCallback {
            let sink = sink.clone();
            Box::new(move || sink.lock().unwrap().push(name))
        };
        (fired, make)
    }

    #[test]
    fn manual_clock_fires_in_deadline_order() {
        let clock = ManualClock::new(1_000_000);
        let (fired, make) = recorder();

        clock.set_timeout(Duration::from_millis(300), make("late"));
        clock.set_timeout(Duration::from_millis(100), make("early"));
        clock.set_timeout(Duration::from_millis(100), make("early-second"));

        clock.advance(Duration::from_millis(150));
        assert_eq!(*fired.lock().unwrap(), vec!["early", "early-second"]);
        assert_eq!(clock.now_millis(), 1_000_150);

        clock.advance(Duration::from_millis(150));
        assert_eq!(*fired.lock().unwrap(), vec!["early", "early-second", "late"]);
        assert_eq!(clock.now_millis(), 1_000_300);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn manual_clock_cleared_timer_never_fires() {
        let clock = ManualClock::default();
        let (fired, make) = recorder();

        let handle = clock.set_timeout(Duration::from_millis(10), make("cleared"));
        clock.set_timeout(Duration::from_millis(20), make("kept"));
        clock.clear_timeout(handle);
        clock.clear_timeout(handle);

        clock.advance(Duration::from_secs(1));
        assert_eq!(*fired.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn advance_to_next_jumps_to_deadline() {
        let clock = ManualClock::new(50);
        let (fired, make) = recorder();

        assert!(!clock.advance_to_next());
        clock.set_timeout(Duration::from_millis(2000), make("a"));
        assert_eq!(clock.next_deadline(), Some(2050));
        assert!(clock.advance_to_next());
        assert_eq!(clock.now_millis(), 2050);
        assert_eq!(*fired.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn callbacks_may_schedule_within_window() {
        let clock = ManualClock::new(0);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let inner_clock = clock.clone();
        let inner_fired = fired.clone();
        clock.set_timeout(
            Duration::from_millis(10),
            Box::new(move || {
                let now = inner_clock.now_millis();
                inner_fired.lock().unwrap().push(now);
                let nested = inner_fired.clone();
                let nested_clock = inner_clock.clone();
                inner_clock.set_timeout(
                    Duration::from_millis(10),
                    Box::new(move || nested.lock().unwrap().push(nested_clock.now_millis())),
                );
            }),
        );

        clock.advance(Duration::from_millis(25));
        assert_eq!(*fired.lock().unwrap(), vec![10, 20]);
        assert_eq!(clock.now_millis(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_fires_after_delay() {
        let clock = TokioClock::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        clock.set_timeout(
            Duration::from_millis(100),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert_eq!(clock.pending(), 1);
        rx.await.expect("timer fired");
        assert_eq!(clock.now_millis(), 100);
        assert_eq!(clock.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_clear_drops_callback() {
        let clock = TokioClock::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = clock.set_timeout(
            Duration::from_millis(100),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        clock.clear_timeout(handle);
        assert!(rx.await.is_err(), "sender dropped without firing");
        assert_eq!(clock.pending(), 0);
    }
}
