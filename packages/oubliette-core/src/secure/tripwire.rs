//! # Tripwire
//!
//! Intrusion detector plus a one-shot callback bus. A background watcher
//! polls for a debugger every 50 ms; on the first positive it transitions to
//! `triggered` (monotonic) and fans the registered destroy callbacks out so
//! every protected buffer can shred itself before the tracer gets a look.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TRIPWIRE STATE MACHINE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   not_triggered ──(TracerPid ≠ 0 │ manual_trigger)──► triggered        │
//! │        │                                                  │             │
//! │        │ register(cb): append                             │             │
//! │        │                                                  │             │
//! │        │                        register(cb): fire once on a            │
//! │        │                        background task                         │
//! │        ▼                                                  ▼             │
//! │   callbacks fire exactly once per registration, sequentially           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Detection reads `TracerPid:` from `/proc/self/status` — the one method
//! that stays reliable inside containers, where ptrace self-attach produces
//! false positives under seccomp. Any I/O failure reads as "not traced".
//!
//! Callbacks run sequentially on the watcher task: keep them short and never
//! reacquire the tripwire from inside one.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// How often the watcher polls for an attached tracer.
pub const DEFAULT_TRIPWIRE_INTERVAL: Duration = Duration::from_millis(50);

/// Environment flag that disables intrusion polling (set to `1`).
/// Useful when the operator actually wants to attach a debugger.
pub const TRIPWIRE_DISABLE_ENV: &str = "OUBLIETTE_DISABLE_TRIPWIRE";

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

struct TripwireInner {
    callbacks: Vec<Callback>,
    triggered: bool,
    started: bool,
    watcher: Option<JoinHandle<()>>,
}

/// Intrusion detector with a one-shot callback bus.
pub struct Tripwire {
    inner: Arc<Mutex<TripwireInner>>,
    interval: Duration,
}

impl Tripwire {
    /// Creates a tripwire with the default poll interval. Call
    /// [`start`](Self::start) to begin monitoring.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_TRIPWIRE_INTERVAL)
    }

    /// Creates a tripwire with a custom poll interval.
    pub fn with_interval(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_TRIPWIRE_INTERVAL
        } else {
            interval
        };
        Self {
            inner: Arc::new(Mutex::new(TripwireInner {
                callbacks: Vec::new(),
                triggered: false,
                started: false,
                watcher: None,
            })),
            interval,
        }
    }

    /// Begins intrusion monitoring. Safe to call repeatedly.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.started {
            return;
        }
        inner.started = true;

        let weak = Arc::downgrade(&self.inner);
        let interval = self.interval;
        inner.watcher = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { return };
                if detect_intrusion() {
                    Self::fire(&inner);
                    return; // monitoring stops after firing
                }
            }
        }));
    }

    /// Registers a callback to run on intrusion detection.
    ///
    /// Callbacks fire at most once per registration. Registering after the
    /// tripwire has already fired schedules the callback to run exactly once
    /// on a background task.
    pub fn register(&self, cb: impl Fn() + Send + Sync + 'static) {
        let cb: Callback = Arc::new(cb);
        let mut inner = self.inner.lock();
        if inner.triggered {
            drop(inner);
            tokio::spawn(async move { cb() });
            return;
        }
        inner.callbacks.push(cb);
    }

    /// Forces the triggered transition. Idempotent.
    pub fn manual_trigger(&self) {
        Self::fire(&self.inner);
    }

    /// Returns whether the tripwire has fired.
    pub fn is_triggered(&self) -> bool {
        self.inner.lock().triggered
    }

    /// Halts the watcher. Does not reset the triggered state and does not
    /// re-enable anything. Safe to call repeatedly.
    pub fn stop(&self) {
        let handle = self.inner.lock().watcher.take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn fire(inner: &Arc<Mutex<TripwireInner>>) {
        let snapshot: Vec<Callback>;
        {
            let mut guard = inner.lock();
            if guard.triggered {
                return;
            }
            guard.triggered = true;
            // Snapshot under the lock, invoke outside it.
            snapshot = guard.callbacks.clone();
        }

        tracing::warn!(callbacks = snapshot.len(), "tripwire fired");

        for cb in snapshot {
            cb();
        }
    }
}

impl Default for Tripwire {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// GLOBAL INSTANCE
// ============================================================================

static GLOBAL_TRIPWIRE: OnceCell<Tripwire> = OnceCell::new();

/// Returns the global tripwire, starting it on first access.
///
/// Must be called from within a Tokio runtime the first time.
pub fn global_tripwire() -> &'static Tripwire {
    GLOBAL_TRIPWIRE.get_or_init(|| {
        let tripwire = Tripwire::new();
        tripwire.start();
        tripwire
    })
}

// ============================================================================
// DETECTION
// ============================================================================

/// Checks for an attached debugger/tracer.
///
/// Linux: `TracerPid:` in `/proc/self/status`, honoured unless the disable
/// flag is set. Elsewhere: always `false`; only `manual_trigger` fires.
pub fn detect_intrusion() -> bool {
    #[cfg(target_os = "linux")]
    {
        if std::env::var(TRIPWIRE_DISABLE_ENV).as_deref() == Ok("1") {
            return false;
        }
        check_tracer_pid()
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(target_os = "linux")]
fn check_tracer_pid() -> bool {
    // I/O failure reads as "not traced" — never false-positive into
    // destroying everything.
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return false;
    };

    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("TracerPid:") {
            return rest.trim().parse::<i64>().map(|pid| pid != 0).unwrap_or(false);
        }
    }

    false
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_register_then_trigger_fires_once() {
        let tripwire = Tripwire::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        tripwire.register(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tripwire.manual_trigger();
        assert!(tripwire.is_triggered());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Second trigger is a no-op
        tripwire.manual_trigger();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_late_registration_fires_async_once() {
        let tripwire = Tripwire::new();
        tripwire.manual_trigger();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        tripwire.register(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        // The late callback runs on a spawned task
        for _ in 0..50 {
            if counter.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multiple_callbacks_fire_in_order() {
        let tripwire = Tripwire::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let o = Arc::clone(&order);
            tripwire.register(move || o.lock().push(i));
        }

        tripwire.manual_trigger();
        assert_eq!(&*order.lock(), &[0, 1, 2]);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let tripwire = Tripwire::with_interval(Duration::from_millis(5));
        tripwire.start();
        tripwire.start(); // idempotent

        tokio::time::sleep(Duration::from_millis(20)).await;
        // No tracer attached in tests, so nothing fires
        assert!(!tripwire.is_triggered());

        tripwire.stop();
        tripwire.stop();
    }

    #[test]
    fn test_detect_intrusion_without_tracer() {
        // Under a plain test runner no tracer is attached.
        assert!(!detect_intrusion());
    }
}
