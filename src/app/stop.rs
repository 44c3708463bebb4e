//! Cooperative stop token shared by the control loop and the telemetry task.
//!
//! ```text
//!   ctrl-c handler ─┐
//!   SortingLoop ────┼──trigger()──▶ requested = true
//!   tests ──────────┘                 ├─▶ loop_wake.signal()       (cuts the cycle pause short)
//!                                     └─▶ publisher_wake.signal()  (cuts the publish wait short)
//! ```
//!
//! `embassy-sync` signals are consumed by the waiter, so each task gets its
//! own.  The atomic flag is the source of truth; the signals only wake
//! sleepers early.

use core::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_io_mini::Timer;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;

struct Inner {
    requested: AtomicBool,
    loop_wake: Signal<CriticalSectionRawMutex, ()>,
    publisher_wake: Signal<CriticalSectionRawMutex, ()>,
}

/// Cloneable handle; every clone observes the same stop request.
#[derive(Clone)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                loop_wake: Signal::new(),
                publisher_wake: Signal::new(),
            }),
        }
    }

    /// Request a stop.  Idempotent; callable from any thread.
    pub fn trigger(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.loop_wake.signal(());
        self.inner.publisher_wake.signal(());
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Block the calling thread for `d` or until a stop is requested.
    /// Returns `true` if a stop is pending.
    pub fn pause(&self, d: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        if !d.is_zero() {
            future::block_on(interruptible(d, self.inner.loop_wake.wait()));
        }
        self.is_triggered()
    }

    /// Async wait used by the telemetry task.  Returns `true` if a stop is
    /// pending.
    pub async fn wait_publisher(&self, d: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        interruptible(d, self.inner.publisher_wake.wait()).await;
        self.is_triggered()
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Race a reactor timer against a wake signal.
async fn interruptible(d: Duration, wake: impl Future<Output = ()>) {
    future::or(
        async {
            Timer::after(d).await;
        },
        wake,
    )
    .await;
}
