//! Background telemetry task.
//!
//! Runs in a dedicated thread, driven by `futures_lite::future::block_on`
//! with `async-io-mini` reactor timers for its cadence:
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │  telemetry thread                                        │
//!  │                                                          │
//!  │   loop {                                                 │
//!  │     tick: snapshot ─▶ (connect + announce) ─▶ publish    │
//!  │     wait: Timer(interval)  ⟂  StopToken publisher wake   │
//!  │   }                                                      │
//!  │   final flush (only if connected) ─▶ close ─▶ done_tx    │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The first tick fires immediately, so at least one attempt is made per
//! interval even when no cycle has completed.  Delivery failures are
//! logged and counted; the next tick retries.  The control loop never
//! waits on the network: it only waits, bounded, for `done_tx` at shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::TelemetryPort;
use crate::app::stop::StopToken;
use crate::diagnostics::PublisherCounters;
use crate::error::TelemetryError;
use crate::tally::TallyReader;

use super::payload::{StatusAnnouncement, TelemetrySnapshot};

// ── Shared counters ──────────────────────────────────────────

#[derive(Default)]
struct PublisherStats {
    attempts: AtomicU64,
    delivered: AtomicU64,
    failures: AtomicU64,
}

impl PublisherStats {
    fn counters(&self) -> PublisherCounters {
        PublisherCounters {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// ── Publisher ────────────────────────────────────────────────

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub interval: Duration,
    pub announcement: StatusAnnouncement,
}

struct TelemetryPublisher<T: TelemetryPort> {
    port: T,
    reader: TallyReader,
    stop: StopToken,
    config: PublisherConfig,
    stats: Arc<PublisherStats>,
}

impl<T: TelemetryPort> TelemetryPublisher<T> {
    async fn run(mut self) {
        info!(
            "TELEM | publisher started (every {}s)",
            self.config.interval.as_secs_f32()
        );

        loop {
            self.tick();
            if self.stop.wait_publisher(self.config.interval).await {
                break;
            }
        }

        self.final_flush();
        self.port.close();
        info!("TELEM | publisher stopped");
    }

    fn tick(&mut self) {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        match self.deliver() {
            Ok(snap) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                info!("TELEM | published {snap}");
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("TELEM | delivery failed, retrying next tick: {e}");
            }
        }
    }

    fn deliver(&mut self) -> Result<TelemetrySnapshot, TelemetryError> {
        if !self.port.is_connected() {
            self.port.connect()?;
            self.port.announce(&self.config.announcement)?;
            info!(
                "TELEM | connected, announced status={} deviceType={}",
                self.config.announcement.status, self.config.announcement.device_type
            );
        }
        let snap = TelemetrySnapshot::from(&self.reader.snapshot());
        self.port.publish(&snap)?;
        Ok(snap)
    }

    /// Best effort: publish the last counts if a connection is already up,
    /// never reconnect for it.
    fn final_flush(&mut self) {
        if !self.port.is_connected() {
            debug!("TELEM | final flush skipped (not connected)");
            return;
        }
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        let snap = TelemetrySnapshot::from(&self.reader.snapshot());
        match self.port.publish(&snap) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                info!("TELEM | final flush {snap}");
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("TELEM | final flush failed: {e}");
            }
        }
    }
}

// ── Handle ───────────────────────────────────────────────────

/// Owned by the control loop; used to wait for the task at shutdown.
pub struct PublisherHandle {
    done: mpsc::Receiver<()>,
    join: Option<JoinHandle<()>>,
    stats: Arc<PublisherStats>,
}

impl PublisherHandle {
    pub fn counters(&self) -> PublisherCounters {
        self.stats.counters()
    }

    /// Wait up to `grace` for the task to exit.  The stop token must
    /// already be triggered.  Returns `true` if the thread was joined; on
    /// `false` the thread is left detached.  Counters stay readable after.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        let finished = match self.done.recv_timeout(grace) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => false,
        };
        if !finished {
            warn!(
                "TELEM | publisher still busy after {}ms grace, abandoning it",
                grace.as_millis()
            );
            return false;
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("TELEM | publisher thread panicked");
            }
        }
        true
    }
}

// ── Thread spawn ─────────────────────────────────────────────

/// Spawn the publisher on its own named thread.
pub fn spawn<T>(
    port: T,
    reader: TallyReader,
    stop: StopToken,
    config: PublisherConfig,
) -> std::io::Result<PublisherHandle>
where
    T: TelemetryPort + 'static,
{
    let stats = Arc::new(PublisherStats::default());
    let (done_tx, done) = mpsc::channel();

    let publisher = TelemetryPublisher {
        port,
        reader,
        stop,
        config,
        stats: Arc::clone(&stats),
    };

    let join = std::thread::Builder::new()
        .name("telemetry".into())
        .spawn(move || {
            futures_lite::future::block_on(publisher.run());
            let _ = done_tx.send(());
        })?;

    Ok(PublisherHandle {
        done,
        join: Some(join),
        stats,
    })
}
