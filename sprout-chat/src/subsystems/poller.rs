//! Polling scheduler — silent refresh while the chat view is open
//!
//! One loop per open view, ticking every `poll_interval_ms`. A tick that
//! fires while the previous refresh is unresolved is dropped, never queued.
//! `stop()` ends the loop at once; a refresh already in flight is left to
//! finish and its result is discarded by the caller. The in-flight flag
//! belongs to the scheduler, so a restarted loop still waits for it.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

struct RunningLoop {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct PollScheduler {
    period: Duration,
    in_flight: Arc<AtomicBool>,
    running: Option<RunningLoop>,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            in_flight: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking. The first tick comes one period from now; a loop
    /// already running is stopped first.
    pub fn start<F>(&mut self, tick: F)
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.stop();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_poll_loop(
            self.period,
            Arc::new(tick),
            self.in_flight.clone(),
            rx,
        ));

        self.running = Some(RunningLoop {
            shutdown: tx,
            handle,
        });
    }

    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            tracing::debug!("Poll scheduler stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poll_loop<F>(
    period: Duration,
    tick: Arc<F>,
    in_flight: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) where
    F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_ms = period.as_millis() as u64, "Chat poll loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!("Chat poll loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if in_flight.swap(true, Ordering::AcqRel) {
                    tracing::debug!("Previous poll still outstanding, skipping tick");
                    continue;
                }

                let refresh = tick();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    refresh.await;
                    in_flight.store(false, Ordering::Release);
                });
            }
        }
    }
}
