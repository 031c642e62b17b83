//! Cooperative shutdown plumbing.
//!
//! An [`ActivityTracker`] hands out [`Activity`] tokens to work that must
//! not be ruthlessly interrupted (an SMTP session in flight, for example).
//! Requesting shutdown flips a flag that stops new tokens from being
//! issued, wakes anything watching a [`ShutdownSubscription`], and lets
//! [`ActivityTracker::drained`] complete once every outstanding token has
//! been dropped.
//!
//! See <https://tokio.rs/tokio/topics/shutdown> for the underlying
//! channel tricks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{Receiver as MPSCReceiver, Sender as MPSCSender};
use tokio::sync::watch::{Receiver as WatchReceiver, Sender as WatchSender};

/// A token representing work in progress. Hold it for as long as the work
/// runs; the tracker's `drained` future completes only after every token
/// has been dropped.
#[derive(Clone)]
pub struct Activity {
    _tx: MPSCSender<()>,
}

impl std::fmt::Debug for Activity {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Activity").finish()
    }
}

/// Tracks a set of [`Activity`] tokens and the shutdown state they
/// cooperate with.
pub struct ActivityTracker {
    prototype: Mutex<Option<Activity>>,
    activity_rx: tokio::sync::Mutex<MPSCReceiver<()>>,
    stopping_tx: WatchSender<bool>,
    stopping_rx: WatchReceiver<bool>,
    shutting_down: AtomicBool,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (activity_tx, activity_rx) = tokio::sync::mpsc::channel(1);
        let (stopping_tx, stopping_rx) = tokio::sync::watch::channel(false);
        Self {
            prototype: Mutex::new(Some(Activity { _tx: activity_tx })),
            activity_rx: tokio::sync::Mutex::new(activity_rx),
            stopping_tx,
            stopping_rx,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Obtain an activity token, or None if shutdown has begun and no
    /// new work may start.
    pub fn activity(&self) -> Option<Activity> {
        self.prototype.lock().unwrap().clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    /// Flip into the shutting-down state: stop issuing tokens and wake
    /// every subscription.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.prototype.lock().unwrap().take();
        self.stopping_tx.send(true).ok();
    }

    /// Wait for every outstanding [`Activity`] token to be dropped.
    /// Must be preceded by [`Self::begin_shutdown`], otherwise this waits
    /// forever even when nothing is active.
    pub async fn drained(&self) {
        tracing::debug!("waiting for outstanding activity to wrap up");
        self.activity_rx.lock().await.recv().await;
    }

    pub fn subscribe(&self) -> ShutdownSubscription {
        ShutdownSubscription {
            rx: self.stopping_rx.clone(),
        }
    }
}

/// Used by code that is idling or blocked on IO. Select on your own
/// future and [`ShutdownSubscription::shutting_down`] to wake up when
/// shutdown begins.
#[derive(Clone, Debug)]
pub struct ShutdownSubscription {
    rx: WatchReceiver<bool>,
}

impl ShutdownSubscription {
    /// Resolves once shutdown has been requested. Returns immediately if
    /// that already happened.
    pub async fn shutting_down(&mut self) {
        self.rx.wait_for(|stopping| *stopping).await.ok();
    }
}

/// Represents the lifetime of the server process: waits for an interrupt
/// or a programmatic shutdown request from any [`LifetimeHandle`].
pub struct Lifetime {
    request_rx: MPSCReceiver<()>,
    request_tx: MPSCSender<()>,
}

#[derive(Clone)]
pub struct LifetimeHandle {
    request_tx: MPSCSender<()>,
}

impl LifetimeHandle {
    /// Ask the process to shut down; wakes `wait_for_shutdown`.
    pub async fn request_shutdown(&self) {
        self.request_tx.send(()).await.ok();
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifetime {
    pub fn new() -> Self {
        let (request_tx, request_rx) = tokio::sync::mpsc::channel(1);
        Self {
            request_rx,
            request_tx,
        }
    }

    pub fn handle(&self) -> LifetimeHandle {
        LifetimeHandle {
            request_tx: self.request_tx.clone(),
        }
    }

    /// Block until ctrl-c is pressed or a handle requests shutdown.
    pub async fn wait_for_shutdown_request(&mut self) {
        tracing::debug!("waiting for interrupt");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = self.request_rx.recv() => {}
        };
        tracing::info!("shutdown requested");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drains_after_tokens_drop() {
        let tracker = ActivityTracker::new();
        let token = tracker.activity().expect("not shutting down yet");
        let extra = token.clone();

        tracker.begin_shutdown();
        assert!(tracker.is_shutting_down());
        assert!(tracker.activity().is_none());

        let drained = tracker.drained();
        tokio::pin!(drained);

        // still active: drained must not resolve yet
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut drained)
            .await
            .is_err());

        drop(token);
        drop(extra);
        tokio::time::timeout(Duration::from_secs(1), drained)
            .await
            .expect("drained after all tokens dropped");
    }

    #[tokio::test]
    async fn subscription_wakes_on_shutdown() {
        let tracker = ActivityTracker::new();
        let mut sub = tracker.subscribe();
        tracker.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(1), sub.shutting_down())
            .await
            .expect("subscription woke");
        // and again, immediately, for late subscribers
        let mut late = tracker.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.shutting_down())
            .await
            .expect("late subscription woke");
    }
}
