//! Interrupt coordinator: makes Ctrl-C safe.
//!
//! The first SIGINT/SIGTERM sets the interrupt flag the engine polls
//! between phases and wakes anything waiting on it; the second exits
//! immediately with no cleanup. The handler only flips flags; every
//! store write stays on the engine task so persistence ordering is
//! preserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::warn;

#[derive(Default)]
pub struct InterruptController {
    flag: AtomicBool,
    notify: Notify,
}

impl InterruptController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the flag and wake waiters. Returns whether this was the first
    /// trigger.
    pub fn trigger(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    /// Resolve when an interrupt arrives (or immediately if one already
    /// did). Used in `select!` against the in-flight agent call.
    pub async fn cancelled(&self) {
        if self.interrupted() {
            return;
        }
        self.notify.notified().await;
    }

    /// Install the OS signal listener. First signal: cooperative
    /// cancellation. Second: immediate exit(1).
    pub fn install(self: Arc<Self>) {
        let controller = self;
        tokio::spawn(async move {
            let mut sigint = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::interrupt(),
            ) {
                Ok(s) => s,
                Err(err) => {
                    warn!(%err, "Failed to install SIGINT handler");
                    return;
                }
            };
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(err) => {
                    warn!(%err, "Failed to install SIGTERM handler");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                if controller.trigger() {
                    eprintln!("orc: interrupt received; finishing current phase and saving state (^C again to abort)");
                } else {
                    std::process::exit(1);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_sets_flag_once() {
        let controller = InterruptController::new();
        assert!(!controller.interrupted());
        assert!(controller.trigger());
        assert!(controller.interrupted());
        assert!(!controller.trigger(), "second trigger is not first");
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_trigger() {
        let controller = InterruptController::new();
        let waiter = {
            let c = controller.clone();
            tokio::spawn(async move {
                c.cancelled().await;
                true
            })
        };
        tokio::task::yield_now().await;
        controller.trigger();
        assert!(tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter finishes")
            .unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_immediate_when_already_interrupted() {
        let controller = InterruptController::new();
        controller.trigger();
        // Must not hang
        controller.cancelled().await;
    }
}
