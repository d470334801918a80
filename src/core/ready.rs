//! Network-ready completion signal
//!
//! The one synchronization point the rest of the application blocks on
//! before proceeding past onboarding.

use std::time::Duration;

use tokio::sync::watch;

/// Binary "station has a usable IP address" flag
///
/// Set on the first IP acquisition of a connection epoch, cleared when the
/// link is lost so later waiters re-wait for the next epoch. Clonable;
/// all clones observe the same flag.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raises the signal, waking all waiters
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Lowers the signal; subsequent waiters block until the next `set`
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the signal is raised
    ///
    /// Returns immediately if it already is. Safe to call from any task,
    /// any number of times.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for cannot observe a closed channel.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Waits until the signal is raised, giving up after `timeout`
    ///
    /// Returns `true` if the signal was observed, `false` on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_lowered() {
        let signal = ReadySignal::new();
        assert!(!signal.is_set());
        assert!(!signal.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_set_wakes_waiter() {
        let signal = ReadySignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });

        signal.set();
        handle.await.unwrap();
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_set() {
        let signal = ReadySignal::new();
        signal.set();
        // Must not block
        signal.wait().await;
        assert!(signal.wait_timeout(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_clear_forces_rewait() {
        let signal = ReadySignal::new();
        signal.set();
        signal.clear();

        assert!(!signal.is_set());
        assert!(!signal.wait_timeout(Duration::from_millis(10)).await);

        // Next epoch raises it again
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let signal = ReadySignal::new();
        let other = signal.clone();
        other.set();
        assert!(signal.is_set());
    }
}
