//! Periodic background sweep of expired sessions. The task is an ordinary
//! thread parked on a channel so it can be stopped promptly and joined on
//! shutdown instead of leaking past it.

use crate::session::store::SessionStore;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct CleanupTask {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Spawn the sweep thread. It wakes every `interval`, evicts expired
    /// sessions, and exits as soon as a stop signal arrives.
    pub fn start(store: Arc<SessionStore>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("session-cleanup".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let evicted = store.clean_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "cleanup sweep");
                        }
                    }
                    // Stop requested, or the handle was dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn session-cleanup thread");

        Self { stop_tx, handle: Some(handle) }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.stop_tx.send(());
            if handle.join().is_err() {
                tracing::warn!("session-cleanup thread panicked");
            }
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::SessionConfig;
    use crate::model::{AccessLevel, UserAccount};

    #[test]
    fn sweeps_expired_sessions_in_the_background() {
        let config = SessionConfig { timeout_minutes: 30, cleanup_interval_minutes: 5 };
        let clock = Arc::new(crate::common::clock::FixedClock::default());
        let store = Arc::new(SessionStore::with_clock(&config, clock.clone()));

        let user = Arc::new(UserAccount::new("Ana", "ana@example.gov", "111", AccessLevel::Public, "ops"));
        store.create_session(user, "10.0.0.1", 0.9);
        clock.advance(chrono::Duration::minutes(31));

        let task = CleanupTask::start(Arc::clone(&store), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(100));
        task.stop();

        // The background sweep removed it; no lazy read was involved
        assert_eq!(store.raw_session_count(), 0);
    }

    #[test]
    fn stop_joins_the_thread_promptly() {
        let store = Arc::new(SessionStore::new(&SessionConfig::default()));
        let task = CleanupTask::start(store, Duration::from_secs(300));

        let started = std::time::Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
