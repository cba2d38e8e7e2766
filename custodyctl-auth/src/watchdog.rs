//! Session refresh watchdog
//!
//! One repeating task per watchdog. On each tick it renews the shared session
//! if it is within `margin` of expiry. A failed renewal is logged and left
//! for the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use custodyctl_core::session::{DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_REFRESH_MARGIN_SECS};
use custodyctl_core::Session;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;

pub type SharedSession = Arc<RwLock<Option<Session>>>;

/// Something that can renew a session.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self, session: &Session) -> Result<Session>;
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NoSession,
    NotDue,
    Refreshed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionWatchdog {
    pub interval: Duration,
    pub margin: Duration,
}

impl Default for SessionWatchdog {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }
}

impl SessionWatchdog {
    pub fn new(interval: Duration, margin: Duration) -> Self {
        Self { interval, margin }
    }

    /// Check once and refresh if due.
    pub async fn tick<R: SessionRefresher + ?Sized>(
        &self,
        session: &SharedSession,
        refresher: &R,
    ) -> TickOutcome {
        let current = match session.read().await.clone() {
            Some(current) => current,
            None => return TickOutcome::NoSession,
        };
        let margin = chrono::Duration::from_std(self.margin).unwrap_or(chrono::Duration::MAX);
        if !current.refresh_due(Utc::now(), margin) {
            return TickOutcome::NotDue;
        }

        match refresher.refresh(&current).await {
            Ok(renewed) => {
                tracing::info!(
                    user_id = %renewed.user_id,
                    expires_at = %renewed.expires_at,
                    "session refreshed"
                );
                *session.write().await = Some(renewed);
                TickOutcome::Refreshed
            }
            Err(e) => {
                tracing::warn!(user_id = %current.user_id, "session refresh failed, retrying next tick: {e}");
                TickOutcome::Failed
            }
        }
    }

    /// Spawn the repeating check. The task runs until the handle is stopped.
    pub fn spawn<R>(self, session: SharedSession, refresher: Arc<R>) -> WatchdogHandle
    where
        R: SessionRefresher + 'static,
    {
        let stop = Arc::new(Notify::new());
        let stop_signal = stop.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(
                interval_secs = self.interval.as_secs(),
                margin_secs = self.margin.as_secs(),
                "session watchdog started"
            );
            loop {
                tokio::select! {
                    _ = stop_signal.notified() => break,
                    _ = interval.tick() => {
                        let outcome = self.tick(&session, refresher.as_ref()).await;
                        tracing::trace!(?outcome, "watchdog tick");
                    }
                }
            }
            tracing::debug!("session watchdog stopped");
        });
        WatchdogHandle { stop, task }
    }
}

/// Running watchdog. Dropping the handle leaves the task running; call
/// `stop` to end it.
pub struct WatchdogHandle {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub async fn stop(self) {
        self.stop.notify_one();
        if let Err(e) = self.task.await {
            tracing::warn!("session watchdog task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct MockRefresher {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl MockRefresher {
        fn new(fail_first: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionRefresher for MockRefresher {
        async fn refresh(&self, session: &Session) -> Result<Session> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(AuthError::Decode("simulated outage".into()));
            }
            Ok(Session::from_expires_in(
                format!("access-{n}"),
                session.refresh_token.clone(),
                3600,
                session.user_id,
                Utc::now(),
            ))
        }
    }

    fn shared(expires_in: i64) -> SharedSession {
        Arc::new(RwLock::new(Some(Session::from_expires_in(
            "access".into(),
            "refresh".into(),
            expires_in,
            Uuid::new_v4(),
            Utc::now(),
        ))))
    }

    #[tokio::test]
    async fn tick_outcomes() {
        let watchdog = SessionWatchdog::default();
        let refresher = MockRefresher::new(0);

        let empty: SharedSession = Arc::new(RwLock::new(None));
        assert_eq!(watchdog.tick(&empty, &refresher).await, TickOutcome::NoSession);

        let fresh = shared(3600);
        assert_eq!(watchdog.tick(&fresh, &refresher).await, TickOutcome::NotDue);
        assert_eq!(refresher.calls(), 0);

        let expiring = shared(60);
        assert_eq!(watchdog.tick(&expiring, &refresher).await, TickOutcome::Refreshed);
        let renewed = expiring.read().await.clone().unwrap();
        assert_eq!(renewed.access_token, "access-0");
    }

    #[tokio::test]
    async fn failure_keeps_session_and_retries() {
        let watchdog = SessionWatchdog::default();
        let refresher = MockRefresher::new(1);
        let expiring = shared(60);

        assert_eq!(watchdog.tick(&expiring, &refresher).await, TickOutcome::Failed);
        assert_eq!(
            expiring.read().await.as_ref().unwrap().access_token,
            "access"
        );
        assert_eq!(watchdog.tick(&expiring, &refresher).await, TickOutcome::Refreshed);
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_refreshes_until_stopped() {
        let watchdog = SessionWatchdog::new(Duration::from_secs(60), Duration::from_secs(300));
        let refresher = Arc::new(MockRefresher::new(0));
        let session = shared(120);

        let handle = watchdog.spawn(session.clone(), refresher.clone());
        // First tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(refresher.calls(), 1);

        // Renewed session is an hour out; further ticks leave it alone
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(refresher.calls(), 1);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(refresher.calls(), 1);
    }
}
