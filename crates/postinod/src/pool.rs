//! A bounded cache of reusable [`Session`] objects. Borrowing attaches a
//! fresh connection to a recycled (or lazily allocated) session; the
//! activity tokens the sessions carry double as the shutdown barrier.

use crate::client::{BoxedSessionStream, Session};
use crate::envelope::EnvelopePool;
use parking_lot::Mutex;
use postino_server_common::ConfigHandle;
use postino_server_lifecycle::{ActivityTracker, ShutdownSubscription};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// How long a borrow may wait for capacity before giving up and letting
/// the server drop the connection.
const BORROW_WAIT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool is shutting down")]
    ShuttingDown,
    #[error("pool capacity exhausted")]
    Exhausted,
}

pub struct ClientPool {
    capacity: usize,
    free: Mutex<Vec<Session>>,
    sem: Arc<Semaphore>,
    tracker: ActivityTracker,
    timeout: ConfigHandle<Duration>,
}

impl ClientPool {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::with_capacity(capacity)),
            sem: Arc::new(Semaphore::new(capacity)),
            tracker: ActivityTracker::new(),
            timeout: ConfigHandle::new(timeout),
        }
    }

    /// Attach `stream` to a session, pairing it with an envelope from
    /// `envelope_pool`. Fails when the pool is draining, or when capacity
    /// stays exhausted beyond a soft wait.
    pub async fn borrow(
        &self,
        stream: BoxedSessionStream,
        id: u64,
        remote_ip: String,
        envelope_pool: &EnvelopePool,
    ) -> Result<Session, PoolError> {
        let activity = self.tracker.activity().ok_or(PoolError::ShuttingDown)?;
        let permit = tokio::time::timeout(BORROW_WAIT, self.sem.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Exhausted)?
            .map_err(|_| PoolError::ShuttingDown)?;
        let envelope = envelope_pool
            .borrow()
            .await
            .map_err(|_| PoolError::ShuttingDown)?;

        let mut session = self.free.lock().pop().unwrap_or_default();
        session.attach(
            stream,
            id,
            remote_ip,
            envelope,
            activity,
            permit,
            self.tracker.subscribe(),
        );
        Ok(session)
    }

    /// Reset and requeue a finished session; its permit and activity
    /// token drop here, waking capacity and shutdown waiters.
    pub fn release(&self, mut session: Session) {
        session.reset();
        self.free.lock().push(session);
    }

    /// The deadline applied on each read and each flush.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout.update(timeout);
    }

    pub fn timeout(&self) -> Duration {
        **self.timeout.borrow()
    }

    /// Mark the pool closed so further borrows fail, and wake in-flight
    /// sessions so they can say 421 at their next state boundary.
    pub fn shutdown_state(&self) {
        self.tracker.begin_shutdown();
    }

    /// Block until every outstanding borrow has been returned or
    /// terminated.
    pub async fn shutdown_wait(&self) {
        self.tracker.drained().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_shutting_down()
    }

    pub fn active_count(&self) -> usize {
        self.capacity - self.sem.available_permits()
    }

    pub fn subscribe_shutdown(&self) -> ShutdownSubscription {
        self.tracker.subscribe()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::envelope::EnvelopePool;

    fn stream() -> BoxedSessionStream {
        let (_near, far) = tokio::io::duplex(1024);
        Box::new(far)
    }

    #[tokio::test]
    async fn borrow_and_release_conserve_capacity() {
        let pool = ClientPool::new(2, Duration::from_secs(30));
        let envelopes = EnvelopePool::new(2);

        let mut a = pool
            .borrow(stream(), 1, "10.0.0.1".to_string(), &envelopes)
            .await
            .unwrap();
        let mut b = pool
            .borrow(stream(), 2, "10.0.0.2".to_string(), &envelopes)
            .await
            .unwrap();
        assert_eq!(pool.active_count(), 2);
        assert_eq!(envelopes.active_count(), 2);

        // envelope first, then the session
        envelopes.release(a.take_envelope().unwrap());
        pool.release(a);
        envelopes.release(b.take_envelope().unwrap());
        pool.release(b);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(envelopes.active_count(), 0);

        // the recycled session is clean
        let mut c = pool
            .borrow(stream(), 3, "10.0.0.3".to_string(), &envelopes)
            .await
            .unwrap();
        assert_eq!(c.id, 3);
        assert_eq!(c.remote_ip, "10.0.0.3");
        assert!(c.is_alive());
        envelopes.release(c.take_envelope().unwrap());
        pool.release(c);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_fails_the_borrow_after_the_soft_wait() {
        let pool = ClientPool::new(1, Duration::from_secs(30));
        let envelopes = EnvelopePool::new(2);

        let held = pool
            .borrow(stream(), 1, "10.0.0.1".to_string(), &envelopes)
            .await
            .unwrap();

        let err = pool
            .borrow(stream(), 2, "10.0.0.2".to_string(), &envelopes)
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::Exhausted);
        pool.release(held);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_borrows_and_waits_for_drain() {
        let pool = Arc::new(ClientPool::new(2, Duration::from_secs(30)));
        let envelopes = EnvelopePool::new(2);

        let held = pool
            .borrow(stream(), 1, "10.0.0.1".to_string(), &envelopes)
            .await
            .unwrap();

        pool.shutdown_state();
        assert!(pool.is_shutting_down());

        let err = pool
            .borrow(stream(), 2, "10.0.0.2".to_string(), &envelopes)
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::ShuttingDown);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown_wait().await })
        };
        pool.release(held);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("drain completes once the session is returned")
            .unwrap();
    }
}
