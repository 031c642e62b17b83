//! The SMTP transaction state for one in-progress message, and the pool
//! the per-connection envelopes are recycled through.

use anyhow::Context;
use parking_lot::Mutex;
use rfc5321::Address;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
}

/// One SMTP transaction: reverse path, recipients, the authenticated
/// identity (if any) and the message body.
///
/// `mail_from` is None outside of a transaction; `MAIL FROM:<>` stores
/// `Some(Address::default())`.
#[derive(Debug, Default)]
pub struct Envelope {
    pub mail_from: Option<Address>,
    pub rcpt_to: Vec<Address>,
    pub auth: Option<AuthCredentials>,
    pub data: Vec<u8>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Envelope {
    pub fn push_rcpt(&mut self, to: Address) {
        self.rcpt_to.push(to);
    }

    pub fn pop_rcpt(&mut self) -> Option<Address> {
        self.rcpt_to.pop()
    }

    /// Clear the transaction (RSET, HELO/EHLO, completed DATA) while
    /// preserving the authenticated identity.
    pub fn reset_transaction(&mut self) {
        self.mail_from = None;
        self.rcpt_to.clear();
        self.data.clear();
    }

    fn reset(&mut self) {
        self.reset_transaction();
        self.auth = None;
        self._permit = None;
    }
}

/// A bounded pool of reusable envelope buffers. A borrowed Envelope is
/// always paired with a borrowed Session; on session exit the envelope
/// is released first, then the session.
pub struct EnvelopePool {
    capacity: usize,
    free: Mutex<Vec<Envelope>>,
    sem: Arc<Semaphore>,
}

impl EnvelopePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::with_capacity(capacity)),
            sem: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub async fn borrow(&self) -> anyhow::Result<Envelope> {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .context("envelope pool closed")?;
        let mut envelope = self.free.lock().pop().unwrap_or_default();
        envelope._permit = Some(permit);
        Ok(envelope)
    }

    pub fn release(&self, mut envelope: Envelope) {
        envelope.reset();
        self.free.lock().push(envelope);
    }

    pub fn active_count(&self) -> usize {
        self.capacity - self.sem.available_permits()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reset_preserves_auth_across_transactions() {
        let mut env = Envelope::default();
        env.mail_from = Some(Address::default());
        env.push_rcpt(Address::default());
        env.data.extend_from_slice(b"hello");
        env.auth = Some(AuthCredentials {
            username: "agni".to_string(),
            password: "pass".to_string(),
        });

        env.reset_transaction();
        assert!(env.mail_from.is_none());
        assert!(env.rcpt_to.is_empty());
        assert!(env.data.is_empty());
        assert!(env.auth.is_some());

        env.reset();
        assert!(env.auth.is_none());
    }

    #[tokio::test]
    async fn pool_conservation() {
        let pool = EnvelopePool::new(2);
        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        assert_eq!(pool.active_count(), 2);

        pool.release(a);
        assert_eq!(pool.active_count(), 1);
        pool.release(b);
        assert_eq!(pool.active_count(), 0);

        // recycled envelopes come back clean
        let c = pool.borrow().await.unwrap();
        assert!(c.mail_from.is_none() && c.rcpt_to.is_empty() && c.data.is_empty());
        pool.release(c);
    }
}
