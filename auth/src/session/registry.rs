use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;

use super::errors::SessionError;
use crate::clock::Clock;

/// Bytes of OS randomness behind every refresh token (256 bits).
const REFRESH_TOKEN_BYTES: usize = 32;

/// Server-side record binding a refresh token to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session<U> {
    pub refresh_token: String,
    pub user_id: U,
    pub created_at: DateTime<Utc>,
    /// Owner's revocation generation when the session was opened.
    generation: u64,
}

impl<U> Session<U> {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// In-process registry of refresh-token sessions.
///
/// Sessions are keyed by their refresh token in a sharded map. Each
/// operation on a token runs under that token's shard lock and never awaits,
/// so concurrent refresh/revoke calls on one token are linearizable: `consume`
/// removes and returns in one step, and only one caller can win it.
///
/// Sessions older than the refresh TTL are treated as absent by every read.
///
/// Each user also carries a revocation generation. `delete_all` bumps it, and
/// a session consumed under an older generation can neither be renewed nor
/// restored. Writers take the user's generation entry before touching the
/// session map, so a rotation that straddles a revoke-all is refused.
pub struct SessionRegistry<U> {
    sessions: DashMap<String, Session<U>>,
    generations: DashMap<U, u64>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<U> SessionRegistry<U>
where
    U: Clone + Eq + Hash + fmt::Display + Send + Sync,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            generations: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Open a session for `user_id` and return its refresh token.
    ///
    /// # Errors
    /// * `EntropyUnavailable` - The OS random source failed
    pub fn create(&self, user_id: U) -> Result<String, SessionError> {
        let refresh_token = generate_token()?;

        let generation = self.generations.entry(user_id.clone()).or_insert(0);
        self.sessions.insert(
            refresh_token.clone(),
            Session {
                refresh_token: refresh_token.clone(),
                user_id: user_id.clone(),
                created_at: self.clock.now(),
                generation: *generation,
            },
        );
        drop(generation);

        tracing::debug!(user_id = %user_id, "Session created");

        Ok(refresh_token)
    }

    /// Open the successor of a consumed session.
    ///
    /// # Errors
    /// * `Revoked` - The owner's sessions were revoked after `previous` was opened
    /// * `EntropyUnavailable` - The OS random source failed
    pub fn renew(&self, previous: &Session<U>) -> Result<String, SessionError> {
        let refresh_token = generate_token()?;

        let generation = self
            .generations
            .entry(previous.user_id.clone())
            .or_insert(0);
        if *generation != previous.generation {
            tracing::debug!(user_id = %previous.user_id, "Renewal refused after revocation");
            return Err(SessionError::Revoked);
        }

        self.sessions.insert(
            refresh_token.clone(),
            Session {
                refresh_token: refresh_token.clone(),
                user_id: previous.user_id.clone(),
                created_at: self.clock.now(),
                generation: previous.generation,
            },
        );

        Ok(refresh_token)
    }

    /// Put back a session taken by `consume` whose rotation could not finish.
    ///
    /// Returns false, leaving the session gone, if the owner was revoked in
    /// the meantime or the session has expired.
    pub fn restore(&self, session: Session<U>) -> bool {
        let generation = self
            .generations
            .entry(session.user_id.clone())
            .or_insert(0);
        if *generation != session.generation
            || session.is_expired(self.clock.now(), self.ttl)
        {
            return false;
        }

        self.sessions
            .insert(session.refresh_token.clone(), session);

        true
    }

    /// Look up a live session. An expired session is dropped and `None` is
    /// returned.
    pub fn get(&self, refresh_token: &str) -> Option<Session<U>> {
        let now = self.clock.now();
        let ttl = self.ttl;

        if self
            .sessions
            .remove_if(refresh_token, |_, session| session.is_expired(now, ttl))
            .is_some()
        {
            return None;
        }

        self.sessions
            .get(refresh_token)
            .map(|entry| entry.value().clone())
    }

    /// Atomically remove a session and return it if it was still live.
    ///
    /// This is the single-use step of refresh rotation: of several callers
    /// racing on the same token at most one receives `Some`.
    pub fn consume(&self, refresh_token: &str) -> Option<Session<U>> {
        let (_, session) = self.sessions.remove(refresh_token)?;

        if session.is_expired(self.clock.now(), self.ttl) {
            return None;
        }

        Some(session)
    }

    /// Remove one session. Returns whether it existed.
    pub fn delete(&self, refresh_token: &str) -> bool {
        self.sessions.remove(refresh_token).is_some()
    }

    /// Remove every session owned by `user_id` and bump its generation, so
    /// rotations already in flight cannot open a successor. Returns how many
    /// sessions were removed.
    pub fn delete_all(&self, user_id: &U) -> usize {
        let mut generation = self.generations.entry(user_id.clone()).or_insert(0);
        *generation += 1;

        let mut removed = 0;

        self.sessions.retain(|_, session| {
            if &session.user_id == user_id {
                removed += 1;
                false
            } else {
                true
            }
        });

        drop(generation);

        tracing::debug!(user_id = %user_id, removed, "Sessions revoked for user");

        removed
    }

    /// Drop every session older than the TTL and return their tokens.
    ///
    /// Idempotent; safe to run alongside any other operation.
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut removed = Vec::new();

        self.sessions.retain(|token, session| {
            if session.is_expired(now, ttl) {
                removed.push(token.clone());
                false
            } else {
                true
            }
        });

        removed
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::EntropyUnavailable(e.to_string()))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> (Arc<SessionRegistry<String>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = Arc::new(SessionRegistry::new(Duration::days(7), clock.clone()));
        (registry, clock)
    }

    #[test]
    fn test_create_and_get() {
        let (registry, _clock) = registry();

        let token = registry.create("user1".to_string()).unwrap();

        assert_eq!(token.len(), REFRESH_TOKEN_BYTES * 2);
        let session = registry.get(&token).expect("session should exist");
        assert_eq!(session.user_id, "user1");
        assert_eq!(session.refresh_token, token);
    }

    #[test]
    fn test_tokens_are_unique() {
        let (registry, _clock) = registry();

        let tokens: HashSet<String> = (0..100)
            .map(|_| registry.create("user1".to_string()).unwrap())
            .collect();

        assert_eq!(tokens.len(), 100);
        assert_eq!(registry.len(), 100);
    }

    #[test]
    fn test_consume_is_single_use() {
        let (registry, _clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        assert!(registry.consume(&token).is_some());
        assert!(registry.consume(&token).is_none());
        assert!(registry.get(&token).is_none());
    }

    #[test]
    fn test_concurrent_consume_has_one_winner() {
        let (registry, _clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let token = token.clone();
                thread::spawn(move || registry.consume(&token).is_some())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_expired_session_is_not_returned() {
        let (registry, clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        clock.advance(Duration::days(7));
        assert!(registry.get(&token).is_some(), "live exactly at the TTL");

        clock.advance(Duration::seconds(1));
        assert!(registry.get(&token).is_none());
        assert!(registry.is_empty(), "expired session dropped on read");
    }

    #[test]
    fn test_consume_expired_session_fails() {
        let (registry, clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        clock.advance(Duration::days(8));

        assert!(registry.consume(&token).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_delete() {
        let (registry, _clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        assert!(registry.delete(&token));
        assert!(!registry.delete(&token));
        assert!(registry.get(&token).is_none());
    }

    #[test]
    fn test_delete_all_only_touches_owner() {
        let (registry, _clock) = registry();
        let first = registry.create("user1".to_string()).unwrap();
        let second = registry.create("user1".to_string()).unwrap();
        let other = registry.create("user2".to_string()).unwrap();

        assert_eq!(registry.delete_all(&"user1".to_string()), 2);

        assert!(registry.get(&first).is_none());
        assert!(registry.get(&second).is_none());
        assert!(registry.get(&other).is_some());
    }

    #[test]
    fn test_renew_opens_successor() {
        let (registry, _clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        let previous = registry.consume(&token).unwrap();
        let successor = registry.renew(&previous).unwrap();

        assert_ne!(successor, token);
        assert_eq!(registry.get(&successor).unwrap().user_id, "user1");
    }

    #[test]
    fn test_renew_refused_after_delete_all() {
        let (registry, _clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();
        let other = registry.create("user2".to_string()).unwrap();

        let previous = registry.consume(&token).unwrap();
        assert_eq!(registry.delete_all(&"user1".to_string()), 0);

        assert_eq!(registry.renew(&previous), Err(SessionError::Revoked));
        assert!(!registry.restore(previous));
        assert_eq!(registry.len(), 1);

        // Other users and later logins are unaffected.
        let other_previous = registry.consume(&other).unwrap();
        assert!(registry.renew(&other_previous).is_ok());
        let fresh = registry.create("user1".to_string()).unwrap();
        let fresh_previous = registry.consume(&fresh).unwrap();
        assert!(registry.renew(&fresh_previous).is_ok());
    }

    #[test]
    fn test_restore_returns_consumed_session() {
        let (registry, clock) = registry();
        let token = registry.create("user1".to_string()).unwrap();

        let session = registry.consume(&token).unwrap();
        assert!(registry.restore(session));
        assert!(registry.get(&token).is_some());

        let session = registry.consume(&token).unwrap();
        clock.advance(Duration::days(8));
        assert!(!registry.restore(session));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_renew_and_delete_all() {
        for _ in 0..50 {
            let (registry, _clock) = registry();
            let token = registry.create("user1".to_string()).unwrap();
            let previous = registry.consume(&token).unwrap();

            let renewer = thread::spawn({
                let registry = Arc::clone(&registry);
                move || registry.renew(&previous)
            });
            let revoker = thread::spawn({
                let registry = Arc::clone(&registry);
                move || registry.delete_all(&"user1".to_string())
            });

            let renewed = renewer.join().unwrap();
            revoker.join().unwrap();

            // Whichever ran first, nothing survives the revoke.
            if let Ok(successor) = renewed {
                assert!(registry.get(&successor).is_none());
            }
            assert!(registry.is_empty());
        }
    }

    #[test]
    fn test_sweep_expired() {
        let (registry, clock) = registry();
        let old = registry.create("user1".to_string()).unwrap();

        clock.advance(Duration::days(5));
        let fresh = registry.create("user2".to_string()).unwrap();

        clock.advance(Duration::days(3));
        let removed = registry.sweep_expired();

        assert_eq!(removed, vec![old]);
        assert!(registry.get(&fresh).is_some());

        // Idempotent
        assert!(registry.sweep_expired().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sweep_concurrent_with_consume() {
        let (registry, clock) = registry();
        let tokens: Vec<String> = (0..64)
            .map(|i| registry.create(format!("user{}", i % 4)).unwrap())
            .collect();

        clock.advance(Duration::days(8));

        let sweeper = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.sweep_expired().len() }
        });
        let consumers: Vec<_> = tokens
            .iter()
            .cloned()
            .map(|token| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.consume(&token).is_some() })
            })
            .collect();

        let swept = sweeper.await.unwrap();
        for consumer in consumers {
            assert!(!consumer.await.unwrap(), "expired token must never be consumed");
        }

        assert!(swept <= tokens.len());
        assert!(registry.is_empty());
    }
}
