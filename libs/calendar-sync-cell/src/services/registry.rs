use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);

struct CachedToken {
    token: String,
    stored_at: Instant,
}

/// Process-local sync bookkeeping shared by the webhook path and admin tools:
/// which calendars are currently syncing, and the last continuation token
/// each one received.
///
/// Lock entries live only as long as their [`SyncGuard`]; token entries expire
/// after the configured TTL and are dropped by [`SyncRegistry::purge_expired`].
pub struct SyncRegistry {
    in_flight: Mutex<HashSet<Uuid>>,
    tokens: Mutex<HashMap<Uuid, CachedToken>>,
    token_ttl: Duration,
}

impl Default for SyncRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SyncRegistry {
    pub fn new(token_ttl: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            tokens: Mutex::new(HashMap::new()),
            token_ttl,
        }
    }

    /// Returns `None` when a sync for this calendar is already running.
    pub fn try_acquire(&self, calendar_id: Uuid) -> Option<SyncGuard<'_>> {
        if lock(&self.in_flight).insert(calendar_id) {
            Some(SyncGuard { registry: self, calendar_id })
        } else {
            None
        }
    }

    pub fn is_syncing(&self, calendar_id: Uuid) -> bool {
        lock(&self.in_flight).contains(&calendar_id)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn cached_token(&self, calendar_id: Uuid) -> Option<String> {
        let tokens = lock(&self.tokens);
        tokens
            .get(&calendar_id)
            .filter(|cached| cached.stored_at.elapsed() < self.token_ttl)
            .map(|cached| cached.token.clone())
    }

    pub fn remember_token(&self, calendar_id: Uuid, token: Option<String>) {
        let mut tokens = lock(&self.tokens);
        match token {
            Some(token) => {
                tokens.insert(calendar_id, CachedToken { token, stored_at: Instant::now() });
            }
            None => {
                tokens.remove(&calendar_id);
            }
        }
    }

    /// Drops everything known about a calendar that is being torn down.
    pub fn forget(&self, calendar_id: Uuid) {
        lock(&self.tokens).remove(&calendar_id);
    }

    pub fn purge_expired(&self) -> usize {
        let mut tokens = lock(&self.tokens);
        let before = tokens.len();
        tokens.retain(|_, cached| cached.stored_at.elapsed() < self.token_ttl);
        before - tokens.len()
    }

    pub fn cached_tokens(&self) -> usize {
        lock(&self.tokens).len()
    }

    fn release(&self, calendar_id: Uuid) {
        lock(&self.in_flight).remove(&calendar_id);
    }
}

/// Held while a calendar syncs; dropping it frees the calendar, including on
/// early return or panic.
pub struct SyncGuard<'a> {
    registry: &'a SyncRegistry,
    calendar_id: Uuid,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.calendar_id);
    }
}
