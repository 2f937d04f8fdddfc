//! Issued-challenge ledger
//!
//! Every challenge the relying party hands out is remembered here under an
//! opaque ceremony id, together with its expiry. Redeeming removes the entry,
//! so a challenge validates at most one response.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::challenge::{Challenge, UserHandle};
use super::errors::CeremonyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// A challenge waiting for its response
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub kind: CeremonyKind,
    pub challenge: Challenge,
    /// Set for registrations: the handle placed in the creation options
    pub user_handle: Option<UserHandle>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ChallengeLedger {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, IssuedChallenge>>,
}

impl ChallengeLedger {
    #[must_use]
    pub fn new(ttl_seconds: u64) -> Self {
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    // Entries are plain data; a panic elsewhere cannot leave them inconsistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, IssuedChallenge>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember a challenge and return the id the client must present with its response
    pub fn issue(
        &self,
        kind: CeremonyKind,
        challenge: Challenge,
        user_handle: Option<UserHandle>,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut entries = self.entries();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            id,
            IssuedChallenge {
                kind,
                challenge,
                user_handle,
                expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        log::debug!("Issued {kind:?} challenge for ceremony {id}");
        id
    }

    /// Redeem a ceremony id; the entry is removed whatever the outcome
    ///
    /// # Errors
    ///
    /// - [`CeremonyError::UnknownCeremony`] if the id was never issued, was
    ///   already redeemed, or belongs to the other ceremony kind
    /// - [`CeremonyError::ChallengeExpired`] if the entry outlived its TTL
    pub fn consume(&self, id: Uuid, kind: CeremonyKind) -> Result<IssuedChallenge, CeremonyError> {
        let entry = {
            let mut entries = self.entries();
            match entries.get(&id) {
                Some(entry) if entry.kind == kind => entries.remove(&id),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            log::warn!("Unknown or replayed ceremony {id}");
            return Err(CeremonyError::UnknownCeremony);
        };
        if entry.expires_at <= Utc::now() {
            log::warn!("Challenge for ceremony {id} expired");
            return Err(CeremonyError::ChallengeExpired);
        }
        Ok(entry)
    }

    /// Drop an entry without redeeming it (cancelled ceremonies)
    pub fn discard(&self, id: Uuid) -> bool {
        self.entries().remove(&id).is_some()
    }

    /// Evict expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
