//! Identity pool with lazy ban expiry

use super::{HealthState, Identity, ProxyDescriptor};
use crate::config::IdentityConfig;
use crate::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Rotating pool of identities shared across sessions
///
/// An explicit object, passed into each session controller, so tests can
/// construct isolated pools. All mutation happens under one mutex; there is
/// no background expiry task — `acquire` sweeps expired bans lazily.
#[derive(Debug, Default)]
pub struct IdentityPool {
    records: Mutex<Vec<Identity>>,
}

impl IdentityPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool pre-loaded from configuration entries
    pub fn from_config(entries: &[IdentityConfig]) -> Result<Self> {
        let pool = Self::new();
        pool.load(entries)?;
        Ok(pool)
    }

    /// Append identities parsed from configuration entries
    ///
    /// Later calls append rather than replace. Fails with
    /// `Error::Configuration` on malformed entries; nothing is added when any
    /// entry is invalid.
    pub fn load(&self, entries: &[IdentityConfig]) -> Result<()> {
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            let proxy = ProxyDescriptor::parse(&entry.proxy)?;
            if entry.user_agent.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "Identity for proxy '{}' has an empty user agent",
                    proxy
                )));
            }
            parsed.push(Identity::new(proxy, entry.user_agent.clone()));
        }

        let mut records = self.lock();
        for identity in parsed {
            // (proxy, user_agent) uniqueness: re-loading an existing pair is a no-op.
            let exists = records
                .iter()
                .any(|r| r.proxy == identity.proxy && r.user_agent == identity.user_agent);
            if !exists {
                records.push(identity);
            }
        }

        debug!("Identity pool loaded, {} identities total", records.len());
        Ok(())
    }

    /// Hand out a uniformly-random ACTIVE identity
    ///
    /// Expired bans are released first. The identity is not marked in-use:
    /// concurrent reuse across sessions is intentional. Fails with
    /// `Error::PoolExhausted` when no ACTIVE identity exists.
    pub fn acquire(&self) -> Result<Identity> {
        let mut records = self.lock();
        Self::release_expired_locked(&mut records);

        let active: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.health == HealthState::Active)
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            return Err(Error::PoolExhausted);
        }

        // Random selection rather than round-robin: predictable rotation
        // patterns are themselves a detection signal.
        let pick = active[rand::thread_rng().gen_range(0..active.len())];
        Ok(records[pick].clone())
    }

    /// Ban an identity for `duration`
    ///
    /// Idempotent: banning an already-banned identity overwrites reason and
    /// expiry. Unknown identities are ignored with a warning.
    pub fn ban(&self, identity: &Identity, reason: impl Into<String>, duration: Duration) {
        // Out-of-range durations clamp to an effectively permanent ban.
        let delta = ChronoDuration::from_std(duration)
            .unwrap_or_else(|_| ChronoDuration::days(36_500));
        self.ban_until(identity, reason, Utc::now() + delta);
    }

    /// Ban an identity until an explicit expiry timestamp
    pub fn ban_until(
        &self,
        identity: &Identity,
        reason: impl Into<String>,
        expiry: DateTime<Utc>,
    ) {
        let reason = reason.into();
        let mut records = self.lock();

        match records
            .iter_mut()
            .find(|r| r.proxy == identity.proxy && r.user_agent == identity.user_agent)
        {
            Some(record) => {
                record.health = HealthState::Banned;
                record.ban_reason = Some(reason.clone());
                record.ban_expiry = Some(expiry);
                debug!(
                    "Banned identity {} until {} ({})",
                    record.proxy, expiry, reason
                );
            }
            None => {
                warn!("Attempted to ban unknown identity {}", identity.proxy);
            }
        }
    }

    /// Flip BANNED identities past their expiry back to ACTIVE
    ///
    /// Also called lazily by `acquire`.
    pub fn release_expired(&self) {
        let mut records = self.lock();
        Self::release_expired_locked(&mut records);
    }

    fn release_expired_locked(records: &mut [Identity]) {
        let now = Utc::now();
        for record in records.iter_mut() {
            if record.health == HealthState::Banned {
                if let Some(expiry) = record.ban_expiry {
                    if now >= expiry {
                        record.health = HealthState::Active;
                        record.ban_reason = None;
                        record.ban_expiry = None;
                        debug!("Ban expired, identity {} active again", record.proxy);
                    }
                }
            }
        }
    }

    /// Remove all identities
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Total identities in the pool
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Identities currently ACTIVE (without sweeping expired bans)
    pub fn active_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.health == HealthState::Active)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Identity>> {
        // A poisoned pool lock means a panic mid-update; the records
        // themselves are always left in a consistent state, so keep going.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
