use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Outcome of a [`IdempotencyStore::try_claim`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now holds the lease and may perform the guarded work.
    Acquired,
    /// The key was already sealed; the guarded work has happened and must
    /// not be repeated.
    AlreadyConsumed,
    /// Another holder currently owns an unexpired lease on the key.
    LockedByOther,
}

/// Lease-based idempotency key store.
///
/// Keys follow a lease-or-takeover model rather than blocking locks: a lease
/// that outlives its TTL can be taken over by any other worker, which allows
/// recovery from crashed holders without reaching the stalled process.
/// Sealing a key (`complete`) is owner-verified so a stale, resumed worker
/// can never seal over a newer holder's work.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claims `key` for `owner` with the given lease TTL.
    ///
    /// Insert-or-takeover in a single store round-trip: a missing row is
    /// inserted, an unconsumed row with an expired (or absent) lease is
    /// taken over. Anything else is reported via [`ClaimOutcome`]; the
    /// reason read is a separate diagnostic round-trip since the caller's
    /// only reaction to either answer is to stop.
    async fn try_claim(&self, key: &str, owner: &str, ttl: Duration) -> Result<ClaimOutcome>;

    /// Seals `key`, marking the guarded work as done forever.
    ///
    /// Only succeeds if `owner` still holds the lease. Completing an
    /// already-consumed key is a no-op success; completing a key whose lease
    /// moved on fails with [`IdempotencyError::LostLease`].
    ///
    /// [`IdempotencyError::LostLease`]: crate::IdempotencyError::LostLease
    async fn complete(&self, key: &str, owner: &str) -> Result<()>;

    /// Returns true if `key` has been sealed.
    async fn is_consumed(&self, key: &str) -> Result<bool>;
}
