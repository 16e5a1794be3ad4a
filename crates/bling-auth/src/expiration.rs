//! Absolute expiration instants for access tokens
//!
//! Bling reports `expires_in` as a delta in seconds. Stored credentials carry
//! the absolute instant instead, always expressed in America/Sao_Paulo so
//! values written on hosts with different local timezones compare equal.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::constants::EXPIRATION_TIMEZONE;

/// Largest `expires_in` magnitude honoured (100 years). Anything beyond is
/// clamped so a misbehaving provider cannot overflow the date arithmetic.
const MAX_EXPIRES_IN_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Source of "now" for expiration arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for deterministic tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// `now + expires_in_secs`, in the fixed expiration timezone.
///
/// Zero or negative deltas are accepted and produce an instant at or before
/// now; the caller decides what a non-positive lifetime means.
pub fn compute_expiration(expires_in_secs: i64, clock: &dyn Clock) -> DateTime<Tz> {
    let now = clock.now().with_timezone(&EXPIRATION_TIMEZONE);
    let secs = expires_in_secs.clamp(-MAX_EXPIRES_IN_SECS, MAX_EXPIRES_IN_SECS);
    let delta = TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::zero());
    now.checked_add_signed(delta).unwrap_or(now)
}

/// Whether `expiration` is at or before the clock's current instant.
pub fn is_expired(expiration: &DateTime<Tz>, clock: &dyn Clock) -> bool {
    *expiration <= clock.now()
}
