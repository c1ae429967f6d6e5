//! Monotonic gateway clock.
//!
//! The core never reads the OS clock; every entry point (`Gateway::poll`,
//! packet-arrival handlers) receives `now` from the caller, per SPEC_FULL.md
//! §3 "Clock abstraction". This keeps the whole engine reproducible from a
//! fixed sequence of `(now, event)` pairs, which is how the end-to-end
//! scenario tests in this crate drive it.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Milliseconds since an arbitrary epoch chosen by the caller (typically
/// gateway start).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GwInstant(pub u64);

impl GwInstant {
    pub const ZERO: GwInstant = GwInstant(0);

    pub fn from_millis(ms: u64) -> Self {
        GwInstant(ms)
    }

    pub fn from_secs(s: u64) -> Self {
        GwInstant(s.saturating_mul(1000))
    }

    /// Saturating forward deadline; never wraps or panics even if `d` is huge.
    pub fn checked_add(self, d: Duration) -> GwInstant {
        GwInstant(self.0.saturating_add(d.as_millis() as u64))
    }

    pub fn has_elapsed(self, deadline: GwInstant) -> bool {
        self >= deadline
    }
}

impl Add<Duration> for GwInstant {
    type Output = GwInstant;
    fn add(self, rhs: Duration) -> GwInstant {
        self.checked_add(rhs)
    }
}

impl fmt::Debug for GwInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
