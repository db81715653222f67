//! Analysis outcomes
//!
//! Every query in this crate produces a usable answer. When the input is
//! unreadable or degenerate the answer is a canned default, tagged as
//! degraded so callers can tell it apart from a real detection.

/// A detected value, or a fallback substituted for a failed detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The value was estimated from the input.
    Detected(T),
    /// Estimation failed or was undefined; `value` is a fallback.
    Degraded {
        /// The fallback value.
        value: T,
        /// Why the fallback was used.
        reason: String,
    },
}

impl<T> Outcome<T> {
    /// Build a degraded outcome and log why.
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::warn!("Falling back to default result: {reason}");
        Outcome::Degraded { value, reason }
    }

    /// True for a fallback value.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    /// The value, detected or not.
    pub fn value(&self) -> &T {
        match self {
            Outcome::Detected(v) => v,
            Outcome::Degraded { value, .. } => value,
        }
    }

    /// Consume the outcome and return the value, detected or not.
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Detected(v) => v,
            Outcome::Degraded { value, .. } => value,
        }
    }

    /// The value only if it was detected.
    pub fn detected(self) -> Option<T> {
        match self {
            Outcome::Detected(v) => Some(v),
            Outcome::Degraded { .. } => None,
        }
    }

    /// The fallback reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Detected(_) => None,
            Outcome::Degraded { reason, .. } => Some(reason),
        }
    }

    /// Transform the value, keeping the tag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Detected(v) => Outcome::Detected(f(v)),
            Outcome::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}
