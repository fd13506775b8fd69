use std::time::Duration;

use crate::config::ReadPolicy;

/// Per-call overrides for `remember` and `mremember`.
///
/// Unset fields fall back to the cache configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RememberOptions {
    /// TTL for loaded values when the loader does not suggest one.
    pub ttl: Option<Duration>,
    /// Read policy for this call (ignored by `mremember`).
    pub policy: Option<ReadPolicy>,
}

impl RememberOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_policy(mut self, policy: ReadPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// A value produced by a loader, with an optional TTL suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub value: Vec<u8>,
    /// Suggested TTL; `None` or zero uses the call/default TTL.
    pub ttl: Option<Duration>,
}

impl Loaded {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Outcome of a single-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A value was found.
    Hit(Vec<u8>),
    /// The key is negatively cached: known not to exist.
    Negative,
    /// No layer holds the key.
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Negative | Self::Miss => None,
        }
    }
}
