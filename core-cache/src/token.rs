//! Invalidation token
//!
//! Observers keep the last token they rendered and compare it with the
//! current one; a different token means "cache contents changed, re-read the
//! snapshots". Tokens carry no other meaning.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Opaque change marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvalidationToken(Uuid);

impl InvalidationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// A token guaranteed to differ from `self`.
    pub fn next(&self) -> Self {
        loop {
            let candidate = Self::new();
            if candidate != *self {
                return candidate;
            }
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InvalidationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvalidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current token plus the watch channel it is published on.
#[derive(Debug)]
pub(crate) struct TokenCell {
    current: InvalidationToken,
    sender: watch::Sender<InvalidationToken>,
}

impl TokenCell {
    pub(crate) fn new() -> Self {
        let current = InvalidationToken::new();
        let (sender, _) = watch::channel(current);
        Self { current, sender }
    }

    pub(crate) fn current(&self) -> InvalidationToken {
        self.current
    }

    /// Replace the token and notify subscribers.
    pub(crate) fn bump(&mut self) -> InvalidationToken {
        self.current = self.current.next();
        self.sender.send_replace(self.current);
        self.current
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<InvalidationToken> {
        self.sender.subscribe()
    }
}
