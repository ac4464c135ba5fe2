//! Conversation identifier allocation.
//!
//! Identifiers are drawn from a strictly increasing 64-bit counter starting
//! at 1 and bounded by `2^63 - 1` so they always fit an `i64` on the wire.
//! An identifier is never reused while its generator is alive; once the bound
//! is reached every further request fails with
//! [`ClientError::IdsExhausted`](crate::error::ClientError::IdsExhausted)
//! rather than wrapping.
//!
//! A single process-wide generator, created at startup and shared by
//! reference, also hands out the set identifiers that distinguish one
//! [`ConversationSet`](super::ConversationSet) from another.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ClientError, Result};

/// Largest identifier a generator will ever hand out.
pub const MAX_ID: u64 = i64::MAX as u64;

/// Identifier of one in-flight conversation, unique within its generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(u64);

impl ConversationId {
    /// Wrap a raw identifier value (e.g. one decoded off the wire).
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw identifier value.
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing identifier allocator.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
    bound: u64,
}

impl IdGenerator {
    /// Create a generator covering the full identifier space.
    pub fn new() -> Self {
        Self::with_bound(MAX_ID)
    }

    /// Create a generator with a custom upper bound (inclusive).
    pub fn with_bound(bound: u64) -> Self {
        Self {
            next: AtomicU64::new(1),
            bound,
        }
    }

    /// Allocate the next identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IdsExhausted`] once the bound has been passed.
    pub fn next_id(&self) -> Result<u64> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id > self.bound {
            return Err(ClientError::IdsExhausted);
        }
        Ok(id)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
