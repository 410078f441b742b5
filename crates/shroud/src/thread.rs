use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 128-bit identifier scoping all mapping and conversation state.
///
/// Callers hand the middleware an arbitrary string key; the derivation is
/// pure and stable, so the same key always lands on the same thread:
///
/// - a key that parses as a UUID is used verbatim,
/// - any other key is hashed (md5, 128 bits) into one,
/// - no key at all yields a fresh random id whose history is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(Uuid);

impl ThreadId {
    /// Derives a thread id from a caller-supplied key.
    pub fn from_key(key: &str) -> Self {
        match Uuid::parse_str(key) {
            Ok(id) => ThreadId(id),
            Err(_) => ThreadId(Uuid::from_bytes(md5::compute(key.as_bytes()).0)),
        }
    }

    /// A fresh random thread id, used for single-shot calls without a key.
    pub fn random() -> Self {
        ThreadId(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
