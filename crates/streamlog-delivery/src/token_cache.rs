//! The current write token for one stream.

use streamlog_core::WriteToken;

/// Holds the token the next write must present.
///
/// Empty means unknown: the owner must look the token up before writing.
/// There is no locking; the delivery engine is the only writer.
#[derive(Debug, Default)]
pub struct SequenceTokenCache {
    current: Option<WriteToken>,
}

impl SequenceTokenCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, if known.
    #[must_use]
    pub fn get(&self) -> Option<&WriteToken> {
        self.current.as_ref()
    }

    /// Replace the cached token.
    pub fn set(&mut self, token: WriteToken) {
        self.current = Some(token);
    }

    /// Forget the cached token so the next write fetches a fresh one.
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}
