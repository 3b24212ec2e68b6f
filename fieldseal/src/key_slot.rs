//! Reuse policy for provider-issued data keys.

use crate::error::KeyProviderError;
use crate::key_provider::DataKey;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// A cached data key. Only stored while `uses_remaining >= 1`.
struct CachedKey {
    key: DataKey,
    uses_remaining: u32,
}

/// Holds at most one data key and hands it out up to `max_uses` times.
///
/// The lock is held across generation, so concurrent callers that find the
/// slot empty wait for one generation instead of starting their own. The slot
/// is emptied before generating; a failed, timed out or cancelled generation
/// leaves it empty.
pub(crate) struct KeySlot {
    max_uses: u32,
    current: Mutex<Option<CachedKey>>,
}

impl KeySlot {
    /// `max_uses` must be at least 1.
    pub(crate) fn new(max_uses: u32) -> Self {
        Self { max_uses, current: Mutex::new(None) }
    }

    /// Returns the cached key, generating a new one when the slot is empty.
    ///
    /// The final use of a key moves it out of the slot, so it is zeroed as
    /// soon as the caller drops it.
    pub(crate) async fn acquire<F, Fut>(&self, generate: F) -> Result<DataKey, KeyProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DataKey, KeyProviderError>>,
    {
        let mut current = self.current.lock().await;

        let mut cached = match current.take() {
            Some(cached) => cached,
            None => {
                let key = generate().await?;
                debug!(max_uses = self.max_uses, key_index = ?key.key_index(), "generated data key");
                CachedKey { key, uses_remaining: self.max_uses }
            }
        };

        cached.uses_remaining -= 1;
        if cached.uses_remaining == 0 {
            trace!("data key reached its use limit, retiring");
            Ok(cached.key)
        } else {
            let key = cached.key.duplicate();
            *current = Some(cached);
            Ok(key)
        }
    }
}
