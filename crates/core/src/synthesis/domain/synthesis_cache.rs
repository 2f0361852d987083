use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;

use super::synthesis_result::SynthesisResult;
use super::voice_profile::VoiceProfile;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SynthesisKey {
    segment_id: String,
    text: String,
    voice: String,
}

impl SynthesisKey {
    pub fn new(segment_id: &str, text: &str, voice: &VoiceProfile) -> Self {
        Self {
            segment_id: segment_id.to_string(),
            text: text.to_string(),
            voice: voice.cache_key(),
        }
    }
}

#[derive(Debug)]
pub struct CachedSynthesis {
    pub result: SynthesisResult,
    stored_at: Instant,
}

impl CachedSynthesis {
    pub fn new(result: SynthesisResult) -> Self {
        Self {
            result,
            stored_at: Instant::now(),
        }
    }
}

pub type SynthesisSlot = Arc<OnceCell<CachedSynthesis>>;

/// Keyed store of synthesis results with a time-to-live.
///
/// A key maps to a single slot. Callers racing on the same key receive the
/// same slot and so share one in-flight request. Failed requests leave the
/// slot empty and the caller discards it, so failures are never cached.
pub struct SynthesisCache {
    ttl: Duration,
    slots: Mutex<HashMap<SynthesisKey, SynthesisSlot>>,
}

impl SynthesisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live slot for `key`, replacing it if its result expired.
    pub fn slot(&self, key: SynthesisKey) -> SynthesisSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        slots.retain(|_, slot| !self.is_expired(slot, now));
        slots
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Drops `slot` if it is still the entry for `key` and holds no result.
    pub fn discard_failed(&self, key: &SynthesisKey, slot: &SynthesisSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized())
        {
            slots.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, slot: &SynthesisSlot, now: Instant) -> bool {
        match slot.get() {
            Some(cached) => now.duration_since(cached.stored_at) >= self.ttl,
            None => false,
        }
    }
}
