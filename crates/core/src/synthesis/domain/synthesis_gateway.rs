use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use futures_util::stream::{self, StreamExt, TryStreamExt};

use super::audio_decoder::AudioDecoder;
use super::speech_provider::{ProviderError, SpeechProvider};
use super::synthesis_cache::{CachedSynthesis, SynthesisCache, SynthesisKey};
use super::synthesis_result::{SynthesisError, SynthesisResult};
use super::voice_profile::VoiceProfile;
use crate::editing::domain::edit_plan::EditPlan;
use crate::shared::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_BACKOFF_MS, DEFAULT_SYNTHESIS_CONCURRENCY, MAX_SYNTHESIS_CHARS,
};

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub cache_ttl: Duration,
    /// Maximum synthesis requests in flight for one plan.
    pub concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            concurrency: DEFAULT_SYNTHESIS_CONCURRENCY,
        }
    }
}

/// Single entry point for turning segment text into decoded speech.
///
/// Validates text before any network call, caches results per
/// `(segment, text, voice)`, retries transient provider failures with
/// exponential backoff and decodes the audio to measure its duration.
pub struct SynthesisGateway {
    provider: Arc<dyn SpeechProvider>,
    decoder: Arc<dyn AudioDecoder>,
    cache: SynthesisCache,
    config: GatewayConfig,
}

impl SynthesisGateway {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        decoder: Arc<dyn AudioDecoder>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            provider,
            decoder,
            cache: SynthesisCache::new(config.cache_ttl),
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn synthesize(
        &self,
        segment_id: &str,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<SynthesisResult, SynthesisError> {
        validate_text(segment_id, text)?;

        let key = SynthesisKey::new(segment_id, text, voice);
        let slot = self.cache.slot(key.clone());
        if slot.initialized() {
            log::debug!("Synthesis cache hit for segment {segment_id}");
        }
        match slot.get_or_try_init(|| self.fetch(segment_id, text, voice)).await {
            Ok(cached) => Ok(cached.result.clone()),
            Err(err) => {
                self.cache.discard_failed(&key, &slot);
                Err(err)
            }
        }
    }

    /// Synthesizes every plan entry with bounded concurrency. The first
    /// failure aborts the batch and no partial results are returned.
    ///
    /// All texts are validated before the first provider call.
    pub async fn synthesize_plan(
        &self,
        plan: &EditPlan,
        voice: &VoiceProfile,
    ) -> Result<HashMap<String, SynthesisResult>, SynthesisError> {
        for entry in plan.entries() {
            validate_text(&entry.segment_id, &entry.new_text)?;
        }

        stream::iter(plan.entries())
            .map(|entry| async move {
                let result = self
                    .synthesize(&entry.segment_id, &entry.new_text, voice)
                    .await?;
                Ok::<_, SynthesisError>((entry.segment_id.clone(), result))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await
    }

    async fn fetch(
        &self,
        segment_id: &str,
        text: &str,
        voice: &VoiceProfile,
    ) -> Result<CachedSynthesis, SynthesisError> {
        let attempts = AtomicUsize::new(0);
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.initial_backoff)
            .with_max_delay(self.config.max_backoff)
            .with_max_times(self.config.max_attempts.saturating_sub(1))
            .with_jitter();

        let audio_bytes = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            self.provider.synthesize(text, voice).await
        })
        .retry(backoff)
        .when(ProviderError::is_transient)
        .adjust(|err: &ProviderError, delay: Option<Duration>| {
            delay.map(|d| err.retry_after().map_or(d, |wait| wait.max(d)))
        })
        .notify(|err: &ProviderError, delay: Duration| {
            log::warn!(
                "Synthesis for segment {segment_id} failed ({err}), retrying in {}ms",
                delay.as_millis()
            );
        })
        .await
        .map_err(|err| match err {
            ProviderError::Permanent { .. } => SynthesisError::Permanent {
                segment_id: segment_id.to_string(),
                source: err,
            },
            ProviderError::Transient { .. } => SynthesisError::SynthesisFailed {
                segment_id: segment_id.to_string(),
                attempts: attempts.load(Ordering::SeqCst),
                last_error: err,
            },
        })?;

        let decoder = Arc::clone(&self.decoder);
        let encoded = audio_bytes.clone();
        let audio = tokio::task::spawn_blocking(move || {
            decoder.decode(&encoded).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|decoded| decoded)
        .map_err(|message| SynthesisError::Decode {
            segment_id: segment_id.to_string(),
            message,
        })?;

        if audio.frames() == 0 {
            return Err(SynthesisError::Decode {
                segment_id: segment_id.to_string(),
                message: "provider returned no audio".to_string(),
            });
        }

        let measured_duration = audio.duration();
        log::info!(
            "Synthesized segment {segment_id}: {measured_duration:.3}s after {} attempt(s)",
            attempts.load(Ordering::SeqCst)
        );
        Ok(CachedSynthesis::new(SynthesisResult {
            segment_id: segment_id.to_string(),
            audio_bytes,
            audio,
            measured_duration,
            source_text: text.to_string(),
        }))
    }
}

fn validate_text(segment_id: &str, text: &str) -> Result<(), SynthesisError> {
    let invalid = |reason: String| SynthesisError::InvalidText {
        segment_id: segment_id.to_string(),
        reason,
    };
    if text.trim().is_empty() {
        return Err(invalid("text is empty".to_string()));
    }
    let chars = text.chars().count();
    if chars > MAX_SYNTHESIS_CHARS {
        return Err(invalid(format!(
            "text has {chars} characters, limit is {MAX_SYNTHESIS_CHARS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::domain::audio_buffer::AudioBuffer;
    use crate::editing::domain::edit_plan::PlannedSegment;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // --- Stubs ---

    /// Returns scripted responses in order, then echoes the text length as
    /// audio bytes once the script runs out.
    struct StubProvider {
        calls: Arc<Mutex<Vec<String>>>,
        script: Mutex<VecDeque<Result<Bytes, ProviderError>>>,
        delay: Duration,
    }

    impl StubProvider {
        fn new(script: Vec<Result<Bytes, ProviderError>>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: calls.clone(),
                    script: Mutex::new(script.into()),
                    delay: Duration::ZERO,
                },
                calls,
            )
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl SpeechProvider for StubProvider {
        async fn synthesize(&self, text: &str, _voice: &VoiceProfile) -> Result<Bytes, ProviderError> {
            self.calls.lock().unwrap().push(text.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(Bytes::from(vec![0u8; text.len()])))
        }
    }

    /// One encoded byte decodes to a tenth of a second of mono audio.
    struct StubDecoder;

    impl AudioDecoder for StubDecoder {
        fn decode(&self, encoded: &[u8]) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
            Ok(AudioBuffer::silent(encoded.len() * 100, 1000, 1))
        }
    }

    struct FailingDecoder;

    impl AudioDecoder for FailingDecoder {
        fn decode(&self, _encoded: &[u8]) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
            Err("not an mp3".into())
        }
    }

    /// Tracks how many calls are in flight at once.
    struct CountingProvider {
        in_flight: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechProvider for CountingProvider {
        async fn synthesize(&self, text: &str, _voice: &VoiceProfile) -> Result<Bytes, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Bytes::from(vec![0u8; text.len()]))
        }
    }

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..GatewayConfig::default()
        }
    }

    fn gateway(provider: StubProvider, config: GatewayConfig) -> SynthesisGateway {
        SynthesisGateway::new(Arc::new(provider), Arc::new(StubDecoder), config)
    }

    fn transient() -> ProviderError {
        ProviderError::from_status(503, "busy".into(), None)
    }

    fn plan(entries: &[(&str, &str)]) -> EditPlan {
        EditPlan::new(
            entries
                .iter()
                .map(|(id, text)| PlannedSegment {
                    segment_id: id.to_string(),
                    original_text: "old".to_string(),
                    new_text: text.to_string(),
                    edit_count: 1,
                })
                .collect(),
        )
    }

    // --- Tests ---

    #[tokio::test]
    async fn test_synthesize_measures_decoded_duration() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let result = gw
            .synthesize("s1", "Friday sale", &VoiceProfile::default())
            .await
            .unwrap();
        assert_eq!(result.segment_id, "s1");
        assert_eq!(result.source_text, "Friday sale");
        assert!((result.measured_duration - 1.1).abs() < 1e-9);
        assert_eq!(result.audio_bytes.len(), 11);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_request_is_served_from_cache() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let voice = VoiceProfile::default();
        let first = gw.synthesize("s1", "hello", &voice).await.unwrap();
        let second = gw.synthesize("s1", "hello", &voice).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_one_call() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider.with_delay(Duration::from_millis(20)), fast_config());
        let voice = VoiceProfile::default();
        let (a, b) = tokio::join!(
            gw.synthesize("s1", "hello", &voice),
            gw.synthesize("s1", "hello", &voice)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_different_text_or_voice_is_a_new_request() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        gw.synthesize("s1", "hello", &VoiceProfile::default()).await.unwrap();
        gw.synthesize("s1", "hello!", &VoiceProfile::default()).await.unwrap();
        gw.synthesize("s1", "hello", &VoiceProfile::with_voice("other")).await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_expired_entry_is_fetched_again() {
        let (provider, calls) = StubProvider::new(vec![]);
        let config = GatewayConfig {
            cache_ttl: Duration::ZERO,
            ..fast_config()
        };
        let gw = gateway(provider, config);
        let voice = VoiceProfile::default();
        gw.synthesize("s1", "hello", &voice).await.unwrap();
        gw.synthesize("s1", "hello", &voice).await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (provider, calls) = StubProvider::new(vec![Err(transient())]);
        let gw = gateway(provider, fast_config());
        let result = gw.synthesize("s1", "hello", &VoiceProfile::default()).await;
        assert!(result.is_ok());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_is_honored() {
        let rate_limited =
            ProviderError::from_status(429, "slow down".into(), Some(Duration::from_millis(30)));
        let (provider, calls) = StubProvider::new(vec![Err(rate_limited)]);
        let gw = gateway(provider, fast_config());
        let started = std::time::Instant::now();
        gw.synthesize("s1", "hello", &VoiceProfile::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_synthesis_failed() {
        let (provider, calls) =
            StubProvider::new(vec![Err(transient()), Err(transient()), Err(transient())]);
        let gw = gateway(provider, fast_config());
        let err = gw
            .synthesize("s1", "hello", &VoiceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::SynthesisFailed { attempts: 3, .. }
        ));
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let denied = ProviderError::from_status(401, "bad key".into(), None);
        let (provider, calls) = StubProvider::new(vec![Err(denied)]);
        let gw = gateway(provider, fast_config());
        let err = gw
            .synthesize("s1", "hello", &VoiceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Permanent { .. }));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let denied = ProviderError::from_status(400, "nope".into(), None);
        let (provider, calls) = StubProvider::new(vec![Err(denied)]);
        let gw = gateway(provider, fast_config());
        let voice = VoiceProfile::default();
        assert!(gw.synthesize("s1", "hello", &voice).await.is_err());
        assert!(gw.synthesize("s1", "hello", &voice).await.is_ok());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_text_fails_without_network_call() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let voice = VoiceProfile::default();

        let err = gw.synthesize("s1", "   ", &voice).await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidText { .. }));

        let long = "a".repeat(MAX_SYNTHESIS_CHARS + 1);
        let err = gw.synthesize("s1", &long, &voice).await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidText { .. }));

        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let (provider, _) = StubProvider::new(vec![]);
        let gw = SynthesisGateway::new(Arc::new(provider), Arc::new(FailingDecoder), fast_config());
        let err = gw
            .synthesize("s1", "hello", &VoiceProfile::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SynthesisError::Decode {
                segment_id: "s1".into(),
                message: "not an mp3".into()
            }
        );
    }

    #[tokio::test]
    async fn test_plan_returns_result_per_segment() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let results = gw
            .synthesize_plan(&plan(&[("a", "one"), ("b", "three"), ("c", "x")]), &VoiceProfile::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results["b"].source_text, "three");
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_plan_fails_as_a_whole() {
        let (provider, _) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let err = gw
            .synthesize_plan(&plan(&[("a", "one"), ("b", "")]), &VoiceProfile::default())
            .await
            .unwrap_err();
        assert_eq!(err.segment_id(), "b");
    }

    #[tokio::test]
    async fn test_plan_with_invalid_text_makes_no_calls() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let err = gw
            .synthesize_plan(&plan(&[("a", "Friday sale"), ("b", "   ")]), &VoiceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidText { .. }));
        assert_eq!(err.segment_id(), "b");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plan_respects_concurrency_limit() {
        let peak = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            in_flight: AtomicUsize::new(0),
            peak: peak.clone(),
        };
        let config = GatewayConfig {
            concurrency: 3,
            ..fast_config()
        };
        let gw = SynthesisGateway::new(Arc::new(provider), Arc::new(StubDecoder), config);
        let entries: Vec<(String, String)> = (0..10)
            .map(|i| (format!("s{i}"), format!("line {i}")))
            .collect();
        let borrowed: Vec<(&str, &str)> = entries
            .iter()
            .map(|(id, text)| (id.as_str(), text.as_str()))
            .collect();

        let results = gw
            .synthesize_plan(&plan(&borrowed), &VoiceProfile::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 10);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight calls was {peak}");
        assert!(peak > 1, "calls never overlapped");
    }

    #[tokio::test]
    async fn test_failed_request_leaves_no_cache_entry() {
        let denied = ProviderError::from_status(401, "bad key".into(), None);
        let (provider, _) = StubProvider::new(vec![Err(denied)]);
        let gw = gateway(provider, fast_config());
        assert!(gw.synthesize("s1", "hello", &VoiceProfile::default()).await.is_err());
        assert!(gw.cache.is_empty());
    }

    #[tokio::test]
    async fn test_empty_plan_makes_no_calls() {
        let (provider, calls) = StubProvider::new(vec![]);
        let gw = gateway(provider, fast_config());
        let results = gw
            .synthesize_plan(&EditPlan::default(), &VoiceProfile::default())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }
}
