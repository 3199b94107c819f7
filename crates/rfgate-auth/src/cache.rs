//! Tag authorization cache.
//!
//! # Validation Flow
//!
//! 1. **Sanitise**: strip non-hex characters, uppercase
//! 2. **Format**: outside 8–16 hex chars or odd length → denied, `"bad format"`,
//!    no external call
//! 3. **Cache**: a live entry is returned with `cached = true`
//! 4. **External call**: bounded by `CacheConfig::timeout`
//! 5. **Record**: every outcome is cached, failures included, so a denied
//!    or unreachable tag does not hit the service again within the TTL
//!
//! Any ambiguity denies.
//!
//! # Eviction
//!
//! Entries expire `ttl` after validation. When a new tag would exceed
//! `capacity`, the oldest-inserted entry is evicted first (insertion order,
//! not recency of use).
//!
//! # Examples
//!
//! ```no_run
//! use rfgate_auth::{CacheConfig, HttpAuthorizer, HttpAuthorizerConfig, TagCache};
//! use rfgate_core::{AntennaConfig, DeviceId, Direction};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authorizer = HttpAuthorizer::new(HttpAuthorizerConfig::new("http://auth.local"))?;
//! let cache = TagCache::new(authorizer, CacheConfig::default());
//! let antenna = AntennaConfig::new(DeviceId::new(1)?, "10.0.0.5", 6000, Direction::Entry, "North");
//!
//! let result = cache.authorize("e2:00:1a:2b", &antenna).await;
//! println!("{} valid={}", result.tag, result.is_valid);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use rfgate_core::constants::{DEFAULT_AUTH_TIMEOUT_MS, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS};
use rfgate_core::{AntennaConfig, TagId};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::{AccessEvent, AuthDecision, AuthError, Authorizer, VerifyRequest};

/// Reason given for malformed tags.
pub const BAD_FORMAT: &str = "bad format";

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached decision
    pub ttl: Duration,

    /// Hard bound on the number of entries
    pub capacity: usize,

    /// Bound on each external call
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            capacity: DEFAULT_CACHE_CAPACITY,
            timeout: Duration::from_millis(DEFAULT_AUTH_TIMEOUT_MS),
        }
    }
}

impl CacheConfig {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of one authorization attempt. Produced fresh every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Sanitised tag
    pub tag: String,
    pub is_valid: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Served from the cache without an external call
    pub cached: bool,
}

impl ValidationResult {
    fn new(tag: impl Into<String>, is_valid: bool, reason: Option<String>, cached: bool) -> Self {
        Self {
            tag: tag.into(),
            is_valid,
            reason,
            timestamp: Utc::now(),
            cached,
        }
    }

    fn denied(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(tag, false, Some(reason.into()), false)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    validated_at: Instant,
    is_valid: bool,
    reason: Option<String>,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<TagId, CacheEntry>,
    /// Insertion order, oldest first
    order: VecDeque<TagId>,
}

impl Entries {
    fn remove(&mut self, tag: &TagId) {
        if self.map.remove(tag).is_some() {
            self.order.retain(|t| t != tag);
        }
    }

    fn insert(&mut self, tag: TagId, entry: CacheEntry, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if let Some(existing) = self.map.get_mut(&tag) {
            *existing = entry;
            return;
        }
        while self.map.len() >= capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                    debug!(tag = %oldest, "Evicted oldest cache entry");
                }
                None => break,
            }
        }
        self.order.push_back(tag.clone());
        self.map.insert(tag, entry);
    }
}

/// TTL and capacity bounded cache in front of an [`Authorizer`].
///
/// Safe to share behind an `Arc`; the lock is never held across the external
/// call.
pub struct TagCache<A> {
    authorizer: A,
    config: CacheConfig,
    entries: Mutex<Entries>,
}

impl<A: Authorizer> TagCache<A> {
    pub fn new(authorizer: A, config: CacheConfig) -> Self {
        Self {
            authorizer,
            config,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Authorize a raw tag string read at `antenna`.
    ///
    /// Never fails: every error path yields a denied result with a reason.
    pub async fn authorize(&self, raw: &str, antenna: &AntennaConfig) -> ValidationResult {
        let tag = match TagId::parse(raw) {
            Ok(tag) => tag,
            Err(e) => {
                debug!(raw, error = %e, "Rejecting malformed tag");
                return ValidationResult::denied(TagId::sanitize(raw), BAD_FORMAT);
            }
        };

        if let Some(entry) = self.lookup(&tag).await {
            debug!(tag = %tag, valid = entry.is_valid, "Cache hit");
            let result = ValidationResult::new(tag.as_str(), entry.is_valid, entry.reason, true);
            self.record_metric(&result, antenna);
            return result;
        }

        let request = VerifyRequest::new(&tag, antenna);
        let result = match timeout(self.config.timeout, self.authorizer.verify(&request)).await {
            Ok(AuthDecision::Authorized) => ValidationResult::new(tag.as_str(), true, None, false),
            Ok(AuthDecision::Denied { reason }) => {
                ValidationResult::new(tag.as_str(), false, Some(reason), false)
            }
            Ok(AuthDecision::TransportError { reason }) => {
                warn!(tag = %tag, %reason, "Authorization service unavailable");
                ValidationResult::denied(tag.as_str(), format!("authorization unavailable: {reason}"))
            }
            // The client and this bound usually share one duration; either may fire first
            Ok(AuthDecision::TimedOut) | Err(_) => {
                let ms = self.config.timeout.as_millis() as u64;
                warn!(tag = %tag, timeout_ms = ms, "Authorization timed out");
                ValidationResult::denied(tag.as_str(), format!("timeout after {ms}ms"))
            }
        };

        info!(
            tag = %tag,
            device_id = %antenna.device_id,
            valid = result.is_valid,
            reason = result.reason.as_deref().unwrap_or(""),
            "Tag validated"
        );

        let entry = CacheEntry {
            validated_at: Instant::now(),
            is_valid: result.is_valid,
            reason: result.reason.clone(),
        };
        self.entries
            .lock()
            .await
            .insert(tag, entry, self.config.capacity);

        self.record_metric(&result, antenna);
        result
    }

    /// Record an access event. Fire-and-forget relative to the gate
    /// decision: failures are logged and reported as `false`.
    pub async fn register_access(
        &self,
        tag: &TagId,
        antenna: &AntennaConfig,
        authorized: bool,
    ) -> bool {
        let event = AccessEvent::new(tag, antenna, authorized);
        let outcome = match timeout(self.config.timeout, self.authorizer.register(&event)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::Timeout(self.config.timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(status) => {
                debug!(tag = %tag, event_id = %event.event_id, status = %status.status, "Access registered");
                true
            }
            Err(e) => {
                warn!(tag = %tag, event_id = %event.event_id, error = %e, "Failed to register access");
                false
            }
        }
    }

    /// Whether a live entry exists for `tag`.
    pub async fn contains(&self, tag: &TagId) -> bool {
        let entries = self.entries.lock().await;
        entries
            .map
            .get(tag)
            .is_some_and(|entry| entry.validated_at.elapsed() < self.config.ttl)
    }

    /// Number of stored entries, expired ones included until next lookup.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.map.clear();
        entries.order.clear();
    }

    async fn lookup(&self, tag: &TagId) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries.map.get(tag)?.clone();
        if entry.validated_at.elapsed() >= self.config.ttl {
            entries.remove(tag);
            return None;
        }
        Some(entry)
    }

    fn record_metric(&self, result: &ValidationResult, antenna: &AntennaConfig) {
        if result.is_valid {
            counter!("gate_tags_authorized_total", "device" => antenna.device_id.to_string())
                .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuthResult, RegisterStatus};
    use proptest::prelude::*;
    use rfgate_core::{DeviceId, Direction};
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct FakeAuthorizer {
        decision: AuthDecision,
        delay: Duration,
        register_ok: bool,
        verify_calls: Arc<AtomicUsize>,
        register_calls: Arc<AtomicUsize>,
    }

    impl FakeAuthorizer {
        fn new(decision: AuthDecision) -> Self {
            Self {
                decision,
                delay: Duration::ZERO,
                register_ok: true,
                verify_calls: Arc::new(AtomicUsize::new(0)),
                register_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn verify_calls(&self) -> usize {
            self.verify_calls.load(Ordering::SeqCst)
        }
    }

    impl Authorizer for FakeAuthorizer {
        async fn verify(&self, _request: &VerifyRequest) -> AuthDecision {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.decision.clone()
        }

        async fn register(&self, _event: &AccessEvent) -> AuthResult<RegisterStatus> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.register_ok {
                Ok(RegisterStatus {
                    status: "recorded".to_string(),
                })
            } else {
                Err(AuthError::Configuration("register rejected".to_string()))
            }
        }
    }

    fn antenna() -> AntennaConfig {
        AntennaConfig::new(
            DeviceId::new(1).unwrap(),
            "127.0.0.1",
            6000,
            Direction::Entry,
            "North",
        )
    }

    fn cache(authorizer: FakeAuthorizer) -> TagCache<FakeAuthorizer> {
        TagCache::new(authorizer, CacheConfig::default())
    }

    #[tokio::test]
    async fn test_authorized_tag_is_valid() {
        let cache = cache(FakeAuthorizer::new(AuthDecision::Authorized));
        let result = cache.authorize("e2:00:1a:2b", &antenna()).await;

        assert_eq!(result.tag, "E2001A2B");
        assert!(result.is_valid);
        assert!(result.reason.is_none());
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_hits_cache() {
        let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
        let cache = cache(authorizer.clone());

        cache.authorize("0123456789", &antenna()).await;
        let second = cache.authorize("01:23:45:67:89", &antenna()).await;

        assert!(second.cached);
        assert!(second.is_valid);
        assert_eq!(authorizer.verify_calls(), 1);
    }

    #[tokio::test]
    async fn test_denied_outcome_is_cached() {
        let authorizer = FakeAuthorizer::new(AuthDecision::Denied {
            reason: "blocked".to_string(),
        });
        let cache = cache(authorizer.clone());

        let first = cache.authorize("0123456789", &antenna()).await;
        let second = cache.authorize("0123456789", &antenna()).await;

        assert!(!first.is_valid);
        assert_eq!(first.reason.as_deref(), Some("blocked"));
        assert!(second.cached);
        assert_eq!(second.reason.as_deref(), Some("blocked"));
        assert_eq!(authorizer.verify_calls(), 1);
    }

    #[rstest]
    #[case("")]
    #[case("ABC")]
    #[case("123456789")]
    #[case("0123456789ABCDEF01")]
    #[case("zz-zz-zz-zz")]
    #[tokio::test]
    async fn test_bad_format_makes_no_external_call(#[case] raw: &str) {
        let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
        let cache = cache(authorizer.clone());

        let result = cache.authorize(raw, &antenna()).await;

        assert!(!result.is_valid);
        assert_eq!(result.reason.as_deref(), Some(BAD_FORMAT));
        assert_eq!(authorizer.verify_calls(), 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_closed() {
        let authorizer =
            FakeAuthorizer::new(AuthDecision::Authorized).delayed(Duration::from_secs(10));
        let cache = cache(authorizer.clone());

        let result = cache.authorize("0123456789", &antenna()).await;
        assert!(!result.is_valid);
        assert!(result.reason.as_deref().unwrap().starts_with("timeout"));

        // The denial is what gets cached, never a valid entry
        let again = cache.authorize("0123456789", &antenna()).await;
        assert!(!again.is_valid);
        assert!(again.cached);
        assert_eq!(authorizer.verify_calls(), 1);
    }

    #[tokio::test]
    async fn test_client_timeout_reports_timeout() {
        let authorizer = FakeAuthorizer::new(AuthDecision::TimedOut);
        let cache = TagCache::new(
            authorizer,
            CacheConfig::default().timeout(Duration::from_millis(750)),
        );

        let result = cache.authorize("0123456789", &antenna()).await;

        assert!(!result.is_valid);
        assert_eq!(result.reason.as_deref(), Some("timeout after 750ms"));
    }

    #[tokio::test]
    async fn test_transport_error_fails_closed_and_is_cached() {
        let authorizer = FakeAuthorizer::new(AuthDecision::TransportError {
            reason: "connection refused".to_string(),
        });
        let cache = cache(authorizer.clone());

        let first = cache.authorize("0123456789", &antenna()).await;
        let second = cache.authorize("0123456789", &antenna()).await;

        assert!(!first.is_valid);
        assert!(first.reason.unwrap().contains("connection refused"));
        assert!(!second.is_valid && second.cached);
        assert_eq!(authorizer.verify_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
        let cache = TagCache::new(
            authorizer.clone(),
            CacheConfig::default().ttl(Duration::from_secs(60)),
        );

        cache.authorize("0123456789", &antenna()).await;
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.authorize("0123456789", &antenna()).await.cached);

        tokio::time::advance(Duration::from_secs(2)).await;
        let refreshed = cache.authorize("0123456789", &antenna()).await;

        assert!(!refreshed.cached);
        assert_eq!(authorizer.verify_calls(), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_inserted() {
        let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
        let cache = TagCache::new(authorizer.clone(), CacheConfig::default().capacity(3));
        let tags = ["AAAAAAAA", "BBBBBBBB", "CCCCCCCC", "DDDDDDDD"];

        for raw in &tags[..3] {
            cache.authorize(raw, &antenna()).await;
        }
        // Using the oldest entry does not protect it from eviction
        assert!(cache.authorize("AAAAAAAA", &antenna()).await.cached);
        cache.authorize(tags[3], &antenna()).await;

        assert_eq!(cache.len().await, 3);
        assert!(!cache.contains(&TagId::parse("AAAAAAAA").unwrap()).await);
        for raw in &tags[1..] {
            assert!(cache.contains(&TagId::parse(raw).unwrap()).await);
        }
        assert_eq!(authorizer.verify_calls(), 4);
    }

    #[tokio::test]
    async fn test_zero_capacity_never_caches() {
        let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
        let cache = TagCache::new(authorizer.clone(), CacheConfig::default().capacity(0));

        cache.authorize("0123456789", &antenna()).await;
        cache.authorize("0123456789", &antenna()).await;

        assert_eq!(authorizer.verify_calls(), 2);
    }

    #[tokio::test]
    async fn test_register_access_reports_outcome() {
        let tag = TagId::parse("0123456789").unwrap();

        let ok = cache(FakeAuthorizer::new(AuthDecision::Authorized));
        assert!(ok.register_access(&tag, &antenna(), true).await);

        let mut failing = FakeAuthorizer::new(AuthDecision::Authorized);
        failing.register_ok = false;
        let failing = cache(failing);
        assert!(!failing.register_access(&tag, &antenna(), true).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_access_times_out() {
        let authorizer =
            FakeAuthorizer::new(AuthDecision::Authorized).delayed(Duration::from_secs(30));
        let cache = cache(authorizer.clone());
        let tag = TagId::parse("0123456789").unwrap();

        assert!(!cache.register_access(&tag, &antenna(), true).await);
        assert_eq!(authorizer.register_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let cache = cache(FakeAuthorizer::new(AuthDecision::Authorized));
        cache.authorize("0123456789", &antenna()).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #[test]
        fn prop_cache_never_exceeds_capacity(
            capacity in 1usize..8,
            tags in prop::collection::vec("[0-9A-F]{8}", 1..30),
        ) {
            let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
            let cache = TagCache::new(authorizer, CacheConfig::default().capacity(capacity));

            block_on(async {
                for raw in &tags {
                    cache.authorize(raw, &antenna()).await;
                    assert!(cache.len().await <= capacity);
                }
            });
        }

        #[test]
        fn prop_one_external_call_per_distinct_tag(
            tags in prop::collection::vec("[0-9a-f]{8}", 1..20),
        ) {
            let authorizer = FakeAuthorizer::new(AuthDecision::Authorized);
            let cache = TagCache::new(authorizer.clone(), CacheConfig::default().capacity(100));

            block_on(async {
                for raw in &tags {
                    cache.authorize(raw, &antenna()).await;
                    cache.authorize(raw, &antenna()).await;
                }
            });

            let distinct: std::collections::HashSet<_> =
                tags.iter().map(|t| t.to_ascii_uppercase()).collect();
            prop_assert_eq!(authorizer.verify_calls(), distinct.len());
        }
    }
}
