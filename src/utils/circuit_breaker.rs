//! Circuit Breaker Module
//!
//! One three-state machine per named dependency (chain RPC, threat feed,
//! LLM endpoint, ...). State lives in the injected `KvStore` under
//! `circuit:{name}` with a bounded TTL, so it survives restarts when the
//! store is shared and self-heals when the dependency goes unused.
//!
//! ```text
//!   CLOSED --(failure_threshold failures)--> OPEN
//!   OPEN   --(reset_timeout elapsed)-------> HALF_OPEN
//!   HALF_OPEN --(any failure)--------------> OPEN
//!   HALF_OPEN --(success_threshold wins)---> CLOSED
//! ```
//!
//! Updates are compare-and-set read-modify-write. A lost race is retried;
//! if the store keeps refusing, the update is dropped, which only delays a
//! trip or reset.
//!
//! A guarded call that overruns its time limit, or is dropped before it
//! settles, counts as a failure. HALF_OPEN trial reservations that never
//! settle expire after `reset_timeout`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::BreakerConfig;
use crate::models::errors::{ErrorCode, GuardianError};
use crate::utils::cache::KvStore;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::constants::{CIRCUIT_KEY_PREFIX, CIRCUIT_STATE_TTL_SECS};

const MAX_CAS_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Persisted breaker state (`circuit:{name}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Unix ms
    pub last_failure_time: Option<i64>,
    /// Unix ms
    pub last_state_change: i64,
    /// Trial calls admitted in the current HALF_OPEN period
    #[serde(default)]
    pub trial_calls: u32,
    /// Unix ms of the latest admitted trial
    #[serde(default)]
    pub last_trial_time: Option<i64>,
}

impl CircuitSnapshot {
    pub fn closed(now_ms: i64) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_state_change: now_ms,
            trial_calls: 0,
            last_trial_time: None,
        }
    }

    fn transition(&mut self, state: CircuitState, now_ms: i64) {
        self.state = state;
        self.last_state_change = now_ms;
        self.success_count = 0;
        self.trial_calls = 0;
        self.last_trial_time = None;
        if state == CircuitState::Closed {
            self.failure_count = 0;
        }
    }
}

/// Error from a guarded call
#[derive(Debug)]
pub enum CircuitError<E> {
    /// Rejected without invoking the wrapped call
    Open {
        dependency: String,
        retry_after: Duration,
    },
    /// The wrapped call did not finish within its time limit
    TimedOut { dependency: String, after: Duration },
    /// The wrapped call itself failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open {
                dependency,
                retry_after,
            } => write!(
                f,
                "circuit '{}' is open, retry after {}ms",
                dependency,
                retry_after.as_millis()
            ),
            CircuitError::TimedOut { dependency, after } => write!(
                f,
                "call to '{}' timed out after {}ms",
                dependency,
                after.as_millis()
            ),
            CircuitError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitError<E> {}

impl From<CircuitError<GuardianError>> for GuardianError {
    fn from(err: CircuitError<GuardianError>) -> Self {
        match err {
            CircuitError::Inner(e) => e,
            open @ CircuitError::Open { .. } => {
                GuardianError::new(ErrorCode::CircuitOpen, open.to_string())
            }
            CircuitError::TimedOut { dependency, .. } => GuardianError::source_timeout(&dependency),
        }
    }
}

/// Breaker for a single named dependency
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Breaker with per-dependency thresholds and the system clock
    pub fn new(name: &str, store: Arc<dyn KvStore>) -> Self {
        Self::with_config(name, BreakerConfig::for_dependency(name), store, Arc::new(SystemClock))
    }

    pub fn with_config(
        name: &str,
        config: BreakerConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.to_string(),
            config,
            store,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> String {
        format!("{}{}", CIRCUIT_KEY_PREFIX, self.name)
    }

    /// Run `call` through the breaker
    pub async fn call<T, E, F, Fut>(&self, call: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.guarded(None, call).await
    }

    /// Run `call` through the breaker, failing it after `limit`
    pub async fn call_within<T, E, F, Fut>(&self, limit: Duration, call: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.guarded(Some(limit), call).await
    }

    async fn guarded<T, E, F, Fut>(&self, limit: Option<Duration>, call: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.acquire().await {
            debug!("⛔ Circuit '{}' rejected call ({}ms)", self.name, retry_after.as_millis());
            return Err(CircuitError::Open {
                dependency: self.name.clone(),
                retry_after,
            });
        }

        let mut pending = PendingCall::arm(self);
        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, call()).await.map_err(|_| limit),
            None => Ok(call().await),
        };
        pending.disarm();

        match outcome {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure().await;
                Err(CircuitError::Inner(e))
            }
            Err(after) => {
                warn!("⏱️ Call through circuit '{}' timed out after {}ms", self.name, after.as_millis());
                self.record_failure().await;
                Err(CircuitError::TimedOut {
                    dependency: self.name.clone(),
                    after,
                })
            }
        }
    }

    /// Current persisted state (CLOSED if nothing is stored)
    pub async fn snapshot(&self) -> CircuitSnapshot {
        self.load().await.1
    }

    /// Decide whether a call may proceed; `Err(retry_after)` rejects it
    async fn acquire(&self) -> Result<(), Duration> {
        let reset_ms = self.config.reset_timeout.as_millis() as i64;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let (raw, snapshot) = self.load().await;
            let now = self.clock.now_ms();

            let next = match snapshot.state {
                CircuitState::Closed => return Ok(()),
                CircuitState::Open => {
                    let since = snapshot.last_failure_time.unwrap_or(snapshot.last_state_change);
                    let elapsed = now - since;
                    if elapsed < reset_ms {
                        return Err(Duration::from_millis((reset_ms - elapsed) as u64));
                    }
                    let mut next = snapshot.clone();
                    next.transition(CircuitState::HalfOpen, now);
                    next.trial_calls = 1;
                    next.last_trial_time = Some(now);
                    next
                }
                CircuitState::HalfOpen => {
                    let mut next = snapshot.clone();
                    if snapshot.trial_calls >= self.config.half_open_max_calls {
                        let since = snapshot.last_trial_time.unwrap_or(snapshot.last_state_change);
                        let elapsed = now - since;
                        if elapsed < reset_ms {
                            return Err(Duration::from_millis((reset_ms - elapsed) as u64));
                        }
                        debug!("Circuit '{}' releasing {} unsettled trials", self.name, snapshot.trial_calls);
                        next.trial_calls = 0;
                    }
                    next.trial_calls += 1;
                    next.last_trial_time = Some(now);
                    next
                }
            };

            if self.store_cas(raw.as_deref(), &next).await {
                if snapshot.state == CircuitState::Open {
                    info!("🔶 Circuit '{}' OPEN -> HALF_OPEN (trial call)", self.name);
                }
                return Ok(());
            }
        }

        warn!("⚠️ Circuit '{}' state contended, letting call through", self.name);
        Ok(())
    }

    async fn record_success(&self) {
        let success_threshold = self.config.success_threshold;
        let name = self.name.clone();
        self.update(move |mut s, now| {
            match s.state {
                CircuitState::Closed => s.failure_count = 0,
                CircuitState::HalfOpen => {
                    s.success_count += 1;
                    if s.success_count >= success_threshold {
                        info!("🟢 Circuit '{}' HALF_OPEN -> CLOSED", name);
                        s.transition(CircuitState::Closed, now);
                    }
                }
                CircuitState::Open => {}
            }
            s
        })
        .await;
    }

    async fn record_failure(&self) {
        let failure_threshold = self.config.failure_threshold;
        let name = self.name.clone();
        self.update(move |mut s, now| {
            match s.state {
                CircuitState::Closed => {
                    s.failure_count += 1;
                    s.last_failure_time = Some(now);
                    if s.failure_count >= failure_threshold {
                        warn!(
                            "🔴 Circuit '{}' CLOSED -> OPEN after {} failures",
                            name, s.failure_count
                        );
                        s.transition(CircuitState::Open, now);
                    }
                }
                CircuitState::HalfOpen => {
                    warn!("🔴 Circuit '{}' HALF_OPEN -> OPEN (trial failed)", name);
                    s.failure_count += 1;
                    s.last_failure_time = Some(now);
                    s.transition(CircuitState::Open, now);
                }
                CircuitState::Open => {}
            }
            s
        })
        .await;
    }

    async fn update<F>(&self, apply: F)
    where
        F: Fn(CircuitSnapshot, i64) -> CircuitSnapshot,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let (raw, snapshot) = self.load().await;
            let next = apply(snapshot, self.clock.now_ms());
            if self.store_cas(raw.as_deref(), &next).await {
                return;
            }
        }
        warn!("⚠️ Circuit '{}' update dropped after contention", self.name);
    }

    async fn load(&self) -> (Option<String>, CircuitSnapshot) {
        let now = self.clock.now_ms();
        match self.store.get(&self.key()).await {
            Ok(Some(raw)) => {
                let snapshot = serde_json::from_str(&raw).unwrap_or_else(|e| {
                    warn!("⚠️ Corrupt state for circuit '{}': {}", self.name, e);
                    CircuitSnapshot::closed(now)
                });
                (Some(raw), snapshot)
            }
            Ok(None) => (None, CircuitSnapshot::closed(now)),
            Err(e) => {
                warn!("⚠️ Circuit store read failed for '{}': {}", self.name, e);
                (None, CircuitSnapshot::closed(now))
            }
        }
    }

    async fn store_cas(&self, expected: Option<&str>, next: &CircuitSnapshot) -> bool {
        let serialized = match serde_json::to_string(next) {
            Ok(s) => s,
            Err(e) => {
                warn!("⚠️ Cannot serialize circuit '{}': {}", self.name, e);
                return true;
            }
        };
        match self
            .store
            .compare_and_set(
                &self.key(),
                expected,
                serialized,
                Duration::from_secs(CIRCUIT_STATE_TTL_SECS),
            )
            .await
        {
            Ok(swapped) => swapped,
            Err(e) => {
                warn!("⚠️ Circuit store write failed for '{}': {}", self.name, e);
                true
            }
        }
    }
}

/// Counts a guarded call as failed if it is dropped before settling
struct PendingCall {
    breaker: Option<CircuitBreaker>,
}

impl PendingCall {
    fn arm(breaker: &CircuitBreaker) -> Self {
        Self {
            breaker: Some(breaker.clone()),
        }
    }

    fn disarm(&mut self) {
        self.breaker = None;
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let Some(breaker) = self.breaker.take() else {
            return;
        };
        warn!("⏱️ Call through circuit '{}' abandoned, counting as failure", breaker.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { breaker.record_failure().await });
            }
            Err(_) => warn!("⚠️ No runtime to record abandoned call on '{}'", breaker.name),
        }
    }
}

/// All persisted breaker states, by dependency name
pub async fn list_circuits(store: &dyn KvStore) -> Vec<(String, CircuitSnapshot)> {
    let keys = match store.keys_with_prefix(CIRCUIT_KEY_PREFIX).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!("⚠️ Cannot list circuits: {}", e);
            return Vec::new();
        }
    };

    let mut circuits = Vec::with_capacity(keys.len());
    for key in keys {
        if let Ok(Some(raw)) = store.get(&key).await {
            if let Ok(snapshot) = serde_json::from_str::<CircuitSnapshot>(&raw) {
                let name = key.trim_start_matches(CIRCUIT_KEY_PREFIX).to_string();
                circuits.push((name, snapshot));
            }
        }
    }
    circuits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cache::MemoryStore;
    use crate::utils::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(failures: u32, successes: u32, reset: Duration) -> (CircuitBreaker, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new());
        let breaker = CircuitBreaker::with_config(
            "chain_rpc",
            BreakerConfig::new(failures, successes, reset),
            store.clone(),
            clock.clone(),
        );
        (breaker, clock, store)
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        b.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        b.call(|| async { Ok::<(), &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_starts_closed_and_is_created_lazily() {
        let (b, _, store) = breaker(3, 2, Duration::from_secs(30));
        assert!(store.get("circuit:chain_rpc").await.unwrap().is_none());
        assert_eq!(b.snapshot().await.state, CircuitState::Closed);

        succeed(&b).await.unwrap();
        let raw = store.get("circuit:chain_rpc").await.unwrap().unwrap();
        assert!(raw.contains("\"state\":\"CLOSED\""));
        assert!(raw.contains("failureCount"));
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let (b, _, _) = breaker(3, 2, Duration::from_secs(30));
        for _ in 0..2 {
            assert!(matches!(fail(&b).await, Err(CircuitError::Inner("boom"))));
        }
        assert_eq!(b.snapshot().await.state, CircuitState::Closed);

        let _ = fail(&b).await;
        let snap = b.snapshot().await;
        assert_eq!(snap.state, CircuitState::Open);
        assert!(snap.last_failure_time.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count_when_closed() {
        let (b, _, _) = breaker(3, 2, Duration::from_secs(30));
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.snapshot().await.failure_count, 0);
        let _ = fail(&b).await;
        assert_eq!(b.snapshot().await.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking() {
        let (b, clock, _) = breaker(1, 1, Duration::from_secs(30));
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(10));

        let invoked = AtomicU32::new(0);
        let result: Result<(), CircuitError<&str>> = b
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        match result {
            Err(CircuitError::Open { retry_after, dependency }) => {
                assert_eq!(dependency, "chain_rpc");
                assert_eq!(retry_after, Duration::from_secs(20));
            }
            other => panic!("expected open rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_after_reset_timeout_goes_half_open_and_invokes() {
        let (b, clock, _) = breaker(1, 2, Duration::from_secs(30));
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(30));

        let invoked = AtomicU32::new(0);
        let _: Result<(), CircuitError<&str>> = b
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        let snap = b.snapshot().await;
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.success_count, 1);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let (b, clock, _) = breaker(1, 2, Duration::from_secs(30));
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(31));
        succeed(&b).await.unwrap();
        assert_eq!(b.snapshot().await.state, CircuitState::HalfOpen);

        let _ = fail(&b).await;
        assert_eq!(b.snapshot().await.state, CircuitState::Open);
        assert!(matches!(succeed(&b).await, Err(CircuitError::Open { .. })));
    }

    #[tokio::test]
    async fn test_half_open_successes_close() {
        let (b, clock, _) = breaker(1, 2, Duration::from_secs(30));
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(30));

        succeed(&b).await.unwrap();
        succeed(&b).await.unwrap();
        let snap = b.snapshot().await;
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_budget_is_bounded() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::new());
        let mut config = BreakerConfig::new(1, 5, Duration::from_secs(1));
        config.half_open_max_calls = 2;
        let b = CircuitBreaker::with_config("llm", config, store, clock.clone());

        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(1));
        succeed(&b).await.unwrap();
        succeed(&b).await.unwrap();
        // Third trial exceeds the budget while still HALF_OPEN
        assert!(matches!(succeed(&b).await, Err(CircuitError::Open { .. })));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let (b, _, _) = breaker(2, 1, Duration::from_secs(30));
        for _ in 0..2 {
            let result: Result<(), CircuitError<&str>> = b
                .call_within(Duration::from_millis(10), || async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .await;
            assert!(matches!(result, Err(CircuitError::TimedOut { .. })));
        }
        let snap = b.snapshot().await;
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_count, 2);

        let err: GuardianError = CircuitError::<GuardianError>::TimedOut {
            dependency: "chain_rpc".to_string(),
            after: Duration::from_millis(10),
        }
        .into();
        assert_eq!(err.code, ErrorCode::SourceTimeout);
    }

    #[tokio::test]
    async fn test_dropped_call_counts_as_failure() {
        let (b, _, _) = breaker(1, 1, Duration::from_secs(30));
        let dropped = tokio::time::timeout(
            Duration::from_millis(10),
            b.call(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), &str>(())
            }),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(b.snapshot().await.state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_abandoned_trials_do_not_wedge_half_open() {
        let (b, clock, _) = breaker(1, 1, Duration::from_secs(30));
        let _ = fail(&b).await;
        clock.advance(Duration::from_secs(30));

        for _ in 0..3 {
            let _ = tokio::time::timeout(
                Duration::from_millis(5),
                b.call(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<(), &str>(())
                }),
            )
            .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        clock.advance(Duration::from_secs(600));
        succeed(&b).await.unwrap();
        assert_eq!(b.snapshot().await.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_unsettled_trial_reservations_expire() {
        let (b, clock, store) = breaker(1, 2, Duration::from_secs(30));
        let now = clock.now_ms();
        let wedged = CircuitSnapshot {
            state: CircuitState::HalfOpen,
            failure_count: 1,
            success_count: 0,
            last_failure_time: Some(now),
            last_state_change: now,
            trial_calls: 3,
            last_trial_time: Some(now),
        };
        store
            .set("circuit:chain_rpc", serde_json::to_string(&wedged).unwrap(), Duration::from_secs(3_600))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(10));
        match succeed(&b).await {
            Err(CircuitError::Open { retry_after, .. }) => assert_eq!(retry_after, Duration::from_secs(20)),
            other => panic!("expected rejection, got {:?}", other),
        }

        clock.advance(Duration::from_secs(20));
        succeed(&b).await.unwrap();
        let snap = b.snapshot().await;
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.trial_calls, 1);
        assert_eq!(snap.success_count, 1);
    }

    #[tokio::test]
    async fn test_open_error_converts_to_guardian_error() {
        let (b, _, _) = breaker(1, 1, Duration::from_secs(30));
        let _: Result<(), _> = b
            .call(|| async { Err::<(), _>(GuardianError::source_failed("x")) })
            .await;
        let err: GuardianError = b
            .call(|| async { Ok::<(), GuardianError>(()) })
            .await
            .unwrap_err()
            .into();
        assert_eq!(err.code, ErrorCode::CircuitOpen);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_not_lost() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::new());
        let b = CircuitBreaker::with_config(
            "threat_feed",
            BreakerConfig::new(1_000, 1, Duration::from_secs(60)),
            store,
            clock,
        );

        let mut handles = Vec::new();
        for _ in 0..40 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                let _ = b.call(|| async { Err::<(), _>("down") }).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(b.snapshot().await.failure_count, 40);
    }

    #[tokio::test]
    async fn test_list_circuits() {
        let (b, _, store) = breaker(1, 1, Duration::from_secs(30));
        let _ = fail(&b).await;
        let circuits = list_circuits(store.as_ref()).await;
        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].0, "chain_rpc");
        assert_eq!(circuits[0].1.state, CircuitState::Open);
    }
}
