//! SubscriptionManager - subscribe/retry state machine per pair.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use tracing::{debug, instrument, warn};

use contracts::{
    BackoffPolicy, ContextListener, ContextType, SourceId, SubscriptionKey, SubscriptionState,
};
use host_gateway::HostClient;

/// Owns subscription state for every advertised pair.
///
/// The state table is the claim ledger: a pair is marked `Pending`
/// under the lock before any host call goes out, so two concurrent
/// callers can never double-subscribe the same pair. Failures park the
/// pair in `Failed` until its jittered retry deadline.
pub struct SubscriptionManager<H: HostClient> {
    host: Arc<H>,
    /// Listener handed to the host on every subscribe
    listener: ContextListener,
    states: Mutex<HashMap<SubscriptionKey, SubscriptionState>>,
    policy: BackoffPolicy,
}

impl<H: HostClient> SubscriptionManager<H> {
    pub fn new(host: Arc<H>, listener: ContextListener, policy: BackoffPolicy) -> Self {
        Self {
            host,
            listener,
            states: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Ensure one pair has a subscription, respecting retry deadlines.
    ///
    /// Returns true when the pair is active after the call. A pair
    /// already pending, active, or parked before its deadline is left
    /// alone.
    #[instrument(
        name = "ensure_subscribed",
        skip(self),
        fields(source_id = %source_id, context_type = %context_type)
    )]
    pub async fn ensure_subscribed(
        &self,
        source_id: &SourceId,
        context_type: &ContextType,
        now: f64,
    ) -> bool {
        let key = (source_id.clone(), context_type.clone());

        // Claim the pair before the host call
        let prior_attempts = {
            let mut states = self.lock();
            match states.get(&key) {
                Some(SubscriptionState::Active) => return true,
                Some(SubscriptionState::Pending) => return false,
                Some(SubscriptionState::Failed {
                    attempts,
                    next_retry_at,
                }) => {
                    if now < *next_retry_at {
                        return false;
                    }
                    let attempts = *attempts;
                    states.insert(key.clone(), SubscriptionState::Pending);
                    attempts
                }
                None => {
                    states.insert(key.clone(), SubscriptionState::Pending);
                    0
                }
            }
        };

        match self
            .host
            .subscribe(source_id, context_type, self.listener.clone())
            .await
        {
            Ok(()) => {
                self.lock().insert(key, SubscriptionState::Active);
                metrics::counter!("subscriptions_established_total").increment(1);
                debug!("subscription active");
                true
            }
            Err(error) => {
                let attempts = prior_attempts + 1;
                // +/-10 % proportional jitter on the clamped delay
                let jitter = rand::rng().random_range(0.9..1.1);
                let next_retry_at = now + self.policy.delay_s(attempts) * jitter;
                self.lock().insert(
                    key,
                    SubscriptionState::Failed {
                        attempts,
                        next_retry_at,
                    },
                );
                metrics::counter!("subscriptions_failed_total").increment(1);
                warn!(attempts, next_retry_at, %error, "subscribe failed");
                false
            }
        }
    }

    /// Ensure every pair in the list, returning how many ended active.
    pub async fn ensure_all(&self, pairs: &[(SourceId, ContextType)], now: f64) -> usize {
        let mut active = 0;
        for (source_id, context_type) in pairs {
            if self.ensure_subscribed(source_id, context_type, now).await {
                active += 1;
            }
        }
        active
    }

    /// Retry every failed pair whose deadline has passed.
    ///
    /// Returns the number of pairs attempted. Called on the
    /// orchestrator housekeeping tick.
    pub async fn retry_due(&self, now: f64) -> usize {
        let due: Vec<SubscriptionKey> = self
            .lock()
            .iter()
            .filter_map(|(key, state)| match state {
                SubscriptionState::Failed { next_retry_at, .. } if now >= *next_retry_at => {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();

        for (source_id, context_type) in &due {
            self.ensure_subscribed(source_id, context_type, now).await;
        }
        due.len()
    }

    /// Re-establish every known pair after a session reopen.
    ///
    /// The host forgets push registrations when its session drops, so
    /// local state is discarded and each pair subscribes from scratch.
    /// Returns how many pairs ended active.
    pub async fn resubscribe_all(&self, now: f64) -> usize {
        let pairs: Vec<SubscriptionKey> = {
            let mut states = self.lock();
            let pairs = states.keys().cloned().collect();
            states.clear();
            pairs
        };
        self.ensure_all(&pairs, now).await
    }

    /// Drop one pair: forget its state and unsubscribe at the host.
    #[instrument(
        name = "drop_subscription",
        skip(self),
        fields(source_id = %source_id, context_type = %context_type)
    )]
    pub async fn drop_subscription(&self, source_id: &SourceId, context_type: &ContextType) {
        let key = (source_id.clone(), context_type.clone());
        let existed = self.lock().remove(&key).is_some();
        if existed {
            if let Err(error) = self.host.unsubscribe(source_id, context_type).await {
                // The pair is already forgotten locally; delivery for it
                // gets discarded as unknown upstream state
                warn!(%error, "unsubscribe failed");
            }
        }
    }

    /// Current state of one pair.
    pub fn state(&self, source_id: &SourceId, context_type: &ContextType) -> Option<SubscriptionState> {
        self.lock()
            .get(&(source_id.clone(), context_type.clone()))
            .cloned()
    }

    /// True when the pair is currently active.
    pub fn is_active(&self, source_id: &SourceId, context_type: &ContextType) -> bool {
        matches!(
            self.state(source_id, context_type),
            Some(SubscriptionState::Active)
        )
    }

    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|state| state.is_active())
            .count()
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, SubscriptionState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host_gateway::{MockHost, MockHostConfig};

    use contracts::{SourceDecl, SourceMode};
    use std::collections::HashMap as StdHashMap;

    fn decl(id: &str, ty: &str) -> SourceDecl {
        SourceDecl {
            id: id.into(),
            context_types: vec![ty.into()],
            mode: SourceMode::Push,
            payload: None,
            push_interval_ms: 10_000,
            pull_delay_ms: 0,
        }
    }

    fn noop_listener() -> ContextListener {
        Arc::new(|_| {})
    }

    async fn open_host(sources: Vec<SourceDecl>, config: MockHostConfig) -> Arc<MockHost> {
        let host = Arc::new(MockHost::with_config(sources, config));
        host.open_session().await.unwrap();
        host
    }

    #[tokio::test]
    async fn test_subscribe_success_goes_active() {
        let host = open_host(vec![decl("s1", "battery")], MockHostConfig::default()).await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        assert!(
            manager
                .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
                .await
        );
        assert!(manager.is_active(&"s1".into(), &"battery".into()));
        assert_eq!(manager.active_count(), 1);
    }

    #[tokio::test]
    async fn test_active_pair_is_not_resubscribed() {
        let host = open_host(vec![decl("s1", "battery")], MockHostConfig::default()).await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        manager
            .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
            .await;
        manager
            .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
            .await;

        assert_eq!(host.subscribe_attempts(&"s1".into(), &"battery".into()), 1);
    }

    #[tokio::test]
    async fn test_failure_parks_pair_until_deadline() {
        let config = MockHostConfig {
            fail_subscribe: StdHashMap::from([(("s1".to_string(), "battery".to_string()), 1)]),
            ..Default::default()
        };
        let host = open_host(vec![decl("s1", "battery")], config).await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        assert!(
            !manager
                .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
                .await
        );
        let Some(SubscriptionState::Failed {
            attempts,
            next_retry_at,
        }) = manager.state(&"s1".into(), &"battery".into())
        else {
            panic!("expected failed state");
        };
        assert_eq!(attempts, 1);
        assert!(next_retry_at > 100.0);

        // Before the deadline nothing happens
        assert!(
            !manager
                .ensure_subscribed(&"s1".into(), &"battery".into(), 100.1)
                .await
        );
        assert_eq!(host.subscribe_attempts(&"s1".into(), &"battery".into()), 1);

        // After the deadline the retry runs and succeeds
        assert!(
            manager
                .ensure_subscribed(&"s1".into(), &"battery".into(), next_retry_at + 0.1)
                .await
        );
        assert!(manager.is_active(&"s1".into(), &"battery".into()));
    }

    #[tokio::test]
    async fn test_retry_deadline_jitter_is_proportional() {
        let config = MockHostConfig {
            fail_subscribe: StdHashMap::from([(("s1".to_string(), "battery".to_string()), 1)]),
            ..Default::default()
        };
        let host = open_host(vec![decl("s1", "battery")], config).await;
        let policy = BackoffPolicy {
            base_s: 1.0,
            max_s: 2.0,
        };
        let manager = SubscriptionManager::new(host.clone(), noop_listener(), policy);

        manager
            .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
            .await;
        let Some(SubscriptionState::Failed { next_retry_at, .. }) =
            manager.state(&"s1".into(), &"battery".into())
        else {
            panic!("expected failed state");
        };

        // delay_s(1) hits the 2 s ceiling; the jittered deadline stays
        // within +/-10 % of it instead of drifting past
        let delay = next_retry_at - 100.0;
        assert!(
            (1.8..2.2).contains(&delay),
            "jittered delay out of range: {delay}"
        );
    }

    #[tokio::test]
    async fn test_retry_due_only_attempts_expired_deadlines() {
        let config = MockHostConfig {
            fail_subscribe: StdHashMap::from([(("s1".to_string(), "battery".to_string()), 1)]),
            ..Default::default()
        };
        let host = open_host(vec![decl("s1", "battery")], config).await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        manager
            .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
            .await;

        assert_eq!(manager.retry_due(100.1).await, 0);
        assert_eq!(manager.retry_due(200.0).await, 1);
        assert!(manager.is_active(&"s1".into(), &"battery".into()));
    }

    #[tokio::test]
    async fn test_resubscribe_all_restarts_every_pair() {
        let host = open_host(
            vec![decl("s1", "battery"), decl("s2", "location")],
            MockHostConfig::default(),
        )
        .await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        manager
            .ensure_all(
                &[
                    ("s1".into(), "battery".into()),
                    ("s2".into(), "location".into()),
                ],
                100.0,
            )
            .await;

        // A reopened session starts with no registrations; every pair
        // must hit the host again
        let active = manager.resubscribe_all(200.0).await;
        assert_eq!(active, 2);
        assert_eq!(host.subscribe_attempts(&"s1".into(), &"battery".into()), 2);
        assert_eq!(host.subscribe_attempts(&"s2".into(), &"location".into()), 2);
        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test]
    async fn test_drop_subscription_forgets_state() {
        let host = open_host(vec![decl("s1", "battery")], MockHostConfig::default()).await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        manager
            .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
            .await;
        manager
            .drop_subscription(&"s1".into(), &"battery".into())
            .await;

        assert_eq!(manager.tracked_count(), 0);
        assert_eq!(host.active_push_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_subscription_survives_host_refusal() {
        let config = MockHostConfig {
            fail_unsubscribe: vec!["s1".to_string()],
            ..Default::default()
        };
        let host = open_host(vec![decl("s1", "battery")], config).await;
        let manager =
            SubscriptionManager::new(host.clone(), noop_listener(), BackoffPolicy::default());

        manager
            .ensure_subscribed(&"s1".into(), &"battery".into(), 100.0)
            .await;
        manager
            .drop_subscription(&"s1".into(), &"battery".into())
            .await;

        // Local state is gone even though the host refused the call;
        // the host keeps delivering until it honors an unsubscribe
        assert_eq!(manager.tracked_count(), 0);
        assert_eq!(host.active_push_count(), 1);
    }
}
