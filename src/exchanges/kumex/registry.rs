use crate::core::errors::ExchangeError;
use crate::core::kernel::WsConnector;
use crate::exchanges::kumex::connection::ConnectionManager;
use crate::exchanges::kumex::types::MessageKind;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, trace};

/// Callback invoked for every frame routed to a topic
pub type TopicCallback = Arc<dyn Fn(MessageKind, &Value) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: String,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Unsubscribe the topic this handle was issued for
    pub async fn unsubscribe<C: WsConnector>(
        self,
        manager: &ConnectionManager<C>,
    ) -> Result<(), ExchangeError> {
        manager.unsubscribe(&self.topic).await
    }
}

#[derive(Clone)]
pub struct Subscription {
    pub topic: String,
    pub callback: TopicCallback,
    pub pending_request_id: Option<String>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("pending_request_id", &self.pending_request_id)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    subscriptions: HashMap<String, Subscription>,
    /// request id -> topic, consumed once by the matching reply
    pending: HashMap<String, String>,
}

/// Active subscriptions and in-flight requests awaiting acknowledgement
///
/// Pure bookkeeping; safe to share between the read loop and callers.
#[derive(Default)]
pub struct TopicRegistry {
    state: Mutex<RegistryState>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // callbacks never run under this lock, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        topic: &str,
        callback: TopicCallback,
    ) -> Result<SubscriptionHandle, ExchangeError> {
        let mut state = self.lock();
        if state.subscriptions.contains_key(topic) {
            return Err(ExchangeError::DuplicateTopic(topic.to_string()));
        }
        state.subscriptions.insert(
            topic.to_string(),
            Subscription {
                topic: topic.to_string(),
                callback,
                pending_request_id: None,
            },
        );
        Ok(SubscriptionHandle {
            topic: topic.to_string(),
        })
    }

    /// Insert or overwrite the callback for `topic`; returns whether one was replaced
    pub fn replace(&self, topic: &str, callback: TopicCallback) -> (SubscriptionHandle, bool) {
        let mut state = self.lock();
        let replaced = state
            .subscriptions
            .insert(
                topic.to_string(),
                Subscription {
                    topic: topic.to_string(),
                    callback,
                    pending_request_id: None,
                },
            )
            .is_some();
        (
            SubscriptionHandle {
                topic: topic.to_string(),
            },
            replaced,
        )
    }

    pub fn unregister(&self, topic: &str) -> Result<(), ExchangeError> {
        self.lock()
            .subscriptions
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| ExchangeError::NotSubscribed(topic.to_string()))
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().subscriptions.contains_key(topic)
    }

    pub fn get(&self, topic: &str) -> Option<Subscription> {
        self.lock().subscriptions.get(topic).cloned()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.lock().subscriptions.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().subscriptions.is_empty()
    }

    /// Invoke the callback registered for `topic`
    ///
    /// Returns false when nothing is registered. A callback that fails or
    /// panics is logged and otherwise ignored.
    pub fn dispatch(&self, topic: &str, kind: MessageKind, payload: &Value) -> bool {
        let Some(callback) = self
            .lock()
            .subscriptions
            .get(topic)
            .map(|s| Arc::clone(&s.callback))
        else {
            trace!(topic, "no subscriber for topic");
            return false;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| callback(kind, payload))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(topic, error = %e, "topic callback failed"),
            Err(_) => error!(topic, "topic callback panicked"),
        }
        true
    }

    pub fn track_pending(&self, request_id: &str, topic: &str) {
        let mut state = self.lock();
        if let Some(subscription) = state.subscriptions.get_mut(topic) {
            subscription.pending_request_id = Some(request_id.to_string());
        }
        state
            .pending
            .insert(request_id.to_string(), topic.to_string());
    }

    /// Consume the correlation for `request_id`, if any
    pub fn resolve_pending(&self, request_id: &str) -> Option<String> {
        let mut state = self.lock();
        let topic = state.pending.remove(request_id)?;
        if let Some(subscription) = state.subscriptions.get_mut(&topic) {
            if subscription.pending_request_id.as_deref() == Some(request_id) {
                subscription.pending_request_id = None;
            }
        }
        Some(topic)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drop every unacknowledged request; subscriptions are kept
    pub fn discard_pending(&self) {
        let mut state = self.lock();
        state.pending.clear();
        for subscription in state.subscriptions.values_mut() {
            subscription.pending_request_id = None;
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.pending.clear();
        state.subscriptions.clear();
    }
}
