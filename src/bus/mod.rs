//! In-process message bus.
//!
//! Central broker with a registration table, bounded per-agent priority
//! inboxes, topic subscriber sets, and a correlation table for
//! request-reply. Delivery guarantees: messages from one sender to one
//! receiver arrive in send order within a priority class; broadcast
//! fan-out is not atomic and the history records only successfully
//! enqueued copies.

mod error;
mod inbox;
mod message;

pub use error::{BusError, BusResult};
pub use inbox::OverflowPolicy;
pub use message::{Message, MessageKind, MessagePayload, Priority};

use inbox::Inbox;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Tuning knobs for the bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Default inbox capacity per agent.
    pub inbox_capacity: usize,
    /// Cap on the retained message history.
    pub history_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 64,
            history_capacity: 1000,
        }
    }
}

/// Snapshot of bus state for diagnostics.
#[derive(Debug, Clone)]
pub struct BusStats {
    pub registered_agents: usize,
    pub total_messages: usize,
    pub queue_depths: HashMap<String, usize>,
}

struct BusInner {
    config: BusConfig,
    agents: RwLock<HashMap<String, Arc<Inbox>>>,
    subscriptions: RwLock<HashMap<String, BTreeSet<String>>>,
    history: Mutex<VecDeque<Message>>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Message>>>,
}

/// Central message broker; cheap to clone and share.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// Create a bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with explicit configuration.
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                agents: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register an agent, creating its inbox.
    pub fn register(&self, agent_id: impl Into<String>) -> BusResult<()> {
        let agent_id = agent_id.into();
        let capacity = self.inner.config.inbox_capacity;
        self.register_with_capacity(agent_id, capacity)
    }

    /// Register an agent with a custom inbox capacity.
    pub fn register_with_capacity(
        &self,
        agent_id: impl Into<String>,
        capacity: usize,
    ) -> BusResult<()> {
        let agent_id = agent_id.into();
        let mut agents = self.inner.agents.write().unwrap();
        if agents.contains_key(&agent_id) {
            return Err(BusError::DuplicateAgent(agent_id));
        }
        agents.insert(agent_id.clone(), Arc::new(Inbox::new(capacity)));
        tracing::debug!(agent = %agent_id, "agent registered on bus");
        Ok(())
    }

    /// Unregister an agent: drains its inbox and removes it from every
    /// topic subscriber set.
    pub fn unregister(&self, agent_id: &str) -> BusResult<()> {
        let inbox = {
            let mut agents = self.inner.agents.write().unwrap();
            agents
                .remove(agent_id)
                .ok_or_else(|| BusError::UnknownAgent(agent_id.to_string()))?
        };
        let dropped = inbox.drain().len();

        let mut subscriptions = self.inner.subscriptions.write().unwrap();
        for subscribers in subscriptions.values_mut() {
            subscribers.remove(agent_id);
        }
        subscriptions.retain(|_, subscribers| !subscribers.is_empty());

        tracing::debug!(agent = %agent_id, dropped, "agent unregistered from bus");
        Ok(())
    }

    /// Whether an agent is currently registered.
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner.agents.read().unwrap().contains_key(agent_id)
    }

    fn inbox(&self, agent_id: &str) -> Option<Arc<Inbox>> {
        self.inner.agents.read().unwrap().get(agent_id).cloned()
    }

    fn record(&self, message: &Message) {
        let mut history = self.inner.history.lock().unwrap();
        history.push_back(message.clone());
        while history.len() > self.inner.config.history_capacity {
            history.pop_front();
        }
    }

    /// Send a point-to-point message, rejecting on a full inbox.
    pub fn send(&self, message: Message) -> BusResult<()> {
        self.send_with_policy(message, OverflowPolicy::Reject)
    }

    /// Send with an explicit overflow policy.
    pub fn send_with_policy(&self, message: Message, policy: OverflowPolicy) -> BusResult<()> {
        let receiver = message
            .receiver
            .clone()
            .ok_or(BusError::MissingReceiver)?;

        // Responses carrying a known correlation id fulfil the pending
        // request-reply slot instead of the inbox.
        if message.kind == MessageKind::Response {
            if let Some(correlation) = message.correlation_id {
                let slot = self.inner.pending.lock().unwrap().remove(&correlation);
                if let Some(slot) = slot {
                    self.record(&message);
                    let _ = slot.send(message);
                    return Ok(());
                }
            }
        }

        let inbox = self
            .inbox(&receiver)
            .ok_or_else(|| BusError::UnknownReceiver(receiver.clone()))?;
        inbox.push(message.clone(), policy)?;
        self.record(&message);
        Ok(())
    }

    /// Send with retry on backpressure.
    ///
    /// Backpressure is retried with exponential backoff; an unknown
    /// receiver is surfaced immediately.
    pub async fn send_with_retry(
        &self,
        message: Message,
        max_retries: u32,
        initial_delay: Duration,
    ) -> BusResult<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.send(message.clone()) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    let delay = initial_delay * 2u32.saturating_pow(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "inbox full, retrying send"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Broadcast to every registered agent except the sender.
    ///
    /// Fan-out is not atomic: full inboxes are skipped and only the
    /// successfully enqueued copies are recorded. Returns the number of
    /// agents reached.
    pub fn broadcast(&self, message: Message) -> usize {
        let targets: Vec<(String, Arc<Inbox>)> = {
            let agents = self.inner.agents.read().unwrap();
            agents
                .iter()
                .filter(|(id, _)| **id != message.sender)
                .map(|(id, inbox)| (id.clone(), inbox.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (agent_id, inbox) in targets {
            let mut copy = message.clone();
            copy.receiver = Some(agent_id.clone());
            if inbox.push(copy.clone(), OverflowPolicy::Reject).is_ok() {
                self.record(&copy);
                delivered += 1;
            } else {
                tracing::warn!(agent = %agent_id, "broadcast copy dropped: inbox full");
            }
        }
        delivered
    }

    /// Subscribe an agent to a topic.
    pub fn subscribe(&self, agent_id: &str, topic: impl Into<String>) -> BusResult<()> {
        if !self.is_registered(agent_id) {
            return Err(BusError::UnknownAgent(agent_id.to_string()));
        }
        self.inner
            .subscriptions
            .write()
            .unwrap()
            .entry(topic.into())
            .or_default()
            .insert(agent_id.to_string());
        Ok(())
    }

    /// Remove an agent from a topic.
    pub fn unsubscribe(&self, agent_id: &str, topic: &str) {
        let mut subscriptions = self.inner.subscriptions.write().unwrap();
        if let Some(subscribers) = subscriptions.get_mut(topic) {
            subscribers.remove(agent_id);
            if subscribers.is_empty() {
                subscriptions.remove(topic);
            }
        }
    }

    /// Publish to every current subscriber of a topic.
    ///
    /// Returns the number of subscribers reached; an unknown topic reaches
    /// zero.
    pub fn publish(&self, topic: &str, message: Message) -> usize {
        let subscribers: Vec<String> = {
            let subscriptions = self.inner.subscriptions.read().unwrap();
            subscriptions
                .get(topic)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for agent_id in subscribers {
            let Some(inbox) = self.inbox(&agent_id) else {
                continue;
            };
            let mut copy = message.clone();
            copy.receiver = Some(agent_id);
            copy.topic = Some(topic.to_string());
            if inbox.push(copy.clone(), OverflowPolicy::Reject).is_ok() {
                self.record(&copy);
                delivered += 1;
            }
        }
        delivered
    }

    /// Blocking dequeue from an agent's inbox.
    pub async fn receive(&self, agent_id: &str) -> BusResult<Message> {
        let inbox = self
            .inbox(agent_id)
            .ok_or_else(|| BusError::UnknownAgent(agent_id.to_string()))?;
        Ok(inbox.recv().await)
    }

    /// Non-blocking dequeue.
    pub fn try_receive(&self, agent_id: &str) -> BusResult<Option<Message>> {
        let inbox = self
            .inbox(agent_id)
            .ok_or_else(|| BusError::UnknownAgent(agent_id.to_string()))?;
        Ok(inbox.try_pop())
    }

    /// Send a request and wait for the correlated reply.
    ///
    /// A fresh correlation id is stamped on the request; the pending slot
    /// is cleaned up on both the reply and the timeout path.
    pub async fn request_reply(
        &self,
        mut message: Message,
        timeout: Duration,
    ) -> BusResult<Message> {
        let correlation = Uuid::new_v4();
        message.correlation_id = Some(correlation);

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(correlation, tx);

        if let Err(err) = self.send(message) {
            self.inner.pending.lock().unwrap().remove(&correlation);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            _ => {
                self.inner.pending.lock().unwrap().remove(&correlation);
                Err(BusError::Timeout)
            }
        }
    }

    /// Number of pending request-reply slots (for diagnostics and tests).
    pub fn pending_replies(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    /// Delivered-message history, newest last.
    pub fn history(&self, limit: Option<usize>, agent: Option<&str>) -> Vec<Message> {
        let history = self.inner.history.lock().unwrap();
        let filtered: Vec<Message> = history
            .iter()
            .filter(|m| match agent {
                Some(id) => m.sender == id || m.receiver.as_deref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();

        match limit {
            Some(n) if filtered.len() > n => filtered[filtered.len() - n..].to_vec(),
            _ => filtered,
        }
    }

    /// Debate transcript view of the history: `(sender, content)` for
    /// response and debate-turn messages, deduplicated per message id.
    pub fn debate_history(&self) -> Vec<(String, String)> {
        let history = self.inner.history.lock().unwrap();
        let mut seen = std::collections::HashSet::new();
        history
            .iter()
            .filter(|m| {
                matches!(m.kind, MessageKind::Response | MessageKind::DebateTurn)
                    && seen.insert(m.id)
            })
            .map(|m| (m.sender.clone(), m.payload.content.clone()))
            .collect()
    }

    /// Bus statistics snapshot.
    pub fn stats(&self) -> BusStats {
        let agents = self.inner.agents.read().unwrap();
        BusStats {
            registered_agents: agents.len(),
            total_messages: self.inner.history.lock().unwrap().len(),
            queue_depths: agents
                .iter()
                .map(|(id, inbox)| (id.clone(), inbox.len()))
                .collect(),
        }
    }

    /// Topic subscriber count (for tests and diagnostics).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap()
            .get(topic)
            .map(BTreeSet::len)
            .unwrap_or(0)
    }
}
