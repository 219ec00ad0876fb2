//! In-memory, process-local, concurrency-safe pub/sub with replay: a
//! multi-subscriber bus backed by a bounded ring buffer, per §9's "bounded
//! ring buffer plus a set of per-subscriber outbound channels" guidance.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::warn;

use crate::types::AgentEvent;

const HISTORY_CAP: usize = 100;
const SUBSCRIBER_BUFFER: usize = 256;

/// A live subscription: the history snapshot at join time, plus a live
/// stream of events published after that point.
pub struct Subscription {
    pub replay: Vec<AgentEvent>,
    pub receiver: broadcast::Receiver<AgentEvent>,
}

/// Process-wide singleton per §5 — one logical thread of execution,
/// internal state mutated only through `publish`/`subscribe`.
pub struct EventBus {
    history: Mutex<VecDeque<AgentEvent>>,
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        EventBus { history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)), sender }
    }

    /// Appends to history (FIFO, cap 100) and delivers to every live
    /// subscriber. A publish with no subscribers is a no-op beyond the
    /// history write.
    pub fn publish(&self, event: AgentEvent) {
        {
            let mut history = self.history.lock().expect("event bus history lock poisoned");
            history.push_back(event.clone());
            while history.len() > HISTORY_CAP {
                history.pop_front();
            }
        }

        if self.sender.send(event).is_err() {
            // No active subscribers right now; not an error for a publisher.
        }
    }

    /// Registers a new subscriber and atomically snapshots the current
    /// history under the same lock used by `publish`, so the replay and the
    /// live stream never duplicate or skip an event.
    pub fn subscribe(&self) -> Subscription {
        let history = self.history.lock().expect("event bus history lock poisoned");
        let receiver = self.sender.subscribe();
        let replay = history.iter().cloned().collect();
        Subscription { replay, receiver }
    }

    /// Returns the last `limit` events, oldest-first.
    pub fn recent_events(&self, limit: usize) -> Vec<AgentEvent> {
        let history = self.history.lock().expect("event bus history lock poisoned");
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains a subscriber's live stream, logging (not erroring on) lag so a
/// slow consumer never blocks the publisher (§4.L: "overflow drops newest
/// for that subscriber only and is logged").
pub async fn next_event(subscription: &mut Subscription) -> Option<AgentEvent> {
    loop {
        match subscription.receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event bus subscriber lagged; dropping oldest pending events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentEventKind;
    use uuid::Uuid;

    fn event(message: &str) -> AgentEvent {
        AgentEvent {
            id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            agent_type: None,
            kind: AgentEventKind::StoryStarted,
            story_id: None,
            file_path: None,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn history_length_never_exceeds_cap() {
        let bus = EventBus::new();
        for i in 0..(HISTORY_CAP + 50) {
            bus.publish(event(&i.to_string()));
        }
        assert_eq!(bus.recent_events(usize::MAX).len(), HISTORY_CAP);
    }

    #[test]
    fn recent_events_returns_oldest_first_tail() {
        let bus = EventBus::new();
        bus.publish(event("a"));
        bus.publish(event("b"));
        bus.publish(event("c"));
        let recent = bus.recent_events(2);
        assert_eq!(recent.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn subscriber_receives_replay_then_new_events_in_order() {
        let bus = EventBus::new();
        bus.publish(event("E1"));
        bus.publish(event("E2"));

        let mut sub = bus.subscribe();
        assert_eq!(
            sub.replay.iter().map(|e| e.message.clone()).collect::<Vec<_>>(),
            vec!["E1".to_string(), "E2".to_string()]
        );

        bus.publish(event("E3"));
        let next = next_event(&mut sub).await.unwrap();
        assert_eq!(next.message, "E3");
    }

    #[tokio::test]
    async fn scenario_s5_two_subscribers_see_consistent_order() {
        let bus = EventBus::new();
        bus.publish(event("E1"));
        bus.publish(event("E2"));
        let sub1 = bus.subscribe();
        bus.publish(event("E3"));
        let sub2 = bus.subscribe();

        let sub1_seen: Vec<String> = sub1.replay.iter().map(|e| e.message.clone()).collect();
        assert_eq!(sub1_seen, vec!["E1".to_string(), "E2".to_string()]);

        let sub2_seen: Vec<String> = sub2.replay.iter().map(|e| e.message.clone()).collect();
        assert_eq!(sub2_seen, vec!["E1".to_string(), "E2".to_string(), "E3".to_string()]);
    }
}
