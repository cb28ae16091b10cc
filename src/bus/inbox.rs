//! Bounded per-agent inbox with priority lanes.
//!
//! Four FIFO lanes, one per priority class; dequeue always drains the
//! highest non-empty lane, preserving enqueue order within a lane. The
//! total capacity is bounded; overflow behavior is the sender's choice.

use super::error::BusError;
use super::message::Message;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// What to do when an inbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fail the enqueue with a backpressure error.
    #[default]
    Reject,
    /// Evict the tail of the lowest-priority lane strictly below the
    /// incoming message; reject when nothing lower exists.
    DropLowest,
}

struct InboxState {
    lanes: [VecDeque<Message>; 4],
    len: usize,
}

pub(crate) struct Inbox {
    state: Mutex<InboxState>,
    notify: Notify,
    capacity: usize,
}

impl Inbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(InboxState {
                lanes: [
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                ],
                len: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a message, applying the overflow policy when full.
    pub(crate) fn push(&self, message: Message, policy: OverflowPolicy) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();

        if state.len >= self.capacity {
            match policy {
                OverflowPolicy::Reject => {
                    return Err(BusError::Backpressure {
                        receiver: message.receiver.clone().unwrap_or_default(),
                    });
                }
                OverflowPolicy::DropLowest => {
                    let incoming_lane = message.priority.lane();
                    let victim_lane = (0..incoming_lane)
                        .find(|&lane| !state.lanes[lane].is_empty());
                    match victim_lane {
                        Some(lane) => {
                            state.lanes[lane].pop_back();
                            state.len -= 1;
                        }
                        None => {
                            return Err(BusError::Backpressure {
                                receiver: message.receiver.clone().unwrap_or_default(),
                            });
                        }
                    }
                }
            }
        }

        let lane = message.priority.lane();
        state.lanes[lane].push_back(message);
        state.len += 1;
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    fn try_pop_locked(state: &mut InboxState) -> Option<Message> {
        for lane in (0..4).rev() {
            if let Some(message) = state.lanes[lane].pop_front() {
                state.len -= 1;
                return Some(message);
            }
        }
        None
    }

    /// Non-blocking dequeue.
    pub(crate) fn try_pop(&self) -> Option<Message> {
        let mut state = self.state.lock().unwrap();
        Self::try_pop_locked(&mut state)
    }

    /// Blocking dequeue; suspends until a message arrives.
    pub(crate) async fn recv(&self) -> Message {
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.try_pop() {
                return message;
            }
            notified.await;
        }
    }

    /// Remove and return everything queued.
    pub(crate) fn drain(&self) -> Vec<Message> {
        let mut state = self.state.lock().unwrap();
        let mut drained = Vec::with_capacity(state.len);
        while let Some(message) = Self::try_pop_locked(&mut state) {
            drained.push(message);
        }
        drained
    }

    /// Messages currently queued.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{Message, Priority};

    fn msg(content: &str, priority: Priority) -> Message {
        Message::request("s", "r", content).with_priority(priority)
    }

    #[test]
    fn fifo_within_priority() {
        let inbox = Inbox::new(10);
        inbox.push(msg("a", Priority::Normal), OverflowPolicy::Reject).unwrap();
        inbox.push(msg("b", Priority::Normal), OverflowPolicy::Reject).unwrap();

        assert_eq!(inbox.try_pop().unwrap().payload.content, "a");
        assert_eq!(inbox.try_pop().unwrap().payload.content, "b");
    }

    #[test]
    fn higher_priority_pulled_first() {
        let inbox = Inbox::new(10);
        inbox.push(msg("low", Priority::Low), OverflowPolicy::Reject).unwrap();
        inbox.push(msg("urgent", Priority::Urgent), OverflowPolicy::Reject).unwrap();
        inbox.push(msg("normal", Priority::Normal), OverflowPolicy::Reject).unwrap();

        assert_eq!(inbox.try_pop().unwrap().payload.content, "urgent");
        assert_eq!(inbox.try_pop().unwrap().payload.content, "normal");
        assert_eq!(inbox.try_pop().unwrap().payload.content, "low");
    }

    #[test]
    fn reject_policy_surfaces_backpressure() {
        let inbox = Inbox::new(1);
        inbox.push(msg("a", Priority::Normal), OverflowPolicy::Reject).unwrap();

        let err = inbox
            .push(msg("b", Priority::Normal), OverflowPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, BusError::Backpressure { .. }));
    }

    #[test]
    fn drop_lowest_evicts_lower_priority_tail() {
        let inbox = Inbox::new(2);
        inbox.push(msg("low_a", Priority::Low), OverflowPolicy::Reject).unwrap();
        inbox.push(msg("low_b", Priority::Low), OverflowPolicy::Reject).unwrap();

        inbox
            .push(msg("high", Priority::High), OverflowPolicy::DropLowest)
            .unwrap();

        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.try_pop().unwrap().payload.content, "high");
        assert_eq!(inbox.try_pop().unwrap().payload.content, "low_a");
    }

    #[test]
    fn drop_lowest_rejects_when_nothing_lower() {
        let inbox = Inbox::new(1);
        inbox.push(msg("a", Priority::High), OverflowPolicy::Reject).unwrap();

        let err = inbox
            .push(msg("b", Priority::High), OverflowPolicy::DropLowest)
            .unwrap_err();
        assert!(matches!(err, BusError::Backpressure { .. }));
    }

    #[tokio::test]
    async fn recv_wakes_on_push() {
        let inbox = std::sync::Arc::new(Inbox::new(4));
        let reader = inbox.clone();

        let handle = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        inbox.push(msg("wake", Priority::Normal), OverflowPolicy::Reject).unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.payload.content, "wake");
    }

    #[test]
    fn drain_empties_all_lanes() {
        let inbox = Inbox::new(10);
        inbox.push(msg("a", Priority::Low), OverflowPolicy::Reject).unwrap();
        inbox.push(msg("b", Priority::Urgent), OverflowPolicy::Reject).unwrap();

        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(inbox.len(), 0);
    }
}
