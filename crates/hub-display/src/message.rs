//! Display messages and the bounded message queue

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A message with how long to show it, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
    pub duration: u64,
}

impl Message {
    pub fn new(message: impl Into<String>, duration: u64) -> Self {
        Self {
            message: message.into(),
            duration,
        }
    }
}

/// FIFO of pending messages that never grows past its limit
#[derive(Debug, Clone)]
pub struct MessageQueue {
    messages: VecDeque<Message>,
    limit: usize,
}

impl MessageQueue {
    /// Create a queue holding at most `limit` messages (at least one)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            messages: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append a message, returning the evicted oldest message when full
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.messages.len() >= self.limit {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    pub fn pop_front(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
