//! [`VoiceInbox`] – bounded queue of locally-captured voice events.
//!
//! The body hears things while the brain is busy elsewhere; events queue
//! here until the brain drains them via `GET /voice/inbox`.  Bounded: when
//! full, the oldest event is dropped (the brain cares about what was said
//! recently, not an unbounded backlog).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use soma_types::AudioEvent;
use tracing::debug;

/// Shared, bounded voice-event queue.  Clone freely.
#[derive(Clone)]
pub struct VoiceInbox {
    inner: Arc<Mutex<VecDeque<AudioEvent>>>,
    capacity: usize,
}

impl VoiceInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Queue an event, evicting the oldest when full.
    pub fn push(&self, event: AudioEvent) {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            let dropped = queue.pop_front();
            debug!(?dropped, "voice inbox full, oldest event dropped");
        }
        queue.push_back(event);
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<AudioEvent> {
        self.inner.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_events_oldest_first() {
        let inbox = VoiceInbox::new(8);
        inbox.push(AudioEvent::new("first", None));
        inbox.push(AudioEvent::new("second", Some(-12)));

        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].transcript, "first");
        assert_eq!(drained[1].transcript, "second");
        assert!(inbox.is_empty());
    }

    #[test]
    fn full_inbox_drops_oldest() {
        let inbox = VoiceInbox::new(2);
        inbox.push(AudioEvent::new("one", None));
        inbox.push(AudioEvent::new("two", None));
        inbox.push(AudioEvent::new("three", None));

        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].transcript, "two");
    }
}
