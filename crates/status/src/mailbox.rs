use std::sync::{Mutex, MutexGuard, PoisonError};

/// Single-slot mailbox with last-write-wins semantics.
///
/// Unlike a FIFO queue, publishing over an undrained value replaces it: a
/// burst of publishes collapses to the most recent one, and a consumer
/// polling at a fixed interval never sees a backlog. Intermediate values
/// may be missed, but a drained value is never returned twice and values
/// are never observed out of publish order.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot { value: None }),
        }
    }

    /// Store `value`, replacing any value not yet drained.
    pub fn publish(&self, value: T) {
        self.lock().value = Some(value);
    }

    /// Take the most recent value, leaving the mailbox empty.
    pub fn drain_latest(&self) -> Option<T> {
        self.lock().value.take()
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_mailbox_drains_nothing() {
        let mb: Mailbox<u32> = Mailbox::new();
        assert!(mb.drain_latest().is_none());
    }

    #[test]
    fn burst_collapses_to_last() {
        let mb = Mailbox::new();
        for i in 0..100 {
            mb.publish(i);
        }
        assert_eq!(mb.drain_latest(), Some(99));
        assert_eq!(mb.drain_latest(), None);
    }

    #[test]
    fn drained_value_is_not_returned_twice() {
        let mb = Mailbox::new();
        mb.publish("done");
        assert_eq!(mb.drain_latest(), Some("done"));
        assert_eq!(mb.drain_latest(), None);
    }

    #[test]
    fn publish_after_drain_is_seen() {
        let mb = Mailbox::new();
        mb.publish(1);
        mb.publish(2);
        assert_eq!(mb.drain_latest(), Some(2));
        mb.publish(3);
        assert_eq!(mb.drain_latest(), Some(3));
    }

    #[test]
    fn interleaved_drains_follow_publish_order() {
        let mb = Mailbox::new();
        let mut seen = Vec::new();
        for i in 0..10 {
            mb.publish(i);
            if i % 3 == 0 {
                seen.extend(mb.drain_latest());
            }
        }
        seen.extend(mb.drain_latest());
        assert_eq!(seen, vec![0, 3, 6, 9]);
    }

    #[test]
    fn concurrent_publishers_never_duplicate_or_reorder() {
        use std::thread;

        let mb = Arc::new(Mailbox::new());
        let publisher = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    mb.publish(i);
                }
            })
        };

        let mut seen = Vec::new();
        while !publisher.is_finished() {
            seen.extend(mb.drain_latest());
        }
        publisher.join().unwrap();
        seen.extend(mb.drain_latest());

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&9_999));
    }
}
