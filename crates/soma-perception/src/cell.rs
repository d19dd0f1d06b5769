//! [`LatestCell`] – single-slot last-write-wins cell with a monotonic
//! sequence guard.
//!
//! Built on [`tokio::sync::watch`]: publishers overwrite, readers clone the
//! latest value, nothing queues and nobody blocks on a slow consumer.  A
//! publish carrying a sequence number at or below the current one is refused,
//! so a reader can never observe the pipeline going backwards in time.
//!
//! # Example
//!
//! ```rust
//! use soma_perception::LatestCell;
//!
//! let cell = LatestCell::new();
//! let reader = cell.subscribe();
//!
//! assert!(cell.publish(1, "first"));
//! assert!(cell.publish(2, "second"));
//! assert!(!cell.publish(1, "stale"));
//!
//! assert_eq!(reader.latest(), Some("second"));
//! ```

use tokio::sync::watch;

#[derive(Debug, Clone)]
struct Versioned<T> {
    seq: u64,
    value: T,
}

/// Write side of the cell.  Created once per producer loop.
pub struct LatestCell<T> {
    tx: watch::Sender<Option<Versioned<T>>>,
}

impl<T: Clone + Send + Sync + 'static> LatestCell<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish `value` under sequence number `seq`.
    ///
    /// Returns `false` (and leaves the cell untouched) when `seq` does not
    /// advance past the currently stored sequence.
    pub fn publish(&self, seq: u64, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref().is_some_and(|v| seq <= v.seq) {
                return false;
            }
            *current = Some(Versioned { seq, value });
            true
        })
    }

    /// Sequence number of the stored value, if any.
    pub fn current_seq(&self) -> Option<u64> {
        self.tx.borrow().as_ref().map(|v| v.seq)
    }

    /// Create a read handle.  Cheap; clone freely.
    pub fn subscribe(&self) -> LatestReader<T> {
        LatestReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the cell.
#[derive(Clone)]
pub struct LatestReader<T> {
    rx: watch::Receiver<Option<Versioned<T>>>,
}

impl<T: Clone> LatestReader<T> {
    /// Clone of the most recently published value, or `None` before the
    /// first publish.
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().as_ref().map(|v| v.value.clone())
    }

    /// Sequence number of the most recently published value.
    pub fn latest_seq(&self) -> Option<u64> {
        self.rx.borrow().as_ref().map(|v| v.seq)
    }

    /// Wait until a new value is published (or the producer is gone).
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_sees_latest_value() {
        let cell = LatestCell::new();
        let reader = cell.subscribe();
        assert_eq!(reader.latest(), None);

        assert!(cell.publish(1, 10));
        assert!(cell.publish(2, 20));
        assert_eq!(reader.latest(), Some(20));
        assert_eq!(reader.latest_seq(), Some(2));
    }

    #[test]
    fn stale_publish_is_refused() {
        let cell = LatestCell::new();
        let reader = cell.subscribe();

        assert!(cell.publish(5, "fresh"));
        assert!(!cell.publish(5, "same-seq"));
        assert!(!cell.publish(3, "older"));
        assert_eq!(reader.latest(), Some("fresh"));
        assert_eq!(cell.current_seq(), Some(5));
    }

    #[tokio::test]
    async fn changed_wakes_on_publish_but_not_on_stale() {
        let cell = LatestCell::new();
        let mut reader = cell.subscribe();

        cell.publish(1, 1u32);
        reader.changed().await.unwrap();
        assert_eq!(reader.latest(), Some(1));

        // A refused publish must not wake the reader.
        cell.publish(1, 99u32);
        let woke = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            reader.changed(),
        )
        .await;
        assert!(woke.is_err(), "stale publish must not notify readers");
    }

    #[tokio::test]
    async fn late_subscriber_still_gets_current_value() {
        let cell = LatestCell::new();
        cell.publish(7, "value");
        let reader = cell.subscribe();
        assert_eq!(reader.latest(), Some("value"));
    }
}
