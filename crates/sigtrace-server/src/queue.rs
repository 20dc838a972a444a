//! Bounded hand-off queue between line readers and the merge loop.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel of raw (undecoded)
//! records. Any number of [`QueueProducer`] clones may push; exactly one
//! [`QueueConsumer`] drains. A full queue suspends producers until the
//! consumer makes room, which is the pipeline's backpressure.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::ServerError;

/// Creates a queue holding at most `capacity` records (at least one).
pub fn observation_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Producer half; cheap to clone, one per connection.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<String>,
}

impl QueueProducer {
    /// Enqueues `record`, waiting while the queue is full.
    pub async fn push(&self, record: String) -> Result<(), ServerError> {
        self.tx.send(record).await.map_err(|_| ServerError::QueueClosed)
    }

    /// Blocking form of [`QueueProducer::push`] for callers outside the
    /// async runtime. Must not be called from an async context.
    pub fn blocking_push(&self, record: String) -> Result<(), ServerError> {
        self.tx.blocking_send(record).map_err(|_| ServerError::QueueClosed)
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free slots left before producers start to wait.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half, owned by the merge loop.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<String>,
}

impl QueueConsumer {
    /// Takes the next record if one is available right now.
    pub fn poll(&mut self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next record. Returns `None` once every producer is
    /// dropped and the queue is drained. Must not be called from an async
    /// context.
    pub fn take(&mut self) -> Option<String> {
        self.rx.blocking_recv()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_order_and_poll() {
        let (producer, mut consumer) = observation_queue(4);
        assert!(consumer.poll().is_none());
        producer.blocking_push("a".into()).unwrap();
        producer.blocking_push("b".into()).unwrap();
        assert_eq!(producer.len(), 2);
        assert_eq!(producer.remaining_capacity(), 2);
        assert_eq!(consumer.poll().as_deref(), Some("a"));
        assert_eq!(consumer.take().as_deref(), Some("b"));
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_take_returns_none_when_producers_gone() {
        let (producer, mut consumer) = observation_queue(2);
        producer.blocking_push("last".into()).unwrap();
        drop(producer);
        assert_eq!(consumer.take().as_deref(), Some("last"));
        assert!(consumer.take().is_none());
    }

    #[test]
    fn test_push_fails_without_consumer() {
        let (producer, consumer) = observation_queue(2);
        drop(consumer);
        assert!(matches!(producer.blocking_push("x".into()), Err(ServerError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producers_without_dropping() {
        let (producer, consumer) = observation_queue(2);
        let mut handles = Vec::new();
        for p in 0..4 {
            let producer = producer.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..5 {
                    producer.push(format!("{p}-{i}")).await.unwrap();
                }
            }));
        }
        drop(producer);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(consumer.len(), 2);
        assert!(handles.iter().any(|h| !h.is_finished()));

        let drained = tokio::task::spawn_blocking(move || {
            let mut consumer = consumer;
            let mut records = Vec::new();
            while let Some(record) = consumer.take() {
                records.push(record);
            }
            records
        })
        .await
        .unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(drained.len(), 20);
        for p in 0..4 {
            let own: Vec<&String> = drained.iter().filter(|r| r.starts_with(&format!("{p}-"))).collect();
            let expected: Vec<String> = (0..5).map(|i| format!("{p}-{i}")).collect();
            assert_eq!(own, expected.iter().collect::<Vec<_>>());
        }
    }
}
