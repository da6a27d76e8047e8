use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// Unbounded multi-producer, multi-consumer queue.
///
/// Consumers take turns on the receiver, so whichever worker polls first gets
/// the next item. Polls are bounded so loops can observe shutdown.
#[derive(Debug)]
pub struct SharedQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn push(&self, item: T) {
        // The queue owns its receiver, so the channel cannot be closed while `self` lives.
        let _ = self.tx.send(item);
    }

    /// Wait up to `wait` for the next item.
    pub async fn poll(&self, wait: Duration) -> Option<T> {
        timeout(wait, async { self.rx.lock().await.recv().await })
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_then_poll_in_order() {
        let queue = SharedQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.poll(Duration::from_millis(10)).await, Some(1));
        assert_eq!(queue.poll(Duration::from_millis(10)).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_when_empty() {
        let queue: SharedQueue<u32> = SharedQueue::new();
        assert_eq!(queue.poll(Duration::from_millis(50)).await, None);
    }

    #[tokio::test]
    async fn test_clones_share_items() {
        let producer = SharedQueue::new();
        let consumer = producer.clone();
        producer.push("a");
        assert_eq!(consumer.poll(Duration::ZERO).await, Some("a"));
        assert_eq!(producer.poll(Duration::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_competing_consumers_each_item_once() {
        let queue = SharedQueue::new();
        for i in 0..100 {
            queue.push(i);
        }

        let mut handles = vec![];
        for _ in 0..4 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut taken = vec![];
                while let Some(item) = q.poll(Duration::from_millis(20)).await {
                    taken.push(item);
                }
                taken
            }));
        }

        let mut all = vec![];
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
