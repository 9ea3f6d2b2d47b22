//! NATS subscription for incoming scoring requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

/// Queue-group subscriber; replicas sharing the group split the requests
pub struct RequestConsumer {
    client: Client,
    subject: String,
    queue_group: String,
}

impl RequestConsumer {
    pub fn new(client: Client, subject: &str, queue_group: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: queue_group.to_string(),
        }
    }

    /// Subscribe to the request subject within the queue group
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await?;
        info!(
            subject = %self.subject,
            queue_group = %self.queue_group,
            "Subscribed to scoring requests"
        );
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Bounds how many requests are scored at once.
///
/// Each in-flight request holds one permit; [`drain`](Self::drain) waits for
/// all of them to be returned.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free worker. `None` once the pool has been drained.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    pub fn in_flight(&self) -> usize {
        self.size - self.semaphore.available_permits()
    }

    /// Stop handing out permits and wait until every in-flight request has
    /// released its own.
    pub async fn drain(&self) {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight requests");
        }
        if let Ok(all) = self.semaphore.acquire_many(self.size as u32).await {
            drop(all);
        }
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_work() {
        let pool = WorkerPool::new(2);
        let replied = Arc::new(AtomicUsize::new(0));

        for delay_ms in [20, 60] {
            let permit = pool.acquire().await.unwrap();
            let replied = replied.clone();
            tokio::spawn(async move {
                let _permit = permit;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                replied.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.in_flight(), 2);

        pool.drain().await;

        assert_eq!(replied.load(Ordering::SeqCst), 2);
        assert!(pool.acquire().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_on_idle_pool_returns_immediately() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.in_flight(), 0);

        tokio::time::timeout(Duration::from_secs(1), pool.drain())
            .await
            .unwrap();
    }
}
