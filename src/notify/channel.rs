use super::{LinkSender, Notifier, NotifyError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::{error, warn};

/// In-process queue used when the service runs without Postgres.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: UnboundedSender<String>,
}

/// Receiving half of a [`ChannelNotifier`]. It keeps a sender of its own so
/// failed deliveries can be put back on the queue.
#[derive(Debug)]
pub struct ActivationQueue {
    rx: UnboundedReceiver<String>,
    requeue: UnboundedSender<String>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn channel() -> (Self, ActivationQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = ActivationQueue {
            rx,
            requeue: tx.clone(),
        };
        (Self { tx }, queue)
    }
}

impl ActivationQueue {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn publish(&self, message: &str) -> Result<(), NotifyError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| NotifyError::Closed)
    }
}

/// Drain the queue, handing every message to `sender`. A message that fails
/// delivery goes back to the end of the queue.
pub fn spawn_consumer(mut queue: ActivationQueue, sender: Arc<dyn LinkSender>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            if let Err(err) = sender.send(&message) {
                warn!("failed to deliver activation link: {err}");
                if queue.requeue.send(message).is_err() {
                    error!("failed to put activation link back on the queue");
                }
                tokio::task::yield_now().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn published_messages_reach_the_queue() {
        let (notifier, mut queue) = ChannelNotifier::channel();
        notifier.publish("http://localhost/links/1").await.unwrap();
        assert_eq!(queue.try_recv().as_deref(), Some("http://localhost/links/1"));
        assert_eq!(queue.try_recv(), None);
    }

    #[tokio::test]
    async fn publish_fails_once_queue_is_gone() {
        let (notifier, queue) = ChannelNotifier::channel();
        drop(queue);
        assert_eq!(notifier.publish("x").await, Err(NotifyError::Closed));
    }

    struct FailsOnce {
        failed: Mutex<bool>,
        delivered: Mutex<Vec<String>>,
    }

    impl LinkSender for FailsOnce {
        fn send(&self, message: &str) -> anyhow::Result<()> {
            let mut failed = self.failed.lock().unwrap();
            if !*failed {
                *failed = true;
                return Err(anyhow!("smtp down"));
            }
            self.delivered.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_retried() {
        let (notifier, queue) = ChannelNotifier::channel();
        let sender = Arc::new(FailsOnce {
            failed: Mutex::new(false),
            delivered: Mutex::new(Vec::new()),
        });
        let handle = spawn_consumer(queue, sender.clone());

        notifier.publish("link").await.unwrap();
        for _ in 0..50 {
            if !sender.delivered.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(*sender.delivered.lock().unwrap(), vec!["link".to_string()]);
    }
}
