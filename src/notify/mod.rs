//! Outbound activation notifications.
//!
//! Registration hands the activation link to a [`Notifier`] and moves on; the
//! notifier only promises the message was queued. Delivery happens on a
//! separate worker with at-least-once semantics.

mod channel;
mod outbox;

pub use channel::{spawn_consumer, ActivationQueue, ChannelNotifier};
pub use outbox::{spawn_outbox_worker, OutboxConfig, OutboxNotifier};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,

    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Queue a plaintext message for delivery.
    async fn publish(&self, message: &str) -> Result<(), NotifyError>;
}

/// Final hop that actually delivers a queued activation link.
pub trait LinkSender: Send + Sync {
    /// # Errors
    /// Returns an error if the message could not be delivered; it will be retried.
    fn send(&self, message: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogLinkSender;

impl LinkSender for LogLinkSender {
    fn send(&self, message: &str) -> Result<()> {
        info!(link = %message, "activation link delivered");
        Ok(())
    }
}
