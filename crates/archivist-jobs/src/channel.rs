//! In-process [`JobFeed`] backed by an unbounded channel.
//!
//! Naked deliveries are queued again after the configured redelivery delay
//! with their attempt count bumped. Once the feed is closed, already queued
//! messages are still handed out but naked ones are abandoned.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{JobError, JobResult};
use crate::feed::{Acknowledger, Delivery, Disposition, JobFeed};

/// Settlement counters for a [`ChannelFeed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Messages accepted by [`ChannelFeed::publish`].
    pub published: u64,
    /// Deliveries settled with [`Disposition::Ack`].
    pub acked: u64,
    /// Deliveries settled with [`Disposition::Nak`].
    pub naked: u64,
    /// Deliveries settled with [`Disposition::Term`].
    pub termed: u64,
    /// Naked deliveries dropped because the feed had closed.
    pub abandoned: u64,
}

impl FeedStats {
    /// Deliveries settled so far, whatever the disposition.
    #[must_use]
    pub const fn settled(&self) -> u64 {
        self.acked + self.naked + self.termed
    }
}

struct Pending {
    payload: Vec<u8>,
    attempt: u32,
}

struct ChannelInner {
    sender: mpsc::UnboundedSender<Pending>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Pending>>,
    redelivery_delay: Duration,
    closed: CancellationToken,
    stats: Mutex<FeedStats>,
}

impl ChannelInner {
    fn stats(&self) -> MutexGuard<'_, FeedStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, pending: Pending) -> JobResult<()> {
        self.sender
            .send(pending)
            .map_err(|_| JobError::FeedClosed)
    }
}

/// In-process feed with at-least-once redelivery.
#[derive(Clone)]
pub struct ChannelFeed {
    inner: Arc<ChannelInner>,
}

impl ChannelFeed {
    /// Create an open feed that redelivers naked messages after `redelivery_delay`.
    #[must_use]
    pub fn new(redelivery_delay: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ChannelInner {
                sender,
                receiver: AsyncMutex::new(receiver),
                redelivery_delay,
                closed: CancellationToken::new(),
                stats: Mutex::new(FeedStats::default()),
            }),
        }
    }

    /// Queue a message for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::FeedClosed`] after [`ChannelFeed::close`].
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> JobResult<()> {
        if self.inner.closed.is_cancelled() {
            return Err(JobError::FeedClosed);
        }
        self.inner.enqueue(Pending {
            payload: payload.into(),
            attempt: 1,
        })?;
        self.inner.stats().published += 1;
        Ok(())
    }

    /// Stop accepting messages. Queued messages are still delivered, after
    /// which [`JobFeed::next_delivery`] returns `None`.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    /// Whether [`ChannelFeed::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Current settlement counters.
    #[must_use]
    pub fn stats(&self) -> FeedStats {
        *self.inner.stats()
    }
}

#[async_trait]
impl JobFeed for ChannelFeed {
    async fn next_delivery(&self) -> Option<Delivery> {
        let mut receiver = self.inner.receiver.lock().await;
        let received = tokio::select! {
            biased;
            pending = receiver.recv() => Some(pending),
            () = self.inner.closed.cancelled() => None,
        };
        let pending = match received {
            Some(pending) => pending,
            None => receiver.try_recv().ok(),
        }?;
        let acker = ChannelAcker {
            inner: Arc::clone(&self.inner),
            payload: pending.payload.clone(),
            attempt: pending.attempt,
        };
        Some(Delivery::new(
            pending.payload,
            pending.attempt,
            Box::new(acker),
        ))
    }
}

struct ChannelAcker {
    inner: Arc<ChannelInner>,
    payload: Vec<u8>,
    attempt: u32,
}

#[async_trait]
impl Acknowledger for ChannelAcker {
    async fn settle(self: Box<Self>, disposition: Disposition) -> JobResult<()> {
        {
            let mut stats = self.inner.stats();
            match disposition {
                Disposition::Ack => stats.acked += 1,
                Disposition::Nak => stats.naked += 1,
                Disposition::Term => stats.termed += 1,
            }
        }
        if disposition != Disposition::Nak {
            return Ok(());
        }

        let Self {
            inner,
            payload,
            attempt,
        } = *self;
        let next = Pending {
            payload,
            attempt: attempt.saturating_add(1),
        };
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(inner.redelivery_delay) => {}
                () = inner.closed.cancelled() => {}
            }
            if inner.closed.is_cancelled() {
                inner.stats().abandoned += 1;
                warn!(attempt = next.attempt, "feed closed; naked message abandoned");
                return;
            }
            debug!(attempt = next.attempt, "redelivering naked message");
            if let Err(err) = inner.enqueue(next) {
                warn!(error = %err, "failed to requeue naked message");
            }
        });
        Ok(())
    }
}
