//! Message source seam.
//!
//! A [`JobFeed`] hands out [`Delivery`] values; each one must be settled
//! exactly once with a [`Disposition`]. Unsettled deliveries are redelivered
//! by the source, which is what makes the pipeline at-least-once.

use async_trait::async_trait;

use crate::error::JobResult;

/// Acknowledgment sent back to the message source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Processed; never deliver again.
    Ack,
    /// Not processed; deliver again later.
    Nak,
    /// Not processable; never deliver again.
    Term,
}

impl Disposition {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nak => "nak",
            Self::Term => "term",
        }
    }
}

/// Settles one delivery with its source.
#[async_trait]
pub trait Acknowledger: Send {
    /// Report the disposition for the delivery this acknowledger belongs to.
    async fn settle(self: Box<Self>, disposition: Disposition) -> JobResult<()>;
}

/// Source of job deliveries.
#[async_trait]
pub trait JobFeed: Send + Sync {
    /// Wait for the next delivery. `None` means the feed is closed.
    ///
    /// Implementations must be cancel-safe: dropping the future before it
    /// resolves must not lose a message.
    async fn next_delivery(&self) -> Option<Delivery>;
}

/// One message handed out by a [`JobFeed`].
pub struct Delivery {
    payload: Vec<u8>,
    attempt: u32,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Wrap a payload with the acknowledger that settles it.
    #[must_use]
    pub fn new(payload: Vec<u8>, attempt: u32, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            payload,
            attempt,
            acker,
        }
    }

    /// Raw message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Delivery attempt, starting at 1.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Split into the payload and its acknowledger.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Box<dyn Acknowledger>) {
        (self.payload, self.acker)
    }

    /// Settle the delivery.
    ///
    /// # Errors
    ///
    /// Returns the source's settlement error.
    pub async fn settle(self, disposition: Disposition) -> JobResult<()> {
        self.acker.settle(disposition).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}
