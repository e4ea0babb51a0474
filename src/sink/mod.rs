//! Outbound batch sinks.
//!
//! The publisher only needs one capability from the transport: deliver a
//! rendered batch and say whether it made it out. Everything else about the
//! transport (connection lifecycle, authentication, topics) stays behind the
//! trait, so the pipeline is testable with an in-memory fake.

pub mod mqtt;

use crate::report::Batch;
use std::future::Future;
use std::pin::Pin;

/// Transport capability consumed by the batch publisher.
///
/// Returns `true` only when the batch was handed to the transport
/// successfully; `false` leaves the pending flags set for retry.
pub trait BatchSink: Send + Sync {
    fn publish_batch<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}
