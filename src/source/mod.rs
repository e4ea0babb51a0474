//! Advertisement sources.
//!
//! The pipeline consumes advertisements from a channel; where they come from
//! is behind a trait so the gateway runs against real Bluetooth hardware in
//! production and against in-memory fakes in tests.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::advertisement::RawAdvertisement;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel buffer size for delivered advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// A producer of raw advertisements.
///
/// `start` begins delivery and returns the receiving end; the source runs
/// until dropped or until the receiver is closed.
pub trait AdvertisementSource: Send + Sync {
    fn start(
        &self,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<RawAdvertisement>, SourceError>> + Send + '_>,
    >;
}
