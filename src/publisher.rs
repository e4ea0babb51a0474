//! Periodic drain of report-flagged devices into the batch sink.

use crate::mac_address::MacAddress;
use crate::registry::{DeviceRegistry, RegistryError};
use crate::report::render_batch;
use crate::sink::BatchSink;
use log::{debug, warn};
use std::sync::Arc;

/// Drains the registry into the sink on a fixed cadence.
///
/// The registry lock is never held across the transport call: pending
/// records are cloned out, rendered, published, and only then are the flags
/// cleared under a fresh lock acquisition. A failed publish clears nothing,
/// so the same devices (plus any newly flagged ones) are re-rendered on the
/// next cycle.
pub struct BatchPublisher {
    registry: Arc<DeviceRegistry>,
    sink: Arc<dyn BatchSink>,
}

impl BatchPublisher {
    pub fn new(registry: Arc<DeviceRegistry>, sink: Arc<dyn BatchSink>) -> Self {
        BatchPublisher { registry, sink }
    }

    /// Run one publish cycle. Returns the number of devices whose flags were
    /// cleared (0 for an empty registry or a failed publish).
    ///
    /// `now_ms` is the monotonic time recorded as `last_reported`; `wall_ms`
    /// is the best-effort wall clock stamped into the report entries.
    pub async fn run_once(&self, now_ms: u64, wall_ms: u64) -> Result<usize, RegistryError> {
        let pending = self.registry.collect_pending().await?;
        if pending.is_empty() {
            // Nothing to report; the transport is not touched at all.
            return Ok(0);
        }

        let addresses: Vec<MacAddress> = pending.iter().map(|d| d.address).collect();
        let batch = render_batch(&pending, wall_ms);

        if self.sink.publish_batch(&batch).await {
            self.registry.mark_reported(&addresses, now_ms).await?;
            debug!("published and cleared {} devices", addresses.len());
            Ok(addresses.len())
        } else {
            warn!(
                "batch publish failed; {} devices stay pending for retry",
                addresses.len()
            );
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::report::Batch;
    use crate::test_utils::{TEST_MAC, lop001_advertisement, moko_advertisement};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Records every received batch and answers from a scripted result list
    /// (last result repeats once the script runs out).
    struct FakeSink {
        results: Mutex<Vec<bool>>,
        batches: Mutex<Vec<Batch>>,
    }

    impl FakeSink {
        fn new(results: Vec<bool>) -> Self {
            FakeSink {
                results: Mutex::new(results),
                batches: Mutex::new(Vec::new()),
            }
        }

        fn batches(&self) -> Vec<Batch> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl BatchSink for FakeSink {
        fn publish_batch<'a>(
            &'a self,
            batch: &'a Batch,
        ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
            self.batches.lock().unwrap().push(batch.clone());
            let mut results = self.results.lock().unwrap();
            let result = if results.len() > 1 {
                results.remove(0)
            } else {
                results.first().copied().unwrap_or(true)
            };
            Box::pin(async move { result })
        }
    }

    fn setup(results: Vec<bool>) -> (Arc<DeviceRegistry>, Arc<FakeSink>, BatchPublisher) {
        let registry = Arc::new(DeviceRegistry::new(RegistryConfig::default()));
        let sink = Arc::new(FakeSink::new(results));
        let publisher = BatchPublisher::new(registry.clone(), sink.clone());
        (registry, sink, publisher)
    }

    #[tokio::test]
    async fn empty_registry_skips_transport() {
        let (_registry, sink, publisher) = setup(vec![true]);
        assert_eq!(publisher.run_once(0, 0).await.unwrap(), 0);
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn successful_publish_clears_all_included_flags() {
        let (registry, sink, publisher) = setup(vec![true]);
        for i in 1..=3u8 {
            let adv = lop001_advertisement(MacAddress([i, i, i, i, i, i]), 20.0 + f64::from(i), 50.0, 0);
            registry.observe(&adv, &crate::decoder::decode(&adv)).await.unwrap();
        }

        assert_eq!(publisher.run_once(100, 1_000).await.unwrap(), 3);
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.batches()[0].len(), 3);

        for i in 1..=3u8 {
            let device = registry.get(&MacAddress([i, i, i, i, i, i])).await.unwrap().unwrap();
            assert!(!device.needs_report);
            assert!(!device.changed_since_report);
            assert_eq!(device.last_reported_ms, 100);
        }

        // Second cycle has nothing to do.
        assert_eq!(publisher.run_once(200, 2_000).await.unwrap(), 0);
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn devices_without_pending_reports_are_unaffected() {
        let (registry, _sink, publisher) = setup(vec![true]);
        let quiet = moko_advertisement(MacAddress([1, 0, 0, 0, 0, 1]), 20.0, 50.0, 3000, 0);
        registry.observe(&quiet, &crate::decoder::decode(&quiet)).await.unwrap();
        registry.mark_reported(&[quiet.address], 50).await.unwrap();

        let pending = lop001_advertisement(TEST_MAC, 22.0, 55.0, 0);
        registry.observe(&pending, &crate::decoder::decode(&pending)).await.unwrap();

        assert_eq!(publisher.run_once(100, 1_000).await.unwrap(), 1);
        let quiet_device = registry.get(&quiet.address).await.unwrap().unwrap();
        // Not part of the batch, so its last_reported stays put.
        assert_eq!(quiet_device.last_reported_ms, 50);
    }

    #[tokio::test]
    async fn failed_publish_retries_same_batch() {
        let (registry, sink, publisher) = setup(vec![false, true]);
        let adv = lop001_advertisement(TEST_MAC, 22.0, 55.0, 0);
        registry.observe(&adv, &crate::decoder::decode(&adv)).await.unwrap();

        assert_eq!(publisher.run_once(100, 1_000).await.unwrap(), 0);
        let device = registry.get(&TEST_MAC).await.unwrap().unwrap();
        assert!(device.needs_report, "failed publish must not clear flags");

        // Retry renders the identical device set.
        assert_eq!(publisher.run_once(200, 2_000).await.unwrap(), 1);
        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(
            batches[0].keys().collect::<Vec<_>>(),
            batches[1].keys().collect::<Vec<_>>()
        );
        assert!(!registry.get(&TEST_MAC).await.unwrap().unwrap().needs_report);
    }

    #[tokio::test]
    async fn failed_publish_batch_grows_with_new_changes() {
        let (registry, sink, publisher) = setup(vec![false, true]);
        let first = lop001_advertisement(TEST_MAC, 22.0, 55.0, 0);
        registry.observe(&first, &crate::decoder::decode(&first)).await.unwrap();
        assert_eq!(publisher.run_once(100, 1_000).await.unwrap(), 0);

        // A second device changes while the transport is down.
        let other = moko_advertisement(MacAddress([5, 5, 5, 5, 5, 5]), 21.0, 40.0, 3000, 150);
        registry.observe(&other, &crate::decoder::decode(&other)).await.unwrap();

        assert_eq!(publisher.run_once(200, 2_000).await.unwrap(), 2);
        let batches = sink.batches();
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 2, "retry batch is a superset");
    }
}
