//! Core gateway runner: wires the advertisement source, registry, sweeper
//! and publisher together.
//!
//! This module is decoupled from CLI parsing and process exit codes so it
//! can be tested deterministically with injected sources and sinks. The
//! three pipeline paths run as independent tokio tasks sharing one registry
//! handle: the ingestion loop (one observation per delivered advertisement),
//! the sweep task and the publish task on their own fixed cadences.

use crate::advertisement::RawAdvertisement;
use crate::config::parse_duration;
use crate::decoder;
use crate::publisher::BatchPublisher;
use crate::registry::{DeviceRegistry, ObserveOutcome};
use crate::sink::BatchSink;
use crate::source::{AdvertisementSource, SourceError};
use clap::Parser;
use log::{debug, info, trace, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Verbose output, log every observation outcome.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Start with ingestion paused (resume is an external concern).
    #[arg(long)]
    pub paused: bool,

    /// Override the sweep cadence. Accepts 30s, 5m, 1h, 500ms.
    #[arg(long, value_parser = parse_duration)]
    pub sweep_interval: Option<Duration>,

    /// Override the publish cadence. Accepts 30s, 5m, 1h, 500ms.
    #[arg(long, value_parser = parse_duration)]
    pub publish_interval: Option<Duration>,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Externally driven runtime switches.
///
/// `paused` is operator-driven (configuration mode); `suspended` is set
/// while a firmware update or similar maintenance owns the device. Either
/// one makes the ingestion path drop advertisements without touching the
/// registry and makes the publish task skip its cycle.
#[derive(Debug, Default)]
pub struct GatewayFlags {
    paused: AtomicBool,
    suspended: AtomicBool,
}

impl GatewayFlags {
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        !self.paused.load(Ordering::Relaxed) && !self.suspended.load(Ordering::Relaxed)
    }
}

/// Best-effort wall-clock milliseconds since the Unix epoch.
///
/// Never blocks on time synchronization: a clock before the epoch simply
/// yields 0 and reports go out anyway.
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// The assembled pipeline, owning the shared registry handle.
pub struct Gateway {
    registry: Arc<DeviceRegistry>,
    flags: Arc<GatewayFlags>,
    /// Anchor for monotonic timestamps used by the sweep and publish tasks.
    epoch: Instant,
    verbose: bool,
}

impl Gateway {
    pub fn new(registry: Arc<DeviceRegistry>, flags: Arc<GatewayFlags>) -> Self {
        Gateway {
            registry,
            flags,
            epoch: Instant::now(),
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn flags(&self) -> &Arc<GatewayFlags> {
        &self.flags
    }

    fn monotonic_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Process one advertisement: decode, then update the registry.
    ///
    /// Returns `None` when the advertisement was dropped (gateway inactive
    /// or lock wait exceeded); the drop is logged, never retried here.
    pub async fn ingest(&self, adv: &RawAdvertisement) -> Option<ObserveOutcome> {
        if !self.flags.is_active() {
            trace!("gateway inactive, dropping advertisement from {}", adv.address);
            return None;
        }

        let reading = decoder::decode(adv);
        match self.registry.observe(adv, &reading).await {
            Ok(outcome) => {
                if self.verbose {
                    debug!("observation from {}: {:?}", adv.address, outcome);
                }
                Some(outcome)
            }
            Err(e) => {
                warn!("observation from {} dropped: {e}", adv.address);
                None
            }
        }
    }

    /// Run the pipeline until the source closes its channel.
    ///
    /// Sweep and publish run as background tasks; on shutdown they are
    /// stopped and one final publish drain flushes anything still pending.
    pub async fn run(
        &self,
        source: &dyn AdvertisementSource,
        sink: Arc<dyn BatchSink>,
        sweep_interval: Duration,
        publish_interval: Duration,
    ) -> Result<(), RunError> {
        let mut advertisements = source.start().await?;

        let sweep_task = {
            let registry = self.registry.clone();
            let epoch = self.epoch;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // first tick fires immediately
                loop {
                    ticker.tick().await;
                    let now_ms = epoch.elapsed().as_millis() as u64;
                    match registry.sweep_expired(now_ms).await {
                        Ok(0) => {}
                        Ok(removed) => info!("sweep removed {removed} expired devices"),
                        Err(e) => warn!("sweep skipped: {e}"),
                    }
                    if let Ok(count) = registry.device_count().await {
                        debug!(
                            "tracking {count} devices ({} dropped operations)",
                            registry.dropped_operations()
                        );
                    }
                }
            })
        };

        let publish_task = {
            let publisher = BatchPublisher::new(self.registry.clone(), sink.clone());
            let flags = self.flags.clone();
            let epoch = self.epoch;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(publish_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if !flags.is_active() {
                        continue;
                    }
                    let now_ms = epoch.elapsed().as_millis() as u64;
                    match publisher.run_once(now_ms, wall_clock_ms()).await {
                        Ok(0) => {}
                        Ok(published) => debug!("publish cycle cleared {published} devices"),
                        Err(e) => warn!("publish cycle skipped: {e}"),
                    }
                }
            })
        };

        while let Some(adv) = advertisements.recv().await {
            self.ingest(&adv).await;
        }

        info!("advertisement source closed, shutting down");
        sweep_task.abort();
        publish_task.abort();

        // Final drain so a clean shutdown does not strand pending reports.
        let publisher = BatchPublisher::new(self.registry.clone(), sink);
        if let Err(e) = publisher.run_once(self.monotonic_ms(), wall_clock_ms()).await {
            warn!("final publish drain skipped: {e}");
        }

        Ok(())
    }
}
