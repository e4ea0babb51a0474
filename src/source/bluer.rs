//! BlueZ D-Bus advertisement source.
//!
//! Uses the `bluer` crate to run device discovery and re-reads device
//! properties on every discovery event. Requires a running `bluetoothd`.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, AdvertisementSource, SourceError};
use crate::advertisement::RawAdvertisement;
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use log::debug;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::sync::mpsc;

impl From<bluer::Error> for SourceError {
    fn from(err: bluer::Error) -> Self {
        SourceError::Bluetooth(err.to_string())
    }
}

/// The 32 non-variable bits of the Bluetooth base UUID
/// (`0000xxxx-0000-1000-8000-00805f9b34fb`).
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// Extract the 16-bit short form from a 128-bit UUID, if it is one.
fn short_uuid(uuid: &bluer::Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !(0xFFFFu128 << 96) == BLUETOOTH_BASE_UUID {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

/// Advertisement source backed by BlueZ device discovery.
pub struct BluerSource {
    /// Monotonic anchor for `received_at_ms` timestamps.
    epoch: Instant,
}

impl BluerSource {
    pub fn new(epoch: Instant) -> Self {
        BluerSource { epoch }
    }
}

impl AdvertisementSource for BluerSource {
    fn start(
        &self,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<RawAdvertisement>, SourceError>> + Send + '_>,
    > {
        let epoch = self.epoch;
        Box::pin(async move {
            let session = Session::new().await?;
            let adapter = session.default_adapter().await?;
            adapter.set_powered(true).await?;

            let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
            let mut discovery = adapter.discover_devices_with_changes().await?;

            // The spawned task owns the Bluetooth state and runs until the
            // receiver is dropped.
            tokio::spawn(async move {
                let _session = session;
                while let Some(event) = discovery.next().await {
                    if let AdapterEvent::DeviceAdded(address) = event {
                        if let Err(e) = forward_device(&adapter, address, epoch, &tx).await {
                            debug!("failed to read device {address}: {e}");
                        }
                        if tx.is_closed() {
                            break;
                        }
                    }
                }
            });

            Ok(rx)
        })
    }
}

/// Read the advertised properties of one discovered device and deliver them
/// as a raw advertisement.
async fn forward_device(
    adapter: &Adapter,
    address: Address,
    epoch: Instant,
    tx: &mpsc::Sender<RawAdvertisement>,
) -> bluer::Result<()> {
    let device = adapter.device(address)?;

    let rssi = device.rssi().await?.unwrap_or(0);
    let name = device.name().await?;

    // One service-data entry is the common case for the supported beacons;
    // take the first one with a 16-bit UUID, else fall back to any entry.
    let (service_uuid, service_data) = match device.service_data().await? {
        Some(map) => map
            .iter()
            .find(|(uuid, _)| short_uuid(uuid).is_some())
            .or_else(|| map.iter().next())
            .map(|(uuid, bytes)| (short_uuid(uuid), Some(bytes.clone())))
            .unwrap_or((None, None)),
        None => (None, None),
    };

    let manufacturer_data = device
        .manufacturer_data()
        .await?
        .and_then(|map| map.into_values().next());

    let adv = RawAdvertisement {
        address: address.into(),
        rssi,
        name,
        service_uuid,
        service_data,
        manufacturer_data,
        received_at_ms: epoch.elapsed().as_millis() as u64,
    };
    let _ = tx.send(adv).await;
    Ok(())
}
