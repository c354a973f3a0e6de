//! btleplug implementation of the transport
//!
//! Finds the peripheral by address, connects, locates the UART service and
//! forwards TX notifications into a channel.

use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use atom_proto::ble::{RX_CHAR_UUID, SERVICE_UUID, TX_CHAR_UUID};

use crate::transport::{Connected, Link, NOTIFICATION_BUFFER, Transport};
use crate::Error;

/// How often the adapter's peripheral list is checked while scanning
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, Error> {
    let manager = Manager::new().await.map_err(Error::connect)?;
    let adapters = manager.adapters().await.map_err(Error::connect)?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::ConnectFailed("no Bluetooth adapter found".to_string()))
}

/// Scan until a peripheral with `address` shows up or `timeout` elapses
pub async fn find_device(
    adapter: &Adapter,
    address: BDAddr,
    timeout: Duration,
) -> Result<Peripheral, Error> {
    log::info!("scanning for {address} ({}s)", timeout.as_secs());
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(Error::connect)?;

    let found = poll_peripherals(adapter, address, timeout).await;

    if let Err(e) = adapter.stop_scan().await {
        log::warn!("failed to stop scan: {e}");
    }

    found?.ok_or_else(|| Error::ConnectFailed(format!("device {address} not found")))
}

async fn poll_peripherals(
    adapter: &Adapter,
    address: BDAddr,
    timeout: Duration,
) -> Result<Option<Peripheral>, Error> {
    let deadline = Instant::now() + timeout;
    loop {
        let peripherals = adapter.peripherals().await.map_err(Error::connect)?;
        if let Some(p) = peripherals.into_iter().find(|p| p.address() == address) {
            return Ok(Some(p));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    }
}

/// Locate the UART service and its RX/TX characteristics
fn find_characteristics(peripheral: &Peripheral) -> Result<(Characteristic, Characteristic), Error> {
    let services = peripheral.services();
    let service = services
        .iter()
        .find(|s| s.uuid == SERVICE_UUID)
        .ok_or(Error::ServiceNotFound)?;

    let rx_char = service
        .characteristics
        .iter()
        .find(|c| c.uuid == RX_CHAR_UUID)
        .cloned()
        .ok_or(Error::CharacteristicNotFound("RX"))?;

    let tx_char = service
        .characteristics
        .iter()
        .find(|c| c.uuid == TX_CHAR_UUID)
        .cloned()
        .ok_or(Error::CharacteristicNotFound("TX"))?;

    Ok((rx_char, tx_char))
}

/// Subscribe to TX and forward its values until the receiver goes away
async fn subscribe(
    peripheral: &Peripheral,
    tx_char: &Characteristic,
) -> Result<(mpsc::Receiver<Vec<u8>>, JoinHandle<()>), Error> {
    let subscribe_failed = |e: btleplug::Error| Error::NotificationSubscribeFailed(e.to_string());

    peripheral.subscribe(tx_char).await.map_err(subscribe_failed)?;
    let mut stream = peripheral.notifications().await.map_err(subscribe_failed)?;

    let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
    let forward = tokio::spawn(async move {
        while let Some(notification) = stream.next().await {
            if notification.uuid != TX_CHAR_UUID {
                continue;
            }
            log::debug!("notification: {} bytes", notification.value.len());
            if tx.send(notification.value).await.is_err() {
                break;
            }
        }
        log::debug!("notification stream closed");
    });

    Ok((rx, forward))
}

/// Connects through the first Bluetooth adapter of the host
pub struct BtleplugTransport {
    scan_timeout: Duration,
}

impl BtleplugTransport {
    pub fn new(scan_timeout: Duration) -> Self {
        Self { scan_timeout }
    }
}

impl Transport for BtleplugTransport {
    type Link = BtleplugLink;

    async fn connect(&self, address: BDAddr) -> Result<Connected<BtleplugLink>, Error> {
        let adapter = get_adapter().await?;
        let peripheral = find_device(&adapter, address, self.scan_timeout).await?;

        log::info!("connecting to {address}");
        peripheral.connect().await.map_err(Error::connect)?;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);

        let discovered = match peripheral.discover_services().await {
            Ok(()) => find_characteristics(&peripheral),
            Err(e) => Err(Error::connect(e)),
        };
        let (rx_char, tx_char) = match discovered {
            Ok(chars) => chars,
            Err(e) => {
                // don't leave a half set up connection behind
                if let Err(de) = peripheral.disconnect().await {
                    log::warn!("disconnect after failed discovery: {de}");
                }
                return Err(e);
            }
        };

        let (notifications, forward) = match subscribe(&peripheral, &tx_char).await {
            Ok((rx, forward)) => (Ok(rx), Some(forward)),
            Err(e) => {
                log::warn!("{e}");
                (Err(e), None)
            }
        };

        let link = BtleplugLink {
            peripheral,
            rx_char,
            tx_char,
            forward,
        };

        Ok(Connected {
            link,
            name,
            notifications,
        })
    }
}

pub struct BtleplugLink {
    peripheral: Peripheral,
    rx_char: Characteristic,
    tx_char: Characteristic,
    forward: Option<JoinHandle<()>>,
}

impl Link for BtleplugLink {
    async fn write(&self, data: &[u8]) -> Result<(), Error> {
        self.peripheral
            .write(&self.rx_char, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| Error::WriteFailed(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), Error> {
        if let Some(forward) = &self.forward {
            if let Err(e) = self.peripheral.unsubscribe(&self.tx_char).await {
                log::warn!("failed to unsubscribe: {e}");
            }
            forward.abort();
        }

        self.peripheral
            .disconnect()
            .await
            .map_err(|e| Error::DisconnectFailed(e.to_string()))
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        if let Some(forward) = &self.forward {
            forward.abort();
        }
    }
}
