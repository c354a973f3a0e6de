//! The seam between the session and the platform Bluetooth stack
//!
//! [`crate::ble::BtleplugTransport`] is the real implementation. Tests use an
//! in-memory one.

use std::future::Future;

use btleplug::api::BDAddr;
use tokio::sync::mpsc;

use crate::Error;

/// Capacity of the notification channel between transport and session
pub const NOTIFICATION_BUFFER: usize = 16;

/// Result of a successful connect: the peripheral is connected, the UART
/// service and both characteristics were found.
pub struct Connected<L> {
    pub link: L,
    /// Advertised local name, if the platform knows it
    pub name: Option<String>,
    /// Raw TX notifications, or why subscribing failed
    ///
    /// A failed subscription does not fail the connect: writes still work.
    pub notifications: Result<mpsc::Receiver<Vec<u8>>, Error>,
}

pub trait Transport {
    type Link: Link;

    /// Connect by address, discover the UART service and subscribe to TX
    fn connect(
        &self,
        address: BDAddr,
    ) -> impl Future<Output = Result<Connected<Self::Link>, Error>> + Send;
}

/// A connected peripheral with its RX (write) and TX (notify) characteristics
pub trait Link: Send + Sync {
    /// Write to RX without response
    fn write(&self, data: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Unsubscribe from TX and release the connection
    fn disconnect(&self) -> impl Future<Output = Result<(), Error>> + Send;
}
