//! In-memory transport for tests
//!
//! [`FakePeripheral`] records every write and can answer `TEMP` after a
//! scripted delay. Enabled for this crate's tests and, for dependants,
//! through the `testing` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use btleplug::api::BDAddr;
use tokio::sync::mpsc;

use crate::Error;
use crate::transport::{Connected, Link, Transport};

pub const DEVICE_NAME: &str = "ATOM";

#[derive(Default)]
pub struct FakePeripheral {
    pub(crate) writes: Mutex<Vec<Vec<u8>>>,
    pub(crate) notifier: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    pub(crate) disconnects: AtomicUsize,
    /// Delay and payload of the notification sent after each `TEMP` write
    pub reply: Option<(Duration, &'static [u8])>,
    /// Make the notification subscription fail on connect
    pub subscribe_fails: bool,
}

impl FakePeripheral {
    pub fn answering(delay: Duration, payload: &'static [u8]) -> Self {
        Self {
            reply: Some((delay, payload)),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn notifier(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Push a notification as if the device sent it. Returns false when
    /// nothing is subscribed.
    pub async fn notify(&self, payload: &[u8]) -> bool {
        match self.notifier() {
            Some(tx) => tx.send(payload.to_vec()).await.is_ok(),
            None => false,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeTransport(pub Arc<FakePeripheral>);

impl FakeTransport {
    pub fn new(peripheral: FakePeripheral) -> Self {
        Self(Arc::new(peripheral))
    }

    pub fn peripheral(&self) -> Arc<FakePeripheral> {
        self.0.clone()
    }
}

pub struct FakeLink(Arc<FakePeripheral>);

impl Transport for FakeTransport {
    type Link = FakeLink;

    async fn connect(&self, _address: BDAddr) -> Result<Connected<FakeLink>, Error> {
        let notifications = if self.0.subscribe_fails {
            Err(Error::NotificationSubscribeFailed("unreachable".to_string()))
        } else {
            let (tx, rx) = mpsc::channel(8);
            *self.0.notifier.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
            Ok(rx)
        };
        Ok(Connected {
            link: FakeLink(self.0.clone()),
            name: Some(DEVICE_NAME.to_string()),
            notifications,
        })
    }
}

impl Link for FakeLink {
    async fn write(&self, data: &[u8]) -> Result<(), Error> {
        self.0
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data.to_vec());

        if data == b"TEMP\n" {
            if let (Some(tx), Some((delay, payload))) = (self.0.notifier(), self.0.reply) {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(payload.to_vec()).await;
                });
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.0
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.0.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
