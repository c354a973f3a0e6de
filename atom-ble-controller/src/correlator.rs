//! Request/response correlation over a notify characteristic
//!
//! The peripheral has no request ids: a reply is simply the next
//! notification. So at most one request may wait at a time, and a
//! notification that arrives while nobody waits is not a reply to anything.
//!
//! The waiter is registered *before* the command is written. A reply that
//! lands before the caller starts waiting sits in the one-shot channel.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitingResponse,
}

/// What happened to a notification handed to [`Correlator::deliver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Released the waiting request
    Claimed,
    /// Nobody was waiting; the caller should surface the text
    Unsolicited(String),
}

enum Slot {
    Idle,
    Awaiting {
        id: u64,
        tx: oneshot::Sender<String>,
    },
}

struct Inner {
    slot: Slot,
    next_id: u64,
}

pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: Slot::Idle,
                next_id: 1,
            }),
        }
    }

    // Nothing panics while holding the lock, but a poisoned slot is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> State {
        match self.lock().slot {
            Slot::Idle => State::Idle,
            Slot::Awaiting { .. } => State::AwaitingResponse,
        }
    }

    /// Register a waiter. Fails if one is already registered.
    pub fn begin(&self) -> Result<Pending<'_>, Error> {
        let mut inner = self.lock();
        if let Slot::Awaiting { .. } = inner.slot {
            return Err(Error::RequestPending);
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let (tx, rx) = oneshot::channel();
        inner.slot = Slot::Awaiting { id, tx };
        log::debug!("correlator: request {id} awaiting response");

        Ok(Pending {
            correlator: self,
            id,
            rx,
        })
    }

    /// Hand a raw notification to the waiter, if there is one
    ///
    /// The slot is emptied on the first delivery, so a burst of notifications
    /// releases the waiter exactly once and the rest come back unsolicited.
    pub fn deliver(&self, payload: &[u8]) -> Delivery {
        let text = atom_proto::decode_notification(payload);

        let slot = std::mem::replace(&mut self.lock().slot, Slot::Idle);
        match slot {
            Slot::Awaiting { id, tx } => match tx.send(text) {
                Ok(()) => {
                    log::debug!("correlator: request {id} answered");
                    Delivery::Claimed
                }
                Err(text) => Delivery::Unsolicited(text),
            },
            Slot::Idle => Delivery::Unsolicited(text),
        }
    }

    /// Drop the outstanding waiter, if any; it resolves with `ConnectionClosed`
    pub fn abort(&self) -> bool {
        let slot = std::mem::replace(&mut self.lock().slot, Slot::Idle);
        match slot {
            Slot::Awaiting { id, .. } => {
                log::debug!("correlator: request {id} aborted");
                true
            }
            Slot::Idle => false,
        }
    }

    /// Register, run `transmit`, then wait for the reply
    ///
    /// If `transmit` fails its error is returned and the correlator is idle
    /// again.
    pub async fn request<F>(&self, timeout: Duration, transmit: F) -> Result<String, Error>
    where
        F: Future<Output = Result<(), Error>>,
    {
        let pending = self.begin()?;
        transmit.await?;
        pending.wait(timeout).await
    }

    /// Reset the slot if it still belongs to request `id`
    fn release(&self, id: u64) -> bool {
        let mut inner = self.lock();
        match inner.slot {
            Slot::Awaiting { id: current, .. } if current == id => {
                inner.slot = Slot::Idle;
                true
            }
            _ => false,
        }
    }
}

/// A registered waiter. Dropping it returns the correlator to `Idle`.
pub struct Pending<'a> {
    correlator: &'a Correlator,
    id: u64,
    rx: oneshot::Receiver<String>,
}

impl Pending<'_> {
    /// Wait for the reply or for `timeout` to elapse, whichever comes first
    pub async fn wait(mut self, timeout: Duration) -> Result<String, Error> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                if self.correlator.release(self.id) {
                    log::debug!("correlator: request {} timed out", self.id);
                    return Err(Error::ResponseTimeout);
                }
                // The slot was emptied after the timer fired: either a reply
                // got in just before we reclaimed it, or the request was aborted.
                self.rx.try_recv().map_err(|_| Error::ConnectionClosed)
            }
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.correlator.release(self.id);
    }
}
