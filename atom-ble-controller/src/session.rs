//! Session: owns at most one connection to a peripheral
//!
//! All connection state lives here instead of in globals. It is created by
//! [`Session::connect`] and torn down by [`Session::disconnect`].

use std::sync::Arc;
use std::time::Duration;

use btleplug::api::BDAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use atom_proto::Command;

use crate::Error;
use crate::config::Config;
use crate::correlator::{Correlator, Delivery, Pending};
use crate::transport::{Link, Transport};

/// What the caller gets to report after a successful connect
#[derive(Debug)]
pub struct ConnectInfo {
    pub address: BDAddr,
    pub name: Option<String>,
    /// `Err` when notifications could not be enabled; writes still work
    pub notifications: Result<(), Error>,
}

struct Connection<L> {
    link: L,
    correlator: Arc<Correlator>,
    pump: Option<JoinHandle<()>>,
}

impl<L: Link> Connection<L> {
    async fn close(mut self) -> Result<(), Error> {
        // a pending request must not outlive the connection
        self.correlator.abort();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.link.disconnect().await
    }
}

impl<L> Drop for Connection<L> {
    fn drop(&mut self) {
        if let Some(pump) = &self.pump {
            pump.abort();
        }
    }
}

pub struct Session<T: Transport> {
    transport: T,
    config: Config,
    connection: Option<Connection<T::Link>>,
    unsolicited: mpsc::UnboundedSender<String>,
}

impl<T: Transport> Session<T> {
    /// The receiver yields notifications that arrived while no request was
    /// waiting for one.
    pub fn new(transport: T, config: Config) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            transport,
            config,
            connection: None,
            unsolicited: tx,
        };
        (session, rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> Result<&Connection<T::Link>, Error> {
        self.connection.as_ref().ok_or(Error::NotConnected)
    }

    pub async fn connect(&mut self, address: BDAddr) -> Result<ConnectInfo, Error> {
        if self.connection.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let connected = self.transport.connect(address).await?;
        let correlator = Arc::new(Correlator::new());

        let (pump, notifications) = match connected.notifications {
            Ok(rx) => {
                let pump = spawn_pump(rx, correlator.clone(), self.unsolicited.clone());
                (Some(pump), Ok(()))
            }
            Err(e) => (None, Err(e)),
        };

        log::info!("connected to {address}");
        self.connection = Some(Connection {
            link: connected.link,
            correlator,
            pump,
        });

        Ok(ConnectInfo {
            address,
            name: connected.name,
            notifications,
        })
    }

    /// Abort any pending request, unsubscribe and release the link
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        let connection = self.connection.take().ok_or(Error::NotConnected)?;
        connection.close().await?;
        log::info!("disconnected");
        Ok(())
    }

    /// Write a command without waiting for any reply
    pub async fn send(&self, command: &Command) -> Result<(), Error> {
        let connection = self.connection()?;
        connection.link.write(&command.encode()).await?;
        log::debug!("sent {}", command.text());
        Ok(())
    }

    /// Write a command and wait for the next notification as its reply
    ///
    /// Only meaningful for commands where [`Command::expects_response`] holds.
    /// Fails with `RequestPending` if another request is still waiting.
    pub async fn request(&self, command: &Command) -> Result<String, Error> {
        let connection = self.connection()?;
        let bytes = command.encode();
        connection
            .correlator
            .request(self.config.response_timeout, connection.link.write(&bytes))
            .await
    }

    /// Register for the reply and write the command, without waiting yet
    ///
    /// Once this returns the command is on the air; [`Reply::wait`] then
    /// waits for the answer with the configured response timeout.
    pub async fn begin_request(&self, command: &Command) -> Result<Reply<'_>, Error> {
        let connection = self.connection()?;
        let pending = connection.correlator.begin()?;
        connection.link.write(&command.encode()).await?;
        log::debug!("sent {}", command.text());
        Ok(Reply {
            pending,
            timeout: self.config.response_timeout,
        })
    }

    pub async fn query_temperature(&self) -> Result<String, Error> {
        self.request(&Command::Temperature).await
    }
}

/// A request that has been written and is waiting for its notification
pub struct Reply<'a> {
    pending: Pending<'a>,
    timeout: Duration,
}

impl Reply<'_> {
    pub async fn wait(self) -> Result<String, Error> {
        self.pending.wait(self.timeout).await
    }
}

/// Feed notifications to the correlator; whatever it doesn't claim is unsolicited
fn spawn_pump(
    mut notifications: mpsc::Receiver<Vec<u8>>,
    correlator: Arc<Correlator>,
    unsolicited: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = notifications.recv().await {
            if let Delivery::Unsolicited(text) = correlator.deliver(&payload) {
                log::debug!("unsolicited notification: {text}");
                let _ = unsolicited.send(text);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse_address;
    use crate::testing::{FakePeripheral, FakeTransport};
    use atom_proto::{Channel, Preset, Rgb, parse_channel};
    use tokio::time::Instant;

    fn session(peripheral: FakePeripheral) -> (
        Session<FakeTransport>,
        mpsc::UnboundedReceiver<String>,
        Arc<FakePeripheral>,
    ) {
        let transport = FakeTransport::new(peripheral);
        let peripheral = transport.peripheral();
        let (session, unsolicited) = Session::new(transport, Config::default());
        (session, unsolicited, peripheral)
    }

    fn address() -> BDAddr {
        parse_address("AA:BB:CC:DD:EE:FF").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn preset_is_written_as_line() {
        let (mut session, _, peripheral) = session(FakePeripheral::default());

        let info = session.connect(address()).await.unwrap();
        assert_eq!(info.address, address());
        assert_eq!(info.name.as_deref(), Some("ATOM"));
        assert!(info.notifications.is_ok());

        let preset: Preset = "RED".parse().unwrap();
        session.send(&preset.into()).await.unwrap();
        assert_eq!(peripheral.writes(), vec![b"RED\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn rgb_is_written_as_line() {
        let (mut session, _, peripheral) = session(FakePeripheral::default());
        session.connect(address()).await.unwrap();

        session.send(&Rgb::new(10, 20, 255).into()).await.unwrap();
        assert_eq!(peripheral.writes(), vec![b"RGB 10 20 255\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_rgb_never_reaches_the_link() {
        let (mut session, _, peripheral) = session(FakePeripheral::default());
        session.connect(address()).await.unwrap();

        let result = async {
            let g = parse_channel(Channel::G, "300")?;
            session.send(&Rgb::new(0, g, 0).into()).await?;
            Ok::<_, Error>(())
        }
        .await;

        assert!(matches!(result, Err(Error::InvalidCommand(_))));
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_reply() {
        let (mut session, _, peripheral) = session(FakePeripheral::answering(
            Duration::from_secs(2),
            b"TEMP 23.5\n",
        ));
        session.connect(address()).await.unwrap();

        let start = Instant::now();
        assert_eq!(session.query_temperature().await.unwrap(), "TEMP 23.5");
        assert!(start.elapsed() < session.config().response_timeout);
        assert_eq!(peripheral.writes(), vec![b"TEMP\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn begin_request_writes_before_waiting() {
        let (mut session, _, peripheral) = session(FakePeripheral::answering(
            Duration::from_secs(1),
            b"TEMP 21.0\n",
        ));
        session.connect(address()).await.unwrap();

        let reply = session.begin_request(&Command::Temperature).await.unwrap();
        assert_eq!(peripheral.writes(), vec![b"TEMP\n".to_vec()]);

        // only one request may wait at a time
        assert!(matches!(
            session.begin_request(&Command::Temperature).await,
            Err(Error::RequestPending)
        ));
        assert_eq!(peripheral.writes().len(), 1);

        assert_eq!(reply.wait().await.unwrap(), "TEMP 21.0");
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_timeout() {
        let (mut session, _, _) = session(FakePeripheral::default());
        session.connect(address()).await.unwrap();

        let start = Instant::now();
        let result = session.query_temperature().await;
        assert!(matches!(result, Err(Error::ResponseTimeout)));
        assert!(start.elapsed() >= Duration::from_secs(5));

        // still usable afterwards
        session.send(&Preset::Off.into()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_is_unsolicited() {
        let (mut session, mut unsolicited, _) = session(FakePeripheral::answering(
            Duration::from_secs(6),
            b"TEMP 24.0\n",
        ));
        session.connect(address()).await.unwrap();

        assert!(matches!(
            session.query_temperature().await,
            Err(Error::ResponseTimeout)
        ));
        assert_eq!(unsolicited.recv().await.unwrap(), "TEMP 24.0");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_notifications_are_unsolicited() {
        let (mut session, mut unsolicited, peripheral) = session(FakePeripheral::default());
        session.connect(address()).await.unwrap();

        assert!(peripheral.notify(b"BUTTON\r\n").await);
        assert_eq!(unsolicited.recv().await.unwrap(), "BUTTON");

        // and it is not taken as the answer to the next query
        assert!(matches!(
            session.query_temperature().await,
            Err(Error::ResponseTimeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unsolicited_receiver_may_be_dropped() {
        let (mut session, unsolicited, peripheral) = session(FakePeripheral::answering(
            Duration::from_secs(1),
            b"TEMP 22.0\n",
        ));
        drop(unsolicited);
        session.connect(address()).await.unwrap();

        assert!(peripheral.notify(b"BUTTON\n").await);
        // let the pump see it while idle
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.query_temperature().await.unwrap(), "TEMP 22.0");
    }

    #[tokio::test(start_paused = true)]
    async fn operations_need_a_connection() {
        let (mut session, _, peripheral) = session(FakePeripheral::default());

        assert!(matches!(
            session.send(&Preset::Red.into()).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.query_temperature().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(session.disconnect().await, Err(Error::NotConnected)));
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice() {
        let (mut session, _, _) = session(FakePeripheral::default());
        session.connect(address()).await.unwrap();
        assert!(matches!(
            session.connect(address()).await,
            Err(Error::AlreadyConnected)
        ));
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_and_reconnect() {
        let (mut session, _, peripheral) = session(FakePeripheral::default());

        session.connect(address()).await.unwrap();
        session.disconnect().await.unwrap();
        assert!(!session.is_connected());
        assert_eq!(peripheral.disconnects(), 1);
        assert!(matches!(
            session.send(&Preset::Red.into()).await,
            Err(Error::NotConnected)
        ));

        session.connect(address()).await.unwrap();
        session.send(&Preset::Blue.into()).await.unwrap();
        assert_eq!(peripheral.writes(), vec![b"BLUE\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_keeps_connection() {
        let (mut session, _, peripheral) = session(FakePeripheral {
            subscribe_fails: true,
            ..Default::default()
        });

        let info = session.connect(address()).await.unwrap();
        assert!(matches!(
            info.notifications,
            Err(Error::NotificationSubscribeFailed(_))
        ));

        session.send(&Preset::White.into()).await.unwrap();
        assert!(matches!(
            session.query_temperature().await,
            Err(Error::ResponseTimeout)
        ));
        assert_eq!(
            peripheral.writes(),
            vec![b"WHITE\n".to_vec(), b"TEMP\n".to_vec()]
        );
    }
}
