//! Atom BLE Controller
//!
//! BLE client for the Atom LED/temperature peripheral: connects over the
//! UART service, writes command lines and matches a query with the
//! notification that answers it.
//!
//! # Example
//!
//! ```ignore
//! use atom_ble_controller::{BtleplugTransport, Config, Session, parse_address};
//! use atom_proto::{Command, Preset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let (mut session, _unsolicited) =
//!         Session::new(BtleplugTransport::new(config.scan_timeout), config);
//!
//!     session.connect(parse_address("AA:BB:CC:DD:EE:FF")?).await?;
//!     session.send(&Command::Preset(Preset::Red)).await?;
//!     println!("{}", session.query_temperature().await?);
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod ble;
pub mod config;
pub mod correlator;
mod error;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use address::parse_address;
pub use ble::BtleplugTransport;
pub use config::Config;
pub use error::Error;
pub use session::{ConnectInfo, Reply, Session};
