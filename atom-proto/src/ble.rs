//! BLE GATT constants for the Atom UART service
//!
//! The peripheral exposes the Nordic UART Service. The client writes command
//! lines to RX and receives replies as notifications on TX.

use uuid::Uuid;

/// UART Service UUID: 6E400001-B5A3-F393-E0A9-E50E24DCCA9E
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// UART RX Characteristic UUID (client writes here, without response)
pub const RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);

/// UART TX Characteristic UUID (peripheral notifies here)
pub const TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);
