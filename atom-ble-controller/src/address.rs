use btleplug::api::BDAddr;

use crate::Error;

/// Parse a Bluetooth device address
///
/// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` and `AABBCCDDEEFF`, in
/// either case. Separators are stripped first, so what is left must be
/// exactly 12 hex digits.
pub fn parse_address(s: &str) -> Result<BDAddr, Error> {
    let invalid = || Error::InvalidAddressFormat(s.to_string());

    let hex: String = s.trim().chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let mut bytes = [0u8; 6];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(BDAddr::from(bytes))
}
