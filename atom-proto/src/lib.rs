//! Atom wire protocol - ASCII command lines sent over the UART RX characteristic
//!
//! Every command is a single line of text terminated by `\n`. The peripheral
//! splits its input on newlines, there is no other framing.

use std::fmt;
use std::str::FromStr;

pub mod ble;

/// Temperature query. The peripheral answers with one notification.
pub const TEMP: &str = "TEMP";

/// Rejected before anything is written to the peripheral
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidCommand {
    #[error("unknown color {0:?}, expected one of RED, GREEN, BLUE, WHITE, OFF")]
    UnknownPreset(String),
    #[error("{channel} value {value} is out of range (0-255)")]
    ChannelOutOfRange { channel: Channel, value: i64 },
    #[error("{channel} value {input:?} is not a number")]
    NotANumber { channel: Channel, input: String },
}

/// LED color presets understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Red,
    Green,
    Blue,
    White,
    Off,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Red,
        Preset::Green,
        Preset::Blue,
        Preset::White,
        Preset::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Red => "RED",
            Preset::Green => "GREEN",
            Preset::Blue => "BLUE",
            Preset::White => "WHITE",
            Preset::Off => "OFF",
        }
    }
}

impl FromStr for Preset {
    type Err = InvalidCommand;

    /// Only the exact uppercase names are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| InvalidCommand::UnknownPreset(s.to_string()))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One color channel of an RGB command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    R,
    G,
    B,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::R => "R",
            Channel::G => "G",
            Channel::B => "B",
        };
        f.write_str(name)
    }
}

/// Validate a channel value coming from an integer source
pub fn check_channel(channel: Channel, value: i64) -> Result<u8, InvalidCommand> {
    u8::try_from(value).map_err(|_| InvalidCommand::ChannelOutOfRange { channel, value })
}

/// Parse user input (surrounding whitespace allowed) into a channel value
pub fn parse_channel(channel: Channel, input: &str) -> Result<u8, InvalidCommand> {
    let trimmed = input.trim();
    let value: i64 = trimmed.parse().map_err(|_| InvalidCommand::NotANumber {
        channel,
        input: trimmed.to_string(),
    })?;
    check_channel(channel, value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A command that can be sent to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Preset(Preset),
    Rgb(Rgb),
    Temperature,
}

impl Command {
    /// Command text without the line terminator
    pub fn text(&self) -> String {
        match self {
            Command::Preset(p) => p.as_str().to_string(),
            Command::Rgb(Rgb { r, g, b }) => format!("RGB {r} {g} {b}"),
            Command::Temperature => TEMP.to_string(),
        }
    }

    /// Bytes to write to the RX characteristic
    pub fn encode(&self) -> Vec<u8> {
        encode_line(&self.text())
    }

    /// True when the peripheral answers with exactly one notification
    pub fn expects_response(&self) -> bool {
        matches!(self, Command::Temperature)
    }
}

impl From<Preset> for Command {
    fn from(p: Preset) -> Self {
        Command::Preset(p)
    }
}

impl From<Rgb> for Command {
    fn from(rgb: Rgb) -> Self {
        Command::Rgb(rgb)
    }
}

/// Append `\n` unless the text is already newline terminated
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        buf.push(b'\n');
    }
    buf
}

/// Decode a notification payload for display
///
/// The firmware only sends ASCII; anything else is replaced rather than
/// rejected. Trailing whitespace (the line terminator) is dropped.
pub fn decode_notification(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim_end().to_string()
}
