//! One-shot LED control for the Atom
//!
//! Connects to the device, writes a single `RGB r g b` command and exits.
//!
//! Usage:
//!   atom-led --address AA:BB:CC:DD:EE:FF --red 255 --green 64 --blue 0

use std::process::ExitCode;

use atom_ble_controller::{BtleplugTransport, Config, Error, Session, parse_address};
use atom_proto::{Channel, Command, InvalidCommand, Rgb, parse_channel};
use btleplug::api::BDAddr;
use clap::Parser;

#[derive(Parser)]
#[command(name = "atom-led")]
#[command(about = "Set the Atom LED color over BLE")]
struct Cli {
    /// Device address, e.g. AA:BB:CC:DD:EE:FF
    #[arg(short, long, value_parser = parse_address)]
    address: BDAddr,
    /// Red (0-255)
    #[arg(short, long, default_value = "0", value_parser = red)]
    red: u8,
    /// Green (0-255)
    #[arg(short, long, default_value = "0", value_parser = green)]
    green: u8,
    /// Blue (0-255)
    #[arg(short, long, default_value = "0", value_parser = blue)]
    blue: u8,
}

fn red(s: &str) -> Result<u8, InvalidCommand> {
    parse_channel(Channel::R, s)
}

fn green(s: &str) -> Result<u8, InvalidCommand> {
    parse_channel(Channel::G, s)
}

fn blue(s: &str) -> Result<u8, InvalidCommand> {
    parse_channel(Channel::B, s)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::from_env();
    let (mut session, _) =
        Session::new(BtleplugTransport::new(config.scan_timeout), config);

    println!("Connecting to {}...", cli.address);
    let info = session.connect(cli.address).await?;
    if let Some(name) = &info.name {
        println!("Connected to: {name}");
    }

    let command = Command::Rgb(Rgb::new(cli.red, cli.green, cli.blue));
    let sent = session.send(&command).await;

    if let Err(e) = session.disconnect().await {
        log::warn!("{e}");
    }

    sent?;
    println!("Command sent: {}", command.text());
    Ok(())
}
