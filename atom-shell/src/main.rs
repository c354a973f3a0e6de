//! Interactive shell for the Atom
//!
//! Usage:
//!   atom-shell --address AA:BB:CC:DD:EE:FF
//!
//! Presents a numbered menu to connect, set the LED and read the
//! temperature. Notifications that arrive while no query is waiting are
//! printed as they come in.

mod menu;

use std::io::Write;

use atom_ble_controller::transport::Transport;
use atom_ble_controller::{BtleplugTransport, Config, Error, Session, parse_address};
use atom_proto::{Channel, Command, Preset, Rgb, parse_channel};
use btleplug::api::BDAddr;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use menu::MenuChoice;

const PROMPT: &str = "Select> ";

#[derive(Parser)]
#[command(name = "atom-shell")]
#[command(about = "Interactive BLE shell for the Atom LED and temperature sensor")]
struct Cli {
    /// Device address, e.g. AA:BB:CC:DD:EE:FF
    #[arg(short, long, value_parser = parse_address)]
    address: BDAddr,
}

type ActionResult = Result<(), Box<dyn std::error::Error>>;

/// Line input plus the writer everything is printed to
struct Console<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R: AsyncBufRead + Unpin, W: Write> Console<R, W> {
    fn new(input: R, out: W) -> Self {
        Self {
            lines: input.lines(),
            out,
        }
    }

    /// `None` on end of input
    async fn prompt(&mut self, text: &str) -> std::io::Result<Option<String>> {
        write!(self.out, "{text}")?;
        self.out.flush()?;
        self.lines.next_line().await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = Config::from_env();
    let (session, unsolicited) =
        Session::new(BtleplugTransport::new(config.scan_timeout), config);
    tokio::spawn(print_unsolicited(unsolicited, std::io::stdout()));

    let mut console = Console::new(BufReader::new(tokio::io::stdin()), std::io::stdout());
    run(session, cli.address, &mut console).await?;
    Ok(())
}

async fn print_unsolicited(mut unsolicited: mpsc::UnboundedReceiver<String>, mut out: impl Write) {
    while let Some(text) = unsolicited.recv().await {
        let _ = write!(out, "\n[Notification] {text}\n{PROMPT}");
        let _ = out.flush();
    }
}

async fn run<T, R, W>(
    mut session: Session<T>,
    address: BDAddr,
    console: &mut Console<R, W>,
) -> std::io::Result<()>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(console.out, "BLE ATOM Control Shell")?;
    writeln!(console.out, "======================")?;
    writeln!(console.out)?;

    loop {
        writeln!(console.out)?;
        write!(console.out, "{}", menu::render())?;

        let Some(input) = console.prompt(PROMPT).await? else {
            // stdin closed, leave as if Exit was chosen
            writeln!(console.out)?;
            return shutdown(&mut session, console).await;
        };
        if input.trim().is_empty() {
            continue;
        }

        let Some(choice) = MenuChoice::parse(&input) else {
            writeln!(console.out, "Invalid command.")?;
            continue;
        };

        let result = match choice {
            MenuChoice::Connect => connect(&mut session, address, console).await,
            MenuChoice::Disconnect => disconnect(&mut session, console).await,
            MenuChoice::SetPreset => set_preset(&session, console).await,
            MenuChoice::SetRgb => set_rgb(&session, console).await,
            MenuChoice::GetTemperature => get_temperature(&session, console).await,
            MenuChoice::Exit => return shutdown(&mut session, console).await,
        };

        if let Err(e) = result {
            writeln!(console.out, "Error: {e}")?;
        }
    }
}

async fn shutdown<T, R, W>(session: &mut Session<T>, console: &mut Console<R, W>) -> std::io::Result<()>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if session.is_connected() {
        if let Err(e) = disconnect(session, console).await {
            writeln!(console.out, "Error: {e}")?;
        }
    }
    writeln!(console.out, "Goodbye!")
}

async fn connect<T: Transport, R, W: Write>(
    session: &mut Session<T>,
    address: BDAddr,
    console: &mut Console<R, W>,
) -> ActionResult {
    writeln!(console.out, "Connecting to {address}...")?;
    let info = session.connect(address).await?;

    if let Some(name) = &info.name {
        writeln!(console.out, "Connected to: {name}")?;
    }
    match &info.notifications {
        Ok(()) => writeln!(console.out, "Notifications enabled.")?,
        Err(e) => writeln!(console.out, "Warning: {e}")?,
    }
    writeln!(console.out, "Connection established successfully!")?;
    Ok(())
}

async fn disconnect<T: Transport, R, W: Write>(
    session: &mut Session<T>,
    console: &mut Console<R, W>,
) -> ActionResult {
    match session.disconnect().await {
        Ok(()) => writeln!(console.out, "Disconnected.")?,
        Err(Error::NotConnected) => writeln!(console.out, "Not connected.")?,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn send<T: Transport, R, W: Write>(
    session: &Session<T>,
    command: Command,
    console: &mut Console<R, W>,
) -> ActionResult {
    session.send(&command).await?;
    writeln!(console.out, "Command sent: {}", command.text())?;
    Ok(())
}

async fn set_preset<T, R, W>(session: &Session<T>, console: &mut Console<R, W>) -> ActionResult
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(console.out, "Available colors: RED, GREEN, BLUE, WHITE, OFF")?;
    let color = console
        .prompt("Enter color: ")
        .await?
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_default();

    if color.is_empty() {
        writeln!(console.out, "Invalid input.")?;
        return Ok(());
    }

    let Ok(preset) = color.parse::<Preset>() else {
        writeln!(console.out, "Invalid color.")?;
        return Ok(());
    };

    send(session, preset.into(), console).await
}

async fn set_rgb<T, R, W>(session: &Session<T>, console: &mut Console<R, W>) -> ActionResult
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut values = [0u8; 3];
    for (value, channel) in values.iter_mut().zip([Channel::R, Channel::G, Channel::B]) {
        let input = console
            .prompt(&format!("Enter {channel} (0-255): "))
            .await?
            .unwrap_or_default();

        match parse_channel(channel, &input) {
            Ok(v) => *value = v,
            Err(_) => {
                writeln!(console.out, "Invalid {channel} value.")?;
                return Ok(());
            }
        }
    }

    let [r, g, b] = values;
    send(session, Rgb::new(r, g, b).into(), console).await
}

async fn get_temperature<T: Transport, R, W: Write>(
    session: &Session<T>,
    console: &mut Console<R, W>,
) -> ActionResult {
    let command = Command::Temperature;
    let reply = session.begin_request(&command).await?;

    writeln!(console.out, "Command sent: {}", command.text())?;
    writeln!(console.out, "Waiting for response...")?;
    console.out.flush()?;

    match reply.wait().await {
        Ok(text) => writeln!(console.out, "Result: {text}")?,
        Err(Error::ResponseTimeout) => writeln!(
            console.out,
            "Timeout: No response received. Check connection."
        )?,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atom_ble_controller::testing::{FakePeripheral, FakeTransport};
    use std::sync::Arc;
    use std::time::Duration;

    /// Run the shell over `input` and return its transcript
    async fn transcript(peripheral: FakePeripheral, input: &str) -> (String, Arc<FakePeripheral>) {
        let transport = FakeTransport::new(peripheral);
        let peripheral = transport.peripheral();
        let (session, _unsolicited) = Session::new(transport, Config::default());

        let mut console = Console::new(input.as_bytes(), Vec::new());
        run(session, address(), &mut console).await.unwrap();
        (String::from_utf8(console.out).unwrap(), peripheral)
    }

    fn address() -> BDAddr {
        parse_address("AA:BB:CC:DD:EE:FF").unwrap()
    }

    #[test]
    fn cli_requires_valid_address() {
        let cli = Cli::try_parse_from(["atom-shell", "--address", "AABBCCDDEEFF"]).unwrap();
        assert_eq!(cli.address, address());

        assert!(Cli::try_parse_from(["atom-shell"]).is_err());
        assert!(Cli::try_parse_from(["atom-shell", "-a", "not-an-address"]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn banner_menu_and_unknown_input() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "\nbogus\n6\n").await;

        assert!(out.starts_with("BLE ATOM Control Shell\n"));
        assert!(out.contains("  3. Set LED (RED/GREEN/BLUE/WHITE/OFF)\n"));
        assert!(out.contains("Select> Invalid command.\n"));
        assert!(out.ends_with("Goodbye!\n"));
        assert!(peripheral.writes().is_empty());
        assert_eq!(peripheral.disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_and_set_preset() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "1\n3\n  green \n6\n").await;

        assert!(out.contains(
            "Connecting to AA:BB:CC:DD:EE:FF...\n\
             Connected to: ATOM\n\
             Notifications enabled.\n\
             Connection established successfully!\n"
        ));
        assert!(out.contains("Enter color: Command sent: GREEN\n"));
        assert!(out.contains("Disconnected.\nGoodbye!\n"));
        assert_eq!(peripheral.writes(), vec![b"GREEN\n".to_vec()]);
        assert_eq!(peripheral.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_preset_is_not_sent() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "1\n3\npurple\n3\n\n").await;

        assert!(out.contains("Invalid color.\n"));
        assert!(out.contains("Invalid input.\n"));
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rgb_entry() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "1\n4\n255\n 64\n0\n").await;

        assert!(out.contains("Enter R (0-255): Enter G (0-255): Enter B (0-255): "));
        assert!(out.contains("Command sent: RGB 255 64 0\n"));
        assert_eq!(peripheral.writes(), vec![b"RGB 255 64 0\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_rgb_entry_writes_nothing() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "1\n4\n10\n300\n4\nx\n").await;

        assert!(out.contains("Enter G (0-255): Invalid G value.\n"));
        assert!(out.contains("Enter R (0-255): Invalid R value.\n"));
        // the B prompt is never reached
        assert!(!out.contains("Enter B"));
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_result() {
        let peripheral = FakePeripheral::answering(Duration::from_secs(2), b"TEMP 23.5\n");
        let (out, peripheral) = transcript(peripheral, "1\n5\n6\n").await;

        assert!(out.contains(
            "Command sent: TEMP\n\
             Waiting for response...\n\
             Result: TEMP 23.5\n"
        ));
        assert_eq!(peripheral.writes(), vec![b"TEMP\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_timeout() {
        let (out, _) = transcript(FakePeripheral::default(), "1\n5\n").await;

        assert!(out.contains(
            "Command sent: TEMP\n\
             Waiting for response...\n\
             Timeout: No response received. Check connection.\n"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn not_connected() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "2\n5\n3\nRED\n").await;

        assert!(out.contains("Select> Not connected.\n"));
        assert!(out.contains("Select> Error: not connected, please connect first\n"));
        assert!(!out.contains("Waiting for response..."));
        assert!(out.contains("Enter color: Error: not connected, please connect first\n"));
        assert!(peripheral.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_input_disconnects() {
        let (out, peripheral) = transcript(FakePeripheral::default(), "1\n").await;

        assert!(out.ends_with("Disconnected.\nGoodbye!\n"));
        assert_eq!(peripheral.disconnects(), 1);
    }

    #[tokio::test]
    async fn unsolicited_notifications_reprompt() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("BUTTON".to_string()).unwrap();
        drop(tx);

        let mut out = Vec::new();
        print_unsolicited(rx, &mut out).await;
        assert_eq!(String::from_utf8(out).unwrap(), "\n[Notification] BUTTON\nSelect> ");
    }
}
