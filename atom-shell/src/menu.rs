/// Menu entries, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Connect,
    Disconnect,
    SetPreset,
    SetRgb,
    GetTemperature,
    Exit,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 6] = [
        MenuChoice::Connect,
        MenuChoice::Disconnect,
        MenuChoice::SetPreset,
        MenuChoice::SetRgb,
        MenuChoice::GetTemperature,
        MenuChoice::Exit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuChoice::Connect => "Connect",
            MenuChoice::Disconnect => "Disconnect",
            MenuChoice::SetPreset => "Set LED (RED/GREEN/BLUE/WHITE/OFF)",
            MenuChoice::SetRgb => "Set LED (RGB)",
            MenuChoice::GetTemperature => "Get Temperature",
            MenuChoice::Exit => "Exit",
        }
    }

    /// Accepts the entry number or a short name (`temp`, `rgb`, `quit`, ...)
    pub fn parse(input: &str) -> Option<Self> {
        let choice = match input.trim().to_ascii_lowercase().as_str() {
            "1" | "connect" => MenuChoice::Connect,
            "2" | "disconnect" => MenuChoice::Disconnect,
            "3" | "preset" | "color" => MenuChoice::SetPreset,
            "4" | "rgb" => MenuChoice::SetRgb,
            "5" | "temp" | "temperature" => MenuChoice::GetTemperature,
            "6" | "exit" | "quit" => MenuChoice::Exit,
            _ => return None,
        };
        Some(choice)
    }
}

pub fn render() -> String {
    let mut out = String::from("Commands:\n");
    for (i, choice) in MenuChoice::ALL.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, choice.label()));
    }
    out
}
