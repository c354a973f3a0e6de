use std::time::Duration;

/// How long to scan for the peripheral before giving up
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a correlated request waits for its notification
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub scan_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl Config {
    /// Defaults, overridden by `ATOM_SCAN_SECS` and `ATOM_RESPONSE_TIMEOUT_MS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            scan_timeout: read_u64(&lookup, "ATOM_SCAN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.scan_timeout),
            response_timeout: read_u64(&lookup, "ATOM_RESPONSE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.response_timeout),
        }
    }
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            log::warn!("ignoring {key}={raw:?}, expected a positive integer");
            None
        }
    }
}
