//! Persisted device configuration.

use heapless::String;

pub const SSID_BYTES: usize = 32;
pub const PASSWORD_BYTES: usize = 64;
pub const SERVER_BYTES: usize = 128;
pub const API_KEY_BYTES: usize = 128;

pub const DEFAULT_SERVER_PORT: i32 = 80;
pub const DEFAULT_REFRESH_RATE_SECS: u64 = 60;

/// Settings captured by the setup portal and read once per boot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Configuration {
    pub ssid: String<SSID_BYTES>,
    pub password: String<PASSWORD_BYTES>,
    pub server: String<SERVER_BYTES>,
    pub port: i32,
    pub refresh_rate_secs: u64,
    pub api_key: String<API_KEY_BYTES>,
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            server: String::new(),
            port: DEFAULT_SERVER_PORT,
            refresh_rate_secs: DEFAULT_REFRESH_RATE_SECS,
            api_key: String::new(),
        }
    }

    /// A configuration is usable only with both a network and a server.
    pub fn is_valid(&self) -> bool {
        !self.ssid.is_empty() && !self.server.is_empty()
    }

    /// Port as a TCP port number, `None` when the stored value is out of range.
    pub fn tcp_port(&self) -> Option<u16> {
        u16::try_from(self.port).ok()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Abstract configuration persistence backend.
pub trait ConfigStore {
    type Error: core::fmt::Debug;

    /// Returns `Ok(None)` when nothing (or nothing usable) is stored.
    fn load(&mut self) -> Result<Option<Configuration>, Self::Error>;
    fn save(&mut self, config: &Configuration) -> Result<(), Self::Error>;
    fn clear(&mut self) -> Result<(), Self::Error>;
}

/// Unit selector of the refresh rate form field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefreshUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl RefreshUnit {
    /// Unknown selectors count as seconds.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "m" => Self::Minutes,
            "h" => Self::Hours,
            "d" => Self::Days,
            _ => Self::Seconds,
        }
    }

    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }
}

/// Converts the form's rate value into the stored interval.
///
/// The value is bumped by one before scaling, so `0 m` means one minute.
pub fn refresh_rate_seconds(value: i64, unit: RefreshUnit) -> u64 {
    let value = value.max(0) as u64;
    value.saturating_add(1).saturating_mul(unit.multiplier())
}
