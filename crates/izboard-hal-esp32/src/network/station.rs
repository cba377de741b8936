use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiError};
use izboard_core::lifecycle::NetworkJoin;
use log::{debug, info};

/// Budget for the association itself.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// DHCP is polled this many times before giving up.
const ADDRESS_POLLS: u32 = 20;
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum JoinError {
    Wifi(WifiError),
    ConnectTimeout,
    NoAddress,
}

/// Joins the configured network with a DHCP-configured stack.
///
/// Borrows the controller so it can be switched to access-point mode later.
pub struct StationJoin<'a, 'd> {
    controller: &'a mut WifiController<'d>,
    stack: Stack<'d>,
}

impl<'a, 'd> StationJoin<'a, 'd> {
    pub fn new(controller: &'a mut WifiController<'d>, stack: Stack<'d>) -> Self {
        Self { controller, stack }
    }
}

impl NetworkJoin for StationJoin<'_, '_> {
    type Error = JoinError;

    async fn join(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        let mode = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(ssid.into())
                .with_password(password.into()),
        );
        self.controller.set_config(&mode).map_err(JoinError::Wifi)?;

        if !self.controller.is_started().unwrap_or(false) {
            self.controller.start_async().await.map_err(JoinError::Wifi)?;
        }

        self.controller
            .connect_async()
            .with_timeout(CONNECT_TIMEOUT)
            .await
            .map_err(|_| JoinError::ConnectTimeout)?
            .map_err(JoinError::Wifi)?;
        info!("wifi: associated with {}", ssid);

        for attempt in 0..ADDRESS_POLLS {
            if self.stack.is_config_up() {
                if let Some(config) = self.stack.config_v4() {
                    info!("wifi: address {}", config.address);
                }
                return Ok(());
            }
            debug!("wifi: waiting for address ({}/{})", attempt + 1, ADDRESS_POLLS);
            Timer::after(ADDRESS_POLL_INTERVAL).await;
        }

        let _ = self.controller.disconnect_async().await;
        Err(JoinError::NoAddress)
    }
}
