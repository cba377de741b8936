//! Per-boot device lifecycle.
//!
//! One call to [`Device::run`] covers everything between power-up and the
//! point where the board either sleeps, restarts, or hands over to the setup
//! portal. Those three ends are returned as a [`Terminal`] so the caller can
//! perform them with its non-returning platform calls.

use core::fmt::Debug;

use embedded_hal::{delay::DelayNs, digital::InputPin};
use log::{error, info, warn};

use crate::{
    boot::{BootDecision, RESET_HOLD_MS, RESET_POLL_MS, decide, detect_reset_request},
    config::{ConfigStore, Configuration},
    frame::{BandBuffers, FrameGeometry},
    pipeline::{BandDisplay, Connector, fetch_frame, fetch_next_wait},
    schedule::WakeSchedule,
};

/// Station-mode association with the configured network.
pub trait NetworkJoin {
    type Error: Debug;

    /// Resolves once the link is up with an address, or fails after giving up.
    async fn join(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestartReason {
    FactoryReset,
    AllocationFailure,
}

/// How this boot ends.
#[derive(Debug)]
pub enum Terminal {
    Sleep(WakeSchedule),
    Restart(RestartReason),
    /// No usable configuration; the band buffers are handed on for the welcome screen.
    Provision(BandBuffers),
}

/// Capabilities owned by the lifecycle for the duration of one boot.
pub struct Device<S, P, T, N, C, D> {
    pub store: S,
    pub reset_pin: P,
    pub delay: T,
    pub network: N,
    pub connector: C,
    pub display: D,
    pub geometry: FrameGeometry,
}

impl<S, P, T, N, C, D> Device<S, P, T, N, C, D>
where
    S: ConfigStore,
    P: InputPin,
    T: DelayNs,
    N: NetworkJoin,
    C: Connector,
    D: BandDisplay,
{
    pub async fn run(&mut self) -> Terminal {
        let mut buffers = match BandBuffers::allocate(&self.geometry) {
            Ok(buffers) => buffers,
            Err(err) => {
                error!("boot: band buffers of {} bytes unavailable", err.requested);
                return Terminal::Restart(RestartReason::AllocationFailure);
            }
        };

        let reset_requested = detect_reset_request(
            &mut self.reset_pin,
            &mut self.delay,
            RESET_HOLD_MS,
            RESET_POLL_MS,
        );
        let config = if reset_requested {
            None
        } else {
            self.load_config()
        };

        match (decide(reset_requested, config.as_ref()), config) {
            (BootDecision::FactoryReset, _) => {
                self.factory_reset();
                Terminal::Restart(RestartReason::FactoryReset)
            }
            (BootDecision::Operate, Some(config)) => {
                Terminal::Sleep(self.operate(&config, &mut buffers).await)
            }
            _ => {
                info!("boot: no usable configuration; starting setup portal");
                Terminal::Provision(buffers)
            }
        }
    }

    fn load_config(&mut self) -> Option<Configuration> {
        match self.store.load() {
            Ok(Some(config)) if config.is_valid() => Some(config),
            Ok(_) => None,
            Err(err) => {
                warn!("store: load failed: {:?}", err);
                None
            }
        }
    }

    fn factory_reset(&mut self) {
        info!("boot: factory reset");
        if let Err(err) = self.store.clear() {
            warn!("store: clear failed: {:?}", err);
        }
    }

    async fn operate(&mut self, config: &Configuration, buffers: &mut BandBuffers) -> WakeSchedule {
        info!("boot: joining {}", config.ssid);
        if let Err(err) = self.network.join(&config.ssid, &config.password).await {
            warn!("boot: network join failed: {:?}", err);
            return WakeSchedule::after(config.refresh_rate_secs);
        }

        fetch_frame(
            &mut self.connector,
            &mut self.display,
            buffers,
            self.geometry,
            config,
        )
        .await;

        let next_wait = fetch_next_wait(&mut self.connector, config).await;
        WakeSchedule::resolve(next_wait, config.refresh_rate_secs)
    }
}
