//! Boot-cause handling: factory reset detection and the per-boot decision.

use embedded_hal::{delay::DelayNs, digital::InputPin};
use log::{info, warn};

use crate::config::Configuration;

/// How long the reset pin has to stay high after boot to wipe the device.
pub const RESET_HOLD_MS: u32 = 10_000;
/// Sampling period while the reset pin is held.
pub const RESET_POLL_MS: u32 = 10;

/// What this boot is going to do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootDecision {
    FactoryReset,
    NeedsProvisioning,
    Operate,
}

pub fn decide(reset_requested: bool, config: Option<&Configuration>) -> BootDecision {
    if reset_requested {
        return BootDecision::FactoryReset;
    }

    match config {
        Some(config) if config.is_valid() => BootDecision::Operate,
        _ => BootDecision::NeedsProvisioning,
    }
}

/// Returns `true` when the reset pin stays high for `hold_ms` from the first sample.
///
/// A low first sample returns immediately. Releasing the pin at any point
/// before the deadline (including the wake pulse itself) is not a request.
/// Read failures are treated as a released pin.
pub fn detect_reset_request<P, D>(pin: &mut P, delay: &mut D, hold_ms: u32, poll_ms: u32) -> bool
where
    P: InputPin,
    D: DelayNs,
{
    let poll_ms = poll_ms.max(1);
    let mut held_ms = 0u32;

    loop {
        match pin.is_high() {
            Ok(true) => {}
            Ok(false) => {
                if held_ms > 0 {
                    info!("boot: reset pin released after {}ms", held_ms);
                }
                return false;
            }
            Err(_) => {
                warn!("boot: reset pin read failed; assuming released");
                return false;
            }
        }

        if held_ms >= hold_ms {
            info!("boot: reset pin held for {}ms", held_ms);
            return true;
        }

        delay.delay_ms(poll_ms);
        held_ms = held_ms.saturating_add(poll_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingDelay, HeldPin};

    fn configured() -> Configuration {
        let mut config = Configuration::new();
        config.ssid.push_str("home").unwrap();
        config.server.push_str("10.0.0.2").unwrap();
        config
    }

    #[test]
    fn decision_follows_configuration_presence() {
        assert_eq!(decide(false, None), BootDecision::NeedsProvisioning);
        assert_eq!(decide(false, Some(&configured())), BootDecision::Operate);

        let mut no_server = configured();
        no_server.server.clear();
        assert_eq!(
            decide(false, Some(&no_server)),
            BootDecision::NeedsProvisioning
        );
    }

    #[test]
    fn reset_request_wins_over_configuration() {
        assert_eq!(decide(true, Some(&configured())), BootDecision::FactoryReset);
        assert_eq!(decide(true, None), BootDecision::FactoryReset);
    }

    #[test]
    fn released_pin_returns_without_waiting() {
        let mut pin = HeldPin::new(0);
        let mut delay = CountingDelay::default();
        assert!(!detect_reset_request(
            &mut pin,
            &mut delay,
            RESET_HOLD_MS,
            RESET_POLL_MS
        ));
        assert_eq!(delay.elapsed_ns, 0);
    }

    #[test]
    fn short_hold_is_not_a_reset() {
        // 9.99s high.
        let mut pin = HeldPin::new(RESET_HOLD_MS / RESET_POLL_MS);
        let mut delay = CountingDelay::default();
        assert!(!detect_reset_request(
            &mut pin,
            &mut delay,
            RESET_HOLD_MS,
            RESET_POLL_MS
        ));
    }

    #[test]
    fn full_hold_is_a_reset() {
        let mut pin = HeldPin::new(u32::MAX);
        let mut delay = CountingDelay::default();
        assert!(detect_reset_request(
            &mut pin,
            &mut delay,
            RESET_HOLD_MS,
            RESET_POLL_MS
        ));
        assert_eq!(delay.elapsed_ns, RESET_HOLD_MS as u64 * 1_000_000);
    }
}
