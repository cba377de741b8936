/// Wake sources programmed right before deep sleep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WakeSchedule {
    pub delay_secs: u64,
    pub reset_pin_wake: bool,
}

impl WakeSchedule {
    pub const fn after(delay_secs: u64) -> Self {
        Self {
            delay_secs,
            reset_pin_wake: true,
        }
    }

    /// Server-provided delay when there is one, otherwise the stored rate.
    pub fn resolve(next_wait_secs: Option<u64>, default_secs: u64) -> Self {
        Self::after(next_wait_secs.unwrap_or(default_secs))
    }

    pub const fn delay_micros(&self) -> u64 {
        self.delay_secs.saturating_mul(1_000_000)
    }
}
