use esp_hal::{
    gpio::RtcPinWithResistors,
    peripherals::{GPIO33, LPWR},
    rtc_cntl::{
        Rtc,
        sleep::{Ext0WakeupSource, TimerWakeupSource, WakeupLevel},
    },
    system::software_reset,
};
use izboard_core::schedule::WakeSchedule;
use log::info;

/// Arms the timer (and the reset pin when requested) and enters deep sleep.
pub(super) fn enter_deep_sleep(schedule: WakeSchedule) -> ! {
    info!(
        "sleep: deep sleep for {}s (reset pin wake={})",
        schedule.delay_secs, schedule.reset_pin_wake
    );

    let mut rtc = Rtc::new(unsafe { LPWR::steal() });
    let timer = TimerWakeupSource::new(core::time::Duration::from_micros(
        schedule.delay_micros(),
    ));

    if !schedule.reset_pin_wake {
        rtc.sleep_deep(&[&timer]);
    }

    // The reset button pulls GPIO33 high; keep it low while idle.
    let reset_pin = unsafe { GPIO33::steal() };
    reset_pin.rtcio_pullup(false);
    reset_pin.rtcio_pulldown(true);
    let ext0 = Ext0WakeupSource::new(reset_pin, WakeupLevel::High);

    rtc.sleep_deep(&[&timer, &ext0]);
}

pub(super) fn restart() -> ! {
    info!("boot: restarting");
    software_reset()
}
