use core::net::Ipv4Addr;

use embassy_futures::{
    join::join3,
    select::{Either, select},
};
use embassy_net::{Runner, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal::gpio::Output;
use esp_radio::wifi::{WifiController, WifiDevice};
use izboard_core::{
    config::ConfigStore,
    frame::{BandBuffers, FrameGeometry},
    pipeline::BandDisplay,
};
use izboard_hal_esp32::network::access_point;
use log::{error, info, warn};
use static_cell::StaticCell;

use super::{power, welcome};

pub(super) const AP_SSID: &str = "izBoard-AP";
pub(super) const PORTAL_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
const RESTART_DELAY: Duration = Duration::from_secs(1);

static AP_RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();

/// Runs the setup access point until a configuration is saved, then restarts.
pub(super) async fn run<'d, S, D>(
    controller: &mut WifiController<'d>,
    device: WifiDevice<'d>,
    seed: u64,
    store: &mut S,
    display: &mut D,
    mut buffers: BandBuffers,
    led: &mut Output<'_>,
) -> !
where
    S: ConfigStore,
    D: BandDisplay,
{
    info!("setup: entering provisioning mode");

    if let Err(err) = access_point::start(controller, AP_SSID).await {
        error!("setup: access point failed to start: {:?}", err);
        power::restart();
    }

    let welcome = welcome::Welcome {
        ssid: AP_SSID,
        address: PORTAL_ADDRESS,
        mac: device.mac_address(),
    };
    if let Err(err) = welcome::show(display, &mut buffers, FrameGeometry::PANEL, &welcome) {
        warn!("setup: welcome screen failed: {:?}", err);
    }
    drop(buffers);

    let (stack, runner) = embassy_net::new(
        device,
        access_point::static_config(PORTAL_ADDRESS),
        AP_RESOURCES.init(StackResources::new()),
        seed,
    );

    let services = join3(
        run_stack(runner),
        access_point::captive_dns(stack, PORTAL_ADDRESS),
        access_point::dhcp_service(stack, PORTAL_ADDRESS),
    );
    let portal = async {
        select(access_point::portal_http(stack, store), heartbeat(led)).await;
        led.set_low();
        // Lets the confirmation page drain before the reset.
        Timer::after(RESTART_DELAY).await;
    };

    if let Either::Second(()) = select(services, portal).await {
        info!("setup: configuration stored");
    }
    power::restart()
}

async fn run_stack(mut runner: Runner<'_, WifiDevice<'_>>) -> ! {
    runner.run().await
}

async fn heartbeat(led: &mut Output<'_>) -> ! {
    loop {
        led.toggle();
        Timer::after(HEARTBEAT_INTERVAL).await;
    }
}
