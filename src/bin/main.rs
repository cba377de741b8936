#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::StackResources;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    rng::Rng,
    rtc_cntl::{reset_reason, wakeup_cause},
    spi::master::Spi,
    system::{Cpu, software_reset},
    time::Rate,
    timer::timg::TimerGroup,
};
use izboard_core::{
    frame::FrameGeometry,
    lifecycle::{Device, Terminal},
};
use izboard_hal_esp32::{
    network::{StationJoin, TcpConnector},
    platform::display::PanelDisplay,
    storage::flash_config::FlashConfigStore,
};
use log::{LevelFilter, error, info};
use static_cell::StaticCell;

#[path = "main/power.rs"]
mod power;
#[path = "main/provisioning.rs"]
mod provisioning;
#[path = "main/welcome.rs"]
mod welcome;

const DISPLAY_SPI_HZ: u32 = 4_000_000;
const TCP_RX_BYTES: usize = 4096;
const TCP_TX_BYTES: usize = 1024;

static STA_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static TCP_RX: StaticCell<[u8; TCP_RX_BYTES]> = StaticCell::new();
static TCP_TX: StaticCell<[u8; TCP_TX_BYTES]> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    esp_println::println!("panic: {}", info);
    software_reset()
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: izboard {} starting", env!("CARGO_PKG_VERSION"));

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    info!(
        "boot reset_reason={:?} wakeup_cause={:?}",
        reset_reason(Cpu::ProCpu),
        wakeup_cause()
    );

    // esp-radio requires an allocator; the band buffers come from the second region.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);
    esp_alloc::heap_allocator!(size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Wiring: RESET=GPIO33 (active high), LED=GPIO2,
    // panel SCK=GPIO13 MOSI=GPIO14 CS=GPIO15 DC=GPIO27 RST=GPIO26 BUSY=GPIO25
    let reset_pin = Input::new(
        peripherals.GPIO33,
        InputConfig::default().with_pull(Pull::Down),
    );
    let mut led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());

    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(DISPLAY_SPI_HZ))
        .with_mode(esp_hal::spi::Mode::_0);
    let spi = match Spi::new(peripherals.SPI2, spi_config) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO13)
            .with_mosi(peripherals.GPIO14),
        Err(err) => {
            error!("display: spi config rejected: {:?}", err);
            power::restart();
        }
    };
    let cs = Output::new(peripherals.GPIO15, Level::High, OutputConfig::default());
    let spi_device = match ExclusiveDevice::new(spi, cs, Delay::new()) {
        Ok(device) => device,
        Err(err) => {
            error!("display: chip select setup failed: {:?}", err);
            power::restart();
        }
    };
    let dc = Output::new(peripherals.GPIO27, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO26, Level::High, OutputConfig::default());
    let busy = Input::new(peripherals.GPIO25, InputConfig::default());
    let display = PanelDisplay::new(spi_device, dc, rst, busy, Delay::new());

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            error!("esp-radio init failed: {:?}", err);
            power::restart();
        }
    };
    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                error!("wifi peripheral init failed: {:?}", err);
                power::restart();
            }
        };

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STA_RESOURCES.init(StackResources::new()),
        seed,
    );

    let mut device = Device {
        store: FlashConfigStore::new(),
        reset_pin,
        delay: Delay::new(),
        network: StationJoin::new(&mut wifi_controller, stack),
        connector: TcpConnector::new(
            stack,
            TCP_RX.init([0; TCP_RX_BYTES]),
            TCP_TX.init([0; TCP_TX_BYTES]),
        ),
        display,
        geometry: FrameGeometry::PANEL,
    };

    let terminal = match select(net_runner.run(), device.run()).await {
        Either::First(never) => never,
        Either::Second(terminal) => terminal,
    };

    let Device {
        mut store,
        mut display,
        ..
    } = device;

    match terminal {
        Terminal::Sleep(schedule) => {
            if let Err(err) = display.hibernate() {
                error!("display: deep sleep command failed: {:?}", err);
            }
            power::enter_deep_sleep(schedule)
        }
        Terminal::Restart(reason) => {
            info!("boot: restart requested ({:?})", reason);
            power::restart()
        }
        Terminal::Provision(buffers) => {
            provisioning::run(
                &mut wifi_controller,
                interfaces.ap,
                seed.rotate_left(17),
                &mut store,
                &mut display,
                buffers,
                &mut led,
            )
            .await
        }
    }
}
