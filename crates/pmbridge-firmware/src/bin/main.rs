#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use bt_hci::controller::ExternalController;
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::efuse::Efuse;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::ble::controller::BleConnector;
use log::{debug, error, info, warn};
use trouble_host::prelude::*;

use pmbridge_core::scheduler::{TickOutcome, run_tick};
use pmbridge_core::{ConnectionEvent, DeviceState, TickGate};
use pmbridge_firmware::CONFIG;
use pmbridge_firmware::ble::{self, CONNECTIONS_MAX, GattNotifier, L2CAP_CHANNELS_MAX, Server};
use pmbridge_firmware::serial::{SENSOR_RX, SensorRx, create_sensor_uart, uart_reader_task};
use pmbridge_firmware::ticker::{TICK, tick_task};

/// Max number of command slots for the controller.
const COMMAND_SLOTS: usize = 20;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let uart = create_sensor_uart(
        peripherals.UART2,
        peripherals.GPIO16,
        CONFIG.sensor_baud_rate,
    );
    info!("Sensor UART ready at {} baud", CONFIG.sensor_baud_rate);

    let radio_init = esp_radio::init().expect("Failed to initialize BLE controller");
    let transport = BleConnector::new(&radio_init, peripherals.BT, Default::default())
        .expect("Failed to initialize BLE transport");
    let ble_controller = ExternalController::<_, COMMAND_SLOTS>::new(transport);

    let mac = Efuse::read_base_mac_address();
    let name = CONFIG
        .advertised_name(mac)
        .expect("Device name too long for advertising");

    let mut address = mac;
    address.reverse();
    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();
    let stack =
        trouble_host::new(ble_controller, &mut resources).set_random_address(Address::random(address));
    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let server = Server::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name: &name,
        appearance: &appearance::sensor::GENERIC_SENSOR,
    }))
    .expect("Failed to build GATT server");

    spawner.must_spawn(uart_reader_task(uart, &SENSOR_RX));
    spawner.must_spawn(tick_task(&TICK));

    let mut state = DeviceState::new();

    let ble_runner = async {
        loop {
            if let Err(e) = runner.run().await {
                error!("[ble] host runner error: {:?}", e);
            }
        }
    };

    let bridge = async {
        loop {
            let conn = match ble::advertise(&name, &mut peripheral, &server).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("[adv] error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                    continue;
                }
            };

            state.apply(ConnectionEvent::Connected);
            let mut notifier = GattNotifier::new(&server, &conn);
            select(
                ble::gatt_events_task(&conn),
                notify_loop(&TICK, &mut state, &SENSOR_RX, &mut notifier),
            )
            .await;
            state.apply(ConnectionEvent::Disconnected);
        }
    };

    match select(ble_runner, bridge).await {
        Either::First(_) => error!("BLE runner stopped"),
        Either::Second(_) => error!("Bridge loop stopped"),
    }

    panic!("BLE host exited");
}

/// Run a scheduler tick each time the gate fires, for one connection.
async fn notify_loop(
    gate: &TickGate,
    state: &mut DeviceState,
    rx: &SensorRx,
    notifier: &mut GattNotifier<'_, '_, '_>,
) {
    loop {
        gate.wait().await;
        match run_tick(state, &mut rx.reader(), notifier).await {
            Ok(TickOutcome::Notified { frames, measurement }) => {
                debug!("[tick] {:.1} ug/m3 ({} frame(s))", measurement.pm25, frames);
            }
            Ok(TickOutcome::Skipped(reason)) => debug!("[tick] skipped: {:?}", reason),
            Err(e) => warn!("[tick] {}", e),
        }
    }
}
