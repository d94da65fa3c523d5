//! UART receive side for the dust sensor

use esp_hal::Async;
use esp_hal::uart::{Config as UartConfig, UartRx};
use log::{info, warn};
use pmbridge_core::RxBuffer;

/// Software receive buffer, a few seconds of sensor output at 2400 baud.
pub const SENSOR_RX_LEN: usize = 512;

pub type SensorRx = RxBuffer<SENSOR_RX_LEN>;

/// Bytes received from the sensor, drained by the notify loop on each tick.
pub static SENSOR_RX: SensorRx = RxBuffer::new();

/// Create the sensor UART receiver
///
/// 8N1 at `baud_rate`, receive only: the sensor streams unsolicited frames.
pub fn create_sensor_uart(
    uart: esp_hal::peripherals::UART2<'static>,
    rx_pin: esp_hal::peripherals::GPIO16<'static>,
    baud_rate: u32,
) -> UartRx<'static, Async> {
    let config = UartConfig::default().with_baudrate(baud_rate);

    UartRx::new(uart, config)
        .expect("Failed to configure sensor UART")
        .with_rx(rx_pin)
        .into_async()
}

/// Move bytes from the hardware FIFO into `buffer` as they arrive.
///
/// Runs for the whole uptime so the FIFO never overruns between ticks or
/// between connections.
#[embassy_executor::task]
pub async fn uart_reader_task(mut rx: UartRx<'static, Async>, buffer: &'static SensorRx) {
    info!("[uart] reader started");
    let mut chunk = [0u8; 32];
    loop {
        match rx.read_async(&mut chunk).await {
            Ok(n) => {
                let evicted = buffer.push(&chunk[..n]);
                if evicted > 0 {
                    warn!("[uart] rx buffer full, dropped {} old byte(s)", evicted);
                }
            }
            Err(e) => warn!("[uart] receive error: {:?}", e),
        }
    }
}
