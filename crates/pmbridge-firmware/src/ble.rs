//! GATT server, advertising and connection handling.
//!
//! One service with a single notify-only characteristic carrying the PM2.5
//! payload (8-byte little-endian `f64`). The central never writes to the
//! device.
//!
//! - Service UUID: 6E400001-B5A3-F393-E0A9-E50E24DCCA9E
//! - TX characteristic: 6E400003-... (notify)

use log::{info, warn};
use pmbridge_core::measurement::PAYLOAD_LEN;
use pmbridge_core::scheduler::Notifier;
use trouble_host::prelude::*;

/// Max number of connections
pub const CONNECTIONS_MAX: usize = 1;
/// Max number of L2CAP channels.
pub const L2CAP_CHANNELS_MAX: usize = 2; // Signal + att (as required by GATT)

#[gatt_server]
pub struct Server {
    pub bridge: BridgeService,
}

#[gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct BridgeService {
    /// Latest PM2.5 concentration, ug/m3
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify, value = [0u8; 8])]
    pub tx: [u8; PAYLOAD_LEN],
}

/// Advertise until a central connects, then attach the GATT server.
pub async fn advertise<'values, 'server, C: Controller>(
    name: &'values str,
    peripheral: &mut Peripheral<'values, C, DefaultPacketPool>,
    server: &'server Server<'values>,
) -> Result<GattConnection<'values, 'server, DefaultPacketPool>, BleHostError<C::Error>> {
    let mut adv_data = [0; 31];
    let adv_len = AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::CompleteLocalName(name.as_bytes()),
        ],
        &mut adv_data[..],
    )?;

    let advertiser = peripheral
        .advertise(
            &Default::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data: &adv_data[..adv_len],
                scan_data: &[],
            },
        )
        .await?;
    info!("[adv] advertising as {}", name);
    let conn = advertiser.accept().await?.with_attribute_server(server)?;
    info!("[adv] connection established");
    Ok(conn)
}

/// Service GATT traffic until the central disconnects.
pub async fn gatt_events_task<P: PacketPool>(conn: &GattConnection<'_, '_, P>) {
    let reason = loop {
        match conn.next().await {
            GattConnectionEvent::Disconnected { reason } => break reason,
            GattConnectionEvent::Gatt { event } => {
                match event.accept() {
                    Ok(reply) => reply.send().await,
                    Err(e) => warn!("[gatt] response error: {:?}", e),
                };
            }
            _ => {}
        }
    };
    info!("[gatt] disconnected: {:?}", reason);
}

/// Pushes scheduler payloads to one connected central.
pub struct GattNotifier<'a, 'values, 'server> {
    server: &'server Server<'values>,
    conn: &'a GattConnection<'values, 'server, DefaultPacketPool>,
}

impl<'a, 'values, 'server> GattNotifier<'a, 'values, 'server> {
    pub fn new(
        server: &'server Server<'values>,
        conn: &'a GattConnection<'values, 'server, DefaultPacketPool>,
    ) -> Self {
        Self { server, conn }
    }
}

impl Notifier for GattNotifier<'_, '_, '_> {
    type Error = trouble_host::Error;

    async fn notify(&mut self, payload: &[u8; PAYLOAD_LEN]) -> Result<(), Self::Error> {
        self.server.bridge.tx.set(self.server, payload)?;
        self.server.bridge.tx.notify(self.conn, payload).await
    }
}
