use core::net::Ipv4Addr;

use embassy_net::{
    IpAddress, IpEndpoint, Ipv4Cidr, Stack, StaticConfigV4,
    tcp::TcpSocket,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_time::{Duration, Timer};
use esp_radio::wifi::{AccessPointConfig, ModeConfig, WifiController, WifiError};
use izboard_core::{
    config::ConfigStore,
    dhcp::{self, DhcpServer},
    dns,
    portal::{self, PortalOutcome, REQUEST_BUFFER_BYTES},
};
use log::{debug, error, info, warn};

use super::TcpConnection;

/// Largest datagram either service accepts.
const DATAGRAM_BYTES: usize = 576;
const HTTP_PORT: u16 = 80;
const HTTP_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_RX_BYTES: usize = 1536;
const HTTP_TX_BYTES: usize = 2048;

/// Switches the radio into an open access point named `ssid`.
pub async fn start(controller: &mut WifiController<'_>, ssid: &str) -> Result<(), WifiError> {
    if controller.is_started().unwrap_or(false) {
        controller.stop_async().await?;
    }

    let mode = ModeConfig::AccessPoint(AccessPointConfig::default().with_ssid(ssid.into()));
    controller.set_config(&mode)?;
    controller.start_async().await?;
    info!("ap: broadcasting {}", ssid);
    Ok(())
}

/// Static /24 configuration with the device as its own gateway.
pub fn static_config(address: Ipv4Addr) -> embassy_net::Config {
    embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(address, 24),
        gateway: Some(address),
        dns_servers: Default::default(),
    })
}

/// Answers every A query with `address` so clients land on the portal.
pub async fn captive_dns(stack: Stack<'_>, address: Ipv4Addr) -> ! {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; DATAGRAM_BYTES * 2];
    let mut tx_buf = [0u8; DATAGRAM_BYTES * 2];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);

    if let Err(err) = socket.bind(dns::DNS_PORT) {
        error!("dns: bind failed: {:?}", err);
        return core::future::pending().await;
    }

    let mut query = [0u8; DATAGRAM_BYTES];
    let mut reply = [0u8; DATAGRAM_BYTES];
    loop {
        let (len, remote) = match socket.recv_from(&mut query).await {
            Ok(received) => received,
            Err(err) => {
                debug!("dns: receive failed: {:?}", err);
                continue;
            }
        };

        let Some(reply_len) = dns::answer(&query[..len], address.octets(), &mut reply) else {
            continue;
        };
        if let Err(err) = socket.send_to(&reply[..reply_len], remote).await {
            debug!("dns: reply failed: {:?}", err);
        }
    }
}

/// Leases addresses next to `address` to clients of the access point.
pub async fn dhcp_service(stack: Stack<'_>, address: Ipv4Addr) -> ! {
    let mut server = DhcpServer::new(address.octets(), [255, 255, 255, 0]);

    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; DATAGRAM_BYTES * 2];
    let mut tx_buf = [0u8; DATAGRAM_BYTES * 2];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);

    if let Err(err) = socket.bind(dhcp::SERVER_PORT) {
        error!("dhcp: bind failed: {:?}", err);
        return core::future::pending().await;
    }

    // Clients have no address yet, so replies go out as broadcasts.
    let broadcast = IpEndpoint::new(IpAddress::Ipv4(Ipv4Addr::BROADCAST), dhcp::CLIENT_PORT);
    let mut request = [0u8; DATAGRAM_BYTES];
    let mut reply = [0u8; dhcp::REPLY_BYTES];
    loop {
        let len = match socket.recv_from(&mut request).await {
            Ok((len, _)) => len,
            Err(err) => {
                debug!("dhcp: receive failed: {:?}", err);
                continue;
            }
        };

        let Some(reply_len) = server.handle(&request[..len], &mut reply) else {
            continue;
        };
        if let Err(err) = socket.send_to(&reply[..reply_len], broadcast).await {
            warn!("dhcp: reply failed: {:?}", err);
        }
    }
}

/// Serves the setup form one connection at a time until a configuration
/// has been saved.
pub async fn portal_http<S: ConfigStore>(stack: Stack<'_>, store: &mut S) {
    let mut rx = [0u8; HTTP_RX_BYTES];
    let mut tx = [0u8; HTTP_TX_BYTES];
    let mut request = [0u8; REQUEST_BUFFER_BYTES];

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx, &mut tx);
        socket.set_timeout(Some(HTTP_SOCKET_TIMEOUT));
        if let Err(err) = socket.accept(HTTP_PORT).await {
            debug!("portal: accept failed: {:?}", err);
            Timer::after(Duration::from_millis(100)).await;
            continue;
        }

        let mut connection = TcpConnection::new(socket);
        let outcome = portal::serve(&mut connection, store, &mut request).await;
        connection.close().await;

        match outcome {
            Ok(PortalOutcome::Saved) => {
                info!("portal: configuration saved");
                return;
            }
            Ok(PortalOutcome::Served(route)) => debug!("portal: served {:?}", route),
            Err(err) => warn!("portal: request failed: {:?}", err),
        }
    }
}
