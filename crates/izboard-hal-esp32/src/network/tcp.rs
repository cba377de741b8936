use core::net::Ipv4Addr;

use embassy_net::{
    IpAddress, IpEndpoint, Stack,
    dns::{self, DnsQueryType},
    tcp::{self, TcpSocket},
};
use embassy_time::{Duration, WithTimeout};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use izboard_core::pipeline::Connector;
use log::debug;

/// Time allowed for the TCP handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Connection is dropped after this long without traffic.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum ConnectError {
    Dns(dns::Error),
    NoAddress,
    Timeout,
    Connect(tcp::ConnectError),
}

/// Opens one TCP connection at a time over caller-provided socket buffers.
pub struct TcpConnector<'d> {
    stack: Stack<'d>,
    rx: &'d mut [u8],
    tx: &'d mut [u8],
}

impl<'d> TcpConnector<'d> {
    pub fn new(stack: Stack<'d>, rx: &'d mut [u8], tx: &'d mut [u8]) -> Self {
        Self { stack, rx, tx }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, ConnectError> {
        if let Ok(literal) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(literal));
        }

        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(ConnectError::Dns)?;
        let address = addresses.first().copied().ok_or(ConnectError::NoAddress)?;
        debug!("net: {} resolved to {}", host, address);
        Ok(address)
    }
}

impl Connector for TcpConnector<'_> {
    type Error = ConnectError;
    type Connection<'a>
        = TcpConnection<'a>
    where
        Self: 'a;

    async fn connect(&mut self, host: &str, port: u16) -> Result<TcpConnection<'_>, ConnectError> {
        let address = self.resolve(host).await?;

        let mut socket = TcpSocket::new(self.stack, &mut *self.rx, &mut *self.tx);
        socket.set_timeout(Some(INACTIVITY_TIMEOUT));
        socket
            .connect(IpEndpoint::new(address, port))
            .with_timeout(CONNECT_TIMEOUT)
            .await
            .map_err(|_| ConnectError::Timeout)?
            .map_err(ConnectError::Connect)?;

        Ok(TcpConnection { socket })
    }
}

/// Socket error surfaced through `embedded-io-async`.
#[derive(Debug)]
pub struct TcpIoError(pub tcp::Error);

impl embedded_io_async::Error for TcpIoError {
    fn kind(&self) -> ErrorKind {
        // Reset is the only failure a TCP socket reports.
        ErrorKind::ConnectionReset
    }
}

/// Open connection; aborted when dropped.
pub struct TcpConnection<'a> {
    socket: TcpSocket<'a>,
}

impl<'a> TcpConnection<'a> {
    /// Wraps an already established socket.
    pub fn new(socket: TcpSocket<'a>) -> Self {
        Self { socket }
    }

    /// Sends FIN after pending data and waits for it to drain.
    pub async fn close(mut self) {
        self.socket.close();
        let _ = self.socket.flush().await;
    }
}

impl ErrorType for TcpConnection<'_> {
    type Error = TcpIoError;
}

impl Read for TcpConnection<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket.read(buf).await.map_err(TcpIoError)
    }
}

impl Write for TcpConnection<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket.write(buf).await.map_err(TcpIoError)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket.flush().await.map_err(TcpIoError)
    }
}
