//! Station-mode networking towards the dashboard server, and the
//! access-point services used while the device waits for setup.

pub mod access_point;
mod station;
mod tcp;

pub use station::{JoinError, StationJoin};
pub use tcp::{ConnectError, TcpConnection, TcpConnector, TcpIoError};
