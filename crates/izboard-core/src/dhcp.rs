//! DHCPv4 server for the setup access point.
//!
//! Leases come from a small fixed pool right above the portal address. A
//! client keeps its address for as long as the table has it; the table never
//! expires entries because the portal only lives until the next restart.

use heapless::Vec;
use log::{debug, info, warn};

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;
pub const LEASE_SECS: u32 = 2 * 60 * 60;
pub const MAX_LEASES: usize = 8;
/// Smallest buffer a reply is guaranteed to fit in.
pub const REPLY_BYTES: usize = 300;

const OP_REQUEST: u8 = 1;
const OP_REPLY: u8 = 2;
const FIXED_LEN: usize = 236;
const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const OPTIONS_START: usize = FIXED_LEN + MAGIC_COOKIE.len();

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    fn from_byte(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Lease {
    mac: [u8; 6],
    host: u8,
}

pub struct DhcpServer {
    address: [u8; 4],
    netmask: [u8; 4],
    first_host: u8,
    leases: Vec<Lease, MAX_LEASES>,
}

impl DhcpServer {
    /// Server at `address`; the pool is the next [`MAX_LEASES`] hosts.
    pub fn new(address: [u8; 4], netmask: [u8; 4]) -> Self {
        Self {
            address,
            netmask,
            first_host: address[3].saturating_add(1),
            leases: Vec::new(),
        }
    }

    /// Handles one client datagram, writing the reply into `out`.
    ///
    /// Returns the reply length, or `None` when nothing should be sent.
    /// Replies go to the broadcast address on [`CLIENT_PORT`].
    pub fn handle(&mut self, request: &[u8], out: &mut [u8]) -> Option<usize> {
        if request.len() < OPTIONS_START
            || request[0] != OP_REQUEST
            || request[FIXED_LEN..OPTIONS_START] != MAGIC_COOKIE
        {
            return None;
        }

        let options = Options::parse(&request[OPTIONS_START..]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&request[28..34]);

        match options.message_type? {
            MessageType::Discover => {
                let Some(host) = self.assign(mac) else {
                    warn!("dhcp: pool exhausted, ignoring {}", MacDisplay(&mac));
                    return None;
                };
                debug!("dhcp: offer .{} to {}", host, MacDisplay(&mac));
                self.reply(request, MessageType::Offer, Some(host), out)
            }
            MessageType::Request => {
                if options.server_id.is_some_and(|id| id != self.address) {
                    return None;
                }
                let wanted = options
                    .requested_ip
                    .or_else(|| ipv4_at(request, 12).filter(|ip| *ip != [0; 4]));

                match wanted.and_then(|ip| self.confirm(mac, ip)) {
                    Some(host) => {
                        info!("dhcp: ack .{} for {}", host, MacDisplay(&mac));
                        self.reply(request, MessageType::Ack, Some(host), out)
                    }
                    None => {
                        debug!("dhcp: nak {:?} for {}", wanted, MacDisplay(&mac));
                        self.reply(request, MessageType::Nak, None, out)
                    }
                }
            }
            MessageType::Release | MessageType::Decline => {
                self.leases.retain(|lease| lease.mac != mac);
                None
            }
            _ => None,
        }
    }

    /// Existing lease for `mac`, or the lowest free host in the pool.
    fn assign(&mut self, mac: [u8; 6]) -> Option<u8> {
        if let Some(lease) = self.leases.iter().find(|lease| lease.mac == mac) {
            return Some(lease.host);
        }
        let host = self.pool().find(|host| !self.leases.iter().any(|l| l.host == *host))?;
        self.leases.push(Lease { mac, host }).ok()?;
        Some(host)
    }

    /// Binds `ip` to `mac` if it is in the pool and not held by another client.
    fn confirm(&mut self, mac: [u8; 6], ip: [u8; 4]) -> Option<u8> {
        if ip[..3] != self.address[..3] || !self.pool().any(|host| host == ip[3]) {
            return None;
        }
        let host = ip[3];
        match self.leases.iter().position(|lease| lease.host == host) {
            Some(index) if self.leases[index].mac == mac => Some(host),
            Some(_) => None,
            None => {
                self.leases.retain(|lease| lease.mac != mac);
                self.leases.push(Lease { mac, host }).ok()?;
                Some(host)
            }
        }
    }

    fn pool(&self) -> impl Iterator<Item = u8> {
        let first = self.first_host;
        (0..MAX_LEASES as u8).filter_map(move |offset| first.checked_add(offset))
    }

    fn reply(
        &self,
        request: &[u8],
        kind: MessageType,
        host: Option<u8>,
        out: &mut [u8],
    ) -> Option<usize> {
        let out = out.get_mut(..REPLY_BYTES)?;
        out.fill(0);

        out[0] = OP_REPLY;
        // htype, hlen, hops=0 and xid.
        out[1..3].copy_from_slice(&request[1..3]);
        out[4..8].copy_from_slice(&request[4..8]);
        // flags, giaddr, chaddr.
        out[10..12].copy_from_slice(&request[10..12]);
        out[24..44].copy_from_slice(&request[24..44]);
        if let Some(host) = host {
            let [a, b, c, _] = self.address;
            out[16..20].copy_from_slice(&[a, b, c, host]);
            out[20..24].copy_from_slice(&self.address);
        }
        out[FIXED_LEN..OPTIONS_START].copy_from_slice(&MAGIC_COOKIE);

        let mut writer = OptionWriter {
            buf: out,
            pos: OPTIONS_START,
        };
        writer.put(OPT_MESSAGE_TYPE, &[kind as u8]);
        writer.put(OPT_SERVER_ID, &self.address);
        if host.is_some() {
            writer.put(OPT_LEASE_TIME, &LEASE_SECS.to_be_bytes());
            writer.put(OPT_SUBNET_MASK, &self.netmask);
            writer.put(OPT_ROUTER, &self.address);
            writer.put(OPT_DNS, &self.address);
        }
        writer.buf[writer.pos] = OPT_END;

        Some(REPLY_BYTES)
    }
}

#[derive(Default)]
struct Options {
    message_type: Option<MessageType>,
    requested_ip: Option<[u8; 4]>,
    server_id: Option<[u8; 4]>,
}

impl Options {
    fn parse(mut raw: &[u8]) -> Self {
        let mut options = Self::default();
        while let Some((&code, rest)) = raw.split_first() {
            match code {
                OPT_END => break,
                OPT_PAD => {
                    raw = rest;
                    continue;
                }
                _ => {}
            }
            let Some((&len, rest)) = rest.split_first() else {
                break;
            };
            let Some(value) = rest.get(..len as usize) else {
                break;
            };
            match code {
                OPT_MESSAGE_TYPE => {
                    options.message_type = value.first().copied().and_then(MessageType::from_byte)
                }
                OPT_REQUESTED_IP => options.requested_ip = ipv4_at(value, 0),
                OPT_SERVER_ID => options.server_id = ipv4_at(value, 0),
                _ => {}
            }
            raw = &rest[len as usize..];
        }
        options
    }
}

struct OptionWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl OptionWriter<'_> {
    fn put(&mut self, code: u8, value: &[u8]) {
        let end = self.pos + 2 + value.len();
        self.buf[self.pos] = code;
        self.buf[self.pos + 1] = value.len() as u8;
        self.buf[self.pos + 2..end].copy_from_slice(value);
        self.pos = end;
    }
}

fn ipv4_at(raw: &[u8], offset: usize) -> Option<[u8; 4]> {
    raw.get(offset..offset + 4)?.try_into().ok()
}

struct MacDisplay<'a>(&'a [u8; 6]);

impl core::fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}
