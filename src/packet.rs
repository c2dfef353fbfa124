//! DHCP packet parsing and encoding per RFC 2131.
//!
//! A DHCP packet consists of a fixed 236-byte header followed by a 4-byte
//! magic cookie and the options region. This server carries a fixed
//! 128-byte options region, which holds every option it reads or writes.
//!
//! # Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                          options (128)                        |
//! +---------------------------------------------------------------+
//! ```

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{self, DhcpOption, MessageType, OPTIONS_REGION_SIZE};

/// DHCP magic cookie that identifies DHCP packets (vs BOOTP).
pub const DHCP_MAGIC_COOKIE: u32 = 0x6382_5363;

const DHCP_CHADDR_OFFSET: usize = 28;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_SIZE: usize = 128;
const DHCP_MAGIC_COOKIE_OFFSET: usize = 236;

/// Size of the fixed header portion including magic cookie.
pub const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + 4;

/// Size of an encoded packet: fixed header plus the full options region.
pub const DHCP_PACKET_SIZE: usize = DHCP_FIXED_HEADER_SIZE + OPTIONS_REGION_SIZE;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// An Ethernet MAC address taken from the `chaddr` field.
///
/// The all-zero address never belongs to a real client and marks an unused
/// lease slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HardwareAddress([u8; 6]);

impl HardwareAddress {
    /// The all-zero address.
    pub const UNSPECIFIED: Self = Self([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

/// A parsed DHCP packet.
///
/// This struct represents both client requests and server replies.
/// Use [`parse`](Self::parse) for incoming datagrams and
/// [`create_reply`](Self::create_reply) to construct responses.
#[derive(Debug, Clone)]
pub struct DhcpPacket {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    /// Client IP address (set by client in RENEWING/REBINDING states).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Server IP address.
    pub siaddr: Ipv4Addr,

    /// Gateway IP address - set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address field. Only the first six bytes are ever
    /// non-zero; see [`parse`](Self::parse).
    pub chaddr: [u8; 16],

    /// Server host name.
    pub sname: [u8; 64],

    /// Boot file name.
    pub file: [u8; 128],

    /// DHCP options parsed from the packet.
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// Parses a DHCP packet from raw bytes.
    ///
    /// Bytes beyond the 128-byte options region are ignored. A shorter
    /// options region is treated as zero-filled, so anything from 240 bytes
    /// up is accepted even though replies are always [`DHCP_PACKET_SIZE`].
    ///
    /// The `chaddr` field is zeroed and only the six MAC bytes are copied
    /// in, whatever the sender put into the padding. Lease ownership checks
    /// compare [`HardwareAddress`] values and rely on this.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] if:
    /// - Packet is shorter than 240 bytes (fixed header + magic cookie)
    /// - Magic cookie is not 99.130.83.99
    /// - Options are malformed (truncated length or data)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(Error::MalformedPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                DHCP_FIXED_HEADER_SIZE
            )));
        }

        let cookie = read_u32(data, DHCP_MAGIC_COOKIE_OFFSET);
        if cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::MalformedPacket(format!(
                "Invalid magic cookie {:#010x}",
                cookie
            )));
        }

        let mut chaddr = [0u8; DHCP_CHADDR_SIZE];
        chaddr[..6].copy_from_slice(&data[DHCP_CHADDR_OFFSET..DHCP_CHADDR_OFFSET + 6]);

        let options_end = data.len().min(DHCP_PACKET_SIZE);
        let options = options::decode_options(&data[DHCP_FIXED_HEADER_SIZE..options_end])?;

        let mut sname = [0u8; DHCP_SNAME_SIZE];
        sname.copy_from_slice(&data[44..44 + DHCP_SNAME_SIZE]);

        let mut file = [0u8; DHCP_FILE_SIZE];
        file.copy_from_slice(&data[108..108 + DHCP_FILE_SIZE]);

        Ok(Self {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: read_u32(data, 4),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: read_addr(data, 12),
            yiaddr: read_addr(data, 16),
            siaddr: read_addr(data, 20),
            giaddr: read_addr(data, 24),
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Encodes the packet to bytes for transmission.
    ///
    /// The result is always [`DHCP_PACKET_SIZE`] bytes: options are written
    /// in order, followed by the End marker, and the remainder of the
    /// options region is zero.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(DHCP_PACKET_SIZE);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE.to_be_bytes());
        packet.extend_from_slice(&options::encode_options(&self.options));

        packet.resize(DHCP_PACKET_SIZE.max(packet.len()), 0);
        packet
    }

    /// Returns the DHCP message type (Option 53) if present.
    pub fn message_type(&self) -> Option<MessageType> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::MessageType(t) => Some(*t),
            _ => None,
        })
    }

    /// Returns the requested IP address (Option 50) if present and nonzero.
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::RequestedIpAddress(ip) if !ip.is_unspecified() => Some(*ip),
            _ => None,
        })
    }

    /// Returns the server identifier (Option 54) if present and nonzero.
    ///
    /// Clients include this in REQUEST to indicate which server's
    /// offer they are accepting.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::ServerIdentifier(ip) if !ip.is_unspecified() => Some(*ip),
            _ => None,
        })
    }

    /// Returns the client MAC address.
    pub fn hardware_address(&self) -> HardwareAddress {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.chaddr[..6]);
        HardwareAddress::new(octets)
    }

    /// Creates a DHCP reply packet from a request.
    ///
    /// The message type is added as the first option, ahead of `options`.
    ///
    /// # Preserved Fields
    ///
    /// Everything except `op`, `yiaddr`, `sname`, `file` and the options is
    /// copied from the request, including `xid` and `chaddr`.
    pub fn create_reply(
        request: &DhcpPacket,
        message_type: MessageType,
        your_ip: Ipv4Addr,
        options: Vec<DhcpOption>,
    ) -> Self {
        let mut all_options = vec![DhcpOption::MessageType(message_type)];
        all_options.extend(options);

        Self {
            op: BOOTREPLY,
            yiaddr: your_ip,
            sname: [0u8; DHCP_SNAME_SIZE],
            file: [0u8; DHCP_FILE_SIZE],
            options: all_options,
            ..request.clone()
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_addr(data: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::from(read_u32(data, offset))
}
