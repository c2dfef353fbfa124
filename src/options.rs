//! DHCP options codec (RFC 2132 TLV format).
//!
//! Each option has a code (1 byte), length (1 byte), and data. Only the
//! handful of options this responder reads or writes are decoded; every other
//! option is skipped by its length so that the options after it stay aligned.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Size of the options region carried by a packet.
///
/// Large enough for the message type, subnet mask, server identifier,
/// lease time and requested address options in both directions.
pub const OPTIONS_REGION_SIZE: usize = 128;

/// DHCP option codes understood by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). A single byte without length.
    Pad = 0,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Requested IP address (RFC 2132 §9.1).
    RequestedIpAddress = 50,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// End of options marker. A single byte without length.
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with IP offer.
    Offer = 2,
    /// Client request for offered parameters.
    Request = 3,
    /// Client indicates address is already in use.
    Decline = 4,
    /// Server acknowledgement with configuration.
    Ack = 5,
    /// Server negative acknowledgement.
    Nak = 6,
    /// Client releases IP address.
    Release = 7,
    /// Client requests config without IP allocation.
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// A decoded DHCP option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpOption {
    /// Subnet mask (Option 1).
    SubnetMask(Ipv4Addr),
    /// Client's requested IP address (Option 50).
    RequestedIpAddress(Ipv4Addr),
    /// Lease time in seconds (Option 51). `u32::MAX` means infinite.
    LeaseTime(u32),
    /// DHCP message type (Option 53).
    MessageType(MessageType),
    /// Server identifier - IP of the DHCP server (Option 54).
    ServerIdentifier(Ipv4Addr),
}

impl DhcpOption {
    /// Returns the RFC 2132 option code for this option.
    pub fn option_code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
        }
    }

    /// Parses a DHCP option from its code and raw data.
    ///
    /// Returns `Ok(None)` for options this server does not use, including a
    /// message type value outside RFC 2132, so the caller can discard them.
    /// Subnet mask and lease time are only ever sent by the server; a client
    /// copy with an odd length is discarded the same way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] if a message type, server identifier
    /// or requested IP address option carries a payload of the wrong size.
    pub fn parse(code: u8, data: &[u8]) -> Result<Option<Self>> {
        let option = match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => match <[u8; 4]>::try_from(data) {
                Ok(octets) => Self::SubnetMask(Ipv4Addr::from(octets)),
                Err(_) => return Ok(None),
            },
            Ok(OptionCode::RequestedIpAddress) => {
                Self::RequestedIpAddress(parse_address(data, "requested IP address")?)
            }
            Ok(OptionCode::LeaseTime) => match <[u8; 4]>::try_from(data) {
                Ok(bytes) => Self::LeaseTime(u32::from_be_bytes(bytes)),
                Err(_) => return Ok(None),
            },
            Ok(OptionCode::MessageType) => {
                let [value] = data else {
                    return Err(Error::MalformedPacket(
                        "Invalid message type length".to_string(),
                    ));
                };
                match MessageType::try_from(*value) {
                    Ok(message_type) => Self::MessageType(message_type),
                    Err(_) => return Ok(None),
                }
            }
            Ok(OptionCode::ServerIdentifier) => {
                Self::ServerIdentifier(parse_address(data, "server identifier")?)
            }
            Ok(OptionCode::Pad) | Ok(OptionCode::End) => {
                return Err(Error::MalformedPacket(
                    "Pad/End should not be parsed as options".to_string(),
                ));
            }
            Err(_) => return Ok(None),
        };
        Ok(Some(option))
    }

    /// Encodes the option to its wire format (code + length + data).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::SubnetMask(addr) => encode_address(OptionCode::SubnetMask, *addr),
            Self::RequestedIpAddress(addr) => {
                encode_address(OptionCode::RequestedIpAddress, *addr)
            }
            Self::LeaseTime(time) => {
                let mut result = vec![OptionCode::LeaseTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::MessageType(msg_type) => {
                vec![OptionCode::MessageType as u8, 1, *msg_type as u8]
            }
            Self::ServerIdentifier(addr) => encode_address(OptionCode::ServerIdentifier, *addr),
        }
    }
}

fn parse_address(data: &[u8], name: &str) -> Result<Ipv4Addr> {
    let octets: [u8; 4] = data
        .try_into()
        .map_err(|_| Error::MalformedPacket(format!("Invalid {} length", name)))?;
    Ok(Ipv4Addr::from(octets))
}

fn encode_address(code: OptionCode, addr: Ipv4Addr) -> Vec<u8> {
    let mut result = vec![code as u8, 4];
    result.extend_from_slice(&addr.octets());
    result
}

/// Decodes the option stream of an options region.
///
/// Stops at the End marker or at the end of `region`, whichever comes first.
/// Unknown options are consumed and dropped.
///
/// # Errors
///
/// Returns [`Error::MalformedPacket`] if an option's length byte is missing
/// or its data would run past the end of `region`.
pub fn decode_options(region: &[u8]) -> Result<Vec<DhcpOption>> {
    let mut options = Vec::new();
    let mut index = 0;

    while index < region.len() {
        let code = region[index];

        if code == OptionCode::Pad as u8 {
            index += 1;
            continue;
        }

        if code == OptionCode::End as u8 {
            break;
        }

        let Some(&length) = region.get(index + 1) else {
            return Err(Error::MalformedPacket("Option length missing".to_string()));
        };
        let start = index + 2;
        let end = start + length as usize;

        let Some(data) = region.get(start..end) else {
            return Err(Error::MalformedPacket(format!(
                "Option {} claims {} bytes, {} remain",
                code,
                length,
                region.len() - start
            )));
        };

        if let Some(option) = DhcpOption::parse(code, data)? {
            options.push(option);
        }

        index = end;
    }

    Ok(options)
}

/// Encodes `options` in order and appends the End marker.
pub fn encode_options(options: &[DhcpOption]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(OPTIONS_REGION_SIZE);
    for option in options {
        encoded.extend_from_slice(&option.encode());
    }
    encoded.push(OptionCode::End as u8);
    encoded
}
