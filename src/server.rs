use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::MonotonicClock;
use crate::config::{Config, INFINITE_LEASE, InterfaceConfig};
use crate::error::{Error, Result};
use crate::lease::LeaseTable;
use crate::options::{DhcpOption, MessageType};
use crate::packet::{BOOTREQUEST, DhcpPacket, HardwareAddress};

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const RECV_BUFFER_SIZE: usize = 1500;

/// Runs one [`Worker`] per configured interface.
pub struct DhcpServer {
    workers: Vec<Worker>,
}

impl DhcpServer {
    /// Binds a socket and builds an empty lease table for every interface.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let clock = MonotonicClock::new();
        let mut workers = Vec::with_capacity(config.interfaces.len());

        for interface in &config.interfaces {
            let handler = RequestHandler::new(interface.clone())?;
            let socket = create_socket(interface)?;

            let (range_start, range_end) = handler.leases().range();
            info!("Host  : {}", interface.server_ip);
            info!(
                "Range : {} - {} ({} addresses)",
                range_start,
                range_end,
                handler.leases().len()
            );
            info!("Lease : {}", format_lease(handler.lease_duration()));

            workers.push(Worker::new(socket, handler, clock));
        }

        Ok(Self { workers })
    }

    /// Serves until every worker has stopped, which in practice is never.
    pub async fn run(self) -> Result<()> {
        let mut tasks = JoinSet::new();

        for worker in self.workers {
            tasks.spawn(worker.run());
        }

        info!("DHCP server ready and listening");

        while let Some(result) = tasks.join_next().await {
            if let Err(error) = result {
                error!("Worker task failed: {}", error);
            }
        }

        Ok(())
    }
}

/// Receive/respond loop for one interface.
///
/// The worker owns its socket and lease table outright; nothing is shared
/// with other workers except a copy of the clock.
pub struct Worker {
    socket: UdpSocket,
    handler: RequestHandler,
    clock: MonotonicClock,
    reply_to: SocketAddr,
}

impl Worker {
    pub fn new(socket: UdpSocket, handler: RequestHandler, clock: MonotonicClock) -> Self {
        Self {
            socket,
            handler,
            clock,
            reply_to: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DHCP_CLIENT_PORT),
        }
    }

    /// Sends replies to `address` instead of the limited broadcast address.
    pub fn with_reply_address(mut self, address: SocketAddr) -> Self {
        self.reply_to = address;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Handles datagrams one at a time, forever.
    pub async fn run(mut self) {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        loop {
            self.serve_one(&mut buffer).await;
        }
    }

    /// Receives one datagram and answers it.
    ///
    /// A lease granted by an ACK is only recorded once the ACK has been
    /// sent; if the send fails the address keeps its OFFER hold. Receive and
    /// send failures are logged and otherwise ignored.
    async fn serve_one(&mut self, buffer: &mut [u8]) {
        let (size, source) = match self.socket.recv_from(buffer).await {
            Ok(received) => received,
            Err(error) => {
                error!("Error receiving packet: {}", error);
                return;
            }
        };

        let now = self.clock.seconds_since_start();
        let response = match self.handler.handle_packet(&buffer[..size], now) {
            Ok(Some(response)) => response,
            Ok(None) => return,
            Err(error @ Error::MalformedPacket(_)) => {
                debug!("Dropping packet from {}: {}", source, error);
                return;
            }
            Err(error) => {
                warn!("Error handling packet from {}: {}", source, error);
                return;
            }
        };

        if let Err(error) = self
            .socket
            .send_to(&response.reply.encode(), self.reply_to)
            .await
        {
            warn!("Error sending reply to {}: {}", self.reply_to, error);
            return;
        }

        if let Some(grant) = response.grant
            && let Err(error) = self.handler.commit(grant, now)
        {
            warn!("Could not record lease for {}: {}", grant.hardware_address, error);
        }
    }
}

/// A reply for the client, plus the lease it grants.
#[derive(Debug, Clone)]
pub struct Response {
    pub reply: DhcpPacket,
    /// Set for an ACK; pass to [`RequestHandler::commit`] once the reply
    /// has been sent.
    pub grant: Option<LeaseGrant>,
}

impl Response {
    fn without_grant(reply: DhcpPacket) -> Self {
        Self { reply, grant: None }
    }
}

/// An acknowledged but not yet recorded lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseGrant {
    pub ip: Ipv4Addr,
    pub hardware_address: HardwareAddress,
}

/// Protocol logic for one interface.
///
/// Turns one inbound datagram into at most one reply. DISCOVER reserves an
/// address straight away; the lease behind an ACK is recorded by
/// [`commit`](Self::commit).
#[derive(Debug)]
pub struct RequestHandler {
    config: InterfaceConfig,
    leases: LeaseTable,
    lease_duration: u32,
}

impl RequestHandler {
    pub fn new(config: InterfaceConfig) -> Result<Self> {
        let (range_start, range_end) = config.address_range()?;
        let leases = LeaseTable::new(range_start, range_end)?;

        if leases.range().1 != range_end {
            warn!(
                "Pool {} - {} is larger than {} addresses, serving {} - {}",
                range_start,
                range_end,
                leases.len(),
                leases.range().0,
                leases.range().1
            );
        }

        let lease_duration = config.lease_duration();
        Ok(Self {
            config,
            leases,
            lease_duration,
        })
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    /// Lease duration handed to clients; `u32::MAX` is infinite.
    pub fn lease_duration(&self) -> u32 {
        self.lease_duration
    }

    /// Decodes `data` and builds the reply, if any.
    ///
    /// `now` is the current reading of the server clock. DISCOVER and REQUEST
    /// always get a reply; every other message type gets `Ok(None)`. An ACK
    /// comes with a [`LeaseGrant`] that the caller commits after sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] for anything that is not a DHCP
    /// client request. The lease table is not touched in that case.
    pub fn handle_packet(&mut self, data: &[u8], now: u32) -> Result<Option<Response>> {
        let packet = DhcpPacket::parse(data)?;

        if packet.op != BOOTREQUEST {
            return Err(Error::MalformedPacket("Expected BOOTREQUEST".to_string()));
        }

        match packet.message_type() {
            Some(MessageType::Discover) => Ok(Some(self.handle_discover(&packet, now))),
            Some(MessageType::Request) => Ok(Some(self.handle_request(&packet))),
            Some(message_type) => {
                debug!(
                    "Ignoring {} from {}",
                    message_type,
                    packet.hardware_address()
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn handle_discover(&mut self, packet: &DhcpPacket, now: u32) -> Response {
        let mac = packet.hardware_address();

        let reply = match self.leases.assign_address(mac, now) {
            Ok(offered_ip) => {
                info!("OFFER {} to {}", offered_ip, mac);
                DhcpPacket::create_reply(
                    packet,
                    MessageType::Offer,
                    offered_ip,
                    self.build_reply_options(),
                )
            }
            Err(error) => self.nak(packet, mac, &error.to_string()),
        };
        Response::without_grant(reply)
    }

    fn handle_request(&self, packet: &DhcpPacket) -> Response {
        let mac = packet.hardware_address();

        if let Some(server_id) = packet.server_identifier()
            && server_id != self.config.server_ip
        {
            return Response::without_grant(self.nak(
                packet,
                mac,
                &format!("REQUEST is for different server {}", server_id),
            ));
        }

        let requested_ip = if packet.ciaddr.is_unspecified() {
            packet.requested_ip()
        } else {
            Some(packet.ciaddr)
        };

        let Some(requested_ip) = requested_ip else {
            return Response::without_grant(self.nak(packet, mac, "No IP address in REQUEST"));
        };

        match self.leases.check_owner(requested_ip, mac) {
            Ok(()) => Response {
                reply: DhcpPacket::create_reply(
                    packet,
                    MessageType::Ack,
                    requested_ip,
                    self.build_reply_options(),
                ),
                grant: Some(LeaseGrant {
                    ip: requested_ip,
                    hardware_address: mac,
                }),
            },
            Err(error) => Response::without_grant(self.nak(packet, mac, &error.to_string())),
        }
    }

    /// Records the lease behind an ACK that has been sent.
    pub fn commit(&mut self, grant: LeaseGrant, now: u32) -> Result<()> {
        self.leases
            .confirm_lease(grant.ip, grant.hardware_address, now, self.lease_duration)?;

        info!(
            "Allotted {} to {} for {} at {}",
            grant.ip,
            grant.hardware_address,
            format_lease(self.lease_duration),
            chrono::Local::now().format("%H:%M:%S")
        );
        Ok(())
    }

    fn nak(&self, packet: &DhcpPacket, mac: HardwareAddress, reason: &str) -> DhcpPacket {
        info!("NAK to {}: {}", mac, reason);
        DhcpPacket::create_reply(packet, MessageType::Nak, Ipv4Addr::UNSPECIFIED, Vec::new())
    }

    /// Options of an OFFER or ACK, after the message type.
    fn build_reply_options(&self) -> Vec<DhcpOption> {
        vec![
            DhcpOption::SubnetMask(self.config.subnet_mask),
            DhcpOption::ServerIdentifier(self.config.server_ip),
            DhcpOption::LeaseTime(self.lease_duration),
        ]
    }
}

fn format_lease(lease_duration: u32) -> String {
    if lease_duration == INFINITE_LEASE {
        "infinite".to_string()
    } else {
        format!("{}s", lease_duration)
    }
}

/// Creates the UDP socket for one interface, bound to port 67.
///
/// With `interface` set on Linux, the socket is tied to that device and bound
/// to the wildcard address so that broadcasts arriving on it are received.
/// Otherwise it is bound to the server IP.
fn create_socket(config: &InterfaceConfig) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

    socket
        .set_broadcast(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

    let bind_ip = bind_to_interface(&socket, config)?;
    let bind_addr = SocketAddrV4::new(bind_ip, DHCP_SERVER_PORT);
    socket.bind(&bind_addr.into()).map_err(|error| {
        Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
    })?;

    let std_socket: std::net::UdpSocket = socket.into();
    let tokio_socket = UdpSocket::from_std(std_socket).map_err(|error| {
        Error::Socket(format!("Failed to convert to tokio socket: {}", error))
    })?;

    Ok(tokio_socket)
}

#[cfg(target_os = "linux")]
fn bind_to_interface(socket: &Socket, config: &InterfaceConfig) -> Result<Ipv4Addr> {
    match &config.interface {
        Some(device) => {
            socket.bind_device(Some(device.as_bytes())).map_err(|error| {
                Error::Socket(format!(
                    "Failed to set SO_BINDTODEVICE on {}: {}",
                    device, error
                ))
            })?;
            Ok(Ipv4Addr::UNSPECIFIED)
        }
        None => Ok(config.server_ip),
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_to_interface(_socket: &Socket, config: &InterfaceConfig) -> Result<Ipv4Addr> {
    if let Some(device) = &config.interface {
        warn!(
            "interface ({}) is only supported on Linux and will be ignored",
            device
        );
    }
    Ok(config.server_ip)
}
