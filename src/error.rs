//! Error types for the DHCP responder.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Only the configuration and socket
//! variants are fatal, and only at startup; everything a worker sees while
//! serving is logged and the worker moves on to the next datagram.

use std::net::Ipv4Addr;

/// Errors that can occur during DHCP server operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    ///
    /// Inside a worker this is a transport failure on receive or send.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Datagram that is not a well-formed DHCP client request.
    ///
    /// Covers packets that are too short, carry the wrong opcode or magic
    /// cookie, or contain an option whose length runs past the options region.
    #[error("Malformed DHCP packet: {0}")]
    MalformedPacket(String),

    /// Every slot of the lease table is held by an unexpired client.
    #[error("No available IP addresses in pool")]
    NoAddressAvailable,

    /// The address is in the pool but reserved for a different client.
    #[error("Address {0} is held by a different client")]
    OwnershipMismatch(Ipv4Addr),

    /// The address is outside the pool served by this interface.
    #[error("Address {0} is outside the configured pool range")]
    UnknownAddress(Ipv4Addr),

    /// Invalid server configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 67 without sufficient privileges,
    /// or when the configured network device does not exist.
    #[error("Socket error: {0}")]
    Socket(String),
}

/// A specialized Result type for DHCP operations.
pub type Result<T> = std::result::Result<T, Error>;
