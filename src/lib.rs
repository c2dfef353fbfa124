//! # tinylease
//!
//! A minimal DHCP responder (RFC 2131) for small isolated networks.
//!
//! ## Features
//!
//! - DISCOVER/OFFER and REQUEST/ACK/NAK, nothing else
//! - Up to four interfaces, each with its own pool of at most 32 addresses
//! - In-memory leases, keyed by client MAC address
//! - Async/await with Tokio, one task per interface
//!
//! ## Quick Start
//!
//! ```no_run
//! use tinylease::{Config, DhcpServer};
//!
//! #[tokio::main]
//! async fn main() -> tinylease::Result<()> {
//!     let config = Config::load_or_create("tinylease.json")?;
//!     let server = DhcpServer::new(&config)?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Config`] - Per-interface server IP, mask, pool and lease duration
//! - [`DhcpServer`] - Spawns one [`Worker`] per interface on UDP port 67
//! - [`RequestHandler`] - Turns a request into an OFFER, ACK or NAK
//! - [`LeaseTable`] - Fixed-capacity pool with expiry-based reuse
//! - [`DhcpPacket`] - DHCP packet parsing and encoding
//! - [`DhcpOption`] - The handful of options the server reads and writes

pub mod clock;
pub mod config;
pub mod error;
pub mod lease;
pub mod options;
pub mod packet;
pub mod server;

pub use clock::MonotonicClock;
pub use config::{Config, InterfaceConfig};
pub use error::{Error, Result};
pub use lease::{LeaseEntry, LeaseTable};
pub use options::{DhcpOption, MessageType};
pub use packet::{DhcpPacket, HardwareAddress};
pub use server::{DhcpServer, LeaseGrant, RequestHandler, Response, Worker};
