//! Per-interface lease table.
//!
//! The table is a fixed array of slots, one per address in the pool. Slot `i`
//! always stands for `range_start + i`, so no address is stored per lease.
//! A slot is free while its hardware address is all zeros; once claimed it
//! stays with its client until it has expired and the allocator needs it for
//! someone else. There is no explicit release.
//!
//! Expiry timestamps are seconds from [`MonotonicClock`](crate::clock::MonotonicClock).

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::packet::HardwareAddress;

/// Upper bound on the number of addresses one interface hands out.
///
/// Larger ranges are truncated to their first `MAX_POOL_SIZE` addresses.
pub const MAX_POOL_SIZE: usize = 32;

/// How long an OFFER reserves an address before the client's REQUEST.
pub const OFFER_HOLD_SECONDS: u32 = 42;

/// One slot of the lease table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseEntry {
    /// Owner of the slot, or all zeros if the slot was never used.
    pub hardware_address: HardwareAddress,
    /// Seconds since server start after which the slot may be reclaimed.
    pub expires_at: u32,
}

impl LeaseEntry {
    pub fn is_unused(&self) -> bool {
        self.hardware_address.is_unspecified()
    }

    pub fn is_expired(&self, now: u32) -> bool {
        self.expires_at < now
    }
}

/// Fixed-capacity address pool for one interface.
#[derive(Debug, Clone)]
pub struct LeaseTable {
    range_start: u32,
    entries: Vec<LeaseEntry>,
}

impl LeaseTable {
    /// Creates an empty table for `range_start..=range_end`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `range_start > range_end`.
    pub fn new(range_start: Ipv4Addr, range_end: Ipv4Addr) -> Result<Self> {
        let start = u32::from(range_start);
        let end = u32::from(range_end);

        if start > end {
            return Err(Error::InvalidConfig(format!(
                "range start {} is above range end {}",
                range_start, range_end
            )));
        }

        let range_size = u64::from(end - start) + 1;
        let size = range_size.min(MAX_POOL_SIZE as u64) as usize;

        Ok(Self {
            range_start: start,
            entries: vec![LeaseEntry::default(); size],
        })
    }

    /// Returns the first and last address actually served.
    pub fn range(&self) -> (Ipv4Addr, Ipv4Addr) {
        (
            Ipv4Addr::from(self.range_start),
            self.address_at(self.entries.len() - 1),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LeaseEntry] {
        &self.entries
    }

    /// Returns the slot for `ip`, or `None` if `ip` is outside the pool.
    pub fn entry(&self, ip: Ipv4Addr) -> Option<&LeaseEntry> {
        self.index_of(ip).map(|index| &self.entries[index])
    }

    /// Picks an address for a DISCOVER from `hardware_address`.
    ///
    /// # Allocation Order
    ///
    /// Slots are scanned from the lowest address. The first slot that is
    /// already owned by this client, or has never been used, is taken. A
    /// client therefore gets the same address back for as long as nobody
    /// else has reclaimed its slot.
    ///
    /// If no such slot exists, an expired slot is reclaimed. When several
    /// have expired, the one with the highest address wins.
    ///
    /// The chosen slot is reserved for [`OFFER_HOLD_SECONDS`]; only
    /// [`confirm_lease`](Self::confirm_lease) extends it to a full lease.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAddressAvailable`] if every slot belongs to another
    /// client whose lease is still running.
    pub fn assign_address(
        &mut self,
        hardware_address: HardwareAddress,
        now: u32,
    ) -> Result<Ipv4Addr> {
        let mut selected = None;
        let mut expired = None;

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.hardware_address == hardware_address || entry.is_unused() {
                selected = Some(index);
                break;
            }

            if entry.is_expired(now) {
                expired = Some(index);
            }
        }

        let index = selected.or(expired).ok_or(Error::NoAddressAvailable)?;

        self.entries[index] = LeaseEntry {
            hardware_address,
            expires_at: now.saturating_add(OFFER_HOLD_SECONDS),
        };

        Ok(self.address_at(index))
    }

    /// Turns the reservation of `ip` into a lease of `lease_duration` seconds.
    ///
    /// The expiry saturates at `u32::MAX`, which is how infinite leases are
    /// stored.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownAddress`] if `ip` is outside the pool
    /// - [`Error::OwnershipMismatch`] if the slot belongs to someone else;
    ///   the slot is left untouched
    pub fn confirm_lease(
        &mut self,
        ip: Ipv4Addr,
        hardware_address: HardwareAddress,
        now: u32,
        lease_duration: u32,
    ) -> Result<()> {
        let index = self.owned_index(ip, hardware_address)?;
        self.entries[index].expires_at = now.saturating_add(lease_duration);
        Ok(())
    }

    /// Checks that [`confirm_lease`](Self::confirm_lease) would succeed,
    /// without changing anything.
    pub fn check_owner(&self, ip: Ipv4Addr, hardware_address: HardwareAddress) -> Result<()> {
        self.owned_index(ip, hardware_address).map(|_| ())
    }

    fn owned_index(&self, ip: Ipv4Addr, hardware_address: HardwareAddress) -> Result<usize> {
        let index = self.index_of(ip).ok_or(Error::UnknownAddress(ip))?;

        if self.entries[index].hardware_address != hardware_address {
            return Err(Error::OwnershipMismatch(ip));
        }

        Ok(index)
    }

    fn index_of(&self, ip: Ipv4Addr) -> Option<usize> {
        let offset = u32::from(ip).checked_sub(self.range_start)? as usize;
        (offset < self.entries.len()).then_some(offset)
    }

    fn address_at(&self, index: usize) -> Ipv4Addr {
        Ipv4Addr::from(self.range_start + index as u32)
    }
}
