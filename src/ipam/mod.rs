pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

pub use http::IpamClient;

use crate::Result;

/// A block of addresses carved out of the service's address space.
///
/// The id is assigned by the service and is the handle every other
/// operation wants; the prefix is the CIDR text used for report keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Prefix {
    pub id: u64,
    pub prefix: String,
}

/// One address assignment held against the service.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressRecord {
    pub id: u64,
    pub address: String,
}

impl AddressRecord {
    /// The address with its prefix length stripped ("10.0.0.1/30" -> "10.0.0.1").
    /// The service reports assignments in CIDR form; reports key by bare address.
    pub fn bare_address(&self) -> &str {
        self.address.split('/').next().unwrap_or(&self.address)
    }
}

/// Outcome of a next-free allocation.
///
/// Exhaustion is an expected terminal outcome of draining a block, not an
/// error, so it gets its own arm instead of riding the error channel.
#[derive(Debug)]
pub enum NextFree {
    Allocated(AddressRecord),
    Exhausted,
}

/// Operations the load test drives against the IPAM service.
///
/// Every method is a single network round trip; the round-trip latency is
/// what the scenarios measure. Implementations must be shareable across
/// concurrently running workers.
#[async_trait]
pub trait AddressSpace: Send + Sync {
    /// Look up an existing prefix by its CIDR.
    async fn lookup_prefix(&self, cidr: &str) -> Result<Prefix>;

    /// Delete a prefix. Any addresses still assigned under it are the
    /// caller's problem; the scenarios release everything they allocate.
    async fn delete_prefix(&self, prefix: &Prefix) -> Result<()>;

    /// Carve a new child prefix of the given length out of a parent.
    async fn carve_child_prefix(&self, parent_cidr: &str, prefix_length: u8) -> Result<Prefix>;

    /// Allocate the lowest free address in the prefix, or report exhaustion.
    async fn allocate_next_free(&self, prefix: &Prefix) -> Result<NextFree>;

    /// Claim one specific address. `Ok(None)` means the service declined
    /// the claim (already taken); callers skip, never retry.
    async fn claim_address(&self, address: &str, description: &str)
        -> Result<Option<AddressRecord>>;

    /// Release an assignment. Returns whether the service confirmed removal.
    async fn release_address(&self, record: &AddressRecord) -> Result<bool>;
}
