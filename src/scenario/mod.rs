//! The three allocation/deallocation access patterns under test.
//!
//! Each scenario drives one exclusively owned prefix through a full
//! allocate-then-release cycle and records a per-address timing for every
//! round trip it wants in the report. Maps are insertion-ordered so the
//! report preserves operation order.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Instant;

use indexmap::IndexMap;
use ipnet::Ipv4Net;
use rand::seq::SliceRandom;

use crate::ipam::{AddressRecord, AddressSpace, NextFree, Prefix};
use crate::{LoadtestError, Result};

const SEED_DESCRIPTION: &str = "ipam-loadtest fragmentation seed";
const CLAIM_DESCRIPTION: &str = "ipam-loadtest claimed this address";

/// The fixed set of access patterns, in worker run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    NextFree,
    NextFreeFragmented,
    Scattered,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::NextFree,
        ScenarioKind::NextFreeFragmented,
        ScenarioKind::Scattered,
    ];

    /// Stable label used as the report column heading.
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioKind::NextFree => "next_free",
            ScenarioKind::NextFreeFragmented => "next_free_fragmented",
            ScenarioKind::Scattered => "scattered_assignments",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-scenario timing data: one entry per timed round trip, keyed by bare
/// address, insertion order = operation order.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub prefix: String,
    pub allocate: IndexMap<String, f64>,
    pub deallocate: IndexMap<String, f64>,
}

impl ScenarioReport {
    fn new(prefix: &Prefix) -> Self {
        ScenarioReport {
            prefix: prefix.prefix.clone(),
            allocate: IndexMap::new(),
            deallocate: IndexMap::new(),
        }
    }
}

/// Run one scenario against one prefix.
pub async fn run(
    kind: ScenarioKind,
    space: &dyn AddressSpace,
    prefix: &Prefix,
) -> Result<ScenarioReport> {
    match kind {
        ScenarioKind::NextFree => next_free_exhaustion(space, prefix).await,
        ScenarioKind::NextFreeFragmented => next_free_fragmented(space, prefix).await,
        ScenarioKind::Scattered => scattered_assignments(space, prefix).await,
    }
}

/// Drain the prefix through next-free allocation, then release everything
/// in allocation (FIFO) order.
///
/// Allocation runs until the service reports exhaustion, never to a fixed
/// count, so the scenario adapts to whatever the prefix actually holds.
pub async fn next_free_exhaustion(
    space: &dyn AddressSpace,
    prefix: &Prefix,
) -> Result<ScenarioReport> {
    let mut report = ScenarioReport::new(prefix);
    exhaust_and_release(space, prefix, &mut report).await?;
    Ok(report)
}

/// Like [`next_free_exhaustion`], but with every odd-valued host address
/// pre-claimed so the allocator has to walk a fragmented prefix.
///
/// Seeding and its cleanup are bookkeeping, not measurement: neither shows
/// up in the report, and cleanup runs even when the measured pass fails.
pub async fn next_free_fragmented(
    space: &dyn AddressSpace,
    prefix: &Prefix,
) -> Result<ScenarioReport> {
    let mut report = ScenarioReport::new(prefix);

    let mut seeds = Vec::new();
    for host in host_addresses(&prefix.prefix)? {
        if u32::from(host) % 2 == 1 {
            if let Some(record) = space.claim_address(&host.to_string(), SEED_DESCRIPTION).await? {
                seeds.push(record);
            }
        }
    }

    let outcome = exhaust_and_release(space, prefix, &mut report).await;

    let mut cleanup: Result<()> = Ok(());
    for record in &seeds {
        if let Err(e) = space.release_address(record).await {
            if cleanup.is_ok() {
                cleanup = Err(e);
            }
        }
    }

    outcome?;
    cleanup?;
    Ok(report)
}

/// Claim every host address explicitly, in uniformly random order, then
/// release the successful claims in that same order.
///
/// A declined claim is skipped: not retried, not recorded.
pub async fn scattered_assignments(
    space: &dyn AddressSpace,
    prefix: &Prefix,
) -> Result<ScenarioReport> {
    let mut report = ScenarioReport::new(prefix);

    let mut order = host_addresses(&prefix.prefix)?;
    order.shuffle(&mut rand::thread_rng());

    let mut claimed = Vec::new();
    for host in &order {
        let start = Instant::now();
        if let Some(record) = space.claim_address(&host.to_string(), CLAIM_DESCRIPTION).await? {
            report
                .allocate
                .insert(host.to_string(), start.elapsed().as_secs_f64());
            claimed.push(record);
        }
    }

    release_in_order(space, &claimed, &mut report.deallocate).await?;
    Ok(report)
}

/// The shared exhaust-then-release pass: allocate via next-free until the
/// service signals exhaustion, then release in allocation order.
async fn exhaust_and_release(
    space: &dyn AddressSpace,
    prefix: &Prefix,
    report: &mut ScenarioReport,
) -> Result<()> {
    let mut assigned = Vec::new();
    loop {
        let start = Instant::now();
        match space.allocate_next_free(prefix).await? {
            NextFree::Allocated(record) => {
                report
                    .allocate
                    .insert(record.bare_address().to_string(), start.elapsed().as_secs_f64());
                assigned.push(record);
            }
            NextFree::Exhausted => break,
        }
    }

    release_in_order(space, &assigned, &mut report.deallocate).await
}

/// Release records in the given order, recording a timing for each release
/// the service confirms.
async fn release_in_order(
    space: &dyn AddressSpace,
    records: &[AddressRecord],
    timings: &mut IndexMap<String, f64>,
) -> Result<()> {
    for record in records {
        let start = Instant::now();
        if space.release_address(record).await? {
            timings.insert(record.bare_address().to_string(), start.elapsed().as_secs_f64());
        }
    }
    Ok(())
}

/// All usable host addresses of a CIDR, lowest first. Network and
/// broadcast addresses are excluded, matching what the service will hand
/// out of the prefix.
pub fn host_addresses(cidr: &str) -> Result<Vec<Ipv4Addr>> {
    let net: Ipv4Net = cidr
        .parse()
        .map_err(|e| LoadtestError::Config(format!("invalid prefix {}: {}", cidr, e)))?;
    Ok(net.hosts().collect())
}
