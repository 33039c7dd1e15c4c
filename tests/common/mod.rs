//! Common test utilities: an in-memory stand-in for the IPAM service.
//!
//! The fake keeps the whole address space under one mutex and implements
//! the same contract the HTTP client does: sequential child carving,
//! lowest-free next-free allocation, declined claims for taken addresses,
//! and confirmed releases. Next-free allocation can be made to fail after
//! a set number of successes to exercise the failure paths.

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use ipnet::Ipv4Net;

use ipam_loadtest::ipam::{AddressRecord, AddressSpace, NextFree, Prefix};
use ipam_loadtest::{LoadtestError, Result};

struct PrefixState {
    id: u64,
    net: Ipv4Net,
    assigned: BTreeSet<Ipv4Addr>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    live: Vec<PrefixState>,
    carved: Vec<String>,
    deleted: Vec<String>,
    records: HashMap<u64, (u64, Ipv4Addr)>,
    cursors: HashMap<String, usize>,
    next_free_successes: usize,
    fail_next_free_after: Option<usize>,
}

pub struct FakeAddressSpace {
    state: Mutex<State>,
}

impl FakeAddressSpace {
    pub fn new() -> Self {
        FakeAddressSpace {
            state: Mutex::new(State::default()),
        }
    }

    /// Like `new`, but next-free allocation returns a transport error once
    /// `limit` allocations have succeeded across the fake's lifetime.
    pub fn failing_after(limit: usize) -> Self {
        let fake = FakeAddressSpace::new();
        fake.state.lock().unwrap().fail_next_free_after = Some(limit);
        fake
    }

    /// CIDRs of every prefix ever carved, in carve order.
    pub fn carved(&self) -> Vec<String> {
        self.state.lock().unwrap().carved.clone()
    }

    /// CIDRs of every prefix deleted, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// CIDRs of prefixes that still exist.
    pub fn live(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.live.iter().map(|p| p.net.to_string()).collect()
    }

    /// Bare addresses currently assigned in the given prefix, in numeric order.
    pub fn assigned_addresses(&self, cidr: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .live
            .iter()
            .find(|p| p.net.to_string() == cidr)
            .map(|p| p.assigned.iter().map(|a| a.to_string()).collect())
            .unwrap_or_default()
    }

    /// Total assignments still held anywhere.
    pub fn outstanding_assignments(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

impl State {
    fn assign(&mut self, prefix_index: usize, host: Ipv4Addr) -> AddressRecord {
        let id = self.next_id;
        self.next_id += 1;

        let prefix = &mut self.live[prefix_index];
        prefix.assigned.insert(host);
        let record = AddressRecord {
            id,
            address: format!("{}/{}", host, prefix.net.prefix_len()),
        };
        self.records.insert(id, (prefix.id, host));
        record
    }
}

#[async_trait]
impl AddressSpace for FakeAddressSpace {
    async fn lookup_prefix(&self, cidr: &str) -> Result<Prefix> {
        let state = self.state.lock().unwrap();
        state
            .live
            .iter()
            .find(|p| p.net.to_string() == cidr)
            .map(|p| Prefix {
                id: p.id,
                prefix: p.net.to_string(),
            })
            .ok_or_else(|| LoadtestError::Api(format!("prefix {} not found", cidr)))
    }

    async fn delete_prefix(&self, prefix: &Prefix) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .live
            .iter()
            .position(|p| p.id == prefix.id)
            .ok_or_else(|| {
                LoadtestError::Api(format!("prefix {} deleted more than once", prefix.prefix))
            })?;
        let removed = state.live.remove(index);
        let prefix_id = removed.id;
        state.records.retain(|_, (owner, _)| *owner != prefix_id);
        state.deleted.push(removed.net.to_string());
        Ok(())
    }

    async fn carve_child_prefix(&self, parent_cidr: &str, prefix_length: u8) -> Result<Prefix> {
        let parent: Ipv4Net = parent_cidr
            .parse()
            .map_err(|e| LoadtestError::Api(format!("bad parent prefix {}: {}", parent_cidr, e)))?;

        let mut state = self.state.lock().unwrap();
        let index = {
            let cursor = state.cursors.entry(parent_cidr.to_string()).or_insert(0);
            let index = *cursor;
            *cursor += 1;
            index
        };

        let net = parent
            .subnets(prefix_length)
            .map_err(|e| LoadtestError::Api(format!("cannot carve /{}: {}", prefix_length, e)))?
            .nth(index)
            .ok_or_else(|| LoadtestError::Api(format!("parent {} is exhausted", parent_cidr)))?;

        let id = state.next_id;
        state.next_id += 1;
        state.live.push(PrefixState {
            id,
            net,
            assigned: BTreeSet::new(),
        });
        state.carved.push(net.to_string());

        Ok(Prefix {
            id,
            prefix: net.to_string(),
        })
    }

    async fn allocate_next_free(&self, prefix: &Prefix) -> Result<NextFree> {
        let mut state = self.state.lock().unwrap();

        if let Some(limit) = state.fail_next_free_after {
            if state.next_free_successes >= limit {
                return Err(LoadtestError::Network("injected transport failure".into()));
            }
        }

        let index = state
            .live
            .iter()
            .position(|p| p.id == prefix.id)
            .ok_or_else(|| LoadtestError::Api(format!("unknown prefix {}", prefix.prefix)))?;

        let free = state.live[index]
            .net
            .hosts()
            .find(|host| !state.live[index].assigned.contains(host));

        match free {
            Some(host) => {
                state.next_free_successes += 1;
                Ok(NextFree::Allocated(state.assign(index, host)))
            }
            None => Ok(NextFree::Exhausted),
        }
    }

    async fn claim_address(
        &self,
        address: &str,
        _description: &str,
    ) -> Result<Option<AddressRecord>> {
        let host: Ipv4Addr = address
            .parse()
            .map_err(|e| LoadtestError::Api(format!("bad address {}: {}", address, e)))?;

        let mut state = self.state.lock().unwrap();
        let index = state
            .live
            .iter()
            .position(|p| p.net.contains(&host))
            .ok_or_else(|| LoadtestError::Api(format!("{} is outside every prefix", address)))?;

        if state.live[index].assigned.contains(&host) {
            return Ok(None);
        }
        Ok(Some(state.assign(index, host)))
    }

    async fn release_address(&self, record: &AddressRecord) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.records.remove(&record.id) {
            Some((prefix_id, host)) => {
                if let Some(prefix) = state.live.iter_mut().find(|p| p.id == prefix_id) {
                    prefix.assigned.remove(&host);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
