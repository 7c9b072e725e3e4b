use std::cell::Cell;

use serde::Serialize;

/// Host identifier, equal to the host position in the datacenter host list.
pub type HostId = u32;

/// Virtual machine identifier, unique within a simulation.
pub type VmId = u32;

/// Cloudlet identifier, unique within a simulation.
pub type CloudletId = u32;

/// Result of checking whether a VM fits on a host.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum AllocationVerdict {
    NotEnoughPes,
    NotEnoughRam,
    NotEnoughBandwidth,
    NotEnoughStorage,
    Success,
}

/// Hands out VM and cloudlet identifiers shared by all brokers of a simulation.
#[derive(Default)]
pub struct IdGenerator {
    next_vm: Cell<VmId>,
    next_cloudlet: Cell<CloudletId>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_vm_id(&self) -> VmId {
        let id = self.next_vm.get();
        self.next_vm.set(id + 1);
        id
    }

    pub fn next_cloudlet_id(&self) -> CloudletId {
        let id = self.next_cloudlet.get();
        self.next_cloudlet.set(id + 1);
        id
    }
}
