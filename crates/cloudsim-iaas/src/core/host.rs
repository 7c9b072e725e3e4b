//! Physical hosts and their processing elements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::{AllocationVerdict, HostId, VmId};
use crate::core::error::CloudError;
use crate::core::vm::VmSpec;

/// Host hardware description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Capacity in MIPS of each processing element.
    pub pes: Vec<f64>,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
}

impl HostSpec {
    /// Creates host description with `pes` identical processing elements.
    pub fn uniform(pes: u32, pe_mips: f64, ram: u64, bw: u64, storage: u64) -> Self {
        Self {
            pes: vec![pe_mips; pes as usize],
            ram,
            bw,
            storage,
        }
    }
}

/// Processing element. A busy PE is dedicated to a single VM.
#[derive(Clone, Debug, Serialize)]
pub struct Pe {
    pub mips: f64,
    pub vm_id: Option<VmId>,
    /// MIPS reserved by the VM on this PE.
    pub allocated_mips: f64,
}

impl Pe {
    pub fn is_free(&self) -> bool {
        self.vm_id.is_none()
    }
}

/// Resources reserved on a host for a single VM.
#[derive(Clone, Debug, Serialize)]
pub struct HostAllocation {
    pub pes: Vec<usize>,
    pub mips: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
}

/// Physical machine. Its capacity is fixed, allocations change only when VMs are placed or released.
#[derive(Clone, Debug, Serialize)]
pub struct Host {
    id: HostId,
    pes: Vec<Pe>,
    ram_total: u64,
    bw_total: u64,
    storage_total: u64,
    ram_allocated: u64,
    bw_allocated: u64,
    storage_allocated: u64,
    vms: BTreeMap<VmId, HostAllocation>,
}

impl Host {
    pub fn new(id: HostId, spec: &HostSpec) -> Self {
        Self {
            id,
            pes: spec
                .pes
                .iter()
                .map(|&mips| Pe {
                    mips,
                    vm_id: None,
                    allocated_mips: 0.,
                })
                .collect(),
            ram_total: spec.ram,
            bw_total: spec.bw,
            storage_total: spec.storage,
            ram_allocated: 0,
            bw_allocated: 0,
            storage_allocated: 0,
            vms: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    // Free PEs able to run a VM PE of the given speed, in host order.
    fn suitable_pes(&self, mips: f64) -> impl Iterator<Item = usize> + '_ {
        self.pes
            .iter()
            .enumerate()
            .filter(move |(_, pe)| pe.is_free() && pe.mips >= mips)
            .map(|(idx, _)| idx)
    }

    /// Checks whether the VM fits on this host right now.
    pub fn check_allocation(&self, vm: &VmSpec) -> AllocationVerdict {
        if self.suitable_pes(vm.mips).count() < vm.pes as usize {
            return AllocationVerdict::NotEnoughPes;
        }
        if self.available_ram() < vm.ram {
            return AllocationVerdict::NotEnoughRam;
        }
        if self.available_bw() < vm.bw {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        if self.available_storage() < vm.size {
            return AllocationVerdict::NotEnoughStorage;
        }
        AllocationVerdict::Success
    }

    pub fn can_allocate(&self, vm: &VmSpec) -> bool {
        self.check_allocation(vm) == AllocationVerdict::Success
    }

    /// Reserves host resources for the VM.
    pub fn allocate(&mut self, vm_id: VmId, vm: &VmSpec) -> Result<(), CloudError> {
        if self.vms.contains_key(&vm_id) {
            return Err(CloudError::InvalidState(format!(
                "vm #{} is already allocated on host #{}",
                vm_id, self.id
            )));
        }
        let verdict = self.check_allocation(vm);
        if verdict != AllocationVerdict::Success {
            return Err(CloudError::InsufficientCapacity {
                host_id: self.id,
                vm_id,
                verdict,
            });
        }
        let pes: Vec<usize> = self.suitable_pes(vm.mips).take(vm.pes as usize).collect();
        for &idx in &pes {
            self.pes[idx].vm_id = Some(vm_id);
            self.pes[idx].allocated_mips = vm.mips;
        }
        self.ram_allocated += vm.ram;
        self.bw_allocated += vm.bw;
        self.storage_allocated += vm.size;
        self.vms.insert(
            vm_id,
            HostAllocation {
                pes,
                mips: vm.mips,
                ram: vm.ram,
                bw: vm.bw,
                storage: vm.size,
            },
        );
        Ok(())
    }

    /// Returns all resources reserved by the VM. Releasing a VM not allocated here is an error.
    pub fn release(&mut self, vm_id: VmId) -> Result<HostAllocation, CloudError> {
        let alloc = self.vms.remove(&vm_id).ok_or_else(|| {
            CloudError::InvalidState(format!("vm #{} is not allocated on host #{}", vm_id, self.id))
        })?;
        for &idx in &alloc.pes {
            self.pes[idx].vm_id = None;
            self.pes[idx].allocated_mips = 0.;
        }
        self.ram_allocated -= alloc.ram;
        self.bw_allocated -= alloc.bw;
        self.storage_allocated -= alloc.storage;
        Ok(alloc)
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    pub fn free_pes(&self) -> usize {
        self.pes.iter().filter(|pe| pe.is_free()).count()
    }

    pub fn total_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.mips).sum()
    }

    pub fn allocated_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.allocated_mips).sum()
    }

    pub fn ram_total(&self) -> u64 {
        self.ram_total
    }

    pub fn bw_total(&self) -> u64 {
        self.bw_total
    }

    pub fn storage_total(&self) -> u64 {
        self.storage_total
    }

    pub fn allocated_ram(&self) -> u64 {
        self.ram_allocated
    }

    pub fn allocated_bw(&self) -> u64 {
        self.bw_allocated
    }

    pub fn allocated_storage(&self) -> u64 {
        self.storage_allocated
    }

    pub fn available_ram(&self) -> u64 {
        self.ram_total - self.ram_allocated
    }

    pub fn available_bw(&self) -> u64 {
        self.bw_total - self.bw_allocated
    }

    pub fn available_storage(&self) -> u64 {
        self.storage_total - self.storage_allocated
    }

    pub fn vm_ids(&self) -> impl Iterator<Item = VmId> + '_ {
        self.vms.keys().copied()
    }

    pub fn allocation(&self, vm_id: VmId) -> Option<&HostAllocation> {
        self.vms.get(&vm_id)
    }

    /// Checks that reservations do not exceed the capacity along any dimension.
    pub fn is_within_capacity(&self) -> bool {
        self.pes.iter().all(|pe| pe.allocated_mips <= pe.mips)
            && self.ram_allocated <= self.ram_total
            && self.bw_allocated <= self.bw_total
            && self.storage_allocated <= self.storage_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(pes: u32, ram: u64) -> VmSpec {
        VmSpec::new(1000., pes, ram, 1000, 10000)
    }

    #[test]
    fn test_allocate_and_release() {
        let mut host = Host::new(0, &HostSpec::uniform(4, 1000., 8192, 100000, 100000));
        host.allocate(1, &vm(2, 512)).unwrap();
        host.allocate(2, &vm(2, 512)).unwrap();
        assert_eq!(host.free_pes(), 0);
        assert_eq!(host.allocated_ram(), 1024);
        assert_eq!(host.allocated_mips(), 4000.);
        assert_eq!(host.check_allocation(&vm(1, 512)), AllocationVerdict::NotEnoughPes);

        let alloc = host.release(1).unwrap();
        assert_eq!(alloc.pes, vec![0, 1]);
        assert_eq!(host.free_pes(), 2);
        assert_eq!(host.allocated_ram(), 512);
        assert!(host.can_allocate(&vm(2, 512)));
    }

    #[test]
    fn test_insufficient_capacity() {
        let mut host = Host::new(3, &HostSpec::uniform(4, 1000., 8192, 100000, 10000));
        let err = host.allocate(7, &vm(1, 16384)).unwrap_err();
        assert_eq!(
            err,
            CloudError::InsufficientCapacity {
                host_id: 3,
                vm_id: 7,
                verdict: AllocationVerdict::NotEnoughRam
            }
        );
        host.allocate(8, &vm(1, 512)).unwrap();
        assert_eq!(host.check_allocation(&vm(1, 512)), AllocationVerdict::NotEnoughStorage);
        assert_eq!(host.allocated_ram(), 512);
    }

    #[test]
    fn test_slow_pes_are_not_used() {
        let spec = HostSpec {
            pes: vec![500., 2000., 500., 1500.],
            ram: 8192,
            bw: 100000,
            storage: 100000,
        };
        let mut host = Host::new(0, &spec);
        host.allocate(1, &vm(2, 512)).unwrap();
        assert_eq!(host.allocation(1).unwrap().pes, vec![1, 3]);
        assert_eq!(host.check_allocation(&vm(1, 512)), AllocationVerdict::NotEnoughPes);
        assert!(host.is_within_capacity());
    }

    #[test]
    fn test_release_unknown_vm_is_invalid_state() {
        let mut host = Host::new(0, &HostSpec::uniform(2, 1000., 1024, 1000, 1000));
        assert!(matches!(host.release(5), Err(CloudError::InvalidState(_))));
        host.allocate(5, &VmSpec::new(1000., 1, 512, 100, 100)).unwrap();
        host.release(5).unwrap();
        assert!(matches!(host.release(5), Err(CloudError::InvalidState(_))));

        let spec = VmSpec::new(1000., 1, 512, 100, 100);
        host.allocate(6, &spec).unwrap();
        assert!(matches!(host.allocate(6, &spec), Err(CloudError::InvalidState(_))));
    }
}
