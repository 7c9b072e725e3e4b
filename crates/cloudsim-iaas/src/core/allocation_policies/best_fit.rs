//! Best Fit policy.

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::common::VmId;
use crate::core::host::Host;
use crate::core::vm::VmSpec;

/// Uses the most loaded (by free PEs) suitable host.
#[derive(Default)]
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl VmAllocationPolicy for BestFit {
    fn select_host(&mut self, _vm_id: VmId, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        let mut result: Option<usize> = None;
        let mut min_free_pes = usize::MAX;

        for (idx, host) in hosts.iter().enumerate() {
            if host.can_allocate(vm) && host.free_pes() < min_free_pes {
                min_free_pes = host.free_pes();
                result = Some(idx);
            }
        }
        result
    }
}
