//! Worst Fit policy.

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::common::VmId;
use crate::core::host::Host;
use crate::core::vm::VmSpec;

/// Uses the least loaded (by free PEs) suitable host.
#[derive(Default)]
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl VmAllocationPolicy for WorstFit {
    fn select_host(&mut self, _vm_id: VmId, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        let mut result: Option<usize> = None;
        let mut max_free_pes = 0;

        for (idx, host) in hosts.iter().enumerate() {
            if host.can_allocate(vm) && (result.is_none() || host.free_pes() > max_free_pes) {
                max_free_pes = host.free_pes();
                result = Some(idx);
            }
        }
        result
    }
}
