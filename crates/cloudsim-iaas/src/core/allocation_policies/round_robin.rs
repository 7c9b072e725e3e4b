//! Round Robin policy.

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::common::VmId;
use crate::core::host::Host;
use crate::core::vm::VmSpec;

/// Cycles through hosts regardless of their load, skipping hosts which cannot fit the VM.
///
/// The cursor points to the next host to try first and is advanced after every tried host, successful or not.
#[derive(Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Default::default()
    }
}

impl VmAllocationPolicy for RoundRobin {
    fn select_host(&mut self, _vm_id: VmId, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        let host_count = hosts.len();
        for _ in 0..host_count {
            let idx = self.cursor % host_count;
            self.cursor = (idx + 1) % host_count;
            if hosts[idx].can_allocate(vm) {
                return Some(idx);
            }
        }
        None
    }
}
