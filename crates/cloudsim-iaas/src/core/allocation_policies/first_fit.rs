//! First Fit policy.

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::common::VmId;
use crate::core::host::Host;
use crate::core::vm::VmSpec;

/// Uses the first suitable host.
#[derive(Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl VmAllocationPolicy for FirstFit {
    fn select_host(&mut self, _vm_id: VmId, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        hosts.iter().position(|host| host.can_allocate(vm))
    }
}
