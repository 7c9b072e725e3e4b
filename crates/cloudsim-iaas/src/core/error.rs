//! Errors of resource allocation and cloudlet scheduling.

use thiserror::Error;

use crate::core::common::{AllocationVerdict, HostId, VmId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CloudError {
    /// Host cannot satisfy the VM request. Allocation policies fall back to the next host.
    #[error("host #{host_id} cannot fit vm #{vm_id}: {verdict:?}")]
    InsufficientCapacity {
        host_id: HostId,
        vm_id: VmId,
        verdict: AllocationVerdict,
    },
    /// Allocation policy has tried every host.
    #[error("no suitable host for vm #{vm_id}")]
    NoSuitableHost { vm_id: VmId },
    /// Cloudlet scheduler of the VM does not admit more cloudlets.
    #[error("scheduler of vm #{vm_id} is full ({limit} cloudlets)")]
    SchedulerFull { vm_id: VmId, limit: usize },
    /// Operation is not allowed in the current lifecycle state of the entity.
    #[error("invalid state: {0}")]
    InvalidState(String),
}
