//! Representations of virtual machine and its status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use cloudsim_core::Id;

use crate::core::cloudlet_scheduler::{CloudletScheduler, SchedulingDiscipline};
use crate::core::common::{HostId, VmId};
use crate::core::error::CloudError;

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum VmStatus {
    /// Creation is requested, placement is not decided yet.
    Created,
    /// Resources are reserved on a host.
    Allocated,
    /// At least one cloudlet has been admitted.
    Running,
    /// VM was destroyed and its resources were released.
    Finished,
    /// No host in any datacenter could fit the VM.
    Failed,
    /// Creation request was withdrawn before it was processed.
    Canceled,
}

impl VmStatus {
    /// Whether the VM can accept cloudlets.
    pub fn is_alive(&self) -> bool {
        matches!(self, VmStatus::Allocated | VmStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VmStatus::Finished | VmStatus::Failed | VmStatus::Canceled)
    }
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Created => write!(f, "created"),
            VmStatus::Allocated => write!(f, "allocated"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::Finished => write!(f, "finished"),
            VmStatus::Failed => write!(f, "failed"),
            VmStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Resource request of a virtual machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VmSpec {
    /// Requested MIPS of each PE.
    pub mips: f64,
    pub pes: u32,
    pub ram: u64,
    pub bw: u64,
    /// Image size, reserved from host storage.
    pub size: u64,
    /// How the VM shares its PEs among cloudlets.
    pub scheduler: SchedulingDiscipline,
    /// Maximum number of cloudlets resident on the VM (executing and waiting), unlimited if `None`.
    pub max_cloudlets: Option<usize>,
}

impl VmSpec {
    /// Creates time-shared VM request without admission limit.
    pub fn new(mips: f64, pes: u32, ram: u64, bw: u64, size: u64) -> Self {
        Self {
            mips,
            pes,
            ram,
            bw,
            size,
            scheduler: SchedulingDiscipline::TimeShared,
            max_cloudlets: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulingDiscipline) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_max_cloudlets(mut self, max_cloudlets: usize) -> Self {
        self.max_cloudlets = Some(max_cloudlets);
        self
    }

    /// Checks that the request describes a VM which can process cloudlets.
    pub fn validate(&self) -> Result<(), CloudError> {
        if !self.mips.is_finite() || self.mips <= 0. {
            return Err(CloudError::InvalidState(format!("vm mips must be positive, got {}", self.mips)));
        }
        if self.pes == 0 {
            return Err(CloudError::InvalidState("vm must have at least one PE".to_string()));
        }
        Ok(())
    }
}

/// Virtual machine as seen by the datacenter hosting it.
///
/// The VM owns the cloudlet scheduler which divides its PE capacity among resident cloudlets.
pub struct Vm {
    pub id: VmId,
    pub spec: VmSpec,
    /// Broker which requested the VM and receives notifications about its cloudlets.
    pub broker: Id,
    host: Option<HostId>,
    status: VmStatus,
    scheduler: CloudletScheduler,
}

impl Vm {
    pub fn new(id: VmId, spec: VmSpec, broker: Id) -> Self {
        let scheduler = CloudletScheduler::new(id, &spec);
        Self {
            id,
            spec,
            broker,
            host: None,
            status: VmStatus::Created,
            scheduler,
        }
    }

    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    pub fn status(&self) -> VmStatus {
        self.status
    }

    pub(crate) fn set_allocated(&mut self, host_id: HostId) {
        self.host = Some(host_id);
        self.status = VmStatus::Allocated;
    }

    pub(crate) fn set_running(&mut self) {
        self.status = VmStatus::Running;
    }

    pub(crate) fn set_finished(&mut self) {
        self.status = VmStatus::Finished;
    }

    pub fn scheduler(&self) -> &CloudletScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut CloudletScheduler {
        &mut self.scheduler
    }
}
