//! Cloudlets, the units of workload executed on VMs.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::{CloudletId, VmId};
use crate::core::error::CloudError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum CloudletStatus {
    Created,
    /// Waiting for a VM or for free PEs on its VM.
    Queued,
    Executing,
    Finished,
    Failed,
    /// Withdrawn by the broker before execution.
    Canceled,
}

impl CloudletStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CloudletStatus::Finished | CloudletStatus::Failed | CloudletStatus::Canceled
        )
    }
}

impl Display for CloudletStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CloudletStatus::Created => write!(f, "CREATED"),
            CloudletStatus::Queued => write!(f, "QUEUED"),
            CloudletStatus::Executing => write!(f, "EXECUTING"),
            CloudletStatus::Finished => write!(f, "SUCCESS"),
            CloudletStatus::Failed => write!(f, "FAILED"),
            CloudletStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Workload description submitted to a broker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CloudletSpec {
    /// Length in million instructions.
    pub length: f64,
    pub pes: u32,
    pub file_size: u64,
    pub output_size: u64,
    /// Delay after submission before the broker tries to bind the cloudlet.
    pub submission_delay: f64,
    /// VM the cloudlet must run on. Any suitable VM is used if `None`.
    pub vm: Option<VmId>,
}

impl CloudletSpec {
    pub fn new(length: f64, pes: u32) -> Self {
        Self {
            length,
            pes,
            file_size: 0,
            output_size: 0,
            submission_delay: 0.,
            vm: None,
        }
    }

    pub fn with_file_sizes(mut self, file_size: u64, output_size: u64) -> Self {
        self.file_size = file_size;
        self.output_size = output_size;
        self
    }

    pub fn with_submission_delay(mut self, delay: f64) -> Self {
        self.submission_delay = delay;
        self
    }

    pub fn with_vm(mut self, vm_id: VmId) -> Self {
        self.vm = Some(vm_id);
        self
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        if !self.length.is_finite() || self.length < 0. {
            return Err(CloudError::InvalidState(format!(
                "cloudlet length must be non-negative, got {}",
                self.length
            )));
        }
        if self.pes == 0 {
            return Err(CloudError::InvalidState("cloudlet must request at least one PE".to_string()));
        }
        if !self.submission_delay.is_finite() {
            return Err(CloudError::InvalidState(format!(
                "invalid submission delay {}",
                self.submission_delay
            )));
        }
        Ok(())
    }
}

/// Cloudlet state.
///
/// The value is owned by the broker until it is bound to a VM, then it is moved into the VM cloudlet scheduler
/// which is the only one updating the remaining length and timing fields until the cloudlet returns to the broker.
#[derive(Clone, Debug, Serialize)]
pub struct Cloudlet {
    pub id: CloudletId,
    pub spec: CloudletSpec,
    pub status: CloudletStatus,
    pub vm_id: Option<VmId>,
    pub remaining_length: f64,
    pub exec_start_time: Option<f64>,
    pub finish_time: Option<f64>,
}

impl Cloudlet {
    pub fn new(id: CloudletId, spec: CloudletSpec) -> Self {
        let remaining_length = spec.length;
        Self {
            id,
            spec,
            status: CloudletStatus::Created,
            vm_id: None,
            remaining_length,
            exec_start_time: None,
            finish_time: None,
        }
    }

    pub fn pes(&self) -> u32 {
        self.spec.pes
    }

    /// Time spent executing, if the cloudlet has finished.
    pub fn actual_cpu_time(&self) -> Option<f64> {
        match (self.exec_start_time, self.finish_time) {
            (Some(start), Some(finish)) => Some(finish - start),
            _ => None,
        }
    }

    /// Marks the cloudlet as failed at the given time.
    pub(crate) fn fail(&mut self, time: f64) {
        self.status = CloudletStatus::Failed;
        self.finish_time = Some(time);
    }
}
