//! Datacenter component: hosts, VM placement and cloudlet execution.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use cloudsim_core::cast;
use cloudsim_core::{Event, EventHandler, EventId, Id, SimulationContext};
use cloudsim_core::{log_debug, log_error, log_info, log_warn};

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::common::{HostId, VmId};
use crate::core::error::CloudError;
use crate::core::events::cloudlet::{
    CloudletFailed, CloudletFinished, CloudletRejected, CloudletScheduleUpdate, CloudletSubmit,
};
use crate::core::events::vm::{VmCreateFailed, VmCreateRequest, VmCreated, VmDestroyRequest, VmDestroyed};
use crate::core::host::{Host, HostSpec};
use crate::core::vm::{Vm, VmSpec, VmStatus};

/// Owns the host pool and the VMs placed on it.
///
/// VM creation requests are served by the allocation policy. Each created VM runs its own cloudlet scheduler, and the
/// datacenter keeps at most one pending `CloudletScheduleUpdate` event per VM pointing at the nearest cloudlet
/// completion. The event is cancelled and emitted again after every change of the VM executing set.
pub struct Datacenter {
    hosts: Vec<Host>,
    allocation_policy: Box<dyn VmAllocationPolicy>,
    vms: IndexMap<VmId, Vm>,
    next_updates: BTreeMap<VmId, EventId>,
    ctx: SimulationContext,
}

impl Datacenter {
    pub fn new(host_specs: Vec<HostSpec>, allocation_policy: Box<dyn VmAllocationPolicy>, ctx: SimulationContext) -> Self {
        let hosts = host_specs
            .iter()
            .enumerate()
            .map(|(id, spec)| Host::new(id as HostId, spec))
            .collect();
        Self {
            hosts,
            allocation_policy,
            vms: IndexMap::new(),
            next_updates: BTreeMap::new(),
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, host_id: HostId) -> Option<&Host> {
        self.hosts.get(host_id as usize)
    }

    /// Returns VM created in this datacenter, including already destroyed ones.
    pub fn vm(&self, vm_id: VmId) -> Option<&Vm> {
        self.vms.get(&vm_id)
    }

    /// Returns VMs in creation order.
    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.values()
    }

    fn on_vm_create_request(&mut self, vm_id: VmId, spec: VmSpec, broker: Id) {
        if self.vms.contains_key(&vm_id) {
            log_error!(
                self.ctx,
                "{}",
                CloudError::InvalidState(format!("vm #{} is already created", vm_id))
            );
            return;
        }
        match self
            .allocation_policy
            .allocate_host_for_vm(vm_id, &spec, &mut self.hosts)
        {
            Ok(host_id) => {
                log_debug!(self.ctx, "vm #{} allocated on host #{}", vm_id, host_id);
                let mut vm = Vm::new(vm_id, spec, broker);
                vm.set_allocated(host_id);
                self.vms.insert(vm_id, vm);
                self.ctx.emit_now(VmCreated { vm_id, host_id }, broker);
            }
            Err(e) => {
                log_warn!(self.ctx, "failed to create vm #{}: {}", vm_id, e);
                self.ctx.emit_now(
                    VmCreateFailed {
                        vm_id,
                        reason: e.to_string(),
                    },
                    broker,
                );
            }
        }
    }

    fn fail_cloudlet(&mut self, mut cloudlet: Cloudlet, reason: String, broker: Id) {
        log_warn!(self.ctx, "cloudlet #{} failed: {}", cloudlet.id, reason);
        cloudlet.fail(self.ctx.time());
        self.ctx.emit_now(CloudletFailed { cloudlet, reason }, broker);
    }

    fn on_cloudlet_submit(&mut self, cloudlet: Cloudlet, broker: Id) {
        let now = self.ctx.time();
        let vm_id = match cloudlet.vm_id {
            Some(vm_id) => vm_id,
            None => {
                let err = CloudError::InvalidState(format!("cloudlet #{} is not bound to a vm", cloudlet.id));
                log_error!(self.ctx, "{}", err);
                self.fail_cloudlet(cloudlet, err.to_string(), broker);
                return;
            }
        };
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) if vm.status().is_alive() => vm,
            _ => {
                let err = CloudError::InvalidState(format!("vm #{} is not running in this datacenter", vm_id));
                log_error!(self.ctx, "{}", err);
                self.fail_cloudlet(cloudlet, err.to_string(), broker);
                return;
            }
        };
        let cloudlet_id = cloudlet.id;
        match vm.scheduler_mut().submit(cloudlet, now) {
            Ok(status) => {
                if vm.status() == VmStatus::Allocated {
                    vm.set_running();
                }
                if status == CloudletStatus::Executing {
                    log_debug!(self.ctx, "cloudlet #{} started on vm #{}", cloudlet_id, vm_id);
                } else {
                    log_debug!(self.ctx, "cloudlet #{} queued on vm #{}", cloudlet_id, vm_id);
                }
                self.reschedule_vm(vm_id);
            }
            Err((e @ CloudError::SchedulerFull { .. }, cloudlet)) => {
                log_debug!(self.ctx, "cloudlet #{} rejected: {}", cloudlet_id, e);
                self.ctx.emit_now(
                    CloudletRejected {
                        cloudlet,
                        reason: e.to_string(),
                    },
                    broker,
                );
            }
            Err((e, cloudlet)) => {
                self.fail_cloudlet(cloudlet, e.to_string(), broker);
            }
        }
    }

    fn on_schedule_update(&mut self, vm_id: VmId) {
        self.next_updates.remove(&vm_id);
        let now = self.ctx.time();
        let (finished, broker) = match self.vms.get_mut(&vm_id) {
            Some(vm) => (vm.scheduler_mut().collect_finished(now), vm.broker),
            None => {
                log_error!(self.ctx, "schedule update for unknown vm #{}", vm_id);
                return;
            }
        };
        for cloudlet in finished {
            log_debug!(self.ctx, "cloudlet #{} finished on vm #{}", cloudlet.id, vm_id);
            self.ctx.emit_now(CloudletFinished { cloudlet }, broker);
        }
        self.reschedule_vm(vm_id);
    }

    /// Replaces the pending schedule update of the VM with one at its nearest cloudlet completion.
    fn reschedule_vm(&mut self, vm_id: VmId) {
        if let Some(event_id) = self.next_updates.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
        let next_completion = self.vms.get(&vm_id).and_then(|vm| vm.scheduler().next_completion_time());
        if let Some(time) = next_completion {
            let delay = (time - self.ctx.time()).max(0.);
            let event_id = self.ctx.emit_self(CloudletScheduleUpdate { vm_id }, delay);
            self.next_updates.insert(vm_id, event_id);
        }
    }

    fn on_vm_destroy_request(&mut self, vm_id: VmId, requester: Id) {
        let now = self.ctx.time();
        let (host_id, broker, failed) = match self.vms.get_mut(&vm_id) {
            Some(vm) if vm.status().is_alive() => match vm.host() {
                Some(host_id) => {
                    let failed = vm.scheduler_mut().drain_failed(now);
                    vm.set_finished();
                    (host_id, vm.broker, failed)
                }
                None => {
                    log_error!(self.ctx, "vm #{} has no host", vm_id);
                    return;
                }
            },
            _ => {
                log_error!(
                    self.ctx,
                    "{}",
                    CloudError::InvalidState(format!("cannot destroy vm #{} requested by {}", vm_id, requester))
                );
                return;
            }
        };
        if let Some(event_id) = self.next_updates.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
        for cloudlet in failed {
            log_warn!(self.ctx, "cloudlet #{} failed: vm #{} destroyed", cloudlet.id, vm_id);
            self.ctx.emit_now(
                CloudletFailed {
                    cloudlet,
                    reason: format!("vm #{} destroyed", vm_id),
                },
                broker,
            );
        }
        if let Err(e) = self
            .allocation_policy
            .deallocate_host_for_vm(vm_id, host_id, &mut self.hosts)
        {
            log_error!(self.ctx, "{}", e);
        }
        log_info!(self.ctx, "vm #{} destroyed, host #{} released", vm_id, host_id);
        self.ctx.emit_now(VmDestroyed { vm_id }, broker);
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) {
        let src = event.src;
        cast!(match event.data {
            VmCreateRequest { vm_id, spec } => {
                self.on_vm_create_request(vm_id, spec, src);
            }
            CloudletSubmit { cloudlet } => {
                self.on_cloudlet_submit(cloudlet, src);
            }
            CloudletScheduleUpdate { vm_id } => {
                self.on_schedule_update(vm_id);
            }
            VmDestroyRequest { vm_id } => {
                self.on_vm_destroy_request(vm_id, src);
            }
        })
    }
}
