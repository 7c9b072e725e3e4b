//! Broker component: submits VMs and cloudlets on behalf of the user and collects the results.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use indexmap::IndexMap;

use cloudsim_core::cast;
use cloudsim_core::{Event, EventHandler, EventId, Id, SimulationContext};
use cloudsim_core::{log_debug, log_error, log_info, log_warn};

use crate::core::binding_policy::{CloudletBindingPolicy, FirstAvailable, VmCandidate};
use crate::core::cloudlet::{Cloudlet, CloudletSpec, CloudletStatus};
use crate::core::cloudlet_scheduler::SchedulingDiscipline;
use crate::core::common::{CloudletId, HostId, IdGenerator, VmId};
use crate::core::error::CloudError;
use crate::core::events::cloudlet::{
    CloudletArrival, CloudletFailed, CloudletFinished, CloudletRejected, CloudletSubmit,
};
use crate::core::events::vm::{VmCreateFailed, VmCreateRequest, VmCreated, VmDestroyRequest, VmDestroyed};
use crate::core::vm::{VmSpec, VmStatus};

enum Binding {
    Bind(VmId),
    Wait,
    Fail(String),
}

/// Broker view of a submitted VM.
#[derive(Clone, Debug)]
pub struct BrokerVm {
    pub spec: VmSpec,
    pub status: VmStatus,
    /// Position of the datacenter serving the VM in the broker datacenter list.
    pub datacenter: usize,
    pub host: Option<HostId>,
    /// Cloudlets sent to the VM and not yet returned.
    pub bound_cloudlets: usize,
    saturated: bool,
    destroy_requested: bool,
    create_event: Option<EventId>,
}

impl BrokerVm {
    fn accepts(&self, cloudlet: &Cloudlet) -> bool {
        self.status.is_alive()
            && !self.destroy_requested
            && !self.saturated
            && self.spec.max_cloudlets.map_or(true, |max| self.bound_cloudlets < max)
            && (self.spec.scheduler == SchedulingDiscipline::TimeShared || self.spec.pes >= cloudlet.pes())
    }
}

/// Orchestrates VM creation and cloudlet execution.
///
/// Cloudlets are owned by the broker until they are bound to a VM, and again once they come back in a terminal
/// state. Queued cloudlets are bound in submission order whenever something may have freed capacity: a VM was
/// created, or a cloudlet on any VM finished, failed or was rejected. Binding waits until every outstanding VM
/// creation request is answered, so that the binding policy sees the whole set of created VMs.
pub struct Broker {
    datacenters: Vec<Id>,
    vms: IndexMap<VmId, BrokerVm>,
    custody: BTreeMap<CloudletId, Cloudlet>,
    arrival_events: BTreeMap<CloudletId, EventId>,
    waiting: BTreeSet<CloudletId>,
    in_flight: BTreeMap<CloudletId, VmId>,
    finished: Vec<Cloudlet>,
    canceled: Vec<Cloudlet>,
    pending_vm_requests: usize,
    binding_policy: Box<dyn CloudletBindingPolicy>,
    destroy_idle_vms: bool,
    ids: Rc<IdGenerator>,
    ctx: SimulationContext,
}

impl Broker {
    pub fn new(datacenters: Vec<Id>, ids: Rc<IdGenerator>, ctx: SimulationContext) -> Self {
        Self {
            datacenters,
            vms: IndexMap::new(),
            custody: BTreeMap::new(),
            arrival_events: BTreeMap::new(),
            waiting: BTreeSet::new(),
            in_flight: BTreeMap::new(),
            finished: Vec::new(),
            canceled: Vec::new(),
            pending_vm_requests: 0,
            binding_policy: Box::new(FirstAvailable::new()),
            destroy_idle_vms: true,
            ids,
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn set_binding_policy(&mut self, policy: Box<dyn CloudletBindingPolicy>) {
        self.binding_policy = policy;
    }

    /// Whether running VMs are destroyed once all submitted cloudlets reach a terminal state (enabled by default).
    pub fn set_destroy_idle_vms(&mut self, enabled: bool) {
        self.destroy_idle_vms = enabled;
    }

    /// Datacenters are asked to create a VM in the order of this list.
    pub fn add_datacenter(&mut self, datacenter: Id) {
        self.datacenters.push(datacenter);
    }

    pub fn submit_vm_list(&mut self, specs: Vec<VmSpec>) -> Vec<VmId> {
        specs.into_iter().map(|spec| self.submit_vm(spec)).collect()
    }

    pub fn submit_vm(&mut self, spec: VmSpec) -> VmId {
        let vm_id = self.ids.next_vm_id();
        let mut vm = BrokerVm {
            spec: spec.clone(),
            status: VmStatus::Created,
            datacenter: 0,
            host: None,
            bound_cloudlets: 0,
            saturated: false,
            destroy_requested: false,
            create_event: None,
        };
        if let Err(e) = spec.validate() {
            log_warn!(self.ctx, "vm #{} failed: {}", vm_id, e);
            vm.status = VmStatus::Failed;
            self.vms.insert(vm_id, vm);
            return vm_id;
        }
        match self.datacenters.first() {
            Some(&dc) => {
                vm.create_event = Some(self.ctx.emit_now(VmCreateRequest { vm_id, spec }, dc));
                self.pending_vm_requests += 1;
            }
            None => {
                log_warn!(self.ctx, "vm #{} failed: no datacenters", vm_id);
                vm.status = VmStatus::Failed;
            }
        }
        self.vms.insert(vm_id, vm);
        vm_id
    }

    pub fn submit_cloudlet_list(&mut self, specs: Vec<CloudletSpec>) -> Vec<CloudletId> {
        specs.into_iter().map(|spec| self.submit_cloudlet(spec)).collect()
    }

    /// Takes the cloudlet into custody, it is queued for binding after its submission delay.
    /// An invalid cloudlet fails immediately.
    pub fn submit_cloudlet(&mut self, spec: CloudletSpec) -> CloudletId {
        let cloudlet_id = self.ids.next_cloudlet_id();
        if let Err(e) = spec.validate() {
            log_warn!(self.ctx, "cloudlet #{} failed: {}", cloudlet_id, e);
            let mut cloudlet = Cloudlet::new(cloudlet_id, spec);
            cloudlet.fail(self.ctx.time());
            self.finished.push(cloudlet);
            self.maybe_destroy_vms();
            return cloudlet_id;
        }
        let delay = spec.submission_delay.max(0.);
        let event_id = self.ctx.emit_self(CloudletArrival { cloudlet_id }, delay);
        self.arrival_events.insert(cloudlet_id, event_id);
        self.custody.insert(cloudlet_id, Cloudlet::new(cloudlet_id, spec));
        cloudlet_id
    }

    /// Withdraws a cloudlet which has not been sent to a VM yet.
    pub fn cancel_cloudlet(&mut self, cloudlet_id: CloudletId) -> Result<(), CloudError> {
        let mut cloudlet = self.custody.remove(&cloudlet_id).ok_or_else(|| {
            CloudError::InvalidState(format!("cloudlet #{} is not queued at the broker", cloudlet_id))
        })?;
        if let Some(event_id) = self.arrival_events.remove(&cloudlet_id) {
            self.ctx.cancel_event(event_id);
        }
        self.waiting.remove(&cloudlet_id);
        cloudlet.status = CloudletStatus::Canceled;
        log_info!(self.ctx, "cloudlet #{} canceled", cloudlet_id);
        self.canceled.push(cloudlet);
        self.maybe_destroy_vms();
        Ok(())
    }

    /// Withdraws a VM whose creation request has not been processed yet.
    pub fn cancel_vm(&mut self, vm_id: VmId) -> Result<(), CloudError> {
        let vm = self
            .vms
            .get_mut(&vm_id)
            .ok_or_else(|| CloudError::InvalidState(format!("unknown vm #{}", vm_id)))?;
        let event_id = match (vm.status, vm.create_event) {
            (VmStatus::Created, Some(event_id)) => event_id,
            _ => {
                return Err(CloudError::InvalidState(format!(
                    "vm #{} cannot be canceled in state {}",
                    vm_id, vm.status
                )))
            }
        };
        if !self.ctx.cancel_event(event_id) {
            return Err(CloudError::InvalidState(format!(
                "creation of vm #{} is already processed",
                vm_id
            )));
        }
        vm.status = VmStatus::Canceled;
        vm.create_event = None;
        self.pending_vm_requests -= 1;
        log_info!(self.ctx, "vm #{} canceled", vm_id);
        self.on_capacity_change();
        Ok(())
    }

    /// Decommissions a running VM, cloudlets still on it will fail.
    pub fn destroy_vm(&mut self, vm_id: VmId) -> Result<(), CloudError> {
        let vm = self
            .vms
            .get_mut(&vm_id)
            .ok_or_else(|| CloudError::InvalidState(format!("unknown vm #{}", vm_id)))?;
        if !vm.status.is_alive() || vm.destroy_requested {
            return Err(CloudError::InvalidState(format!(
                "vm #{} cannot be destroyed in state {}",
                vm_id, vm.status
            )));
        }
        vm.destroy_requested = true;
        let dc = self.datacenters[vm.datacenter];
        self.ctx.emit_now(VmDestroyRequest { vm_id }, dc);
        Ok(())
    }

    /// Returns cloudlets which reached `Finished` or `Failed` state, in the order they reached it.
    pub fn cloudlet_finished_list(&self) -> &[Cloudlet] {
        &self.finished
    }

    pub fn canceled_cloudlets(&self) -> &[Cloudlet] {
        &self.canceled
    }

    pub fn vm(&self, vm_id: VmId) -> Option<&BrokerVm> {
        self.vms.get(&vm_id)
    }

    pub fn vm_status(&self, vm_id: VmId) -> Option<VmStatus> {
        self.vms.get(&vm_id).map(|vm| vm.status)
    }

    /// Returns submitted VMs in submission order.
    pub fn vms(&self) -> impl Iterator<Item = (VmId, &BrokerVm)> {
        self.vms.iter().map(|(id, vm)| (*id, vm))
    }

    /// Number of cloudlets which have not reached a terminal state.
    pub fn unfinished_cloudlets(&self) -> usize {
        self.custody.len() + self.in_flight.len()
    }

    fn on_cloudlet_arrival(&mut self, cloudlet_id: CloudletId) {
        self.arrival_events.remove(&cloudlet_id);
        match self.custody.get_mut(&cloudlet_id) {
            Some(cloudlet) => {
                cloudlet.status = CloudletStatus::Queued;
                self.waiting.insert(cloudlet_id);
                log_debug!(self.ctx, "cloudlet #{} arrived", cloudlet_id);
            }
            None => {
                log_error!(self.ctx, "arrival of unknown cloudlet #{}", cloudlet_id);
                return;
            }
        }
        self.on_capacity_change();
    }

    fn on_vm_created(&mut self, vm_id: VmId, host_id: HostId) {
        match self.vms.get_mut(&vm_id) {
            Some(vm) if vm.status == VmStatus::Created => {
                vm.status = VmStatus::Allocated;
                vm.host = Some(host_id);
                vm.create_event = None;
                self.pending_vm_requests -= 1;
                log_info!(self.ctx, "vm #{} created on host #{}", vm_id, host_id);
            }
            _ => {
                log_error!(self.ctx, "unexpected creation of vm #{}", vm_id);
                return;
            }
        }
        self.on_capacity_change();
    }

    fn on_vm_create_failed(&mut self, vm_id: VmId, reason: String) {
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) if vm.status == VmStatus::Created => vm,
            _ => {
                log_error!(self.ctx, "unexpected creation failure of vm #{}", vm_id);
                return;
            }
        };
        let next = vm.datacenter + 1;
        if next < self.datacenters.len() {
            let rejected_by = self.ctx.lookup_name(self.datacenters[vm.datacenter]);
            log_debug!(
                self.ctx,
                "vm #{} rejected by {} ({}), trying next datacenter",
                vm_id,
                rejected_by,
                reason
            );
            vm.datacenter = next;
            vm.create_event = Some(self.ctx.emit_now(
                VmCreateRequest {
                    vm_id,
                    spec: vm.spec.clone(),
                },
                self.datacenters[next],
            ));
            return;
        }
        vm.status = VmStatus::Failed;
        vm.create_event = None;
        self.pending_vm_requests -= 1;
        log_warn!(self.ctx, "vm #{} failed: {}", vm_id, reason);
        self.on_capacity_change();
    }

    fn on_vm_destroyed(&mut self, vm_id: VmId) {
        match self.vms.get_mut(&vm_id) {
            Some(vm) => {
                vm.status = VmStatus::Finished;
                log_info!(self.ctx, "vm #{} destroyed", vm_id);
            }
            None => log_error!(self.ctx, "destruction of unknown vm #{}", vm_id),
        }
    }

    /// Returns the cloudlet sent to a VM back under broker control.
    fn take_back(&mut self, cloudlet: &Cloudlet) -> Option<VmId> {
        let vm_id = self.in_flight.remove(&cloudlet.id)?;
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.bound_cloudlets -= 1;
            vm.saturated = false;
        }
        Some(vm_id)
    }

    fn on_cloudlet_finished(&mut self, cloudlet: Cloudlet) {
        if self.take_back(&cloudlet).is_none() {
            log_error!(self.ctx, "unexpected cloudlet #{}", cloudlet.id);
            return;
        }
        log_info!(
            self.ctx,
            "cloudlet #{} finished on vm #{}",
            cloudlet.id,
            cloudlet.vm_id.unwrap_or_default()
        );
        self.finished.push(cloudlet);
        self.on_capacity_change();
    }

    fn on_cloudlet_failed(&mut self, cloudlet: Cloudlet, reason: String) {
        if self.take_back(&cloudlet).is_none() {
            log_error!(self.ctx, "unexpected cloudlet #{}", cloudlet.id);
            return;
        }
        log_warn!(self.ctx, "cloudlet #{} failed: {}", cloudlet.id, reason);
        self.finished.push(cloudlet);
        self.on_capacity_change();
    }

    fn on_cloudlet_rejected(&mut self, mut cloudlet: Cloudlet, reason: String) {
        let vm_id = match self.take_back(&cloudlet) {
            Some(vm_id) => vm_id,
            None => {
                log_error!(self.ctx, "unexpected cloudlet #{}", cloudlet.id);
                return;
            }
        };
        log_debug!(self.ctx, "cloudlet #{} rejected by vm #{}: {}", cloudlet.id, vm_id, reason);
        // retried once capacity changes anywhere
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.saturated = true;
        }
        cloudlet.status = CloudletStatus::Queued;
        cloudlet.vm_id = None;
        self.waiting.insert(cloudlet.id);
        self.custody.insert(cloudlet.id, cloudlet);
        self.on_capacity_change();
    }

    fn on_capacity_change(&mut self) {
        self.bind_waiting_cloudlets();
        self.fail_unbindable_cloudlets();
        self.maybe_destroy_vms();
    }

    fn bind_waiting_cloudlets(&mut self) {
        if self.pending_vm_requests > 0 {
            return;
        }
        let waiting: Vec<CloudletId> = self.waiting.iter().copied().collect();
        for cloudlet_id in waiting {
            match self.binding_decision(cloudlet_id) {
                Binding::Bind(vm_id) => self.bind(cloudlet_id, vm_id),
                Binding::Fail(reason) => self.fail_waiting(cloudlet_id, reason),
                Binding::Wait => {}
            }
        }
    }

    fn binding_decision(&mut self, cloudlet_id: CloudletId) -> Binding {
        let cloudlet = match self.custody.get(&cloudlet_id) {
            Some(cloudlet) => cloudlet,
            None => return Binding::Wait,
        };
        if let Some(vm_id) = cloudlet.spec.vm {
            return match self.vms.get(&vm_id) {
                Some(vm) if vm.status.is_terminal() || vm.destroy_requested => {
                    Binding::Fail(format!("vm #{} is {}", vm_id, vm.status))
                }
                Some(vm) if vm.accepts(cloudlet) => Binding::Bind(vm_id),
                Some(_) => Binding::Wait,
                None => Binding::Fail(format!("unknown vm #{}", vm_id)),
            };
        }
        let candidates: Vec<VmCandidate> = self
            .vms
            .iter()
            .filter(|(_, vm)| vm.accepts(cloudlet))
            .map(|(&id, vm)| VmCandidate {
                id,
                pes: vm.spec.pes,
                mips: vm.spec.mips,
                bound_cloudlets: vm.bound_cloudlets,
            })
            .collect();
        if candidates.is_empty() {
            return Binding::Wait;
        }
        match self.binding_policy.select_vm(cloudlet, &candidates) {
            Some(vm_id) if candidates.iter().any(|vm| vm.id == vm_id) => Binding::Bind(vm_id),
            Some(vm_id) => {
                log_error!(self.ctx, "binding policy selected vm #{} which is not a candidate", vm_id);
                Binding::Wait
            }
            None => Binding::Wait,
        }
    }

    fn bind(&mut self, cloudlet_id: CloudletId, vm_id: VmId) {
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return,
        };
        let mut cloudlet = match self.custody.remove(&cloudlet_id) {
            Some(cloudlet) => cloudlet,
            None => return,
        };
        self.waiting.remove(&cloudlet_id);
        cloudlet.vm_id = Some(vm_id);
        vm.bound_cloudlets += 1;
        if vm.status == VmStatus::Allocated {
            vm.status = VmStatus::Running;
        }
        let dc = self.datacenters[vm.datacenter];
        self.in_flight.insert(cloudlet_id, vm_id);
        log_debug!(self.ctx, "cloudlet #{} bound to vm #{}", cloudlet_id, vm_id);
        self.ctx.emit_now(CloudletSubmit { cloudlet }, dc);
    }

    fn fail_waiting(&mut self, cloudlet_id: CloudletId, reason: String) {
        self.waiting.remove(&cloudlet_id);
        if let Some(mut cloudlet) = self.custody.remove(&cloudlet_id) {
            log_warn!(self.ctx, "cloudlet #{} failed: {}", cloudlet_id, reason);
            cloudlet.fail(self.ctx.time());
            self.finished.push(cloudlet);
        }
    }

    /// Fails queued cloudlets once nothing can change the set of VMs able to take them.
    fn fail_unbindable_cloudlets(&mut self) {
        if self.pending_vm_requests > 0 || !self.in_flight.is_empty() {
            return;
        }
        let waiting: Vec<CloudletId> = self.waiting.iter().copied().collect();
        for cloudlet_id in waiting {
            self.fail_waiting(cloudlet_id, "no vm can accept the cloudlet".to_string());
        }
    }

    fn maybe_destroy_vms(&mut self) {
        if !self.destroy_idle_vms
            || self.pending_vm_requests > 0
            || !self.custody.is_empty()
            || !self.in_flight.is_empty()
        {
            return;
        }
        let idle: Vec<VmId> = self
            .vms
            .iter()
            .filter(|(_, vm)| vm.status.is_alive() && !vm.destroy_requested)
            .map(|(&id, _)| id)
            .collect();
        for vm_id in idle {
            if let Err(e) = self.destroy_vm(vm_id) {
                log_error!(self.ctx, "{}", e);
            }
        }
    }
}

impl EventHandler for Broker {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            CloudletArrival { cloudlet_id } => {
                self.on_cloudlet_arrival(cloudlet_id);
            }
            VmCreated { vm_id, host_id } => {
                self.on_vm_created(vm_id, host_id);
            }
            VmCreateFailed { vm_id, reason } => {
                self.on_vm_create_failed(vm_id, reason);
            }
            VmDestroyed { vm_id } => {
                self.on_vm_destroyed(vm_id);
            }
            CloudletFinished { cloudlet } => {
                self.on_cloudlet_finished(cloudlet);
            }
            CloudletFailed { cloudlet, reason } => {
                self.on_cloudlet_failed(cloudlet, reason);
            }
            CloudletRejected { cloudlet, reason } => {
                self.on_cloudlet_rejected(cloudlet, reason);
            }
        })
    }
}
