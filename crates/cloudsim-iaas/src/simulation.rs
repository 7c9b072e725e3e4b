use std::cell::RefCell;
use std::rc::Rc;
use sugars::{rc, refcell};

use cloudsim_core::{Id, Simulation};

use crate::core::allocation_policy::{allocation_policy_resolver, VmAllocationPolicy};
use crate::core::binding_policy::binding_policy_resolver;
use crate::core::broker::Broker;
use crate::core::common::IdGenerator;
use crate::core::config::{ConfigError, SimulationConfig};
use crate::core::datacenter::Datacenter;
use crate::core::host::HostSpec;

/// Wires datacenters and brokers into a simulation and runs it.
pub struct CloudSimulation {
    datacenters: Vec<Rc<RefCell<Datacenter>>>,
    brokers: Vec<Rc<RefCell<Broker>>>,
    ids: Rc<IdGenerator>,
    terminate_at: Option<f64>,
    sim: Simulation,
}

impl CloudSimulation {
    pub fn new(seed: u64) -> Self {
        Self {
            datacenters: Vec::new(),
            brokers: Vec::new(),
            ids: rc!(IdGenerator::new()),
            terminate_at: None,
            sim: Simulation::new(seed),
        }
    }

    /// Builds a simulation with one datacenter and one broker, with the configured VMs and cloudlets submitted.
    pub fn from_config(config: &SimulationConfig) -> Result<(Self, Rc<RefCell<Broker>>), ConfigError> {
        let mut cloud_sim = Self::new(config.seed);
        cloud_sim.terminate_at = config.terminate_at;
        let policy = allocation_policy_resolver(&config.allocation_policy)?;
        let binding = binding_policy_resolver(&config.cloudlet_binding)?;
        cloud_sim.create_datacenter("datacenter", config.host_specs(), policy);
        let broker = cloud_sim.create_broker("broker");
        {
            let mut b = broker.borrow_mut();
            b.set_binding_policy(binding);
            b.set_destroy_idle_vms(config.destroy_idle_vms);
            b.submit_vm_list(config.vm_specs());
            b.submit_cloudlet_list(config.cloudlet_specs());
        }
        Ok((cloud_sim, broker))
    }

    pub fn create_datacenter(
        &mut self,
        name: &str,
        hosts: Vec<HostSpec>,
        allocation_policy: Box<dyn VmAllocationPolicy>,
    ) -> Rc<RefCell<Datacenter>> {
        let datacenter = rc!(refcell!(Datacenter::new(
            hosts,
            allocation_policy,
            self.sim.create_context(name)
        )));
        self.sim.add_handler(name, datacenter.clone());
        self.datacenters.push(datacenter.clone());
        datacenter
    }

    /// Creates a broker which uses all datacenters created so far, in creation order.
    pub fn create_broker(&mut self, name: &str) -> Rc<RefCell<Broker>> {
        let datacenter_ids: Vec<Id> = self.datacenters.iter().map(|dc| dc.borrow().id()).collect();
        let broker = rc!(refcell!(Broker::new(
            datacenter_ids,
            self.ids.clone(),
            self.sim.create_context(name)
        )));
        self.sim.add_handler(name, broker.clone());
        self.brokers.push(broker.clone());
        broker
    }

    pub fn datacenters(&self) -> &[Rc<RefCell<Datacenter>>] {
        &self.datacenters
    }

    pub fn brokers(&self) -> &[Rc<RefCell<Broker>>] {
        &self.brokers
    }

    /// Stops the run at the given time even if events remain.
    pub fn terminate_at(&mut self, time: f64) {
        self.terminate_at = Some(time);
    }

    /// Runs the simulation until there are no events left or the termination time is reached.
    /// Returns the simulation time at the end of the run.
    pub fn start(&mut self) -> f64 {
        match self.terminate_at {
            Some(time) => {
                self.sim.step_until_time(time);
            }
            None => self.sim.step_until_no_events(),
        }
        self.sim.time()
    }

    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    pub fn pending_event_count(&self) -> usize {
        self.sim.pending_event_count()
    }
}
