use std::cell::RefCell;
use std::rc::Rc;

use rand::prelude::*;
use rand_pcg::Pcg64;

use cloudsim_iaas::core::allocation_policy::allocation_policy_resolver;
use cloudsim_iaas::core::binding_policy::binding_policy_resolver;
use cloudsim_iaas::core::broker::Broker;
use cloudsim_iaas::core::cloudlet::{CloudletSpec, CloudletStatus};
use cloudsim_iaas::core::cloudlet_scheduler::SchedulingDiscipline;
use cloudsim_iaas::core::host::HostSpec;
use cloudsim_iaas::core::vm::VmSpec;
use cloudsim_iaas::simulation::CloudSimulation;

const CLOUDLET_COUNT: usize = 80;

fn random_sim(seed: u64, allocation: &str, binding: &str) -> (CloudSimulation, Rc<RefCell<Broker>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut cloud_sim = CloudSimulation::new(seed);
    let hosts = (0..4)
        .map(|_| HostSpec::uniform(rng.gen_range(4..=8), 1000., 8192, 100000, 100000))
        .collect();
    cloud_sim.create_datacenter("dc", hosts, allocation_policy_resolver(allocation).unwrap());
    let broker = cloud_sim.create_broker("broker");
    broker
        .borrow_mut()
        .set_binding_policy(binding_policy_resolver(binding).unwrap());

    let vms: Vec<VmSpec> = (0..10)
        .map(|_| {
            let scheduler = if rng.gen_bool(0.5) {
                SchedulingDiscipline::TimeShared
            } else {
                SchedulingDiscipline::SpaceShared
            };
            let mut vm = VmSpec::new(rng.gen_range(500.0..1000.0), rng.gen_range(1..=4), 1024, 1000, 1000)
                .with_scheduler(scheduler);
            if rng.gen_bool(0.3) {
                vm = vm.with_max_cloudlets(rng.gen_range(1..4));
            }
            vm
        })
        .collect();
    let cloudlets: Vec<CloudletSpec> = (0..CLOUDLET_COUNT)
        .map(|_| {
            CloudletSpec::new(rng.gen_range(1000.0..20000.0), rng.gen_range(1..=2))
                .with_submission_delay(if rng.gen_bool(0.5) { 0. } else { rng.gen_range(0.0..30.0) })
        })
        .collect();
    broker.borrow_mut().submit_vm_list(vms);
    broker.borrow_mut().submit_cloudlet_list(cloudlets);
    (cloud_sim, broker)
}

type Trace = Vec<(u32, CloudletStatus, Option<u32>, Option<f64>, Option<f64>)>;

fn run(seed: u64, allocation: &str, binding: &str) -> (f64, Trace) {
    let (mut cloud_sim, broker) = random_sim(seed, allocation, binding);
    let end_time = cloud_sim.start();
    let trace = broker
        .borrow()
        .cloudlet_finished_list()
        .iter()
        .map(|c| (c.id, c.status, c.vm_id, c.exec_start_time, c.finish_time))
        .collect();
    (end_time, trace)
}

#[test]
fn test_identical_runs_are_identical() {
    for binding in ["FirstAvailable", "RoundRobin", "LeastLoaded"] {
        let first = run(7, "RoundRobin", binding);
        let second = run(7, "RoundRobin", binding);
        assert_eq!(first, second);
        assert_eq!(first.1.len(), CLOUDLET_COUNT);
    }
}

#[test]
fn test_host_capacity_is_never_exceeded() {
    for (seed, allocation) in [(1, "RoundRobin"), (2, "FirstFit"), (3, "BestFit"), (4, "WorstFit")] {
        let (mut cloud_sim, _broker) = random_sim(seed, allocation, "LeastLoaded");
        let dc = cloud_sim.datacenters()[0].clone();
        while cloud_sim.step() {
            for host in dc.borrow().hosts() {
                assert!(host.is_within_capacity());
                let reserved_pes: usize = host.vm_ids().map(|id| host.allocation(id).unwrap().pes.len()).sum();
                assert_eq!(reserved_pes + host.free_pes(), host.pes().len());
            }
        }
    }
}

#[test]
fn test_every_cloudlet_terminates_in_order() {
    for seed in 10..15 {
        let (mut cloud_sim, broker) = random_sim(seed, "RoundRobin", "RoundRobin");
        let end_time = cloud_sim.start();
        let broker = broker.borrow();
        let finished = broker.cloudlet_finished_list();
        assert_eq!(finished.len(), CLOUDLET_COUNT);
        assert_eq!(broker.unfinished_cloudlets(), 0);

        let mut prev = 0.;
        for c in finished {
            assert!(c.status == CloudletStatus::Finished || c.status == CloudletStatus::Failed);
            let finish = c.finish_time.unwrap();
            assert!(finish >= prev, "cloudlet #{} finished at {} before {}", c.id, finish, prev);
            assert!(finish <= end_time);
            prev = finish;
            if c.status == CloudletStatus::Finished {
                let start = c.exec_start_time.unwrap();
                assert!(start >= c.spec.submission_delay);
                // no cloudlet runs faster than its PEs allow
                assert!(finish - start >= c.spec.length / (1000. * c.pes() as f64) - 1e-9);
                assert_eq!(c.remaining_length, 0.);
            }
        }
        assert_eq!(cloud_sim.pending_event_count(), 0);
    }
}
