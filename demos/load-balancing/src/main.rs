use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use clap::Parser;
use env_logger::Builder;
use log::error;

use cloudsim_iaas::core::allocation_policy::allocation_policy_resolver;
use cloudsim_iaas::core::binding_policy::binding_policy_resolver;
use cloudsim_iaas::core::broker::Broker;
use cloudsim_iaas::core::cloudlet::CloudletSpec;
use cloudsim_iaas::core::cloudlet_scheduler::SchedulingDiscipline;
use cloudsim_iaas::core::config::{ConfigError, SimulationConfig};
use cloudsim_iaas::core::host::HostSpec;
use cloudsim_iaas::core::vm::VmSpec;
use cloudsim_iaas::simulation::CloudSimulation;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Runs cloudlets on VMs spread over datacenter hosts and prints the results
struct Args {
    /// Path to YAML simulation config, the built-in scenario is used if absent
    #[arg(short, long)]
    config: Option<String>,

    /// VM allocation policy (RoundRobin, FirstFit, BestFit, WorstFit)
    #[arg(short, long, default_value = "RoundRobin")]
    allocation: String,

    /// Cloudlet binding policy (FirstAvailable, RoundRobin, LeastLoaded)
    #[arg(short, long, default_value = "RoundRobin")]
    binding: String,

    /// Use space-shared cloudlet scheduling on VMs
    #[arg(long)]
    space_shared: bool,
}

fn build_scenario(args: &Args) -> Result<(CloudSimulation, Rc<RefCell<Broker>>), ConfigError> {
    let mut cloud_sim = CloudSimulation::new(123);
    let hosts = vec![HostSpec::uniform(4, 1000., 8192, 100000, 10000); 3];
    cloud_sim.create_datacenter("datacenter", hosts, allocation_policy_resolver(&args.allocation)?);

    let broker = cloud_sim.create_broker("broker");
    let scheduler = if args.space_shared {
        SchedulingDiscipline::SpaceShared
    } else {
        SchedulingDiscipline::TimeShared
    };
    {
        let mut broker = broker.borrow_mut();
        broker.set_binding_policy(binding_policy_resolver(&args.binding)?);
        broker.submit_vm_list(vec![VmSpec::new(1000., 2, 512, 1000, 10000).with_scheduler(scheduler); 6]);
        broker.submit_cloudlet_list(vec![CloudletSpec::new(10000., 1).with_file_sizes(300, 300); 12]);
    }
    Ok((cloud_sim, broker))
}

fn print_results(broker: &Broker, end_time: f64) {
    println!();
    println!("{:>8} {:>8} {:>4} {:>6} {:>10} {:>10} {:>10}", "Cloudlet", "Status", "VM", "Host", "Start", "Finish", "CPU time");
    for cloudlet in broker.cloudlet_finished_list() {
        let host = cloudlet
            .vm_id
            .and_then(|vm_id| broker.vm(vm_id))
            .and_then(|vm| vm.host)
            .map_or("-".to_string(), |host| host.to_string());
        println!(
            "{:>8} {:>8} {:>4} {:>6} {:>10.2} {:>10.2} {:>10.2}",
            cloudlet.id,
            cloudlet.status.to_string(),
            cloudlet.vm_id.map_or("-".to_string(), |vm_id| vm_id.to_string()),
            host,
            cloudlet.exec_start_time.unwrap_or(0.),
            cloudlet.finish_time.unwrap_or(0.),
            cloudlet.actual_cpu_time().unwrap_or(0.)
        );
    }
    println!();
    for (vm_id, vm) in broker.vms() {
        let count = broker
            .cloudlet_finished_list()
            .iter()
            .filter(|c| c.vm_id == Some(vm_id))
            .count();
        println!("VM {} ({}): {} cloudlets", vm_id, vm.status, count);
    }
    println!();
    println!("Simulation finished at {:.2}", end_time);
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();

    let scenario = match &args.config {
        Some(path) => SimulationConfig::from_file(path).and_then(|config| CloudSimulation::from_config(&config)),
        None => build_scenario(&args),
    };
    let (mut cloud_sim, broker) = match scenario {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let end_time = cloud_sim.start();
    print_results(&broker.borrow(), end_time);
}
