//! Virtual machine allocation policies.

use crate::core::allocation_policies::best_fit::BestFit;
use crate::core::allocation_policies::first_fit::FirstFit;
use crate::core::allocation_policies::round_robin::RoundRobin;
use crate::core::allocation_policies::worst_fit::WorstFit;
use crate::core::common::{HostId, VmId};
use crate::core::config::ConfigError;
use crate::core::error::CloudError;
use crate::core::host::Host;
use crate::core::vm::VmSpec;

/// Trait for implementation of VM allocation policies.
///
/// The policy is defined by `select_host` which proposes a host (an index in the datacenter host list) for the
/// VM given the current state of hosts, or `None` if there is no host to propose. The policy may keep its own
/// state (e.g. a cursor) between calls, it is owned by a single datacenter.
///
/// The datacenter calls only `allocate_host_for_vm` and `deallocate_host_for_vm`, so arbitrary placement strategies
/// can be used without changes to the datacenter or the broker.
pub trait VmAllocationPolicy {
    fn select_host(&mut self, vm_id: VmId, vm: &VmSpec, hosts: &[Host]) -> Option<usize>;

    /// Places the VM and reserves host resources.
    ///
    /// A host that turns out to be unable to fit the VM is skipped and the policy is asked again, at most once per
    /// host. Fails with `NoSuitableHost` if no host could take the VM.
    fn allocate_host_for_vm(&mut self, vm_id: VmId, vm: &VmSpec, hosts: &mut [Host]) -> Result<HostId, CloudError> {
        for _ in 0..hosts.len() {
            let idx = match self.select_host(vm_id, vm, hosts) {
                Some(idx) => idx,
                None => break,
            };
            match hosts.get_mut(idx) {
                Some(host) => match host.allocate(vm_id, vm) {
                    Ok(()) => return Ok(host.id()),
                    Err(CloudError::InsufficientCapacity { .. }) => continue,
                    Err(e) => return Err(e),
                },
                None => {
                    return Err(CloudError::InvalidState(format!(
                        "allocation policy selected unknown host #{}",
                        idx
                    )))
                }
            }
        }
        Err(CloudError::NoSuitableHost { vm_id })
    }

    /// Returns host resources reserved by the VM.
    fn deallocate_host_for_vm(&mut self, vm_id: VmId, host_id: HostId, hosts: &mut [Host]) -> Result<(), CloudError> {
        match hosts.get_mut(host_id as usize) {
            Some(host) => host.release(vm_id).map(|_| ()),
            None => Err(CloudError::InvalidState(format!("unknown host #{}", host_id))),
        }
    }
}

pub fn allocation_policy_resolver(name: &str) -> Result<Box<dyn VmAllocationPolicy>, ConfigError> {
    match name {
        "RoundRobin" => Ok(Box::new(RoundRobin::new())),
        "FirstFit" => Ok(Box::new(FirstFit::new())),
        "BestFit" => Ok(Box::new(BestFit::new())),
        "WorstFit" => Ok(Box::new(WorstFit::new())),
        _ => Err(ConfigError::UnknownAllocationPolicy(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::HostSpec;

    fn hosts(count: u32, pes: u32) -> Vec<Host> {
        (0..count)
            .map(|id| Host::new(id, &HostSpec::uniform(pes, 1000., 8192, 100000, 100000)))
            .collect()
    }

    fn vm(pes: u32) -> VmSpec {
        VmSpec::new(1000., pes, 512, 1000, 10000)
    }

    fn place(policy: &mut dyn VmAllocationPolicy, hosts: &mut [Host], vms: &[u32]) -> Vec<Option<HostId>> {
        vms.iter()
            .enumerate()
            .map(|(vm_id, &pes)| policy.allocate_host_for_vm(vm_id as VmId, &vm(pes), hosts).ok())
            .collect()
    }

    #[test]
    fn test_round_robin_spreads_vms_cyclically() {
        let mut hosts = hosts(3, 4);
        let mut policy = RoundRobin::new();
        let placed = place(&mut policy, &mut hosts, &[2, 2, 2, 2, 2, 2]);
        assert_eq!(placed, vec![Some(0), Some(1), Some(2), Some(0), Some(1), Some(2)]);
        assert_eq!(hosts[0].vm_ids().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn test_round_robin_skips_full_hosts() {
        let mut hosts = hosts(3, 4);
        let mut policy = RoundRobin::new();
        // the first VM fills host 0
        let placed = place(&mut policy, &mut hosts, &[4, 2, 2, 2]);
        assert_eq!(placed, vec![Some(0), Some(1), Some(2), Some(1)]);
    }

    #[test]
    fn test_no_suitable_host() {
        let mut hosts = hosts(2, 2);
        for policy in ["RoundRobin", "FirstFit", "BestFit", "WorstFit"] {
            let mut policy = allocation_policy_resolver(policy).unwrap();
            let err = policy.allocate_host_for_vm(9, &vm(3), &mut hosts).unwrap_err();
            assert_eq!(err, CloudError::NoSuitableHost { vm_id: 9 });
        }
        assert!(hosts.iter().all(|h| h.free_pes() == 2));
    }

    #[test]
    fn test_first_best_worst_fit() {
        let mut first = hosts(3, 4);
        assert_eq!(
            place(&mut FirstFit::new(), &mut first, &[1, 2, 1, 2]),
            vec![Some(0), Some(0), Some(0), Some(1)]
        );

        let mut best = hosts(3, 4);
        assert_eq!(place(&mut BestFit::new(), &mut best, &[3, 2, 1]), vec![Some(0), Some(1), Some(0)]);

        let mut worst = hosts(3, 4);
        assert_eq!(place(&mut WorstFit::new(), &mut worst, &[3, 2, 1]), vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_deallocate_releases_resources() {
        let mut hosts = hosts(2, 4);
        let mut policy = RoundRobin::new();
        let host_id = policy.allocate_host_for_vm(0, &vm(4), &mut hosts).unwrap();
        assert_eq!(hosts[0].free_pes(), 0);
        policy.deallocate_host_for_vm(0, host_id, &mut hosts).unwrap();
        assert_eq!(hosts[0].free_pes(), 4);
        assert!(matches!(
            policy.deallocate_host_for_vm(0, host_id, &mut hosts),
            Err(CloudError::InvalidState(_))
        ));
    }

    #[test]
    fn test_unknown_policy_name() {
        assert!(matches!(
            allocation_policy_resolver("Random"),
            Err(ConfigError::UnknownAllocationPolicy(name)) if name == "Random"
        ));
    }
}
