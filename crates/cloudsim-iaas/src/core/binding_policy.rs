//! Cloudlet to VM binding policies used by the broker.

use crate::core::cloudlet::Cloudlet;
use crate::core::common::VmId;
use crate::core::config::ConfigError;

/// Broker view of a VM which can accept the cloudlet right now.
#[derive(Clone, Debug)]
pub struct VmCandidate {
    pub id: VmId,
    pub pes: u32,
    /// MIPS of each PE.
    pub mips: f64,
    /// Cloudlets bound to the VM and not yet returned to the broker.
    pub bound_cloudlets: usize,
}

/// Trait for implementation of cloudlet binding policies.
///
/// Candidates are passed in VM submission order and contain only live VMs which have spare admission capacity.
/// Space-shared candidates also have enough PEs for the cloudlet. Returning `None` leaves the cloudlet queued.
pub trait CloudletBindingPolicy {
    fn select_vm(&mut self, cloudlet: &Cloudlet, candidates: &[VmCandidate]) -> Option<VmId>;
}

pub fn binding_policy_resolver(name: &str) -> Result<Box<dyn CloudletBindingPolicy>, ConfigError> {
    match name {
        "FirstAvailable" => Ok(Box::new(FirstAvailable::new())),
        "RoundRobin" => Ok(Box::new(RoundRobinBinding::new())),
        "LeastLoaded" => Ok(Box::new(LeastLoaded::new())),
        _ => Err(ConfigError::UnknownBindingPolicy(name.to_string())),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Binds to the first candidate.
#[derive(Default)]
pub struct FirstAvailable;

impl FirstAvailable {
    pub fn new() -> Self {
        Default::default()
    }
}

impl CloudletBindingPolicy for FirstAvailable {
    fn select_vm(&mut self, _cloudlet: &Cloudlet, candidates: &[VmCandidate]) -> Option<VmId> {
        candidates.first().map(|vm| vm.id)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Cycles through VMs: binds to the first candidate following the previously selected VM.
#[derive(Default)]
pub struct RoundRobinBinding {
    last: Option<VmId>,
}

impl RoundRobinBinding {
    pub fn new() -> Self {
        Default::default()
    }
}

impl CloudletBindingPolicy for RoundRobinBinding {
    fn select_vm(&mut self, _cloudlet: &Cloudlet, candidates: &[VmCandidate]) -> Option<VmId> {
        let selected = match self.last {
            Some(last) => candidates.iter().find(|vm| vm.id > last).or_else(|| candidates.first()),
            None => candidates.first(),
        };
        let id = selected?.id;
        self.last = Some(id);
        Some(id)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Binds to the candidate with the lowest number of bound cloudlets per unit of processing capacity
/// (`pes * mips`), ties go to the earlier VM.
#[derive(Default)]
pub struct LeastLoaded;

impl LeastLoaded {
    pub fn new() -> Self {
        Default::default()
    }
}

impl CloudletBindingPolicy for LeastLoaded {
    fn select_vm(&mut self, _cloudlet: &Cloudlet, candidates: &[VmCandidate]) -> Option<VmId> {
        let mut result: Option<VmId> = None;
        let mut min_load = f64::MAX;

        for vm in candidates {
            let load = vm.bound_cloudlets as f64 / (vm.pes as f64 * vm.mips);
            if load < min_load {
                min_load = load;
                result = Some(vm.id);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cloudlet::CloudletSpec;

    fn candidate(id: VmId, pes: u32, bound_cloudlets: usize) -> VmCandidate {
        VmCandidate {
            id,
            pes,
            mips: 1000.,
            bound_cloudlets,
        }
    }

    fn candidate_with_mips(id: VmId, pes: u32, mips: f64, bound_cloudlets: usize) -> VmCandidate {
        VmCandidate {
            mips,
            ..candidate(id, pes, bound_cloudlets)
        }
    }

    fn cloudlet() -> Cloudlet {
        Cloudlet::new(0, CloudletSpec::new(1000., 1))
    }

    #[test]
    fn test_first_available() {
        let mut policy = FirstAvailable::new();
        assert_eq!(policy.select_vm(&cloudlet(), &[candidate(2, 1, 5), candidate(3, 1, 0)]), Some(2));
        assert_eq!(policy.select_vm(&cloudlet(), &[]), None);
    }

    #[test]
    fn test_round_robin_binding() {
        let mut policy = RoundRobinBinding::new();
        let vms = [candidate(0, 1, 0), candidate(1, 1, 0), candidate(2, 1, 0)];
        let selected: Vec<_> = (0..5).map(|_| policy.select_vm(&cloudlet(), &vms)).collect();
        assert_eq!(selected, vec![Some(0), Some(1), Some(2), Some(0), Some(1)]);
        // VM 2 is no longer a candidate
        assert_eq!(policy.select_vm(&cloudlet(), &vms[..2]), Some(0));
    }

    #[test]
    fn test_least_loaded() {
        let mut policy = LeastLoaded::new();
        let vms = [candidate(0, 1, 2), candidate(1, 4, 4), candidate(2, 2, 1)];
        assert_eq!(policy.select_vm(&cloudlet(), &vms), Some(2));
    }

    #[test]
    fn test_least_loaded_weights_by_mips() {
        let mut policy = LeastLoaded::new();
        // 2 / 2000 vs 1 / 500
        let vms = [candidate_with_mips(0, 1, 2000., 2), candidate_with_mips(1, 1, 500., 1)];
        assert_eq!(policy.select_vm(&cloudlet(), &vms), Some(0));
        let vms = [candidate_with_mips(0, 1, 2000., 5), candidate_with_mips(1, 2, 500., 1)];
        assert_eq!(policy.select_vm(&cloudlet(), &vms), Some(1));
    }

    #[test]
    fn test_resolver() {
        assert!(binding_policy_resolver("LeastLoaded").is_ok());
        assert!(matches!(
            binding_policy_resolver("Random"),
            Err(ConfigError::UnknownBindingPolicy(_))
        ));
    }
}
