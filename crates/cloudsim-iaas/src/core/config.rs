//! Simulation configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::cloudlet::CloudletSpec;
use crate::core::cloudlet_scheduler::SchedulingDiscipline;
use crate::core::host::HostSpec;
use crate::core::vm::VmSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown allocation policy: {0}")]
    UnknownAllocationPolicy(String),
    #[error("unknown cloudlet binding policy: {0}")]
    UnknownBindingPolicy(String),
}

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub seed: Option<u64>,
    pub allocation_policy: Option<String>,
    pub cloudlet_binding: Option<String>,
    pub destroy_idle_vms: Option<bool>,
    pub terminate_at: Option<f64>,
    pub hosts: Option<Vec<HostConfig>>,
    pub vms: Option<Vec<VmConfig>>,
    pub cloudlets: Option<Vec<CloudletConfig>>,
}

/// Holds configuration of a single host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Number of such hosts (1 if absent).
    pub count: Option<u32>,
    pub pes: u32,
    pub pe_mips: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
}

/// Holds configuration of a single VM or a set of identical VMs.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VmConfig {
    pub count: Option<u32>,
    pub mips: f64,
    pub pes: u32,
    pub ram: u64,
    pub bw: u64,
    pub size: u64,
    /// Time-shared if absent.
    pub scheduler: Option<SchedulingDiscipline>,
    pub max_cloudlets: Option<usize>,
}

/// Holds configuration of a single cloudlet or a set of identical cloudlets.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct CloudletConfig {
    pub count: Option<u32>,
    pub length: f64,
    pub pes: u32,
    pub file_size: Option<u64>,
    pub output_size: Option<u64>,
    pub submission_delay: Option<f64>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Seed of the simulation random generator.
    pub seed: u64,
    /// Name of VM allocation policy of the datacenter.
    pub allocation_policy: String,
    /// Name of cloudlet binding policy of the broker.
    pub cloudlet_binding: String,
    /// Whether the broker destroys its VMs once all cloudlets are done.
    pub destroy_idle_vms: bool,
    /// Simulation time at which the run is stopped even if events remain.
    pub terminate_at: Option<f64>,
    pub hosts: Vec<HostConfig>,
    pub vms: Vec<VmConfig>,
    pub cloudlets: Vec<CloudletConfig>,
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let raw: RawSimulationConfig = serde_yaml::from_str(data)?;
        Ok(Self {
            seed: raw.seed.unwrap_or(123),
            allocation_policy: raw.allocation_policy.unwrap_or_else(|| "RoundRobin".to_string()),
            cloudlet_binding: raw.cloudlet_binding.unwrap_or_else(|| "FirstAvailable".to_string()),
            destroy_idle_vms: raw.destroy_idle_vms.unwrap_or(true),
            terminate_at: raw.terminate_at,
            hosts: raw.hosts.unwrap_or_default(),
            vms: raw.vms.unwrap_or_default(),
            cloudlets: raw.cloudlets.unwrap_or_default(),
        })
    }

    pub fn host_specs(&self) -> Vec<HostSpec> {
        self.hosts
            .iter()
            .flat_map(|h| {
                let spec = HostSpec::uniform(h.pes, h.pe_mips, h.ram, h.bw, h.storage);
                std::iter::repeat(spec).take(h.count.unwrap_or(1) as usize)
            })
            .collect()
    }

    pub fn vm_specs(&self) -> Vec<VmSpec> {
        self.vms
            .iter()
            .flat_map(|v| {
                let mut spec = VmSpec::new(v.mips, v.pes, v.ram, v.bw, v.size)
                    .with_scheduler(v.scheduler.unwrap_or(SchedulingDiscipline::TimeShared));
                spec.max_cloudlets = v.max_cloudlets;
                std::iter::repeat(spec).take(v.count.unwrap_or(1) as usize)
            })
            .collect()
    }

    pub fn cloudlet_specs(&self) -> Vec<CloudletSpec> {
        self.cloudlets
            .iter()
            .flat_map(|c| {
                let spec = CloudletSpec::new(c.length, c.pes)
                    .with_file_sizes(c.file_size.unwrap_or(0), c.output_size.unwrap_or(0))
                    .with_submission_delay(c.submission_delay.unwrap_or(0.));
                std::iter::repeat(spec).take(c.count.unwrap_or(1) as usize)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::from_yaml("hosts:\n  - {pes: 2, pe_mips: 1000, ram: 4096, bw: 1000, storage: 1000}\n")
            .unwrap();
        assert_eq!(config.seed, 123);
        assert_eq!(config.allocation_policy, "RoundRobin");
        assert_eq!(config.cloudlet_binding, "FirstAvailable");
        assert!(config.destroy_idle_vms);
        assert_eq!(config.terminate_at, None);
        assert_eq!(config.host_specs(), vec![HostSpec::uniform(2, 1000., 4096, 1000, 1000)]);
        assert!(config.vm_specs().is_empty());
    }

    #[test]
    fn test_counts_are_expanded() {
        let yaml = r#"
vms:
  - count: 2
    mips: 1000
    pes: 1
    ram: 512
    bw: 1000
    size: 100
    scheduler: SpaceShared
    max_cloudlets: 3
cloudlets:
  - count: 3
    length: 5000
    pes: 1
    submission_delay: 2.5
"#;
        let config = SimulationConfig::from_yaml(yaml).unwrap();
        let vms = config.vm_specs();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[1].scheduler, SchedulingDiscipline::SpaceShared);
        assert_eq!(vms[1].max_cloudlets, Some(3));
        let cloudlets = config.cloudlet_specs();
        assert_eq!(cloudlets.len(), 3);
        assert_eq!(cloudlets[2].submission_delay, 2.5);
        assert_eq!(cloudlets[2].file_size, 0);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            SimulationConfig::from_file("no-such-config.yaml"),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            SimulationConfig::from_yaml("hosts: 5"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
