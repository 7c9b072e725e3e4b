//! Division of VM processing capacity among resident cloudlets.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use cloudsim_core::EPSILON;

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::common::{CloudletId, VmId};
use crate::core::error::CloudError;
use crate::core::vm::VmSpec;

/// Remaining length (in MI) below which a cloudlet is considered complete.
pub const REMAINING_LENGTH_EPSILON: f64 = 1e-6;

/// Capacity sharing discipline of a cloudlet scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingDiscipline {
    /// Each cloudlet runs on dedicated PEs at full speed, others wait for free PEs.
    SpaceShared,
    /// All admitted cloudlets run at once sharing the VM PEs.
    TimeShared,
}

struct ExecutingCloudlet {
    cloudlet: Cloudlet,
    // current speed in MIPS
    rate: f64,
}

impl ExecutingCloudlet {
    fn is_complete(&self, now: f64) -> bool {
        if self.cloudlet.remaining_length <= REMAINING_LENGTH_EPSILON {
            return true;
        }
        if self.rate <= 0. {
            return false;
        }
        let remaining_time = self.cloudlet.remaining_length / self.rate;
        // a completion time equal to now in floating point would never make progress
        remaining_time <= EPSILON || now + remaining_time <= now
    }
}

/// Per-VM cloudlet scheduler.
///
/// The remaining length of executing cloudlets is advanced lazily: rates stay constant between changes of the
/// executing set, so processed work is `rate * (now - last_update)` with a single `last_update` timestamp
/// shared by all cloudlets. Every change first advances the work up to the current time and only then
/// recomputes the rates.
pub struct CloudletScheduler {
    vm_id: VmId,
    discipline: SchedulingDiscipline,
    pes: u32,
    mips: f64,
    max_cloudlets: Option<usize>,
    executing: Vec<ExecutingCloudlet>,
    waiting: VecDeque<Cloudlet>,
    last_update: f64,
}

impl CloudletScheduler {
    pub fn new(vm_id: VmId, vm: &VmSpec) -> Self {
        Self {
            vm_id,
            discipline: vm.scheduler,
            pes: vm.pes,
            mips: vm.mips,
            max_cloudlets: vm.max_cloudlets,
            executing: Vec::new(),
            waiting: VecDeque::new(),
            last_update: 0.,
        }
    }

    pub fn discipline(&self) -> SchedulingDiscipline {
        self.discipline
    }

    /// Number of executing and waiting cloudlets.
    pub fn resident_count(&self) -> usize {
        self.executing.len() + self.waiting.len()
    }

    pub fn is_full(&self) -> bool {
        self.max_cloudlets.map_or(false, |max| self.resident_count() >= max)
    }

    pub fn is_idle(&self) -> bool {
        self.resident_count() == 0
    }

    pub fn executing(&self) -> impl Iterator<Item = &Cloudlet> {
        self.executing.iter().map(|e| &e.cloudlet)
    }

    pub fn waiting(&self) -> impl Iterator<Item = &Cloudlet> {
        self.waiting.iter()
    }

    /// Current speed of the executing cloudlet in MIPS.
    pub fn rate(&self, cloudlet_id: CloudletId) -> Option<f64> {
        self.executing
            .iter()
            .find(|e| e.cloudlet.id == cloudlet_id)
            .map(|e| e.rate)
    }

    fn used_pes(&self) -> u32 {
        self.executing.iter().map(|e| e.cloudlet.pes()).sum()
    }

    fn free_pes(&self) -> u32 {
        self.pes.saturating_sub(self.used_pes())
    }

    /// Admits the cloudlet, returns its new status (`Executing` or `Queued`).
    pub fn submit(&mut self, mut cloudlet: Cloudlet, now: f64) -> Result<CloudletStatus, (CloudError, Cloudlet)> {
        if let Some(limit) = self.max_cloudlets {
            if self.resident_count() >= limit {
                let err = CloudError::SchedulerFull {
                    vm_id: self.vm_id,
                    limit,
                };
                return Err((err, cloudlet));
            }
        }
        if self.discipline == SchedulingDiscipline::SpaceShared && cloudlet.pes() > self.pes {
            let err = CloudError::InvalidState(format!(
                "cloudlet #{} needs {} PEs but vm #{} has only {}",
                cloudlet.id,
                cloudlet.pes(),
                self.vm_id,
                self.pes
            ));
            return Err((err, cloudlet));
        }
        self.update_processing(now);
        cloudlet.vm_id = Some(self.vm_id);
        let status = match self.discipline {
            SchedulingDiscipline::TimeShared => {
                self.start(cloudlet, now);
                CloudletStatus::Executing
            }
            SchedulingDiscipline::SpaceShared => {
                if self.free_pes() >= cloudlet.pes() {
                    self.start(cloudlet, now);
                    CloudletStatus::Executing
                } else {
                    cloudlet.status = CloudletStatus::Queued;
                    self.waiting.push_back(cloudlet);
                    CloudletStatus::Queued
                }
            }
        };
        self.update_rates();
        Ok(status)
    }

    fn start(&mut self, mut cloudlet: Cloudlet, now: f64) {
        cloudlet.status = CloudletStatus::Executing;
        if cloudlet.exec_start_time.is_none() {
            cloudlet.exec_start_time = Some(now);
        }
        self.executing.push(ExecutingCloudlet { cloudlet, rate: 0. });
    }

    /// Advances the remaining length of executing cloudlets up to `now`.
    pub fn update_processing(&mut self, now: f64) {
        let elapsed = now - self.last_update;
        if elapsed > 0. {
            for entry in self.executing.iter_mut() {
                let processed = entry.rate * elapsed;
                entry.cloudlet.remaining_length = (entry.cloudlet.remaining_length - processed).max(0.);
            }
        }
        if now > self.last_update {
            self.last_update = now;
        }
    }

    fn update_rates(&mut self) {
        let factor = match self.discipline {
            SchedulingDiscipline::SpaceShared => 1.,
            SchedulingDiscipline::TimeShared => {
                let requested = self.used_pes();
                if requested > self.pes {
                    self.pes as f64 / requested as f64
                } else {
                    1.
                }
            }
        };
        for entry in self.executing.iter_mut() {
            entry.rate = self.mips * entry.cloudlet.pes() as f64 * factor;
        }
    }

    /// Reacts to a change of the executing set: promotes waiting cloudlets that fit into free PEs and recomputes
    /// the rates. Returns the time of the nearest cloudlet completion.
    pub fn on_capacity_change(&mut self, now: f64) -> Option<f64> {
        self.update_processing(now);
        if self.discipline == SchedulingDiscipline::SpaceShared {
            let mut still_waiting = VecDeque::with_capacity(self.waiting.len());
            while let Some(cloudlet) = self.waiting.pop_front() {
                if cloudlet.pes() <= self.free_pes() {
                    self.start(cloudlet, now);
                } else {
                    still_waiting.push_back(cloudlet);
                }
            }
            self.waiting = still_waiting;
        }
        self.update_rates();
        self.next_completion_time()
    }

    /// Returns the time when the first executing cloudlet completes under the current rates.
    pub fn next_completion_time(&self) -> Option<f64> {
        self.executing
            .iter()
            .filter(|e| e.rate > 0.)
            .map(|e| self.last_update + e.cloudlet.remaining_length / e.rate)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Completes the executing cloudlet at `now` and hands it back.
    pub fn finish_cloudlet(&mut self, cloudlet_id: CloudletId, now: f64) -> Result<Cloudlet, CloudError> {
        let pos = self
            .executing
            .iter()
            .position(|e| e.cloudlet.id == cloudlet_id)
            .ok_or_else(|| {
                CloudError::InvalidState(format!(
                    "cloudlet #{} is not executing on vm #{}",
                    cloudlet_id, self.vm_id
                ))
            })?;
        self.update_processing(now);
        let mut cloudlet = self.executing.remove(pos).cloudlet;
        cloudlet.remaining_length = 0.;
        cloudlet.status = CloudletStatus::Finished;
        cloudlet.finish_time = Some(now);
        self.on_capacity_change(now);
        Ok(cloudlet)
    }

    /// Completes all cloudlets which have no work left at `now`, in the order they started.
    pub fn collect_finished(&mut self, now: f64) -> Vec<Cloudlet> {
        self.update_processing(now);
        let completed: Vec<CloudletId> = self
            .executing
            .iter()
            .filter(|e| e.is_complete(now))
            .map(|e| e.cloudlet.id)
            .collect();
        let mut finished = Vec::with_capacity(completed.len());
        for cloudlet_id in completed {
            if let Ok(cloudlet) = self.finish_cloudlet(cloudlet_id, now) {
                finished.push(cloudlet);
            }
        }
        finished
    }

    /// Removes all resident cloudlets marking them as failed.
    pub fn drain_failed(&mut self, now: f64) -> Vec<Cloudlet> {
        self.update_processing(now);
        let mut failed: Vec<Cloudlet> = self.executing.drain(..).map(|e| e.cloudlet).collect();
        failed.extend(self.waiting.drain(..));
        for cloudlet in failed.iter_mut() {
            cloudlet.fail(now);
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cloudlet::CloudletSpec;

    fn scheduler(discipline: SchedulingDiscipline, pes: u32, mips: f64) -> CloudletScheduler {
        CloudletScheduler::new(0, &VmSpec::new(mips, pes, 512, 1000, 1000).with_scheduler(discipline))
    }

    fn cloudlet(id: u32, length: f64, pes: u32) -> Cloudlet {
        Cloudlet::new(id, CloudletSpec::new(length, pes))
    }

    fn run_to_completion(scheduler: &mut CloudletScheduler) -> Vec<(u32, f64, f64)> {
        let mut result = Vec::new();
        let mut next = scheduler.on_capacity_change(0.);
        while let Some(time) = next {
            for c in scheduler.collect_finished(time) {
                result.push((c.id, c.exec_start_time.unwrap(), c.finish_time.unwrap()));
            }
            next = scheduler.next_completion_time();
        }
        result
    }

    #[test]
    fn test_time_shared_fairness() {
        let mut s = scheduler(SchedulingDiscipline::TimeShared, 1, 1000.);
        assert_eq!(s.submit(cloudlet(0, 10000., 1), 0.).unwrap(), CloudletStatus::Executing);
        assert_eq!(s.submit(cloudlet(1, 10000., 1), 0.).unwrap(), CloudletStatus::Executing);
        assert_eq!(s.rate(0), Some(500.));
        assert_eq!(s.rate(1), Some(500.));
        assert_eq!(run_to_completion(&mut s), vec![(0, 0., 20.), (1, 0., 20.)]);
        assert!(s.is_idle());
    }

    #[test]
    fn test_time_shared_rates_follow_executing_set() {
        let mut s = scheduler(SchedulingDiscipline::TimeShared, 1, 1000.);
        s.submit(cloudlet(0, 10000., 1), 0.).unwrap();
        assert_eq!(s.next_completion_time(), Some(10.));
        // at t=4 the first cloudlet has 6000 MI left, both now run at 500 MIPS
        s.submit(cloudlet(1, 2000., 1), 4.).unwrap();
        assert_eq!(s.next_completion_time(), Some(8.));
        let finished = s.collect_finished(8.);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, 1);
        // 4000 MI left after 4 more seconds at 500 MIPS, full speed again
        assert_eq!(s.rate(0), Some(1000.));
        assert_eq!(s.next_completion_time(), Some(12.));
    }

    #[test]
    fn test_time_shared_multi_pe_proportional_share() {
        let mut s = scheduler(SchedulingDiscipline::TimeShared, 2, 1000.);
        s.submit(cloudlet(0, 10000., 2), 0.).unwrap();
        s.submit(cloudlet(1, 10000., 1), 0.).unwrap();
        s.submit(cloudlet(2, 10000., 1), 0.).unwrap();
        // 4 PEs requested on 2 PEs
        assert_eq!(s.rate(0), Some(1000.));
        assert_eq!(s.rate(1), Some(500.));
        assert_eq!(s.rate(2), Some(500.));
    }

    #[test]
    fn test_space_shared_queuing() {
        let mut s = scheduler(SchedulingDiscipline::SpaceShared, 1, 1000.);
        assert_eq!(s.submit(cloudlet(0, 5000., 1), 0.).unwrap(), CloudletStatus::Executing);
        assert_eq!(s.submit(cloudlet(1, 5000., 1), 0.).unwrap(), CloudletStatus::Queued);
        assert_eq!(s.rate(0), Some(1000.));
        assert_eq!(s.rate(1), None);
        assert_eq!(run_to_completion(&mut s), vec![(0, 0., 5.), (1, 5., 10.)]);
    }

    #[test]
    fn test_space_shared_promotes_cloudlets_that_fit() {
        let mut s = scheduler(SchedulingDiscipline::SpaceShared, 2, 1000.);
        s.submit(cloudlet(0, 2000., 1), 0.).unwrap();
        s.submit(cloudlet(1, 6000., 1), 0.).unwrap();
        assert_eq!(s.submit(cloudlet(2, 4000., 2), 0.).unwrap(), CloudletStatus::Queued);
        assert_eq!(s.submit(cloudlet(3, 1000., 1), 0.).unwrap(), CloudletStatus::Queued);
        let result = run_to_completion(&mut s);
        // at t=2 one PE frees: cloudlet 2 still does not fit, cloudlet 3 does
        assert_eq!(result, vec![(0, 0., 2.), (3, 2., 3.), (1, 0., 6.), (2, 6., 8.)]);
    }

    #[test]
    fn test_space_shared_starts_cloudlet_on_idle_pe() {
        let mut s = scheduler(SchedulingDiscipline::SpaceShared, 2, 1000.);
        assert_eq!(s.submit(cloudlet(0, 2000., 1), 0.).unwrap(), CloudletStatus::Executing);
        assert_eq!(s.submit(cloudlet(1, 2000., 2), 0.).unwrap(), CloudletStatus::Queued);
        // a larger cloudlet is waiting but one PE is still free
        assert_eq!(s.submit(cloudlet(2, 1000., 1), 0.).unwrap(), CloudletStatus::Executing);
        assert_eq!(run_to_completion(&mut s), vec![(2, 0., 1.), (0, 0., 2.), (1, 2., 3.)]);
    }

    #[test]
    fn test_scheduler_full() {
        let vm = VmSpec::new(1000., 1, 512, 1000, 1000).with_max_cloudlets(1);
        let mut s = CloudletScheduler::new(3, &vm);
        s.submit(cloudlet(0, 1000., 1), 0.).unwrap();
        assert!(s.is_full());
        let (err, rejected) = s.submit(cloudlet(1, 1000., 1), 0.).unwrap_err();
        assert_eq!(err, CloudError::SchedulerFull { vm_id: 3, limit: 1 });
        assert_eq!(rejected.id, 1);
        assert_eq!(rejected.status, CloudletStatus::Created);
    }

    #[test]
    fn test_finish_unknown_cloudlet_is_invalid_state() {
        let mut s = scheduler(SchedulingDiscipline::TimeShared, 1, 1000.);
        assert!(matches!(s.finish_cloudlet(9, 0.), Err(CloudError::InvalidState(_))));
    }

    #[test]
    fn test_drain_marks_cloudlets_failed() {
        let mut s = scheduler(SchedulingDiscipline::SpaceShared, 1, 1000.);
        s.submit(cloudlet(0, 5000., 1), 0.).unwrap();
        s.submit(cloudlet(1, 5000., 1), 0.).unwrap();
        let failed = s.drain_failed(2.);
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|c| c.status == CloudletStatus::Failed));
        assert_eq!(failed[0].remaining_length, 3000.);
        assert!(s.is_idle());
        assert_eq!(s.next_completion_time(), None);
    }
}
