//! Lookup of per-motor [`Stepper`] state by `oid`, plus the shared
//! resources every motor draws from: the process-wide [`MovePool`] (§4.A)
//! and the module-global low-pass filter carrier the real-time loop
//! shares across motors (§4.C, and the open question in §9 — kept here,
//! explicit, rather than as a hidden `static`).

use super::error::Fault;
use super::gpio::{DirLine, StepLine};
use super::pool::MovePool;
use super::state::Stepper;
use super::types::StepperConfig;

/// `N` is the number of motors this board supports; `POOL_CAP` is the
/// shared move pool's capacity. Both are fixed at startup, matching the
/// "allocation from a process-wide fixed pool... exhaustion is a fatal
/// condition" rule and the registry's "stable for the firmware's lifetime"
/// `oid` space.
pub struct StepperRegistry<S: StepLine, D: DirLine, const STEP_DELAY: u32, const N: usize, const POOL_CAP: usize> {
    steppers: heapless::Vec<Stepper<S, D, STEP_DELAY>, N>,
    pool: MovePool<POOL_CAP>,
    shared_low_pass: i32,
}

impl<S: StepLine, D: DirLine, const STEP_DELAY: u32, const N: usize, const POOL_CAP: usize>
    StepperRegistry<S, D, STEP_DELAY, N, POOL_CAP>
{
    pub fn new() -> Self {
        let mut pool = MovePool::new();
        pool.init();
        Self {
            steppers: heapless::Vec::new(),
            pool,
            shared_low_pass: 0,
        }
    }

    /// `config_stepper`: allocate and configure a Stepper in Host mode.
    /// The returned `oid` is the slot index and is stable for the
    /// firmware's lifetime.
    pub fn config_stepper(&mut self, step_line: S, dir_line: D, cfg: StepperConfig) -> Result<u8, Fault> {
        let oid = self.steppers.len() as u8;
        let stepper = Stepper::new(oid, step_line, dir_line, cfg.min_stop_interval, cfg.invert_step);
        self.steppers.push(stepper).map_err(|_| Fault::RegistryFull)?;
        Ok(oid)
    }

    pub fn get(&self, oid: u8) -> Option<&Stepper<S, D, STEP_DELAY>> {
        self.steppers.get(oid as usize)
    }

    pub fn get_mut(&mut self, oid: u8) -> Option<&mut Stepper<S, D, STEP_DELAY>> {
        self.steppers.get_mut(oid as usize)
    }

    /// Split borrow for commands that need both the motor and the shared
    /// move pool (`queue_step`, `stop`, the step timer callback).
    pub fn stepper_and_pool(
        &mut self,
        oid: u8,
    ) -> Option<(&mut Stepper<S, D, STEP_DELAY>, &mut MovePool<POOL_CAP>)> {
        let stepper = self.steppers.get_mut(oid as usize)?;
        Some((stepper, &mut self.pool))
    }

    /// Split borrow for the real-time control tick, which needs the
    /// motor and the shared filter carrier.
    pub fn stepper_and_low_pass(&mut self, oid: u8) -> Option<(&mut Stepper<S, D, STEP_DELAY>, &mut i32)> {
        let stepper = self.steppers.get_mut(oid as usize)?;
        Some((stepper, &mut self.shared_low_pass))
    }

    /// Iteration for the periodic mode-toggle/rt-control tasks.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stepper<S, D, STEP_DELAY>> {
        self.steppers.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.steppers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steppers.is_empty()
    }

    /// Global shutdown: every motor is parked via the e-stop primitive,
    /// its queue flushed and timers implicitly cancelled (the caller stops
    /// polling once this returns).
    pub fn shutdown(&mut self) {
        for stepper in self.steppers.iter_mut() {
            stepper.emergency_stop(&mut self.pool);
        }
    }
}

impl<S: StepLine, D: DirLine, const STEP_DELAY: u32, const N: usize, const POOL_CAP: usize> Default
    for StepperRegistry<S, D, STEP_DELAY, N, POOL_CAP>
{
    fn default() -> Self {
        Self::new()
    }
}
