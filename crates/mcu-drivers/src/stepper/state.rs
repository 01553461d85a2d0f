//! The per-motor state record. [`engine`](super::engine), [`realtime`](super::realtime)
//! and [`mode`](super::mode) each implement one facet of [`Stepper`]'s
//! behaviour; this module only owns the data.

use super::gpio::{DirLine, StepLine};
use super::queue::MoveQueue;
use super::types::{Mode, PendingTransition, POSITION_BIAS};

/// Real-time control-loop sub-state (§4.C/§4.D). Lives alongside the
/// host-mode fields so a mode transition is a matter of flipping `mode`
/// and reconciling `position`/`count`, not swapping data structures.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtState {
    // Tuning, set by `config_stepper_rt_mode`.
    pub control_freq: u32,
    pub control_period: u32,
    pub input_cycle: u16,
    pub input_factor: i32,
    pub max_freq: u32,
    pub max_acc: u32,
    pub max_delta_freq: u32,
    pub min_freq: u32,

    // Runtime.
    pub current_speed: i32,
    pub target_speed: i32,
    pub current_period: u32,
    pub current_dir: bool,
    pub cycle_count: u16,
    pub count: i32,
    pub min_pos: i32,
    pub max_pos: i32,
    pub freq_limiter: u32,
    pub slowdown: bool,
    pub dir_save: bool,
    pub last_step: u32,
}

/// A single motor's complete state: host-mode queue/engine fields, the
/// real-time sub-state, and the mode-transition bookkeeping.
///
/// `STEP_DELAY` selects, at compile time, whether the step timer callback
/// needs a separate unstep edge (`STEP_DELAY > 0`, for MCUs whose pulse
/// width must be enforced in software) or can toggle once per step
/// (`STEP_DELAY == 0`), as a const generic rather than a preprocessor
/// branch.
pub struct Stepper<S: StepLine, D: DirLine, const STEP_DELAY: u32> {
    pub(super) oid: u8,
    pub(super) step_line: S,
    pub(super) dir_line: D,
    pub(super) invert_step: bool,
    pub(super) min_stop_interval: u32,

    pub(super) queue: MoveQueue,

    pub(super) interval: u32,
    pub(super) add: i16,
    pub(super) count: u32,
    pub(super) next_step_time: u32,
    pub(super) position: i32,

    pub(super) last_dir: bool,
    pub(super) next_dir: bool,
    pub(super) last_reset: bool,
    pub(super) no_next_check: bool,
    pub(super) need_reset: bool,

    pub(super) mode: Mode,
    /// Edge flag: a `ModeTransitionTimer` has fired and the cooperative
    /// mode-toggle task has not yet consumed it.
    pub(super) toggle_pending: bool,
    pub(super) transition_deadline: u32,
    /// The transition armed for `transition_deadline`, or `None` if no
    /// transition is currently armed (`set_realtime_mode`/`set_host_mode`
    /// reject a second arm attempt while this is `Some`).
    pub(super) pending_transition: Option<PendingTransition>,
    pub(super) slowdown_pending: Option<u32>,

    pub(super) rt: RtState,
}

impl<S: StepLine, D: DirLine, const STEP_DELAY: u32> Stepper<S, D, STEP_DELAY> {
    pub fn new(oid: u8, step_line: S, dir_line: D, min_stop_interval: u32, invert_step: bool) -> Self {
        Self {
            oid,
            step_line,
            dir_line,
            invert_step,
            min_stop_interval,
            queue: MoveQueue::new(),
            interval: 0,
            add: 0,
            count: 0,
            next_step_time: 0,
            position: -POSITION_BIAS,
            last_dir: false,
            next_dir: false,
            last_reset: true,
            no_next_check: false,
            need_reset: true,
            mode: Mode::Host,
            toggle_pending: false,
            transition_deadline: 0,
            pending_transition: None,
            slowdown_pending: None,
            rt: RtState::default(),
        }
    }

    pub fn oid(&self) -> u8 {
        self.oid
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn physical_dir_from(invert: bool, logical: bool) -> bool {
        logical ^ invert
    }

    pub(super) fn write_dir(&mut self, logical_dir: bool) {
        if Self::physical_dir_from(self.invert_step, logical_dir) {
            self.dir_line.set_high();
        } else {
            self.dir_line.set_low();
        }
    }

    pub(super) fn pulse_step(&mut self, high: bool) {
        if high {
            self.step_line.set_high();
        } else {
            self.step_line.set_low();
        }
    }
}
