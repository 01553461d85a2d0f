//! Sequences transitions between `Mode::Host` and `Mode::RealTime` (§4.E).
//!
//! Two timer-context callbacks bracket the heavier cooperative-task work:
//! `toggle_mode_event` only raises the `toggle_pending` edge (the fired
//! `ModeTransitionTimer` is cheap to observe from an interrupt); the actual
//! division/sqrt-bearing reconciliation runs in `toggle_mode_task`, called
//! from task context per §5.

use super::error::Fault;
use super::gpio::{DirLine, StepLine};
use super::math::timer_is_before;
use super::state::Stepper;
use super::types::{Mode, PendingTransition, RtArm, TimerResult, POSITION_BIAS};

/// Initial real-time timer kickoffs (§4.E step 4): staggered so the first
/// control tick has run before the step timer looks for a period.
const RT_CONTROL_KICKOFF_DIVISOR: u32 = 10_000;
const RT_STEP_KICKOFF_DIVISOR: u32 = 5_000;

impl<S: StepLine, D: DirLine, const STEP_DELAY: u32> Stepper<S, D, STEP_DELAY> {
    /// `set_realtime_mode`: arm a host-to-realtime transition at `clock`.
    /// Rejects a second arm while one is already outstanding.
    pub fn set_realtime_mode(&mut self, clock: u32, min_pos: i32, max_pos: i32) -> Result<(), Fault> {
        if self.pending_transition.is_some() {
            return Err(Fault::RealtimeModeAlreadyArmed);
        }
        self.pending_transition = Some(PendingTransition::EnterRealtime { min_pos, max_pos });
        self.transition_deadline = clock;
        Ok(())
    }

    /// `set_host_mode`: arm (or begin immediately) the realtime-to-host
    /// slowdown ending at/near `clock`. If the motor is currently in host
    /// mode, the request is remembered (`slowdown_pending`) and honored
    /// the next time `enter_realtime` fires.
    pub fn set_host_mode(&mut self, clock: u32, now: u32) -> Result<(), Fault> {
        if self.mode == Mode::Host {
            self.slowdown_pending = Some(clock);
            return Ok(());
        }
        self.schedule_slowdown(clock, now)
    }

    /// The slowdown-arming logic shared by `set_host_mode` and the
    /// deferred `slowdown_pending` replay in `enter_realtime`.
    fn schedule_slowdown(&mut self, clock: u32, now: u32) -> Result<(), Fault> {
        if self.pending_transition.is_some() {
            return Err(Fault::RealtimeModeAlreadyArmed);
        }
        let slowdown_time = self
            .rt
            .control_period
            .saturating_mul(self.rt.max_freq / self.rt.max_delta_freq.max(1));

        let deadline = clock.wrapping_sub(slowdown_time);
        if timer_is_before(deadline, now) {
            // No time left to ramp gracefully: start now with a
            // proportionally reduced limiter so the motor still stops by
            // (approximately) `clock`.
            let remaining = clock.wrapping_sub(now);
            self.rt.freq_limiter = self
                .rt
                .max_delta_freq
                .saturating_mul(remaining)
                / self.rt.control_period.max(1);
            self.rt.slowdown = true;
        } else {
            self.pending_transition = Some(PendingTransition::BeginSlowdown {
                freq_limiter: self.rt.max_freq,
            });
            self.transition_deadline = deadline;
        }
        Ok(())
    }

    /// Timer-context callback for the `ModeTransitionTimer`. Bounded and
    /// allocation-free: it only raises the edge the cooperative task polls.
    pub fn toggle_mode_event(&mut self) -> TimerResult {
        self.toggle_pending = true;
        TimerResult::Done
    }

    /// Cooperative-task consumer of `toggle_pending`. Performs the actual
    /// mode reconciliation (division, the real-time timer kickoff arms).
    /// Returns `None` if no transition was pending or the pending
    /// transition was a slowdown arm (no new timers to start).
    pub fn toggle_mode_task(&mut self, now: u32) -> Option<RtArm> {
        if !self.toggle_pending {
            return None;
        }
        self.toggle_pending = false;
        match self.pending_transition.take()? {
            PendingTransition::EnterRealtime { min_pos, max_pos } => {
                Some(self.enter_realtime(now, min_pos, max_pos))
            }
            PendingTransition::BeginSlowdown { freq_limiter } => {
                self.rt.freq_limiter = freq_limiter;
                self.rt.slowdown = true;
                None
            }
        }
    }

    /// Host → RealTime (§4.E).
    fn enter_realtime(&mut self, now: u32, min_pos: i32, max_pos: i32) -> RtArm {
        // 1. Ensure the direction line reflects forward motion, recording
        // whether we had to flip it so the exit seam can restore it.
        self.dir_save = self.last_dir;
        if self.last_dir {
            self.last_dir = false;
            self.write_dir(false);
        }

        // 2. Seed the real-time step counter so it's continuous with the
        // host-mode position.
        self.rt.count = self.get_position();
        self.rt.min_pos = min_pos;
        self.rt.max_pos = max_pos;

        // 3. Zero the runtime sub-state.
        self.rt.current_dir = false;
        self.rt.slowdown = false;
        self.rt.freq_limiter = 0;
        self.rt.current_period = 0;
        self.rt.current_speed = 0;
        self.rt.target_speed = 0;
        self.rt.cycle_count = 0;
        self.rt.last_step = now;

        // 4. Arm both real-time timers on staggered kickoffs.
        let arm = RtArm {
            control_at: now.wrapping_add(super::types::CLOCK_HZ / RT_CONTROL_KICKOFF_DIVISOR),
            step_at: now.wrapping_add(super::types::CLOCK_HZ / RT_STEP_KICKOFF_DIVISOR),
        };

        // 5. Mode = RealTime.
        self.mode = Mode::RealTime;

        // 6. Honor a slowdown armed while still in host mode.
        if let Some(clock) = self.slowdown_pending.take() {
            let _ = self.schedule_slowdown(clock, now);
        }

        arm
    }

    /// RealTime → Host, invoked from `rt_control_event` once the slowdown
    /// ramp's `freq_limiter` has decayed below one increment.
    pub(super) fn end_realtime_mode(&mut self) -> TimerResult {
        self.write_dir(self.dir_save);
        self.last_dir = self.dir_save;

        // Re-encode `position` so host-mode `get_position` continues to
        // report the real-time step counter's final value.
        self.position = self.rt_count_to_position();
        self.count = 0;
        self.need_reset = true;
        self.rt.slowdown = false;

        self.mode = Mode::Host;
        TimerResult::Done
    }

    /// `rt.count + POSITION_BIAS`, carrying forward the pre-RT direction
    /// polarity bit. `position` is never written while `mode == RealTime`,
    /// so its top bit still holds whatever polarity was in effect when
    /// `enter_realtime` ran; the exit seam must restore it rather than
    /// always encoding the "forward" polarity (§3 invariant 4).
    fn rt_count_to_position(&self) -> i32 {
        let biased = self.rt.count + POSITION_BIAS;
        if self.position < 0 {
            -biased
        } else {
            biased
        }
    }

    pub fn is_transition_armed(&self) -> bool {
        self.pending_transition.is_some()
    }

    /// The absolute tick the `ModeTransitionTimer` should next fire at, for
    /// the caller that owns that timer. `None` while no transition is armed.
    pub fn transition_deadline(&self) -> Option<u32> {
        self.pending_transition.is_some().then_some(self.transition_deadline)
    }

    /// The e-stop primitive: unconditionally returns the motor to a
    /// parked, host-mode-idle state regardless of which mode it was in.
    /// Used by global shutdown and by a board-level emergency stop input.
    pub fn emergency_stop<const CAP: usize>(&mut self, pool: &mut super::pool::MovePool<CAP>) {
        if self.mode == Mode::RealTime {
            self.rt.current_period = 0;
            self.rt.slowdown = false;
            self.write_dir(self.dir_save);
            self.last_dir = self.dir_save;
            // Re-encode `position` from the real-time step counter, same as
            // `end_realtime_mode`, so `stop()` below (and any `get_position`
            // after it) reflects where the motor actually is instead of the
            // stale host-mode value from before `enter_realtime`.
            self.position = self.rt_count_to_position();
            self.mode = Mode::Host;
        }
        self.pending_transition = None;
        self.toggle_pending = false;
        self.slowdown_pending = None;
        self.stop(pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::pool::MovePool;
    use crate::stepper::types::RtModeConfig;

    struct FakePin {
        high: bool,
    }
    impl StepLine for FakePin {
        fn set_high(&mut self) {
            self.high = true;
        }
        fn set_low(&mut self) {
            self.high = false;
        }
    }
    impl DirLine for FakePin {
        fn set_high(&mut self) {
            self.high = true;
        }
        fn set_low(&mut self) {
            self.high = false;
        }
    }

    fn configured() -> Stepper<FakePin, FakePin, 0> {
        let mut s = Stepper::new(0, FakePin { high: false }, FakePin { high: false }, 100, false);
        s.reset_step_clock(0).unwrap();
        s.configure_rt(RtModeConfig {
            control_freq: 1000,
            input_cycle: 10,
            input_factor: 1,
            max_freq: 500,
            max_acc: 10_000,
        });
        s
    }

    #[test]
    fn double_arm_is_rejected() {
        let mut s = configured();
        s.set_realtime_mode(1000, -100, 100).unwrap();
        let err = s.set_realtime_mode(2000, -100, 100).unwrap_err();
        assert_eq!(err, Fault::RealtimeModeAlreadyArmed);
    }

    #[test]
    fn enter_realtime_seeds_count_from_host_position() {
        let mut pool: MovePool<8> = MovePool::new();
        pool.init();
        let mut s = configured();
        s.queue_step(&mut pool, 500, 5, 0).unwrap();
        for t in [500, 1000, 1500, 2000, 2500] {
            s.step_event(&mut pool, t).unwrap();
        }
        let pos = s.get_position();

        s.set_realtime_mode(3000, -100, 100).unwrap();
        s.toggle_mode_event();
        let arm = s.toggle_mode_task(3000).unwrap();

        assert_eq!(s.mode, Mode::RealTime);
        assert_eq!(s.rt.count, pos);
        assert!(arm.step_at > 3000);
        assert!(arm.control_at > 3000);
    }

    #[test]
    fn slowdown_races_deadline_starts_immediately_when_late() {
        let mut s = configured();
        s.mode = Mode::RealTime;
        s.rt.current_speed = s.rt.max_freq as i32;

        // Deadline is already behind slowdown_time from `now`.
        s.set_host_mode(100, 5000).unwrap();

        assert!(s.rt.slowdown);
        assert!(s.rt.freq_limiter <= s.rt.max_delta_freq.saturating_mul(2));
    }

    #[test]
    fn slowdown_completes_and_returns_to_host() {
        let mut s = configured();
        s.mode = Mode::RealTime;
        s.rt.slowdown = true;
        s.rt.freq_limiter = s.rt.max_delta_freq; // one tick left
        let r = s.end_realtime_mode();
        assert_eq!(r, TimerResult::Done);
        assert_eq!(s.mode, Mode::Host);
    }

    #[test]
    fn noop_realtime_round_trip_preserves_position_polarity() {
        // A real-time episode that never moves the motor (count stays 0)
        // must not flip the sign of subsequent host-mode positions: the
        // pre-RT polarity bit in `position` has to survive the round trip.
        let mut pool: MovePool<8> = MovePool::new();
        pool.init();
        let mut s = configured();

        s.set_realtime_mode(0, -100, 100).unwrap();
        s.toggle_mode_event();
        s.toggle_mode_task(0).unwrap();
        assert_eq!(s.rt.count, 0);
        s.end_realtime_mode();

        s.reset_step_clock(0).unwrap();
        s.queue_step(&mut pool, 500, 3, 0).unwrap();
        for t in [500, 1000, 1500] {
            s.step_event(&mut pool, t).unwrap();
        }

        assert_eq!(s.get_position(), -3);
    }

    #[test]
    fn emergency_stop_reconciles_position_from_realtime_count() {
        let mut pool: MovePool<8> = MovePool::new();
        pool.init();
        let mut s = configured();
        s.mode = Mode::RealTime;
        s.rt.count = 42;

        s.emergency_stop(&mut pool);

        assert_eq!(s.mode, Mode::Host);
        assert_eq!(s.get_position(), 42);
    }
}
