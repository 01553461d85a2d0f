//! The real-time control loop (§4.C) and its independent step timer
//! (§4.D). Both operate on [`RtState`](super::state::RtState); neither
//! touches the host-mode move queue.
//!
//! The two timers are genuinely independent: `rt_control_event` is the
//! sole writer of `current_period`/`current_dir`, `rt_step_event` is the
//! sole reader. On targets where aligned word loads/stores are atomic
//! (every target this crate is built for) no lock is needed between them,
//! matching §5's "Shared resources" note.

use super::gpio::{DirLine, Sensor, StepLine};
use super::math::{clamp_i32, clamp_sym_i32, isqrt};
use super::state::Stepper;
use super::types::{Mode, RtLog, RtModeConfig, TimerResult};

impl<S: StepLine, D: DirLine, const STEP_DELAY: u32> Stepper<S, D, STEP_DELAY> {
    /// `config_stepper_rt_mode`: set the tuning constants and reset the
    /// runtime sub-state. Does not change `mode`; the motor only starts
    /// running the loop once `enter_realtime` (§4.E) fires.
    pub fn configure_rt(&mut self, cfg: RtModeConfig) {
        let max_delta_freq = cfg.max_acc / cfg.control_freq.max(1);
        self.rt.control_freq = cfg.control_freq;
        self.rt.control_period = super::types::CLOCK_HZ / cfg.control_freq.max(1);
        self.rt.input_cycle = cfg.input_cycle;
        self.rt.input_factor = cfg.input_factor;
        self.rt.max_freq = cfg.max_freq;
        self.rt.max_acc = cfg.max_acc;
        self.rt.max_delta_freq = max_delta_freq;
        self.rt.min_freq = max_delta_freq.min(100);
    }

    /// One control-period tick (§4.C, steps 1-8). Only meaningful while
    /// `mode == RealTime`; returns the control timer's next deadline (or
    /// `Done` if this tick completed the slowdown and returned the motor
    /// to `Mode::Host`), plus the `stepper_rt_log` payload (§6) on the one
    /// tick in every `input_cycle` that took a sensor sample.
    pub fn rt_control_event<Sn: Sensor>(
        &mut self,
        sensor: &mut Sn,
        low_pass: &mut i32,
        now: u32,
    ) -> (TimerResult, Option<RtLog>) {
        debug_assert_eq!(self.mode, Mode::RealTime);

        // 1. Sense.
        let mut log = None;
        if self.rt.cycle_count == 0 {
            let sample = sensor.read();
            *low_pass = (*low_pass + sample) / 2;
            let target = low_pass.saturating_mul(self.rt.input_factor);
            self.rt.target_speed = clamp_sym_i32(target, self.rt.max_freq as i32);
            log = Some(RtLog {
                pos: self.rt.count,
                error: *low_pass,
            });
        }

        // 2. Position guard: tighten target_speed so the trapezoid can
        // always stop exactly at the soft limit.
        let d_min = (self.rt.count - (self.rt.min_pos + 1)).max(0) as u32;
        let d_max = ((self.rt.max_pos - 1) - self.rt.count).max(0) as u32;
        let steps_to_stop = ((self.rt.max_freq as u64 * self.rt.max_freq as u64)
            / (2 * self.rt.max_acc.max(1) as u64)) as u32
            + 2 * self.rt.max_freq / self.rt.control_freq.max(1);

        let mut lower = -(self.rt.max_freq as i32);
        let mut upper = self.rt.max_freq as i32;
        if d_min <= steps_to_stop {
            lower = -(isqrt(self.rt.max_acc.saturating_mul(d_min)) as i32);
        }
        if d_max <= steps_to_stop {
            upper = isqrt(self.rt.max_acc.saturating_mul(d_max)) as i32;
        }
        self.rt.target_speed = clamp_i32(self.rt.target_speed, lower, upper);

        // 3. Slowdown stage.
        if self.rt.slowdown {
            if self.rt.freq_limiter < self.rt.max_delta_freq {
                return (self.end_realtime_mode(), log);
            }
            self.rt.freq_limiter -= self.rt.max_delta_freq;
            self.rt.target_speed = clamp_sym_i32(self.rt.target_speed, self.rt.freq_limiter as i32);
        }

        // 4. Acceleration limiting.
        let delta = self.rt.target_speed - self.rt.current_speed;
        self.rt.current_speed += clamp_sym_i32(delta, self.rt.max_delta_freq as i32);

        // 5. Dead-band.
        if self.rt.current_speed.unsigned_abs() < self.rt.min_freq {
            self.rt.current_speed = 0;
        }

        // 6. Period derivation.
        self.rt.current_period = if self.rt.current_speed != 0 {
            super::types::CLOCK_HZ / self.rt.current_speed.unsigned_abs()
        } else {
            0
        };

        // 7. Direction edge.
        let new_dir = self.rt.current_speed < 0;
        if new_dir != self.rt.current_dir {
            critical_section::with(|_| {
                self.write_dir(new_dir);
            });
            self.rt.current_dir = new_dir;
        }

        // 8. Input-cycle counter.
        let cycle = self.rt.input_cycle.max(1);
        self.rt.cycle_count = (self.rt.cycle_count + 1) % cycle;

        (TimerResult::RescheduleAt(now.wrapping_add(self.rt.control_period)), log)
    }

    /// The independent step timer (§4.D). Fires at `last_step +
    /// current_period`; when `current_period == 0` (no target speed) it
    /// idles at `control_period` rather than busy-waiting.
    pub fn rt_step_event(&mut self, now: u32) -> TimerResult {
        let period = self.rt.current_period;
        if period == 0 {
            self.rt.last_step = now;
            return TimerResult::RescheduleAt(now.wrapping_add(self.rt.control_period.max(1)));
        }

        self.pulse_step(true);
        if self.rt.current_dir {
            self.rt.count -= 1;
        } else {
            self.rt.count += 1;
        }
        self.pulse_step(false);

        self.rt.last_step = now;
        TimerResult::RescheduleAt(now.wrapping_add(period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::gpio::Sensor;
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

    struct SaturatedHigh;
    impl Sensor for SaturatedHigh {
        fn init(&mut self) {}
        fn read(&mut self) -> i32 {
            2047
        }
    }

    fn rt_stepper() -> Stepper<FakePin, FakePin, 0> {
        let mut s = Stepper::new(0, FakePin { high: false }, FakePin { high: false }, 100, false);
        s.configure_rt(RtModeConfig {
            control_freq: 1000,
            input_cycle: 10,
            input_factor: 1,
            max_freq: 500,
            max_acc: 10_000,
        });
        s.rt.min_pos = -100;
        s.rt.max_pos = 100;
        s.mode = Mode::RealTime;
        s
    }

    #[test]
    fn saturated_sensor_asymptotes_to_one_below_max_pos() {
        let mut s = rt_stepper();
        let mut sensor = SaturatedHigh;
        let mut low_pass = 0;

        // Drive the two independent timers exactly like a real scheduler
        // would: whichever deadline is earlier fires next.
        let mut control_at = 0u32;
        let mut step_at = 0u32;
        for _ in 0..500_000 {
            if control_at <= step_at {
                match s.rt_control_event(&mut sensor, &mut low_pass, control_at).0 {
                    TimerResult::RescheduleAt(t) => control_at = t,
                    TimerResult::Done => break,
                }
            } else {
                match s.rt_step_event(step_at) {
                    TimerResult::RescheduleAt(t) => step_at = t,
                    TimerResult::Done => break,
                }
            }
            if s.rt.count == 99 && s.rt.current_speed == 0 {
                break;
            }
        }

        assert_eq!(s.rt.count, 99);
        assert_eq!(s.rt.current_speed, 0);
    }

    #[test]
    fn acceleration_never_exceeds_max_delta_freq() {
        let mut s = rt_stepper();
        let mut sensor = SaturatedHigh;
        let mut low_pass = 0;
        let mut now = 0u32;
        let mut prev = 0i32;

        for _ in 0..50 {
            s.rt_control_event(&mut sensor, &mut low_pass, now);
            now = now.wrapping_add(s.rt.control_period);
            let delta = (s.rt.current_speed - prev).unsigned_abs();
            assert!(delta <= s.rt.max_delta_freq);
            prev = s.rt.current_speed;
        }
    }

    #[test]
    fn dead_band_masks_sub_threshold_speed() {
        let mut s = rt_stepper();
        let mut sensor = SaturatedHigh;
        let mut low_pass = 0;
        // Skip the sense step (cycle_count != 0) so target_speed keeps the
        // value set below; tighten max_delta_freq so one tick's
        // acceleration step can't clear min_freq.
        s.rt.cycle_count = 1;
        s.rt.max_delta_freq = 10;
        s.rt.min_freq = 100;
        s.rt.target_speed = 40;

        s.rt_control_event(&mut sensor, &mut low_pass, 0);

        assert_eq!(s.rt.current_speed, 0);
    }

    #[test]
    fn rt_log_emitted_once_per_input_cycle() {
        let mut s = rt_stepper();
        let mut sensor = SaturatedHigh;
        let mut low_pass = 0;
        let mut now = 0u32;

        let mut logged_ticks = 0;
        for tick in 0..30 {
            let (_, log) = s.rt_control_event(&mut sensor, &mut low_pass, now);
            now = now.wrapping_add(s.rt.control_period);
            if tick % s.rt.input_cycle as i32 == 0 {
                let log = log.expect("sense tick must carry a log");
                assert_eq!(log.pos, s.rt.count);
                assert_eq!(log.error, low_pass);
            } else {
                assert!(log.is_none());
                continue;
            }
            logged_ticks += 1;
        }
        assert_eq!(logged_ticks, 3);
    }

    #[test]
    fn idle_period_reschedules_at_control_period() {
        let mut s = rt_stepper();
        s.rt.current_period = 0;
        let r = s.rt_step_event(1000);
        assert_eq!(r, TimerResult::RescheduleAt(1000 + s.rt.control_period));
    }

    #[test]
    fn active_period_steps_and_reschedules() {
        let mut s = rt_stepper();
        s.rt.current_period = 2000;
        s.rt.current_dir = false;
        let r = s.rt_step_event(1000);
        assert_eq!(r, TimerResult::RescheduleAt(3000));
        assert_eq!(s.rt.count, 1);
    }
}
