//! Host-queued mode: `queue_step`/`set_next_step_dir`/`reset_step_clock`/
//! `stop`/`get_position`, and the step timer callback that drains the move
//! queue.

use super::error::Fault;
use super::gpio::{DirLine, StepLine};
use super::math::timer_is_before;
use super::pool::MovePool;
use super::state::Stepper;
use super::types::{Move, TimerResult, POSITION_BIAS};

impl<S: StepLine, D: DirLine, const STEP_DELAY: u32> Stepper<S, D, STEP_DELAY> {
    /// Append a move to this motor's queue. If the engine is idle, loads
    /// and arms it immediately; otherwise links it to the tail.
    pub fn queue_step<const CAP: usize>(
        &mut self,
        pool: &mut MovePool<CAP>,
        interval: u32,
        count: u16,
        add: i16,
    ) -> Result<TimerResult, Fault> {
        if count == 0 {
            return Err(Fault::InvalidCount);
        }

        // Accumulate the direction/relaxation flags locally first — same
        // as the original's local `flags` — and only commit them to `self`
        // on a branch that actually keeps the move. The physical direction
        // line only flips in `load_next`, so a move dropped below must
        // leave `last_dir`/`no_next_check`/`last_reset` exactly as they
        // were, or the next real move would see a direction change that
        // never reached the hardware (§3 invariant 3).
        let mut last_dir = self.last_dir;
        let mut dir_toggle = false;
        if last_dir != self.next_dir {
            last_dir = !last_dir;
            dir_toggle = true;
        }
        let no_next_check = count == 1 && (dir_toggle || self.last_reset);

        let mv = Move {
            interval,
            add,
            count,
            dir_toggle,
        };

        let idx = pool.alloc(mv).ok_or(Fault::MovePoolExhausted)?;

        if self.count != 0 {
            self.last_dir = last_dir;
            self.no_next_check = no_next_check;
            self.last_reset = false;
            self.queue.push_back(pool, idx);
            return Ok(TimerResult::RescheduleAt(self.next_step_time));
        }
        if self.need_reset {
            // Moves submitted before the host has reset the clock are
            // silently dropped, matching the fixed startup sequencing
            // the host protocol requires.
            pool.free(idx);
            return Ok(TimerResult::Done);
        }
        self.last_dir = last_dir;
        self.no_next_check = no_next_check;
        self.last_reset = false;
        self.queue.push_back(pool, idx);
        self.load_next(pool, self.next_step_time.wrapping_add(interval))
    }

    pub fn set_next_step_dir(&mut self, dir: bool) {
        self.next_dir = dir;
    }

    pub fn reset_step_clock(&mut self, clock: u32) -> Result<(), Fault> {
        if self.count != 0 {
            return Err(Fault::ResetWhileActive);
        }
        self.next_step_time = clock;
        self.need_reset = false;
        self.last_reset = true;
        Ok(())
    }

    /// Cancels the active move, flushes the queue, and parks the outputs
    /// in a defined state. `position` is updated to reflect committed
    /// steps only; anything still queued is discarded.
    pub fn stop<const CAP: usize>(&mut self, pool: &mut MovePool<CAP>) {
        let committed = self.get_position_raw();
        self.queue.clear(pool);
        self.next_step_time = 0;
        self.position = -committed;
        self.count = 0;
        self.need_reset = true;
        self.write_dir(false);
        self.pulse_step(self.invert_step);
    }

    /// `committed_steps − position_bias`, as reported to the host.
    pub fn get_position(&self) -> i32 {
        self.get_position_raw() - POSITION_BIAS
    }

    fn get_position_raw(&self) -> i32 {
        let pending = if STEP_DELAY == 0 {
            self.count as i32
        } else {
            (self.count / 2) as i32
        };
        let raw = self.position.wrapping_sub(pending);
        if raw < 0 {
            -raw
        } else {
            raw
        }
    }

    /// The step timer callback. Dispatches on `STEP_DELAY` at compile
    /// time; both bodies are generic over the same `Stepper`, so there is
    /// exactly one call site for the board's timer ISR to wire up.
    pub fn step_event<const CAP: usize>(
        &mut self,
        pool: &mut MovePool<CAP>,
        now: u32,
    ) -> Result<TimerResult, Fault> {
        if STEP_DELAY == 0 {
            self.step_event_no_delay(pool)
        } else {
            self.step_event_delay(pool, now)
        }
    }

    fn step_event_no_delay<const CAP: usize>(
        &mut self,
        pool: &mut MovePool<CAP>,
    ) -> Result<TimerResult, Fault> {
        self.pulse_step(true);
        self.count -= 1;
        if self.count != 0 {
            self.next_step_time = self.next_step_time.wrapping_add(self.interval);
            self.interval = (self.interval as i64 + self.add as i64) as u32;
            self.pulse_step(false);
            return Ok(TimerResult::RescheduleAt(self.next_step_time));
        }
        let ret = self.load_next(pool, self.next_step_time);
        self.pulse_step(false);
        ret
    }

    fn step_event_delay<const CAP: usize>(
        &mut self,
        pool: &mut MovePool<CAP>,
        now: u32,
    ) -> Result<TimerResult, Fault> {
        let step_edge = self.count % 2 == 0;
        self.pulse_step(step_edge);
        let min_next_time = now.wrapping_add(STEP_DELAY);
        self.count -= 1;

        if self.count & 1 != 0 {
            // Just fired the step edge; the matching unstep is due next.
            return Ok(TimerResult::RescheduleAt(min_next_time));
        }
        if self.count != 0 {
            self.next_step_time = self.next_step_time.wrapping_add(self.interval);
            self.interval = (self.interval as i64 + self.add as i64) as u32;
            if timer_is_before(self.next_step_time, min_next_time) {
                return Ok(TimerResult::RescheduleAt(min_next_time));
            }
            return Ok(TimerResult::RescheduleAt(self.next_step_time));
        }
        self.load_next(pool, min_next_time)
    }

    /// Loads the next queued move, or detects a queue underrun / arms
    /// nothing if the queue is empty. `min_next_time` is the earliest
    /// time the caller can still schedule a step at (used only by the
    /// delay-mode path to detect a lagging reschedule).
    pub(super) fn load_next<const CAP: usize>(
        &mut self,
        pool: &mut MovePool<CAP>,
        min_next_time: u32,
    ) -> Result<TimerResult, Fault> {
        let mv = match self.queue.pop_front(pool) {
            Some(mv) => mv,
            None => {
                let would_be_interval = (self.interval as i64 - self.add as i64) as u32;
                if would_be_interval < self.min_stop_interval && !self.no_next_check {
                    return Err(Fault::NoNextStep);
                }
                self.count = 0;
                return Ok(TimerResult::Done);
            }
        };

        self.next_step_time = self.next_step_time.wrapping_add(mv.interval);
        self.add = mv.add;
        self.interval = (mv.interval as i64 + mv.add as i64) as u32;

        let waketime = if STEP_DELAY == 0 {
            self.count = mv.count as u32;
            self.next_step_time
        } else {
            self.count = mv.count as u32 * 2;
            if timer_is_before(self.next_step_time, min_next_time) {
                if (self.next_step_time.wrapping_sub(min_next_time) as i32) < -(self.too_far_in_past_margin() as i32) {
                    return Err(Fault::TooFarInPast);
                }
                min_next_time
            } else {
                self.next_step_time
            }
        };

        if mv.dir_toggle {
            self.position = -self.position + mv.count as i32;
            self.write_dir(self.last_dir);
        } else {
            self.position += mv.count as i32;
        }

        Ok(TimerResult::RescheduleAt(waketime))
    }

    fn too_far_in_past_margin(&self) -> u32 {
        self.min_stop_interval.max(1)
    }
}
