//! # Stepper Motor Control
//!
//! Owns a [`mcu_drivers::stepper::StepperRegistry`] and drives it from the
//! same embassy task model as [`crate::heater::heater_task`]: a dispatch
//! loop bounded by `embassy_time::Timer`, polled instead of interrupt-bound.
//!
//! ## Tick domain
//!
//! The engine's absolute-tick arithmetic (`queue_step`/`step_event`/...)
//! assumes 1 tick = 1 / [`mcu_drivers::stepper::CLOCK_HZ`] seconds. This
//! task derives `now` from `embassy_time::Instant` rather than a hardware
//! timer's free-running counter, so its step timing is bounded by the
//! executor's scheduling latency rather than an interrupt. The `rtic_main`
//! entry point binds the same registry to a real TIM2 ISR for the
//! cycle-accurate case; this task is the portable fallback.
//!
//! ## Command intake
//!
//! [`proto_bridge`](crate::proto_bridge) (or any other task) submits
//! [`StepperCommand`]s through [`STEPPER_COMMANDS`] rather than touching the
//! registry directly — the registry is owned by this task alone, so no
//! cross-task mutex is needed on the hot dispatch path.

use embassy_stm32::gpio::Output;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};

use mcu_drivers::stepper::{Fault, Mode, RtArm, RtLog, Sensor, StepperConfig, StepperRegistry, TimerResult};

use crate::safety::SafetyMonitor;

/// Board motor count; adjust alongside `boards::*::pins::BoardPins`.
pub const STEPPER_COUNT: usize = 4;
/// Shared move-pool capacity across all motors on the board.
pub const MOVE_POOL_CAP: usize = 64;
/// `STEP_DELAY` of 0: this board's step driver latches on a single edge, no
/// separate unstep pulse required (see `Stepper`'s const generic doc).
const STEP_DELAY: u32 = 0;

const TICKS_PER_US: u32 = mcu_drivers::stepper::CLOCK_HZ / 1_000_000;

pub type StepOutput = Output<'static>;
pub type Registry = StepperRegistry<StepOutput, StepOutput, STEP_DELAY, STEPPER_COUNT, MOVE_POOL_CAP>;

/// Host-protocol commands that affect a motor, decoupled from whatever
/// transport decodes them (`proto_bridge`, a test harness, ...).
#[derive(Debug, Clone, Copy)]
pub enum StepperCommand {
    QueueStep { oid: u8, interval: u32, count: u16, add: i16 },
    SetNextDir { oid: u8, dir: bool },
    ResetStepClock { oid: u8, clock: u32 },
    Stop { oid: u8 },
    SetRealtimeMode { oid: u8, clock: u32, min_pos: i32, max_pos: i32 },
    SetHostMode { oid: u8, clock: u32 },
}

/// Depth matches the host protocol's typical burst of queued moves between
/// acks; generous enough that a full dispatch-loop tick never blocks a
/// sender.
pub static STEPPER_COMMANDS: Channel<CriticalSectionRawMutex, StepperCommand, 32> = Channel::new();

/// Per-oid absolute-tick deadlines the dispatch loop multiplexes. Seeded
/// and advanced entirely from the `TimerResult`/`RtArm` values the engine
/// itself returns — never recomputed by this task.
#[derive(Clone, Copy, Default)]
struct Schedule {
    step_at: Option<u32>,
    rt_control_at: Option<u32>,
    rt_step_at: Option<u32>,
    mode_toggle_at: Option<u32>,
}

fn now_ticks() -> u32 {
    (Instant::now().as_micros() as u32).wrapping_mul(TICKS_PER_US)
}

async fn sleep_until(deadline: u32) {
    let remaining_ticks = deadline.wrapping_sub(now_ticks());
    if (remaining_ticks as i32) <= 0 {
        return;
    }
    Timer::after(Duration::from_micros((remaining_ticks / TICKS_PER_US) as u64)).await;
}

fn earliest(sched: &[Schedule; STEPPER_COUNT], now: u32) -> Option<u32> {
    sched
        .iter()
        .flat_map(|s| [s.step_at, s.rt_control_at, s.rt_step_at, s.mode_toggle_at])
        .flatten()
        .min_by_key(|t| t.wrapping_sub(now))
}

fn report_fault(oid: u8, err: Fault) {
    defmt::error!("stepper {}: fault: {}", oid, defmt::Display2Format(&err));
}

/// `stepper_rt_log oid=%c pos=%i error=%i` (§6): emitted once per
/// `input_cycle` control periods, carrying the real-time step counter and
/// the filtered sensor value that drove this tick's target speed.
fn report_rt_log(oid: u8, log: RtLog) {
    defmt::info!("stepper_rt_log oid={} pos={} error={}", oid, log.pos, log.error);
}

/// The stepper dispatch task. `sensor` feeds every motor's real-time control
/// loop (§4.C); it is a process-wide resource, not per-motor, matching the
/// bus-serialized framing in the concurrency model.
#[embassy_executor::task]
pub async fn stepper_task<Sn: Sensor + 'static>(
    mut registry: Registry,
    mut sensor: Sn,
    safety: &'static Mutex<CriticalSectionRawMutex, SafetyMonitor<'static, 4>>,
) {
    defmt::info!("Stepper task started: {} motors, pool capacity {}", STEPPER_COUNT, MOVE_POOL_CAP);

    sensor.init();
    let mut sched = [Schedule::default(); STEPPER_COUNT];
    let mut halted = false;

    loop {
        if safety.lock().await.is_emergency_stop_active() {
            if !halted {
                defmt::warn!("stepper: E-STOP active, parking all motors");
                registry.shutdown();
                sched = [Schedule::default(); STEPPER_COUNT];
                halted = true;
            }
            Timer::after(Duration::from_millis(50)).await;
            continue;
        }
        halted = false;

        while let Ok(cmd) = STEPPER_COMMANDS.try_receive() {
            apply_command(&mut registry, &mut sched, cmd);
        }

        let now = now_ticks();
        for oid in 0..STEPPER_COUNT as u8 {
            dispatch_due(&mut registry, &mut sched, &mut sensor, oid, now);
        }

        match earliest(&sched, now_ticks()) {
            Some(deadline) => sleep_until(deadline).await,
            None => Timer::after(Duration::from_millis(1)).await,
        }
    }
}

fn apply_command(registry: &mut Registry, sched: &mut [Schedule; STEPPER_COUNT], cmd: StepperCommand) {
    let result = match cmd {
        StepperCommand::QueueStep { oid, interval, count, add } => {
            let Some((stepper, pool)) = registry.stepper_and_pool(oid) else { return };
            stepper.queue_step(pool, interval, count, add).map(Some)
        }
        StepperCommand::SetNextDir { oid, dir } => {
            let Some(stepper) = registry.get_mut(oid) else { return };
            stepper.set_next_step_dir(dir);
            Ok(None)
        }
        StepperCommand::ResetStepClock { oid, clock } => {
            let Some(stepper) = registry.get_mut(oid) else { return };
            stepper.reset_step_clock(clock).map(|_| None)
        }
        StepperCommand::Stop { oid } => {
            let Some((stepper, pool)) = registry.stepper_and_pool(oid) else { return };
            stepper.stop(pool);
            sched[oid as usize] = Schedule::default();
            return;
        }
        StepperCommand::SetRealtimeMode { oid, clock, min_pos, max_pos } => {
            let Some(stepper) = registry.get_mut(oid) else { return };
            let r = stepper.set_realtime_mode(clock, min_pos, max_pos);
            if r.is_ok() {
                sched[oid as usize].mode_toggle_at = stepper.transition_deadline();
            }
            r.map(|_| None)
        }
        StepperCommand::SetHostMode { oid, clock } => {
            let Some(stepper) = registry.get_mut(oid) else { return };
            let r = stepper.set_host_mode(clock, now_ticks());
            if r.is_ok() {
                sched[oid as usize].mode_toggle_at = stepper.transition_deadline();
            }
            r.map(|_| None)
        }
    };

    match result {
        Ok(Some(TimerResult::RescheduleAt(t))) => sched[oid_of(cmd) as usize].step_at = Some(t),
        Ok(Some(TimerResult::Done)) => sched[oid_of(cmd) as usize].step_at = None,
        Ok(None) => {}
        Err(e) => report_fault(oid_of(cmd), e),
    }
}

fn oid_of(cmd: StepperCommand) -> u8 {
    match cmd {
        StepperCommand::QueueStep { oid, .. }
        | StepperCommand::SetNextDir { oid, .. }
        | StepperCommand::ResetStepClock { oid, .. }
        | StepperCommand::Stop { oid }
        | StepperCommand::SetRealtimeMode { oid, .. }
        | StepperCommand::SetHostMode { oid, .. } => oid,
    }
}

fn dispatch_due<Sn: Sensor>(
    registry: &mut Registry,
    sched: &mut [Schedule; STEPPER_COUNT],
    sensor: &mut Sn,
    oid: u8,
    now: u32,
) {
    let slot = &mut sched[oid as usize];

    if let Some(at) = slot.mode_toggle_at {
        if !(at.wrapping_sub(now) as i32 > 0) {
            let Some(stepper) = registry.get_mut(oid) else { return };
            stepper.toggle_mode_event();
            slot.mode_toggle_at = None;
            if let Some(RtArm { control_at, step_at }) = stepper.toggle_mode_task(now) {
                slot.rt_control_at = Some(control_at);
                slot.rt_step_at = Some(step_at);
            }
        }
    }

    let Some(stepper) = registry.get(oid) else { return };
    let mode = stepper.mode();

    match mode {
        Mode::Host => {
            if let Some(at) = sched[oid as usize].step_at {
                if !(at.wrapping_sub(now) as i32 > 0) {
                    let Some((stepper, pool)) = registry.stepper_and_pool(oid) else { return };
                    match stepper.step_event(pool, now) {
                        Ok(TimerResult::RescheduleAt(t)) => sched[oid as usize].step_at = Some(t),
                        Ok(TimerResult::Done) => sched[oid as usize].step_at = None,
                        Err(e) => {
                            sched[oid as usize].step_at = None;
                            report_fault(oid, e);
                        }
                    }
                }
            }
        }
        Mode::RealTime => {
            if let Some(at) = sched[oid as usize].rt_control_at {
                if !(at.wrapping_sub(now) as i32 > 0) {
                    let Some((stepper, low_pass)) = registry.stepper_and_low_pass(oid) else { return };
                    let (result, log) = stepper.rt_control_event(sensor, low_pass, now);
                    if let Some(log) = log {
                        report_rt_log(oid, log);
                    }
                    match result {
                        TimerResult::RescheduleAt(t) => sched[oid as usize].rt_control_at = Some(t),
                        TimerResult::Done => {
                            sched[oid as usize].rt_control_at = None;
                            sched[oid as usize].rt_step_at = None;
                        }
                    }
                }
            }
            if let Some(at) = sched[oid as usize].rt_step_at {
                if !(at.wrapping_sub(now) as i32 > 0) {
                    let Some(stepper) = registry.get_mut(oid) else { return };
                    match stepper.rt_step_event(now) {
                        TimerResult::RescheduleAt(t) => sched[oid as usize].rt_step_at = Some(t),
                        TimerResult::Done => sched[oid as usize].rt_step_at = None,
                    }
                }
            }
        }
    }
}

/// Board bring-up helper: allocates every configured motor in `Host` mode.
/// Called once from `embassy_main` before the registry is handed to
/// `stepper_task`.
pub fn configure_motors(
    registry: &mut Registry,
    lines: [(StepOutput, StepOutput); STEPPER_COUNT],
    cfg: StepperConfig,
) -> Result<(), Fault> {
    for (step, dir) in lines {
        registry.config_stepper(step, dir, cfg)?;
    }
    Ok(())
}
