//! End-to-end lifecycle scenarios for the stepper core, driven entirely
//! through `StepperRegistry`'s public API the way a firmware dispatch loop
//! would (see `klipper-mcu-firmware::stepper::dispatch_due`), rather than
//! through any one module's internals directly.

use mcu_drivers::stepper::{DirLine, Fault, Mode, RtArm, RtModeConfig, Sensor, StepLine, StepperConfig, StepperRegistry, TimerResult};

#[derive(Default)]
struct FakeLine {
    high: bool,
}
impl StepLine for FakeLine {
    fn set_high(&mut self) {
        self.high = true;
    }
    fn set_low(&mut self) {
        self.high = false;
    }
}
impl DirLine for FakeLine {
    fn set_high(&mut self) {
        self.high = true;
    }
    fn set_low(&mut self) {
        self.high = false;
    }
}

struct FixedSensor(i32);
impl Sensor for FixedSensor {
    fn init(&mut self) {}
    fn read(&mut self) -> i32 {
        self.0
    }
}

type Reg = StepperRegistry<FakeLine, FakeLine, 0, 2, 16>;

fn rt_cfg() -> RtModeConfig {
    RtModeConfig {
        control_freq: 1000,
        input_cycle: 10,
        input_factor: 1,
        max_freq: 500,
        max_acc: 10_000,
    }
}

/// Runs the two independent real-time timers the way a scheduler would:
/// whichever deadline is earlier fires next. Stops as soon as the motor
/// returns to `Mode::Host` (the slowdown ramp completed) or `max_ticks`
/// control events have fired, whichever comes first.
fn drive_realtime<Sn: Sensor>(
    reg: &mut Reg,
    oid: u8,
    sensor: &mut Sn,
    mut control_at: u32,
    mut step_at: u32,
    max_ticks: usize,
) {
    for _ in 0..max_ticks {
        if reg.get(oid).unwrap().mode() != Mode::RealTime {
            return;
        }
        if control_at <= step_at {
            let (stepper, low_pass) = reg.stepper_and_low_pass(oid).unwrap();
            match stepper.rt_control_event(sensor, low_pass, control_at).0 {
                TimerResult::RescheduleAt(t) => control_at = t,
                TimerResult::Done => return,
            }
        } else {
            let stepper = reg.get_mut(oid).unwrap();
            match stepper.rt_step_event(step_at) {
                TimerResult::RescheduleAt(t) => step_at = t,
                TimerResult::Done => return,
            }
        }
    }
}

/// Scenario: three-pulse constant rate, end to end through the registry.
#[test]
fn three_pulse_constant_rate_through_registry() {
    let mut reg: Reg = StepperRegistry::new();
    let oid = reg
        .config_stepper(FakeLine::default(), FakeLine::default(), StepperConfig { min_stop_interval: 100, invert_step: false })
        .unwrap();

    reg.get_mut(oid).unwrap().reset_step_clock(1000).unwrap();
    let initial_pos = reg.get(oid).unwrap().get_position();

    let (stepper, pool) = reg.stepper_and_pool(oid).unwrap();
    let r = stepper.queue_step(pool, 500, 3, 0).unwrap();
    assert_eq!(r, TimerResult::RescheduleAt(1500));

    for (now, expect) in [(1500, TimerResult::RescheduleAt(2000)), (2000, TimerResult::RescheduleAt(2500)), (2500, TimerResult::Done)] {
        let (stepper, pool) = reg.stepper_and_pool(oid).unwrap();
        assert_eq!(stepper.step_event(pool, now).unwrap(), expect);
    }

    assert_eq!(reg.get(oid).unwrap().get_position(), initial_pos + 3);
}

/// Scenario: underrun. A burst with no follow-up move faults once drained.
#[test]
fn underrun_shuts_down_with_no_next_step() {
    let mut reg: Reg = StepperRegistry::new();
    let oid = reg
        .config_stepper(FakeLine::default(), FakeLine::default(), StepperConfig { min_stop_interval: 200, invert_step: false })
        .unwrap();
    reg.get_mut(oid).unwrap().reset_step_clock(0).unwrap();

    let (stepper, pool) = reg.stepper_and_pool(oid).unwrap();
    let mut now = stepper.queue_step(pool, 100, 5, 0).unwrap();

    let err = loop {
        let TimerResult::RescheduleAt(at) = now else { panic!("expected a reschedule before the fault") };
        let (stepper, pool) = reg.stepper_and_pool(oid).unwrap();
        match stepper.step_event(pool, at) {
            Ok(r) => now = r,
            Err(e) => break e,
        }
    };
    assert_eq!(err, Fault::NoNextStep);
    assert_eq!(err.message(), "No next step");
}

/// Full host -> realtime -> slowdown -> host round trip, including the
/// deferred slowdown honored by `enter_realtime` (§4.E step 6) and the
/// registry's shared low-pass carrier.
#[test]
fn host_to_realtime_and_back_round_trip() {
    let mut reg: Reg = StepperRegistry::new();
    let oid = reg
        .config_stepper(FakeLine::default(), FakeLine::default(), StepperConfig { min_stop_interval: 100, invert_step: false })
        .unwrap();
    reg.get_mut(oid).unwrap().reset_step_clock(0).unwrap();
    reg.get_mut(oid).unwrap().configure_rt(rt_cfg());

    // Arm and reconcile the host -> realtime transition.
    reg.get_mut(oid).unwrap().set_realtime_mode(0, -100, 100).unwrap();
    reg.get_mut(oid).unwrap().toggle_mode_event();
    reg.get_mut(oid).unwrap().toggle_mode_task(0).unwrap();
    assert_eq!(reg.get(oid).unwrap().mode(), Mode::RealTime);

    // Run the loop under a saturated-high sensor until it asymptotes near
    // +max_pos (scenario 5, "RtMode envelope").
    let mut sensor = FixedSensor(2047);
    drive_realtime(&mut reg, oid, &mut sensor, 0, 0, 500_000);
    assert_eq!(reg.get(oid).unwrap().mode(), Mode::RealTime, "sensor never asked to stop");

    // Request a return to host mode (scenario 6, "Slowdown races deadline"),
    // reconcile the `ModeTransitionTimer` firing, then keep driving the
    // control loop until the ramp completes.
    reg.get_mut(oid).unwrap().set_host_mode(50_000_000, 0).unwrap();
    reg.get_mut(oid).unwrap().toggle_mode_event();
    reg.get_mut(oid).unwrap().toggle_mode_task(0);

    drive_realtime(&mut reg, oid, &mut sensor, 0, 0, 5_000_000);

    assert_eq!(reg.get(oid).unwrap().mode(), Mode::Host, "slowdown never completed");
    assert!(!reg.get(oid).unwrap().is_transition_armed());
    // `end_realtime_mode` re-encodes the real-time step counter into the
    // host-mode position accumulator (§4.E exit seam).
    assert_eq!(reg.get(oid).unwrap().get_position(), 99);
}

/// Registry-wide emergency stop parks every motor regardless of which
/// mode it was in, and leaves the queue flushed.
#[test]
fn shutdown_parks_motors_in_every_mode() {
    let mut reg: Reg = StepperRegistry::new();
    let host_oid = reg
        .config_stepper(FakeLine::default(), FakeLine::default(), StepperConfig { min_stop_interval: 100, invert_step: false })
        .unwrap();
    let rt_oid = reg
        .config_stepper(FakeLine::default(), FakeLine::default(), StepperConfig { min_stop_interval: 100, invert_step: false })
        .unwrap();

    reg.get_mut(host_oid).unwrap().reset_step_clock(0).unwrap();
    let (stepper, pool) = reg.stepper_and_pool(host_oid).unwrap();
    stepper.queue_step(pool, 500, 3, 0).unwrap();

    reg.get_mut(rt_oid).unwrap().configure_rt(rt_cfg());
    reg.get_mut(rt_oid).unwrap().set_realtime_mode(0, -100, 100).unwrap();
    reg.get_mut(rt_oid).unwrap().toggle_mode_event();
    reg.get_mut(rt_oid).unwrap().toggle_mode_task(0);
    assert_eq!(reg.get(rt_oid).unwrap().mode(), Mode::RealTime);

    reg.shutdown();

    assert_eq!(reg.get(host_oid).unwrap().mode(), Mode::Host);
    assert_eq!(reg.get(rt_oid).unwrap().mode(), Mode::Host);
    assert!(!reg.get(host_oid).unwrap().is_transition_armed());
    assert!(!reg.get(rt_oid).unwrap().is_transition_armed());
}
