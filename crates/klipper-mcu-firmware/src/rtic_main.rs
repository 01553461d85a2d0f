//! # RTIC-based Firmware Entry Point
//!
//! This module provides a complete firmware implementation using the RTIC (Real-Time
//! Interrupt-driven Concurrency) framework as an alternative to the default Embassy-based
//! async executor. It demonstrates a hardware-task-driven architecture where peripherals
//! and interrupts directly trigger firmware logic.
//!
//! It drives the same [`mcu_drivers::stepper::StepperRegistry`] the embassy task in
//! [`crate::stepper`] does, but splits its two scheduling tiers across real RTIC
//! priorities instead of polling one dispatch loop:
//!
//! - `stepper_isr` (TIM2, priority 4): the timer-context tier — host-mode
//!   `step_event` and real-time `rt_step_event`. Both are cycle-sensitive, so
//!   both share the highest-priority hardware task and reprogram TIM2 to the
//!   next of either kind of deadline.
//! - `control_task` (software task, priority 2): the cooperative tier —
//!   `rt_control_event` (sensor read, filter, kinematic guard) and
//!   `toggle_mode_event`/`toggle_mode_task`. Neither touches the step line
//!   directly, so neither needs to preempt `stepper_isr`.
//! - `usart_task` (priority 2) and `heater_task`/`adc_task` (priority 1) keep
//!   this file's original structure.

#![allow(unused_imports)]

#[rtic::app(device = stm32f4xx_hal::pac, dispatchers = [EXTI0, EXTI1, EXTI2, EXTI3])]
mod app {
    use stm32f4xx_hal::{
        gpio::{gpiod, gpioe, ErasedPin, Output, PushPull, Speed},
        pac::{TIM2, USART1},
        prelude::*,
        serial::{Config as SerialConfig, Event as SerialEvent, Rx, Serial, Tx},
        timer::{CounterUs, Event as TimerEvent},
    };
    use rtic::Mutex;
    use rtic_monotonics::{systick::*, Monotonic};

    // Workspace crates
    use crate::heater::{HeaterSharedState, PidController};
    use mcu_drivers::stepper::{
        Fault, Mode, RtArm, RtLog, Sensor, StepperConfig, StepperRegistry, TimerResult, CLOCK_HZ,
    };

    /// This entry point brings up two axes; `embassy_main` is the full
    /// four-axis path. Adjust alongside the pin wiring in `init` below if
    /// more motors are added.
    const STEPPER_COUNT: usize = 2;
    const MOVE_POOL_CAP: usize = 16;
    /// This driver latches on a single edge; see `Stepper`'s `STEP_DELAY`
    /// const generic doc for the delay-mode alternative.
    const STEP_DELAY: u32 = 0;
    const TICKS_PER_US: u32 = CLOCK_HZ / 1_000_000;

    type StepOutput = ErasedPin<Output<PushPull>>;
    type DirOutput = ErasedPin<Output<PushPull>>;
    type Registry = StepperRegistry<StepOutput, DirOutput, STEP_DELAY, STEPPER_COUNT, MOVE_POOL_CAP>;
    type LedPin = gpiod::PD12<Output<PushPull>>;

    // `mcu_drivers::legacy_pipeline::StepperController` is the bitmask multi-axis
    // planner output stage and is unrelated to the host-queued/real-time
    // single-motor registry this file owns directly as an RTIC `#[local]`
    // resource; no proxy layer is needed between them.

    /// Placeholder analog front end until this board's two-wire bus is
    /// wired up; reads a constant mid-scale sample so the real-time control
    /// loop (sensor read, low-pass, kinematic guard, ramp) runs its full
    /// step sequence under test without live hardware.
    #[derive(Default)]
    struct NullSensor;

    impl Sensor for NullSensor {
        fn init(&mut self) {}
        fn read(&mut self) -> i32 {
            0
        }
    }

    /// Per-oid absolute-tick deadlines, same shape as the embassy dispatch
    /// loop's `Schedule` in `crate::stepper`, split here across the
    /// hardware/software task boundary instead of one loop.
    #[derive(Clone, Copy, Default)]
    struct Schedule {
        step_at: Option<u32>,
        rt_step_at: Option<u32>,
        rt_control_at: Option<u32>,
        mode_toggle_at: Option<u32>,
    }

    fn report_fault(oid: u8, err: Fault) {
        defmt::error!("stepper {}: fault: {}", oid, defmt::Display2Format(&err));
    }

    /// `stepper_rt_log oid=%c pos=%i error=%i` (§6).
    fn report_rt_log(oid: u8, log: RtLog) {
        defmt::info!("stepper_rt_log oid={} pos={} error={}", oid, log.pos, log.error);
    }

    fn control_now_ticks() -> u32 {
        let micros = Systick::now().duration_since_epoch().to_micros() as u32;
        micros.wrapping_mul(TICKS_PER_US)
    }

    /// Earliest of the two timer-context deadlines across every motor, or
    /// `None` if nothing is armed (`stepper_isr` then leaves TIM2 stopped
    /// until the next command re-arms a deadline).
    fn earliest_timer_deadline(sched: &[Schedule; STEPPER_COUNT], now: u32) -> Option<u32> {
        sched
            .iter()
            .flat_map(|s| [s.step_at, s.rt_step_at])
            .flatten()
            .min_by_key(|t| t.wrapping_sub(now))
    }

    // `registry`/`sched` are touched by three tasks at two different
    // priorities (`stepper_isr` at 4, `control_task`/`usart_task` at 2), so
    // they're `#[shared]` resources guarded by RTIC's priority-ceiling lock
    // rather than exclusively-owned `#[local]` ones.
    #[shared]
    struct Shared {
        usart_tx: Tx<USART1>,
        registry: Registry,
        sched: [Schedule; STEPPER_COUNT],
    }

    #[local]
    struct Local {
        led: LedPin,
        sensor: NullSensor,
        /// The tick `stepper_isr` is currently armed for; known exactly
        /// since it was chosen on the previous firing, so it doubles as the
        /// engine's `now` without needing a free-running hardware counter.
        armed_at: u32,
        stepper_timer: CounterUs<TIM2>,
        usart_rx: Rx<USART1>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("RTIC Init");
        let dp = cx.device;

        // Setup clocks
        let rcc = dp.RCC.constrain();
        let clocks = rcc.cfgr.use_hse(8.MHz()).sysclk(168.MHz()).freeze();

        // Setup systick monotonic timer
        let systick_mono_token = rtic_monotonics::create_systick_token!();
        Systick::start(cx.core.SYST, clocks.hclk().0, systick_mono_token);

        // Setup LED
        let gpiod = dp.GPIOD.split();
        let mut led = gpiod.pd12.into_push_pull_output();
        led.set_high();

        // Setup USART for communication
        let gpioa = dp.GPIOA.split();
        let tx_pin = gpioa.pa9.into_alternate();
        let rx_pin = gpioa.pa10.into_alternate();
        let serial_config = SerialConfig::default().baudrate(250_000.bps());
        let (usart_tx, mut usart_rx) = Serial::new(dp.USART1, (tx_pin, rx_pin), serial_config, &clocks)
            .unwrap()
            .split();
        usart_rx.listen(SerialEvent::Rxne);

        // Setup Stepper Timer (TIM2)
        let mut stepper_timer = dp.TIM2.counter_us(&clocks);
        stepper_timer.listen(TimerEvent::Update);

        // Bring up the two motors this board wires for the RTIC entry point.
        let gpioe = dp.GPIOE.split();
        let mut registry: Registry = StepperRegistry::new();
        registry
            .config_stepper(
                gpioe.pe2.into_push_pull_output().erase(),
                gpioe.pe3.into_push_pull_output().erase(),
                StepperConfig { min_stop_interval: 0, invert_step: false },
            )
            .expect("registry sized for STEPPER_COUNT motors");
        registry
            .config_stepper(
                gpioe.pe4.into_push_pull_output().erase(),
                gpioe.pe5.into_push_pull_output().erase(),
                StepperConfig { min_stop_interval: 0, invert_step: false },
            )
            .expect("registry sized for STEPPER_COUNT motors");

        // Schedule periodic software tasks
        heater_task::spawn().ok();
        adc_task::spawn().ok();
        control_task::spawn().ok();

        defmt::info!("RTIC Init complete.");

        (
            Shared {
                usart_tx,
                registry,
                sched: [Schedule::default(); STEPPER_COUNT],
            },
            Local {
                led,
                sensor: NullSensor,
                armed_at: 0,
                stepper_timer,
                usart_rx,
            },
        )
    }

    #[idle(local = [led])]
    fn idle(cx: idle::Context) -> ! {
        loop {
            cx.local.led.toggle();
            Systick::delay(500.millis()).unwrap();
        }
    }

    /// Timer-context tier: host-mode stepping and real-time stepping for
    /// every motor. Highest priority task; holds the `registry`/`sched`
    /// lock at the ceiling priority, so no other task can preempt mid-step.
    #[task(binds = TIM2, shared = [registry, sched], local = [armed_at, stepper_timer], priority = 4)]
    fn stepper_isr(mut cx: stepper_isr::Context) {
        cx.local.stepper_timer.clear_interrupt(TimerEvent::Update);

        let now = *cx.local.armed_at;

        let next = (&mut cx.shared.registry, &mut cx.shared.sched).lock(|registry, sched| {
            for oid in 0..STEPPER_COUNT as u8 {
                let slot = &mut sched[oid as usize];

                if let Some(at) = slot.step_at {
                    if !(at.wrapping_sub(now) as i32 > 0) {
                        if let Some((stepper, pool)) = registry.stepper_and_pool(oid) {
                            match stepper.step_event(pool, now) {
                                Ok(TimerResult::RescheduleAt(t)) => slot.step_at = Some(t),
                                Ok(TimerResult::Done) => slot.step_at = None,
                                Err(e) => {
                                    slot.step_at = None;
                                    report_fault(oid, e);
                                }
                            }
                        }
                    }
                }

                if let Some(at) = slot.rt_step_at {
                    if !(at.wrapping_sub(now) as i32 > 0) {
                        if let Some(stepper) = registry.get_mut(oid) {
                            match stepper.rt_step_event(now) {
                                TimerResult::RescheduleAt(t) => slot.rt_step_at = Some(t),
                                TimerResult::Done => slot.rt_step_at = None,
                            }
                        }
                    }
                }
            }

            earliest_timer_deadline(sched, now)
        });

        match next {
            Some(next) => {
                *cx.local.armed_at = next;
                let delta_us = (next.wrapping_sub(now) / TICKS_PER_US).max(1);
                cx.local.stepper_timer.start(delta_us.micros()).ok();
            }
            None => {
                cx.local.stepper_timer.cancel().ok();
            }
        }
    }

    /// Cooperative tier: sensor read, filter, kinematic guard, and mode
    /// transitions for every motor currently in real-time mode or mid
    /// transition. Re-arms itself through the monotonic on a fixed cadence
    /// rather than the hardware timer, since none of this touches the step
    /// line that `stepper_isr` owns; it only briefly raises its priority to
    /// the shared ceiling while locking `registry`/`sched`.
    #[task(shared = [registry, sched], local = [sensor], priority = 2)]
    async fn control_task(mut cx: control_task::Context) {
        loop {
            let now = control_now_ticks();

            (&mut cx.shared.registry, &mut cx.shared.sched).lock(|registry, sched| {
                for oid in 0..STEPPER_COUNT as u8 {
                    let slot = &mut sched[oid as usize];

                    if let Some(at) = slot.mode_toggle_at {
                        if !(at.wrapping_sub(now) as i32 > 0) {
                            if let Some(stepper) = registry.get_mut(oid) {
                                stepper.toggle_mode_event();
                                slot.mode_toggle_at = None;
                                if let Some(RtArm { control_at, step_at }) = stepper.toggle_mode_task(now) {
                                    slot.rt_control_at = Some(control_at);
                                    slot.rt_step_at = Some(step_at);
                                }
                            }
                        }
                    }

                    let Some(stepper) = registry.get(oid) else { continue };
                    if stepper.mode() != Mode::RealTime {
                        continue;
                    }

                    if let Some(at) = sched[oid as usize].rt_control_at {
                        if !(at.wrapping_sub(now) as i32 > 0) {
                            if let Some((stepper, low_pass)) = registry.stepper_and_low_pass(oid) {
                                let (result, log) = stepper.rt_control_event(cx.local.sensor, low_pass, now);
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
                    }
                }
            });

            Systick::delay(1.millis()).await;
        }
    }

    /// Communication Task - handles incoming serial data.
    #[task(binds = USART1, shared = [registry, sched], local = [usart_rx], priority = 2)]
    fn usart_task(mut cx: usart_task::Context) {
        // This task would read bytes from cx.local.usart_rx, feed them to a
        // klipper-proto parser, and on receiving a valid stepper command
        // would apply it through `cx.shared.registry`/`cx.shared.sched`
        // (locked, same as `stepper_isr`/`control_task` above) the same way
        // `crate::stepper::apply_command` does for the embassy entry point.
        if let Ok(_byte) = cx.local.usart_rx.read() {
            // ... parsing logic here ...
        }
    }

    /// Periodic task for heater control. Lower priority.
    #[task(priority = 1)]
    async fn heater_task(_: heater_task::Context) {
        loop {
            // PID loop logic here
            Systick::delay(100.millis()).await;
        }
    }

    /// Periodic task for ADC sampling. Lower priority.
    #[task(priority = 1)]
    async fn adc_task(_: adc_task::Context) {
        loop {
            // ADC reading logic here
            Systick::delay(500.millis()).await;
        }
    }
}
