//! # Embassy Main
//!
//! This is the main entry point for the firmware when using the Embassy executor.
//! It initializes the hardware, spawns all the concurrent tasks, and then lets the
//! executor take over.

use crate::safety::{SafetyMonitor, ThermalMonitor};
use crate::stepper::{self, StepOutput};
use crate::{adc, heater, proto_bridge};
use boards::stm32f407::pins::BoardPins;
use embassy_executor::Spawner;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::Hertz;
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::Config;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use mcu_drivers::stepper::{Ads1x1x, StepperConfig};
use static_cell::StaticCell;

static SAFETY: StaticCell<Mutex<CriticalSectionRawMutex, SafetyMonitor<'static, 4>>> = StaticCell::new();

/// The main asynchronous function that sets up and runs the firmware.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    defmt::info!("Initializing Klipper MCU Firmware...");

    // Board-specific configuration and initialization.
    let mut config = Config::default();
    // Configure clocks here if needed, e.g., for high-speed stepping.
    // config.rcc.hse = Some(embassy_stm32::rcc::Hse { ... });
    let p = embassy_stm32::init(config);
    let board_pins = BoardPins::new(p);

    let safety = SAFETY.init(Mutex::new(SafetyMonitor::new(
        [
            ThermalMonitor::new(5.0, -50.0, 300.0, 25.0),
            ThermalMonitor::new(5.0, -50.0, 300.0, 25.0),
            ThermalMonitor::new(5.0, -50.0, 300.0, 25.0),
            ThermalMonitor::new(5.0, -50.0, 300.0, 25.0),
        ],
        IndependentWatchdog::new(board_pins.watchdog, 2_000_000),
    )));

    // The real-time stepper loop's analog front end (§6): an ADS1x1x-class
    // sensor on the board's two-wire bus.
    let i2c = I2c::new_blocking(
        board_pins.sensor_i2c,
        board_pins.sensor_scl,
        board_pins.sensor_sda,
        Hertz(400_000),
        Default::default(),
    );
    let sensor = Ads1x1x::new(i2c);

    let mut registry = stepper::Registry::new();
    let step_lines: [(StepOutput, StepOutput); stepper::STEPPER_COUNT] = [
        (
            Output::new(board_pins.stepper_x_step, Level::Low, Speed::High),
            Output::new(board_pins.stepper_x_dir, Level::Low, Speed::High),
        ),
        (
            Output::new(board_pins.stepper_y_step, Level::Low, Speed::High),
            Output::new(board_pins.stepper_y_dir, Level::Low, Speed::High),
        ),
        (
            Output::new(board_pins.stepper_z_step, Level::Low, Speed::High),
            Output::new(board_pins.stepper_z_dir, Level::Low, Speed::High),
        ),
        (
            Output::new(board_pins.stepper_e_step, Level::Low, Speed::High),
            Output::new(board_pins.stepper_e_dir, Level::Low, Speed::High),
        ),
    ];
    stepper::configure_motors(
        &mut registry,
        step_lines,
        StepperConfig {
            min_stop_interval: 0,
            invert_step: false,
        },
    )
    .expect("board declares STEPPER_COUNT motors; registry is sized to match");

    // Spawn all the concurrent tasks.
    // The spawner is responsible for running these tasks in the background.
    spawner.spawn(proto_bridge::proto_task(p.USART1, board_pins.uart_rx, board_pins.uart_tx)).unwrap();
    spawner.spawn(stepper::stepper_task(registry, sensor, safety)).unwrap();
    spawner.spawn(adc::adc_task(p.ADC1, board_pins.temp_extruder)).unwrap();
    spawner.spawn(heater::heater_task()).unwrap();
    spawner.spawn(led_task(board_pins.led.into())).unwrap();

    defmt::info!("Initialization complete. All tasks are running.");
}

/// A simple task to blink the LED, indicating that the firmware is running.
#[embassy_executor::task]
async fn led_task(led_pin: embassy_stm32::gpio::AnyPin) {
    use embassy_stm32::gpio::{Level, Output, Speed};
    use embassy_time::{Duration, Timer};
    let mut led = Output::new(led_pin, Level::High, Speed::Low);

    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}
