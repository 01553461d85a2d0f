//! Pin mappings for the MKS SKIPR board.
//! This is a starting point and may need to be adjusted based on your specific setup.

use embassy_stm32::gpio::{AnyPin, Pin};
use embassy_stm32::peripherals::{I2C1, IWDG};

/// Struct to hold all the board pins.
pub struct BoardPins {
    pub led: AnyPin,
    pub stepper_x_step: AnyPin,
    pub stepper_x_dir: AnyPin,
    pub stepper_y_step: AnyPin,
    pub stepper_y_dir: AnyPin,
    pub stepper_z_step: AnyPin,
    pub stepper_z_dir: AnyPin,
    pub stepper_e_step: AnyPin,
    pub stepper_e_dir: AnyPin,
    pub temp_extruder: AnyPin,
    pub temp_bed: AnyPin,
    pub heater_extruder: AnyPin,
    pub heater_bed: AnyPin,
    pub uart_tx: AnyPin,
    pub uart_rx: AnyPin,
    /// Two-wire bus feeding the real-time stepper loop's analog front end
    /// (`mcu_drivers::stepper::Ads1x1x`, §6).
    pub sensor_i2c: I2C1,
    pub sensor_scl: AnyPin,
    pub sensor_sda: AnyPin,
    pub watchdog: IWDG,
}

impl BoardPins {
    /// Creates a new BoardPins struct for the MKS SKIPR.
    pub fn new(p: embassy_stm32::Peripherals) -> Self {
        use embassy_stm32::gpio::Pin as _;

        // Note: These are example pins. You will need to verify them against the MKS SKIPR schematic.
        Self {
            led: p.PB1.degrade(),
            stepper_x_step: p.PE2.degrade(),
            stepper_x_dir: p.PB8.degrade(),
            stepper_y_step: p.PC5.degrade(),
            stepper_y_dir: p.PB2.degrade(),
            stepper_z_step: p.PE0.degrade(),
            stepper_z_dir: p.PE1.degrade(),
            stepper_e_step: p.PD15.degrade(),
            stepper_e_dir: p.PD14.degrade(),
            temp_extruder: p.PA0.degrade(),
            temp_bed: p.PA1.degrade(),
            heater_extruder: p.PC8.degrade(),
            heater_bed: p.PC9.degrade(),
            uart_tx: p.PA9.degrade(),
            uart_rx: p.PA10.degrade(),
            sensor_i2c: p.I2C1,
            sensor_scl: p.PB6.degrade(),
            sensor_sda: p.PB7.degrade(),
            watchdog: p.IWDG,
        }
    }
}
