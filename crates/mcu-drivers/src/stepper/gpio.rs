//! Hardware interfaces the engine is generic over. Kept infallible, like
//! [`crate::legacy_pipeline::AtomicGpioPort`]/[`crate::legacy_pipeline::Timer`]:
//! on the targets this firmware runs on a GPIO write cannot meaningfully
//! fail, and propagating a `Result` through the step timer callback's hot
//! path would cost cycles for no benefit.

/// The physical step output line for one motor.
pub trait StepLine {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

/// The physical direction output line for one motor.
pub trait DirLine {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

impl<T: embedded_hal::digital::OutputPin> StepLine for T {
    fn set_high(&mut self) {
        let _ = embedded_hal::digital::OutputPin::set_high(self);
    }
    fn set_low(&mut self) {
        let _ = embedded_hal::digital::OutputPin::set_low(self);
    }
}

/// The two-wire-bus analog front end feeding the real-time control loop.
/// `read` returns the already-centered sample (see [`Ads1x1x`] for the
/// concrete extraction rule); the unit is whatever `input_factor` expects.
pub trait Sensor {
    fn init(&mut self);
    fn read(&mut self) -> i32;
}

const CONFIG_REG: u8 = 0x01;
const CONVERSION_REG: u8 = 0x00;
const INIT_BYTES: [u8; 3] = [CONFIG_REG, 0x42, 0x63];
const DEFAULT_ADDRESS: u8 = 0x48;

/// Default real-time sensor backend: an ADS1x1x-class analog front end on a
/// 400 kHz two-wire bus. Other front ends implement [`Sensor`] directly.
pub struct Ads1x1x<I2C> {
    bus: I2C,
    address: u8,
}

impl<I2C: embedded_hal::i2c::I2c> Ads1x1x<I2C> {
    pub fn new(bus: I2C) -> Self {
        Self {
            bus,
            address: DEFAULT_ADDRESS,
        }
    }

    pub fn with_address(bus: I2C, address: u8) -> Self {
        Self { bus, address }
    }
}

impl<I2C: embedded_hal::i2c::I2c> Sensor for Ads1x1x<I2C> {
    fn init(&mut self) {
        let _ = self.bus.write(self.address, &INIT_BYTES);
    }

    fn read(&mut self) -> i32 {
        let mut buf = [0u8; 2];
        if self
            .bus
            .write_read(self.address, &[CONVERSION_REG], &mut buf)
            .is_err()
        {
            return 0;
        }
        let raw = (((buf[0] as u16) << 8) | buf[1] as u16) >> 4;
        raw as i32 - 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};

    struct FakeBus {
        sample: [u8; 2],
        last_write: heapless::Vec<u8, 8>,
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Write(data) => {
                        self.last_write = heapless::Vec::from_slice(data).unwrap();
                    }
                    Operation::Read(buf) => buf.copy_from_slice(&self.sample),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn init_writes_config_bytes() {
        let bus = FakeBus {
            sample: [0, 0],
            last_write: heapless::Vec::new(),
        };
        let mut sensor = Ads1x1x::new(bus);
        sensor.init();
        assert_eq!(sensor.bus.last_write.as_slice(), &INIT_BYTES);
    }

    #[test]
    fn read_extracts_centered_12_bit_sample() {
        // hi=0x12, lo=0xF0 -> (0x12F0) >> 4 = 0x12F -> 0x12F - 1024
        let bus = FakeBus {
            sample: [0x12, 0xF0],
            last_write: heapless::Vec::new(),
        };
        let mut sensor = Ads1x1x::new(bus);
        let value = sensor.read();
        assert_eq!(value, 0x12F - 1024);
    }

    #[test]
    fn read_at_zero_centers_to_negative_bias() {
        let bus = FakeBus {
            sample: [0, 0],
            last_write: heapless::Vec::new(),
        };
        let mut sensor = Ads1x1x::new(bus);
        assert_eq!(sensor.read(), -1024);
    }
}
