//! TI INA219 current/power monitor (I2C)
//!
//! The device is configured for the 32 V / 2 A profile: a 12-bit
//! continuous shunt and bus conversion with a calibration value that
//! yields 0.1 mA per current LSB.
//!
//! The driver does not own the bus, so several sensors can share one
//! [`I2c`] instance.

use embedded_hal::i2c::I2c;

/// INA219 register addresses
mod regs {
    pub const CONFIG: u8 = 0x00;
    pub const CURRENT: u8 = 0x04;
    pub const CALIBRATION: u8 = 0x05;
}

/// Configuration word: 32 V bus range, ±320 mV shunt range, 12-bit
/// conversions, shunt and bus continuous.
pub const CONFIG_32V_2A: u16 = 0x399F;

/// Calibration value for 0.1 mA per current LSB with a 0.1 Ω shunt.
pub const CALIBRATION_32V_2A: u16 = 4096;

/// Milliamps per current register LSB.
pub const CURRENT_LSB_MA: f32 = 0.1;

/// Factory address with A0 and A1 grounded.
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// One INA219 on a shared bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ina219 {
    address: u8,
}

impl Ina219 {
    /// Sensor at `address`.
    #[must_use]
    pub const fn new(address: u8) -> Self {
        Self { address }
    }

    /// Bus address.
    #[must_use]
    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Write configuration and calibration.
    ///
    /// A missing device shows up here as a NACK from the bus.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn init<I: I2c>(&self, i2c: &mut I) -> Result<(), I::Error> {
        self.write_register(i2c, regs::CONFIG, CONFIG_32V_2A)?;
        self.write_register(i2c, regs::CALIBRATION, CALIBRATION_32V_2A)
    }

    /// Read the shunt current in milliamps.
    ///
    /// The calibration register is rewritten first since the device clears
    /// it on a brown-out reset.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn current_ma<I: I2c>(&self, i2c: &mut I) -> Result<f32, I::Error> {
        self.write_register(i2c, regs::CALIBRATION, CALIBRATION_32V_2A)?;
        let raw = self.read_register(i2c, regs::CURRENT)? as i16;
        Ok(f32::from(raw) * CURRENT_LSB_MA)
    }

    fn write_register<I: I2c>(&self, i2c: &mut I, reg: u8, value: u16) -> Result<(), I::Error> {
        let [hi, lo] = value.to_be_bytes();
        i2c.write(self.address, &[reg, hi, lo])
    }

    fn read_register<I: I2c>(&self, i2c: &mut I, reg: u8) -> Result<u16, I::Error> {
        let mut buffer = [0u8; 2];
        i2c.write_read(self.address, &[reg], &mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakeBus;

    #[test]
    fn test_init_writes_profile() {
        let mut bus = FakeBus::with_devices(&[0x40]);
        Ina219::new(0x40).init(&mut bus).unwrap();

        assert_eq!(bus.register(0x40, regs::CONFIG), Some(CONFIG_32V_2A));
        assert_eq!(bus.register(0x40, regs::CALIBRATION), Some(CALIBRATION_32V_2A));
    }

    #[test]
    fn test_current_scaling() {
        let mut bus = FakeBus::with_devices(&[0x41]);
        bus.set_register(0x41, regs::CURRENT, 123);
        let ma = Ina219::new(0x41).current_ma(&mut bus).unwrap();
        assert!((ma - 12.3).abs() < 1e-4);

        // Negative currents are two's complement
        bus.set_register(0x41, regs::CURRENT, (-37i16) as u16);
        let ma = Ina219::new(0x41).current_ma(&mut bus).unwrap();
        assert!((ma + 3.7).abs() < 1e-4);
    }

    #[test]
    fn test_missing_device_nacks() {
        let mut bus = FakeBus::with_devices(&[0x40]);
        assert!(Ina219::new(0x44).init(&mut bus).is_err());
    }
}
