//! Array of INA219 sensors sampled as one reading
//!
//! Channel `i` is the sensor at the `i`th configured address. Sensors that
//! did not answer the probe stay in the array and read 0.0 mA, so channel
//! positions never shift.

use embedded_hal::i2c::I2c;
use heapless::Vec;

use rallyloop_core::error::SensorError;
use rallyloop_core::io::SampleSource;
use rallyloop_core::types::{ChannelReading, MAX_SENSOR_CHANNELS};

use super::ina219::Ina219;

/// Addresses of the top, middle and bottom sensors (A0/A1 strapped
/// 00, 01 and 10).
pub const DEFAULT_ADDRESSES: [u8; 3] = [0x40, 0x41, 0x44];

/// Sensor slot in the array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Slot {
    sensor: Ina219,
    present: bool,
}

/// INA219 array on one I2C bus.
pub struct CurrentSensorArray<I2C> {
    i2c: I2C,
    slots: Vec<Slot, MAX_SENSOR_CHANNELS>,
}

impl<I2C: I2c> CurrentSensorArray<I2C> {
    /// Array over `addresses`, in channel order. Addresses beyond
    /// [`MAX_SENSOR_CHANNELS`] are ignored.
    ///
    /// Nothing is present until [`CurrentSensorArray::probe`] runs.
    pub fn new(i2c: I2C, addresses: &[u8]) -> Self {
        let mut slots = Vec::new();
        for &address in addresses.iter().take(MAX_SENSOR_CHANNELS) {
            // Capacity checked by take()
            let _ = slots.push(Slot {
                sensor: Ina219::new(address),
                present: false,
            });
        }
        Self { i2c, slots }
    }

    /// Array over [`DEFAULT_ADDRESSES`].
    pub fn with_default_addresses(i2c: I2C) -> Self {
        Self::new(i2c, &DEFAULT_ADDRESSES)
    }

    /// Initialize every sensor, marking the ones that answer as present.
    ///
    /// Returns the number of present sensors.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::NoSensors`] if none answered.
    pub fn probe(&mut self) -> Result<usize, SensorError<I2C::Error>> {
        for slot in &mut self.slots {
            slot.present = slot.sensor.init(&mut self.i2c).is_ok();
        }
        match self.present_count() {
            0 => Err(SensorError::NoSensors),
            n => Ok(n),
        }
    }

    /// Whether channel `channel` answered the last probe.
    pub fn is_present(&self, channel: usize) -> bool {
        self.slots.get(channel).is_some_and(|s| s.present)
    }

    /// Give the bus back.
    pub fn release_bus(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> SampleSource for CurrentSensorArray<I2C> {
    type Error = I2C::Error;

    fn channel_count(&self) -> usize {
        self.slots.len()
    }

    fn present_count(&self) -> usize {
        self.slots.iter().filter(|s| s.present).count()
    }

    fn sample(&mut self, timestamp_us: u64) -> Result<ChannelReading, SensorError<I2C::Error>> {
        if self.present_count() == 0 {
            return Err(SensorError::NoSensors);
        }

        let mut values = [0.0f32; MAX_SENSOR_CHANNELS];
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.present {
                continue;
            }
            values[i] = slot
                .sensor
                .current_ma(&mut self.i2c)
                .map_err(|error| SensorError::Bus {
                    channel: i as u8,
                    error,
                })?;
        }
        Ok(ChannelReading::new(timestamp_us, &values[..self.slots.len()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakeBus;

    const CURRENT: u8 = 0x04;

    fn first_missing<I2C: I2c>(array: &CurrentSensorArray<I2C>) -> Option<SensorError<I2C::Error>> {
        array
            .slots
            .iter()
            .enumerate()
            .find(|(_, s)| !s.present)
            .map(|(i, s)| SensorError::NotPresent {
                channel: i as u8,
                address: s.sensor.address(),
            })
    }

    #[test]
    fn test_probe_and_sample() {
        let mut bus = FakeBus::with_devices(&[0x40, 0x41, 0x44]);
        bus.set_register(0x40, CURRENT, 10);
        bus.set_register(0x41, CURRENT, 49);
        bus.set_register(0x44, CURRENT, (-20i16) as u16);

        let mut array = CurrentSensorArray::with_default_addresses(bus);
        assert_eq!(array.probe().unwrap(), 3);

        let reading = array.sample(1_000).unwrap();
        let v = reading.values();
        assert_eq!(reading.timestamp_us, 1_000);
        assert!((v[0] - 1.0).abs() < 1e-4);
        assert!((v[1] - 4.9).abs() < 1e-4);
        assert!((v[2] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_absent_sensor_reads_zero() {
        let mut bus = FakeBus::with_devices(&[0x40, 0x44]);
        bus.set_register(0x40, CURRENT, 30);
        bus.set_register(0x44, CURRENT, 30);

        let mut array = CurrentSensorArray::with_default_addresses(bus);
        assert_eq!(array.probe().unwrap(), 2);
        assert!(!array.is_present(1));
        assert!(matches!(
            first_missing(&array),
            Some(SensorError::NotPresent { channel: 1, address: 0x41 })
        ));

        let reading = array.sample(0).unwrap();
        assert_eq!(reading.channel_count(), 3);
        assert!(reading.values()[1].abs() < f32::EPSILON);
    }

    #[test]
    fn test_no_sensors_is_fatal() {
        let mut array = CurrentSensorArray::with_default_addresses(FakeBus::with_devices(&[]));
        assert!(matches!(array.probe(), Err(SensorError::NoSensors)));
        assert_eq!(array.present_count(), 0);

        let err = array.sample(0).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_bus_error_is_transient() {
        let mut array =
            CurrentSensorArray::with_default_addresses(FakeBus::with_devices(&[0x40, 0x41, 0x44]));
        array.probe().unwrap();

        let mut bus = array.release_bus();
        bus.fail_reads = true;
        let mut array = CurrentSensorArray::with_default_addresses(bus);
        array.probe().unwrap();

        let err = array.sample(0).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.channel(), Some(0));
    }
}
