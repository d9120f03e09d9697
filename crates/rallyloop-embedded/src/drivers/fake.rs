//! In-test fakes for the embedded-hal bus and pin traits.

use std::collections::HashMap;

use embedded_hal::digital::{self, ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{self, ErrorType as I2cErrorType, I2c, NoAcknowledgeSource, Operation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeError {
    Nack,
    Stuck,
}

impl i2c::Error for FakeError {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            Self::Nack => i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::Stuck => i2c::ErrorKind::Bus,
        }
    }
}

impl digital::Error for FakeError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// Register-file model of several I2C devices.
#[derive(Debug, Default)]
pub struct FakeBus {
    devices: Vec<u8>,
    registers: HashMap<(u8, u8), u16>,
    pointers: HashMap<u8, u8>,
    pub fail_reads: bool,
}

impl FakeBus {
    pub fn with_devices(addresses: &[u8]) -> Self {
        Self {
            devices: addresses.to_vec(),
            ..Self::default()
        }
    }

    pub fn register(&self, address: u8, reg: u8) -> Option<u16> {
        self.registers.get(&(address, reg)).copied()
    }

    pub fn set_register(&mut self, address: u8, reg: u8, value: u16) {
        self.registers.insert((address, reg), value);
    }
}

impl I2cErrorType for FakeBus {
    type Error = FakeError;
}

impl I2c for FakeBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), FakeError> {
        if !self.devices.contains(&address) {
            return Err(FakeError::Nack);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let data: &[u8] = bytes;
                    if let Some(&reg) = data.first() {
                        self.pointers.insert(address, reg);
                        if let &[_, hi, lo] = data {
                            self.registers.insert((address, reg), u16::from_be_bytes([hi, lo]));
                        }
                    }
                }
                Operation::Read(buffer) => {
                    if self.fail_reads {
                        return Err(FakeError::Stuck);
                    }
                    let reg = self.pointers.get(&address).copied().unwrap_or(0);
                    let value = self.register(address, reg).unwrap_or(0);
                    let bytes = value.to_be_bytes();
                    for (dst, src) in buffer.iter_mut().zip(bytes) {
                        *dst = src;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Output pin remembering its level.
#[derive(Debug, Default)]
pub struct FakePin {
    pub high: bool,
    pub writes: u32,
    pub broken: bool,
}

impl FakePin {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }
}

impl PinErrorType for FakePin {
    type Error = FakeError;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), FakeError> {
        if self.broken {
            return Err(FakeError::Stuck);
        }
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), FakeError> {
        if self.broken {
            return Err(FakeError::Stuck);
        }
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}
