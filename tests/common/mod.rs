// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

//! Simulated MPU-9250 + AK8963 on one I2C bus.

#![allow(dead_code)]

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use mpu9250_driver::mpu9250::bus::{I2cRegisterBus, SharedBus};
use mpu9250_driver::mpu9250::config::Mpu9250Config;
use mpu9250_driver::mpu9250::imu::Mpu9250;
use mpu9250_driver::mpu9250::{AK8963_ADDR, MPU9250_ADDR};

pub const PWR_MGMT_1: usize = 0x6B;
pub const INT_PIN_CFG: usize = 0x37;
pub const USER_CTRL: usize = 0x6A;
pub const WHO_AM_I: usize = 0x75;
pub const ACCEL_XOUT_H: usize = 0x3B;
pub const TEMP_OUT_H: usize = 0x41;
pub const GYRO_XOUT_H: usize = 0x43;

pub const MAG_WIA: usize = 0x00;
pub const MAG_HXL: usize = 0x03;
pub const MAG_ST2: usize = 0x09;
pub const MAG_CNTL1: usize = 0x0A;
pub const MAG_ASAX: usize = 0x10;

/// One completed bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Txn {
    /// Plain write
    Write { addr: u8, data: Vec<u8> },
    /// Write followed by a repeated-start read
    WriteRead {
        addr: u8,
        write_data: Vec<u8>,
        read_len: usize,
    },
}

/// Register files of both chips.
///
/// The AK8963 only acknowledges once the bypass bit of INT_PIN_CFG is set, and falls back to
/// single measurement mode whenever a read covers ST2.
pub struct FakeBus {
    pub mpu: [u8; 128],
    pub mag: [u8; 32],
    pub transactions: Vec<Txn>,
    /// Number of upcoming transactions to fail
    pub fail_next: usize,
    /// INT_PIN_CFG ignores the bypass bit
    pub bypass_stuck_low: bool,
}

impl FakeBus {
    pub fn new() -> Self {
        let mut bus = FakeBus {
            mpu: [0; 128],
            mag: [0; 32],
            transactions: Vec::new(),
            fail_next: 0,
            bypass_stuck_low: false,
        };
        bus.mpu[WHO_AM_I] = 0x71;
        bus.mpu[PWR_MGMT_1] = 0x40;
        bus.mag[MAG_WIA] = 0x48;
        bus.mag[MAG_ASAX..MAG_ASAX + 3].copy_from_slice(&[0x80, 0xB0, 0x80]);
        bus
    }

    /// Writes issued to `addr`, as (register, value) pairs.
    pub fn writes_to(&self, addr: u8) -> Vec<(u8, u8)> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                Txn::Write { addr: a, data } if *a == addr && data.len() == 2 => {
                    Some((data[0], data[1]))
                }
                _ => None,
            })
            .collect()
    }

    fn reset_mpu(&mut self) {
        // data registers and identity survive, configuration goes back to power-on values
        for (reg, value) in self.mpu.iter_mut().enumerate() {
            if !(ACCEL_XOUT_H..=0x48).contains(&reg) && reg != WHO_AM_I {
                *value = 0;
            }
        }
        self.mpu[PWR_MGMT_1] = 0x40;
    }

    fn bypass_on(&self) -> bool {
        self.mpu[INT_PIN_CFG] & 0x02 != 0
    }

    fn write_mpu(&mut self, reg: usize, value: u8) {
        match reg {
            PWR_MGMT_1 if value & 0x80 != 0 => self.reset_mpu(),
            INT_PIN_CFG if self.bypass_stuck_low => self.mpu[reg] = value & !0x02,
            _ => self.mpu[reg] = value,
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(ErrorKind::Other);
        }
        match address {
            MPU9250_ADDR => {}
            AK8963_ADDR if self.bypass_on() => {}
            _ => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
        }

        let mut pointer = 0usize;
        let mut written = Vec::new();
        let mut read_len = 0;
        let mut covered_st2 = false;

        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    written.extend_from_slice(bytes);
                    if let Some((reg, data)) = bytes.split_first() {
                        pointer = *reg as usize;
                        for value in data {
                            if address == MPU9250_ADDR {
                                self.write_mpu(pointer, *value);
                            } else {
                                self.mag[pointer] = *value;
                            }
                            pointer += 1;
                        }
                    }
                }
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = if address == MPU9250_ADDR {
                            self.mpu[pointer]
                        } else {
                            covered_st2 |= pointer == MAG_ST2;
                            self.mag[pointer]
                        };
                        pointer += 1;
                    }
                    read_len += buf.len();
                }
            }
        }

        if covered_st2 {
            self.mag[MAG_CNTL1] = (self.mag[MAG_CNTL1] & 0xF0) | 0x01;
        }

        self.transactions.push(if read_len == 0 {
            Txn::Write {
                addr: address,
                data: written,
            }
        } else {
            Txn::WriteRead {
                addr: address,
                write_data: written,
                read_len,
            }
        });
        Ok(())
    }
}

/// Delay that only counts.
#[derive(Default)]
pub struct NoopDelay {
    pub calls: u32,
    pub total_ms: u32,
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += ms;
    }
}

pub type Imu<'a> = Mpu9250<I2cRegisterBus<'a, FakeBus>>;

pub fn imu(bus: &SharedBus<FakeBus>) -> Imu<'_> {
    Mpu9250::new(
        bus.device(MPU9250_ADDR),
        bus.device(AK8963_ADDR),
        Mpu9250Config::default(),
    )
}

/// A driver that went through `init` with the log cleared afterwards.
pub fn ready_imu(bus: &SharedBus<FakeBus>) -> Imu<'_> {
    let mut imu = imu(bus);
    imu.init(&mut NoopDelay::default())
        .expect("init on a healthy bus");
    bus.lock(|b| b.transactions.clear());
    imu
}
