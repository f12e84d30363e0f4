// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::i2c::I2c;
use heapless::Vec;

use crate::mpu9250::bits::{set_bits, BitSpan};
use crate::mpu9250::{BusError, MpuError};

/// Largest register block read in one transaction (accel + temp + gyro).
pub const MAX_TRANSFER: usize = 14;

/// Bytes clocked back by [`RegisterBus::write_read`].
pub type ReadBuf = Vec<u8, MAX_TRANSFER>;

/// Synchronous register access to one device on a two-wire bus.
///
/// Every call blocks for the duration of the transfer. Failures are reported, never retried.
pub trait RegisterBus {
    /// Error type of the underlying transport.
    type Error;

    /// 7-bit address of the device this handle talks to.
    fn address(&self) -> u8;

    /// Sends `register` followed by `bytes`.
    fn write(&mut self, register: u8, bytes: &[u8]) -> Result<(), MpuError<Self::Error>>;

    /// Sends `register` and clocks back `len` bytes.
    fn write_read(&mut self, register: u8, len: usize) -> Result<ReadBuf, MpuError<Self::Error>>;

    /// Reads a single register.
    fn read_byte(&mut self, register: u8) -> Result<u8, MpuError<Self::Error>> {
        let buf = self.write_read(register, 1)?;
        Ok(buf.first().copied().unwrap_or_default())
    }

    /// Writes a single register.
    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), MpuError<Self::Error>> {
        self.write(register, &[value])
    }

    /// Read-modify-write of one bit-field. Returns the byte that was written.
    ///
    /// Implementations shared between drivers should hold their lock across both transfers.
    fn modify(
        &mut self,
        register: u8,
        span: BitSpan,
        value: u8,
    ) -> Result<u8, MpuError<Self::Error>> {
        let current = self.read_byte(register)?;
        let next = set_bits(current, span, value);
        self.write_byte(register, next)?;
        Ok(next)
    }
}

/// An I2C bus shared by several devices.
///
/// The bus lives behind a critical section mutex so the MPU-9250 and the AK8963 drivers can hold
/// handles to it at the same time. One transaction (or one read-modify-write) runs per lock.
///
/// On single-core targets the critical section masks interrupts for the whole blocking transfer.
/// A HAL whose I2C driver completes transfers from an interrupt will deadlock behind it.
pub struct SharedBus<I2C> {
    inner: Mutex<RefCell<I2C>>,
}

impl<I2C> SharedBus<I2C> {
    /// Takes ownership of the bus.
    pub const fn new(i2c: I2C) -> Self {
        SharedBus {
            inner: Mutex::new(RefCell::new(i2c)),
        }
    }

    /// Creates a register handle for the device at `address`.
    pub fn device(&self, address: u8) -> I2cRegisterBus<'_, I2C> {
        I2cRegisterBus { bus: self, address }
    }

    /// Runs `f` with exclusive access to the bus.
    pub fn lock<R>(&self, f: impl FnOnce(&mut I2C) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Releases the bus back to the user.
    pub fn into_inner(self) -> I2C {
        self.inner.into_inner().into_inner()
    }
}

/// Register handle for one device on a [`SharedBus`].
pub struct I2cRegisterBus<'a, I2C> {
    bus: &'a SharedBus<I2C>,
    address: u8,
}

impl<'a, I2C: I2c> I2cRegisterBus<'a, I2C> {
    fn bus_error(&self, register: u8, kind: I2C::Error) -> MpuError<I2C::Error> {
        MpuError::BusError(BusError {
            device: self.address,
            register,
            kind,
        })
    }

    fn write_locked(
        &self,
        i2c: &mut I2C,
        register: u8,
        bytes: &[u8],
    ) -> Result<(), MpuError<I2C::Error>> {
        let mut frame: Vec<u8, { MAX_TRANSFER + 1 }> = Vec::new();
        frame.push(register).map_err(|_| MpuError::InvalidInput)?;
        frame
            .extend_from_slice(bytes)
            .map_err(|_| MpuError::InvalidInput)?;
        i2c.write(self.address, &frame)
            .map_err(|e| self.bus_error(register, e))
    }

    fn write_read_locked(
        &self,
        i2c: &mut I2C,
        register: u8,
        len: usize,
    ) -> Result<ReadBuf, MpuError<I2C::Error>> {
        let mut buf = ReadBuf::new();
        buf.resize_default(len).map_err(|_| MpuError::InvalidInput)?;
        i2c.write_read(self.address, &[register], &mut buf)
            .map_err(|e| self.bus_error(register, e))?;
        Ok(buf)
    }
}

impl<'a, I2C: I2c> RegisterBus for I2cRegisterBus<'a, I2C> {
    type Error = I2C::Error;

    fn address(&self) -> u8 {
        self.address
    }

    fn write(&mut self, register: u8, bytes: &[u8]) -> Result<(), MpuError<Self::Error>> {
        self.bus
            .lock(|i2c| self.write_locked(i2c, register, bytes))
    }

    fn write_read(&mut self, register: u8, len: usize) -> Result<ReadBuf, MpuError<Self::Error>> {
        self.bus
            .lock(|i2c| self.write_read_locked(i2c, register, len))
    }

    fn modify(
        &mut self,
        register: u8,
        span: BitSpan,
        value: u8,
    ) -> Result<u8, MpuError<Self::Error>> {
        self.bus.lock(|i2c| {
            let current = self
                .write_read_locked(i2c, register, 1)?
                .first()
                .copied()
                .unwrap_or_default();
            let next = set_bits(current, span, value);
            self.write_locked(i2c, register, &[next])?;
            Ok(next)
        })
    }
}
