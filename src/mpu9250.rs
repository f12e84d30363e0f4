// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

/// Register-level bit-field helpers and register views.
pub mod bits;

/// The register bus abstraction and the shared I2C adapter.
pub mod bus;

/// Configuration surface of both chips.
pub mod config;

/// The MPU-9250 accelerometer/gyroscope driver.
pub mod imu;

/// The AK8963 magnetometer driver.
pub mod mag;

/// Cancellable sampling loops.
pub mod stream;

use core::fmt;

use bits::ByteOrder;
use config::InvalidCode;

/// I2C address of the MPU-9250 when AD0 is low.
pub const MPU9250_ADDR: u8 = 0x68;
/// I2C address of the MPU-9250 when AD0 is high.
pub const MPU9250_ADDR_ALT: u8 = 0x69;
/// I2C address of the AK8963 once bypass mode is on.
pub const AK8963_ADDR: u8 = 0x0C;

/// Expected WHO_AM_I value of the MPU-9250.
pub const MPU9250_WHO_AM_I: u8 = 0x71;
/// Expected WIA value of the AK8963.
pub const AK8963_WHO_AM_I: u8 = 0x48;

/// Settle time after a reset or a power mode change, in ms.
pub const SETTLE_MS: u32 = 10;

const TEMP_SEN: f32 = 333.87;
const TEMP_OFFSET: f32 = 21.0;

pub(crate) const ACCEL_SEN_0: f32 = 16_384.0;
pub(crate) const ACCEL_SEN_1: f32 = 8_192.0;
pub(crate) const ACCEL_SEN_2: f32 = 4_096.0;
pub(crate) const ACCEL_SEN_3: f32 = 2_048.0;

pub(crate) const GYRO_SEN_0: f32 = 131.0;
pub(crate) const GYRO_SEN_1: f32 = 65.5;
pub(crate) const GYRO_SEN_2: f32 = 32.8;
pub(crate) const GYRO_SEN_3: f32 = 16.4;

/// Magnetometer resolution in 14 bit output mode (0.1 uT per LSB units).
pub const MAG_RES_14BIT: f32 = 10.0 * 4912.0 / 8190.0;
/// Magnetometer resolution in 16 bit output mode (0.1 uT per LSB units).
pub const MAG_RES_16BIT: f32 = 10.0 * 4912.0 / 32760.0;

pub(crate) const IMU_BYTE_ORDER: ByteOrder = ByteOrder::BigEndian;
pub(crate) const MAG_BYTE_ORDER: ByteOrder = ByteOrder::LittleEndian;

/// Lifecycle of a driver instance.
///
/// `Ready` and `Failed` are terminal. A failed driver has to be constructed again to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Constructed, `init` not yet called
    Uninitialized,
    /// `init` is running
    Configuring,
    /// Configured and sampling
    Ready,
    /// A configuration step failed or the chip did not identify itself
    Failed,
}

/// A failed bus transaction, with the device and register it was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError<E> {
    /// 7-bit device address
    pub device: u8,
    /// Register the transaction started at
    pub register: u8,
    /// Error reported by the transport
    pub kind: E,
}

/// The possible errors that the driver can return.
///
/// `BusError` is for when a HAL function on the I2C bus fails. For example, the magnetometer will not
/// acknowledge its address until bypass mode is enabled.
///
/// `IdentityMismatch` means the chip at the address is absent or not the expected part.
///
/// `InvalidInput` is for when an input to a driver function is unacceptable.
///
/// `DeviceFailed` is returned when `init` is called again on a driver whose initialization failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpuError<E> {
    /// An error occurred when using the bus
    BusError(BusError<E>),
    /// The identity register did not hold the expected value
    IdentityMismatch {
        /// 7-bit device address
        device: u8,
        /// Expected identity value
        expected: u8,
        /// Value that was read back
        found: u8,
    },
    /// An invalid input was passed to the function
    InvalidInput,
    /// The driver is in the `Failed` state
    DeviceFailed,
}

impl<E> From<BusError<E>> for MpuError<E> {
    fn from(error: BusError<E>) -> Self {
        MpuError::BusError(error)
    }
}

impl<E> From<InvalidCode> for MpuError<E> {
    fn from(_: InvalidCode) -> Self {
        MpuError::InvalidInput
    }
}

impl<E> fmt::Display for MpuError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpuError::BusError(e) => write!(
                f,
                "bus error at device {:#x} register {:#x}",
                e.device, e.register
            ),
            MpuError::IdentityMismatch {
                device,
                expected,
                found,
            } => write!(
                f,
                "device {:#x} identified as {:#x}, expected {:#x}",
                device, found, expected
            ),
            MpuError::InvalidInput => write!(f, "invalid input"),
            MpuError::DeviceFailed => write!(f, "device failed initialization"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for MpuError<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            MpuError::BusError(e) => defmt::write!(
                fmt,
                "Bus error at device {=u8:#x} register {=u8:#x}!",
                e.device,
                e.register
            ),
            MpuError::IdentityMismatch {
                device,
                expected,
                found,
            } => defmt::write!(
                fmt,
                "Device {=u8:#x} identified as {=u8:#x}, expected {=u8:#x}!",
                *device,
                *found,
                *expected
            ),
            MpuError::InvalidInput => defmt::write!(fmt, "Invalid input in the function!"),
            MpuError::DeviceFailed => defmt::write!(fmt, "Device failed initialization!"),
        }
    }
}

/// Accelerometer and gyro sample from one burst read, raw LSB.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Motion6 {
    /// x, y, z acceleration
    pub accel: [i16; 3],
    /// x, y, z angular rate
    pub gyro: [i16; 3],
}

/// Accelerometer, gyro and magnetometer sample.
///
/// Accel and gyro are raw LSB; the magnetic field is already scaled by the magnetometer resolution
/// and its factory sensitivity adjustment.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Motion9 {
    /// x, y, z acceleration
    pub accel: [i16; 3],
    /// x, y, z angular rate
    pub gyro: [i16; 3],
    /// x, y, z magnetic field
    pub mag: [f32; 3],
}

impl Motion9 {
    /// Flattens the sample into `ax, ay, az, gx, gy, gz, mx, my, mz`.
    pub fn to_array(&self) -> [f32; 9] {
        [
            self.accel[0] as f32,
            self.accel[1] as f32,
            self.accel[2] as f32,
            self.gyro[0] as f32,
            self.gyro[1] as f32,
            self.gyro[2] as f32,
            self.mag[0],
            self.mag[1],
            self.mag[2],
        ]
    }
}

/// Converts a raw TEMP_OUT value into degrees Celsius.
///
/// The raw value is taken as unsigned. The register itself is two's complement, so readings below
/// 21 C come out near 217 C instead of going negative.
pub fn convert_temp(raw: u16) -> f32 {
    raw as f32 / TEMP_SEN + TEMP_OFFSET
}

#[derive(Clone, Copy)]
pub(crate) enum Register {
    I2cMstCtrl,
    GyroConfig,
    AccelConfig,
    IntPinCfg,
    AccelXOutH,
    TempOutH,
    GyroXOutH,
    UserCtrl,
    PwrMgmt1,
    WhoAmI,
}

impl Register {
    pub(crate) const fn addr(self) -> u8 {
        match self {
            Register::I2cMstCtrl => 0x24,
            Register::GyroConfig => 0x1B,
            Register::AccelConfig => 0x1C,
            Register::IntPinCfg => 0x37,
            Register::AccelXOutH => 0x3B,
            Register::TempOutH => 0x41,
            Register::GyroXOutH => 0x43,
            Register::UserCtrl => 0x6A,
            Register::PwrMgmt1 => 0x6B,
            Register::WhoAmI => 0x75,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum MagRegister {
    Wia,
    St1,
    Hxl,
    Cntl1,
    Asax,
}

impl MagRegister {
    pub(crate) const fn addr(self) -> u8 {
        match self {
            MagRegister::Wia => 0x00,
            MagRegister::St1 => 0x02,
            MagRegister::Hxl => 0x03,
            MagRegister::Cntl1 => 0x0A,
            MagRegister::Asax => 0x10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_uses_linear_calibration() {
        assert_eq!(convert_temp(0), 21.0);
        assert!((convert_temp(3339) - 31.0).abs() < 0.01);
        // a negative register value is read as a large unsigned one
        assert!(convert_temp(0xFF9C) > 216.0);
    }

    #[test]
    fn mag_resolution_constants() {
        assert!((MAG_RES_14BIT - 5.997_558).abs() < 1e-4);
        assert!((MAG_RES_16BIT - 1.499_389).abs() < 1e-4);
    }

    #[test]
    fn motion9_flattens_in_axis_order() {
        let m = Motion9 {
            accel: [1, 2, 3],
            gyro: [-4, -5, -6],
            mag: [0.5, 1.5, 2.5],
        };
        assert_eq!(
            m.to_array(),
            [1.0, 2.0, 3.0, -4.0, -5.0, -6.0, 0.5, 1.5, 2.5]
        );
    }
}
