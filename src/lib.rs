// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

//! Device agnostic driver for the MPU-9250 IMU (inertial measurement unit) and the AK8963
//! magnetometer that sits behind it.
//! The driver depends on embedded-hal 1.0, so as long as the HAL you use implements the blocking
//! `I2c` trait, then this driver should be compatible.
//!
//! The register map for this device can be found [here](https://invensense.tdk.com/wp-content/uploads/2015/02/RM-MPU-9250A-00-v1.6.pdf).
//!
//! Both chips share one two-wire bus. Wrap your bus in a [`mpu9250::bus::SharedBus`] and hand each
//! driver its own device handle; every register transaction (including each read-modify-write of a
//! configuration bit-field) runs under the bus lock.
//!
//! The magnetometer is reached through the bypass mode of the MPU-9250, so it only becomes available
//! once [`mpu9250::imu::Mpu9250::init`] has succeeded.
//!
//! [`filter::AngleFilter`] is a small two-state Kalman filter that fuses an accelerometer tilt angle
//! with a gyro rate into a stable angle estimate.
//!
//! Currently, there is no support for the FIFO, the DMP, interrupts or the I2C master slave channels.

#![deny(missing_docs)]
#![cfg_attr(not(test), no_std)]

#[cfg(feature = "rtt")]
use defmt_rtt as _; // global logger
#[cfg(feature = "rtt")]
use panic_probe as _;

#[macro_use]
mod log;

/// Main module that holds the bus, register, and driver sub modules.
/// Also holds many enums and constants shared between the two chips.
pub mod mpu9250;

/// Angle estimation from raw motion samples.
pub mod filter;
