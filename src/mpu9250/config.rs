// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use strum::{EnumCount, EnumIter, FromRepr};

use crate::mpu9250::{
    ACCEL_SEN_0, ACCEL_SEN_1, ACCEL_SEN_2, ACCEL_SEN_3, GYRO_SEN_0, GYRO_SEN_1, GYRO_SEN_2,
    GYRO_SEN_3, MAG_RES_14BIT, MAG_RES_16BIT,
};

/// A raw configuration code that does not name any option of the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidCode {
    /// Which selector the code was meant for
    pub field: &'static str,
    /// The rejected code
    pub code: u8,
}

macro_rules! register_code {
    ($ty:ident, $field:literal) => {
        impl $ty {
            /// The code written into the register field.
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Looks up the option for a raw register code.
            pub fn from_code(code: u8) -> Result<Self, InvalidCode> {
                Self::from_repr(code).ok_or(InvalidCode {
                    field: $field,
                    code,
                })
            }
        }
    };
}

/// Accelerometer full-scale range in g's (ACCEL_CONFIG[4:3]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AccelRange {
    /// +-2g
    G2 = 0,
    /// +-4g
    G4 = 1,
    /// +-8g
    G8 = 2,
    /// +-16g
    G16 = 3,
}

register_code!(AccelRange, "accel_range");

impl AccelRange {
    /// LSB per g.
    pub const fn sensitivity(self) -> f32 {
        match self {
            AccelRange::G2 => ACCEL_SEN_0,
            AccelRange::G4 => ACCEL_SEN_1,
            AccelRange::G8 => ACCEL_SEN_2,
            AccelRange::G16 => ACCEL_SEN_3,
        }
    }
}

/// Gyroscope full-scale range in degrees per second (GYRO_CONFIG[4:3]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GyroRange {
    /// +-250 dps
    Dps250 = 0,
    /// +-500 dps
    Dps500 = 1,
    /// +-1000 dps
    Dps1000 = 2,
    /// +-2000 dps
    Dps2000 = 3,
}

register_code!(GyroRange, "gyro_range");

impl GyroRange {
    /// LSB per dps.
    pub const fn sensitivity(self) -> f32 {
        match self {
            GyroRange::Dps250 => GYRO_SEN_0,
            GyroRange::Dps500 => GYRO_SEN_1,
            GyroRange::Dps1000 => GYRO_SEN_2,
            GyroRange::Dps2000 => GYRO_SEN_3,
        }
    }
}

/// Clock divider of the auxiliary I2C master (I2C_MST_CTRL[3:0]), named by the resulting bus speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum I2cMasterClock {
    /// 348 kHz
    Khz348 = 0,
    /// 333 kHz
    Khz333 = 1,
    /// 320 kHz
    Khz320 = 2,
    /// 308 kHz
    Khz308 = 3,
    /// 296 kHz
    Khz296 = 4,
    /// 286 kHz
    Khz286 = 5,
    /// 276 kHz
    Khz276 = 6,
    /// 267 kHz
    Khz267 = 7,
    /// 258 kHz
    Khz258 = 8,
    /// 500 kHz
    Khz500 = 9,
    /// 471 kHz
    Khz471 = 10,
    /// 444 kHz
    Khz444 = 11,
    /// 421 kHz
    Khz421 = 12,
    /// 400 kHz
    Khz400 = 13,
    /// 381 kHz
    Khz381 = 14,
    /// 364 kHz
    Khz364 = 15,
}

register_code!(I2cMasterClock, "i2c_master_clock");

/// Clock source select (PWR_MGMT_1[2:0]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockSource {
    /// Internal 20MHz oscillator
    Internal = 0,
    /// Best available clock, PLL if ready
    AutoPll = 1,
    /// Same as `AutoPll`
    AutoPll2 = 2,
    /// Same as `AutoPll`
    AutoPll3 = 3,
    /// Same as `AutoPll`
    AutoPll4 = 4,
    /// Same as `AutoPll`
    AutoPll5 = 5,
    /// Internal 20MHz oscillator
    InternalAlt = 6,
    /// Stops the clock and keeps the timing generator in reset
    Stopped = 7,
}

register_code!(ClockSource, "clock_source");

/// AK8963 operating mode (CNTL1[3:0]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MagMode {
    /// Power-down mode
    PowerDown = 0x00,
    /// Single measurement mode
    Single = 0x01,
    /// Continuous measurement mode 1 (8Hz)
    Continuous1 = 0x02,
    /// External trigger measurement mode
    ExternalTrigger = 0x04,
    /// Continuous measurement mode 2 (100Hz)
    Continuous2 = 0x06,
    /// Self-test mode
    SelfTest = 0x08,
    /// Fuse ROM access mode
    FuseRomAccess = 0x0F,
}

register_code!(MagMode, "mag_mode");

/// AK8963 output bit setting (CNTL1[4]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MagOutput {
    /// 14 bit output
    Bits14 = 0,
    /// 16 bit output
    Bits16 = 1,
}

register_code!(MagOutput, "mag_output");

impl MagOutput {
    /// Scale factor from LSB to 0.1 uT.
    pub const fn resolution(self) -> f32 {
        match self {
            MagOutput::Bits14 => MAG_RES_14BIT,
            MagOutput::Bits16 => MAG_RES_16BIT,
        }
    }
}

/// Magnetometer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ak8963Config {
    /// Operating mode
    pub mode: MagMode,
    /// Output resolution
    pub output: MagOutput,
}

impl Default for Ak8963Config {
    fn default() -> Self {
        Self {
            mode: MagMode::Continuous1,
            output: MagOutput::Bits14,
        }
    }
}

/// Configuration applied by [`crate::mpu9250::imu::Mpu9250::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mpu9250Config {
    /// Accelerometer full-scale range
    pub accel_range: AccelRange,
    /// Gyroscope full-scale range
    pub gyro_range: GyroRange,
    /// Auxiliary I2C master clock
    pub i2c_master_clock: I2cMasterClock,
    /// Clock source
    pub clock_source: ClockSource,
    /// Magnetometer settings, applied once bypass mode is on
    pub mag: Ak8963Config,
}

impl Default for Mpu9250Config {
    fn default() -> Self {
        Self {
            accel_range: AccelRange::G4,
            gyro_range: GyroRange::Dps500,
            i2c_master_clock: I2cMasterClock::Khz400,
            clock_source: ClockSource::AutoPll,
            mag: Ak8963Config::default(),
        }
    }
}

impl Mpu9250Config {
    /// Builds a configuration from raw register codes. The magnetometer keeps 14 bit output.
    pub fn from_codes(
        accel_range: u8,
        gyro_range: u8,
        i2c_master_clock: u8,
        clock_source: u8,
        mag_mode: u8,
    ) -> Result<Self, InvalidCode> {
        Ok(Self {
            accel_range: AccelRange::from_code(accel_range)?,
            gyro_range: GyroRange::from_code(gyro_range)?,
            i2c_master_clock: I2cMasterClock::from_code(i2c_master_clock)?,
            clock_source: ClockSource::from_code(clock_source)?,
            mag: Ak8963Config {
                mode: MagMode::from_code(mag_mode)?,
                output: MagOutput::Bits14,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn option_counts_match_register_widths() {
        assert_eq!(AccelRange::COUNT, 4);
        assert_eq!(GyroRange::COUNT, 4);
        assert_eq!(I2cMasterClock::COUNT, 16);
        assert_eq!(ClockSource::COUNT, 8);
        assert_eq!(MagMode::COUNT, 7);
    }

    #[test]
    fn codes_round_trip_through_lookup() {
        for clk in I2cMasterClock::iter() {
            assert_eq!(I2cMasterClock::from_code(clk.code()), Ok(clk));
        }
        for mode in MagMode::iter() {
            assert_eq!(MagMode::from_code(mode.code()), Ok(mode));
        }
    }

    #[test]
    fn out_of_range_codes_are_rejected() {
        assert_eq!(
            AccelRange::from_code(4),
            Err(InvalidCode {
                field: "accel_range",
                code: 4
            })
        );
        assert!(I2cMasterClock::from_code(16).is_err());
        assert!(ClockSource::from_code(8).is_err());
        // 0x03 is not a documented AK8963 mode
        assert!(MagMode::from_code(0x03).is_err());
    }

    #[test]
    fn sensitivities_follow_range() {
        assert_eq!(AccelRange::G2.sensitivity(), 16_384.0);
        assert_eq!(AccelRange::G16.sensitivity(), 2_048.0);
        assert_eq!(GyroRange::Dps250.sensitivity(), 131.0);
        assert_eq!(GyroRange::Dps2000.sensitivity(), 16.4);
        assert!(MagOutput::Bits16.resolution() < MagOutput::Bits14.resolution());
    }

    #[test]
    fn from_codes_builds_config() {
        let cfg = Mpu9250Config::from_codes(1, 1, 13, 1, 0x02).unwrap();
        assert_eq!(cfg, Mpu9250Config::default());
        assert!(Mpu9250Config::from_codes(0, 0, 0, 0, 0x05).is_err());
    }
}
