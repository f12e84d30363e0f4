// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use embedded_hal::delay::DelayNs;

use crate::mpu9250::bits::{
    IntPinCfg, PwrMgmt1, ACCEL_CONFIG_FS_SEL, GYRO_CONFIG_FS_SEL, I2C_MST_CTRL_CLK,
    INT_PIN_CFG_BYPASS_EN, PWR_MGMT_1_CLKSEL, PWR_MGMT_1_H_RESET, PWR_MGMT_1_SLEEP,
    USER_CTRL_I2C_MST_EN,
};
use crate::mpu9250::bus::RegisterBus;
use crate::mpu9250::config::{AccelRange, ClockSource, GyroRange, I2cMasterClock, Mpu9250Config};
use crate::mpu9250::mag::Ak8963;
use crate::mpu9250::stream::{self, CancelToken, StreamReport};
use crate::mpu9250::{
    convert_temp, DeviceState, Motion6, Motion9, MpuError, Register, IMU_BYTE_ORDER,
    MPU9250_WHO_AM_I, SETTLE_MS,
};

/// The MPU-9250 driver. Instantiate this struct in your application code then use it to interact
/// with the IMU.
///
/// `bus` talks to the MPU-9250 itself, `mag_bus` to the AK8963 address on the same bus. The
/// magnetometer driver is only built once bypass mode has been confirmed during [`Mpu9250::init`].
pub struct Mpu9250<BUS> {
    bus: BUS,
    mag_bus: Option<BUS>,
    mag: Option<Ak8963<BUS>>,
    config: Mpu9250Config,
    state: DeviceState,
}

impl<BUS: RegisterBus> Mpu9250<BUS> {
    /// Create a new, uninitialized IMU driver.
    pub fn new(bus: BUS, mag_bus: BUS, config: Mpu9250Config) -> Self {
        Mpu9250 {
            bus,
            mag_bus: Some(mag_bus),
            mag: None,
            config,
            state: DeviceState::Uninitialized,
        }
    }

    /// Reset and configure the IMU, then bring up the magnetometer through bypass mode.
    ///
    /// The steps run in a fixed order since later fields assume the earlier ones are set. Any
    /// failure on the MPU-9250 leaves the driver in [`DeviceState::Failed`]. A magnetometer that
    /// cannot be reached or initialized does not fail the IMU; [`Mpu9250::mag`] reports it.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), MpuError<BUS::Error>> {
        match self.state {
            DeviceState::Ready => return Ok(()),
            DeviceState::Failed => return Err(MpuError::DeviceFailed),
            _ => {}
        }

        self.state = DeviceState::Configuring;
        match self.configure(delay) {
            Ok(()) => {
                self.state = DeviceState::Ready;
                log_info!("MPU-9250 ready");
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Failed;
                log_error!("MPU-9250 init failed: {}", e);
                Err(e)
            }
        }
    }

    fn configure<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), MpuError<BUS::Error>> {
        self.reset()?;
        delay.delay_ms(SETTLE_MS);
        log_debug!("reset device");

        self.set_i2c_master_clock(self.config.i2c_master_clock)?;
        log_debug!("set i2c master clock {}", self.config.i2c_master_clock.code());
        self.set_gyro_range(self.config.gyro_range)?;
        log_debug!("set gyro range {}", self.config.gyro_range.code());
        self.set_accel_range(self.config.accel_range)?;
        log_debug!("set accel range {}", self.config.accel_range.code());
        self.set_clock_source(self.config.clock_source)?;
        log_debug!("set clock source {}", self.config.clock_source.code());
        self.set_sleep(false)?;
        delay.delay_ms(SETTLE_MS);
        log_debug!("woke device");

        let wai = self.wai()?;
        if wai != MPU9250_WHO_AM_I {
            return Err(MpuError::IdentityMismatch {
                device: self.bus.address(),
                expected: MPU9250_WHO_AM_I,
                found: wai,
            });
        }

        if !self.enable_mag(delay)? {
            log_warn!("magnetometer unavailable");
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// True once `init` has completed.
    pub fn is_ready(&self) -> bool {
        self.state == DeviceState::Ready
    }

    /// The configuration in effect.
    pub fn config(&self) -> Mpu9250Config {
        self.config
    }

    /// The magnetometer driver, if bypass mode came up.
    pub fn mag(&mut self) -> Option<&mut Ak8963<BUS>> {
        self.mag.as_mut()
    }

    /// Who Am I? Reads the wai register and reports the value.
    ///
    /// Useful for testing that the IMU is properly connected. Expected value is [`MPU9250_WHO_AM_I`].
    pub fn wai(&mut self) -> Result<u8, MpuError<BUS::Error>> {
        self.bus.read_byte(Register::WhoAmI.addr())
    }

    /// Sets the reset bit. All registers return to their defaults and the chip goes to sleep.
    /// Wait [`SETTLE_MS`] before talking to it again.
    pub fn reset(&mut self) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::PwrMgmt1.addr(), PWR_MGMT_1_H_RESET, 1)?;
        Ok(())
    }

    /// Puts the chip to sleep or wakes it.
    pub fn set_sleep(&mut self, sleep: bool) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::PwrMgmt1.addr(), PWR_MGMT_1_SLEEP, sleep as u8)?;
        Ok(())
    }

    /// True if the sleep bit is set.
    pub fn is_sleeping(&mut self) -> Result<bool, MpuError<BUS::Error>> {
        let pwr = PwrMgmt1(self.bus.read_byte(Register::PwrMgmt1.addr())?);
        Ok(pwr.sleep())
    }

    /// Selects the clock source.
    pub fn set_clock_source(&mut self, source: ClockSource) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::PwrMgmt1.addr(), PWR_MGMT_1_CLKSEL, source.code())?;
        self.config.clock_source = source;
        Ok(())
    }

    /// Sets the clock divider of the auxiliary I2C master.
    pub fn set_i2c_master_clock(
        &mut self,
        clock: I2cMasterClock,
    ) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::I2cMstCtrl.addr(), I2C_MST_CTRL_CLK, clock.code())?;
        self.config.i2c_master_clock = clock;
        Ok(())
    }

    /// Enables or disables the auxiliary I2C master. It has to be off for bypass mode.
    pub fn set_i2c_master_enable(&mut self, enable: bool) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::UserCtrl.addr(), USER_CTRL_I2C_MST_EN, enable as u8)?;
        Ok(())
    }

    /// Sets the sensitivity of the gyro.
    pub fn set_gyro_range(&mut self, range: GyroRange) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::GyroConfig.addr(), GYRO_CONFIG_FS_SEL, range.code())?;
        self.config.gyro_range = range;
        Ok(())
    }

    /// Sets the sensitivity of the accelerometer.
    pub fn set_accel_range(&mut self, range: AccelRange) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::AccelConfig.addr(), ACCEL_CONFIG_FS_SEL, range.code())?;
        self.config.accel_range = range;
        Ok(())
    }

    /// Turns bypass mode on or off.
    pub fn set_bypass(&mut self, enable: bool) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(Register::IntPinCfg.addr(), INT_PIN_CFG_BYPASS_EN, enable as u8)?;
        Ok(())
    }

    /// Reads back the bypass bit.
    pub fn bypass_enabled(&mut self) -> Result<bool, MpuError<BUS::Error>> {
        Ok(IntPinCfg(self.bypass_register()?).bypass_en())
    }

    /// Raw INT_PIN_CFG register.
    pub fn bypass_register(&mut self) -> Result<u8, MpuError<BUS::Error>> {
        self.bus.read_byte(Register::IntPinCfg.addr())
    }

    /// Disables the I2C master and turns on bypass mode so the AK8963 shows up on the host bus.
    /// The magnetometer driver is built and initialized once the bypass bit reads back as set.
    ///
    /// Returns true if a ready magnetometer is available afterwards.
    pub fn enable_mag<D: DelayNs>(&mut self, delay: &mut D) -> Result<bool, MpuError<BUS::Error>> {
        self.set_i2c_master_enable(false)?;
        self.set_bypass(true)?;

        if !self.bypass_enabled()? {
            log_error!("bypass bit did not stick");
            return Ok(false);
        }

        if let Some(mag_bus) = self.mag_bus.take() {
            log_debug!("init magnetometer");
            let mut mag = Ak8963::new(mag_bus, self.config.mag);
            // a failed magnetometer keeps its Failed state for the caller to inspect
            let _ = mag.init(delay);
            self.mag = Some(mag);
        }

        Ok(self.mag.as_ref().map_or(false, |m| m.is_ready()))
    }

    /// Reads all three accelerometer values, raw LSB. Zeros if the driver is not ready.
    pub fn read_accel(&mut self) -> Result<[i16; 3], MpuError<BUS::Error>> {
        self.read_axes(Register::AccelXOutH)
    }

    /// Reads all three gyro values, raw LSB. Zeros if the driver is not ready.
    pub fn read_gyro(&mut self) -> Result<[i16; 3], MpuError<BUS::Error>> {
        self.read_axes(Register::GyroXOutH)
    }

    fn read_axes(&mut self, base: Register) -> Result<[i16; 3], MpuError<BUS::Error>> {
        if !self.is_ready() {
            return Ok([0; 3]);
        }
        let buf = self.bus.write_read(base.addr(), 6)?;
        Ok(IMU_BYTE_ORDER.decode_axes(&buf))
    }

    /// Reads the accelerometer in g's, scaled by the configured range.
    pub fn read_accel_g(&mut self) -> Result<[f32; 3], MpuError<BUS::Error>> {
        let sen = self.config.accel_range.sensitivity();
        Ok(self.read_accel()?.map(|v| v as f32 / sen))
    }

    /// Reads the gyro in degrees per second, scaled by the configured range.
    pub fn read_gyro_dps(&mut self) -> Result<[f32; 3], MpuError<BUS::Error>> {
        let sen = self.config.gyro_range.sensitivity();
        Ok(self.read_gyro()?.map(|v| v as f32 / sen))
    }

    /// Read the temperature sensor.
    ///
    /// Returns the temperature in Celsius, or 0 if the driver is not ready.
    pub fn read_temp(&mut self) -> Result<f32, MpuError<BUS::Error>> {
        if !self.is_ready() {
            return Ok(0.0);
        }
        let buf = self.bus.write_read(Register::TempOutH.addr(), 2)?;
        let raw = match buf.as_slice() {
            [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
            _ => 0,
        };
        Ok(convert_temp(raw))
    }

    /// Reads accelerometer and gyro in one 14 byte burst. The temperature bytes in between are
    /// skipped.
    pub fn read_motion6(&mut self) -> Result<Motion6, MpuError<BUS::Error>> {
        if !self.is_ready() {
            return Ok(Motion6::default());
        }
        let buf = self.bus.write_read(Register::AccelXOutH.addr(), 14)?;
        Ok(Motion6 {
            accel: IMU_BYTE_ORDER.decode_axes(buf.get(0..6).unwrap_or_default()),
            gyro: IMU_BYTE_ORDER.decode_axes(buf.get(8..14).unwrap_or_default()),
        })
    }

    /// Reads accelerometer, gyro and, if present, the magnetometer.
    pub fn read_motion9(&mut self) -> Result<Motion9, MpuError<BUS::Error>> {
        if !self.is_ready() {
            return Ok(Motion9::default());
        }
        let motion = self.read_motion6()?;
        let mag = match self.mag.as_mut() {
            Some(mag) => mag.read_mag()?,
            None => [0.0; 3],
        };
        Ok(Motion9 {
            accel: motion.accel,
            gyro: motion.gyro,
            mag,
        })
    }

    /// Streams accelerometer samples every `period_ms` until `cancel` is set. Blocks the calling
    /// thread; does nothing if the driver is not ready.
    pub fn stream_accel<D, F>(
        &mut self,
        delay: &mut D,
        period_ms: u32,
        cancel: &CancelToken,
        on_sample: F,
    ) -> StreamReport
    where
        D: DelayNs,
        F: FnMut([i16; 3]),
    {
        if !self.is_ready() {
            return StreamReport::default();
        }
        stream::run(delay, period_ms, cancel, || self.read_accel(), on_sample)
    }

    /// Streams gyro samples, see [`Mpu9250::stream_accel`].
    pub fn stream_gyro<D, F>(
        &mut self,
        delay: &mut D,
        period_ms: u32,
        cancel: &CancelToken,
        on_sample: F,
    ) -> StreamReport
    where
        D: DelayNs,
        F: FnMut([i16; 3]),
    {
        if !self.is_ready() {
            return StreamReport::default();
        }
        stream::run(delay, period_ms, cancel, || self.read_gyro(), on_sample)
    }

    /// Streams temperature samples, see [`Mpu9250::stream_accel`].
    pub fn stream_temp<D, F>(
        &mut self,
        delay: &mut D,
        period_ms: u32,
        cancel: &CancelToken,
        on_sample: F,
    ) -> StreamReport
    where
        D: DelayNs,
        F: FnMut(f32),
    {
        if !self.is_ready() {
            return StreamReport::default();
        }
        stream::run(delay, period_ms, cancel, || self.read_temp(), on_sample)
    }

    /// Streams 9-axis samples, see [`Mpu9250::stream_accel`].
    pub fn stream_motion9<D, F>(
        &mut self,
        delay: &mut D,
        period_ms: u32,
        cancel: &CancelToken,
        on_sample: F,
    ) -> StreamReport
    where
        D: DelayNs,
        F: FnMut(Motion9),
    {
        if !self.is_ready() {
            return StreamReport::default();
        }
        stream::run(delay, period_ms, cancel, || self.read_motion9(), on_sample)
    }

    /// Consumes the driver and returns the bus handles: the IMU's and, if it was not lost, the
    /// magnetometer's.
    pub fn release(self) -> (BUS, Option<BUS>) {
        let mag_bus = match self.mag {
            Some(mag) => Some(mag.release()),
            None => self.mag_bus,
        };
        (self.bus, mag_bus)
    }
}

impl<BUS> core::fmt::Debug for Mpu9250<BUS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mpu9250")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("mag", &self.mag.is_some())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<BUS> defmt::Format for Mpu9250<BUS> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "MPU-9250 IMU ({})", self.state)
    }
}
