// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use embedded_hal::delay::DelayNs;

use crate::mpu9250::bits::{St1, St2, CNTL1_BIT, CNTL1_MODE};
use crate::mpu9250::bus::RegisterBus;
use crate::mpu9250::config::{Ak8963Config, MagMode, MagOutput};
use crate::mpu9250::stream::{self, CancelToken, StreamReport};
use crate::mpu9250::{
    DeviceState, MagRegister, MpuError, AK8963_WHO_AM_I, MAG_BYTE_ORDER, SETTLE_MS,
};

/// Factory sensitivity adjustment for one axis: `(asa - 128) / 256 + 1`.
///
/// The division is an integer division rounding toward negative infinity, so the coefficient is
/// `0` for bytes below 128 and `1` otherwise. This is the coarse correction the part ships with,
/// not a calibration. Truncating division would give `1` for every byte; with flooring an axis
/// whose byte is below 128 reads as zero.
pub fn sensitivity_adjustment(asa: u8) -> f32 {
    ((asa as i16 - 128).div_euclid(256) + 1) as f32
}

/// The AK8963 driver. Constructed by [`crate::mpu9250::imu::Mpu9250`] once bypass mode is on, or
/// directly if the magnetometer is wired to the host bus.
pub struct Ak8963<BUS> {
    bus: BUS,
    config: Ak8963Config,
    state: DeviceState,
    calibration: [f32; 3],
    last: [f32; 3],
}

impl<BUS: RegisterBus> Ak8963<BUS> {
    /// Create a new, uninitialized magnetometer driver.
    pub fn new(bus: BUS, config: Ak8963Config) -> Self {
        Ak8963 {
            bus,
            config,
            state: DeviceState::Uninitialized,
            calibration: [1.0; 3],
            last: [0.0; 3],
        }
    }

    /// Verify the chip, set the measurement mode and latch the factory sensitivity adjustment.
    ///
    /// Any failure leaves the driver in [`DeviceState::Failed`].
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
                log_info!("AK8963 ready");
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Failed;
                log_error!("AK8963 init failed: {}", e);
                Err(e)
            }
        }
    }

    fn configure<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), MpuError<BUS::Error>> {
        let wia = self.wai()?;
        if wia != AK8963_WHO_AM_I {
            return Err(MpuError::IdentityMismatch {
                device: self.bus.address(),
                expected: AK8963_WHO_AM_I,
                found: wia,
            });
        }
        log_debug!("AK8963 identified");

        self.set_mode(self.config.mode)?;
        self.set_output(self.config.output)?;
        delay.delay_ms(SETTLE_MS);
        log_debug!("AK8963 mode set to {}", self.config.mode.code());

        let asa = self.bus.write_read(MagRegister::Asax.addr(), 3)?;
        for (coef, raw) in self.calibration.iter_mut().zip(asa.iter()) {
            *coef = sensitivity_adjustment(*raw);
        }
        log_debug!(
            "AK8963 sensitivity adjustment: {} {} {}",
            self.calibration[0],
            self.calibration[1],
            self.calibration[2]
        );
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

    /// The per-axis sensitivity adjustment read at init.
    pub fn calibration(&self) -> [f32; 3] {
        self.calibration
    }

    /// The configuration the driver was built with.
    pub fn config(&self) -> Ak8963Config {
        self.config
    }

    /// Reads the WIA register. Expected value is [`AK8963_WHO_AM_I`].
    pub fn wai(&mut self) -> Result<u8, MpuError<BUS::Error>> {
        self.bus.read_byte(MagRegister::Wia.addr())
    }

    /// Writes the operating mode field of CNTL1, keeping the output bit.
    pub fn set_mode(&mut self, mode: MagMode) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(MagRegister::Cntl1.addr(), CNTL1_MODE, mode.code())?;
        self.config.mode = mode;
        Ok(())
    }

    /// Selects 14 or 16 bit output, keeping the mode field.
    pub fn set_output(&mut self, output: MagOutput) -> Result<(), MpuError<BUS::Error>> {
        self.bus
            .modify(MagRegister::Cntl1.addr(), CNTL1_BIT, output.code())?;
        self.config.output = output;
        Ok(())
    }

    /// Raw CNTL1 register.
    pub fn mode_register(&mut self) -> Result<u8, MpuError<BUS::Error>> {
        self.bus.read_byte(MagRegister::Cntl1.addr())
    }

    /// True if a new sample is waiting in the data registers.
    pub fn data_ready(&mut self) -> Result<bool, MpuError<BUS::Error>> {
        let st1 = St1(self.bus.read_byte(MagRegister::St1.addr())?);
        Ok(st1.drdy())
    }

    /// Reads the magnetic field on all three axes, in 0.1 uT.
    ///
    /// The measurement mode is written again before every read since the part falls back to
    /// single-shot after a sample is read out. Samples flagged as overflowed are dropped and the
    /// last good reading is returned instead (zeros before the first one). Returns zeros if the
    /// driver is not ready.
    pub fn read_mag(&mut self) -> Result<[f32; 3], MpuError<BUS::Error>> {
        if !self.is_ready() {
            return Ok([0.0; 3]);
        }

        self.bus
            .modify(MagRegister::Cntl1.addr(), CNTL1_MODE, self.config.mode.code())?;

        // HXL..HZH then ST2, reading ST2 releases the data registers
        let buf = self.bus.write_read(MagRegister::Hxl.addr(), 7)?;
        let st2 = St2(buf.get(6).copied().unwrap_or_default());
        if st2.hofl() {
            log_debug!("AK8963 overflow, sample dropped");
            return Ok(self.last);
        }

        let raw = MAG_BYTE_ORDER.decode_axes(&buf);
        let res = self.config.output.resolution();
        let calibration = self.calibration;
        let out: [f32; 3] = core::array::from_fn(|i| raw[i] as f32 * res * calibration[i]);
        self.last = out;
        Ok(out)
    }

    /// Samples the magnetometer every `period_ms` until `cancel` is set.
    ///
    /// Blocks the calling thread. Does nothing if the driver is not ready.
    pub fn stream<D, F>(
        &mut self,
        delay: &mut D,
        period_ms: u32,
        cancel: &CancelToken,
        on_sample: F,
    ) -> StreamReport
    where
        D: DelayNs,
        F: FnMut([f32; 3]),
    {
        if !self.is_ready() {
            return StreamReport::default();
        }
        stream::run(delay, period_ms, cancel, || self.read_mag(), on_sample)
    }

    /// Consumes the driver and returns the bus handle.
    pub fn release(self) -> BUS {
        self.bus
    }
}
