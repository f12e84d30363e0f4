// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;

use crate::mpu9250::MpuError;

/// Stop signal for a sampling loop.
///
/// Can live in a `static` and be set from an interrupt or another thread. The loop checks it once
/// per cycle, so the loop exits after at most one more sample.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    /// A token that has not been cancelled.
    pub const fn new() -> Self {
        CancelToken {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Requests the loop to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-arms the token so it can drive another loop.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

/// What happened during a sampling loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamReport {
    /// Cycles started
    pub cycles: u32,
    /// Samples handed to the callback
    pub delivered: u32,
    /// Cycles whose bus transaction failed
    pub failed: u32,
}

/// Sample, deliver, wait, until `cancel` is set.
///
/// A failed read is logged and counted, the callback is skipped for that cycle and the loop goes on.
pub fn run<S, E, D, R, F>(
    delay: &mut D,
    period_ms: u32,
    cancel: &CancelToken,
    mut read: R,
    mut on_sample: F,
) -> StreamReport
where
    D: DelayNs,
    R: FnMut() -> Result<S, MpuError<E>>,
    F: FnMut(S),
{
    let mut report = StreamReport::default();

    while !cancel.is_cancelled() {
        report.cycles = report.cycles.saturating_add(1);

        match read() {
            Ok(sample) => {
                on_sample(sample);
                report.delivered = report.delivered.saturating_add(1);
            }
            Err(e) => {
                report.failed = report.failed.saturating_add(1);
                log_warn!("sample cycle {} failed: {}", report.cycles, e);
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        delay.delay_ms(period_ms);
    }

    report
}
