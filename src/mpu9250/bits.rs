// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use bitfield::bitfield;

/// A contiguous run of bits `[start, start + len)` inside one register byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpan {
    start: u8,
    len: u8,
}

impl BitSpan {
    /// Creates a span. Panics (at compile time when used in a `const`) if the span does not fit in
    /// a byte or is empty.
    pub const fn new(start: u8, len: u8) -> Self {
        assert!(len > 0 && start + len <= 8, "bit span must fit in one byte");
        BitSpan { start, len }
    }

    /// Creates a span, returning `None` if it does not fit in a byte or is empty.
    pub const fn try_new(start: u8, len: u8) -> Option<Self> {
        if len > 0 && start < 8 && len <= 8 - start {
            Some(BitSpan { start, len })
        } else {
            None
        }
    }

    /// A single bit.
    pub const fn bit(position: u8) -> Self {
        BitSpan::new(position, 1)
    }

    /// Lowest bit position of the span.
    pub const fn start(&self) -> u8 {
        self.start
    }

    /// Width of the span in bits.
    pub const fn len(&self) -> u8 {
        self.len
    }

    /// Mask of the field once right aligned, e.g. `0b111` for a 3-bit span.
    pub const fn field_mask(&self) -> u8 {
        ((1u16 << self.len) - 1) as u8
    }

    /// Mask of the span in register position.
    pub const fn mask(&self) -> u8 {
        self.field_mask() << self.start
    }
}

/// Returns `value` with the bits in `span` replaced by the low `span.len()` bits of `bits`.
/// All bits outside `span` are left as they were.
pub const fn set_bits(value: u8, span: BitSpan, bits: u8) -> u8 {
    (value & !span.mask()) | ((bits & span.field_mask()) << span.start)
}

/// Extracts the bits in `span` and right aligns them.
pub const fn get_bits(value: u8, span: BitSpan) -> u8 {
    (value & span.mask()) >> span.start
}

/// Order of the two bytes that make up one 16 bit sample inside a register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first (MPU-9250 accel, temp and gyro blocks).
    BigEndian,
    /// Least significant byte first (AK8963 axis block).
    LittleEndian,
}

impl ByteOrder {
    /// Decodes one two's-complement 16 bit value from a byte pair in transaction order.
    pub const fn decode(self, pair: [u8; 2]) -> i16 {
        match self {
            ByteOrder::BigEndian => i16::from_be_bytes(pair),
            ByteOrder::LittleEndian => i16::from_le_bytes(pair),
        }
    }

    /// Decodes three consecutive axis values from the first six bytes of `bytes`.
    pub fn decode_axes(self, bytes: &[u8]) -> [i16; 3] {
        let mut out = [0; 3];
        for (axis, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
            *axis = self.decode([pair[0], pair[1]]);
        }
        out
    }
}

bitfield! {
    /// bitfields of the MPU-9250 PWR_MGMT_1 register
    pub struct PwrMgmt1(u8);
    impl Debug;
    /// reset the internal registers and restore the default settings
    pub h_reset, set_h_reset: 7;
    /// put the chip into sleep mode
    pub sleep, set_sleep: 6;
    /// clock source select
    pub u8, clksel, set_clksel: 2, 0;
}

bitfield! {
    /// bitfields of the MPU-9250 INT_PIN_CFG register
    pub struct IntPinCfg(u8);
    impl Debug;
    /// active low logic level for the INT pin
    pub actl, set_actl: 7;
    /// INT pin is held active until cleared
    pub latch_int_en, set_latch_int_en: 5;
    /// set the auxiliary i2c pins to bypass mode when the i2c master is disabled
    pub bypass_en, set_bypass_en: 1;
}

bitfield! {
    /// bitfields of the AK8963 ST1 register
    pub struct St1(u8);
    impl Debug;
    /// data overrun, a sample was skipped
    pub dor, _: 1;
    /// data ready
    pub drdy, _: 0;
}

bitfield! {
    /// bitfields of the AK8963 ST2 register
    pub struct St2(u8);
    impl Debug;
    /// output bit setting mirror, true = 16 bit
    pub bitm, _: 4;
    /// magnetic sensor overflow
    pub hofl, _: 3;
}

// Configuration fields written through read-modify-write.
pub(crate) const PWR_MGMT_1_H_RESET: BitSpan = BitSpan::bit(7);
pub(crate) const PWR_MGMT_1_SLEEP: BitSpan = BitSpan::bit(6);
pub(crate) const PWR_MGMT_1_CLKSEL: BitSpan = BitSpan::new(0, 3);
pub(crate) const I2C_MST_CTRL_CLK: BitSpan = BitSpan::new(0, 4);
pub(crate) const GYRO_CONFIG_FS_SEL: BitSpan = BitSpan::new(3, 2);
pub(crate) const ACCEL_CONFIG_FS_SEL: BitSpan = BitSpan::new(3, 2);
pub(crate) const USER_CTRL_I2C_MST_EN: BitSpan = BitSpan::bit(5);
pub(crate) const INT_PIN_CFG_BYPASS_EN: BitSpan = BitSpan::bit(1);
pub(crate) const CNTL1_MODE: BitSpan = BitSpan::new(0, 4);
pub(crate) const CNTL1_BIT: BitSpan = BitSpan::bit(4);
