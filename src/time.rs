//! Time-related types based on the DW3xxx's system time
//!
//! All time stamps of the chip are 40-bit counts of device time units (DTU).
//! One DTU is 1/(128 * 499.2 MHz), roughly 15.65 ps. The counter wraps after
//! about 17.2 s.

use core::ops::{Add, Sub};

#[cfg(feature = "defmt")]
use defmt::Format;

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Device time units per UWB microsecond (512 / 499.2 MHz, about 1.0256 us)
///
/// Timeouts and response delays are programmed in this unit.
pub const DTU_PER_UUS: u64 = 65536;

/// Represents an instant in time
///
/// You can get the current system time by calling [`DW3000::sys_time`].
///
/// Internally uses the same 40-bit timestamps that the chip uses.
///
/// [`DW3000::sys_time`]: ../hl/struct.DW3000.html#method.sys_time
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// Returns `None` if `value` does not fit in 40 bits.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw3xxx_uwb::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// assert!(Instant::new(TIME_MAX).is_some());
    /// assert!(Instant::new(TIME_MAX + 1).is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Builds an instant from the 5 little-endian bytes of a time stamp
    /// register
    pub fn from_le_bytes(bytes: [u8; 5]) -> Self {
        let mut raw = [0; 8];
        raw[..5].copy_from_slice(&bytes);
        Instant(u64::from_le_bytes(raw))
    }

    /// Keeps the low 40 bits of a register value
    pub(crate) fn from_register(value: u64) -> Self {
        Instant(value & TIME_MAX)
    }

    /// Returns the raw 40-bit timestamp
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The upper 32 bits, as programmed into DX_TIME
    ///
    /// The chip ignores the low 9 bits of a delayed start time, so the
    /// effective start is this value shifted left by 8 with bit 8 cleared.
    pub fn hi32(&self) -> u32 {
        (self.0 >> 8) as u32
    }

    /// The lower 32 bits
    pub fn lo32(&self) -> u32 {
        self.0 as u32
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `self` is the later time. Time stamps wrap around, so a
    /// numerically smaller `self` is taken as having wrapped.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw3xxx_uwb::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// let before_wrap = Instant::new(TIME_MAX).unwrap();
    /// let after_wrap = Instant::new(49).unwrap();
    ///
    /// assert_eq!(after_wrap.duration_since(before_wrap).value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.wrapping_sub(earlier.0) & TIME_MAX)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        Instant((self.0 + rhs.0) & TIME_MAX)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Self::Output {
        Instant(self.0.wrapping_sub(rhs.0) & TIME_MAX)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.duration_since(rhs)
    }
}

/// A duration between two instants in device time
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// Returns `None` if `value` does not fit in 40 bits.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates a `Duration` from nanoseconds, rounding to the nearest unit
    ///
    /// One nanosecond is 63.8976 device time units.
    pub fn from_nanos(nanos: u32) -> Self {
        // At most 32 + 20 bits, well inside 40 bits.
        Duration((nanos as u64 * 638976 + 5000) / 10000)
    }

    /// Creates a `Duration` from a 16-bit register value, such as an antenna
    /// delay
    pub fn from_dtu(value: u16) -> Self {
        Duration(value as u64)
    }

    /// Creates a `Duration` from UWB microseconds (1.0256 us)
    pub fn from_uus(uus: u32) -> Self {
        Duration((uus as u64 * DTU_PER_UUS) & TIME_MAX)
    }

    /// Returns the raw 40-bit value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whole UWB microseconds in this duration
    pub fn as_uus(&self) -> u32 {
        (self.0 / DTU_PER_UUS) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_arithmetic_wraps() {
        let start = Instant::new(TIME_MAX - 1).unwrap();
        let later = start + Duration::new(3).unwrap();

        assert_eq!(later.value(), 1);
        assert_eq!((later - Duration::new(2).unwrap()).value(), TIME_MAX);
        assert_eq!((later - start).value(), 3);
    }

    #[test]
    fn duration_from_nanos() {
        assert_eq!(Duration::from_nanos(1).value(), 64);
        assert_eq!(Duration::from_nanos(6).value(), 383);
    }

    #[test]
    fn uus_conversion() {
        let d = Duration::from_uus(700);
        assert_eq!(d.value(), 700 * 65536);
        assert_eq!(d.as_uus(), 700);
    }

    #[test]
    fn split_words() {
        let t = Instant::from_le_bytes([0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(t.value(), 0x55_4433_2211);
        assert_eq!(t.hi32(), 0x5544_3322);
        assert_eq!(t.lo32(), 0x4433_2211);
    }
}
