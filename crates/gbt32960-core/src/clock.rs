//! Injectable time source for response construction.
//!
//! Acknowledgement packets carry the terminal's current local time as six
//! BCD-style bytes.  Reading the wall clock inside the packet model would make
//! [`crate::Packet::make_response`] impossible to test deterministically, so the
//! time is supplied through the [`Clock`] trait instead.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

/// A source of the current local date and time.
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    /// Returns the current local time.
    fn now(&self) -> NaiveDateTime;
}

/// Reads the operating system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the wrapped instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Encodes `time` as `YYMMDDHHMMSS`, one byte per two-digit pair.
///
/// Each decimal pair is written as the byte whose hexadecimal digits are the
/// decimal digits, e.g. the 25th day becomes `0x25`, not `0x19`.
///
/// # Examples
///
/// ```rust
/// use chrono::NaiveDate;
/// use gbt32960_core::bcd_timestamp;
///
/// let t = NaiveDate::from_ymd_opt(2019, 7, 25).unwrap().and_hms_opt(18, 0, 9).unwrap();
/// assert_eq!(bcd_timestamp(&t), [0x19, 0x07, 0x25, 0x18, 0x00, 0x09]);
/// ```
pub fn bcd_timestamp(time: &NaiveDateTime) -> [u8; 6] {
    [
        to_bcd(time.year().rem_euclid(100) as u32),
        to_bcd(time.month()),
        to_bcd(time.day()),
        to_bcd(time.hour()),
        to_bcd(time.minute()),
        to_bcd(time.second()),
    ]
}

/// Packs a value in `0..=99` into one byte of two decimal nibbles.
fn to_bcd(value: u32) -> u8 {
    (((value / 10) << 4) | (value % 10)) as u8
}
