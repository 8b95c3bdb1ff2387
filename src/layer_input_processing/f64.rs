//! Module for convenient handling of primitive [`f64`] types.
//!
//! In a nutshell, this exports restricted type wrappers around [`f64`] values
//! with certain guarantees to be valid numbers: capture timestamps and the
//! levelset fraction.

use core::cmp::Ordering;
use core::fmt::{Display, Formatter};
use core::ops::RangeInclusive;
use thiserror::Error;

/// The underlying value is not valid, i.e., not finite or not in a finite
/// range.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InvalidF64Error {
    #[error("value is not a number (NaN)")]
    NAN,
    #[error("value is infinite")]
    Infinite,
    #[error("finite value {0} is not in finite range {1:?}")]
    NotInRange(f64 /* finite */, RangeInclusive<f64>),
}

/// A finite f64 that is [`Ord`] and [`Eq`].
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
struct FiniteF64(f64 /* finite: not NaN or infinite */);

impl Ord for FiniteF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Eq for FiniteF64 {}

impl TryFrom<f64> for FiniteF64 {
    type Error = InvalidF64Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_nan() {
            Err(InvalidF64Error::NAN)
        } else if value.is_infinite() {
            Err(InvalidF64Error::Infinite)
        } else {
            assert!(value.is_finite());
            // -0.0 and 0.0 must be the same key.
            Ok(Self(value + 0.0))
        }
    }
}

fn f64_is_finite_and_in_range(
    value: f64,
    range: RangeInclusive<f64>,
) -> Result<FiniteF64, InvalidF64Error> {
    let finite_f64 = FiniteF64::try_from(value)?;
    if range.contains(&finite_f64.0) {
        Ok(finite_f64)
    } else {
        Err(InvalidF64Error::NotInRange(value, range))
    }
}

/// A capture timestamp in range `0.0..Infinity` (seconds).
///
/// Being [`Ord`], this is usable as a key in ordered maps.
#[derive(Copy, Clone, Debug, PartialOrd, PartialEq, Ord, Eq)]
#[repr(transparent)]
pub struct Seconds(FiniteF64);

impl Seconds {
    const VALID_RANGE: RangeInclusive<f64> = 0.0..=f64::MAX;

    /// Returns the underlying raw value.
    pub const fn raw(self) -> f64 {
        self.0 .0
    }

    /// Absolute distance to another timestamp in seconds.
    pub fn abs_diff(self, other: Self) -> f64 {
        libm::fabs(self.raw() - other.raw())
    }
}

impl TryFrom<f64> for Seconds {
    type Error = InvalidF64Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        f64_is_finite_and_in_range(value, Self::VALID_RANGE).map(Self)
    }
}

impl Display for Seconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}s", self.raw())
    }
}

/// The fraction of "most typical" frames used to build the filtered
/// contraction signal. Range `0.0..=1.0`.
///
/// User interfaces typically expose this as percentage, see
/// [`Self::from_percent`].
#[derive(Copy, Clone, Debug, Default, PartialOrd, PartialEq)]
#[repr(transparent)]
pub struct LevelsetFraction(f64);

impl LevelsetFraction {
    const VALID_RANGE: RangeInclusive<f64> = 0.0..=1.0;

    /// Disables the levelset filter; the raw signal is used directly.
    pub const ZERO: Self = Self(0.0);

    /// Creates the fraction from a percentage in range `0.0..=100.0`.
    pub fn from_percent(pct: f32) -> Result<Self, InvalidF64Error> {
        match Self::try_from(f64::from(pct) / 100.0) {
            Err(InvalidF64Error::NotInRange(..)) => Err(InvalidF64Error::NotInRange(
                f64::from(pct),
                0.0..=100.0,
            )),
            other => other,
        }
    }

    /// Returns the underlying raw value.
    pub const fn raw(self) -> f64 {
        self.0
    }

    /// Returns the fraction as percentage.
    pub fn percent(self) -> f32 {
        (self.0 * 100.0) as f32
    }

    /// Number of frames `K = floor(n * fraction)` this fraction selects out of
    /// `n` frames.
    pub fn count_of(self, n: usize) -> usize {
        libm::floor(n as f64 * self.0) as usize
    }
}

impl TryFrom<f64> for LevelsetFraction {
    type Error = InvalidF64Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        f64_is_finite_and_in_range(value, Self::VALID_RANGE).map(|v| Self(v.0))
    }
}

impl Display for LevelsetFraction {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn test_type_f64_finite() {
        assert_eq!(FiniteF64::try_from(0.0), Ok(FiniteF64(0.0)));
        assert_eq!(FiniteF64::try_from(-42.0), Ok(FiniteF64(-42.0)));
        assert_eq!(FiniteF64::try_from(f64::NAN), Err(InvalidF64Error::NAN));
        assert_eq!(
            FiniteF64::try_from(f64::INFINITY),
            Err(InvalidF64Error::Infinite)
        );
        assert_eq!(
            FiniteF64::try_from(-0.0).unwrap().cmp(&FiniteF64::try_from(0.0).unwrap()),
            Ordering::Equal
        );
    }

    #[test]
    fn test_type_seconds() {
        assert_eq!(Seconds::try_from(f64::NAN), Err(InvalidF64Error::NAN));
        assert_eq!(
            Seconds::try_from(-0.5),
            Err(InvalidF64Error::NotInRange(-0.5, Seconds::VALID_RANGE))
        );
        let a = Seconds::try_from(0.1).unwrap();
        let b = Seconds::try_from(0.05).unwrap();
        check!(b < a);
        check!(a.raw() == 0.1);
        check!(a.abs_diff(b) == 0.05);
    }

    #[test]
    fn test_type_levelset_fraction() {
        check!(LevelsetFraction::try_from(1.1).is_err());
        check!(LevelsetFraction::try_from(-0.1).is_err());
        check!(LevelsetFraction::from_percent(101.0).is_err());

        let frac = LevelsetFraction::from_percent(50.0).unwrap();
        check!(frac.raw() == 0.5);
        check!(frac.percent() == 50.0);
        check!(frac.count_of(7) == 3);
        check!(LevelsetFraction::ZERO.count_of(100) == 0);
        check!(LevelsetFraction::try_from(0.4).unwrap().count_of(5) == 2);
    }
}
