use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::ProgramError;

/// Largest result `pow` will build, in bits of numerator or denominator.
pub const MAX_POW_BITS: u64 = 1 << 20;

/// An exact number. Literals like `0.1` are read as the exact fraction 1/10,
/// so `(+ 0.1 0.2)` is exactly `0.3` and `(/ 1 3)` is exactly one third.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(BigRational);

impl Number {
    pub fn from_i64(n: i64) -> Self {
        Number(BigRational::from_integer(BigInt::from(n)))
    }

    pub fn from_ratio(numer: i64, denom: i64) -> Self {
        Number(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    /// Whether `text` is a numeric literal: an optional sign followed by
    /// `digits`, `digits.`, `digits.digits` or `.digits`. At least one digit is
    /// required, so `""`, `"+"` and `"."` are not numbers.
    pub fn is_literal(text: &str) -> bool {
        split_literal(text).is_some()
    }

    /// Parse a numeric literal exactly.
    pub fn parse_literal(text: &str) -> Option<Number> {
        let (negative, int_part, frac_part) = split_literal(text)?;
        let digits = format!("{int_part}{frac_part}");
        let mut numer = BigInt::parse_bytes(digits.as_bytes(), 10)?;
        if negative {
            numer = -numer;
        }
        let denom = num_traits::pow(BigInt::from(10u32), frac_part.len());
        Some(Number(BigRational::new(numer, denom)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.0.is_integer() {
            self.0.numer().to_i64()
        } else {
            None
        }
    }

    pub fn neg(&self) -> Number {
        Number(-self.0.clone())
    }

    pub fn add(&self, other: &Number) -> Number {
        Number(&self.0 + &other.0)
    }

    pub fn sub(&self, other: &Number) -> Number {
        Number(&self.0 - &other.0)
    }

    pub fn mul(&self, other: &Number) -> Number {
        Number(&self.0 * &other.0)
    }

    pub fn div(&self, other: &Number) -> Result<Number, ProgramError> {
        if other.is_zero() {
            return Err(ProgramError::DivisionByZero);
        }
        Ok(Number(&self.0 / &other.0))
    }

    /// Remainder with the sign of the dividend: `a - b * trunc(a / b)`.
    pub fn rem(&self, other: &Number) -> Result<Number, ProgramError> {
        if other.is_zero() {
            return Err(ProgramError::DivisionByZero);
        }
        let quotient = (&self.0 / &other.0).trunc();
        Ok(Number(&self.0 - &other.0 * quotient))
    }

    pub fn pow(&self, exponent: &Number) -> Result<Number, ProgramError> {
        let exp = exponent
            .to_i64()
            .and_then(|e| i32::try_from(e).ok())
            .ok_or_else(|| ProgramError::type_error("integer exponent", exponent.to_string()))?;
        if exp < 0 && self.is_zero() {
            return Err(ProgramError::DivisionByZero);
        }
        let bits = self.0.numer().bits().max(self.0.denom().bits());
        if bits > 1 && (bits - 1).saturating_mul(exp.unsigned_abs() as u64) > MAX_POW_BITS {
            return Err(ProgramError::eval(format!(
                "{self} ** {exp} exceeds {MAX_POW_BITS} bits"
            )));
        }
        Ok(Number(self.0.pow(exp)))
    }

    /// Fixed-point rendering with `places` fractional digits, rounding half to even.
    pub fn to_fixed(&self, places: usize) -> String {
        let scale = BigRational::from_integer(num_traits::pow(BigInt::from(10u32), places));
        let scaled = &self.0 * scale;
        let floor = scaled.floor();
        let frac = &scaled - &floor;
        let half = BigRational::new(BigInt::one(), BigInt::from(2u32));
        let mut rounded = floor.to_integer();
        if frac > half || (frac == half && !(&rounded % BigInt::from(2u32)).is_zero()) {
            rounded += BigInt::one();
        }
        insert_point(&rounded, places)
    }
}

fn split_literal(text: &str) -> Option<(bool, &str, &str)> {
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'+') => (false, &text[1..]),
        Some(b'-') => (true, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    Some((negative, int_part, frac_part))
}

/// Render `n / 10^places` as a decimal string.
fn insert_point(n: &BigInt, places: usize) -> String {
    let mut digits = n.abs().to_string();
    if places > 0 && digits.len() <= places {
        digits = format!("{}{digits}", "0".repeat(places + 1 - digits.len()));
    }
    let sign = if n.is_negative() { "-" } else { "" };
    if places == 0 {
        return format!("{sign}{digits}");
    }
    let (whole, frac) = digits.split_at(digits.len() - places);
    format!("{sign}{whole}.{frac}")
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::from_i64(n)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_integer() {
            return write!(f, "{}", self.0.numer());
        }
        // A reduced fraction has a finite decimal expansion iff its
        // denominator has no prime factors other than 2 and 5.
        let two = BigInt::from(2u32);
        let five = BigInt::from(5u32);
        let mut rest = self.0.denom().clone();
        let (mut twos, mut fives) = (0usize, 0usize);
        while (&rest % &two).is_zero() {
            rest /= &two;
            twos += 1;
        }
        while (&rest % &five).is_zero() {
            rest /= &five;
            fives += 1;
        }
        if !rest.is_one() {
            return write!(f, "{}/{}", self.0.numer(), self.0.denom());
        }
        let places = twos.max(fives);
        let scale = num_traits::pow(BigInt::from(10u32), places);
        let scaled = self.0.numer() * scale / self.0.denom();
        f.write_str(&insert_point(&scaled, places))
    }
}
