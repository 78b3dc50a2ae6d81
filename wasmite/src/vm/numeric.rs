//! Numeric instruction semantics that are more than a single Rust operator: trapping integer
//! division, IEEE min/max, round-to-nearest-even and checked float-to-int truncation.

use crate::error::Trap;

macro_rules! int_div {
    ($div_s:ident, $div_u:ident, $rem_s:ident, $rem_u:ident, $s:ty, $u:ty) => {
        pub fn $div_s(a: $s, b: $s) -> Result<$s, Trap> {
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            a.checked_div(b).ok_or(Trap::IntegerOverflow)
        }

        pub fn $div_u(a: $u, b: $u) -> Result<$u, Trap> {
            a.checked_div(b).ok_or(Trap::IntegerDivideByZero)
        }

        /// `MIN % -1` is 0, not a trap.
        pub fn $rem_s(a: $s, b: $s) -> Result<$s, Trap> {
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            Ok(a.wrapping_rem(b))
        }

        pub fn $rem_u(a: $u, b: $u) -> Result<$u, Trap> {
            a.checked_rem(b).ok_or(Trap::IntegerDivideByZero)
        }
    };
}

int_div!(i32_div_s, i32_div_u, i32_rem_s, i32_rem_u, i32, u32);
int_div!(i64_div_s, i64_div_u, i64_rem_s, i64_rem_u, i64, u64);

macro_rules! float_ops {
    ($min:ident, $max:ident, $nearest:ident, $t:ty) => {
        /// NaN if either operand is NaN; `-0 < +0`.
        pub fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                <$t>::NAN
            } else if a == b {
                if a.is_sign_negative() {
                    a
                } else {
                    b
                }
            } else {
                a.min(b)
            }
        }

        pub fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                <$t>::NAN
            } else if a == b {
                if a.is_sign_positive() {
                    a
                } else {
                    b
                }
            } else {
                a.max(b)
            }
        }

        pub fn $nearest(a: $t) -> $t {
            a.round_ties_even()
        }
    };
}

float_ops!(f32_min, f32_max, f32_nearest, f32);
float_ops!(f64_min, f64_max, f64_nearest, f64);

/// Truncate toward zero, trapping on NaN or when the result falls outside `(lo, hi)`.
/// Bounds are exclusive and exact in f64 for every target width.
fn trunc_checked(v: f64, lo: f64, hi: f64) -> Result<f64, Trap> {
    if v.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    if v <= lo || v >= hi {
        return Err(Trap::IntegerOverflow);
    }
    Ok(v.trunc())
}

const TWO_31: f64 = 2147483648.0;
const TWO_32: f64 = 4294967296.0;
const TWO_63: f64 = 9223372036854775808.0;
const TWO_64: f64 = 18446744073709551616.0;

pub fn i32_trunc_s(v: f64) -> Result<i32, Trap> {
    trunc_checked(v, -TWO_31 - 1.0, TWO_31).map(|t| t as i32)
}

pub fn i32_trunc_u(v: f64) -> Result<u32, Trap> {
    trunc_checked(v, -1.0, TWO_32).map(|t| t as u32)
}

pub fn i64_trunc_s(v: f64) -> Result<i64, Trap> {
    if v >= -TWO_63 && v < TWO_63 {
        return Ok(v.trunc() as i64);
    }
    if v.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    Err(Trap::IntegerOverflow)
}

pub fn i64_trunc_u(v: f64) -> Result<u64, Trap> {
    trunc_checked(v, -1.0, TWO_64).map(|t| t as u64)
}
