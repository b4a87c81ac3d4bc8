//! The typed-value tower the evaluator (C6) and variable table (C5) share.
//!
//! Grounded on `fields::OpResult`: a small `Copy` enum with arithmetic and
//! comparison methods attached directly to it, rather than a separate
//! visitor. Strings and arrays add owned/heap-backed variants the teacher's
//! register-width-only `OpResult` never needed.

use crate::error::{BasicError, ErrorKind, Result};
use crate::strings::MAX_STRING;
use std::fmt;

/// One of the five value kinds named in `spec.md` §3 ("Values and
/// variables"); `array` is represented by [`ArrayValue`] and carried inside
/// variable cells rather than on the expression stack (BASIC arrays are not
/// first-class expression values — only element accesses are).
#[derive(Debug, Clone)]
pub enum Value {
    UInt8(u8),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Str(Vec<u8>),
}

/// Contiguous, dimensioned storage for `DIM`, holding up to ten dimensions
/// (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub dims: Vec<u32>,
    pub elements: Vec<Value>,
}

impl ArrayValue {
    pub fn new(dims: Vec<u32>, fill: Value) -> Self {
        let total: u32 = dims.iter().map(|d| d + 1).product();
        ArrayValue { elements: vec![fill; total as usize], dims }
    }

    pub fn index_of(&self, indices: &[u32]) -> Result<usize> {
        if indices.len() != self.dims.len() {
            return Err(BasicError::new(ErrorKind::ArrayIndex, None));
        }
        let mut offset = 0usize;
        for (index, &dim) in indices.iter().zip(self.dims.iter()) {
            if *index > dim {
                return Err(BasicError::new(ErrorKind::ArrayIndex, None));
            }
            offset = offset * (dim as usize + 1) + *index as usize;
        }
        Ok(offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Numeric,
    Str,
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Str(_) => TypeTag::Str,
            _ => TypeTag::Numeric,
        }
    }

    pub fn is_string(&self) -> bool {
        self.type_tag() == TypeTag::Str
    }

    /// Widens to `f64` (used whenever an operation's result type is float,
    /// e.g. `/`, `^`).
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::UInt8(b) => Ok(*b as f64),
            Value::Int32(i) => Ok(*i as f64),
            Value::Int64(i) => Ok(*i as f64),
            Value::Float64(f) => Ok(*f),
            Value::Str(_) => Err(BasicError::new(ErrorKind::TypeNum, None)),
        }
    }

    /// Widens to `i64` for bitwise/`DIV`/`MOD` operators, which demand
    /// integer operands (spec.md §4.6).
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::UInt8(b) => Ok(*b as i64),
            Value::Int32(i) => Ok(*i as i64),
            Value::Int64(i) => Ok(*i),
            Value::Float64(f) => Ok(crate::conversions::trunc_to_i64(*f)),
            Value::Str(_) => Err(BasicError::new(ErrorKind::TypeNum, None)),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Str(bytes) => Ok(bytes),
            _ => Err(BasicError::new(ErrorKind::TypeString, None)),
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, Value::Float64(_))
    }

    /// Mixed int/float promotes to float; int32 promotes to int64 on
    /// overflow in `+ - *` (spec.md §4.6).
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => {
                let mut out = a.clone();
                out.extend_from_slice(b);
                if out.len() as u32 > MAX_STRING {
                    return Err(BasicError::new(ErrorKind::StringLen, None));
                }
                Ok(Value::Str(out))
            }
            (Value::Str(_), _) | (_, Value::Str(_)) => Err(BasicError::new(ErrorKind::TypeMismatch, None)),
            _ if self.is_float() || other.is_float() => Ok(Value::Float64(self.as_f64()? + other.as_f64()?)),
            _ => {
                let (a, b) = (self.as_i64()?, other.as_i64()?);
                match a.checked_add(b) {
                    Some(sum) if i32::try_from(sum).is_ok() && self.fits_int32() && other.fits_int32() => {
                        Ok(Value::Int32(sum as i32))
                    }
                    Some(sum) => Ok(Value::Int64(sum)),
                    None => Ok(Value::Float64(a as f64 + b as f64)),
                }
            }
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        if self.is_string() || other.is_string() {
            return Err(BasicError::new(ErrorKind::TypeMismatch, None));
        }
        if self.is_float() || other.is_float() {
            return Ok(Value::Float64(self.as_f64()? - other.as_f64()?));
        }
        let (a, b) = (self.as_i64()?, other.as_i64()?);
        match a.checked_sub(b) {
            Some(diff) if i32::try_from(diff).is_ok() && self.fits_int32() && other.fits_int32() => {
                Ok(Value::Int32(diff as i32))
            }
            Some(diff) => Ok(Value::Int64(diff)),
            None => Ok(Value::Float64(a as f64 - b as f64)),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        if self.is_string() || other.is_string() {
            return Err(BasicError::new(ErrorKind::TypeMismatch, None));
        }
        if self.is_float() || other.is_float() {
            return Ok(Value::Float64(self.as_f64()? * other.as_f64()?));
        }
        let (a, b) = (self.as_i64()?, other.as_i64()?);
        match a.checked_mul(b) {
            Some(prod) if i32::try_from(prod).is_ok() && self.fits_int32() && other.fits_int32() => {
                Ok(Value::Int32(prod as i32))
            }
            Some(prod) => Ok(Value::Int64(prod)),
            None => Ok(Value::Float64(a as f64 * b as f64)),
        }
    }

    /// `/` always produces float (spec.md §4.6).
    pub fn div(&self, other: &Value) -> Result<Value> {
        let b = other.as_f64()?;
        if b == 0.0 {
            return Err(BasicError::new(ErrorKind::DivZero, None));
        }
        Ok(Value::Float64(self.as_f64()? / b))
    }

    /// `DIV` is integer division.
    pub fn int_div(&self, other: &Value) -> Result<Value> {
        let b = other.as_i64()?;
        if b == 0 {
            return Err(BasicError::new(ErrorKind::DivZero, None));
        }
        Ok(Value::Int64(self.as_i64()? / b))
    }

    /// `MOD` is integer remainder.
    pub fn int_mod(&self, other: &Value) -> Result<Value> {
        let b = other.as_i64()?;
        if b == 0 {
            return Err(BasicError::new(ErrorKind::DivZero, None));
        }
        Ok(Value::Int64(self.as_i64()? % b))
    }

    /// `^`: float power, with an integer fast path when both operands fit
    /// `i32` and the result fits `i64` (spec.md §4.6). `0^0 == 1`; a
    /// negative base with a fractional exponent raises `NegRoot`.
    pub fn pow(&self, other: &Value) -> Result<Value> {
        if let (Value::Int32(_) | Value::UInt8(_), Value::Int32(_) | Value::UInt8(_)) = (self, other) {
            let base = self.as_i64()?;
            let exp = other.as_i64()?;
            if exp >= 0 && exp <= u32::MAX as i64 {
                if let Some(result) = checked_ipow(base, exp as u32) {
                    return Ok(Value::Int64(result));
                }
            }
        }
        let base = self.as_f64()?;
        let exp = other.as_f64()?;
        if base == 0.0 && exp == 0.0 {
            return Ok(Value::Float64(1.0));
        }
        if base < 0.0 && exp.fract() != 0.0 {
            return Err(BasicError::new(ErrorKind::NegRoot, None));
        }
        Ok(Value::Float64(base.powf(exp)))
    }

    fn bitwise(&self, other: &Value, op: impl Fn(i64, i64) -> i64) -> Result<Value> {
        if self.is_string() || other.is_string() || self.is_float() || other.is_float() {
            return Err(BasicError::new(ErrorKind::TypeNum, None));
        }
        Ok(Value::Int64(op(self.as_i64()?, other.as_i64()?)))
    }

    pub fn and(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a & b)
    }
    pub fn or(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a | b)
    }
    pub fn eor(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a ^ b)
    }
    pub fn shl(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a.wrapping_shl(b as u32))
    }
    pub fn shr(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| ((a as u64).wrapping_shr(b as u32)) as i64)
    }
    pub fn ashr(&self, other: &Value) -> Result<Value> {
        self.bitwise(other, |a, b| a.wrapping_shr(b as u32))
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Float64(f) => Ok(Value::Float64(-f)),
            _ => Ok(Value::Int64(-self.as_i64()?)),
        }
    }

    pub fn not(&self) -> Result<Value> {
        Ok(Value::Int64(!self.as_i64()?))
    }

    /// Comparisons: lexicographic on bytes for strings, numeric otherwise
    /// (spec.md §4.6). Returns BASIC's truth encoding, `-1`/`0`.
    pub fn compare(&self, other: &Value, op: CompareOp) -> Result<Value> {
        let truth = match (self, other) {
            (Value::Str(a), Value::Str(b)) => op.apply_ord(a.cmp(b)),
            (Value::Str(_), _) | (_, Value::Str(_)) => return Err(BasicError::new(ErrorKind::TypeMismatch, None)),
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                op.apply_f64(a, b)
            }
        };
        Ok(Value::Int32(if truth { -1 } else { 0 }))
    }

    fn fits_int32(&self) -> bool {
        !matches!(self, Value::Int64(_)) || i32::try_from(self.as_i64().unwrap_or(0)).is_ok()
    }

    pub fn truthy(&self) -> Result<bool> {
        Ok(self.as_i64()? != 0)
    }

    /// The value an unset variable reads as, chosen from its name's type
    /// suffix: `0` for numerics, `""` for `$`-suffixed names (spec.md §4.5).
    pub fn default_for_suffix(name: &str) -> Value {
        if name.ends_with('$') {
            Value::Str(Vec::new())
        } else {
            Value::Int32(0)
        }
    }
}

fn checked_ipow(mut base: i64, mut exp: u32) -> Option<i64> {
    let mut result: i64 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(base)?;
        }
        exp >>= 1;
        if exp > 0 {
            base = base.checked_mul(base)?;
        }
    }
    Some(result)
}

#[derive(Debug, Clone, Copy)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    fn apply_f64(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Gt => a > b,
            CompareOp::Le => a <= b,
            CompareOp::Ge => a >= b,
        }
    }

    fn apply_ord(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match (self, ord) {
            (CompareOp::Eq, Equal) => true,
            (CompareOp::Ne, Equal) => false,
            (CompareOp::Ne, _) => true,
            (CompareOp::Lt, Less) => true,
            (CompareOp::Gt, Greater) => true,
            (CompareOp::Le, Less | Equal) => true,
            (CompareOp::Ge, Greater | Equal) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt8(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(x) => write!(f, "{}", format_basic_float(*x)),
            Value::Str(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// BASIC's default `PRINT` float formatting: up to 9 significant digits,
/// no trailing zeroes, matching the `@%`-governed default format.
pub fn format_basic_float(x: f64) -> String {
    if x == x.trunc() && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        let s = format!("{:.9e}", x);
        let parsed: f64 = s.parse().unwrap_or(x);
        let mut out = format!("{}", parsed);
        if !out.contains('.') && !out.contains('e') {
            out.push_str(".0");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_overflow_promotes_to_int64() {
        let a = Value::Int32(2147483647);
        let b = Value::Int32(1);
        match a.add(&b).unwrap() {
            Value::Int64(v) => assert_eq!(v, 2147483648),
            other => panic!("expected Int64, got {other:?}"),
        }
    }

    #[test]
    fn zero_pow_zero_is_one() {
        match Value::Float64(0.0).pow(&Value::Float64(0.0)).unwrap() {
            Value::Float64(v) => assert_eq!(v, 1.0),
            other => panic!("expected Float64, got {other:?}"),
        }
    }

    #[test]
    fn negative_base_fractional_exponent_raises_negroot() {
        let err = Value::Float64(-1.0).pow(&Value::Float64(0.5)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NegRoot);
    }

    #[test]
    fn division_by_zero_raises() {
        let err = Value::Int32(1).div(&Value::Int32(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivZero);
    }

    #[test]
    fn string_concat_and_compare() {
        let a = Value::Str(b"hello".to_vec());
        let b = Value::Str(b" world".to_vec());
        match a.add(&b).unwrap() {
            Value::Str(s) => assert_eq!(s, b"hello world"),
            other => panic!("expected Str, got {other:?}"),
        }
    }
}
