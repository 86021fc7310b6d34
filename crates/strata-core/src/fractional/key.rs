//! Order-key allocation.
//!
//! Keys are base-62 strings made of an integer part and an optional
//! fractional part. The first character of the integer part encodes its
//! length: `a`..`z` stand for 2..27 characters, `Z`..`A` for 2..27 characters
//! of the negative range. The fractional part never ends in `0`, which keeps
//! every key strictly between its neighbors reachable.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Base-62 digits in ASCII order.
const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Key returned when there are no bounds at all.
pub const INTEGER_ZERO: &str = "a0";

/// The smallest integer part. Reserved so that a key below every other key
/// can always be produced.
const SMALLEST_INTEGER: &[u8] = b"A00000000000000000000000000";

/// Errors produced by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Lower bound {lower:?} is not below upper bound {upper:?}")]
    InvalidBounds { lower: String, upper: String },
    #[error("Invalid order key: {0:?}")]
    InvalidKey(String),
    #[error("Order key space exhausted")]
    Exhausted,
}

/// Result type for allocation.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// A lexicographically sortable position of an element.
///
/// Deserialization does not validate: keys arriving from storage or peers
/// are kept verbatim and repaired by the normalizer if needed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(String);

impl OrderKey {
    /// Parse and validate a key.
    pub fn parse(key: impl Into<String>) -> AllocationResult<Self> {
        let key = key.into();
        validate_key(key.as_bytes())?;
        Ok(Self(key))
    }

    /// Whether the key is well formed.
    pub fn is_well_formed(&self) -> bool {
        validate_key(self.0.as_bytes()).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for OrderKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for OrderKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for OrderKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_key(bytes: Vec<u8>) -> OrderKey {
    OrderKey(bytes.into_iter().map(char::from).collect())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn digit_value(c: u8) -> Option<usize> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as usize),
        b'A'..=b'Z' => Some((c - b'A') as usize + 10),
        b'a'..=b'z' => Some((c - b'a') as usize + 36),
        _ => None,
    }
}

/// Length of the integer part selected by its head character.
fn integer_length(head: u8) -> Option<usize> {
    match head {
        b'a'..=b'z' => Some((head - b'a') as usize + 2),
        b'A'..=b'Z' => Some((b'Z' - head) as usize + 2),
        _ => None,
    }
}

fn integer_part(key: &[u8]) -> AllocationResult<&[u8]> {
    let len = key
        .first()
        .and_then(|&head| integer_length(head))
        .ok_or_else(|| AllocationError::InvalidKey(lossy(key)))?;
    if len > key.len() {
        return Err(AllocationError::InvalidKey(lossy(key)));
    }
    Ok(&key[..len])
}

fn validate_key(key: &[u8]) -> AllocationResult<()> {
    if key == SMALLEST_INTEGER {
        return Err(AllocationError::InvalidKey(lossy(key)));
    }
    let integer = integer_part(key)?;
    let fraction = &key[integer.len()..];
    if fraction.last() == Some(&b'0') {
        return Err(AllocationError::InvalidKey(lossy(key)));
    }
    if key[1..].iter().any(|&c| digit_value(c).is_none()) {
        return Err(AllocationError::InvalidKey(lossy(key)));
    }
    Ok(())
}

/// Midpoint of two fractional parts, `b = None` meaning "one".
fn midpoint(a: &[u8], b: Option<&[u8]>) -> AllocationResult<Vec<u8>> {
    if let Some(b) = b {
        if a >= b {
            return Err(AllocationError::InvalidBounds {
                lower: lossy(a),
                upper: lossy(b),
            });
        }
    }
    if a.last() == Some(&b'0') || b.and_then(|b| b.last()) == Some(&b'0') {
        return Err(AllocationError::InvalidKey(lossy(a)));
    }

    if let Some(b) = b {
        // Shared prefix, with `a` padded by zeros.
        let n = b
            .iter()
            .enumerate()
            .take_while(|&(i, &c)| a.get(i).copied().unwrap_or(b'0') == c)
            .count();
        if n > 0 {
            let mut out = b[..n].to_vec();
            out.extend(midpoint(a.get(n..).unwrap_or(&[]), Some(&b[n..]))?);
            return Ok(out);
        }
    }

    let digit_a = match a.first() {
        Some(&c) => digit_value(c).ok_or_else(|| AllocationError::InvalidKey(lossy(a)))?,
        None => 0,
    };
    let digit_b = match b.and_then(|b| b.first()) {
        Some(&c) => digit_value(c)
            .ok_or_else(|| AllocationError::InvalidKey(lossy(b.unwrap_or_default())))?,
        None => DIGITS.len(),
    };

    if digit_b > digit_a + 1 {
        return Ok(vec![DIGITS[(digit_a + digit_b + 1) / 2]]);
    }

    match b {
        Some(b) if b.len() > 1 => Ok(vec![b[0]]),
        _ => {
            let mut out = vec![DIGITS[digit_a]];
            out.extend(midpoint(a.get(1..).unwrap_or(&[]), None)?);
            Ok(out)
        }
    }
}

fn validate_integer(integer: &[u8]) -> AllocationResult<()> {
    match integer.first().and_then(|&head| integer_length(head)) {
        Some(len) if len == integer.len() => Ok(()),
        _ => Err(AllocationError::InvalidKey(lossy(integer))),
    }
}

/// Next integer part, or `None` past the largest one.
fn increment_integer(integer: &[u8]) -> AllocationResult<Option<Vec<u8>>> {
    validate_integer(integer)?;
    let head = integer[0];
    let mut digits = integer[1..].to_vec();

    let mut carry = true;
    for d in digits.iter_mut().rev() {
        let value = digit_value(*d).ok_or_else(|| AllocationError::InvalidKey(lossy(integer)))? + 1;
        if value == DIGITS.len() {
            *d = b'0';
        } else {
            *d = DIGITS[value];
            carry = false;
            break;
        }
    }

    if !carry {
        digits.insert(0, head);
        return Ok(Some(digits));
    }
    match head {
        b'Z' => Ok(Some(INTEGER_ZERO.as_bytes().to_vec())),
        b'z' => Ok(None),
        _ => {
            let next = head + 1;
            if next > b'a' {
                digits.push(b'0');
            } else {
                digits.pop();
            }
            digits.insert(0, next);
            Ok(Some(digits))
        }
    }
}

/// Previous integer part, or `None` below the smallest one.
fn decrement_integer(integer: &[u8]) -> AllocationResult<Option<Vec<u8>>> {
    validate_integer(integer)?;
    let head = integer[0];
    let mut digits = integer[1..].to_vec();
    let last_digit = DIGITS[DIGITS.len() - 1];

    let mut borrow = true;
    for d in digits.iter_mut().rev() {
        let value = digit_value(*d).ok_or_else(|| AllocationError::InvalidKey(lossy(integer)))?;
        if value == 0 {
            *d = last_digit;
        } else {
            *d = DIGITS[value - 1];
            borrow = false;
            break;
        }
    }

    if !borrow {
        digits.insert(0, head);
        return Ok(Some(digits));
    }
    match head {
        b'a' => Ok(Some(vec![b'Z', last_digit])),
        b'A' => Ok(None),
        _ => {
            let prev = head - 1;
            if prev < b'Z' {
                digits.push(last_digit);
            } else {
                digits.pop();
            }
            digits.insert(0, prev);
            Ok(Some(digits))
        }
    }
}

fn concat(head: &[u8], tail: Vec<u8>) -> Vec<u8> {
    let mut out = head.to_vec();
    out.extend(tail);
    out
}

/// Generate a key strictly between `a` and `b`.
///
/// `None` removes the corresponding bound. Fails when both bounds are given
/// and `a >= b`, or when either bound is malformed.
pub fn key_between(a: Option<&str>, b: Option<&str>) -> AllocationResult<OrderKey> {
    if let Some(a) = a {
        validate_key(a.as_bytes())?;
    }
    if let Some(b) = b {
        validate_key(b.as_bytes())?;
    }

    match (a.map(str::as_bytes), b.map(str::as_bytes)) {
        (None, None) => Ok(OrderKey(INTEGER_ZERO.to_string())),
        (None, Some(b)) => {
            let ib = integer_part(b)?;
            let fb = &b[ib.len()..];
            if ib == SMALLEST_INTEGER {
                return Ok(to_key(concat(ib, midpoint(&[], Some(fb))?)));
            }
            if ib < b {
                return Ok(to_key(ib.to_vec()));
            }
            decrement_integer(ib)?
                .map(to_key)
                .ok_or(AllocationError::Exhausted)
        }
        (Some(a), None) => {
            let ia = integer_part(a)?;
            let fa = &a[ia.len()..];
            match increment_integer(ia)? {
                Some(next) => Ok(to_key(next)),
                None => Ok(to_key(concat(ia, midpoint(fa, None)?))),
            }
        }
        (Some(a), Some(b)) => {
            if a >= b {
                return Err(AllocationError::InvalidBounds {
                    lower: lossy(a),
                    upper: lossy(b),
                });
            }
            let ia = integer_part(a)?;
            let fa = &a[ia.len()..];
            let ib = integer_part(b)?;
            let fb = &b[ib.len()..];
            if ia == ib {
                return Ok(to_key(concat(ia, midpoint(fa, Some(fb))?)));
            }
            let next = increment_integer(ia)?.ok_or(AllocationError::Exhausted)?;
            if next.as_slice() < b {
                return Ok(to_key(next));
            }
            Ok(to_key(concat(ia, midpoint(fa, None)?)))
        }
    }
}

/// Generate `n` strictly increasing keys between `a` and `b`.
///
/// Either all `n` keys are produced or an error is returned.
pub fn keys_between(a: Option<&str>, b: Option<&str>, n: usize) -> AllocationResult<Vec<OrderKey>> {
    match n {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![key_between(a, b)?]),
        _ => {}
    }

    match (a, b) {
        (_, None) => {
            let mut current = key_between(a, None)?;
            let mut keys = Vec::with_capacity(n);
            keys.push(current.clone());
            for _ in 1..n {
                current = key_between(Some(current.as_str()), None)?;
                keys.push(current.clone());
            }
            Ok(keys)
        }
        (None, Some(_)) => {
            let mut current = key_between(None, b)?;
            let mut keys = Vec::with_capacity(n);
            keys.push(current.clone());
            for _ in 1..n {
                current = key_between(None, Some(current.as_str()))?;
                keys.push(current.clone());
            }
            keys.reverse();
            Ok(keys)
        }
        (Some(_), Some(_)) => {
            let mid = n / 2;
            let middle = key_between(a, b)?;
            let mut keys = keys_between(a, Some(middle.as_str()), mid)?;
            keys.push(middle.clone());
            keys.extend(keys_between(Some(middle.as_str()), b, n - mid - 1)?);
            Ok(keys)
        }
    }
}
