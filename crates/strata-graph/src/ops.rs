//! Operator semantics on resolved values.
//!
//! Arithmetic follows the usual scripting-language conventions: `/` is true
//! division, `//` and `%` round toward negative infinity, booleans count as
//! 0 and 1, and integer overflow is an error rather than a wrap.

use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
        }
    }
}

/// Why an operator could not be applied. Anchored by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpError(pub String);

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Integer(i) => Some(Num::Int(*i)),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

fn as_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(x) => x,
    }
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> OpError {
    OpError(format!(
        "unsupported operand types for {}: {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn overflow(op: BinaryOp) -> OpError {
    OpError(format!("integer overflow in {}", op.symbol()))
}

/// Equality with numeric promotion, so `1 == 1.0`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (number(left), number(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => as_float(a) == as_float(b),
        _ => match (left, right) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| loose_eq(v, w)))
            }
            _ => left == right,
        },
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, OpError> {
    match (number(left), number(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
        (Some(a), Some(b)) => as_float(a)
            .partial_cmp(&as_float(b))
            .ok_or_else(|| OpError("cannot order NaN".to_string())),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

fn contains(op: BinaryOp, needle: &Value, haystack: &Value) -> Result<bool, OpError> {
    match haystack {
        Value::List(items) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        Value::Map(entries) => match needle {
            Value::String(key) => Ok(entries.contains_key(key)),
            other => Ok(entries.contains_key(&other.to_string())),
        },
        Value::String(text) => match needle {
            Value::String(part) => Ok(text.contains(part.as_str())),
            _ => Err(unsupported(op, needle, haystack)),
        },
        _ => Err(unsupported(op, needle, haystack)),
    }
}

/// Largest string (in bytes) or sequence a repetition may produce.
pub const MAX_REPEAT_LEN: usize = 1 << 24;

/// The repeat count for `len` units `times` over; negative counts are zero.
fn repeat_count(len: usize, times: i64) -> Result<usize, OpError> {
    let times = usize::try_from(times).unwrap_or(0);
    if len == 0 {
        return Ok(0);
    }
    len.checked_mul(times)
        .filter(|total| *total <= MAX_REPEAT_LEN)
        .map(|_| times)
        .ok_or_else(|| {
            OpError(format!(
                "repeating {len} items {times} times exceeds the limit of {MAX_REPEAT_LEN}"
            ))
        })
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, OpError> {
    let times = repeat_count(items.len(), times)?;
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    let (Some(a), Some(b)) = (number(left), number(right)) else {
        return Err(unsupported(op, left, right));
    };
    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        let zero = || OpError(format!("division by zero in {}", op.symbol()));
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(zero());
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            BinaryOp::FloorDiv => {
                if b == 0 {
                    return Err(zero());
                }
                floor_div(a, b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(zero());
                }
                floor_mod(a, b)
            }
            BinaryOp::Pow => {
                if b < 0 {
                    return Ok(Value::Float((a as f64).powf(b as f64)));
                }
                u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
            }
            _ => return Err(unsupported(op, left, right)),
        };
        return result.map(Value::Integer).ok_or_else(|| overflow(op));
    }

    let (a, b) = (as_float(a), as_float(b));
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(OpError(format!("division by zero in {}", op.symbol())));
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
        _ => return Err(unsupported(op, left, right)),
    };
    Ok(Value::Float(value))
}

fn bitwise(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    let (Some(Num::Int(a)), Some(Num::Int(b))) = (number(left), number(right)) else {
        return Err(unsupported(op, left, right));
    };
    let result = match op {
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::Shl | BinaryOp::Shr => {
            let shift =
                u32::try_from(b).map_err(|_| OpError("negative shift count".to_string()))?;
            if op == BinaryOp::Shl {
                a.checked_shl(shift).filter(|v| v >> shift == a)
            } else {
                Some(a.checked_shr(shift).unwrap_or(if a < 0 { -1 } else { 0 }))
            }
        }
        _ => return Err(unsupported(op, left, right)),
    };
    result.map(Value::Integer).ok_or_else(|| overflow(op))
}

/// Apply a binary operator to two resolved operands.
///
/// `or` and `and` are accepted for constant folding; the evaluator
/// short-circuits them itself before both operands exist.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    match op {
        BinaryOp::Or => Ok(if left.is_truthy() {
            left.clone()
        } else {
            right.clone()
        }),
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt => compare(op, left, right).map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::Le => compare(op, left, right).map(|o| Value::Bool(o != Ordering::Greater)),
        BinaryOp::Gt => compare(op, left, right).map(|o| Value::Bool(o == Ordering::Greater)),
        BinaryOp::Ge => compare(op, left, right).map(|o| Value::Bool(o != Ordering::Less)),
        BinaryOp::In => contains(op, left, right).map(Value::Bool),
        BinaryOp::NotIn => contains(op, left, right).map(|found| Value::Bool(!found)),
        BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::BitAnd | BinaryOp::Shl | BinaryOp::Shr => {
            bitwise(op, left, right)
        }
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            _ => arithmetic(op, left, right),
        },
        BinaryOp::Mul => match (left, right) {
            (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s)) => {
                Ok(Value::String(s.repeat(repeat_count(s.len(), *n)?)))
            }
            (Value::List(items), Value::Integer(n)) | (Value::Integer(n), Value::List(items)) => {
                repeat(items, *n).map(Value::List)
            }
            _ => arithmetic(op, left, right),
        },
        BinaryOp::Sub | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod | BinaryOp::Pow => {
            arithmetic(op, left, right)
        }
    }
}

pub fn apply_unary(op: UnaryOp, operand: &Value) -> Result<Value, OpError> {
    let bad = || {
        OpError(format!(
            "bad operand type for unary {}: {}",
            op.symbol(),
            operand.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match number(operand).ok_or_else(bad)? {
            Num::Int(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| OpError("integer overflow in unary -".to_string())),
            Num::Float(x) => Ok(Value::Float(-x)),
        },
        UnaryOp::Pos => match number(operand).ok_or_else(bad)? {
            Num::Int(i) => Ok(Value::Integer(i)),
            Num::Float(x) => Ok(Value::Float(x)),
        },
        UnaryOp::Invert => match number(operand).ok_or_else(bad)? {
            Num::Int(i) => Ok(Value::Integer(!i)),
            Num::Float(_) => Err(bad()),
        },
    }
}
