use std::cmp::Ordering;

use crate::kernel::error::{Error, Result};
use crate::kernel::memory::{Memory, ScopeId};
use crate::kernel::values::{Data, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpBase {
    Eq,
    Lt,
    Gt,
}

#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    pub base: CmpBase,
    pub negate: bool,
}

// checked in this order; the first one present splits the expression
const OPERATORS: [(&str, Comparator); 4] = [
    ("==", Comparator { base: CmpBase::Eq, negate: false }),
    ("!=", Comparator { base: CmpBase::Eq, negate: true }),
    (">", Comparator { base: CmpBase::Gt, negate: false }),
    ("<", Comparator { base: CmpBase::Lt, negate: false }),
];

pub fn cmp_eval(cmp: Comparator, a: &Data, b: &Data) -> Result<bool> {
    let out = match cmp.base {
        CmpBase::Eq => eq_values(a.value(), b.value()),
        CmpBase::Lt => order(a.value(), b.value())? == Ordering::Less,
        CmpBase::Gt => order(a.value(), b.value())? == Ordering::Greater,
    };
    Ok(out != cmp.negate)
}

fn eq_values(a: &Payload, b: &Payload) -> bool {
    match (a, b) {
        (Payload::Int(x), Payload::Float(y)) | (Payload::Float(y), Payload::Int(x)) => (*x as f64) == *y,
        (Payload::List(x), Payload::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| eq_values(l.value(), r.value()))
        }
        _ => a == b,
    }
}

fn order(a: &Payload, b: &Payload) -> Result<Ordering> {
    let incomparable = || Error::Incomparable { lhs: a.kind(), rhs: b.kind() };
    match (a, b) {
        (Payload::Int(x), Payload::Int(y)) => Ok(x.cmp(y)),
        (Payload::Str(x), Payload::Str(y)) => Ok(x.cmp(y)),
        (Payload::Bool(x), Payload::Bool(y)) => Ok(x.cmp(y)),
        _ => {
            let (x, y) = (to_num(a).ok_or_else(incomparable)?, to_num(b).ok_or_else(incomparable)?);
            x.partial_cmp(&y).ok_or_else(incomparable)
        }
    }
}

fn to_num(v: &Payload) -> Option<f64> {
    match v {
        Payload::Int(n) => Some(*n as f64),
        Payload::Float(n) => Some(*n),
        _ => None,
    }
}

impl Memory {
    /// `lhs op rhs` for `==`, `!=`, `>` and `<`; anything else must name a
    /// boolean binding.
    pub fn evaluate_boolean(&mut self, scope: ScopeId, expression: &str) -> Result<bool> {
        for (op, cmp) in OPERATORS {
            if let Some((lhs, rhs)) = expression.split_once(op) {
                let a = self.evaluate_value(scope, lhs.trim(), "")?;
                let b = self.evaluate_value(scope, rhs.trim(), "")?;
                return cmp_eval(cmp, &a, &b);
            }
        }
        let name = expression.trim();
        if !self.contains(scope, name) {
            return Err(Error::NotBoolean(expression.to_string()));
        }
        self.resolve(scope, name)?
            .as_bool()
            .ok_or_else(|| Error::NotBoolean(expression.to_string()))
    }
}
