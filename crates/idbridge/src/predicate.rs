//! In-process filtering of decoded records

use idbridge_engine::{Key, Record, Value};

use crate::query::{Condition, Operator};

/// Whether `record` satisfies every condition. No conditions match everything.
pub fn matches(record: &Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|cond| evaluate(record, cond))
}

/// Evaluate one condition.
///
/// `=` and `!=` compare values of the same kind; values of different kinds
/// are unequal. Ordering operators are defined for numbers only and are false
/// otherwise. A field missing from the record fails every operator.
pub fn evaluate(record: &Record, cond: &Condition) -> bool {
    let Some(field) = record.get(cond.field()) else {
        return false;
    };
    let target = cond.value();

    match cond.operator() {
        Operator::Eq => field == target,
        Operator::Ne => field != target,
        op => match (field.as_f64(), target.as_f64()) {
            (Some(a), Some(b)) => match op {
                Operator::Gt => a > b,
                Operator::Lt => a < b,
                Operator::Ge => a >= b,
                Operator::Le => a <= b,
                Operator::Eq | Operator::Ne => false,
            },
            _ => false,
        },
    }
}

/// The key to look up directly when the conditions are a single equality on
/// the key field.
pub fn key_lookup(conditions: &[Condition], key_path: &str) -> Option<Key> {
    match conditions {
        [cond] if cond.operator() == Operator::Eq && cond.field() == key_path => {
            match cond.value() {
                Value::Text(key) => Some(Key::from(key.as_str())),
                _ => None,
            }
        }
        _ => None,
    }
}
