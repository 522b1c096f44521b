//! Condition operators for comparing a provider's observed value
//! against a configured threshold.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One of the four comparison operators a provider's observation is
/// checked against. Synonyms (`=`/`equals`, `>`/`greater`, `<`/`lower`,
/// `!=`/`different`) are normalised to this enum at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Eq,
    Neq,
    Gt,
    Lt,
}

impl Condition {
    /// Parses the operator symbol or name used in task config. Unknown
    /// symbols are rejected by the caller (task config validation), not
    /// silently defaulted.
    pub fn parse(symbol: &str) -> Option<Condition> {
        match symbol {
            "=" | "equals" => Some(Condition::Eq),
            "!=" | "different" => Some(Condition::Neq),
            ">" | "greater" => Some(Condition::Gt),
            "<" | "lower" => Some(Condition::Lt),
            _ => None,
        }
    }

    /// Evaluates `value <condition> threshold`, i.e. whether the
    /// observed value *conforms*. The task-level violation flag is the
    /// negation of this.
    pub fn conforms(&self, value: &Value, threshold: &Value) -> bool {
        match self {
            Condition::Eq => value == threshold,
            Condition::Neq => value != threshold,
            Condition::Gt => value.partial_cmp(threshold) == Some(Ordering::Greater),
            Condition::Lt => value.partial_cmp(threshold) == Some(Ordering::Less),
        }
    }
}

/// The dynamically-typed value a provider returns and a threshold is
/// expressed as. Numeric comparison is used when both operands are
/// numeric; lexicographic comparison for strings. Comparing across
/// types never conforms to an ordering operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Number(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_synonyms() {
        assert_eq!(Condition::parse("="), Some(Condition::Eq));
        assert_eq!(Condition::parse("equals"), Some(Condition::Eq));
        assert_eq!(Condition::parse("!="), Some(Condition::Neq));
        assert_eq!(Condition::parse("different"), Some(Condition::Neq));
        assert_eq!(Condition::parse(">"), Some(Condition::Gt));
        assert_eq!(Condition::parse("greater"), Some(Condition::Gt));
        assert_eq!(Condition::parse("<"), Some(Condition::Lt));
        assert_eq!(Condition::parse("lower"), Some(Condition::Lt));
        assert_eq!(Condition::parse("bogus"), None);
    }

    #[test]
    fn numeric_comparisons() {
        let five = Value::Number(5.0);
        let three = Value::Number(3.0);
        assert!(Condition::Gt.conforms(&five, &three));
        assert!(!Condition::Lt.conforms(&five, &three));
        assert!(Condition::Eq.conforms(&five, &Value::Number(5.0)));
        assert!(Condition::Neq.conforms(&five, &three));
    }

    #[test]
    fn string_comparisons_are_lexicographic() {
        let a = Value::Text("alpha".to_string());
        let b = Value::Text("beta".to_string());
        assert!(Condition::Lt.conforms(&a, &b));
        assert!(!Condition::Gt.conforms(&a, &b));
    }

    #[test]
    fn mismatched_types_never_conform_to_ordering_operators() {
        let n = Value::Number(1.0);
        let s = Value::Text("1".to_string());
        assert!(!Condition::Gt.conforms(&n, &s));
        assert!(!Condition::Lt.conforms(&n, &s));
    }
}
