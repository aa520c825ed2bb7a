use std::{fmt::Display, rc::Rc};

use crate::ast::{format_float, Function, Literal};

use super::builtins::Builtin;

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Function(Rc<Function>),
    Builtin(Builtin),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            _ => true,
        }
    }

    /// The Gümüş name of the value's type, as returned by `tip()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "tamsayı",
            Value::Float(_) => "ondalık",
            Value::String(_) => "metin",
            Value::Boolean(_) => "mantıksal",
            Value::Null => "yok",
            Value::Function(_) | Value::Builtin(_) => "fonksiyon",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Integer(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(format_float(*n))),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Null => serde_json::Value::Null,
            Value::Function(_) | Value::Builtin(_) => serde_json::Value::String(self.to_string()),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Integer(n) => Value::Integer(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => f.write_str(&format_float(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(true) => write!(f, "doğru"),
            Value::Boolean(false) => write!(f, "yanlış"),
            Value::Null => write!(f, "yok"),
            Value::Function(function) => write!(f, "<fonksiyon {}>", function.name),
            Value::Builtin(builtin) => write!(f, "<yerleşik {}>", builtin.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn display() {
        assert_eq!(Value::Float(4.0).to_string(), "4.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::String("a b".to_string()).to_string(), "a b");
        assert_eq!(Value::Boolean(true).to_string(), "doğru");
        assert_eq!(Value::Null.to_string(), "yok");
    }

    #[test]
    fn numbers_compare_across_kinds() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Integer(2), Value::String("2".to_string()));
    }
}
