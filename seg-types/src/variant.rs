//! Tagged values and the canonical string protocol.
//!
//! Every state variable and every action parameter converts to and from a
//! [`Variant`]. The `Display` form of a variant is the canonical string used by
//! the scripting console and by session snapshots; [`ValueKind::parse`] is its
//! inverse for every legal value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed type of a state variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Double,
    String,
    /// A string restricted to a lower-cased option list.
    Option,
    /// Any number of entries from a lower-cased option list.
    MultiOption,
    IntVector,
    DoubleVector,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Option => "option",
            ValueKind::MultiOption => "multi option",
            ValueKind::IntVector => "int vector",
            ValueKind::DoubleVector => "double vector",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Double)
    }

    /// Parse canonical (or leniently formatted) text as a value of this kind.
    pub fn parse(self, text: &str) -> Result<Variant, ValueError> {
        let parsed = match self {
            ValueKind::Bool => parse_bool(text).map(Variant::Bool),
            ValueKind::Int => text.trim().parse::<i64>().ok().map(Variant::Int),
            ValueKind::Double => text.trim().parse::<f64>().ok().map(Variant::Double),
            ValueKind::String => Some(Variant::Str(text.to_string())),
            ValueKind::Option => Some(Variant::Str(text.trim().to_lowercase())),
            ValueKind::MultiOption => parse_vector::<String>(text)
                .map(|v| Variant::StrVec(v.into_iter().map(|s| s.to_lowercase()).collect())),
            ValueKind::IntVector => parse_vector::<i64>(text).map(Variant::IntVec),
            ValueKind::DoubleVector => parse_vector::<f64>(text).map(Variant::DoubleVec),
        };
        parsed.ok_or_else(|| ValueError::Parse {
            text: text.to_string(),
            kind: self,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot convert '{text}' to {kind}")]
    Parse { text: String, kind: ValueKind },
    #[error("cannot convert a {from} value to {to}")]
    Mismatch { from: &'static str, to: ValueKind },
}

/// A generic tagged value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    IntVec(Vec<i64>),
    DoubleVec(Vec<f64>),
    StrVec(Vec<String>),
}

impl Variant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Double(_) => "double",
            Variant::Str(_) => "string",
            Variant::IntVec(_) => "int vector",
            Variant::DoubleVec(_) => "double vector",
            Variant::StrVec(_) => "string vector",
        }
    }

    /// Convert to `kind` without losing information.
    ///
    /// Strings are parsed, ints widen to doubles, integral doubles narrow to
    /// ints and int vectors widen to double vectors. Everything else is a
    /// mismatch.
    pub fn coerce(&self, kind: ValueKind) -> Result<Variant, ValueError> {
        match (self, kind) {
            (Variant::Bool(_), ValueKind::Bool)
            | (Variant::Int(_), ValueKind::Int)
            | (Variant::Double(_), ValueKind::Double)
            | (Variant::Str(_), ValueKind::String)
            | (Variant::IntVec(_), ValueKind::IntVector)
            | (Variant::DoubleVec(_), ValueKind::DoubleVector)
            | (Variant::StrVec(_), ValueKind::MultiOption) => Ok(self.clone()),
            (Variant::Str(s), kind) => kind.parse(s),
            (Variant::Int(v), ValueKind::Double) => Ok(Variant::Double(*v as f64)),
            (Variant::Double(v), ValueKind::Int) if is_integral(*v) => Ok(Variant::Int(*v as i64)),
            (Variant::IntVec(v), ValueKind::DoubleVector) => {
                Ok(Variant::DoubleVec(v.iter().map(|x| *x as f64).collect()))
            }
            _ => Err(ValueError::Mismatch {
                from: self.type_name(),
                to: kind,
            }),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; ints are widened.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Variant::Double(v) => Some(*v),
            Variant::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Bool(v) => f.write_str(if *v { "true" } else { "false" }),
            Variant::Int(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::Str(s) => f.write_str(s),
            Variant::IntVec(v) => write_vector(f, v),
            Variant::DoubleVec(v) => write_vector(f, v),
            Variant::StrVec(v) => write_vector(f, v),
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v as i64)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::Str(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::Str(v)
    }
}

impl From<Vec<i64>> for Variant {
    fn from(v: Vec<i64>) -> Self {
        Variant::IntVec(v)
    }
}

impl From<Vec<f64>> for Variant {
    fn from(v: Vec<f64>) -> Self {
        Variant::DoubleVec(v)
    }
}

impl From<Vec<String>> for Variant {
    fn from(v: Vec<String>) -> Self {
        Variant::StrVec(v)
    }
}

fn is_integral(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `[a b c]`; commas are accepted as separators on input.
fn parse_vector<T: FromStr>(text: &str) -> Option<Vec<T>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.parse::<T>().ok())
        .collect()
}

fn write_vector<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", v)?;
    }
    f.write_str("]")
}
