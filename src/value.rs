//! Tagged value type for record fields, and the data types a schema can declare.

use crate::error::{RelError, RelResult};
use crate::point::Point;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The declared type of a table attribute. VARCHAR/CHAR carry their fixed length
/// since it is part of the physical record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    Bool,
    Date,
    Varchar(usize),
    Char(usize),
    Point,
}

impl DataType {
    /// Encoded byte width of this type within a packed record (excludes the
    /// trailing `next` free-list pointer, which is store-level, not attribute-level).
    pub fn byte_width(self) -> usize {
        match self {
            DataType::Int | DataType::Date => 4,
            DataType::Float => 8,
            DataType::Bool => 1,
            DataType::Varchar(n) | DataType::Char(n) => n,
            DataType::Point => 16,
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            DataType::Int => Value::Int(0),
            DataType::Date => Value::Date(0),
            DataType::Float => Value::Float(0.0),
            DataType::Bool => Value::Bool(false),
            DataType::Varchar(_) | DataType::Char(_) => Value::Str(" ".to_string()),
            DataType::Point => Value::Point(Point::origin()),
        }
    }

    /// Parses type tokens like `INT`, `VARCHAR[20]`, `DECIMAL`, `POINT`.
    pub fn parse(token: &str) -> RelResult<Self> {
        let upper = token.trim().to_uppercase();
        if let Some(bracket) = upper.find('[') {
            let base = &upper[..bracket];
            let len_str = upper[bracket + 1..]
                .trim_end_matches(']')
                .trim();
            let len: usize = len_str
                .parse()
                .map_err(|_| RelError::Parse(format!("invalid length in type '{token}'")))?;
            return match base {
                "VARCHAR" => Ok(DataType::Varchar(len)),
                "CHAR" => Ok(DataType::Char(len)),
                _ => Err(RelError::Parse(format!("unknown bracketed type '{token}'"))),
            };
        }
        match upper.as_str() {
            "INT" => Ok(DataType::Int),
            "DECIMAL" | "FLOAT" | "DOUBLE" => Ok(DataType::Float),
            "BOOL" | "BOOLEAN" => Ok(DataType::Bool),
            "DATE" => Ok(DataType::Date),
            "POINT" => Ok(DataType::Point),
            "VARCHAR" => Ok(DataType::Varchar(255)),
            "CHAR" => Ok(DataType::Char(1)),
            _ => Err(RelError::Parse(format!("unknown data type '{token}'"))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Float => write!(f, "DECIMAL"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::Date => write!(f, "DATE"),
            DataType::Varchar(n) => write!(f, "VARCHAR[{n}]"),
            DataType::Char(n) => write!(f, "CHAR[{n}]"),
            DataType::Point => write!(f, "POINT"),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DataType::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A dynamically-typed record field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Bool(bool),
    Date(i32),
    Str(String),
    Point(Point),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Bool(_) => DataType::Bool,
            Value::Date(_) => DataType::Date,
            Value::Str(s) => DataType::Varchar(s.len().max(1)),
            Value::Point(_) => DataType::Point,
        }
    }

    /// Parses a SQL literal token into a value of the given declared type.
    pub fn parse_as(token: &str, data_type: DataType) -> RelResult<Self> {
        let unquoted = unquote(token);
        match data_type {
            DataType::Int | DataType::Date => {
                let n: i64 = unquoted
                    .parse::<f64>()
                    .map(|f| f as i64)
                    .or_else(|_| unquoted.parse::<i64>())
                    .map_err(|_| RelError::Parse(format!("invalid integer literal '{token}'")))?;
                if data_type == DataType::Date {
                    Ok(Value::Date(n as i32))
                } else {
                    Ok(Value::Int(n as i32))
                }
            }
            DataType::Float => {
                let f: f64 = unquoted
                    .parse()
                    .map_err(|_| RelError::Parse(format!("invalid float literal '{token}'")))?;
                Ok(Value::Float(f))
            }
            DataType::Bool => Ok(Value::Bool(parse_bool(&unquoted))),
            DataType::Varchar(_) | DataType::Char(_) => Ok(Value::Str(unquoted.to_string())),
            DataType::Point => Ok(Value::Point(Point::parse(&unquoted)?)),
        }
    }

    /// Whether this value's type family matches `data_type`, ignoring the declared
    /// VARCHAR/CHAR length — `pack_value` truncates/pads to that length regardless.
    pub fn matches_type(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Int(_), DataType::Int)
                | (Value::Float(_), DataType::Float)
                | (Value::Bool(_), DataType::Bool)
                | (Value::Date(_), DataType::Date)
                | (Value::Str(_), DataType::Varchar(_))
                | (Value::Str(_), DataType::Char(_))
                | (Value::Point(_), DataType::Point)
        )
    }

    pub fn as_point(&self) -> RelResult<Point> {
        match self {
            Value::Point(p) => Ok(*p),
            other => Err(RelError::TypeMismatch {
                expected: "POINT".into(),
                actual: other.data_type().to_string(),
            }),
        }
    }

    pub fn as_f64(&self) -> RelResult<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Date(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(RelError::TypeMismatch {
                expected: "numeric".into(),
                actual: other.data_type().to_string(),
            }),
        }
    }
}

pub fn parse_bool(s: &str) -> bool {
    matches!(
        s.to_lowercase().as_str(),
        "true" | "yes" | "1" | "t" | "y"
    )
}

/// Strips surrounding quotes and un-escapes a doubled quote into a single one,
/// matching the cleaner's escaping rule (spec.md §4.7).
fn unquote(token: &str) -> String {
    let t = token.trim();
    if t.len() >= 2 {
        let bytes = t.as_bytes();
        if bytes[0] == b'\'' && bytes[t.len() - 1] == b'\'' {
            return t[1..t.len() - 1].replace("''", "'");
        }
        if bytes[0] == b'"' && bytes[t.len() - 1] == b'"' {
            return t[1..t.len() - 1].replace("\"\"", "\"");
        }
    }
    t.to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Point(p) => write!(f, "{p}"),
        }
    }
}

/// Componentwise ordering for numbers and strings; for points, `>`/`<` use the
/// componentwise comparison resolved in SPEC_FULL.md's Open Question (a), not
/// distance-to-origin (which is reserved for AVL key ordering).
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Point(a), Value::Point(b)) => {
                let xo = a.x.partial_cmp(&b.x)?;
                if xo != Ordering::Equal {
                    Some(xo)
                } else {
                    a.y.partial_cmp(&b.y)
                }
            }
            _ => None,
        }
    }
}
