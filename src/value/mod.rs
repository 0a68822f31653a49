//! Database Values and Typed Decoding
//!
//! Drivers hand every column, scalar and parameter value across the driver
//! boundary as a [`DbValue`]: a tagged union with a distinguished `Null`
//! variant standing in for the database-null sentinel.
//!
//! Typed extraction goes through two functions with deliberately different
//! failure modes:
//! - [`read`] expects a non-NULL value of a compatible type. NULL or an
//!   incompatible type is an [`SprocketError::InvalidCast`] that tells the caller
//!   to use [`read_nullable`] if the column may be NULL.
//! - [`read_nullable`] maps NULL to `None`. A non-NULL value of an incompatible
//!   type is an [`SprocketError::UnsupportedConversion`]: the caller declared the
//!   column as "T or NULL" and the database stored something else.
//!
//! # Compatibility Rules
//! - Integer variants convert between integer widths when the value fits
//! - `Real` converts to `f32`/`f64`, `Float` only to `f64`
//! - `Bool` also accepts the integers 0 and 1 (`SQLite` and `MySQL` store booleans as integers)
//! - Temporal and UUID targets accept their own variant or their canonical text form
//! - Text converts only to `String`, bytes only to `Vec<u8>`

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SprocketError};

pub mod enums;

pub use enums::{
    enum_label, enum_labels, enum_name, parse_label, read_enum_from_label, read_enum_from_value,
    read_nullable_enum_from_label, read_nullable_enum_from_value, separate_camel_case,
    try_read_enum_from_label, DbEnum,
};

/// A value read from or bound to the database
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Database NULL
    Null,
    Bool(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Uuid(Uuid),
}

impl DbValue {
    /// Whether this is the database-null sentinel
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the runtime variant, used in cast error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "Bool",
            Self::TinyInt(_) => "TinyInt",
            Self::SmallInt(_) => "SmallInt",
            Self::Int(_) => "Int",
            Self::BigInt(_) => "BigInt",
            Self::Real(_) => "Real",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
            Self::Bytes(_) => "Bytes",
            Self::Date(_) => "Date",
            Self::Time(_) => "Time",
            Self::DateTime(_) => "DateTime",
            Self::DateTimeUtc(_) => "DateTimeUtc",
            Self::Uuid(_) => "Uuid",
        }
    }

    /// Integer payload of any integer variant
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some(*v as i64),
            Self::SmallInt(v) => Some(*v as i64),
            Self::Int(v) => Some(*v as i64),
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the text payload
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a JSON value (BLOBs are Base64-encoded for JSON safety)
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use base64::Engine;

        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::TinyInt(v) => serde_json::Value::Number((*v).into()),
            Self::SmallInt(v) => serde_json::Value::Number((*v).into()),
            Self::Int(v) => serde_json::Value::Number((*v).into()),
            Self::BigInt(v) => serde_json::Value::Number((*v).into()),
            // NaN/Infinity have no JSON representation
            Self::Real(v) => serde_json::Number::from_f64(f64::from(*v))
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(b),
            ),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => serde_json::Value::String(t.format("%H:%M:%S%.f").to_string()),
            Self::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Self::DateTimeUtc(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Uuid(u) => serde_json::Value::String(u.to_string()),
        }
    }
}

impl std::fmt::Display for DbValue {
    /// Text form used for label decoding; NULL renders as the empty string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::TinyInt(v) => write!(f, "{v}"),
            Self::SmallInt(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeUtc(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Bytes(_) => match self.to_json() {
                serde_json::Value::String(encoded) => f.write_str(&encoded),
                _ => Ok(()),
            },
        }
    }
}

impl Serialize for DbValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! impl_from_for_db_value {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$source> for DbValue {
                fn from(value: $source) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

impl_from_for_db_value!(
    bool => Bool,
    u8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeUtc,
    Uuid => Uuid,
);

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&[u8]> for DbValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Declared type of a query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Char,
    VarChar,
    NVarChar,
    Text,
    VarBinary,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    UniqueIdentifier,
}

impl DbType {
    /// Infer the declared type from the runtime variant of a value.
    ///
    /// NULL carries no type information and defaults to `NVarChar`.
    #[must_use]
    pub const fn infer(value: &DbValue) -> Self {
        match value {
            DbValue::Null | DbValue::Text(_) => Self::NVarChar,
            DbValue::Bool(_) => Self::Bit,
            DbValue::TinyInt(_) => Self::TinyInt,
            DbValue::SmallInt(_) => Self::SmallInt,
            DbValue::Int(_) => Self::Int,
            DbValue::BigInt(_) => Self::BigInt,
            DbValue::Real(_) => Self::Real,
            DbValue::Float(_) => Self::Float,
            DbValue::Bytes(_) => Self::VarBinary,
            DbValue::Date(_) => Self::Date,
            DbValue::Time(_) => Self::Time,
            DbValue::DateTime(_) => Self::DateTime,
            DbValue::DateTimeUtc(_) => Self::DateTimeOffset,
            DbValue::Uuid(_) => Self::UniqueIdentifier,
        }
    }

    /// Lowercase name, matching the serde representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Float => "float",
            Self::Char => "char",
            Self::VarChar => "varchar",
            Self::NVarChar => "nvarchar",
            Self::Text => "text",
            Self::VarBinary => "varbinary",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::DateTimeOffset => "datetimeoffset",
            Self::UniqueIdentifier => "uniqueidentifier",
        }
    }

    /// Parse a textual value (command line, config) into a value of this type
    ///
    /// `null` (any case) is NULL for every type. Binary values are Base64.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the text is not a valid value of this type.
    pub fn parse_value(self, text: &str) -> Result<DbValue> {
        use base64::Engine;

        if text.eq_ignore_ascii_case("null") {
            return Ok(DbValue::Null);
        }

        let invalid = |e: &dyn std::fmt::Display| {
            SprocketError::invalid_input(format!("'{text}' is not a valid {} value: {e}", self.as_str()))
        };

        let value = match self {
            Self::Bit => match text.to_ascii_lowercase().as_str() {
                "1" | "true" => DbValue::Bool(true),
                "0" | "false" => DbValue::Bool(false),
                _ => return Err(invalid(&"expected true/false or 1/0")),
            },
            Self::TinyInt => DbValue::TinyInt(text.parse().map_err(|e| invalid(&e))?),
            Self::SmallInt => DbValue::SmallInt(text.parse().map_err(|e| invalid(&e))?),
            Self::Int => DbValue::Int(text.parse().map_err(|e| invalid(&e))?),
            Self::BigInt => DbValue::BigInt(text.parse().map_err(|e| invalid(&e))?),
            Self::Real => DbValue::Real(text.parse().map_err(|e| invalid(&e))?),
            Self::Float => DbValue::Float(text.parse().map_err(|e| invalid(&e))?),
            Self::Char | Self::VarChar | Self::NVarChar | Self::Text => DbValue::Text(text.to_string()),
            Self::VarBinary => {
                DbValue::Bytes(base64::engine::general_purpose::STANDARD.decode(text).map_err(|e| invalid(&e))?)
            }
            Self::Date => DbValue::Date(text.parse().map_err(|e| invalid(&e))?),
            Self::Time => DbValue::Time(text.parse().map_err(|e| invalid(&e))?),
            Self::DateTime => DbValue::DateTime(text.parse().map_err(|e| invalid(&e))?),
            Self::DateTimeOffset => DbValue::DateTimeUtc(
                DateTime::parse_from_rfc3339(text).map_err(|e| invalid(&e))?.with_timezone(&Utc),
            ),
            Self::UniqueIdentifier => DbValue::Uuid(text.parse().map_err(|e| invalid(&e))?),
        };
        Ok(value)
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DbType {
    type Err = SprocketError;

    fn from_str(s: &str) -> Result<Self> {
        let db_type = match s.to_ascii_lowercase().as_str() {
            "bit" | "bool" | "boolean" => Self::Bit,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "int" | "integer" => Self::Int,
            "bigint" => Self::BigInt,
            "real" => Self::Real,
            "float" | "double" => Self::Float,
            "char" => Self::Char,
            "varchar" => Self::VarChar,
            "nvarchar" | "string" => Self::NVarChar,
            "text" => Self::Text,
            "varbinary" | "bytes" => Self::VarBinary,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            "datetimeoffset" => Self::DateTimeOffset,
            "uniqueidentifier" | "uuid" => Self::UniqueIdentifier,
            other => return Err(SprocketError::invalid_input(format!("Unknown parameter type '{other}'"))),
        };
        Ok(db_type)
    }
}

/// Checked conversion out of a [`DbValue`]
///
/// Implementations return `None` for NULL and for every incompatible variant;
/// [`read`] and [`read_nullable`] decide which error that becomes.
pub trait FromDbValue: Sized {
    /// Type name used in error messages
    const TYPE_NAME: &'static str;

    /// Convert a non-NULL value, or `None` if the variant is incompatible
    fn from_db_value(value: &DbValue) -> Option<Self>;
}

macro_rules! impl_from_db_value_for_integer {
    ($($target:ty),+ $(,)?) => {
        $(
            impl FromDbValue for $target {
                const TYPE_NAME: &'static str = stringify!($target);

                fn from_db_value(value: &DbValue) -> Option<Self> {
                    value.as_integer().and_then(|i| <$target>::try_from(i).ok())
                }
            }
        )+
    };
}

impl_from_db_value_for_integer!(u8, i16, i32, i64, u16, u32, u64);

impl FromDbValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Bool(b) => Some(*b),
            other => match other.as_integer() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
        }
    }
}

impl FromDbValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromDbValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Real(v) => Some(f64::from(*v)),
            DbValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromDbValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FromDbValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromDbValue for NaiveDate {
    const TYPE_NAME: &'static str = "NaiveDate";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Date(d) => Some(*d),
            DbValue::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FromDbValue for NaiveTime {
    const TYPE_NAME: &'static str = "NaiveTime";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Time(t) => Some(*t),
            DbValue::Text(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

impl FromDbValue for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::DateTime(dt) => Some(*dt),
            DbValue::DateTimeUtc(dt) => Some(dt.naive_utc()),
            DbValue::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }
}

impl FromDbValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::DateTimeUtc(dt) => Some(*dt),
            DbValue::Text(s) => {
                DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
            }
            _ => None,
        }
    }
}

impl FromDbValue for Uuid {
    const TYPE_NAME: &'static str = "Uuid";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Uuid(u) => Some(*u),
            DbValue::Text(s) => Uuid::parse_str(s).ok(),
            DbValue::Bytes(b) => Uuid::from_slice(b).ok(),
            _ => None,
        }
    }
}

/// Decode a value that must not be NULL
///
/// # Errors
/// [`SprocketError::InvalidCast`] if `raw` is NULL or not convertible to `T`.
pub fn read<T: FromDbValue>(raw: &DbValue) -> Result<T> {
    T::from_db_value(raw)
        .ok_or(SprocketError::InvalidCast { expected: T::TYPE_NAME, actual: raw.type_name() })
}

/// Decode a value that may be NULL
///
/// # Errors
/// [`SprocketError::UnsupportedConversion`] if `raw` is non-NULL and not convertible to `T`.
pub fn read_nullable<T: FromDbValue>(raw: &DbValue) -> Result<Option<T>> {
    if raw.is_null() {
        return Ok(None);
    }

    T::from_db_value(raw).map(Some).ok_or(SprocketError::UnsupportedConversion {
        expected: T::TYPE_NAME,
        actual: raw.type_name(),
    })
}

/// Decode a value that may be NULL, substituting `value_if_null` for NULL
///
/// # Errors
/// Same as [`read_nullable`].
pub fn read_nullable_or<T: FromDbValue>(raw: &DbValue, value_if_null: Option<T>) -> Result<Option<T>> {
    if raw.is_null() {
        Ok(value_if_null)
    } else {
        read_nullable(raw)
    }
}
