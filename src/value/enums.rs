//! Enum Decoding
//!
//! Stored procedures return enumerations either as their underlying integer
//! or as a label. [`DbEnum`] gives a Rust enum a member table so both forms
//! can be decoded; [`db_enum!`](crate::db_enum) generates the impl.
//!
//! Label matching removes every space from the input before comparing, so a
//! human-readable label such as `"Dark Blue"` matches the member `DarkBlue`.
//! A purely numeric label is matched by value.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, SprocketError};
use crate::value::{read, DbValue};

/// An enumeration decodable from a database integer or label
pub trait DbEnum: Copy + 'static {
    /// Enum name used in error messages
    const NAME: &'static str;

    /// Every member with its identifier, in declaration order
    const MEMBERS: &'static [(&'static str, Self)];

    /// Underlying integer value of a member
    fn to_repr(self) -> i64;

    /// Member with the given underlying value
    fn from_repr(value: i64) -> Option<Self> {
        Self::MEMBERS.iter().find(|(_, member)| member.to_repr() == value).map(|(_, member)| *member)
    }

    /// Member with the given identifier
    fn from_name(name: &str, ignore_case: bool) -> Option<Self> {
        Self::MEMBERS
            .iter()
            .find(|(ident, _)| {
                if ignore_case {
                    ident.eq_ignore_ascii_case(name)
                } else {
                    *ident == name
                }
            })
            .map(|(_, member)| *member)
    }

    /// Identifier of this member
    fn member_name(self) -> &'static str {
        let repr = self.to_repr();
        Self::MEMBERS
            .iter()
            .find(|(_, member)| member.to_repr() == repr)
            .map_or("", |(ident, _)| *ident)
    }
}

/// Declare a fieldless enum with explicit discriminants and implement [`DbEnum`] for it.
///
/// The generated enum derives `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq` and `Hash`.
///
/// ```
/// sprocket::db_enum! {
///     pub enum OrderStatus {
///         Pending = 0,
///         InTransit = 1,
///         Delivered = 2,
///     }
/// }
///
/// use sprocket::value::DbEnum;
/// assert_eq!(OrderStatus::from_repr(1), Some(OrderStatus::InTransit));
/// ```
#[macro_export]
macro_rules! db_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$variant_meta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$variant_meta])* $variant = $value ),+
        }

        impl $crate::value::DbEnum for $name {
            const NAME: &'static str = stringify!($name);
            const MEMBERS: &'static [(&'static str, Self)] = &[
                $( (stringify!($variant), $name::$variant) ),+
            ];

            fn to_repr(self) -> i64 {
                self as i64
            }
        }
    };
}

/// Decode an enum stored as its underlying integer
///
/// # Errors
/// [`SprocketError::InvalidCast`] if `raw` is NULL or not an integer,
/// [`SprocketError::EnumParse`] if no member has that value.
pub fn read_enum_from_value<E: DbEnum>(raw: &DbValue) -> Result<E> {
    let value: i64 = read(raw)?;
    E::from_repr(value).ok_or_else(|| SprocketError::enum_parse(E::NAME, value.to_string()))
}

/// Decode an enum stored as its underlying integer, mapping NULL to `null_value`
///
/// # Errors
/// Same as [`read_enum_from_value`] for non-NULL input.
pub fn read_nullable_enum_from_value<E: DbEnum>(raw: &DbValue, null_value: Option<E>) -> Result<Option<E>> {
    if raw.is_null() {
        return Ok(null_value);
    }
    read_enum_from_value(raw).map(Some)
}

/// Parse a label (spaces removed) or numeric string into an enum member
///
/// # Errors
/// [`SprocketError::EnumParse`] if the label names no member.
pub fn parse_label<E: DbEnum>(label: &str, ignore_case: bool) -> Result<E> {
    let key: String = label.chars().filter(|c| *c != ' ').collect();

    let member = match key.parse::<i64>() {
        Ok(value) => E::from_repr(value),
        Err(_) => E::from_name(&key, ignore_case),
    };

    member.ok_or_else(|| SprocketError::enum_parse(E::NAME, label))
}

/// Decode an enum stored as a label
///
/// The raw value's text form is used, so a label column of any type works.
///
/// # Errors
/// [`SprocketError::EnumParse`] if the value is NULL, empty, or names no member.
pub fn read_enum_from_label<E: DbEnum>(raw: &DbValue, ignore_case: bool) -> Result<E> {
    parse_label(&raw.to_string(), ignore_case)
}

/// Decode an enum stored as a label, mapping NULL or an empty label to `null_value`
///
/// # Errors
/// [`SprocketError::EnumParse`] if a non-empty label names no member.
pub fn read_nullable_enum_from_label<E: DbEnum>(
    raw: &DbValue,
    ignore_case: bool,
    null_value: Option<E>,
) -> Result<Option<E>> {
    let label = raw.to_string();
    if label.is_empty() {
        return Ok(null_value);
    }
    parse_label(&label, ignore_case).map(Some)
}

/// Like [`read_nullable_enum_from_label`] but yields `null_value` instead of failing
#[must_use]
pub fn try_read_enum_from_label<E: DbEnum>(raw: &DbValue, ignore_case: bool, null_value: Option<E>) -> Option<E> {
    read_nullable_enum_from_label(raw, ignore_case, null_value).unwrap_or(null_value)
}

/// Identifier of an enum member
#[must_use]
pub fn enum_name<E: DbEnum>(member: E) -> &'static str {
    member.member_name()
}

/// Human-readable label of an enum member (`DarkBlue` becomes `"Dark Blue"`)
#[must_use]
pub fn enum_label<E: DbEnum>(member: E) -> String {
    separate_camel_case(member.member_name())
}

/// Labels of every member, in declaration order
#[must_use]
pub fn enum_labels<E: DbEnum>() -> Vec<String> {
    E::MEMBERS.iter().map(|(ident, _)| separate_camel_case(ident)).collect()
}

/// A lowercase run, or an uppercase letter and the lowercase run after it
static CAMEL_CASE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[a-z]+|[A-Z][a-z]*").unwrap_or_else(|_| unreachable!()));

/// Insert a space before every word of a camel-cased identifier
#[must_use]
pub fn separate_camel_case(input: &str) -> String {
    CAMEL_CASE_WORD.replace_all(input, " $0").trim().to_string()
}
