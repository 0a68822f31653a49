//! Named Parameter Collections
//!
//! A [`ParameterSet`] is an ordered, name-keyed collection of parameter
//! descriptors bound to a stored-procedure call. Names are case-sensitive,
//! unique within a set, and carry the `@` prefix drivers expect.
//!
//! Iteration order is insertion order; that is the order in which the executor
//! binds parameters.

use serde::Serialize;

use crate::error::{Result, SprocketError};
use crate::value::{DbType, DbValue};

/// Prefix every parameter name must start with
pub const PARAMETER_PREFIX: char = '@';

/// Name of the conventional identifier parameter
pub const DEFAULT_ID_PARAM_NAME: &str = "@Id";

/// A single named, typed parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub db_type: DbType,
    /// Maximum length for sized types (`VarChar(50)`), `None` for driver default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    pub value: DbValue,
}

impl Parameter {
    /// Create a parameter whose value is NULL
    #[must_use]
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        Self { name: name.into(), db_type, size: None, value: DbValue::Null }
    }

    /// Assign the value, returning the parameter for chaining
    pub fn set_value(&mut self, value: impl Into<DbValue>) -> &mut Self {
        self.value = value.into();
        self
    }

    /// Name without the `@` prefix
    #[must_use]
    pub fn bare_name(&self) -> &str {
        self.name.strip_prefix(PARAMETER_PREFIX).unwrap_or(&self.name)
    }
}

/// Ordered collection of uniquely named parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// The empty set, for procedures that take no arguments
    pub const NONE: Self = Self::new();

    /// Create an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// A set holding one `Int` parameter named `@Id`
    #[must_use]
    pub fn with_identifier(id: i32) -> Self {
        Self::with_named_identifier(DEFAULT_ID_PARAM_NAME, id)
    }

    /// A set holding one `Int` parameter with the given name
    ///
    /// A name that does not start with `@` gets the prefix added.
    #[must_use]
    pub fn with_named_identifier(name: &str, id: i32) -> Self {
        let name = if name.starts_with(PARAMETER_PREFIX) {
            name.to_string()
        } else {
            format!("{PARAMETER_PREFIX}{name}")
        };

        let mut param = Parameter::new(name, DbType::Int);
        param.set_value(id);
        Self { params: vec![param] }
    }

    /// A set holding one parameter with an explicit type and value
    ///
    /// # Errors
    /// Returns `InvalidInput` if the name does not start with `@`.
    pub fn with_value(name: &str, db_type: DbType, value: impl Into<DbValue>) -> Result<Self> {
        let mut set = Self::new();
        set.add(name, db_type)?.set_value(value);
        Ok(set)
    }

    /// Add a parameter with NULL value; assign it through the returned handle
    ///
    /// # Errors
    /// `DuplicateParameter` if the name is taken (the existing entry is left
    /// unchanged), `InvalidInput` if the name does not start with `@`.
    pub fn add(&mut self, name: &str, db_type: DbType) -> Result<&mut Parameter> {
        self.insert(Parameter::new(name, db_type))
    }

    /// Add a parameter with a maximum size
    ///
    /// # Errors
    /// Same as [`add`](Self::add).
    pub fn add_sized(&mut self, name: &str, db_type: DbType, size: usize) -> Result<&mut Parameter> {
        let mut param = Parameter::new(name, db_type);
        param.size = Some(size);
        self.insert(param)
    }

    /// Add a parameter whose type is inferred from the value
    ///
    /// # Errors
    /// Same as [`add`](Self::add).
    pub fn add_value(&mut self, name: &str, value: impl Into<DbValue>) -> Result<&mut Parameter> {
        let value = value.into();
        let mut param = Parameter::new(name, DbType::infer(&value));
        param.value = value;
        self.insert(param)
    }

    /// Add a value under a generated name (`@p0`, `@p1`, ...)
    pub fn add_anonymous(&mut self, value: impl Into<DbValue>) -> &mut Parameter {
        let name = (0..)
            .map(|n| format!("{PARAMETER_PREFIX}p{n}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_default();

        let value = value.into();
        let mut param = Parameter::new(name, DbType::infer(&value));
        param.value = value;

        let index = self.params.len();
        self.params.push(param);
        &mut self.params[index]
    }

    /// Look up a parameter by exact name
    ///
    /// # Errors
    /// `ParameterNotFound` if no parameter has that name.
    pub fn lookup(&self, name: &str) -> Result<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SprocketError::parameter_not_found(name))
    }

    /// Whether a parameter with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    /// Parameters in insertion order
    #[must_use]
    pub fn to_sequence(&self) -> Vec<Parameter> {
        self.params.clone()
    }

    /// Build a set from a sequence of parameters
    ///
    /// # Errors
    /// Same as [`add`](Self::add), for the first offending parameter.
    pub fn from_sequence(params: impl IntoIterator<Item = Parameter>) -> Result<Self> {
        let mut set = Self::new();
        for param in params {
            set.insert(param)?;
        }
        Ok(set)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn insert(&mut self, param: Parameter) -> Result<&mut Parameter> {
        if !param.name.starts_with(PARAMETER_PREFIX) || param.name.len() == 1 {
            return Err(SprocketError::invalid_input(format!(
                "Parameter name '{}' must start with '{PARAMETER_PREFIX}' followed by a name",
                param.name
            )));
        }
        if self.contains(&param.name) {
            return Err(SprocketError::duplicate_parameter(&param.name));
        }

        let index = self.params.len();
        self.params.push(param);
        Ok(&mut self.params[index])
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
