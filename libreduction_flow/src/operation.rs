use std::collections::BTreeMap;

use super::error::OperationError;
use super::identifier::Identifier;
use super::registry::Registry;

/// Keyword parameter value for an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Float(f64),
    Int(i64),
    Text(String),
    Bool(bool),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<f64>> for Param {
    fn from(value: Vec<f64>) -> Self {
        Self::Floats(value)
    }
}

impl From<Vec<i64>> for Param {
    fn from(value: Vec<i64>) -> Self {
        Self::Ints(value)
    }
}

/// A single invocation of a named external operation.
///
/// Built with the `with_*` methods, read by an [`Engine`] with the typed accessors. Missing
/// entries come back as [`OperationError::MissingInput`] or
/// [`OperationError::MissingParameter`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationCall {
    pub name: String,
    pub inputs: BTreeMap<String, Identifier>,
    pub outputs: BTreeMap<String, Identifier>,
    pub params: BTreeMap<String, Param>,
    pub enable_logging: bool,
}

impl OperationCall {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            params: BTreeMap::new(),
            enable_logging: false,
        }
    }

    pub fn with_input(mut self, property: &str, id: &Identifier) -> Self {
        self.inputs.insert(property.to_string(), id.clone());
        self
    }

    pub fn with_output(mut self, property: &str, id: &Identifier) -> Self {
        self.outputs.insert(property.to_string(), id.clone());
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Param>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_logging(mut self, enable_logging: bool) -> Self {
        self.enable_logging = enable_logging;
        self
    }

    pub fn input(&self, property: &str) -> Result<&Identifier, OperationError> {
        self.inputs
            .get(property)
            .ok_or_else(|| OperationError::MissingInput {
                operation: self.name.clone(),
                property: property.to_string(),
            })
    }

    pub fn optional_input(&self, property: &str) -> Option<&Identifier> {
        self.inputs.get(property)
    }

    pub fn output(&self, property: &str) -> Result<&Identifier, OperationError> {
        self.outputs
            .get(property)
            .ok_or_else(|| OperationError::MissingInput {
                operation: self.name.clone(),
                property: property.to_string(),
            })
    }

    pub fn optional_output(&self, property: &str) -> Option<&Identifier> {
        self.outputs.get(property)
    }

    fn param(&self, name: &str) -> Result<&Param, OperationError> {
        self.params
            .get(name)
            .ok_or_else(|| self.missing_parameter(name))
    }

    fn missing_parameter(&self, name: &str) -> OperationError {
        OperationError::MissingParameter {
            operation: self.name.clone(),
            parameter: name.to_string(),
        }
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn float(&self, name: &str) -> Result<f64, OperationError> {
        match self.param(name)? {
            Param::Float(f) => Ok(*f),
            Param::Int(i) => Ok(*i as f64),
            _ => Err(self.missing_parameter(name)),
        }
    }

    pub fn float_or(&self, name: &str, default: f64) -> Result<f64, OperationError> {
        if self.has_param(name) {
            self.float(name)
        } else {
            Ok(default)
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, OperationError> {
        match self.param(name)? {
            Param::Int(i) => Ok(*i),
            _ => Err(self.missing_parameter(name)),
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, OperationError> {
        if self.has_param(name) {
            self.int(name)
        } else {
            Ok(default)
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, OperationError> {
        match self.param(name)? {
            Param::Text(t) => Ok(t.as_str()),
            _ => Err(self.missing_parameter(name)),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, OperationError> {
        match self.params.get(name) {
            None => Ok(default),
            Some(Param::Bool(b)) => Ok(*b),
            Some(_) => Err(self.missing_parameter(name)),
        }
    }

    pub fn floats(&self, name: &str) -> Result<&[f64], OperationError> {
        match self.param(name)? {
            Param::Floats(f) => Ok(f.as_slice()),
            _ => Err(self.missing_parameter(name)),
        }
    }

    pub fn ints(&self, name: &str) -> Result<&[i64], OperationError> {
        match self.param(name)? {
            Param::Ints(i) => Ok(i.as_slice()),
            _ => Err(self.missing_parameter(name)),
        }
    }

    /// Shorthand for a failed precondition inside this operation
    pub fn failed(&self, reason: impl Into<String>) -> OperationError {
        OperationError::Failed {
            operation: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// What an operation produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOutputs {
    pub workspaces: BTreeMap<String, Identifier>,
    pub values: BTreeMap<String, f64>,
}

impl OperationOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, property: &str, id: &Identifier) -> Self {
        self.workspaces.insert(property.to_string(), id.clone());
        self
    }

    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn workspace(&self, property: &str) -> Option<&Identifier> {
        self.workspaces.get(property)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// The external numerical library.
///
/// Operations run synchronously and write their outputs into the registry under the names
/// the call asks for, overwriting whatever is there.
pub trait Engine {
    fn execute(
        &mut self,
        registry: &mut dyn Registry,
        call: &OperationCall,
    ) -> Result<OperationOutputs, OperationError>;
}
