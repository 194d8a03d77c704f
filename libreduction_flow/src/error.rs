use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

use super::identifier::Identifier;
use super::progress::StageStatus;

#[derive(Debug, Clone, Error)]
pub enum WorkspaceError {
    #[error("Workspace bin edges of shape {x:?} do not fit counts of shape {y:?}")]
    ShapeMismatch {
        x: (usize, usize),
        y: (usize, usize),
    },
    #[error("Workspace index {0} is out of range")]
    IndexOutOfRange(i64),
    #[error("No workspace index found for spectrum number {0}")]
    NoSuchSpectrum(i64),
    #[error("No workspace index found for detector id {0}")]
    NoSuchDetector(i64),
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Registry has no workspace named {0}")]
    Missing(Identifier),
    #[error("Registry entry {id} is not a {expected}")]
    WrongKind {
        id: Identifier,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Unknown operation {0}")]
    Unknown(String),
    #[error("Operation {operation} is missing input workspace property {property}")]
    MissingInput {
        operation: String,
        property: String,
    },
    #[error("Operation {operation} is missing parameter {parameter}")]
    MissingParameter {
        operation: String,
        parameter: String,
    },
    #[error("Operation {operation} failed: {reason}")]
    Failed { operation: String, reason: String },
    #[error("Operation failed due to registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Operation failed due to workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("Operation failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Operation failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step failed due to operation error: {0}")]
    Operation(#[from] OperationError),
    #[error("Step failed due to registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Step failed due to workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("Operation {operation} did not produce output {property}")]
    MissingOutput { operation: String, property: String },
    #[error("Cannot normalise to acquisition time: time is zero.")]
    ZeroTime,
    #[error("Cannot normalise to acquisition time: time is negative ({0}).")]
    NegativeTime(f64),
    #[error("Cannot normalise to acquisition time: time is not a finite number ({0}).")]
    NonFiniteTime(f64),
    #[error("Sample log {0} is missing")]
    MissingSampleLog(String),
    #[error("Instrument parameter {0} is missing")]
    MissingInstrumentParameter(String),
    #[error("No detectors in the input data.")]
    NoDetectors,
    #[error("Cannot normalise to monitor data: no monitors in input data.")]
    NoMonitors,
    #[error("EPP table has no row {0}")]
    MissingEppRow(usize),
    #[error("Beam position table has no fitted peak centre")]
    MissingBeamPosition,
    #[error("{0} is not implemented.")]
    NotImplemented(String),
}

/// Per-property problems found before a workflow runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
pub struct ValidationIssues(pub BTreeMap<String, String>);

impl ValidationIssues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: &str, reason: &str) {
        self.0.insert(property.to_string(), reason.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.0.get(property).map(|s| s.as_str())
    }

    /// Ok if nothing was found, otherwise self as the error
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationIssues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid properties:")?;
        for (property, reason) in self.0.iter() {
            write!(f, " {property}: {reason};")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow rejected its inputs: {0}")]
    Validation(#[from] ValidationIssues),
    #[error("Workflow failed due to step error: {0}")]
    Step(#[from] StepError),
    #[error("Workflow failed due to registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Workflow failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<StageStatus>),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed to preload a workspace: {0}")]
    Preload(#[from] OperationError),
}
