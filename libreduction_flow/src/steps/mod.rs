//! Workflow steps: the single-operation building blocks every workflow is made of.
//!
//! A step names its outputs through the run's [`NameSource`], invokes exactly one operation of
//! the [`Engine`] and hands back the resulting identifiers. Steps never delete anything, not
//! even their own inputs. Deciding what is no longer needed is left to the workflow holding
//! the [`IntermediateCleanup`](crate::cleanup::IntermediateCleanup), which a step has no
//! access to.
pub mod arithmetic;
pub mod background;
pub mod calibration;
pub mod epp;
pub mod loading;
pub mod masking;
pub mod normalisation;
pub mod units;

use super::error::StepError;
use super::identifier::Identifier;
use super::names::NameSource;
use super::operation::{Engine, OperationCall, OperationOutputs};
use super::registry::Registry;
use super::report::Report;
use super::workspace::{MatrixWorkspace, TableWorkspace};

pub use arithmetic::{AddSampleLog, CloneWorkspace, Minus, Plus, Scale};
pub use background::{CalculateFlatBackground, CropToFirstBin, PolynomialBackground};
pub use calibration::{
    CalibratedIncidentEnergy, CorrectTofAxis, CreateSingleValued, CreateWorkspace,
};
pub use epp::{CalculateEpp, FitEpp};
pub use loading::{ExtractMonitors, LoadFile, LoadReflectometry, MergeRuns};
pub use masking::{ExtractMask, Integrate, MaskDetectors, MedianDetectorTest};
pub use normalisation::{NormaliseToMonitor, NormaliseToSlits, NormaliseToTime};
pub use units::{ConvertToWavelength, GroupDetectors};

/// Which of the two data streams of a TOF measurement a workspace holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    Detectors,
    Monitors,
}

impl Content {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detectors => "detectors",
            Self::Monitors => "monitors",
        }
    }
}

impl std::fmt::Display for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a step may touch while it runs
pub struct StepContext<'a> {
    pub registry: &'a mut dyn Registry,
    pub engine: &'a mut dyn Engine,
    pub names: &'a NameSource,
    pub report: &'a mut Report,
    pub logging: bool,
}

impl StepContext<'_> {
    /// Run an operation with the run's logging setting
    pub fn execute(&mut self, call: OperationCall) -> Result<OperationOutputs, StepError> {
        let call = call.with_logging(self.logging);
        Ok(self.engine.execute(&mut *self.registry, &call)?)
    }

    pub fn matrix(&self, id: &Identifier) -> Result<&MatrixWorkspace, StepError> {
        Ok(self.registry.matrix(id)?)
    }

    pub fn table(&self, id: &Identifier) -> Result<&TableWorkspace, StepError> {
        Ok(self.registry.table(id)?)
    }
}

/// A WorkflowStep is one operation wrapped with its naming
pub trait WorkflowStep {
    type Input;
    type Output;

    /// Human readable name for logs and progress
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: &mut StepContext, input: Self::Input) -> Result<Self::Output, StepError>;
}

/// Pick a workspace output out of what an operation produced
pub(crate) fn produced(
    outputs: &OperationOutputs,
    operation: &str,
    property: &str,
) -> Result<Identifier, StepError> {
    outputs
        .workspace(property)
        .cloned()
        .ok_or_else(|| StepError::MissingOutput {
            operation: operation.to_string(),
            property: property.to_string(),
        })
}

/// Single input, single output operation call
pub(crate) fn unary(
    ctx: &StepContext,
    operation: &str,
    input: &Identifier,
    suffix: &str,
) -> OperationCall {
    OperationCall::new(operation)
        .with_input("InputWorkspace", input)
        .with_output("OutputWorkspace", &ctx.names.with_suffix(suffix))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::CleanupMode;
    use crate::registry::InMemoryRegistry;
    use crate::simulation::SimulatedEngine;

    /// Owns everything a StepContext borrows
    pub struct Harness {
        pub registry: InMemoryRegistry,
        pub engine: SimulatedEngine,
        pub names: NameSource,
        pub report: Report,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                registry: InMemoryRegistry::new(),
                engine: SimulatedEngine::new(),
                names: NameSource::new("test", CleanupMode::Off),
                report: Report::new(),
            }
        }

        pub fn with_workspace(
            mut self,
            name: &str,
            ws: impl Into<crate::workspace::Workspace>,
        ) -> Self {
            self.registry.store(Identifier::new(name), ws.into());
            self
        }

        pub fn apply<S: WorkflowStep>(
            &mut self,
            step: &S,
            input: S::Input,
        ) -> Result<S::Output, StepError> {
            let mut ctx = StepContext {
                registry: &mut self.registry,
                engine: &mut self.engine,
                names: &self.names,
                report: &mut self.report,
                logging: false,
            };
            step.apply(&mut ctx, input)
        }
    }
}
