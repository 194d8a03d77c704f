//! An in-process stand-in for the numerical library.
//!
//! Every operation the workflows use is implemented with plain ndarray arithmetic. The numbers
//! are crude (peaks are found by their maximum bin, Ei comes from the detector-monitor time
//! difference) but they are deterministic, and every operation reads and writes the registry
//! exactly like the real thing would: outputs overwrite whatever lives under the requested
//! name, in-place operations name their input as output.
pub mod fixture;
mod histogram;
mod loading;
mod masking;
mod peaks;

use std::collections::BTreeSet;

use crate::error::OperationError;
use crate::identifier::Identifier;
use crate::operation::{Engine, OperationCall, OperationOutputs};
use crate::registry::Registry;
use crate::workspace::{MatrixWorkspace, TableWorkspace, Workspace};

pub use fixture::{PeakShape, SyntheticWorkspace};

#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    history: Vec<String>,
    failing: BTreeSet<String>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of the named operation fail
    pub fn fail_on(&mut self, operation: &str) {
        self.failing.insert(operation.to_string());
    }

    /// Names of every operation executed so far, in order
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.history.iter().filter(|n| *n == operation).count()
    }
}

impl Engine for SimulatedEngine {
    fn execute(
        &mut self,
        registry: &mut dyn Registry,
        call: &OperationCall,
    ) -> Result<OperationOutputs, OperationError> {
        if call.enable_logging {
            spdlog::info!("{} started", call.name);
        } else {
            spdlog::debug!("{} started", call.name);
        }
        self.history.push(call.name.clone());
        if self.failing.contains(&call.name) {
            return Err(call.failed("simulated failure"));
        }
        let outputs = match call.name.as_str() {
            "Load" => loading::load(registry, call),
            "LoadILLReflectometry" => loading::load_reflectometry(registry, call),
            "MergeRuns" => loading::merge_runs(registry, call),
            "ExtractMonitors" => loading::extract_monitors(registry, call),
            "CloneWorkspace" => loading::clone_workspace(registry, call),
            "AddSampleLog" => loading::add_sample_log(registry, call),
            "CreateSingleValuedWorkspace" => histogram::create_single_valued(registry, call),
            "CreateWorkspace" => histogram::create_workspace(registry, call),
            "Scale" => histogram::scale(registry, call),
            "Plus" | "Minus" => histogram::binary_operation(registry, call),
            "CropWorkspace" => histogram::crop(registry, call),
            "CalculateFlatBackground" => histogram::flat_background(registry, call),
            "CalculatePolynomialBackground" => histogram::polynomial_background(registry, call),
            "Integration" => histogram::integration(registry, call),
            "GroupDetectors" => histogram::group_detectors(registry, call),
            "ConvertUnits" => histogram::convert_units(registry, call),
            "FindEPP" => peaks::find_epp(registry, call),
            "CreateEPP" => peaks::create_epp(registry, call),
            "NormaliseToMonitor" => peaks::normalise_to_monitor(registry, call),
            "GetEiMonDet" => peaks::get_ei_mon_det(registry, call),
            "CorrectTOFAxis" => peaks::correct_tof_axis(registry, call),
            "MedianDetectorTest" => masking::median_detector_test(registry, call),
            "MaskDetectors" => masking::mask_detectors(registry, call),
            "ExtractMask" => masking::extract_mask(registry, call),
            _ => Err(OperationError::Unknown(call.name.clone())),
        }?;
        spdlog::trace!("{} produced {:?}", call.name, outputs.workspaces);
        Ok(outputs)
    }
}

fn matrix_input(
    registry: &dyn Registry,
    call: &OperationCall,
    property: &str,
) -> Result<MatrixWorkspace, OperationError> {
    Ok(registry.matrix(call.input(property)?)?.clone())
}

fn table_input(
    registry: &dyn Registry,
    call: &OperationCall,
    property: &str,
) -> Result<TableWorkspace, OperationError> {
    Ok(registry.table(call.input(property)?)?.clone())
}

/// Store ws under the name requested for the output property
fn store_output(
    registry: &mut dyn Registry,
    call: &OperationCall,
    property: &str,
    ws: impl Into<Workspace>,
) -> Result<Identifier, OperationError> {
    let id = call.output(property)?.clone();
    registry.store(id.clone(), ws.into());
    Ok(id)
}

/// The usual single-output case
fn single_output(
    registry: &mut dyn Registry,
    call: &OperationCall,
    ws: impl Into<Workspace>,
) -> Result<OperationOutputs, OperationError> {
    let id = store_output(registry, call, "OutputWorkspace", ws)?;
    Ok(OperationOutputs::new().with_workspace("OutputWorkspace", &id))
}

fn bin_centre(ws: &MatrixWorkspace, index: usize, bin: usize) -> f64 {
    0.5 * (ws.x[[index, bin]] + ws.x[[index, bin + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    #[test]
    fn test_unknown_operation() {
        let mut registry = InMemoryRegistry::new();
        let mut engine = SimulatedEngine::new();
        let result = engine.execute(&mut registry, &OperationCall::new("Rebin"));
        assert!(matches!(result, Err(OperationError::Unknown(_))));
        assert_eq!(engine.history(), &[String::from("Rebin")]);
    }

    #[test]
    fn test_injected_failure() {
        let mut registry = InMemoryRegistry::new();
        let mut engine = SimulatedEngine::new();
        engine.fail_on("CreateSingleValuedWorkspace");
        let call = OperationCall::new("CreateSingleValuedWorkspace")
            .with_output("OutputWorkspace", &Identifier::new("one"))
            .with_param("DataValue", 1.0);
        assert!(engine.execute(&mut registry, &call).is_err());
        assert!(registry.is_empty());
    }
}
