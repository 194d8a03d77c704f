use std::path::PathBuf;

use super::fixture::SyntheticWorkspace;
use super::{matrix_input, single_output, store_output, table_input};
use crate::error::OperationError;
use crate::operation::{OperationCall, OperationOutputs};
use crate::registry::Registry;
use crate::workspace::{Cell, LogValue, TableWorkspace, COLUMN_FITTED_PEAK_CENTRE};

const SUMMED_LOGS: [&str; 2] = ["duration", "actual_time"];

pub(super) fn load(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let path = PathBuf::from(call.text("Filename")?);
    let ws = SyntheticWorkspace::read_file(&path)?.build()?;
    single_output(registry, call, ws)
}

/// Load a reflectometry run, optionally producing the beam position table of the run.
/// With a `BeamPosition` input that table is passed through instead.
pub(super) fn load_reflectometry(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let path = PathBuf::from(call.text("Filename")?);
    let ws = SyntheticWorkspace::read_file(&path)?.build()?;
    let beam_position = match call.optional_input("BeamPosition") {
        Some(_) => table_input(registry, call, "BeamPosition")?,
        None => {
            let detectors: Vec<usize> = (0..ws.histogram_count())
                .filter(|&i| !ws.is_monitor(i))
                .collect();
            let centre = detectors
                .iter()
                .enumerate()
                .max_by(|a, b| ws.read_y(*a.1).sum().total_cmp(&ws.read_y(*b.1).sum()))
                .map(|(position, _)| position)
                .ok_or_else(|| call.failed("no detectors to find the beam on"))?;
            let mut table = TableWorkspace::new();
            table.add_column(COLUMN_FITTED_PEAK_CENTRE, vec![Cell::Float(centre as f64)]);
            table
        }
    };
    let mut outputs = single_output(registry, call, ws)?;
    if call.optional_output("OutputBeamPosition").is_some() {
        let id = store_output(registry, call, "OutputBeamPosition", beam_position)?;
        outputs = outputs.with_workspace("OutputBeamPosition", &id);
    }
    Ok(outputs)
}

/// Sum the counts of one or two runs. Acquisition times add up.
pub(super) fn merge_runs(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut merged = matrix_input(registry, call, "InputWorkspace")?;
    if call.optional_input("AdditionalWorkspace").is_some() {
        let other = matrix_input(registry, call, "AdditionalWorkspace")?;
        if other.y.dim() != merged.y.dim() {
            return Err(call.failed("runs have different shapes"));
        }
        merged.y = &merged.y + &other.y;
        for log in SUMMED_LOGS {
            if let (Some(a), Some(b)) = (merged.log_number(log), other.log_number(log)) {
                merged
                    .logs
                    .insert(log.to_string(), LogValue::Number(a + b));
            }
        }
    }
    single_output(registry, call, merged)
}

/// Split monitors and detectors. An output is only written if there is something to put in it.
pub(super) fn extract_monitors(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let (monitors, detectors): (Vec<usize>, Vec<usize>) =
        (0..ws.histogram_count()).partition(|&i| ws.is_monitor(i));
    let mut outputs = OperationOutputs::new();
    if !detectors.is_empty() && call.optional_output("DetectorWorkspace").is_some() {
        let id = store_output(
            registry,
            call,
            "DetectorWorkspace",
            ws.select_spectra(&detectors),
        )?;
        outputs = outputs.with_workspace("DetectorWorkspace", &id);
    }
    if !monitors.is_empty() && call.optional_output("MonitorWorkspace").is_some() {
        let id = store_output(
            registry,
            call,
            "MonitorWorkspace",
            ws.select_spectra(&monitors),
        )?;
        outputs = outputs.with_workspace("MonitorWorkspace", &id);
    }
    Ok(outputs)
}

pub(super) fn clone_workspace(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let input = call.input("InputWorkspace")?;
    let ws = registry
        .retrieve(input)
        .cloned()
        .ok_or_else(|| crate::error::RegistryError::Missing(input.clone()))?;
    single_output(registry, call, ws)
}

/// Set a sample log in place
pub(super) fn add_sample_log(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let id = call.input("Workspace")?.clone();
    let mut ws = registry.matrix(&id)?.clone();
    let name = call.text("LogName")?;
    let text = call.text("LogText")?;
    let value = match call.text("LogType").unwrap_or("String") {
        "Number" => LogValue::Number(
            text.trim()
                .parse()
                .map_err(|_| call.failed(format!("{text} is not a number")))?,
        ),
        _ => LogValue::Text(text.to_string()),
    };
    ws.logs.insert(name.to_string(), value);
    registry.store(id.clone(), ws.into());
    Ok(OperationOutputs::new().with_workspace("Workspace", &id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;
    use crate::operation::Engine;
    use crate::registry::InMemoryRegistry;
    use crate::simulation::SimulatedEngine;

    fn fixture_file(name: &str, fixture: &SyntheticWorkspace) -> PathBuf {
        let path = std::env::temp_dir().join(format!("reduction_flow_loading_{name}.yml"));
        fixture.write_file(&path).unwrap();
        path
    }

    #[test]
    fn test_load_and_extract_monitors() {
        let path = fixture_file("extract", &SyntheticWorkspace::default());
        let mut registry = InMemoryRegistry::new();
        let mut engine = SimulatedEngine::new();
        let raw = Identifier::new("raw");
        engine
            .execute(
                &mut registry,
                &OperationCall::new("Load")
                    .with_param("Filename", path.to_string_lossy().to_string())
                    .with_output("OutputWorkspace", &raw),
            )
            .unwrap();
        let outputs = engine
            .execute(
                &mut registry,
                &OperationCall::new("ExtractMonitors")
                    .with_input("InputWorkspace", &raw)
                    .with_output("DetectorWorkspace", &Identifier::new("dets"))
                    .with_output("MonitorWorkspace", &Identifier::new("mons")),
            )
            .unwrap();
        assert!(outputs.workspace("DetectorWorkspace").is_some());
        let mons = registry.matrix(&Identifier::new("mons")).unwrap();
        assert_eq!(mons.histogram_count(), 1);
        assert_eq!(
            registry
                .matrix(&Identifier::new("dets"))
                .unwrap()
                .histogram_count(),
            4
        );
    }

    #[test]
    fn test_add_sample_log_in_place() {
        let mut registry = InMemoryRegistry::new();
        let id = Identifier::new("ws");
        registry.store(
            id.clone(),
            crate::workspace::MatrixWorkspace::single_valued(1.0).into(),
        );
        let mut engine = SimulatedEngine::new();
        engine
            .execute(
                &mut registry,
                &OperationCall::new("AddSampleLog")
                    .with_input("Workspace", &id)
                    .with_param("LogName", "Ei")
                    .with_param("LogText", "3.5")
                    .with_param("LogType", "Number"),
            )
            .unwrap();
        assert_eq!(registry.matrix(&id).unwrap().log_number("Ei"), Some(3.5));
    }
}
