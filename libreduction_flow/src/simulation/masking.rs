use ndarray::Array2;

use super::{matrix_input, single_output};
use crate::error::OperationError;
use crate::operation::{OperationCall, OperationOutputs};
use crate::registry::Registry;
use crate::workspace::{IndexType, MatrixWorkspace};

/// A one bin per spectrum workspace holding 1.0 where `flags` is set
fn mask_workspace(parent: &MatrixWorkspace, flags: impl Fn(usize) -> bool) -> MatrixWorkspace {
    let n = parent.histogram_count();
    let mut x = Array2::<f64>::zeros((n, 2));
    x.column_mut(1).fill(1.0);
    let y = Array2::from_shape_fn((n, 1), |(i, _)| if flags(i) { 1.0 } else { 0.0 });
    let mut mask = parent.select_spectra(&(0..n).collect::<Vec<usize>>());
    mask.x = x;
    mask.y = y;
    mask.masked.fill(false);
    mask
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

/// Flag spectra whose first bin strays too far from the median of all spectra.
///
/// A spectrum fails when it lies outside `[LowThreshold, HighThreshold] * median` and its
/// distance from the median exceeds `SignificanceTest` counting errors. Values outside
/// `[LowOutlier, HighOutlier] * median` do not take part in the final median. Monitors and
/// masked spectra are never flagged.
pub(super) fn median_detector_test(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let low = call.float("LowThreshold")?;
    let high = call.float("HighThreshold")?;
    let significance = call.float_or("SignificanceTest", 3.3)?;
    let low_outlier = call.float_or("LowOutlier", 0.01)?;
    let high_outlier = call.float_or("HighOutlier", 100.0)?;

    let candidates: Vec<usize> = (0..ws.histogram_count())
        .filter(|&i| !ws.is_monitor(i) && !ws.is_masked(i))
        .collect();
    let values: Vec<f64> = candidates.iter().map(|&i| ws.y[[i, 0]]).collect();
    let Some(rough) = median(&mut values.clone()) else {
        return Err(call.failed("no unmasked detectors to test"));
    };
    let mut kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|&v| v >= low_outlier * rough && v <= high_outlier * rough)
        .collect();
    let centre = median(&mut kept).unwrap_or(rough);

    let failed: Vec<bool> = (0..ws.histogram_count())
        .map(|i| {
            if !candidates.contains(&i) {
                return false;
            }
            let v = ws.y[[i, 0]];
            let outside = v < low * centre || v > high * centre;
            let error = v.abs().sqrt();
            outside && (v - centre).abs() > significance * error
        })
        .collect();
    let failures = failed.iter().filter(|f| **f).count();
    spdlog::debug!("{} found {failures} bad spectra", call.name);
    let outputs = single_output(registry, call, mask_workspace(&ws, |i| failed[i]))?;
    Ok(outputs.with_value("NumberOfFailures", failures as f64))
}

/// Mask spectra in place, either from a detector list or from a mask workspace
pub(super) fn mask_detectors(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let id = call.input("Workspace")?.clone();
    let mut ws = registry.matrix(&id)?.clone();
    let mut indices = match call.ints("DetectorList") {
        Ok(ids) => ws.workspace_indices(ids, IndexType::DetectorId)?,
        Err(_) => vec![],
    };
    if call.optional_input("MaskedWorkspace").is_some() {
        let mask = matrix_input(registry, call, "MaskedWorkspace")?;
        if mask.histogram_count() != ws.histogram_count() {
            return Err(call.failed("mask workspace does not match the spectra"));
        }
        indices.extend((0..mask.histogram_count()).filter(|&i| mask.y[[i, 0]] != 0.0));
    }
    for i in indices {
        ws.masked.set(i, true);
        ws.y.row_mut(i).fill(0.0);
    }
    registry.store(id.clone(), ws.into());
    Ok(OperationOutputs::new().with_workspace("Workspace", &id))
}

/// Turn the mask flags of a workspace into a mask workspace
pub(super) fn extract_mask(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let mask = mask_workspace(&ws, |i| ws.is_masked(i));
    let count = mask.y.iter().filter(|v| **v != 0.0).count();
    let outputs = single_output(registry, call, mask)?;
    Ok(outputs.with_value("MaskedCount", count as f64))
}
