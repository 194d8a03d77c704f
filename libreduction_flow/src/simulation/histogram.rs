use ndarray::{Array2, Axis};

use super::{matrix_input, single_output};
use crate::error::OperationError;
use crate::operation::{OperationCall, OperationOutputs};
use crate::registry::Registry;
use crate::workspace::{MatrixWorkspace, UNIT_TOF, UNIT_WAVELENGTH};

/// Neutron mass over Planck constant, in us / (m * Angstrom)
const TOF_TO_WAVELENGTH: f64 = 3.956034e-3;

pub(super) fn create_single_valued(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let value = call.float("DataValue")?;
    single_output(registry, call, MatrixWorkspace::single_valued(value))
}

/// Build a workspace from flat X and Y lists. X may hold bin edges or one point per bin.
pub(super) fn create_workspace(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let data_x = call.floats("DataX")?;
    let data_y = call.floats("DataY")?;
    let n_spec = call.int_or("NSpec", 1)?;
    if n_spec < 1 || data_y.len() % n_spec as usize != 0 || data_y.is_empty() {
        return Err(call.failed("DataY does not divide into NSpec spectra"));
    }
    let n_spec = n_spec as usize;
    let bins = data_y.len() / n_spec;
    let x: Array2<f64> = if data_x.len() == data_y.len() {
        // Point data, one unit wide bins starting at each point
        Array2::from_shape_fn((n_spec, bins + 1), |(i, j)| {
            if j < bins {
                data_x[i * bins + j]
            } else {
                data_x[i * bins + bins - 1] + 1.0
            }
        })
    } else if data_x.len() == n_spec * (bins + 1) {
        Array2::from_shape_fn((n_spec, bins + 1), |(i, j)| data_x[i * (bins + 1) + j])
    } else {
        return Err(call.failed("DataX length matches neither points nor bin edges"));
    };
    let y = Array2::from_shape_fn((n_spec, bins), |(i, j)| data_y[i * bins + j]);
    let mut ws = MatrixWorkspace::from_xy(x, y)?;
    if call.optional_input("ParentWorkspace").is_some() {
        let parent = matrix_input(registry, call, "ParentWorkspace")?;
        if parent.histogram_count() == n_spec {
            ws.spectrum_numbers = parent.spectrum_numbers.clone();
            ws.detector_ids = parent.detector_ids.clone();
            ws.l2 = parent.l2.clone();
            ws.monitors = parent.monitors.clone();
            ws.masked = parent.masked.clone();
        }
        ws = ws.with_metadata_of(&parent);
    }
    single_output(registry, call, ws)
}

pub(super) fn scale(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut ws = matrix_input(registry, call, "InputWorkspace")?;
    let factor = call.float("Factor")?;
    match call.text("Operation").unwrap_or("Multiply") {
        "Add" => ws.y.mapv_inplace(|v| v + factor),
        _ => ws.y.mapv_inplace(|v| v * factor),
    }
    single_output(registry, call, ws)
}

#[derive(Debug, Clone, Copy)]
enum Broadcast {
    Single,
    PerSpectrum,
    Full,
}

/// Plus and Minus. The right hand side may be a single value, one value per spectrum,
/// or match the left hand side exactly. Masks of both sides combine.
pub(super) fn binary_operation(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut lhs = matrix_input(registry, call, "LHSWorkspace")?;
    let rhs = matrix_input(registry, call, "RHSWorkspace")?;
    let op: fn(f64, f64) -> f64 = match call.name.as_str() {
        "Plus" => |a, b| a + b,
        _ => |a, b| a - b,
    };
    let (n, bins) = lhs.y.dim();
    let broadcast = match rhs.y.dim() {
        (1, 1) => Broadcast::Single,
        (rn, 1) if rn == n => Broadcast::PerSpectrum,
        (rn, rb) if rn == n && rb == bins => Broadcast::Full,
        other => {
            return Err(call.failed(format!(
                "cannot combine shapes {:?} and {:?}",
                lhs.y.dim(),
                other
            )))
        }
    };
    for i in 0..n {
        for j in 0..bins {
            let b = match broadcast {
                Broadcast::Single => rhs.y[[0, 0]],
                Broadcast::PerSpectrum => rhs.y[[i, 0]],
                Broadcast::Full => rhs.y[[i, j]],
            };
            lhs.y[[i, j]] = op(lhs.y[[i, j]], b);
        }
    }
    if rhs.histogram_count() == n {
        for i in 0..n {
            if rhs.is_masked(i) {
                lhs.masked.set(i, true);
            }
        }
    }
    single_output(registry, call, lhs)
}

/// Keep the bins lying within [XMin, XMax]
pub(super) fn crop(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let x_min = call.float("XMin")?;
    let x_max = call.float("XMax")?;
    let tolerance = 1e-9 * (1.0 + x_max.abs());
    let kept: Vec<usize> = (0..ws.bin_count())
        .filter(|&j| ws.x[[0, j]] >= x_min - tolerance && ws.x[[0, j + 1]] <= x_max + tolerance)
        .collect();
    let (Some(&first), Some(&last)) = (kept.first(), kept.last()) else {
        return Err(call.failed("no bins within the crop range"));
    };
    let mut cropped = ws.clone();
    cropped.x = ws.x.slice(ndarray::s![.., first..last + 2]).to_owned();
    cropped.y = ws.y.slice(ndarray::s![.., first..last + 1]).to_owned();
    single_output(registry, call, cropped)
}

/// Moving average flat background. Every bin of the output holds the smallest window average
/// found in its spectrum.
pub(super) fn flat_background(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut ws = matrix_input(registry, call, "InputWorkspace")?;
    let window = call.int("AveragingWindowWidth")?;
    if window < 1 {
        return Err(call.failed("averaging window must be at least one bin"));
    }
    let window = (window as usize).min(ws.bin_count().max(1));
    for mut row in ws.y.axis_iter_mut(Axis(0)) {
        let values = row.to_vec();
        let background = values
            .windows(window)
            .map(|w| w.iter().sum::<f64>() / window as f64)
            .fold(f64::INFINITY, f64::min);
        let background = if background.is_finite() {
            background
        } else {
            0.0
        };
        row.fill(background);
    }
    single_output(registry, call, ws)
}

/// Fit a polynomial across spectra, bin by bin, using spectra whose spectrum numbers fall
/// within XRanges (pairs of lower and upper limits). The fit is evaluated on every spectrum.
pub(super) fn polynomial_background(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut ws = matrix_input(registry, call, "InputWorkspace")?;
    let degree = call.int("Degree")?;
    let ranges = call.floats("XRanges")?;
    if !(0..=1).contains(&degree) {
        return Err(call.failed("only constant and linear backgrounds are supported"));
    }
    if ranges.len() % 2 != 0 {
        return Err(call.failed("XRanges must come in pairs"));
    }
    let positions: Vec<f64> = ws.spectrum_numbers.iter().map(|&n| n as f64).collect();
    let fit_spectra: Vec<usize> = (0..ws.histogram_count())
        .filter(|&i| {
            ranges
                .chunks(2)
                .any(|r| positions[i] >= r[0] && positions[i] <= r[1])
        })
        .collect();
    if fit_spectra.len() < degree as usize + 1 {
        return Err(call.failed("too few spectra within the background ranges"));
    }
    for j in 0..ws.bin_count() {
        let points: Vec<(f64, f64)> = fit_spectra
            .iter()
            .map(|&i| (positions[i], ws.y[[i, j]]))
            .collect();
        let (intercept, slope) = least_squares(&points, degree == 1);
        for i in 0..ws.histogram_count() {
            ws.y[[i, j]] = intercept + slope * positions[i];
        }
    }
    single_output(registry, call, ws)
}

fn least_squares(points: &[(f64, f64)], linear: bool) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    if !linear {
        return (mean_y, 0.0);
    }
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    if sxx == 0.0 {
        return (mean_y, 0.0);
    }
    let slope = sxy / sxx;
    (mean_y - slope * mean_x, slope)
}

/// Sum each spectrum between its own lower and upper limit
pub(super) fn integration(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let n = ws.histogram_count();
    let lowers = call.floats("RangeLowerList")?;
    let uppers = call.floats("RangeUpperList")?;
    if lowers.len() != n || uppers.len() != n {
        return Err(call.failed("integration ranges must match the number of spectra"));
    }
    let partial = call.bool_or("IncludePartialBins", false)?;
    let mut x = Array2::<f64>::zeros((n, 2));
    let mut y = Array2::<f64>::zeros((n, 1));
    for i in 0..n {
        let (lo, hi) = (lowers[i], uppers[i]);
        x[[i, 0]] = lo;
        x[[i, 1]] = hi;
        let mut sum = 0.0;
        for j in 0..ws.bin_count() {
            let (x0, x1) = (ws.x[[i, j]], ws.x[[i, j + 1]]);
            let width = x1 - x0;
            let overlap = hi.min(x1) - lo.max(x0);
            if overlap <= 0.0 || width <= 0.0 {
                continue;
            }
            if partial {
                sum += ws.y[[i, j]] * overlap / width;
            } else if x0 >= lo && x1 <= hi {
                sum += ws.y[[i, j]];
            }
        }
        y[[i, 0]] = sum;
    }
    let mut integrated = MatrixWorkspace::from_xy(x, y)?.with_metadata_of(&ws);
    integrated.spectrum_numbers = ws.spectrum_numbers.clone();
    integrated.detector_ids = ws.detector_ids.clone();
    integrated.l2 = ws.l2.clone();
    integrated.monitors = ws.monitors.clone();
    integrated.masked = ws.masked.clone();
    single_output(registry, call, integrated)
}

/// Sum the listed spectra into one
pub(super) fn group_detectors(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let indices = call.ints("WorkspaceIndexList")?;
    if indices.is_empty() {
        return Err(call.failed("nothing to group"));
    }
    let indices = indices
        .iter()
        .map(|&i| ws.workspace_index(i, crate::workspace::IndexType::WorkspaceIndex))
        .collect::<Result<Vec<usize>, _>>()?;
    let mut grouped = ws.select_spectra(&indices[..1]);
    for &i in indices.iter().skip(1) {
        let row = ws.read_y(i).to_owned();
        let mut target = grouped.y.row_mut(0);
        target += &row;
    }
    let l2 = indices.iter().map(|&i| ws.l2[i]).sum::<f64>() / indices.len() as f64;
    grouped.l2 = vec![l2];
    single_output(registry, call, grouped)
}

/// TOF to wavelength over the flight path `l1 + l2`
pub(super) fn convert_units(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut ws = matrix_input(registry, call, "InputWorkspace")?;
    let target = call.text("Target")?;
    if target != UNIT_WAVELENGTH {
        return Err(call.failed(format!("conversion to {target} is not supported")));
    }
    if ws.unit == UNIT_WAVELENGTH {
        return single_output(registry, call, ws);
    }
    if ws.unit != UNIT_TOF {
        return Err(call.failed(format!("cannot convert from {}", ws.unit)));
    }
    let l1 = ws.instrument.number_parameter("l1").unwrap_or(0.0);
    for i in 0..ws.histogram_count() {
        let flight_path = l1 + ws.l2[i];
        if flight_path <= 0.0 {
            return Err(call.failed(format!("spectrum {i} has no flight path")));
        }
        ws.x
            .row_mut(i)
            .mapv_inplace(|t| TOF_TO_WAVELENGTH * t / flight_path);
    }
    ws.unit = String::from(UNIT_WAVELENGTH);
    single_output(registry, call, ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;
    use crate::operation::Engine;
    use crate::registry::InMemoryRegistry;
    use crate::simulation::SimulatedEngine;
    use ndarray::array;

    fn two_spectra() -> MatrixWorkspace {
        let x = array![[0.0, 1.0, 2.0, 3.0], [0.0, 1.0, 2.0, 3.0]];
        let y = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        MatrixWorkspace::from_xy(x, y).unwrap()
    }

    #[test]
    fn test_minus_broadcasts_per_spectrum() {
        let mut registry = InMemoryRegistry::new();
        let lhs = Identifier::new("lhs");
        let rhs = Identifier::new("rhs");
        registry.store(lhs.clone(), two_spectra().into());
        let bkg = MatrixWorkspace::from_xy(array![[0.0, 1.0], [0.0, 1.0]], array![[1.0], [4.0]]).unwrap();
        registry.store(rhs.clone(), bkg.into());
        let mut engine = SimulatedEngine::new();
        engine
            .execute(
                &mut registry,
                &OperationCall::new("Minus")
                    .with_input("LHSWorkspace", &lhs)
                    .with_input("RHSWorkspace", &rhs)
                    .with_output("OutputWorkspace", &Identifier::new("out")),
            )
            .unwrap();
        let out = registry.matrix(&Identifier::new("out")).unwrap();
        assert_eq!(out.y, array![[0.0, 1.0, 2.0], [0.0, 1.0, 2.0]]);
    }

    #[test]
    fn test_crop_in_place_to_first_bin() {
        let mut registry = InMemoryRegistry::new();
        let id = Identifier::new("bkg");
        registry.store(id.clone(), two_spectra().into());
        let mut engine = SimulatedEngine::new();
        engine
            .execute(
                &mut registry,
                &OperationCall::new("CropWorkspace")
                    .with_input("InputWorkspace", &id)
                    .with_output("OutputWorkspace", &id)
                    .with_param("XMin", 0.0)
                    .with_param("XMax", 1.0),
            )
            .unwrap();
        let cropped = registry.matrix(&id).unwrap();
        assert_eq!(cropped.bin_count(), 1);
        assert_eq!(cropped.read_y(1)[0], 4.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_integration_partial_bins() {
        let mut registry = InMemoryRegistry::new();
        let id = Identifier::new("ws");
        registry.store(id.clone(), two_spectra().into());
        let mut engine = SimulatedEngine::new();
        engine
            .execute(
                &mut registry,
                &OperationCall::new("Integration")
                    .with_input("InputWorkspace", &id)
                    .with_output("OutputWorkspace", &Identifier::new("int"))
                    .with_param("RangeLowerList", vec![0.5, 0.0])
                    .with_param("RangeUpperList", vec![2.0, 0.0])
                    .with_param("IncludePartialBins", true),
            )
            .unwrap();
        let integrated = registry.matrix(&Identifier::new("int")).unwrap();
        assert_eq!(integrated.read_y(0)[0], 0.5 + 2.0);
        // Empty range integrates to nothing
        assert_eq!(integrated.read_y(1)[0], 0.0);
    }

    #[test]
    fn test_linear_background_fit() {
        let (intercept, slope) = least_squares(&[(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)], true);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!((slope - 2.0).abs() < 1e-12);
        let (constant, none) = least_squares(&[(1.0, 3.0), (2.0, 5.0)], false);
        assert_eq!(constant, 4.0);
        assert_eq!(none, 0.0);
    }
}
