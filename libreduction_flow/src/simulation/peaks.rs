use super::{bin_centre, matrix_input, single_output, store_output, table_input};
use crate::error::OperationError;
use crate::operation::{OperationCall, OperationOutputs};
use crate::registry::Registry;
use crate::workspace::{EppRow, MatrixWorkspace, FIT_FAILED, FIT_SUCCESS};

/// E = ENERGY_PER_VELOCITY_SQUARED * v^2, E in meV and v in m/s
const ENERGY_PER_VELOCITY_SQUARED: f64 = 5.227037e-6;
const FWHM_PER_SIGMA: f64 = 2.354820;

fn failed_row() -> EppRow {
    EppRow {
        peak_centre: 0.0,
        sigma: 0.0,
        height: 0.0,
        fit_status: String::from(FIT_FAILED),
    }
}

/// Locate the peak of one spectrum by its maximum and half-maximum width
fn peak_of(ws: &MatrixWorkspace, index: usize) -> EppRow {
    let row = ws.read_y(index);
    let bins = row.len();
    if bins == 0 {
        return failed_row();
    }
    let mut max_bin = 0;
    for j in 1..bins {
        if row[j] > row[max_bin] {
            max_bin = j;
        }
    }
    let minimum = row.iter().copied().fold(f64::INFINITY, f64::min);
    let height = row[max_bin] - minimum;
    if height <= 0.0 || !height.is_finite() {
        return failed_row();
    }
    let half = minimum + 0.5 * height;
    let mut left = max_bin;
    while left > 0 && row[left - 1] >= half {
        left -= 1;
    }
    let mut right = max_bin;
    while right + 1 < bins && row[right + 1] >= half {
        right += 1;
    }
    let fwhm = ws.x[[index, right + 1]] - ws.x[[index, left]];
    EppRow {
        peak_centre: bin_centre(ws, index, max_bin),
        sigma: fwhm / FWHM_PER_SIGMA,
        height,
        fit_status: String::from(FIT_SUCCESS),
    }
}

pub(super) fn find_epp(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let rows: Vec<EppRow> = (0..ws.histogram_count())
        .map(|i| peak_of(&ws, i))
        .collect();
    single_output(registry, call, EppRow::to_table(&rows))
}

/// EPP table with a fixed sigma. Peaks sit at the elastic channel when the run knows it.
pub(super) fn create_epp(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let ws = matrix_input(registry, call, "InputWorkspace")?;
    let sigma = call.float("Sigma")?;
    let elastic_bin = ws
        .log_number("Detector.elasticpeak")
        .map(|b| b.round() as usize)
        .filter(|&b| b < ws.bin_count());
    let rows: Vec<EppRow> = (0..ws.histogram_count())
        .map(|i| {
            let found = peak_of(&ws, i);
            match elastic_bin {
                Some(bin) => EppRow {
                    peak_centre: bin_centre(&ws, i, bin),
                    sigma,
                    height: ws.y[[i, bin]],
                    fit_status: String::from(FIT_SUCCESS),
                },
                None if found.is_success() => EppRow { sigma, ..found },
                None => found,
            }
        })
        .collect();
    single_output(registry, call, EppRow::to_table(&rows))
}

/// Divide by the monitor counts within the integration range
pub(super) fn normalise_to_monitor(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut ws = matrix_input(registry, call, "InputWorkspace")?;
    let monitor = matrix_input(registry, call, "MonitorWorkspace")?;
    let index = call.int("MonitorWorkspaceIndex")?;
    let index = monitor.workspace_index(index, crate::workspace::IndexType::WorkspaceIndex)?;
    let begin = call.float("IntegrationRangeMin")?;
    let end = call.float("IntegrationRangeMax")?;
    let factor: f64 = (0..monitor.bin_count())
        .filter(|&j| {
            let c = bin_centre(&monitor, index, j);
            c >= begin && c <= end
        })
        .map(|j| monitor.y[[index, j]])
        .sum();
    if factor <= 0.0 {
        return Err(call.failed("monitor counts within the integration range are not positive"));
    }
    ws.y.mapv_inplace(|v| v / factor);
    let mut outputs = single_output(registry, call, ws)?;
    if call.optional_output("NormFactorWS").is_some() {
        let id = store_output(
            registry,
            call,
            "NormFactorWS",
            MatrixWorkspace::single_valued(factor),
        )?;
        outputs = outputs.with_workspace("NormFactorWS", &id);
    }
    Ok(outputs)
}

/// Incident energy from the time it takes neutrons to get from the monitor to the detectors
pub(super) fn get_ei_mon_det(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let detectors = matrix_input(registry, call, "DetectorWorkspace")?;
    let detector_epp = table_input(registry, call, "DetectorEPPTable")?;
    let monitor_epp = table_input(registry, call, "MonitorEppTable")?;
    let monitor_index = call.int("Monitor")?;
    let monitor_row = usize::try_from(monitor_index)
        .ok()
        .and_then(|i| EppRow::read(&monitor_epp, i))
        .filter(|row| row.is_success())
        .ok_or_else(|| call.failed("no successful monitor peak fit"))?;
    let (count, tof_sum, l2_sum) = (0..detectors.histogram_count())
        .filter_map(|i| EppRow::read(&detector_epp, i).map(|row| (i, row)))
        .filter(|(i, row)| row.is_success() && !detectors.is_masked(*i))
        .fold((0usize, 0.0, 0.0), |acc, (i, row)| {
            (acc.0 + 1, acc.1 + row.peak_centre, acc.2 + detectors.l2[i])
        });
    if count == 0 {
        return Err(call.failed("no successful detector peak fits"));
    }
    let flight_time = tof_sum / count as f64 - monitor_row.peak_centre;
    let distance = l2_sum / count as f64;
    if flight_time <= 0.0 || distance <= 0.0 {
        return Err(call.failed("detector peaks arrive before the monitor peak"));
    }
    let velocity = distance / (flight_time * 1e-6);
    let energy = ENERGY_PER_VELOCITY_SQUARED * velocity * velocity;
    Ok(OperationOutputs::new().with_value("IncidentEnergy", energy))
}

/// Shift the TOF axis so that the elastic bin sits at the nominal elastic time of flight
pub(super) fn correct_tof_axis(
    registry: &mut dyn Registry,
    call: &OperationCall,
) -> Result<OperationOutputs, OperationError> {
    let mut ws = matrix_input(registry, call, "InputWorkspace")?;
    let elastic_bin = call.int("ElasticBinIndex")?;
    let l2 = call.float("L2")?;
    if elastic_bin < 0 || elastic_bin as usize >= ws.bin_count() {
        return Err(call.failed(format!("elastic bin {elastic_bin} is out of range")));
    }
    let energy = ws
        .log_number("Ei")
        .filter(|e| *e > 0.0)
        .ok_or_else(|| call.failed("no positive Ei in the sample logs"))?;
    let velocity = (energy / ENERGY_PER_VELOCITY_SQUARED).sqrt();
    let nominal = l2 / velocity * 1e6;
    let shift = nominal - bin_centre(&ws, 0, elastic_bin as usize);
    ws.x.mapv_inplace(|t| t + shift);
    single_output(registry, call, ws)
}
