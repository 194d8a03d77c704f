use super::{produced, unary, StepContext, WorkflowStep};
use crate::error::StepError;
use crate::identifier::Identifier;
use crate::operation::OperationCall;

/// Instruments whose monitor-detector geometry allows calibrating the incident energy
pub const EI_CALIBRATION_INSTRUMENTS: [&str; 2] = ["IN4", "IN6"];

/// Incident energy from the monitor and detector elastic peaks.
///
/// Input is `(detectors, detector EPP, monitors, monitor EPP)`. Instruments other than those
/// in [`EI_CALIBRATION_INSTRUMENTS`] get a report error and None.
#[derive(Debug, Clone)]
pub struct CalibratedIncidentEnergy {
    pub monitor_index: usize,
}

impl WorkflowStep for CalibratedIncidentEnergy {
    type Input = (Identifier, Identifier, Identifier, Identifier);
    type Output = Option<f64>;

    fn name(&self) -> &'static str {
        "GetEiMonDet"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        (detectors, detector_epp, monitors, monitor_epp): Self::Input,
    ) -> Result<Option<f64>, StepError> {
        let instrument = ctx.matrix(&detectors)?.instrument.name.clone();
        if !EI_CALIBRATION_INSTRUMENTS.contains(&instrument.as_str()) {
            ctx.report.error(format!(
                "Instrument {instrument} not supported for incident energy calibration"
            ));
            return Ok(None);
        }
        let call = OperationCall::new("GetEiMonDet")
            .with_input("DetectorWorkspace", &detectors)
            .with_input("DetectorEPPTable", &detector_epp)
            .with_input("MonitorWorkspace", &monitors)
            .with_input("MonitorEppTable", &monitor_epp)
            .with_param("Monitor", self.monitor_index as i64);
        let outputs = ctx.execute(call)?;
        Ok(outputs.value("IncidentEnergy"))
    }
}

/// Shift the TOF axis so that the elastic channel matches the incident energy
#[derive(Debug, Clone)]
pub struct CorrectTofAxis {
    pub elastic_bin: i64,
    pub l2: f64,
}

impl WorkflowStep for CorrectTofAxis {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CorrectTOFAxis"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "CorrectTOFAxis", &input, "tof_axis_corrected")
            .with_param("IndexType", "Workspace Index")
            .with_param("ElasticBinIndex", self.elastic_bin)
            .with_param("L2", self.l2);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CorrectTOFAxis", "OutputWorkspace")
    }
}

#[derive(Debug, Clone)]
pub struct CreateSingleValued {
    pub suffix: String,
    pub value: f64,
}

impl WorkflowStep for CreateSingleValued {
    type Input = ();
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CreateSingleValuedWorkspace"
    }

    fn apply(&self, ctx: &mut StepContext, _: ()) -> Result<Identifier, StepError> {
        let call = OperationCall::new("CreateSingleValuedWorkspace")
            .with_output("OutputWorkspace", &ctx.names.with_suffix(&self.suffix))
            .with_param("DataValue", self.value);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CreateSingleValuedWorkspace", "OutputWorkspace")
    }
}

/// Workspace from flat data lists. Given a parent, the spectra metadata is copied from it.
#[derive(Debug, Clone)]
pub struct CreateWorkspace {
    pub suffix: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub n_spec: i64,
}

impl WorkflowStep for CreateWorkspace {
    type Input = Option<Identifier>;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CreateWorkspace"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        parent: Option<Identifier>,
    ) -> Result<Identifier, StepError> {
        let mut call = OperationCall::new("CreateWorkspace")
            .with_output("OutputWorkspace", &ctx.names.with_suffix(&self.suffix))
            .with_param("DataX", self.x.clone())
            .with_param("DataY", self.y.clone())
            .with_param("NSpec", self.n_spec);
        if let Some(parent) = parent.as_ref() {
            call = call.with_input("ParentWorkspace", parent);
        }
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CreateWorkspace", "OutputWorkspace")
    }
}
