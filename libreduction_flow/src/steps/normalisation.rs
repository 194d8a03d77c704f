use super::{produced, unary, StepContext, WorkflowStep};
use crate::config::NormalisationTimeSource;
use crate::error::StepError;
use crate::identifier::Identifier;
use crate::operation::OperationCall;
use crate::workspace::MatrixWorkspace;

pub const LOG_DURATION: &str = "duration";
pub const LOG_ACTUAL_TIME: &str = "actual_time";
pub const LOG_SLIT2_WIDTH: &str = "VirtualSlitAxis.s2w_actual_width";
pub const LOG_SLIT3_WIDTH: &str = "VirtualSlitAxis.s3w_actual_width";

fn required_log(ws: &MatrixWorkspace, name: &str) -> Result<f64, StepError> {
    ws.log_number(name)
        .ok_or_else(|| StepError::MissingSampleLog(name.to_string()))
}

/// Read the acquisition time of a run. Zero, negative and non-finite times are errors.
pub fn acquisition_time(
    ws: &MatrixWorkspace,
    source: NormalisationTimeSource,
) -> Result<f64, StepError> {
    let time = match source {
        NormalisationTimeSource::Duration => required_log(ws, LOG_DURATION)?,
        NormalisationTimeSource::ActualTime => required_log(ws, LOG_ACTUAL_TIME)?,
        NormalisationTimeSource::DurationThenActualTime => match ws.log_number(LOG_DURATION) {
            Some(t) => t,
            None => required_log(ws, LOG_ACTUAL_TIME)
                .map_err(|_| StepError::MissingSampleLog(LOG_DURATION.to_string()))?,
        },
    };
    if !time.is_finite() {
        Err(StepError::NonFiniteTime(time))
    } else if time == 0.0 {
        Err(StepError::ZeroTime)
    } else if time < 0.0 {
        Err(StepError::NegativeTime(time))
    } else {
        Ok(time)
    }
}

/// Divide by the monitor counts integrated over `[begin, end]`. Also returns the
/// normalisation factor workspace when a name for it is given.
#[derive(Debug, Clone)]
pub struct NormaliseToMonitor {
    pub monitor_index: usize,
    pub begin: f64,
    pub end: f64,
    pub suffix: &'static str,
    pub factor_suffix: Option<&'static str>,
}

impl WorkflowStep for NormaliseToMonitor {
    type Input = (Identifier, Identifier);
    type Output = (Identifier, Option<Identifier>);

    fn name(&self) -> &'static str {
        "NormaliseToMonitor"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        (input, monitors): (Identifier, Identifier),
    ) -> Result<(Identifier, Option<Identifier>), StepError> {
        let mut call = unary(ctx, "NormaliseToMonitor", &input, self.suffix)
            .with_input("MonitorWorkspace", &monitors)
            .with_param("MonitorWorkspaceIndex", self.monitor_index as i64)
            .with_param("IntegrationRangeMin", self.begin)
            .with_param("IntegrationRangeMax", self.end);
        if let Some(factor_suffix) = self.factor_suffix {
            call = call.with_output("NormFactorWS", &ctx.names.with_suffix(factor_suffix));
        }
        let outputs = ctx.execute(call)?;
        let normalised = produced(&outputs, "NormaliseToMonitor", "OutputWorkspace")?;
        Ok((normalised, outputs.workspace("NormFactorWS").cloned()))
    }
}

/// Divide by the acquisition time read from the sample logs
#[derive(Debug, Clone)]
pub struct NormaliseToTime {
    pub source: NormalisationTimeSource,
    pub suffix: &'static str,
}

impl WorkflowStep for NormaliseToTime {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Scale"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let time = acquisition_time(ctx.matrix(&input)?, self.source)?;
        let call = unary(ctx, "Scale", &input, self.suffix)
            .with_param("Factor", 1.0 / time)
            .with_param("Operation", "Multiply");
        let outputs = ctx.execute(call)?;
        produced(&outputs, "Scale", "OutputWorkspace")
    }
}

/// Divide by the product of the two slit openings. Fails with
/// [`StepError::MissingSampleLog`] if either width is not logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormaliseToSlits;

impl WorkflowStep for NormaliseToSlits {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Scale"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let ws = ctx.matrix(&input)?;
        let opening = required_log(ws, LOG_SLIT2_WIDTH)? * required_log(ws, LOG_SLIT3_WIDTH)?;
        let call = OperationCall::new("Scale")
            .with_input("InputWorkspace", &input)
            .with_output(
                "OutputWorkspace",
                &ctx.names.with_suffix("normalised_to_slits"),
            )
            .with_param("Factor", 1.0 / opening)
            .with_param("Operation", "Multiply");
        let outputs = ctx.execute(call)?;
        produced(&outputs, "Scale", "OutputWorkspace")
    }
}
