use super::{produced, unary, Content, StepContext, WorkflowStep};
use crate::error::{StepError, WorkspaceError};
use crate::identifier::Identifier;
use crate::operation::OperationCall;

/// Moving window flat background of every spectrum, named `flat_bkg_for_<content>`
#[derive(Debug, Clone)]
pub struct CalculateFlatBackground {
    pub content: Content,
    pub averaging_window: i64,
}

impl WorkflowStep for CalculateFlatBackground {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CalculateFlatBackground"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let suffix = format!("flat_bkg_for_{}", self.content);
        let call = unary(ctx, "CalculateFlatBackground", &input, &suffix)
            .with_param("Mode", "Moving Average")
            .with_param("OutputMode", "Return Background")
            .with_param("AveragingWindowWidth", self.averaging_window);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CalculateFlatBackground", "OutputWorkspace")
    }
}

/// Crop a workspace to its first bin, in place
#[derive(Debug, Clone, Copy, Default)]
pub struct CropToFirstBin;

impl WorkflowStep for CropToFirstBin {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CropWorkspace"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let ws = ctx.matrix(&input)?;
        let (first_bin_start, first_bin_end) = match ws.x.get((0, 0)).zip(ws.x.get((0, 1))) {
            Some((start, end)) => (*start, *end),
            None => return Err(WorkspaceError::IndexOutOfRange(0).into()),
        };
        let call = OperationCall::new("CropWorkspace")
            .with_input("InputWorkspace", &input)
            .with_output("OutputWorkspace", &input)
            .with_param("XMin", first_bin_start)
            .with_param("XMax", first_bin_end);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CropWorkspace", "OutputWorkspace")
    }
}

/// Constant or linear background fitted across spectra within the given spectrum number
/// ranges, named `flat_background`
#[derive(Debug, Clone)]
pub struct PolynomialBackground {
    pub degree: i64,
    pub ranges: Vec<f64>,
}

impl WorkflowStep for PolynomialBackground {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CalculatePolynomialBackground"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "CalculatePolynomialBackground", &input, "flat_background")
            .with_param("Degree", self.degree)
            .with_param("XRanges", self.ranges.clone());
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CalculatePolynomialBackground", "OutputWorkspace")
    }
}
