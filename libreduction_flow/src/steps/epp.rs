use super::{produced, unary, Content, StepContext, WorkflowStep};
use crate::error::StepError;
use crate::identifier::Identifier;

/// Fitted elastic peak positions
#[derive(Debug, Clone)]
pub struct FitEpp {
    pub suffix: String,
}

impl FitEpp {
    pub fn for_content(content: Content) -> Self {
        Self {
            suffix: format!("epp_{content}"),
        }
    }
}

impl WorkflowStep for FitEpp {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "FindEPP"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "FindEPP", &input, &self.suffix);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "FindEPP", "OutputWorkspace")
    }
}

/// Elastic peak positions calculated with a fixed peak width. Without a sigma, ten times the
/// width of the first bin is used.
#[derive(Debug, Clone, Default)]
pub struct CalculateEpp {
    pub sigma: Option<f64>,
}

impl WorkflowStep for CalculateEpp {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CreateEPP"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let sigma = match self.sigma {
            Some(sigma) => sigma,
            None => 10.0 * ctx.matrix(&input)?.first_bin_width(),
        };
        let call = unary(ctx, "CreateEPP", &input, "epp_detectors").with_param("Sigma", sigma);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CreateEPP", "OutputWorkspace")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::simulation::{PeakShape, SyntheticWorkspace};
    use crate::steps::testing::Harness;
    use crate::workspace::EppRow;

    #[test]
    fn test_calculated_epp_default_sigma() {
        let ws = SyntheticWorkspace {
            monitors: 0,
            detectors: 2,
            bin_width: 4.0,
            peak: Some(PeakShape {
                centre: 1100.0,
                sigma: 8.0,
                height: 50.0,
            }),
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut harness = Harness::new().with_workspace("dets", ws);
        let epp = harness
            .apply(&CalculateEpp::default(), Identifier::new("dets"))
            .unwrap();
        let table = harness.registry.table(&epp).unwrap();
        let row = EppRow::read(table, 1).unwrap();
        assert!(row.is_success());
        assert_eq!(row.sigma, 40.0);
    }

    #[test]
    fn test_fit_epp_suffix() {
        assert_eq!(FitEpp::for_content(Content::Monitors).suffix, "epp_monitors");
    }
}
