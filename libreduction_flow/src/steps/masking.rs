use super::{produced, unary, StepContext, WorkflowStep};
use crate::error::StepError;
use crate::identifier::Identifier;
use crate::operation::OperationCall;

/// Mask spectra in place by detector ID, by a mask workspace, or both
#[derive(Debug, Clone, Default)]
pub struct MaskDetectors {
    pub detectors: Vec<i64>,
}

impl WorkflowStep for MaskDetectors {
    type Input = (Identifier, Option<Identifier>);
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "MaskDetectors"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        (input, mask): (Identifier, Option<Identifier>),
    ) -> Result<Identifier, StepError> {
        let mut call = OperationCall::new("MaskDetectors").with_input("Workspace", &input);
        if !self.detectors.is_empty() {
            call = call.with_param("DetectorList", self.detectors.clone());
        }
        if let Some(mask) = mask.as_ref() {
            call = call.with_input("MaskedWorkspace", mask);
        }
        ctx.execute(call)?;
        Ok(input)
    }
}

/// The mask flags of a workspace as a mask workspace, along with the number of masked spectra
#[derive(Debug, Clone)]
pub struct ExtractMask {
    pub suffix: String,
}

impl WorkflowStep for ExtractMask {
    type Input = Identifier;
    type Output = (Identifier, usize);

    fn name(&self) -> &'static str {
        "ExtractMask"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        input: Identifier,
    ) -> Result<(Identifier, usize), StepError> {
        let call = unary(ctx, "ExtractMask", &input, &self.suffix);
        let outputs = ctx.execute(call)?;
        let mask = produced(&outputs, "ExtractMask", "OutputWorkspace")?;
        let count = outputs.value("MaskedCount").unwrap_or(0.0) as usize;
        Ok((mask, count))
    }
}

/// Sum every spectrum over its own range
#[derive(Debug, Clone)]
pub struct Integrate {
    pub suffix: String,
    pub lowers: Vec<f64>,
    pub uppers: Vec<f64>,
    pub partial_bins: bool,
}

impl WorkflowStep for Integrate {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Integration"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "Integration", &input, &self.suffix)
            .with_param("RangeLowerList", self.lowers.clone())
            .with_param("RangeUpperList", self.uppers.clone())
            .with_param("IncludePartialBins", self.partial_bins);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "Integration", "OutputWorkspace")
    }
}

/// Outlier test of integrated intensities against their median. Returns the mask workspace and
/// the number of spectra that failed.
#[derive(Debug, Clone)]
pub struct MedianDetectorTest {
    pub suffix: String,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub significance: f64,
    pub low_outlier: Option<f64>,
}

impl WorkflowStep for MedianDetectorTest {
    type Input = Identifier;
    type Output = (Identifier, usize);

    fn name(&self) -> &'static str {
        "MedianDetectorTest"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        input: Identifier,
    ) -> Result<(Identifier, usize), StepError> {
        let mut call = unary(ctx, "MedianDetectorTest", &input, &self.suffix)
            .with_param("LowThreshold", self.low_threshold)
            .with_param("HighThreshold", self.high_threshold)
            .with_param("SignificanceTest", self.significance);
        if let Some(low_outlier) = self.low_outlier {
            call = call.with_param("LowOutlier", low_outlier);
        }
        let outputs = ctx.execute(call)?;
        let mask = produced(&outputs, "MedianDetectorTest", "OutputWorkspace")?;
        let failures = outputs.value("NumberOfFailures").unwrap_or(0.0) as usize;
        Ok((mask, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::simulation::SyntheticWorkspace;
    use crate::steps::testing::Harness;

    #[test]
    fn test_user_mask_roundtrip() {
        let ws = SyntheticWorkspace {
            monitors: 0,
            detectors: 5,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut harness = Harness::new().with_workspace("ws", ws);
        let id = Identifier::new("ws");
        let masked = harness
            .apply(
                &MaskDetectors {
                    detectors: vec![2, 4],
                },
                (id.clone(), None),
            )
            .unwrap();
        assert_eq!(masked, id);
        let (mask, count) = harness
            .apply(
                &ExtractMask {
                    suffix: String::from("user_mask_extracted"),
                },
                id.clone(),
            )
            .unwrap();
        assert_eq!(count, 2);
        let mask_ws = harness.registry.matrix(&mask).unwrap();
        assert_eq!(mask_ws.y.column(0).to_vec(), vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_integrate_then_median_test() {
        let ws = SyntheticWorkspace {
            monitors: 0,
            detectors: 5,
            detector_weights: vec![1.0, 1.0, 1.0, 1.0, 20.0],
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut harness = Harness::new().with_workspace("ws", ws);
        let integrate = Integrate {
            suffix: String::from("integrated"),
            lowers: vec![1000.0; 5],
            uppers: vec![1640.0; 5],
            partial_bins: true,
        };
        let integrated = harness.apply(&integrate, Identifier::new("ws")).unwrap();
        let test = MedianDetectorTest {
            suffix: String::from("diagnostics"),
            low_threshold: 0.1,
            high_threshold: 3.0,
            significance: 3.3,
            low_outlier: None,
        };
        let (_, failures) = harness.apply(&test, integrated).unwrap();
        assert_eq!(failures, 1);
    }
}
