use super::{produced, unary, StepContext, WorkflowStep};
use crate::error::StepError;
use crate::identifier::Identifier;
use crate::workspace::UNIT_WAVELENGTH;

/// Convert the X axis from time-of-flight to wavelength, named `in_wavelength`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertToWavelength;

impl WorkflowStep for ConvertToWavelength {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "ConvertUnits"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "ConvertUnits", &input, "in_wavelength")
            .with_param("Target", UNIT_WAVELENGTH)
            .with_param("EMode", "Elastic");
        let outputs = ctx.execute(call)?;
        produced(&outputs, "ConvertUnits", "OutputWorkspace")
    }
}

/// Sum the given workspace indices into a single spectrum, named `foreground_grouped`
#[derive(Debug, Clone)]
pub struct GroupDetectors {
    pub indices: Vec<i64>,
}

impl WorkflowStep for GroupDetectors {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "GroupDetectors"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "GroupDetectors", &input, "foreground_grouped")
            .with_param("WorkspaceIndexList", self.indices.clone());
        let outputs = ctx.execute(call)?;
        produced(&outputs, "GroupDetectors", "OutputWorkspace")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::simulation::SyntheticWorkspace;
    use crate::steps::testing::Harness;

    #[test]
    fn test_group_then_convert() {
        let ws = SyntheticWorkspace {
            monitors: 0,
            detectors: 5,
            background: 2.0,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut harness = Harness::new().with_workspace("ws", ws);
        let grouped = harness
            .apply(
                &GroupDetectors {
                    indices: vec![1, 2, 3],
                },
                Identifier::new("ws"),
            )
            .unwrap();
        let converted = harness.apply(&ConvertToWavelength, grouped.clone()).unwrap();
        let ws = harness.registry.matrix(&converted).unwrap();
        assert_eq!(ws.histogram_count(), 1);
        assert_eq!(ws.y[[0, 0]], 6.0);
        assert_eq!(ws.unit, UNIT_WAVELENGTH);
        assert!(harness.registry.exists(&grouped));
    }
}
