use std::path::PathBuf;

use super::{produced, unary, StepContext, WorkflowStep};
use crate::error::StepError;
use crate::identifier::Identifier;
use crate::operation::OperationCall;

/// The run number part of a data file name, `012345` for `/data/012345.nxs`
pub fn numor(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Load a data file into `raw`
#[derive(Debug, Clone)]
pub struct LoadFile {
    pub suffix: String,
}

impl Default for LoadFile {
    fn default() -> Self {
        Self {
            suffix: String::from("raw"),
        }
    }
}

impl WorkflowStep for LoadFile {
    type Input = PathBuf;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Load"
    }

    fn apply(&self, ctx: &mut StepContext, input: PathBuf) -> Result<Identifier, StepError> {
        let call = OperationCall::new("Load")
            .with_param("Filename", input.to_string_lossy().to_string())
            .with_output("OutputWorkspace", &ctx.names.with_suffix(&self.suffix));
        let outputs = ctx.execute(call)?;
        produced(&outputs, "Load", "OutputWorkspace")
    }
}

/// Load one reflectometry run as `raw-<numor>`, optionally along with its beam position table
/// `beamPos-<numor>`.
#[derive(Debug, Clone, Default)]
pub struct LoadReflectometry {
    pub direct_beam_position: Option<Identifier>,
    pub output_beam_position: bool,
}

impl WorkflowStep for LoadReflectometry {
    type Input = PathBuf;
    type Output = (Identifier, Option<Identifier>);

    fn name(&self) -> &'static str {
        "LoadILLReflectometry"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        input: PathBuf,
    ) -> Result<(Identifier, Option<Identifier>), StepError> {
        let numor = numor(&input);
        let mut call = OperationCall::new("LoadILLReflectometry")
            .with_param("Filename", input.to_string_lossy().to_string())
            .with_param("XUnit", "TimeOfFlight")
            .with_output(
                "OutputWorkspace",
                &ctx.names.with_suffix(&format!("raw-{numor}")),
            );
        if let Some(direct_beam) = self.direct_beam_position.as_ref() {
            call = call.with_input("BeamPosition", direct_beam);
        }
        if self.output_beam_position {
            call = call.with_output(
                "OutputBeamPosition",
                &ctx.names.with_suffix(&format!("beamPos-{numor}")),
            );
        }
        let outputs = ctx.execute(call)?;
        let ws = produced(&outputs, "LoadILLReflectometry", "OutputWorkspace")?;
        let beam_position = if self.output_beam_position {
            Some(produced(
                &outputs,
                "LoadILLReflectometry",
                "OutputBeamPosition",
            )?)
        } else {
            None
        };
        Ok((ws, beam_position))
    }
}

/// Sum a run into another one. Without a second run the result is a plain copy.
#[derive(Debug, Clone)]
pub struct MergeRuns {
    pub suffix: &'static str,
}

impl Default for MergeRuns {
    fn default() -> Self {
        Self { suffix: "merged" }
    }
}

impl WorkflowStep for MergeRuns {
    type Input = (Identifier, Option<Identifier>);
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "MergeRuns"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        (first, second): (Identifier, Option<Identifier>),
    ) -> Result<Identifier, StepError> {
        let mut call = unary(ctx, "MergeRuns", &first, self.suffix);
        if let Some(second) = second.as_ref() {
            call = call.with_input("AdditionalWorkspace", second);
        }
        let outputs = ctx.execute(call)?;
        produced(&outputs, "MergeRuns", "OutputWorkspace")
    }
}

/// Split a workspace into its detectors and its monitors. The monitor part is None when the
/// input has no monitors; having no detectors is an error.
#[derive(Debug, Clone)]
pub struct ExtractMonitors {
    pub detectors_suffix: &'static str,
    pub monitors_suffix: &'static str,
}

impl Default for ExtractMonitors {
    fn default() -> Self {
        Self {
            detectors_suffix: "extracted_detectors",
            monitors_suffix: "extracted_monitors",
        }
    }
}

impl WorkflowStep for ExtractMonitors {
    type Input = Identifier;
    type Output = (Identifier, Option<Identifier>);

    fn name(&self) -> &'static str {
        "ExtractMonitors"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        input: Identifier,
    ) -> Result<(Identifier, Option<Identifier>), StepError> {
        let call = OperationCall::new("ExtractMonitors")
            .with_input("InputWorkspace", &input)
            .with_output(
                "DetectorWorkspace",
                &ctx.names.with_suffix(self.detectors_suffix),
            )
            .with_output(
                "MonitorWorkspace",
                &ctx.names.with_suffix(self.monitors_suffix),
            );
        let outputs = ctx.execute(call)?;
        let detectors = outputs
            .workspace("DetectorWorkspace")
            .cloned()
            .ok_or(StepError::NoDetectors)?;
        let monitors = outputs.workspace("MonitorWorkspace").cloned();
        Ok((detectors, monitors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::simulation::SyntheticWorkspace;
    use crate::steps::testing::Harness;

    #[test]
    fn test_numor() {
        assert_eq!(numor(std::path::Path::new("/data/012345.nxs")), "012345");
    }

    #[test]
    fn test_extract_monitors_without_monitors() {
        let ws = SyntheticWorkspace {
            monitors: 0,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut harness = Harness::new().with_workspace("in", ws);
        let (detectors, monitors) = harness
            .apply(&ExtractMonitors::default(), Identifier::new("in"))
            .unwrap();
        assert_eq!(detectors, Identifier::new("test_extracted_detectors_"));
        assert!(monitors.is_none());
        assert!(harness.registry.exists(&detectors));
    }

    #[test]
    fn test_extract_monitors_without_detectors() {
        let ws = SyntheticWorkspace {
            monitors: 2,
            detectors: 0,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut harness = Harness::new().with_workspace("in", ws);
        let result = harness.apply(&ExtractMonitors::default(), Identifier::new("in"));
        assert!(matches!(result, Err(StepError::NoDetectors)));
    }

    #[test]
    fn test_load_and_merge_keep_inputs() {
        let path = std::env::temp_dir().join("reduction_flow_steps_load.yml");
        SyntheticWorkspace::default().write_file(&path).unwrap();
        let mut harness = Harness::new();
        let raw = harness.apply(&LoadFile::default(), path).unwrap();
        let merged = harness
            .apply(&MergeRuns::default(), (raw.clone(), Some(raw.clone())))
            .unwrap();
        assert!(harness.registry.exists(&raw));
        let doubled = harness.registry.matrix(&merged).unwrap().y[[0, 0]];
        let single = harness.registry.matrix(&raw).unwrap().y[[0, 0]];
        assert_eq!(doubled, 2.0 * single);
    }
}
