use super::{default_monitor_index, given, Workflow, WorkflowRun};
use crate::config::{
    CleanupMode, FlatBackgroundMethod, NormalisationMethod, NormalisationTimeSource,
    PreprocessConfig, SubalgorithmLogging, SumOutput, Switch, PROP_OUTPUT_BEAM_POS,
};
use crate::error::{StepError, ValidationIssues, WorkflowError};
use crate::identifier::Identifier;
use crate::progress::BarColor;
use crate::registry::Registry;
use crate::steps::{
    ConvertToWavelength, ExtractMonitors, GroupDetectors, LoadReflectometry, MergeRuns, Minus,
    NormaliseToMonitor, NormaliseToSlits, NormaliseToTime, PolynomialBackground,
};
use crate::workspace::{IndexType, COLUMN_FITTED_PEAK_CENTRE};

/// Loading, normalisation, background subtraction and foreground summation of ILL
/// reflectometry data.
#[derive(Debug, Clone, Copy)]
pub struct Preprocess<'c> {
    config: &'c PreprocessConfig,
}

impl<'c> Preprocess<'c> {
    pub fn new(config: &'c PreprocessConfig) -> Self {
        Self { config }
    }

    /// The detector workspace and the beam position table belonging to it
    fn input(&self, run: &mut WorkflowRun) -> Result<(Identifier, Option<Identifier>), WorkflowError> {
        let c = self.config;
        let Some((first_file, other_files)) = c.run.split_first() else {
            let ws = given(&c.input_workspace).cloned().unwrap_or_default();
            let beam_position = given(&c.beam_position).cloned();
            run.protect([&ws]);
            run.protect([&beam_position]);
            return Ok((ws, beam_position));
        };
        let direct_beam_position = given(&c.direct_beam_position).cloned();
        let load_first = LoadReflectometry {
            direct_beam_position: direct_beam_position.clone(),
            output_beam_position: true,
        };
        let (first, beam_position) = run.step(&load_first, first_file.clone())?;
        run.cleanup_later([&beam_position]);
        let load = LoadReflectometry {
            direct_beam_position,
            output_beam_position: false,
        };
        let mut merged = first.clone();
        for (i, file) in other_files.iter().enumerate() {
            let (raw, _) = run.step(&load, file.clone())?;
            merged = run.step(&MergeRuns::default(), (merged, Some(raw.clone())))?;
            if i == 0 {
                run.cleanup([&first]);
            }
            run.cleanup([raw]);
        }
        Ok((merged, beam_position))
    }

    fn normalise_to_slits(&self, run: &mut WorkflowRun, ws: Identifier) -> Result<Identifier, WorkflowError> {
        if self.config.slit_normalisation == Switch::Off {
            return Ok(ws);
        }
        match run.step(&NormaliseToSlits, ws.clone()) {
            Ok(normalised) => {
                run.cleanup([ws]);
                Ok(normalised)
            }
            Err(StepError::MissingSampleLog(_)) => {
                run.report()
                    .warning("Slit information not found in sample logs. Slit normalisation disabled.");
                Ok(ws)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn normalise_to_flux(
        &self,
        run: &mut WorkflowRun,
        ws: Identifier,
        monitors: Option<&Identifier>,
    ) -> Result<Identifier, WorkflowError> {
        let normalised = match self.config.flux_normalisation {
            NormalisationMethod::Off => return Ok(ws),
            NormalisationMethod::Monitor => {
                let monitors = monitors.ok_or(StepError::NoMonitors)?;
                let (monitor_index, begin, end) = {
                    let mon_ws = run.matrix(monitors)?;
                    let index = default_monitor_index(mon_ws)?;
                    let x = mon_ws.read_x(index);
                    (index, x[0], x[x.len() - 1])
                };
                let normalise = NormaliseToMonitor {
                    monitor_index,
                    begin,
                    end,
                    suffix: "normalised_to_monitor",
                    factor_suffix: None,
                };
                run.step(&normalise, (ws.clone(), monitors.clone()))?.0
            }
            NormalisationMethod::Time => {
                let normalise = NormaliseToTime {
                    source: NormalisationTimeSource::Duration,
                    suffix: "normalised_to_time",
                };
                run.step(&normalise, ws.clone())?
            }
        };
        run.cleanup([ws]);
        Ok(normalised)
    }

    fn subtract_instrument_bkg(&self, run: &mut WorkflowRun, ws: Identifier) -> Result<Identifier, WorkflowError> {
        let Some(bkg) = given(&self.config.instrument_background) else {
            return Ok(ws);
        };
        run.protect([bkg]);
        let minus = Minus {
            suffix: String::from("instr_bkg_subtracted"),
        };
        let subtracted = run.step(&minus, (ws.clone(), bkg.clone()))?;
        run.cleanup([ws]);
        Ok(subtracted)
    }

    /// Workspace index of the foreground centre pixel
    fn foreground_centre(
        &self,
        run: &WorkflowRun,
        ws: &Identifier,
        beam_position: Option<&Identifier>,
    ) -> Result<usize, StepError> {
        let matrix = run.matrix(ws)?;
        if let Some(spectrum) = self.config.foreground_centre {
            return Ok(matrix.workspace_index(spectrum, IndexType::SpectrumNumber)?);
        }
        let beam_position = beam_position.ok_or(StepError::MissingBeamPosition)?;
        let centre = run
            .table(beam_position)?
            .float(COLUMN_FITTED_PEAK_CENTRE, 0)
            .ok_or(StepError::MissingBeamPosition)?;
        Ok(matrix.workspace_index(centre.round() as i64, IndexType::WorkspaceIndex)?)
    }

    /// Spectrum number ranges on both sides of the foreground for the background fit
    fn flat_bkg_ranges(
        &self,
        run: &WorkflowRun,
        ws: &Identifier,
        beam_position: Option<&Identifier>,
    ) -> Result<Vec<f64>, StepError> {
        let c = self.config;
        let index = self.foreground_centre(run, ws, beam_position)?;
        let centre = run.matrix(ws)?.spectrum_numbers[index] as i64;
        let half_width = c.foreground_half_width.unwrap_or(0);
        let lower_start = centre + half_width + c.lower_background_offset;
        let lower_end = lower_start + c.lower_background_width;
        let upper_end = centre - half_width - c.upper_background_offset;
        let upper_start = upper_end - c.upper_background_width;
        Ok(vec![
            upper_start as f64 - 0.5,
            upper_end as f64 - 0.5,
            lower_start as f64 + 0.5,
            lower_end as f64 + 0.5,
        ])
    }

    fn subtract_flat_bkg(
        &self,
        run: &mut WorkflowRun,
        ws: Identifier,
        beam_position: Option<&Identifier>,
    ) -> Result<Identifier, WorkflowError> {
        let degree = match self.config.flat_background {
            FlatBackgroundMethod::Off => return Ok(ws),
            FlatBackgroundMethod::Constant => 0,
            FlatBackgroundMethod::Linear => 1,
        };
        let ranges = self.flat_bkg_ranges(run, &ws, beam_position)?;
        let bkg = run.step(&PolynomialBackground { degree, ranges }, ws.clone())?;
        let minus = Minus {
            suffix: String::from("flat_background_subtracted"),
        };
        let subtracted = run.step(&minus, (ws.clone(), bkg.clone()))?;
        run.cleanup([bkg, ws]);
        Ok(subtracted)
    }

    fn sum_foreground(
        &self,
        run: &mut WorkflowRun,
        ws: Identifier,
        beam_position: Option<&Identifier>,
    ) -> Result<Identifier, WorkflowError> {
        match self.config.sum_output {
            SumOutput::Off => Ok(ws),
            SumOutput::Incoherent => {
                Err(StepError::NotImplemented(String::from("Incoherent foreground summation")).into())
            }
            SumOutput::Coherent => {
                let Some(half_width) = self.config.foreground_half_width else {
                    return Ok(ws);
                };
                let centre = self.foreground_centre(run, &ws, beam_position)? as i64;
                let group = GroupDetectors {
                    indices: (centre - half_width..=centre + half_width).collect(),
                };
                let grouped = run.step(&group, ws.clone())?;
                run.cleanup([ws]);
                Ok(grouped)
            }
        }
    }
}

impl Workflow for Preprocess<'_> {
    fn name(&self) -> &'static str {
        "Preprocess"
    }

    fn output_workspace(&self) -> &Identifier {
        &self.config.output_workspace
    }

    fn name_prefix(&self) -> String {
        format!("ReflectometryILLPreprocess_{}", self.config.output_workspace)
    }

    fn cleanup_mode(&self) -> CleanupMode {
        self.config.cleanup
    }

    fn subalgorithm_logging(&self) -> SubalgorithmLogging {
        self.config.subalgorithm_logging
    }

    fn color(&self) -> BarColor {
        BarColor::GREEN
    }

    fn stages(&self) -> usize {
        5
    }

    fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
        self.config.validate(registry)
    }

    fn execute(&self, run: &mut WorkflowRun) -> Result<Identifier, WorkflowError> {
        run.progress("Loading")?;
        let (ws, beam_position) = self.input(run)?;
        if let (Some(target), Some(beam_position)) =
            (given(&self.config.output_beam_position), beam_position.as_ref())
        {
            run.set_output(PROP_OUTPUT_BEAM_POS, target, beam_position)?;
        }
        let extract = ExtractMonitors {
            detectors_suffix: "detectors",
            monitors_suffix: "monitors",
        };
        let (detectors, monitors) = run.step(&extract, ws.clone())?;
        run.cleanup([ws]);
        run.report()
            .warning("Skipping water calibration as it is not yet implemented.");

        run.progress("Normalisation")?;
        let ws = self.normalise_to_slits(run, detectors)?;
        let ws = self.normalise_to_flux(run, ws, monitors.as_ref())?;
        run.cleanup([&monitors]);

        run.progress("Background subtraction")?;
        let ws = self.subtract_instrument_bkg(run, ws)?;
        let ws = self.subtract_flat_bkg(run, ws, beam_position.as_ref())?;

        run.progress("Foreground summation")?;
        let ws = self.sum_foreground(run, ws, beam_position.as_ref())?;
        run.cleanup([&beam_position]);

        run.progress("Converting to wavelength")?;
        let wavelength = run.step(&ConvertToWavelength, ws.clone())?;
        run.cleanup([ws]);
        Ok(wavelength)
    }
}
