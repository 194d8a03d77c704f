use super::{default_monitor_index, given, Workflow, WorkflowRun};
use crate::config::{
    CleanupMode, CollectDataConfig, EppMethod, ElasticChannelMode, NormalisationMethod,
    SubalgorithmLogging, Switch, TofCorrectionStage, PROP_INPUT_WS,
    PROP_OUTPUT_DET_EPP_WS, PROP_OUTPUT_ELASTIC_CHANNEL_WS, PROP_OUTPUT_FLAT_BKG_WS,
    PROP_OUTPUT_INCIDENT_ENERGY_WS,
};
use crate::error::{StepError, ValidationIssues, WorkflowError, WorkspaceError};
use crate::identifier::Identifier;
use crate::progress::BarColor;
use crate::registry::Registry;
use crate::steps::{
    AddSampleLog, CalculateEpp, CalculateFlatBackground, CalibratedIncidentEnergy,
    CloneWorkspace, Content, CorrectTofAxis, CreateSingleValued, CreateWorkspace,
    CropToFirstBin, ExtractMonitors, FitEpp, LoadFile, MergeRuns, Minus, NormaliseToMonitor,
    NormaliseToTime, Scale,
};
use crate::workspace::{EppRow, IndexType};

/// Sample log holding the elastic channel of a run
pub const LOG_ELASTIC_PEAK: &str = "Detector.elasticpeak";
/// Instrument parameter holding the nominal sample to detector distance
pub const PARAM_L2: &str = "l2";

/// E = ENERGY_WAVELENGTH_PRODUCT / λ², E in meV and λ in Å
const ENERGY_WAVELENGTH_PRODUCT: f64 = 81.804;
const L2_TOLERANCE: f64 = 1e-5;

fn display_log(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("unknown"), |v| v.to_string())
}

/// Loading, background subtraction, normalisation and incident energy calibration of
/// direct geometry TOF data.
#[derive(Debug, Clone, Copy)]
pub struct CollectData<'c> {
    config: &'c CollectDataConfig,
}

impl<'c> CollectData<'c> {
    pub fn new(config: &'c CollectDataConfig) -> Self {
        Self { config }
    }

    fn input(&self, run: &mut WorkflowRun) -> Result<Identifier, WorkflowError> {
        if let Some(ws) = given(&self.config.input_workspace) {
            run.protect([ws]);
            return Ok(ws.clone());
        }
        let Some(path) = self.config.input_file.clone() else {
            let mut issues = ValidationIssues::new();
            issues.add(PROP_INPUT_WS, "Must give either an input file or an input workspace.");
            return Err(issues.into());
        };
        let raw = run.step(&LoadFile::default(), path)?;
        let merged = run.step(&MergeRuns::default(), (raw.clone(), None))?;
        run.cleanup([raw]);
        Ok(merged)
    }

    /// Workspace index of the monitor used for normalisation and calibration
    fn monitor_index(&self, run: &WorkflowRun, monitors: &Identifier) -> Result<usize, StepError> {
        let ws = run.matrix(monitors)?;
        match self.config.monitor {
            Some(id) => Ok(ws.workspace_index(id, IndexType::DetectorId)?),
            None => default_monitor_index(ws),
        }
    }

    /// Scale `bkg` and subtract it from `ws`
    fn subtract_flat_bkg(
        &self,
        run: &mut WorkflowRun,
        ws: &Identifier,
        bkg: &Identifier,
        content: Content,
        scaling: f64,
    ) -> Result<Identifier, WorkflowError> {
        let scaled = run.step(
            &Scale::new(&format!("flat_bkg_for_{content}_scaled"), scaling),
            bkg.clone(),
        )?;
        let minus = Minus {
            suffix: format!("flat_bkg_subtracted_{content}"),
        };
        let subtracted = run.step(&minus, (ws.clone(), scaled.clone()))?;
        run.cleanup([scaled]);
        Ok(subtracted)
    }

    fn calculate_flat_bkg(
        &self,
        run: &mut WorkflowRun,
        ws: &Identifier,
        content: Content,
    ) -> Result<Identifier, WorkflowError> {
        let calculate = CalculateFlatBackground {
            content,
            averaging_window: self.config.flat_bkg_averaging_window,
        };
        let bkg = run.step(&calculate, ws.clone())?;
        Ok(run.step(&CropToFirstBin, bkg)?)
    }

    fn monitor_flat_bkg(
        &self,
        run: &mut WorkflowRun,
        monitors: Identifier,
    ) -> Result<Identifier, WorkflowError> {
        let bkg = self.calculate_flat_bkg(run, &monitors, Content::Monitors)?;
        let subtracted = self.subtract_flat_bkg(run, &monitors, &bkg, Content::Monitors, 1.0)?;
        run.cleanup([&bkg, &monitors]);
        Ok(subtracted)
    }

    fn normalise(
        &self,
        run: &mut WorkflowRun,
        main: Identifier,
        monitors: &Identifier,
        monitor_epp: &Identifier,
    ) -> Result<Identifier, WorkflowError> {
        let normalised = match self.config.normalisation {
            NormalisationMethod::Off => return Ok(main),
            NormalisationMethod::Monitor => {
                let monitor_index = self.monitor_index(run, monitors)?;
                let row = EppRow::read(run.table(monitor_epp)?, monitor_index)
                    .ok_or(StepError::MissingEppRow(monitor_index))?;
                let (begin, end) = if row.is_success() {
                    let half_width = self.config.monitor_peak_width_in_sigmas * row.sigma;
                    (row.peak_centre - half_width, row.peak_centre + half_width)
                } else {
                    let x = run.matrix(monitors)?.read_x(monitor_index);
                    let range = (x[0], x[x.len() - 1]);
                    run.report().warning(
                        "Fitting to monitor data failed. Integrating the intensity over the \
                         entire TOF range for normalisation.",
                    );
                    range
                };
                let step = NormaliseToMonitor {
                    monitor_index,
                    begin,
                    end,
                    suffix: "normalized_to_monitor",
                    factor_suffix: Some("normalization_factor_monitor"),
                };
                let (normalised, factor) = run.step(&step, (main.clone(), monitors.clone()))?;
                run.cleanup([factor]);
                normalised
            }
            NormalisationMethod::Time => {
                let step = NormaliseToTime {
                    source: self.config.normalisation_time_source,
                    suffix: "normalized_to_time",
                };
                run.step(&step, main.clone())?
            }
        };
        run.cleanup([&main]);
        Ok(normalised)
    }

    /// Subtract the detector flat background. The background itself is handed back so it
    /// lives until the end of the run.
    fn detector_flat_bkg(
        &self,
        run: &mut WorkflowRun,
        main: Identifier,
    ) -> Result<(Identifier, Identifier), WorkflowError> {
        let bkg = match given(&self.config.flat_bkg_workspace) {
            Some(bkg) => {
                run.protect([bkg]);
                bkg.clone()
            }
            None => self.calculate_flat_bkg(run, &main, Content::Detectors)?,
        };
        if let Some(target) = given(&self.config.output_flat_bkg_workspace) {
            run.set_output(PROP_OUTPUT_FLAT_BKG_WS, target, &bkg)?;
        }
        let subtracted = self.subtract_flat_bkg(
            run,
            &main,
            &bkg,
            Content::Detectors,
            self.config.flat_bkg_scaling,
        )?;
        run.cleanup([&main]);
        Ok((subtracted, bkg))
    }

    /// Detector EPP table, if calibration or the caller needs one
    fn detector_epp(
        &self,
        run: &mut WorkflowRun,
        main: &Identifier,
    ) -> Result<Option<Identifier>, WorkflowError> {
        let c = self.config;
        let calibrating = c.incident_energy_calibration == Switch::On
            && given(&c.incident_energy_workspace).is_none();
        let output = given(&c.output_epp_workspace);
        if !calibrating && output.is_none() {
            return Ok(None);
        }
        let epp = match given(&c.epp_workspace) {
            Some(epp) => {
                run.protect([epp]);
                epp.clone()
            }
            None => match c.epp_creation_method {
                EppMethod::Fit => run.step(&FitEpp::for_content(Content::Detectors), main.clone())?,
                EppMethod::Calculate => {
                    let step = CalculateEpp {
                        sigma: c.sigma_for_calculated_epp,
                    };
                    run.step(&step, main.clone())?
                }
            },
        };
        if let Some(target) = output {
            run.set_output(PROP_OUTPUT_DET_EPP_WS, target, &epp)?;
        }
        Ok(Some(epp))
    }

    /// Copy `ws` with the calibrated energy and the matching wavelength in its logs
    fn apply_incident_energy(
        &self,
        run: &mut WorkflowRun,
        ws: &Identifier,
        content: Content,
        energy: f64,
    ) -> Result<Identifier, WorkflowError> {
        let (original_energy, original_wavelength) = {
            let m = run.matrix(ws)?;
            (m.log_number("Ei"), m.log_number("wavelength"))
        };
        let wavelength = (ENERGY_WAVELENGTH_PRODUCT / energy).sqrt();
        let clone = CloneWorkspace {
            suffix: format!("incident_energy_calibrated_{content}"),
        };
        let calibrated = run.step(&clone, ws.clone())?;
        let calibrated = run.step(
            &AddSampleLog {
                log_name: String::from("Ei"),
                value: energy,
            },
            calibrated,
        )?;
        let calibrated = run.step(
            &AddSampleLog {
                log_name: String::from("wavelength"),
                value: wavelength,
            },
            calibrated,
        )?;
        let report = run.report();
        report.notice(format!("Applied Ei calibration to '{ws}'."));
        report.notice(format!(
            "Original Ei: {} new Ei: {energy}.",
            display_log(original_energy)
        ));
        report.notice(format!(
            "Original wavelength: {} new wavelength {wavelength}.",
            display_log(original_wavelength)
        ));
        Ok(calibrated)
    }

    fn calibrate_incident_energy(
        &self,
        run: &mut WorkflowRun,
        main: Identifier,
        monitors: Identifier,
        detector_epp: Option<&Identifier>,
        monitor_epp: &Identifier,
    ) -> Result<(Identifier, Identifier), WorkflowError> {
        let c = self.config;
        if c.incident_energy_calibration == Switch::Off {
            return Ok((main, monitors));
        }
        let energy_ws = match (given(&c.incident_energy_workspace), detector_epp) {
            (Some(energy_ws), _) => {
                run.protect([energy_ws]);
                Some(energy_ws.clone())
            }
            (None, Some(detector_epp)) => {
                let monitor_index = self.monitor_index(run, &monitors)?;
                let step = CalibratedIncidentEnergy { monitor_index };
                let input = (
                    main.clone(),
                    detector_epp.clone(),
                    monitors.clone(),
                    monitor_epp.clone(),
                );
                match run.step(&step, input)? {
                    Some(energy) => {
                        let step = CreateSingleValued {
                            suffix: String::from("incident_energy"),
                            value: energy,
                        };
                        Some(run.step(&step, ())?)
                    }
                    None => None,
                }
            }
            (None, None) => None,
        };
        let Some(energy_ws) = energy_ws else {
            return Ok((main, monitors));
        };
        let energy = run
            .matrix(&energy_ws)?
            .value()
            .ok_or(StepError::Workspace(WorkspaceError::IndexOutOfRange(0)))?;
        let calibrated_main = self.apply_incident_energy(run, &main, Content::Detectors, energy)?;
        run.cleanup([&main]);
        let calibrated_monitors =
            self.apply_incident_energy(run, &monitors, Content::Monitors, energy)?;
        run.cleanup([&monitors]);
        if let Some(target) = given(&c.output_incident_energy_workspace) {
            run.set_output(PROP_OUTPUT_INCIDENT_ENERGY_WS, target, &energy_ws)?;
        }
        run.cleanup([&energy_ws]);
        Ok((calibrated_main, calibrated_monitors))
    }

    /// Fit the elastic peak of all detectors at the nominal distance summed together
    fn fit_elastic_channel(
        &self,
        run: &mut WorkflowRun,
        main: &Identifier,
        l2: f64,
    ) -> Result<i64, WorkflowError> {
        let summed = {
            let ws = run.matrix(main)?;
            let mut summed = vec![0.0; ws.bin_count()];
            for i in 0..ws.histogram_count() {
                if ws.is_monitor(i) || ws.is_masked(i) || (ws.l2[i] - l2).abs() > L2_TOLERANCE {
                    continue;
                }
                for (s, y) in summed.iter_mut().zip(ws.read_y(i).iter()) {
                    *s += y;
                }
            }
            summed
        };
        // Bin edges around channel numbers so the peak centre comes out as a channel
        let edges: Vec<f64> = (0..=summed.len()).map(|j| j as f64 - 0.5).collect();
        let create = CreateWorkspace {
            suffix: String::from("summed_detectors_at_l2"),
            x: edges,
            y: summed,
            n_spec: 1,
        };
        let summed_ws = run.step(&create, None)?;
        let fit = FitEpp {
            suffix: String::from("summed_detectors_at_l2_fit_results"),
        };
        let fit_ws = run.step(&fit, summed_ws.clone())?;
        let row = EppRow::read(run.table(&fit_ws)?, 0).ok_or(StepError::MissingEppRow(0))?;
        run.cleanup([&summed_ws, &fit_ws]);
        Ok(row.peak_centre.round() as i64)
    }

    fn correct_tof_axis(
        &self,
        run: &mut WorkflowRun,
        main: Identifier,
    ) -> Result<Identifier, WorkflowError> {
        let c = self.config;
        let l2 = run.matrix(&main)?.instrument.number_parameter(PARAM_L2);
        let Some(l2) = l2 else {
            run.report()
                .warning("No 'l2' instrument parameter defined. TOF axis will not be adjusted");
            return Ok(main);
        };
        let index = if let Some(channel_ws) = given(&c.elastic_channel_workspace) {
            run.protect([channel_ws]);
            run.matrix(channel_ws)?
                .value()
                .ok_or(StepError::Workspace(WorkspaceError::IndexOutOfRange(0)))?
                .round() as i64
        } else {
            match c.elastic_channel {
                ElasticChannelMode::SampleLog => {
                    let logged = run.matrix(&main)?.log_number(LOG_ELASTIC_PEAK);
                    let Some(index) = logged else {
                        run.report()
                            .warning("No ElasticChannel given. TOF axis will not be adjusted.");
                        return Ok(main);
                    };
                    index.round() as i64
                }
                ElasticChannelMode::Fit => self.fit_elastic_channel(run, &main, l2)?,
            }
        };
        let corrected = run.step(
            &CorrectTofAxis {
                elastic_bin: index,
                l2,
            },
            main.clone(),
        )?;
        run.report().notice(format!(
            "Elastic channel index {index} was used for TOF axis adjustment."
        ));
        if let Some(target) = given(&c.output_elastic_channel_workspace) {
            let step = CreateSingleValued {
                suffix: String::from("elastic_channel_output"),
                value: index as f64,
            };
            let index_ws = run.step(&step, ())?;
            run.set_output(PROP_OUTPUT_ELASTIC_CHANNEL_WS, target, &index_ws)?;
            run.cleanup([index_ws]);
        }
        run.cleanup([&main]);
        Ok(corrected)
    }
}

impl Workflow for CollectData<'_> {
    fn name(&self) -> &'static str {
        "CollectData"
    }

    fn output_workspace(&self) -> &Identifier {
        &self.config.output_workspace
    }

    fn cleanup_mode(&self) -> CleanupMode {
        self.config.cleanup
    }

    fn subalgorithm_logging(&self) -> SubalgorithmLogging {
        self.config.subalgorithm_logging
    }

    fn color(&self) -> BarColor {
        BarColor::CYAN
    }

    fn stages(&self) -> usize {
        8
    }

    fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
        self.config.validate(registry)
    }

    fn execute(&self, run: &mut WorkflowRun) -> Result<Identifier, WorkflowError> {
        let tof_first = self.config.tof_correction_stage == TofCorrectionStage::BeforeMonitorExtraction;

        run.progress("Loading data")?;
        let mut main = self.input(run)?;
        if tof_first {
            run.progress("Correcting TOF axis")?;
            main = self.correct_tof_axis(run, main)?;
        }

        run.progress("Extracting monitors")?;
        let (detectors, monitors) = run.step(&ExtractMonitors::default(), main.clone())?;
        let monitors = monitors.ok_or(StepError::NoMonitors)?;
        run.cleanup([&main]);
        let main = detectors;

        run.progress("Normalising")?;
        let monitors = self.monitor_flat_bkg(run, monitors)?;
        let monitor_epp = run.step(&FitEpp::for_content(Content::Monitors), monitors.clone())?;
        let main = self.normalise(run, main, &monitors, &monitor_epp)?;

        run.progress("Subtracting flat background")?;
        let (main, bkg) = self.detector_flat_bkg(run, main)?;
        run.cleanup_later([bkg]);

        run.progress("Calculating elastic peak positions")?;
        let detector_epp = self.detector_epp(run, &main)?;
        run.cleanup_later([detector_epp.clone(), Some(monitor_epp.clone())]);

        run.progress("Calibrating incident energy")?;
        let (mut main, monitors) = self.calibrate_incident_energy(
            run,
            main,
            monitors,
            detector_epp.as_ref(),
            &monitor_epp,
        )?;
        run.cleanup_later([monitors]);

        if !tof_first {
            run.progress("Correcting TOF axis")?;
            main = self.correct_tof_axis(run, main)?;
        }

        run.progress("Recalculating elastic peak positions")?;
        let detector_epp = self.detector_epp(run, &main)?;
        run.cleanup_later([detector_epp]);
        Ok(main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::report::{RecordingSink, ReportLevel};
    use crate::simulation::{PeakShape, SimulatedEngine, SyntheticWorkspace};
    use crate::workflow::run_workflow;
    use crate::workspace::{LogValue, ParameterValue};

    fn fixture() -> SyntheticWorkspace {
        let mut fixture = SyntheticWorkspace {
            peak: Some(PeakShape {
                centre: 1405.0,
                sigma: 20.0,
                height: 100.0,
            }),
            monitor_peak: Some(PeakShape {
                centre: 1105.0,
                sigma: 20.0,
                height: 500.0,
            }),
            ..Default::default()
        };
        fixture
            .parameters
            .insert(PARAM_L2.to_string(), ParameterValue::Number(2.0));
        fixture.parameters.insert(
            String::from("default-incident-monitor-spectrum"),
            ParameterValue::Int(1),
        );
        fixture
            .logs
            .insert(LOG_ELASTIC_PEAK.to_string(), LogValue::Number(40.0));
        fixture.logs.insert(String::from("Ei"), LogValue::Number(3.0));
        fixture
            .logs
            .insert(String::from("duration"), LogValue::Number(100.0));
        fixture
    }

    fn setup(fixture: &SyntheticWorkspace) -> (InMemoryRegistry, SimulatedEngine) {
        let mut registry = InMemoryRegistry::new();
        registry.store(Identifier::new("raw"), fixture.build().unwrap().into());
        (registry, SimulatedEngine::new())
    }

    fn config() -> CollectDataConfig {
        CollectDataConfig {
            input_workspace: Some(Identifier::new("raw")),
            output_workspace: Identifier::new("out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_pipeline_leaves_only_output() {
        let (mut registry, mut engine) = setup(&fixture());
        let mut sink = RecordingSink::default();
        let config = config();
        run_workflow(&CollectData::new(&config), &mut registry, &mut engine, &mut sink, None)
            .unwrap();
        assert_eq!(
            registry.names(),
            vec![Identifier::new("out"), Identifier::new("raw")]
        );
        let out = registry.matrix(&Identifier::new("out")).unwrap();
        assert_eq!(out.monitor_count(), 0);
        assert_eq!(out.histogram_count(), 4);
        let energy = out.log_number("Ei").unwrap();
        assert!(energy > 3.0);
        let wavelength = out.log_number("wavelength").unwrap();
        assert!((wavelength - (81.804 / energy).sqrt()).abs() < 1e-9);
        assert_eq!(engine.call_count("GetEiMonDet"), 1);
        assert_eq!(engine.call_count("CorrectTOFAxis"), 1);
        assert!(sink
            .entries
            .contains(&(ReportLevel::Notice, String::from(
                "Elastic channel index 40 was used for TOF axis adjustment."
            ))));
        assert!(sink
            .entries
            .iter()
            .any(|(_, text)| text.starts_with("Original Ei: 3 new Ei:")));
    }

    #[test]
    fn test_cleanup_off_keeps_intermediates() {
        let (mut registry, mut engine) = setup(&fixture());
        let config = CollectDataConfig {
            cleanup: CleanupMode::Off,
            ..config()
        };
        run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        )
        .unwrap();
        for suffix in [
            "extracted_detectors",
            "extracted_monitors",
            "flat_bkg_for_monitors",
            "epp_monitors",
            "normalized_to_monitor",
            "flat_bkg_for_detectors",
            "flat_bkg_subtracted_detectors",
            "incident_energy",
            "incident_energy_calibrated_detectors",
            "tof_axis_corrected",
        ] {
            let id = Identifier::new(format!("out_{suffix}_"));
            assert!(registry.exists(&id), "{id} should still exist");
        }
    }

    #[test]
    fn test_optional_outputs() {
        let (mut registry, mut engine) = setup(&fixture());
        let config = CollectDataConfig {
            output_epp_workspace: Some(Identifier::new("epp")),
            output_flat_bkg_workspace: Some(Identifier::new("bkg")),
            output_incident_energy_workspace: Some(Identifier::new("ei")),
            output_elastic_channel_workspace: Some(Identifier::new("channel")),
            ..config()
        };
        let summary = run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        )
        .unwrap();
        assert_eq!(summary.optional_outputs.len(), 4);
        assert_eq!(
            registry
                .matrix(&Identifier::new("channel"))
                .unwrap()
                .value(),
            Some(40.0)
        );
        let epp = registry.table(&Identifier::new("epp")).unwrap();
        assert_eq!(epp.row_count(), 4);
        let names = registry.names();
        assert!(names.iter().all(|n| !n.as_str().starts_with("__")));
    }

    #[test]
    fn test_time_normalisation() {
        let (mut registry, mut engine) = setup(&fixture());
        let config = CollectDataConfig {
            normalisation: NormalisationMethod::Time,
            incident_energy_calibration: Switch::Off,
            ..config()
        };
        run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        )
        .unwrap();
        assert_eq!(engine.call_count("NormaliseToMonitor"), 0);
        assert_eq!(engine.call_count("GetEiMonDet"), 0);
        // Without calibration and EPP output, no detector peaks are needed
        assert_eq!(engine.call_count("FindEPP"), 1);
        let out = registry.matrix(&Identifier::new("out")).unwrap();
        assert_eq!(out.log_number("Ei"), Some(3.0));
    }

    #[test]
    fn test_zero_duration_fails_without_rollback() {
        let mut fixture = fixture();
        fixture
            .logs
            .insert(String::from("duration"), LogValue::Number(0.0));
        let (mut registry, mut engine) = setup(&fixture);
        let mut sink = RecordingSink::default();
        let config = CollectDataConfig {
            normalisation: NormalisationMethod::Time,
            normalisation_time_source: crate::config::NormalisationTimeSource::Duration,
            ..config()
        };
        let result = run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut sink,
            None,
        );
        assert!(matches!(
            result,
            Err(WorkflowError::Step(StepError::ZeroTime))
        ));
        assert!(!registry.exists(&Identifier::new("out")));
        assert!(registry.exists(&Identifier::new("__out_extracted_detectors_")));
        assert!(registry.exists(&Identifier::new("__out_epp_monitors_")));
        assert!(sink.entries.is_empty());
    }

    #[test]
    fn test_missing_l2_skips_tof_correction() {
        let mut fixture = fixture();
        fixture.parameters.remove(PARAM_L2);
        let (mut registry, mut engine) = setup(&fixture);
        let mut sink = RecordingSink::default();
        let config = config();
        run_workflow(&CollectData::new(&config), &mut registry, &mut engine, &mut sink, None)
            .unwrap();
        assert_eq!(engine.call_count("CorrectTOFAxis"), 0);
        assert!(sink.entries.contains(&(
            ReportLevel::Warning,
            String::from("No 'l2' instrument parameter defined. TOF axis will not be adjusted")
        )));
    }

    #[test]
    fn test_fitted_elastic_channel_before_monitor_extraction() {
        let mut fixture = fixture();
        fixture.logs.remove(LOG_ELASTIC_PEAK);
        let (mut registry, mut engine) = setup(&fixture);
        let config = CollectDataConfig {
            elastic_channel: ElasticChannelMode::Fit,
            tof_correction_stage: TofCorrectionStage::BeforeMonitorExtraction,
            output_elastic_channel_workspace: Some(Identifier::new("channel")),
            incident_energy_calibration: Switch::Off,
            ..config()
        };
        run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        )
        .unwrap();
        // 1405 lies in channel 40 of the 1000 + 10 * j binning
        assert_eq!(
            registry
                .matrix(&Identifier::new("channel"))
                .unwrap()
                .value(),
            Some(40.0)
        );
        let history = engine.history();
        let corrected = history.iter().position(|n| n == "CorrectTOFAxis").unwrap();
        let extracted = history.iter().position(|n| n == "ExtractMonitors").unwrap();
        assert!(corrected < extracted);
    }

    #[test]
    fn test_missing_monitor_parameter() {
        let mut fixture = fixture();
        fixture.parameters.remove("default-incident-monitor-spectrum");
        let (mut registry, mut engine) = setup(&fixture);
        let config = config();
        let result = run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        );
        assert!(matches!(
            result,
            Err(WorkflowError::Step(StepError::MissingInstrumentParameter(_)))
        ));
        // Giving the monitor by detector ID does not need the parameter
        let config = CollectDataConfig {
            monitor: Some(100001),
            ..config
        };
        run_workflow(
            &CollectData::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        )
        .unwrap();
    }
}
