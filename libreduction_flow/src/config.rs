use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{ConfigError, ValidationIssues};
use super::identifier::Identifier;
use super::registry::Registry;

// Property names, as reported in validation issues
pub const PROP_INPUT_FILE: &str = "InputFile";
pub const PROP_INPUT_WS: &str = "InputWorkspace";
pub const PROP_OUTPUT_WS: &str = "OutputWorkspace";
pub const PROP_CLEANUP_MODE: &str = "Cleanup";
pub const PROP_SUBALG_LOGGING: &str = "SubalgorithmLogging";
pub const PROP_EPP_WS: &str = "EPPWorkspace";
pub const PROP_EPP_METHOD: &str = "EPPCreationMethod";
pub const PROP_EPP_SIGMA: &str = "SigmaForCalculatedEPP";
pub const PROP_ELASTIC_CHANNEL_MODE: &str = "ElasticChannel";
pub const PROP_ELASTIC_CHANNEL_WS: &str = "ElasticChannelWorkspace";
pub const PROP_MON_INDEX: &str = "Monitor";
pub const PROP_INCIDENT_ENERGY_CALIBRATION: &str = "IncidentEnergyCalibration";
pub const PROP_INCIDENT_ENERGY_WS: &str = "IncidentEnergyWorkspace";
pub const PROP_FLAT_BKG_SCALING: &str = "FlatBkgScaling";
pub const PROP_FLAT_BKG_WINDOW: &str = "FlatBkgAveragingWindow";
pub const PROP_FLAT_BKG_WS: &str = "FlatBkgWorkspace";
pub const PROP_NORMALISATION: &str = "Normalisation";
pub const PROP_MON_PEAK_SIGMA_MULTIPLIER: &str = "MonitorPeakWidthInSigmas";
pub const PROP_OUTPUT_ELASTIC_CHANNEL_WS: &str = "OutputElasticChannelWorkspace";
pub const PROP_OUTPUT_DET_EPP_WS: &str = "OutputEPPWorkspace";
pub const PROP_OUTPUT_INCIDENT_ENERGY_WS: &str = "OutputIncidentEnergyWorkspace";
pub const PROP_OUTPUT_FLAT_BKG_WS: &str = "OutputFlatBkgWorkspace";

pub const PROP_ELASTIC_PEAK_DIAGNOSTICS: &str = "ElasticPeakDiagnostics";
pub const PROP_ELASTIC_PEAK_SIGMA_MULTIPLIER: &str = "ElasticPeakWidthInSigmas";
pub const PROP_BKG_DIAGNOSTICS: &str = "BkgDiagnostics";
pub const PROP_BKG_SIGMA_MULTIPLIER: &str = "BkgWidthInSigmas";
pub const PROP_USER_MASK: &str = "MaskedDetectors";
pub const PROP_OUTPUT_DIAGNOSTICS_REPORT_WS: &str = "OutputDiagnosticsReportWorkspace";
pub const PROP_OUTPUT_DIAGNOSTICS_REPORT: &str = "OutputDiagnosticsReport";

pub const PROP_RUN: &str = "Run";
pub const PROP_BEAM_POS: &str = "BeamPosition";
pub const PROP_DIRECT_BEAM_POS: &str = "DirectBeamPosition";
pub const PROP_SLIT_NORM: &str = "SlitNormalisation";
pub const PROP_FLUX_NORM_METHOD: &str = "FluxNormalisation";
pub const PROP_INSTRUMENT_BKG: &str = "InstrumentBackground";
pub const PROP_BKG_METHOD: &str = "FlatBackground";
pub const PROP_LOWER_BKG_OFFSET: &str = "LowerBackgroundOffset";
pub const PROP_LOWER_BKG_WIDTH: &str = "LowerBackgroundWidth";
pub const PROP_UPPER_BKG_OFFSET: &str = "UpperBackgroundOffset";
pub const PROP_UPPER_BKG_WIDTH: &str = "UpperBackgroundWidth";
pub const PROP_FOREGROUND_CENTRE: &str = "ForegroundCentre";
pub const PROP_FOREGROUND_HALF_WIDTH: &str = "ForegroundHalfWidth";
pub const PROP_SUM_OUTPUT: &str = "SumOutput";
pub const PROP_OUTPUT_BEAM_POS: &str = "OutputBeamPosition";

/// What to do with intermediate workspaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CleanupMode {
    #[default]
    On,
    Off,
}

/// Whether operations (and deletions) print to the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubalgorithmLogging {
    On,
    #[default]
    Off,
}

impl SubalgorithmLogging {
    pub fn enabled(&self) -> bool {
        *self == Self::On
    }
}

/// Plain ON/OFF property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Switch {
    #[default]
    On,
    Off,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EppMethod {
    #[default]
    Fit,
    Calculate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElasticChannelMode {
    #[default]
    SampleLog,
    Fit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalisationMethod {
    #[default]
    Monitor,
    Time,
    Off,
}

/// Which sample log holds the acquisition time for time normalisation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalisationTimeSource {
    /// `duration`, falling back to `actual_time` when the former is absent
    #[default]
    DurationThenActualTime,
    Duration,
    ActualTime,
}

/// Where in the CollectData pipeline the TOF axis gets corrected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TofCorrectionStage {
    #[default]
    AfterCalibration,
    BeforeMonitorExtraction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BkgDiagnosticsMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatBackgroundMethod {
    #[default]
    Constant,
    Linear,
    Off,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SumOutput {
    #[default]
    Coherent,
    Incoherent,
    Off,
}

fn check_workspace(
    issues: &mut ValidationIssues,
    registry: &dyn Registry,
    property: &str,
    id: &Option<Identifier>,
) {
    if let Some(id) = id {
        if !id.is_empty() && !registry.exists(id) {
            issues.add(property, "Input workspace has to be in the registry.");
        }
    }
}

fn is_given(id: &Option<Identifier>) -> bool {
    id.as_ref().map(|id| !id.is_empty()).unwrap_or(false)
}

/// Settings of the CollectData workflow: loading, background, normalisation and calibration
/// of a direct geometry TOF measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectDataConfig {
    pub input_file: Option<PathBuf>,
    pub input_workspace: Option<Identifier>,
    pub output_workspace: Identifier,
    pub cleanup: CleanupMode,
    pub subalgorithm_logging: SubalgorithmLogging,
    pub epp_workspace: Option<Identifier>,
    pub epp_creation_method: EppMethod,
    pub sigma_for_calculated_epp: Option<f64>,
    pub elastic_channel: ElasticChannelMode,
    pub elastic_channel_workspace: Option<Identifier>,
    pub monitor: Option<i64>,
    pub incident_energy_calibration: Switch,
    pub incident_energy_workspace: Option<Identifier>,
    pub flat_bkg_scaling: f64,
    pub flat_bkg_averaging_window: i64,
    pub flat_bkg_workspace: Option<Identifier>,
    pub normalisation: NormalisationMethod,
    pub monitor_peak_width_in_sigmas: f64,
    pub normalisation_time_source: NormalisationTimeSource,
    pub tof_correction_stage: TofCorrectionStage,
    pub output_elastic_channel_workspace: Option<Identifier>,
    pub output_epp_workspace: Option<Identifier>,
    pub output_incident_energy_workspace: Option<Identifier>,
    pub output_flat_bkg_workspace: Option<Identifier>,
}

impl Default for CollectDataConfig {
    fn default() -> Self {
        Self {
            input_file: None,
            input_workspace: None,
            output_workspace: Identifier::default(),
            cleanup: CleanupMode::On,
            subalgorithm_logging: SubalgorithmLogging::Off,
            epp_workspace: None,
            epp_creation_method: EppMethod::Fit,
            sigma_for_calculated_epp: None,
            elastic_channel: ElasticChannelMode::SampleLog,
            elastic_channel_workspace: None,
            monitor: None,
            incident_energy_calibration: Switch::On,
            incident_energy_workspace: None,
            flat_bkg_scaling: 1.0,
            flat_bkg_averaging_window: 30,
            flat_bkg_workspace: None,
            normalisation: NormalisationMethod::Monitor,
            monitor_peak_width_in_sigmas: 3.0,
            normalisation_time_source: NormalisationTimeSource::DurationThenActualTime,
            tof_correction_stage: TofCorrectionStage::AfterCalibration,
            output_elastic_channel_workspace: None,
            output_epp_workspace: None,
            output_incident_energy_workspace: None,
            output_flat_bkg_workspace: None,
        }
    }
}

impl CollectDataConfig {
    /// Check the settings against each other and the registry before anything runs
    pub fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
        let mut issues = ValidationIssues::new();
        let file_given = self
            .input_file
            .as_ref()
            .map(|p| !p.as_os_str().is_empty())
            .unwrap_or(false);
        let ws_given = is_given(&self.input_workspace);
        if file_given == ws_given {
            issues.add(
                PROP_INPUT_FILE,
                "Must give either an input file or an input workspace.",
            );
        }
        check_workspace(&mut issues, registry, PROP_INPUT_WS, &self.input_workspace);
        check_workspace(&mut issues, registry, PROP_EPP_WS, &self.epp_workspace);
        check_workspace(
            &mut issues,
            registry,
            PROP_ELASTIC_CHANNEL_WS,
            &self.elastic_channel_workspace,
        );
        check_workspace(
            &mut issues,
            registry,
            PROP_INCIDENT_ENERGY_WS,
            &self.incident_energy_workspace,
        );
        check_workspace(&mut issues, registry, PROP_FLAT_BKG_WS, &self.flat_bkg_workspace);
        if self.output_workspace.is_empty() {
            issues.add(PROP_OUTPUT_WS, "An output workspace name is required.");
        }
        if self.flat_bkg_averaging_window < 1 {
            issues.add(PROP_FLAT_BKG_WINDOW, "The averaging window must be at least 1.");
        }
        if self.flat_bkg_scaling < 0.0 {
            issues.add(PROP_FLAT_BKG_SCALING, "Scaling cannot be negative.");
        }
        if self.monitor_peak_width_in_sigmas < 0.0 {
            issues.add(PROP_MON_PEAK_SIGMA_MULTIPLIER, "Width cannot be negative.");
        }
        if matches!(self.sigma_for_calculated_epp, Some(s) if s < 0.0) {
            issues.add(PROP_EPP_SIGMA, "Sigma cannot be negative.");
        }
        if matches!(self.monitor, Some(m) if m < 0) {
            issues.add(PROP_MON_INDEX, "Monitor cannot be negative.");
        }
        issues
    }

    pub fn uses_input_file(&self) -> bool {
        self.input_file.is_some() && !is_given(&self.input_workspace)
    }
}

/// Settings of the Diagnostics workflow: masking detectors with suspicious elastic peaks or
/// noisy backgrounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub input_workspace: Identifier,
    pub output_workspace: Identifier,
    pub cleanup: CleanupMode,
    pub subalgorithm_logging: SubalgorithmLogging,
    pub epp_workspace: Option<Identifier>,
    pub elastic_peak_diagnostics: Switch,
    pub elastic_peak_width_in_sigmas: f64,
    pub elastic_peak_low_threshold: f64,
    pub elastic_peak_high_threshold: f64,
    pub elastic_peak_error_threshold: f64,
    pub bkg_diagnostics: BkgDiagnosticsMode,
    pub bkg_width_in_sigmas: f64,
    pub noisy_bkg_low_threshold: f64,
    pub noisy_bkg_high_threshold: f64,
    pub noisy_bkg_error_threshold: f64,
    pub masked_detectors: Vec<i64>,
    pub output_diagnostics_report_workspace: Option<Identifier>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            input_workspace: Identifier::default(),
            output_workspace: Identifier::default(),
            cleanup: CleanupMode::On,
            subalgorithm_logging: SubalgorithmLogging::Off,
            epp_workspace: None,
            elastic_peak_diagnostics: Switch::On,
            elastic_peak_width_in_sigmas: 3.0,
            elastic_peak_low_threshold: 0.1,
            elastic_peak_high_threshold: 3.0,
            elastic_peak_error_threshold: 3.3,
            bkg_diagnostics: BkgDiagnosticsMode::Auto,
            bkg_width_in_sigmas: 10.0,
            noisy_bkg_low_threshold: 0.1,
            noisy_bkg_high_threshold: 3.3,
            noisy_bkg_error_threshold: 3.3,
            masked_detectors: vec![],
            output_diagnostics_report_workspace: None,
        }
    }
}

impl DiagnosticsConfig {
    pub fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
        let mut issues = ValidationIssues::new();
        if self.input_workspace.is_empty() {
            issues.add(PROP_INPUT_WS, "An input workspace is required.");
        } else if !registry.exists(&self.input_workspace) {
            issues.add(PROP_INPUT_WS, "Input workspace has to be in the registry.");
        }
        if self.output_workspace.is_empty() {
            issues.add(PROP_OUTPUT_WS, "An output workspace name is required.");
        }
        check_workspace(&mut issues, registry, PROP_EPP_WS, &self.epp_workspace);
        if !is_given(&self.epp_workspace) {
            if self.elastic_peak_diagnostics == Switch::On {
                issues.add(PROP_EPP_WS, "An EPP table is needed for elastic peak diagnostics.");
            }
            if self.bkg_diagnostics == BkgDiagnosticsMode::On {
                issues.add(PROP_EPP_WS, "An EPP table is needed for background diagnostics.");
            }
        }
        for (property, low, high) in [
            (
                PROP_ELASTIC_PEAK_DIAGNOSTICS,
                self.elastic_peak_low_threshold,
                self.elastic_peak_high_threshold,
            ),
            (
                PROP_BKG_DIAGNOSTICS,
                self.noisy_bkg_low_threshold,
                self.noisy_bkg_high_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&low) || high < 1.0 {
                issues.add(
                    property,
                    "Low threshold must be within [0, 1] and high threshold at least 1.",
                );
            }
        }
        if self.masked_detectors.iter().any(|&d| d < 0) {
            issues.add(PROP_USER_MASK, "Detector IDs cannot be negative.");
        }
        issues
    }
}

/// Settings of the Preprocess workflow for reflectometry data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub run: Vec<PathBuf>,
    pub input_workspace: Option<Identifier>,
    pub beam_position: Option<Identifier>,
    pub direct_beam_position: Option<Identifier>,
    pub output_workspace: Identifier,
    pub cleanup: CleanupMode,
    pub subalgorithm_logging: SubalgorithmLogging,
    pub slit_normalisation: Switch,
    pub flux_normalisation: NormalisationMethod,
    pub instrument_background: Option<Identifier>,
    pub flat_background: FlatBackgroundMethod,
    pub lower_background_offset: i64,
    pub lower_background_width: i64,
    pub upper_background_offset: i64,
    pub upper_background_width: i64,
    pub foreground_centre: Option<i64>,
    pub foreground_half_width: Option<i64>,
    pub sum_output: SumOutput,
    pub output_beam_position: Option<Identifier>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            run: vec![],
            input_workspace: None,
            beam_position: None,
            direct_beam_position: None,
            output_workspace: Identifier::default(),
            cleanup: CleanupMode::On,
            subalgorithm_logging: SubalgorithmLogging::Off,
            slit_normalisation: Switch::On,
            flux_normalisation: NormalisationMethod::Monitor,
            instrument_background: None,
            flat_background: FlatBackgroundMethod::Constant,
            lower_background_offset: 7,
            lower_background_width: 5,
            upper_background_offset: 7,
            upper_background_width: 5,
            foreground_centre: None,
            foreground_half_width: None,
            sum_output: SumOutput::Coherent,
            output_beam_position: None,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
        let mut issues = ValidationIssues::new();
        let runs_given = !self.run.is_empty();
        let ws_given = is_given(&self.input_workspace);
        if runs_given == ws_given {
            issues.add(PROP_RUN, "Must give either a list of runs or an input workspace.");
        }
        if ws_given && !is_given(&self.beam_position) {
            issues.add(
                PROP_BEAM_POS,
                "A beam position table is needed together with an input workspace.",
            );
        }
        check_workspace(&mut issues, registry, PROP_INPUT_WS, &self.input_workspace);
        check_workspace(&mut issues, registry, PROP_BEAM_POS, &self.beam_position);
        check_workspace(
            &mut issues,
            registry,
            PROP_DIRECT_BEAM_POS,
            &self.direct_beam_position,
        );
        check_workspace(
            &mut issues,
            registry,
            PROP_INSTRUMENT_BKG,
            &self.instrument_background,
        );
        if self.output_workspace.is_empty() {
            issues.add(PROP_OUTPUT_WS, "An output workspace name is required.");
        }
        if self.flat_background != FlatBackgroundMethod::Off
            && self.lower_background_width == 0
            && self.upper_background_width == 0
        {
            issues.add(
                PROP_BKG_METHOD,
                "Cannot calculate flat background if both upper and lower background widths are zero.",
            );
        }
        for (property, value) in [
            (PROP_LOWER_BKG_OFFSET, self.lower_background_offset),
            (PROP_LOWER_BKG_WIDTH, self.lower_background_width),
            (PROP_UPPER_BKG_OFFSET, self.upper_background_offset),
            (PROP_UPPER_BKG_WIDTH, self.upper_background_width),
        ] {
            if value < 0 {
                issues.add(property, "Value cannot be negative.");
            }
        }
        if matches!(self.foreground_centre, Some(c) if c < 1) {
            issues.add(PROP_FOREGROUND_CENTRE, "Foreground centre must be at least 1.");
        }
        if matches!(self.foreground_half_width, Some(w) if w < 0) {
            issues.add(PROP_FOREGROUND_HALF_WIDTH, "Half width cannot be negative.");
        }
        issues
    }
}

/// A workspace loaded into the registry before any run. These belong to the caller and are
/// never deleted by a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preload {
    pub name: Identifier,
    pub file: PathBuf,
}

/// One workflow invocation in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "workflow")]
pub enum RunConfig {
    CollectData(CollectDataConfig),
    Diagnostics(DiagnosticsConfig),
    Preprocess(PreprocessConfig),
}

impl RunConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CollectData(_) => "CollectData",
            Self::Diagnostics(_) => "Diagnostics",
            Self::Preprocess(_) => "Preprocess",
        }
    }

    pub fn output_workspace(&self) -> &Identifier {
        match self {
            Self::CollectData(c) => &c.output_workspace,
            Self::Diagnostics(c) => &c.output_workspace,
            Self::Preprocess(c) => &c.output_workspace,
        }
    }

    /// Files the run would load
    pub fn input_files(&self) -> Vec<&Path> {
        match self {
            Self::CollectData(c) if c.uses_input_file() => {
                c.input_file.iter().map(|p| p.as_path()).collect()
            }
            Self::Preprocess(c) if !is_given(&c.input_workspace) => {
                c.run.iter().map(|p| p.as_path()).collect()
            }
            _ => vec![],
        }
    }

    /// A run exists if every file it loads exists. Runs on registry inputs always exist.
    pub fn does_run_exist(&self) -> bool {
        self.input_files().iter().all(|p| p.exists())
    }
}

/// Structure representing a batch of reductions. Contains the workspaces to preload and the
/// runs to do, in order.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub preload: Vec<Preload>,
    #[serde(default)]
    pub runs: Vec<RunConfig>,
}

impl BatchConfig {
    /// Read the configuration in a YAML file
    /// Returns a BatchConfig if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// A small batch showing every workflow, with default settings
    pub fn template() -> Self {
        let collect = CollectDataConfig {
            input_file: Some(PathBuf::from("sample.yml")),
            output_workspace: Identifier::new("sample"),
            ..Default::default()
        };
        let diagnostics = DiagnosticsConfig {
            input_workspace: Identifier::new("sample"),
            output_workspace: Identifier::new("sample_mask"),
            epp_workspace: Some(Identifier::new("sample_epp")),
            ..Default::default()
        };
        let preprocess = PreprocessConfig {
            run: vec![PathBuf::from("reflected.yml")],
            output_workspace: Identifier::new("reflected"),
            ..Default::default()
        };
        Self {
            preload: vec![],
            runs: vec![
                RunConfig::CollectData(CollectDataConfig {
                    output_epp_workspace: Some(Identifier::new("sample_epp")),
                    ..collect
                }),
                RunConfig::Diagnostics(diagnostics),
                RunConfig::Preprocess(preprocess),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::workspace::MatrixWorkspace;

    #[test]
    fn test_collect_data_needs_exactly_one_input() {
        let registry = InMemoryRegistry::new();
        let config = CollectDataConfig {
            output_workspace: Identifier::new("out"),
            ..Default::default()
        };
        let issues = config.validate(&registry);
        assert!(issues.get(PROP_INPUT_FILE).is_some());

        let config = CollectDataConfig {
            input_file: Some(PathBuf::from("a.yml")),
            input_workspace: Some(Identifier::new("W")),
            output_workspace: Identifier::new("out"),
            ..Default::default()
        };
        let issues = config.validate(&registry);
        assert!(issues.get(PROP_INPUT_FILE).is_some());
        // W is not in the registry either
        assert!(issues.get(PROP_INPUT_WS).is_some());
    }

    #[test]
    fn test_collect_data_valid_with_registry_input() {
        let mut registry = InMemoryRegistry::new();
        registry.store(Identifier::new("W"), MatrixWorkspace::single_valued(1.0).into());
        let config = CollectDataConfig {
            input_workspace: Some(Identifier::new("W")),
            output_workspace: Identifier::new("out"),
            ..Default::default()
        };
        assert!(config.validate(&registry).is_empty());
    }

    #[test]
    fn test_diagnostics_needs_epp_table() {
        let mut registry = InMemoryRegistry::new();
        registry.store(Identifier::new("W"), MatrixWorkspace::single_valued(1.0).into());
        let config = DiagnosticsConfig {
            input_workspace: Identifier::new("W"),
            output_workspace: Identifier::new("mask"),
            ..Default::default()
        };
        let issues = config.validate(&registry);
        assert_eq!(
            issues.get(PROP_EPP_WS),
            Some("An EPP table is needed for elastic peak diagnostics.")
        );

        let config = DiagnosticsConfig {
            elastic_peak_diagnostics: Switch::Off,
            ..config
        };
        assert!(config.validate(&registry).is_empty());
    }

    #[test]
    fn test_preprocess_background_widths() {
        let registry = InMemoryRegistry::new();
        let config = PreprocessConfig {
            run: vec![PathBuf::from("r.yml")],
            output_workspace: Identifier::new("out"),
            lower_background_width: 0,
            upper_background_width: 0,
            ..Default::default()
        };
        assert!(config.validate(&registry).get(PROP_BKG_METHOD).is_some());
        let config = PreprocessConfig {
            flat_background: FlatBackgroundMethod::Off,
            ..config
        };
        assert!(config.validate(&registry).is_empty());
    }

    #[test]
    fn test_batch_yaml() {
        let yaml = r#"
preload:
  - name: W
    file: w.yml
runs:
  - workflow: CollectData
    input_workspace: W
    output_workspace: out
    cleanup: OFF
    normalisation: time
    normalisation_time_source: duration
  - workflow: Diagnostics
    input_workspace: out
    output_workspace: mask
    bkg_diagnostics: AUTO
"#;
        let batch: BatchConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(batch.preload.len(), 1);
        assert_eq!(batch.runs.len(), 2);
        match &batch.runs[0] {
            RunConfig::CollectData(c) => {
                assert_eq!(c.cleanup, CleanupMode::Off);
                assert_eq!(c.normalisation, NormalisationMethod::Time);
                assert_eq!(c.normalisation_time_source, NormalisationTimeSource::Duration);
                assert_eq!(c.flat_bkg_averaging_window, 30);
            }
            _ => panic!("Expected CollectData"),
        }
        assert_eq!(batch.runs[1].kind(), "Diagnostics");
        assert!(batch.runs[1].does_run_exist());
    }

    #[test]
    fn test_template_round_trips() {
        let yaml = serde_yaml::to_string(&BatchConfig::template()).unwrap();
        let batch: BatchConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(batch.runs.len(), 3);
    }

    #[test]
    fn test_missing_config_file() {
        let result = BatchConfig::read_config_file(Path::new("/definitely/not/here.yml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }
}
