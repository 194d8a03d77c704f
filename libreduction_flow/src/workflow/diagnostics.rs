use bit_set::BitSet;

use super::{given, Workflow, WorkflowRun};
use crate::config::{
    BkgDiagnosticsMode, CleanupMode, DiagnosticsConfig, SubalgorithmLogging, Switch,
    PROP_OUTPUT_DIAGNOSTICS_REPORT, PROP_OUTPUT_DIAGNOSTICS_REPORT_WS,
};
use crate::error::{StepError, ValidationIssues, WorkflowError};
use crate::identifier::Identifier;
use crate::progress::BarColor;
use crate::registry::Registry;
use crate::steps::{
    CloneWorkspace, CreateWorkspace, ExtractMask, Integrate, MaskDetectors, MedianDetectorTest,
    Plus,
};
use crate::workspace::{Cell, EppRow, MatrixWorkspace, TableWorkspace, COLUMN_WORKSPACE_INDEX};

/// Instrument parameter switching background diagnostics when left on AUTO
pub const PARAM_ENABLE_BKG_DIAGNOSTICS: &str = "enable_background_diagnostics";

/// Format sorted spectrum numbers as comma separated runs, `1-3, 7`
pub fn compact_ranges(spectra: &BitSet) -> String {
    let mut blocks: Vec<(usize, usize)> = vec![];
    for n in spectra.iter() {
        match blocks.last_mut() {
            Some((_, end)) if *end + 1 == n => *end = n,
            _ => blocks.push((n, n)),
        }
    }
    blocks
        .iter()
        .map(|&(begin, end)| {
            if begin == end {
                begin.to_string()
            } else {
                format!("{begin}-{end}")
            }
        })
        .collect::<Vec<String>>()
        .join(", ")
}

/// Spectrum numbers of the spectra flagged in a one bin mask workspace
fn flagged_spectra(mask: &MatrixWorkspace) -> BitSet {
    let mut spectra = BitSet::new();
    for i in 0..mask.histogram_count() {
        if mask.y[[i, 0]] != 0.0 {
            spectra.insert(mask.spectrum_numbers[i].max(0) as usize);
        }
    }
    spectra
}

fn first_bin_values(ws: &MatrixWorkspace) -> Vec<Cell> {
    ws.y.column(0).iter().map(|&v| Cell::Float(v)).collect()
}

fn report_section(title: &str, spectra: Option<&BitSet>) -> String {
    match spectra {
        Some(spectra) if !spectra.is_empty() => format!("{title}\n{}", compact_ranges(spectra)),
        _ => format!("{title}\nNone"),
    }
}

/// Masks detectors chosen by the user, detectors with suspicious elastic peak intensities and
/// detectors with noisy backgrounds.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics<'c> {
    config: &'c DiagnosticsConfig,
}

impl<'c> Diagnostics<'c> {
    pub fn new(config: &'c DiagnosticsConfig) -> Self {
        Self { config }
    }

    fn epp_rows(&self, run: &WorkflowRun, epp: &Identifier, n: usize) -> Result<Vec<EppRow>, StepError> {
        let table = run.table(epp)?;
        (0..n)
            .map(|i| EppRow::read(table, i).ok_or(StepError::MissingEppRow(i)))
            .collect()
    }

    fn user_mask(&self, run: &mut WorkflowRun, main: &Identifier) -> Result<Identifier, WorkflowError> {
        let n = run.matrix(main)?.histogram_count();
        let create = CreateWorkspace {
            suffix: String::from("mask_template"),
            x: vec![0.0; n],
            y: vec![0.0; n],
            n_spec: n as i64,
        };
        let template = run.step(&create, Some(main.clone()))?;
        let mask = MaskDetectors {
            detectors: self.config.masked_detectors.clone(),
        };
        let template = run.step(&mask, (template, None))?;
        let (user_mask, count) = run.step(
            &ExtractMask {
                suffix: String::from("user_mask_extracted"),
            },
            template.clone(),
        )?;
        spdlog::debug!("{count} spectra masked by user");
        run.cleanup([template]);
        Ok(user_mask)
    }

    /// Integrate around the elastic peaks and test the intensities against their median
    fn elastic_peak_diagnostics(
        &self,
        run: &mut WorkflowRun,
        main: &Identifier,
        epp: &Identifier,
    ) -> Result<(Identifier, Identifier), WorkflowError> {
        let c = self.config;
        let n = run.matrix(main)?.histogram_count();
        let (lowers, uppers): (Vec<f64>, Vec<f64>) = self
            .epp_rows(run, epp, n)?
            .iter()
            .map(|row| {
                if row.is_success() {
                    let half_width = c.elastic_peak_width_in_sigmas * row.sigma;
                    (row.peak_centre - half_width, row.peak_centre + half_width)
                } else {
                    (0.0, 0.0)
                }
            })
            .unzip();
        let integrate = Integrate {
            suffix: String::from("integrated_elastic_peak"),
            lowers,
            uppers,
            partial_bins: true,
        };
        let integrated = run.step(&integrate, main.clone())?;
        let test = MedianDetectorTest {
            suffix: String::from("diagnostics_elastic_peak"),
            low_threshold: c.elastic_peak_low_threshold,
            high_threshold: c.elastic_peak_high_threshold,
            significance: c.elastic_peak_error_threshold,
            low_outlier: None,
        };
        let (diagnosed, failures) = run.step(&test, integrated.clone())?;
        spdlog::debug!("{failures} spectra failed elastic peak diagnostics");
        Ok((integrated, diagnosed))
    }

    /// Integrate the flanks on both sides of the elastic peaks and test the sums against their
    /// median
    fn bkg_diagnostics(
        &self,
        run: &mut WorkflowRun,
        main: &Identifier,
        epp: &Identifier,
    ) -> Result<(Identifier, Identifier), WorkflowError> {
        let c = self.config;
        let (n, edges) = {
            let ws = run.matrix(main)?;
            let edges: Vec<(f64, f64)> = (0..ws.histogram_count())
                .map(|i| {
                    let x = ws.read_x(i);
                    (x[0], x[x.len() - 1])
                })
                .collect();
            (ws.histogram_count(), edges)
        };
        let rows = self.epp_rows(run, epp, n)?;
        let mut left = Integrate {
            suffix: String::from("integrated_left_bkgs"),
            lowers: vec![0.0; n],
            uppers: vec![0.0; n],
            partial_bins: false,
        };
        let mut right = Integrate {
            suffix: String::from("integrated_right_bkgs"),
            lowers: vec![0.0; n],
            uppers: vec![0.0; n],
            partial_bins: false,
        };
        for (i, row) in rows.iter().enumerate() {
            if !row.is_success() {
                continue;
            }
            let half_width = c.bkg_width_in_sigmas * row.sigma;
            let (first, last) = edges[i];
            left.uppers[i] = row.peak_centre - half_width;
            left.lowers[i] = first.min(left.uppers[i]);
            right.uppers[i] = last;
            right.lowers[i] = (row.peak_centre + half_width).min(last);
        }
        let left = run.step(&left, main.clone())?;
        let right = run.step(&right, main.clone())?;
        let sum = Plus {
            suffix: String::from("integrated_bkgs_sum"),
        };
        let integrated = run.step(&sum, (left.clone(), right.clone()))?;
        run.cleanup([&left, &right]);
        let test = MedianDetectorTest {
            suffix: String::from("diagnostics_noisy_bkg"),
            low_threshold: c.noisy_bkg_low_threshold,
            high_threshold: c.noisy_bkg_high_threshold,
            significance: c.noisy_bkg_error_threshold,
            low_outlier: Some(0.0),
        };
        let (diagnosed, failures) = run.step(&test, integrated.clone())?;
        spdlog::debug!("{failures} spectra failed background diagnostics");
        Ok((integrated, diagnosed))
    }

    fn bkg_diagnostics_enabled(&self, run: &mut WorkflowRun, main: &Identifier) -> Result<bool, WorkflowError> {
        match self.config.bkg_diagnostics {
            BkgDiagnosticsMode::On => Ok(true),
            BkgDiagnosticsMode::Off => Ok(false),
            BkgDiagnosticsMode::Auto => {
                let instrument = &run.matrix(main)?.instrument;
                let from_ipf = if instrument.has_parameter(PARAM_ENABLE_BKG_DIAGNOSTICS) {
                    Some(
                        instrument
                            .bool_parameter(PARAM_ENABLE_BKG_DIAGNOSTICS)
                            .unwrap_or(false),
                    )
                } else {
                    None
                };
                let report = run.report();
                match from_ipf {
                    Some(true) => report.notice("BkgDiagnostics set to ON by the IPF."),
                    Some(false) => report.notice("BkgDiagnostics set to OFF by the IPF."),
                    None => report.notice("Defaulted BkgDiagnostics to ON."),
                }
                Ok(from_ipf.unwrap_or(true))
            }
        }
    }
}

impl Workflow for Diagnostics<'_> {
    fn name(&self) -> &'static str {
        "Diagnostics"
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
        BarColor::MAGENTA
    }

    fn stages(&self) -> usize {
        4
    }

    fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
        self.config.validate(registry)
    }

    fn execute(&self, run: &mut WorkflowRun) -> Result<Identifier, WorkflowError> {
        let c = self.config;
        let main = c.input_workspace.clone();
        run.protect([&main]);
        let epp = given(&c.epp_workspace).cloned();
        run.protect([&epp]);
        let report_target = given(&c.output_diagnostics_report_workspace);
        let mut table = TableWorkspace::new();
        if report_target.is_some() {
            let n = run.matrix(&main)?.histogram_count();
            table.add_column(
                COLUMN_WORKSPACE_INDEX,
                (0..n).map(|i| Cell::Int(i as i64)).collect(),
            );
        }

        run.progress("Applying user mask")?;
        let user_mask = self.user_mask(run, &main)?;
        let diagnostics = CloneWorkspace {
            suffix: String::from("diagnostics"),
        };
        let mut diagnostics = run.step(&diagnostics, user_mask.clone())?;
        let user_masked = {
            let mask = run.matrix(&user_mask)?;
            if report_target.is_some() {
                table.add_column("UserMask", first_bin_values(mask));
            }
            flagged_spectra(mask)
        };
        run.cleanup([&user_mask]);
        let plus = Plus {
            suffix: String::from("diagnostics"),
        };

        run.progress("Elastic peak diagnostics")?;
        let mut peak_masked = None;
        if c.elastic_peak_diagnostics == Switch::On {
            if let Some(epp) = epp.as_ref() {
                let (integrated, diagnosed) = self.elastic_peak_diagnostics(run, &main, epp)?;
                if report_target.is_some() {
                    table.add_column("ElasticIntensity", first_bin_values(run.matrix(&integrated)?));
                    table.add_column("IntensityDiagnosed", first_bin_values(run.matrix(&diagnosed)?));
                }
                peak_masked = Some(flagged_spectra(run.matrix(&diagnosed)?));
                run.cleanup([&integrated]);
                diagnostics = run.step(&plus, (diagnostics, diagnosed.clone()))?;
                run.cleanup([&diagnosed]);
            }
        }

        run.progress("Background diagnostics")?;
        let mut bkg_masked = None;
        if self.bkg_diagnostics_enabled(run, &main)? {
            match epp.as_ref() {
                Some(epp) => {
                    let (integrated, diagnosed) = self.bkg_diagnostics(run, &main, epp)?;
                    if report_target.is_some() {
                        table.add_column("FlatBkg", first_bin_values(run.matrix(&integrated)?));
                        table.add_column("BkgDiagnosed", first_bin_values(run.matrix(&diagnosed)?));
                    }
                    bkg_masked = Some(flagged_spectra(run.matrix(&diagnosed)?));
                    run.cleanup([&integrated]);
                    diagnostics = run.step(&plus, (diagnostics, diagnosed.clone()))?;
                    run.cleanup([&diagnosed]);
                }
                None => run
                    .report()
                    .warning("No EPP table given. Skipping background diagnostics."),
            }
        }
        run.cleanup([&main]);

        run.progress("Reporting")?;
        if let Some(target) = report_target {
            run.set_output_workspace(PROP_OUTPUT_DIAGNOSTICS_REPORT_WS, target, table.into());
        }
        let text = [
            report_section("Spectra masked by user:", Some(&user_masked)),
            report_section(
                "Spectra marked as bad by elastic peak diagnostics:",
                peak_masked.as_ref(),
            ),
            report_section(
                "Spectra marked as bad by flat background diagnostics:",
                bkg_masked.as_ref(),
            ),
        ]
        .join("\n");
        run.set_text_output(PROP_OUTPUT_DIAGNOSTICS_REPORT, text);
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::report::{RecordingSink, ReportLevel};
    use crate::simulation::{PeakShape, SimulatedEngine, SyntheticWorkspace};
    use crate::steps::testing::Harness;
    use crate::steps::{Content, ExtractMonitors, FitEpp};
    use crate::workflow::run_workflow;
    use crate::workspace::ParameterValue;

    #[test]
    fn test_compact_ranges() {
        let spectra: BitSet = [1, 2, 3, 7].into_iter().collect();
        assert_eq!(compact_ranges(&spectra), "1-3, 7");
        let spectra: BitSet = [4, 9, 10].into_iter().collect();
        assert_eq!(compact_ranges(&spectra), "4, 9-10");
        assert_eq!(compact_ranges(&BitSet::new()), "");
    }

    /// Five detectors, the last one much brighter than the rest, plus their fitted EPP table
    fn setup(parameters: &[(&str, ParameterValue)]) -> (InMemoryRegistry, SimulatedEngine) {
        let mut fixture = SyntheticWorkspace {
            detectors: 5,
            detector_weights: vec![1.0, 1.0, 1.0, 1.0, 20.0],
            peak: Some(PeakShape {
                centre: 1305.0,
                sigma: 20.0,
                height: 100.0,
            }),
            ..Default::default()
        };
        for (name, value) in parameters {
            fixture.parameters.insert(name.to_string(), value.clone());
        }
        let mut harness = Harness::new().with_workspace("raw", fixture.build().unwrap());
        let (dets, _) = harness
            .apply(&ExtractMonitors::default(), Identifier::new("raw"))
            .unwrap();
        let epp = harness
            .apply(&FitEpp::for_content(Content::Detectors), dets.clone())
            .unwrap();
        let mut registry = InMemoryRegistry::new();
        for (name, id) in [("data", dets), ("epp", epp)] {
            let ws = harness.registry.retrieve(&id).cloned().unwrap();
            registry.store(Identifier::new(name), ws);
        }
        (registry, SimulatedEngine::new())
    }

    fn config() -> DiagnosticsConfig {
        DiagnosticsConfig {
            input_workspace: Identifier::new("data"),
            output_workspace: Identifier::new("mask"),
            epp_workspace: Some(Identifier::new("epp")),
            masked_detectors: vec![1, 2],
            bkg_diagnostics: BkgDiagnosticsMode::Off,
            ..Default::default()
        }
    }

    #[test]
    fn test_user_and_peak_masks_combine() {
        let (mut registry, mut engine) = setup(&[]);
        let config = DiagnosticsConfig {
            output_diagnostics_report_workspace: Some(Identifier::new("report")),
            ..config()
        };
        let summary = run_workflow(
            &Diagnostics::new(&config),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        )
        .unwrap();
        let mask = registry.matrix(&Identifier::new("mask")).unwrap();
        assert_eq!(mask.y.column(0).to_vec(), vec![1.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(
            summary.text_outputs.get(PROP_OUTPUT_DIAGNOSTICS_REPORT).unwrap(),
            "Spectra masked by user:\n2-3\n\
             Spectra marked as bad by elastic peak diagnostics:\n6\n\
             Spectra marked as bad by flat background diagnostics:\nNone"
        );
        let table = registry.table(&Identifier::new("report")).unwrap();
        assert_eq!(
            table.column_names(),
            vec![
                "WorkspaceIndex",
                "UserMask",
                "ElasticIntensity",
                "IntensityDiagnosed"
            ]
        );
        assert_eq!(table.row_count(), 5);
        assert_eq!(
            registry.names(),
            vec![
                Identifier::new("data"),
                Identifier::new("epp"),
                Identifier::new("mask"),
                Identifier::new("report")
            ]
        );
    }

    #[test]
    fn test_bkg_diagnostics_auto() {
        let (mut registry, mut engine) = setup(&[(
            PARAM_ENABLE_BKG_DIAGNOSTICS,
            ParameterValue::Bool(false),
        )]);
        let config = DiagnosticsConfig {
            bkg_diagnostics: BkgDiagnosticsMode::Auto,
            ..config()
        };
        let mut sink = RecordingSink::default();
        run_workflow(&Diagnostics::new(&config), &mut registry, &mut engine, &mut sink, None)
            .unwrap();
        assert_eq!(engine.call_count("MedianDetectorTest"), 1);
        assert_eq!(
            sink.entries,
            vec![(
                ReportLevel::Notice,
                String::from("BkgDiagnostics set to OFF by the IPF.")
            )]
        );

        let (mut registry, mut engine) = setup(&[]);
        let mut sink = RecordingSink::default();
        run_workflow(&Diagnostics::new(&config), &mut registry, &mut engine, &mut sink, None)
            .unwrap();
        assert_eq!(engine.call_count("MedianDetectorTest"), 2);
        assert_eq!(engine.call_count("Integration"), 3);
        assert_eq!(
            sink.entries,
            vec![(
                ReportLevel::Notice,
                String::from("Defaulted BkgDiagnostics to ON.")
            )]
        );
    }

    #[test]
    fn test_auto_bkg_diagnostics_without_epp() {
        let (mut registry, mut engine) = setup(&[]);
        let config = DiagnosticsConfig {
            epp_workspace: None,
            elastic_peak_diagnostics: Switch::Off,
            bkg_diagnostics: BkgDiagnosticsMode::Auto,
            ..config()
        };
        let mut sink = RecordingSink::default();
        let summary =
            run_workflow(&Diagnostics::new(&config), &mut registry, &mut engine, &mut sink, None)
                .unwrap();
        assert_eq!(engine.call_count("Integration"), 0);
        assert_eq!(sink.entries.len(), 2);
        assert_eq!(sink.entries[1].0, ReportLevel::Warning);
        assert!(summary.text_outputs[PROP_OUTPUT_DIAGNOSTICS_REPORT]
            .contains("elastic peak diagnostics:\nNone"));
    }
}
