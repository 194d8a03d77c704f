//! Orchestration of whole reductions.
//!
//! A [`Workflow`] threads workspace handles through a fixed sequence of
//! [`WorkflowStep`]s. Everything a run needs besides its settings lives in a [`WorkflowRun`]:
//! the registry and engine it works against, the [`NameSource`] for its intermediates, the
//! [`IntermediateCleanup`] deciding their lifetime, and the [`Report`] it accumulates.
//!
//! Steps never delete anything. After every step that supersedes a handle, the workflow calls
//! [`WorkflowRun::cleanup`] on the old one, or [`WorkflowRun::cleanup_later`] if it still has to
//! be read at the end of the run. Caller owned inputs are protected up front.
//!
//! A run that fails returns its error as soon as it happens. There is no rollback: whatever
//! was created up to that point stays in the registry, no output is set and the report is
//! dropped without reaching the sink.
pub mod collect_data;
pub mod diagnostics;
pub mod preprocess;

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

use super::cleanup::IntermediateCleanup;
use super::config::{CleanupMode, SubalgorithmLogging};
use super::error::{RegistryError, StepError, ValidationIssues, WorkflowError};
use super::identifier::{Identifier, Resolve};
use super::names::NameSource;
use super::operation::Engine;
use super::progress::{BarColor, StageStatus};
use super::registry::Registry;
use super::report::{LogSink, Report};
use super::steps::{StepContext, WorkflowStep};
use super::workspace::{IndexType, MatrixWorkspace, TableWorkspace, Workspace};

pub use collect_data::CollectData;
pub use diagnostics::Diagnostics;
pub use preprocess::Preprocess;

/// Instrument parameter naming the spectrum of the incident beam monitor
pub const PARAM_DEFAULT_MONITOR: &str = "default-incident-monitor-spectrum";

/// An optional workspace property that was actually given
pub fn given(id: &Option<Identifier>) -> Option<&Identifier> {
    id.as_ref().filter(|id| !id.is_empty())
}

/// Workspace index of the incident monitor as declared by the instrument
pub fn default_monitor_index(ws: &MatrixWorkspace) -> Result<usize, StepError> {
    let spectrum = ws
        .instrument
        .int_parameter(PARAM_DEFAULT_MONITOR)
        .ok_or_else(|| StepError::MissingInstrumentParameter(PARAM_DEFAULT_MONITOR.to_string()))?;
    Ok(ws.workspace_index(spectrum, IndexType::SpectrumNumber)?)
}

/// Where progress messages of a run go
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    pub tx: Sender<StageStatus>,
    pub run_index: usize,
}

#[derive(Debug)]
struct ProgressState {
    channel: ProgressChannel,
    color: BarColor,
    stages: usize,
    done: usize,
}

#[derive(Debug)]
struct PendingOutput {
    property: String,
    target: Identifier,
    workspace: Workspace,
}

/// What a finished run leaves behind besides the registry entries
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub output: Identifier,
    /// Optional output property name to the workspace committed for it
    pub optional_outputs: BTreeMap<String, Identifier>,
    pub text_outputs: BTreeMap<String, String>,
    /// The report as it was flushed to the sink
    pub report: Report,
}

/// The state of one workflow run
pub struct WorkflowRun<'a> {
    registry: &'a mut dyn Registry,
    engine: &'a mut dyn Engine,
    names: NameSource,
    cleanup: IntermediateCleanup,
    report: Report,
    logging: bool,
    output: Identifier,
    pending: Vec<PendingOutput>,
    text_outputs: BTreeMap<String, String>,
    progress: Option<ProgressState>,
}

impl<'a> WorkflowRun<'a> {
    pub fn new(
        registry: &'a mut dyn Registry,
        engine: &'a mut dyn Engine,
        prefix: &str,
        output: &Identifier,
        cleanup_mode: CleanupMode,
        logging: SubalgorithmLogging,
    ) -> Self {
        Self {
            registry,
            engine,
            names: NameSource::new(prefix, cleanup_mode),
            cleanup: IntermediateCleanup::new(cleanup_mode, logging),
            report: Report::new(),
            logging: logging.enabled(),
            output: output.clone(),
            pending: vec![],
            text_outputs: BTreeMap::new(),
            progress: None,
        }
    }

    /// Send a StageStatus for every stage started, `stages` of them in total
    pub fn with_progress(mut self, channel: ProgressChannel, color: BarColor, stages: usize) -> Self {
        self.progress = Some(ProgressState {
            channel,
            color,
            stages: stages.max(1),
            done: 0,
        });
        self
    }

    /// Run a single step against this run's registry, engine, names and report
    pub fn step<S: WorkflowStep>(&mut self, step: &S, input: S::Input) -> Result<S::Output, StepError> {
        spdlog::debug!("{}: running {}", self.output, step.name());
        let mut ctx = StepContext {
            registry: &mut *self.registry,
            engine: &mut *self.engine,
            names: &self.names,
            report: &mut self.report,
            logging: self.logging,
        };
        step.apply(&mut ctx, input)
    }

    pub fn cleanup<I>(&mut self, handles: I)
    where
        I: IntoIterator,
        I::Item: Resolve,
    {
        self.cleanup.cleanup(&mut *self.registry, handles);
    }

    pub fn cleanup_later<I>(&mut self, handles: I)
    where
        I: IntoIterator,
        I::Item: Resolve,
    {
        self.cleanup.cleanup_later(handles);
    }

    pub fn protect<I>(&mut self, handles: I)
    where
        I: IntoIterator,
        I::Item: Resolve,
    {
        self.cleanup.protect(handles);
    }

    pub fn names(&self) -> &NameSource {
        &self.names
    }

    pub fn report(&mut self) -> &mut Report {
        &mut self.report
    }

    pub fn registry(&self) -> &dyn Registry {
        &*self.registry
    }

    pub fn matrix(&self, id: &Identifier) -> Result<&MatrixWorkspace, StepError> {
        Ok(self.registry.matrix(id)?)
    }

    pub fn table(&self, id: &Identifier) -> Result<&TableWorkspace, StepError> {
        Ok(self.registry.table(id)?)
    }

    /// Set an optional output property to the workspace currently held under `id`.
    ///
    /// The workspace is copied right away, so `id` may be cleaned up afterwards. It lands in
    /// the registry under `target` only when the run finalizes. Setting a property twice keeps
    /// the latest value.
    pub fn set_output(
        &mut self,
        property: &str,
        target: &Identifier,
        id: &Identifier,
    ) -> Result<(), WorkflowError> {
        let workspace = self
            .registry
            .retrieve(id)
            .cloned()
            .ok_or_else(|| RegistryError::Missing(id.clone()))?;
        self.set_output_workspace(property, target, workspace);
        Ok(())
    }

    /// Like [`WorkflowRun::set_output`] for a workspace built outside the registry
    pub fn set_output_workspace(&mut self, property: &str, target: &Identifier, workspace: Workspace) {
        self.pending.retain(|p| p.property != property);
        self.pending.push(PendingOutput {
            property: property.to_string(),
            target: target.clone(),
            workspace,
        });
    }

    pub fn set_text_output(&mut self, property: &str, text: String) {
        self.text_outputs.insert(property.to_string(), text);
    }

    /// Announce the start of a stage
    pub fn progress(&mut self, stage: &str) -> Result<(), WorkflowError> {
        spdlog::debug!("{}: {}", self.output, stage);
        if let Some(state) = self.progress.as_mut() {
            let fraction = (state.done as f32 / state.stages as f32).min(1.0);
            state.channel.tx.send(StageStatus::new(
                fraction,
                self.output.as_str(),
                stage,
                state.channel.run_index,
                state.color,
            ))?;
            state.done += 1;
        }
        Ok(())
    }

    /// Commit `terminal` as the output workspace and the optional outputs, delete the
    /// intermediates, then flush the report to `sink`.
    pub fn finalize(
        mut self,
        terminal: &Identifier,
        sink: &mut dyn LogSink,
    ) -> Result<RunSummary, WorkflowError> {
        let result = self
            .registry
            .retrieve(terminal)
            .cloned()
            .ok_or_else(|| RegistryError::Missing(terminal.clone()))?;
        if terminal != &self.output {
            self.registry.store(self.output.clone(), result);
        }
        self.cleanup.protect([&self.output]);
        self.cleanup.cleanup(&mut *self.registry, [terminal]);

        let mut optional_outputs = BTreeMap::new();
        for pending in std::mem::take(&mut self.pending) {
            self.registry.store(pending.target.clone(), pending.workspace);
            self.cleanup.protect([&pending.target]);
            optional_outputs.insert(pending.property, pending.target);
        }
        self.cleanup.final_cleanup(&mut *self.registry);

        if let Some(state) = self.progress.as_ref() {
            state.channel.tx.send(StageStatus::new(
                1.0,
                self.output.as_str(),
                "Done",
                state.channel.run_index,
                state.color,
            ))?;
        }
        self.report.to_log(sink);
        Ok(RunSummary {
            output: self.output,
            optional_outputs,
            text_outputs: self.text_outputs,
            report: self.report,
        })
    }
}

/// A top-level reduction
pub trait Workflow {
    /// Name used in logs, e.g. `CollectData`
    fn name(&self) -> &'static str;

    fn output_workspace(&self) -> &Identifier;

    /// Base of the intermediate names. Defaults to the output name, which keeps runs writing
    /// different outputs apart in a shared registry.
    fn name_prefix(&self) -> String {
        self.output_workspace().to_string()
    }

    fn cleanup_mode(&self) -> CleanupMode;

    fn subalgorithm_logging(&self) -> SubalgorithmLogging;

    fn color(&self) -> BarColor {
        BarColor::CYAN
    }

    /// Number of progress stages `execute` announces
    fn stages(&self) -> usize;

    /// Check the settings against the registry before anything is created
    fn validate(&self, registry: &dyn Registry) -> ValidationIssues;

    /// Run the pipeline, returning the handle of the terminal workspace
    fn execute(&self, run: &mut WorkflowRun) -> Result<Identifier, WorkflowError>;
}

/// Validate, execute and finalize a workflow
pub fn run_workflow(
    workflow: &dyn Workflow,
    registry: &mut dyn Registry,
    engine: &mut dyn Engine,
    sink: &mut dyn LogSink,
    progress: Option<ProgressChannel>,
) -> Result<RunSummary, WorkflowError> {
    let issues = workflow.validate(&*registry);
    if let Err(issues) = issues.into_result() {
        spdlog::warn!(
            "{} for {} rejected: {}",
            workflow.name(),
            workflow.output_workspace(),
            issues
        );
        return Err(issues.into());
    }
    spdlog::info!(
        "{} started for {}",
        workflow.name(),
        workflow.output_workspace()
    );
    let prefix = workflow.name_prefix();
    let mut run = WorkflowRun::new(
        registry,
        engine,
        &prefix,
        workflow.output_workspace(),
        workflow.cleanup_mode(),
        workflow.subalgorithm_logging(),
    );
    if let Some(channel) = progress {
        run = run.with_progress(channel, workflow.color(), workflow.stages());
    }
    let terminal = workflow.execute(&mut run)?;
    let summary = run.finalize(&terminal, sink)?;
    spdlog::info!(
        "{} finished, output in {}",
        workflow.name(),
        summary.output
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::report::{RecordingSink, ReportLevel};
    use crate::simulation::SimulatedEngine;
    use crate::steps::Scale;
    use crate::workspace::MatrixWorkspace;

    /// Doubles its input twice, keeping the first result as an optional output
    struct Doubler {
        input: Identifier,
        output: Identifier,
        cleanup: CleanupMode,
    }

    impl Workflow for Doubler {
        fn name(&self) -> &'static str {
            "Doubler"
        }

        fn output_workspace(&self) -> &Identifier {
            &self.output
        }

        fn cleanup_mode(&self) -> CleanupMode {
            self.cleanup
        }

        fn subalgorithm_logging(&self) -> SubalgorithmLogging {
            SubalgorithmLogging::Off
        }

        fn stages(&self) -> usize {
            2
        }

        fn validate(&self, registry: &dyn Registry) -> ValidationIssues {
            let mut issues = ValidationIssues::new();
            if !registry.exists(&self.input) {
                issues.add("InputWorkspace", "Input workspace has to be in the registry.");
            }
            issues
        }

        fn execute(&self, run: &mut WorkflowRun) -> Result<Identifier, WorkflowError> {
            run.protect([&self.input]);
            run.progress("first")?;
            let first = run.step(&Scale::new("first", 2.0), self.input.clone())?;
            run.set_output("FirstOutput", &Identifier::new("first_copy"), &first)?;
            run.cleanup([&self.input]);
            run.progress("second")?;
            let second = run.step(&Scale::new("second", 2.0), first.clone())?;
            run.cleanup([&first]);
            run.report().notice("doubled twice");
            Ok(second)
        }
    }

    fn setup() -> (InMemoryRegistry, SimulatedEngine) {
        let mut registry = InMemoryRegistry::new();
        registry.store(Identifier::new("in"), MatrixWorkspace::single_valued(1.5).into());
        (registry, SimulatedEngine::new())
    }

    fn doubler(cleanup: CleanupMode) -> Doubler {
        Doubler {
            input: Identifier::new("in"),
            output: Identifier::new("out"),
            cleanup,
        }
    }

    #[test]
    fn test_run_commits_outputs() {
        let (mut registry, mut engine) = setup();
        let mut sink = RecordingSink::default();
        let summary = run_workflow(
            &doubler(CleanupMode::On),
            &mut registry,
            &mut engine,
            &mut sink,
            None,
        )
        .unwrap();
        assert_eq!(
            registry.names(),
            vec![
                Identifier::new("first_copy"),
                Identifier::new("in"),
                Identifier::new("out")
            ]
        );
        assert_eq!(registry.matrix(&Identifier::new("out")).unwrap().value(), Some(6.0));
        assert_eq!(
            registry.matrix(&Identifier::new("first_copy")).unwrap().value(),
            Some(3.0)
        );
        assert_eq!(
            summary.optional_outputs.get("FirstOutput"),
            Some(&Identifier::new("first_copy"))
        );
        assert_eq!(
            sink.entries,
            vec![(ReportLevel::Notice, String::from("doubled twice"))]
        );
    }

    #[test]
    fn test_progress_messages() {
        let (mut registry, mut engine) = setup();
        let (tx, rx) = std::sync::mpsc::channel();
        let channel = ProgressChannel { tx, run_index: 3 };
        run_workflow(
            &doubler(CleanupMode::On),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            Some(channel),
        )
        .unwrap();
        let statuses: Vec<StageStatus> = rx.try_iter().collect();
        let stages: Vec<&str> = statuses.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, vec!["first", "second", "Done"]);
        assert_eq!(statuses[1].progress, 0.5);
        assert!(statuses.iter().all(|s| s.run_index == 3 && s.output_name == "out"));
    }

    #[test]
    fn test_validation_creates_nothing() {
        let mut registry = InMemoryRegistry::new();
        let mut engine = SimulatedEngine::new();
        let result = run_workflow(
            &doubler(CleanupMode::On),
            &mut registry,
            &mut engine,
            &mut RecordingSink::default(),
            None,
        );
        match result {
            Err(WorkflowError::Validation(issues)) => {
                assert!(issues.get("InputWorkspace").is_some())
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert!(registry.is_empty());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_set_output_twice_keeps_latest() {
        let (mut registry, mut engine) = setup();
        let mut run = WorkflowRun::new(
            &mut registry,
            &mut engine,
            "out",
            &Identifier::new("out"),
            CleanupMode::On,
            SubalgorithmLogging::Off,
        );
        let target = Identifier::new("extra");
        run.set_output_workspace("Extra", &target, MatrixWorkspace::single_valued(1.0).into());
        run.set_output_workspace("Extra", &target, MatrixWorkspace::single_valued(2.0).into());
        let summary = run
            .finalize(&Identifier::new("in"), &mut RecordingSink::default())
            .unwrap();
        assert_eq!(summary.optional_outputs.len(), 1);
        assert_eq!(registry.matrix(&target).unwrap().value(), Some(2.0));
        // Unprotected terminal moves to the output name
        assert!(registry.exists(&Identifier::new("out")));
        assert!(!registry.exists(&Identifier::new("in")));
    }
}
