use std::sync::mpsc::Sender;

use super::config::{BatchConfig, Preload, RunConfig};
use super::error::ProcessorError;
use super::operation::{Engine, OperationCall};
use super::progress::StageStatus;
use super::registry::Registry;
use super::report::LogSink;
use super::workflow::{
    run_workflow, CollectData, Diagnostics, Preprocess, ProgressChannel, RunSummary,
};

/// Load a caller owned workspace. No workflow tracks these, so they are never cleaned up.
fn preload(
    entry: &Preload,
    registry: &mut dyn Registry,
    engine: &mut dyn Engine,
) -> Result<(), ProcessorError> {
    let call = OperationCall::new("Load")
        .with_param("Filename", entry.file.to_string_lossy().to_string())
        .with_output("OutputWorkspace", &entry.name);
    engine.execute(registry, &call)?;
    spdlog::info!("Preloaded {} from {}", entry.name, entry.file.display());
    Ok(())
}

/// Run a single configured workflow
pub fn process_run(
    run: &RunConfig,
    run_index: usize,
    registry: &mut dyn Registry,
    engine: &mut dyn Engine,
    sink: &mut dyn LogSink,
    tx: &Sender<StageStatus>,
) -> Result<RunSummary, ProcessorError> {
    let progress = Some(ProgressChannel {
        tx: tx.clone(),
        run_index,
    });
    let summary = match run {
        RunConfig::CollectData(config) => run_workflow(
            &CollectData::new(config),
            registry,
            engine,
            sink,
            progress,
        )?,
        RunConfig::Diagnostics(config) => run_workflow(
            &Diagnostics::new(config),
            registry,
            engine,
            sink,
            progress,
        )?,
        RunConfig::Preprocess(config) => run_workflow(
            &Preprocess::new(config),
            registry,
            engine,
            sink,
            progress,
        )?,
    };
    Ok(summary)
}

/// The main loop of a batch.
///
/// Loads the preloaded workspaces, then runs every configured workflow in order against the
/// same registry. Runs whose input files are missing are skipped. The first failing run aborts
/// the batch; whatever earlier runs produced stays in the registry.
pub fn process(
    config: &BatchConfig,
    registry: &mut dyn Registry,
    engine: &mut dyn Engine,
    sink: &mut dyn LogSink,
    tx: &Sender<StageStatus>,
) -> Result<Vec<RunSummary>, ProcessorError> {
    for entry in config.preload.iter() {
        preload(entry, registry, engine)?;
    }
    let mut summaries = vec![];
    for (index, run) in config.runs.iter().enumerate() {
        let output = run.output_workspace();
        if run.does_run_exist() {
            spdlog::info!("Processing {} run {}...", run.kind(), output);
            summaries.push(process_run(run, index, registry, engine, sink, tx)?);
            let size = registry
                .retrieve(output)
                .map(|ws| ws.estimated_bytes())
                .unwrap_or(0);
            spdlog::info!(
                "Finished processing run {} with output size {}.",
                output,
                human_bytes::human_bytes(size as f64)
            );
        } else {
            spdlog::info!("Run {} does not exist, skipping...", output);
        }
    }
    Ok(summaries)
}
