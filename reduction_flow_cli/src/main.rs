//! # reduction_flow_cli
//!
//! Part of the reduction_flow crate family.
//!
//! Runs a batch of reduction workflows from a YAML configuration, using the simulated engine.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! reduction_flow_cli -p config.yml new
//! ```
//!
//! then edit it and run the batch with
//!
//! ```bash
//! reduction_flow_cli -p config.yml
//! ```
//!
//! Progress of every run is shown as a bar. Everything the library logs, including the
//! workflow reports, goes to `reduction_flow.log` in the working directory.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libreduction_flow::config::BatchConfig;
use libreduction_flow::error::{ConfigError, ProcessorError};
use libreduction_flow::process::process;
use libreduction_flow::progress::{BarColor, StageStatus};
use libreduction_flow::identifier::Identifier;
use libreduction_flow::registry::InMemoryRegistry;
use libreduction_flow::report::SpdlogSink;
use libreduction_flow::simulation::SimulatedEngine;
use libreduction_flow::workflow::RunSummary;

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    let yaml_str = serde_yaml::to_string(&BatchConfig::template())?;
    std::fs::write(path, yaml_str)?;
    Ok(())
}

/// Send everything spdlog sees to a log file
fn init_file_log() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./reduction_flow.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(color: BarColor) -> ProgressStyle {
    let color = match color {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::GREEN => "green",
        BarColor::RED => "red",
    };
    ProgressStyle::with_template(&format!(
        "{{msg:40}} [{{bar:40.{color}/white}}] {{pos:>3}}%"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// What is left in the registry once a batch is done
struct Survivors {
    entries: Vec<(Identifier, usize)>,
    total_size: usize,
}

/// Run the whole batch against a fresh registry. Returns the run summaries and the workspaces
/// which survived, with their sizes.
fn run_batch(
    config: BatchConfig,
    tx: mpsc::Sender<StageStatus>,
) -> Result<(Vec<RunSummary>, Survivors), ProcessorError> {
    let mut registry = InMemoryRegistry::new();
    let mut engine = SimulatedEngine::new();
    let summaries = process(&config, &mut registry, &mut engine, &mut SpdlogSink, &tx)?;
    Ok((
        summaries,
        Survivors {
            entries: registry.entry_sizes(),
            total_size: registry.total_data_size(),
        },
    ))
}

fn log_summary(summary: &RunSummary) {
    log::info!("Produced {}", summary.output);
    for (property, id) in summary.optional_outputs.iter() {
        log::info!("  {property}: {id}");
    }
    for (property, text) in summary.text_outputs.iter() {
        log::info!("  {property}:\n{text}");
    }
    if !summary.report.is_empty() {
        log::info!("  {} report entries, see the log file", summary.report.len());
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("reduction_flow_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_log() {
        log::warn!("Could not open the log file, file logging disabled: {e}");
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("{e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match BatchConfig::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Preloaded workspaces: {}", config.preload.len());
    for (index, run) in config.runs.iter().enumerate() {
        log::info!("Run {index}: {} -> {}", run.kind(), run.output_workspace());
    }

    // Spawn the task!
    let (tx, rx) = mpsc::channel::<StageStatus>();
    let handle = std::thread::spawn(move || run_batch(config, tx));

    let mut bars: BTreeMap<usize, ProgressBar> = BTreeMap::new();
    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
        let finished = handle.is_finished();
        for status in rx.try_iter() {
            let pb = bars.entry(status.run_index).or_insert_with(|| {
                let pb = pb_manager.add(ProgressBar::new(100));
                pb.set_style(bar_style(status.color));
                pb
            });
            pb.set_message(format!("{}: {}", status.output_name, status.stage));
            pb.set_position((status.progress * 100.0) as u64);
        }

        if finished {
            match handle.join() {
                Ok(result) => match result {
                    Ok((summaries, survivors)) => {
                        for pb in bars.values() {
                            pb.finish();
                        }
                        log::info!("Successfully reduced {} runs!", summaries.len());
                        summaries.iter().for_each(log_summary);
                        log::info!("Surviving workspaces:");
                        for (name, size) in survivors.entries.iter() {
                            log::info!("  {name} ({})", human_bytes::human_bytes(*size as f64));
                        }
                        log::info!(
                            "Registry holds {} of data.",
                            human_bytes::human_bytes(survivors.total_size as f64)
                        );
                    }
                    Err(e) => {
                        for pb in bars.values() {
                            pb.abandon();
                        }
                        log::error!("Reduction failed with error: {e}");
                        log::error!("Check reduction_flow.log for details.");
                    }
                },
                Err(_) => log::error!("Failed to join reduction task!"),
            }
            break;
        }
    }

    log::info!("Done.");
}
