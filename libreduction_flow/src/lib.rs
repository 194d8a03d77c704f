//! # reduction_flow
//!
//! reduction_flow runs multi-step neutron data reductions against a shared workspace
//! registry. Every reduction (a workflow) chains many numerical operations. Each operation
//! leaves an intermediate workspace behind in the registry. The library takes care of
//! naming those intermediates so they never collide with user data, deleting them once they
//! are no longer needed, never touching workspaces the caller owns, and collecting the
//! notices and warnings a workflow produces into a single report.
//!
//! Three workflows are provided:
//!
//! - `CollectData`: loading, flat background subtraction, monitor or time normalisation,
//! incident energy calibration and TOF axis correction of direct geometry TOF data
//! - `Diagnostics`: user, elastic peak and noisy background detector masking
//! - `Preprocess`: loading, slit and flux normalisation, background subtraction and
//! foreground summation of reflectometry data
//!
//! Custom workflows implement the [`workflow::Workflow`] trait and compose the steps in
//! [`steps`].
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./reduction_flow_cli` from the top
//! level repository. The binary is installed to your cargo install location (typically
//! something like `~/.cargo/bin/`). To use the CLI see the `reduction_flow_cli` README.
//!
//! ## Operations
//!
//! The numerical work itself is done by an [`operation::Engine`]. The library ships
//! [`simulation::SimulatedEngine`], an in-process engine that implements every operation the
//! workflows call with simple ndarray arithmetic. It loads YAML descriptions of synthetic
//! measurements in place of NeXus files (see [`simulation::SyntheticWorkspace`]).
//!
//! ## Configuration
//!
//! A batch is described by a YAML file: a list of workspaces to load before anything runs,
//! followed by the workflow runs in order. Every run names its workflow; any setting not
//! given takes its default.
//!
//! ```yml
//! preload:
//!   - name: vanadium
//!     file: /data/vanadium.yml
//! runs:
//!   - workflow: CollectData
//!     input_workspace: vanadium
//!     output_workspace: vanadium_collected
//!     output_epp_workspace: vanadium_epp
//!     normalisation: monitor
//!   - workflow: Diagnostics
//!     input_workspace: vanadium_collected
//!     output_workspace: vanadium_mask
//!     epp_workspace: vanadium_epp
//!     bkg_diagnostics: AUTO
//!     masked_detectors: [1, 2, 3]
//!   - workflow: Preprocess
//!     run: [/data/reflected_1.yml, /data/reflected_2.yml]
//!     output_workspace: reflected
//!     foreground_half_width: 2
//! ```
//!
//! Preloaded workspaces belong to the caller and are never deleted. A run whose input files
//! do not exist is skipped.
//!
//! ## Intermediate names
//!
//! Intermediates are named `<output>_<suffix>_`. With cleanup on, names get a leading `__`
//! as well, marking them as hidden. Setting `cleanup: OFF` on a run keeps every
//! intermediate in the registry for inspection.
//!
//! ## Output
//!
//! Besides the output workspaces a batch produces a log file. Notices and warnings of a
//! workflow are flushed to the log only when the workflow completes, so a failed run leaves
//! no partial report behind, only the error.
pub mod cleanup;
pub mod config;
pub mod error;
pub mod identifier;
pub mod names;
pub mod operation;
pub mod process;
pub mod progress;
pub mod registry;
pub mod report;
pub mod simulation;
pub mod steps;
pub mod workflow;
pub mod workspace;
