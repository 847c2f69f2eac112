#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! TAU driver – shapes simulation request documents and submits them to the
//! remote batch/scenario REST API.

/// Typed scalar coercion for CSV tokens.
#[path = "../coerce.rs"]
pub mod coerce;

/// Run configuration and endpoint derivation.
#[path = "../config.rs"]
pub mod config;

/// Recognized parameter catalog and output-file seeding.
#[path = "../catalog.rs"]
pub mod catalog;

/// Telemetry facade over logging and run events.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Scenario input file parsing.
#[path = "../scenario.rs"]
pub mod scenario;

/// Wire documents and the request assembler.
#[path = "../request.rs"]
pub mod request;

/// Submission client with bounded retry and completion polling.
#[path = "../submit.rs"]
pub mod submit;

/// Row-by-row batch driver.
#[path = "../batch.rs"]
pub mod batch;

pub use batch::{read_input_rows, BatchDriver, BatchSummary};
pub use coerce::{coerce, ParamValue, ParameterSet};
pub use config::RunConfig;
pub use request::{
    assemble_batch_request, assemble_scenario_requests, AssembledScenarios, BatchRequest,
    ScenarioRequest, ScenarioSpec, SeedInputs, StepInput,
};
pub use scenario::{
    load_scenario_file, parse_scenario_csv, ScenarioTimeline, ScenarioTimelines, StepIndex,
};
pub use submit::{HttpTransport, RunHandle, SubmissionClient, SubmitError, Transport};
pub use telemetry::{DriverTelemetry, DriverTelemetryBuilder};
