use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    coerce::{coerce, ParameterSet},
    config::RunConfig,
    request::{assemble_batch_request, assemble_scenario_requests, SeedInputs},
    scenario::load_scenario_file,
    submit::SubmissionClient,
    telemetry::DriverTelemetry,
};

/// Outcome counts for one driver invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Submissions the service accepted.
    pub accepted: usize,
    /// Submissions that exhausted their retry budget.
    pub failed: usize,
    /// Scenarios skipped for lack of a seed-map entry.
    pub skipped: usize,
}

/// Drives submissions row by row over the primary input file.
///
/// Rows are processed strictly sequentially; a failed row never prevents
/// later rows from being attempted.
pub struct BatchDriver {
    config: RunConfig,
    client: SubmissionClient,
    seed_inputs: SeedInputs,
    telemetry: DriverTelemetry,
}

impl BatchDriver {
    /// Creates a driver whose seed policy is the configured parallel
    /// replication count.
    #[must_use]
    pub fn new(config: RunConfig, client: SubmissionClient, telemetry: DriverTelemetry) -> Self {
        let seed_inputs = SeedInputs::runs(config.parallel_reps);
        Self {
            config,
            client,
            seed_inputs,
            telemetry,
        }
    }

    /// Overrides the seed policy inputs.
    #[must_use]
    pub fn with_seed_inputs(mut self, seed_inputs: SeedInputs) -> Self {
        self.seed_inputs = seed_inputs;
        self
    }

    /// Batch mode: every input row (repeated per sequential replication)
    /// becomes one flat document submitted with retry. No polling.
    pub async fn run_batch(&self, input: &Path) -> Result<BatchSummary> {
        let rows = read_input_rows(input)?;
        let endpoint = self.config.batch_url();
        let mut summary = BatchSummary::default();
        for row in &rows {
            for _ in 0..self.config.sequential_reps {
                let request = assemble_batch_request(&self.config, row);
                let document = serde_json::to_value(&request)?;
                match self.client.submit(&endpoint, &document).await {
                    Ok(_) => {
                        summary.accepted += 1;
                        let _ = self
                            .telemetry
                            .event("run.submitted", json!({ "mode": "batch" }));
                    }
                    Err(err) => {
                        summary.failed += 1;
                        let _ = self.telemetry.log(
                            LogLevel::Warn,
                            "driver.batch.row_failed",
                            json!({ "error": format!("{err:#}") }),
                        );
                        let _ = self
                            .telemetry
                            .event("run.failed", json!({ "mode": "batch" }));
                    }
                }
            }
        }
        self.log_summary("batch", summary);
        Ok(summary)
    }

    /// Scenario mode: every input row's values become the baseline for the
    /// scenario timelines, and every assembled document is submitted and
    /// polled to completion before the driver moves on.
    pub async fn run_scenarios(&self, input: &Path, scenario_input: &Path) -> Result<BatchSummary> {
        let rows = read_input_rows(input)?;
        let timelines = load_scenario_file(scenario_input, &self.telemetry)?;
        let source = scenario_input.to_string_lossy();
        let endpoint = self.config.scenario_url();
        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let mut summary = BatchSummary::default();
        let mut batch_label: u64 = 1;
        for row in &rows {
            for _ in 0..self.config.sequential_reps {
                let assembled = assemble_scenario_requests(
                    &self.config,
                    row,
                    &timelines,
                    &source,
                    batch_label,
                    &self.seed_inputs,
                );
                for scenario_id in &assembled.skipped {
                    summary.skipped += 1;
                    let _ = self.telemetry.log(
                        LogLevel::Warn,
                        "driver.scenario.no_seed_entry",
                        json!({ "scenario": scenario_id }),
                    );
                }
                for request in &assembled.requests {
                    let name = request.scenarios[0].name.clone();
                    let document = serde_json::to_value(request)?;
                    match self.client.submit(&endpoint, &document).await {
                        Ok(Some(handle)) => {
                            summary.accepted += 1;
                            let _ = self
                                .telemetry
                                .event("run.submitted", json!({ "scenario": name, "run_id": handle.id() }));
                            let done = self.client.await_completion(&endpoint, &handle, poll).await;
                            let _ = self
                                .telemetry
                                .event("run.completed", json!({ "scenario": name, "run_id": done.id() }));
                        }
                        Ok(None) => {
                            summary.accepted += 1;
                            let _ = self.telemetry.log(
                                LogLevel::Warn,
                                "driver.scenario.no_run_id",
                                json!({ "scenario": name }),
                            );
                        }
                        Err(err) => {
                            summary.failed += 1;
                            let _ = self.telemetry.log(
                                LogLevel::Warn,
                                "driver.scenario.failed",
                                json!({ "scenario": name, "error": format!("{err:#}") }),
                            );
                            let _ = self
                                .telemetry
                                .event("run.failed", json!({ "scenario": name }));
                        }
                    }
                }
                batch_label += 1;
            }
        }
        self.log_summary("scenario", summary);
        Ok(summary)
    }

    fn log_summary(&self, mode: &str, summary: BatchSummary) {
        let _ = self.telemetry.log(
            LogLevel::Info,
            "driver.run.finished",
            json!({
                "mode": mode,
                "accepted": summary.accepted,
                "failed": summary.failed,
                "skipped": summary.skipped,
            }),
        );
    }
}

/// Reads the primary input file: a header of parameter names followed by
/// one configuration row each.
///
/// Unlike scenario files, blank cells are not significant here; every cell
/// is coerced, empty ones included.
pub fn read_input_rows(path: &Path) -> Result<Vec<ParameterSet>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading input file {}", path.display()))?;
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header = header.strip_prefix('\u{feff}').unwrap_or(header);
    let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let mut row = ParameterSet::new();
        for (at, name) in columns.iter().enumerate() {
            row.insert(name.clone(), coerce(cells.get(at).copied().unwrap_or("")));
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coerce::ParamValue,
        submit::Transport,
    };
    use anyhow::bail;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Records every posted document; optionally fails a given endpoint.
    struct RecordingTransport {
        documents: Mutex<Vec<(String, Value)>>,
        fail_posts: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                documents: Mutex::new(Vec::new()),
                fail_posts: false,
            }
        }

        fn documents(&self) -> Vec<(String, Value)> {
            self.documents.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
            self.documents.lock().push((url.to_string(), body.clone()));
            if self.fail_posts {
                bail!("simulated outage");
            }
            Ok(serde_json::json!({ "id": "run-1" }))
        }

        async fn get_json(&self, _url: &str) -> Result<Value> {
            Ok(serde_json::json!({ "progress": 1.0 }))
        }
    }

    fn driver(config: RunConfig, transport: Arc<RecordingTransport>) -> BatchDriver {
        let client = SubmissionClient::new(transport, config.retry_attempts, DriverTelemetry::disabled());
        BatchDriver::new(config, client, DriverTelemetry::disabled())
    }

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn input_rows_coerce_every_cell() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "input.csv", "nAgents,rate,label\n100,0.5,\n");
        let rows = read_input_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["nAgents"], ParamValue::Int(100));
        assert_eq!(rows[0]["rate"], ParamValue::Float(0.5));
        assert_eq!(rows[0]["label"], ParamValue::Text(String::new()));
    }

    #[tokio::test]
    async fn one_row_batch_produces_one_document() {
        let dir = tempdir().unwrap();
        let input = write(dir.path(), "input.csv", "nAgents,baseInfectivity\n500,0.02\n");
        let transport = Arc::new(RecordingTransport::new());
        let config = RunConfig {
            steps: 10,
            ..RunConfig::default()
        };
        let summary = driver(config, transport.clone()).run_batch(&input).await.unwrap();
        assert_eq!(summary, BatchSummary { accepted: 1, failed: 0, skipped: 0 });
        let documents = transport.documents();
        assert_eq!(documents.len(), 1);
        let (url, body) = &documents[0];
        assert_eq!(url, "http://localhost:8080/api/simulations/batch");
        assert_eq!(body["ticks"], serde_json::json!(10));
        assert_eq!(body["name"], serde_json::json!("TAU"));
        assert_eq!(body["input"]["system"]["nAgents"], serde_json::json!(500));
        assert_eq!(body["input"]["system"]["lastStep"], serde_json::json!(10));
    }

    #[tokio::test]
    async fn sequential_reps_resubmit_each_row() {
        let dir = tempdir().unwrap();
        let input = write(dir.path(), "input.csv", "x\n1\n2\n");
        let transport = Arc::new(RecordingTransport::new());
        let config = RunConfig {
            steps: 5,
            sequential_reps: 3,
            ..RunConfig::default()
        };
        let summary = driver(config, transport.clone()).run_batch(&input).await.unwrap();
        assert_eq!(summary.accepted, 6);
        assert_eq!(transport.documents().len(), 6);
    }

    #[tokio::test]
    async fn a_failed_row_does_not_abort_the_rest() {
        let dir = tempdir().unwrap();
        let input = write(dir.path(), "input.csv", "x\n1\n2\n");
        let transport = Arc::new(RecordingTransport {
            documents: Mutex::new(Vec::new()),
            fail_posts: true,
        });
        let config = RunConfig {
            steps: 5,
            retry_attempts: 1,
            ..RunConfig::default()
        };
        let summary = driver(config, transport.clone()).run_batch(&input).await.unwrap();
        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.failed, 2);
        // Budget 1 means two attempts per row.
        assert_eq!(transport.documents().len(), 4);
    }

    #[tokio::test]
    async fn scenario_mode_submits_polls_and_labels_batches() {
        let dir = tempdir().unwrap();
        let input = write(dir.path(), "input.csv", "a\n1\n");
        let scenarios = write(
            dir.path(),
            "campus.csv",
            "scenario,step,x\n1,2,9\n2,1,4\n",
        );
        let transport = Arc::new(RecordingTransport::new());
        let config = RunConfig {
            steps: 3,
            sequential_reps: 2,
            ..RunConfig::default()
        };
        let summary = driver(config, transport.clone())
            .run_scenarios(&input, &scenarios)
            .await
            .unwrap();
        assert_eq!(summary.accepted, 4);
        let documents = transport.documents();
        // Two scenarios per repetition, two repetitions.
        assert_eq!(documents.len(), 4);
        let (url, body) = &documents[0];
        assert_eq!(url, "http://localhost:8080/api/simulations/scenario");
        assert_eq!(
            body["scenarios"][0]["name"],
            serde_json::json!("TAU_batch_1_scenario_1_campus")
        );
        assert_eq!(
            documents[3].1["scenarios"][0]["name"],
            serde_json::json!("TAU_batch_2_scenario_2_campus")
        );
        // Baseline flowed into step 0; terminal step exists.
        assert_eq!(body["scenarios"][0]["scenarioData"]["0"]["system"]["a"], serde_json::json!(1));
        assert_eq!(body["scenarios"][0]["scenarioData"]["3"], serde_json::json!({}));
    }
}
