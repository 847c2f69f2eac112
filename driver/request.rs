use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    coerce::{ParamValue, ParameterSet},
    config::RunConfig,
    scenario::ScenarioTimelines,
};

/// Seed stamped on every parallel replication of a batch submission.
pub const FIXED_BATCH_SEED: i64 = 1234;

/// Parameter key carrying the final simulation step.
pub const LAST_STEP_KEY: &str = "lastStep";

/// Parameter key carrying the model's CSV output file name.
pub const OUTPUT_FILENAME_KEY: &str = "csvOutputFilename";

/// System-parameter wrapper used by both request kinds.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInput {
    /// The full parameter set for the run.
    pub system: ParameterSet,
}

/// Wire payload for one flat batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequest {
    /// Initial inputs for the run.
    pub input: SystemInput,
    /// Number of simulation ticks.
    pub ticks: u64,
    /// One seed per parallel replication.
    pub seeds: Vec<i64>,
    /// Parallel replication count.
    pub runs: usize,
    /// Model name.
    pub name: String,
}

/// Location the remote engine writes columnar output to.
#[derive(Debug, Clone, Serialize)]
pub struct OutputTarget {
    /// Output directory URI.
    pub uri: String,
}

/// Wire payload for one scenario submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    /// Model name.
    pub model_name: String,
    /// Columnar output destination.
    pub output: OutputTarget,
    /// Scenario specifications; one per document.
    pub scenarios: Vec<ScenarioSpec>,
}

/// One scenario inside a [`ScenarioRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    /// Deterministic scenario name for traceability across re-runs.
    pub name: String,
    /// Explicit seeds; present exactly when `runs` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeds: Option<Vec<i64>>,
    /// Replication count; present exactly when `seeds` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs: Option<usize>,
    /// Per-step inputs keyed by the decimal step index.
    pub scenario_data: IndexMap<String, StepInput>,
}

/// Inputs applied at one step; serializes as `{}` when empty, which is how
/// the terminal entry signals run completion to the remote engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepInput {
    /// Parameter overrides taking effect at this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<ParameterSet>,
}

/// Seed policy inputs, resolved per scenario in precedence order:
/// explicit seeds, then the per-scenario map, then a bare replication
/// count.
#[derive(Debug, Clone, Default)]
pub struct SeedInputs {
    /// Seeds applied to every scenario; replication count = list length.
    pub seeds: Option<Vec<i64>>,
    /// Per-scenario seeds; a scenario absent from the map is skipped.
    pub seed_map: Option<IndexMap<String, Vec<i64>>>,
    /// Replication count when no seeds are given (engine generates seeds).
    pub runs: usize,
}

impl SeedInputs {
    /// Policy that delegates seed generation to the remote engine.
    #[must_use]
    pub fn runs(runs: usize) -> Self {
        Self {
            runs,
            ..Self::default()
        }
    }

    fn resolve(&self, scenario_id: &str) -> Option<(Option<Vec<i64>>, Option<usize>)> {
        if let Some(seeds) = &self.seeds {
            return Some((Some(seeds.clone()), None));
        }
        if let Some(map) = &self.seed_map {
            return map.get(scenario_id).map(|seeds| (Some(seeds.clone()), None));
        }
        Some((None, Some(self.runs)))
    }
}

/// Scenario documents assembled from one baseline row, plus the scenario
/// ids that had to be skipped for lack of a seed-map entry.
#[derive(Debug, Clone)]
pub struct AssembledScenarios {
    /// One request document per distinct scenario id.
    pub requests: Vec<ScenarioRequest>,
    /// Scenario ids with no entry in the per-scenario seed map.
    pub skipped: Vec<String>,
}

/// Builds the flat batch document for one input row.
///
/// The row's parameters gain `lastStep` and `csvOutputFilename`; seeds are
/// the fixed batch seed repeated once per parallel replication, alongside
/// the replication count.
#[must_use]
pub fn assemble_batch_request(config: &RunConfig, row: &ParameterSet) -> BatchRequest {
    let mut system = row.clone();
    insert_run_keys(&mut system, config);
    BatchRequest {
        input: SystemInput { system },
        ticks: config.steps,
        seeds: vec![FIXED_BATCH_SEED; config.parallel_reps],
        runs: config.parallel_reps,
        name: config.model_name.clone(),
    }
}

/// Builds one scenario document per distinct scenario id in `timelines`.
///
/// Step 0 is the baseline (with `lastStep` and the output filename
/// inserted) merged with any parsed step-0 overrides; later steps carry
/// only what was explicitly specified for them; a terminal entry at the
/// configured last step is guaranteed. Performs no I/O and is
/// deterministic in its inputs.
#[must_use]
pub fn assemble_scenario_requests(
    config: &RunConfig,
    baseline: &ParameterSet,
    timelines: &ScenarioTimelines,
    scenario_source: &str,
    batch_label: u64,
    seed_inputs: &SeedInputs,
) -> AssembledScenarios {
    let source = source_stem(scenario_source);
    let mut requests = Vec::new();
    let mut skipped = Vec::new();
    for (scenario_id, timeline) in timelines {
        let Some((seeds, runs)) = seed_inputs.resolve(scenario_id) else {
            skipped.push(scenario_id.clone());
            continue;
        };

        let mut step_zero = baseline.clone();
        insert_run_keys(&mut step_zero, config);
        if let Some(overrides) = timeline.get(&0) {
            step_zero.extend(overrides.clone());
        }

        let mut scenario_data = IndexMap::new();
        scenario_data.insert(
            "0".to_string(),
            StepInput {
                system: Some(step_zero),
            },
        );
        for (step, overrides) in timeline {
            if *step == 0 {
                continue;
            }
            scenario_data.insert(
                step.to_string(),
                StepInput {
                    system: Some(overrides.clone()),
                },
            );
        }
        if !scenario_data.contains_key(&config.steps.to_string()) {
            scenario_data.insert(config.steps.to_string(), StepInput::default());
        }

        requests.push(ScenarioRequest {
            model_name: config.model_name.clone(),
            output: OutputTarget {
                uri: config.scenario_output_dir.clone(),
            },
            scenarios: vec![ScenarioSpec {
                name: format!(
                    "{}_batch_{}_scenario_{}_{}",
                    config.model_name, batch_label, scenario_id, source
                ),
                seeds,
                runs,
                scenario_data,
            }],
        });
    }
    AssembledScenarios { requests, skipped }
}

fn insert_run_keys(params: &mut ParameterSet, config: &RunConfig) {
    params.insert(
        LAST_STEP_KEY.to_string(),
        ParamValue::Int(i64::try_from(config.steps).unwrap_or(i64::MAX)),
    );
    params.insert(
        OUTPUT_FILENAME_KEY.to_string(),
        ParamValue::Text(config.output_file.clone()),
    );
}

/// File name of the scenario source up to its first `.`, used as the final
/// component of generated scenario names.
fn source_stem(source: &str) -> String {
    let file_name = source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source);
    file_name
        .split('.')
        .next()
        .unwrap_or(file_name)
        .to_string()
}
