use std::{fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    coerce::{coerce, ParameterSet},
    telemetry::DriverTelemetry,
};

/// Simulation tick at which a parameter override takes effect.
pub type StepIndex = u64;

/// All parameter changes scheduled during one scenario's run.
pub type ScenarioTimeline = IndexMap<StepIndex, ParameterSet>;

/// Parsed scenario input: scenario id to its timeline.
pub type ScenarioTimelines = IndexMap<String, ScenarioTimeline>;

/// Scenario id used when the input file has no `scenario` column.
pub const DEFAULT_SCENARIO_ID: &str = "default";

/// Reads and parses a scenario input file.
pub fn load_scenario_file(
    path: impl AsRef<Path>,
    telemetry: &DriverTelemetry,
) -> Result<ScenarioTimelines> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading scenario input {}", path.display()))?;
    Ok(parse_scenario_csv(&text, telemetry))
}

/// Parses scenario CSV text into per-scenario timelines.
///
/// The header names the columns; `scenario` and `step` are recognized in
/// any position and every other column is a parameter name. A missing
/// `scenario` column puts every row under [`DEFAULT_SCENARIO_ID`]; a
/// missing `step` column numbers rows sequentially from 0 in file order.
/// Both fallbacks are diagnostics, not errors. Empty cells are absent
/// overrides and never enter a `ParameterSet`; repeated (scenario, step)
/// rows merge per key into the existing set.
pub fn parse_scenario_csv(text: &str, telemetry: &DriverTelemetry) -> ScenarioTimelines {
    let mut timelines = ScenarioTimelines::new();
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return timelines;
    };
    // Tolerate a UTF-8 byte-order mark on the first line.
    let header = header.strip_prefix('\u{feff}').unwrap_or(header);
    let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
    let step_col = columns.iter().position(|c| c == "step");
    let scenario_col = columns.iter().position(|c| c == "scenario");
    if step_col.is_none() {
        let _ = telemetry.log(
            LogLevel::Warn,
            "driver.scenario.no_step_column",
            json!({ "fallback": "rows numbered sequentially from 0" }),
        );
    }
    if scenario_col.is_none() {
        let _ = telemetry.log(
            LogLevel::Warn,
            "driver.scenario.no_scenario_column",
            json!({ "fallback": DEFAULT_SCENARIO_ID }),
        );
    }

    // Advances only when the file has no explicit step column.
    let mut step_counter: StepIndex = 0;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let scenario_id = scenario_col
            .map_or(DEFAULT_SCENARIO_ID, |at| cells.get(at).copied().unwrap_or(""))
            .to_string();
        let step = match step_col {
            Some(at) => {
                let cell = cells.get(at).copied().unwrap_or("");
                match cell.parse::<StepIndex>() {
                    Ok(step) => step,
                    Err(_) => {
                        let _ = telemetry.log(
                            LogLevel::Warn,
                            "driver.scenario.bad_step_cell",
                            json!({ "cell": cell, "row": line }),
                        );
                        continue;
                    }
                }
            }
            None => {
                let assigned = step_counter;
                step_counter += 1;
                assigned
            }
        };

        let mut overrides = ParameterSet::new();
        for (at, name) in columns.iter().enumerate() {
            if Some(at) == scenario_col || Some(at) == step_col {
                continue;
            }
            let cell = cells.get(at).copied().unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            overrides.insert(name.clone(), coerce(cell));
        }

        timelines
            .entry(scenario_id)
            .or_default()
            .entry(step)
            .or_default()
            .extend(overrides);
    }
    timelines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::ParamValue;

    fn parse(text: &str) -> ScenarioTimelines {
        parse_scenario_csv(text, &DriverTelemetry::disabled())
    }

    #[test]
    fn empty_cells_never_enter_the_parameter_set() {
        let parsed = parse("scenario,step,x,y\n1,0,5,\n1,2,,9\n2,0,1,1\n");
        assert_eq!(parsed.len(), 2);
        let one = &parsed["1"];
        assert_eq!(one[&0], ParameterSet::from([("x".to_string(), ParamValue::Int(5))]));
        assert_eq!(one[&2], ParameterSet::from([("y".to_string(), ParamValue::Int(9))]));
        let two = &parsed["2"];
        assert_eq!(
            two[&0],
            ParameterSet::from([
                ("x".to_string(), ParamValue::Int(1)),
                ("y".to_string(), ParamValue::Int(1)),
            ])
        );
    }

    #[test]
    fn missing_step_column_numbers_rows_from_zero() {
        let parsed = parse("x\n10\n20\n30\n");
        let timeline = &parsed[DEFAULT_SCENARIO_ID];
        let steps: Vec<StepIndex> = timeline.keys().copied().collect();
        assert_eq!(steps, vec![0, 1, 2]);
        assert_eq!(timeline[&1]["x"], ParamValue::Int(20));
    }

    #[test]
    fn missing_scenario_column_uses_default_id() {
        let parsed = parse("step,x\n0,1\n3,2\n");
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key(DEFAULT_SCENARIO_ID));
    }

    #[test]
    fn header_bom_is_stripped() {
        let parsed = parse("\u{feff}scenario,step,x\nA,0,7\n");
        assert_eq!(parsed["A"][&0]["x"], ParamValue::Int(7));
    }

    #[test]
    fn repeated_rows_merge_instead_of_replacing() {
        let parsed = parse("scenario,step,x,y\n1,0,5,\n1,0,,6\n");
        assert_eq!(
            parsed["1"][&0],
            ParameterSet::from([
                ("x".to_string(), ParamValue::Int(5)),
                ("y".to_string(), ParamValue::Int(6)),
            ])
        );
    }

    #[test]
    fn column_order_does_not_matter() {
        let parsed = parse("x,step,scenario\n4,1,B\n");
        assert_eq!(parsed["B"][&1]["x"], ParamValue::Int(4));
    }

    #[test]
    fn zero_data_rows_yield_no_scenarios() {
        assert!(parse("scenario,step,x\n").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn unparseable_step_cell_skips_the_row() {
        let parsed = parse("step,x\nnope,1\n2,5\n");
        let timeline = &parsed[DEFAULT_SCENARIO_ID];
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[&2]["x"], ParamValue::Int(5));
    }
}
