use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::aggregate::SeriesAggregator;

/// Batch and scenario labels recovered from an artifact's file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLabel {
    /// Batch label, if the name carries a `batch` marker.
    pub batch: Option<String>,
    /// Scenario label, if the name carries a `scenario` marker.
    pub scenario: Option<String>,
}

/// Scans `_`-separated path segments for `batch`/`scenario` markers; the
/// segment following a marker is its label.
#[must_use]
pub fn parse_run_label(path_text: &str) -> RunLabel {
    let parts: Vec<&str> = path_text.split('_').collect();
    let mut label = RunLabel::default();
    for window in parts.windows(2) {
        match window[0] {
            "batch" => label.batch = Some(window[1].to_string()),
            "scenario" => label.scenario = Some(window[1].to_string()),
            _ => {}
        }
    }
    label
}

/// Recovers the run id from an artifact path.
///
/// The engine lays runs out as `<run-id>/runs/<output-name>/<file>.parquet`,
/// so the run id is the directory three levels above the file.
#[must_use]
pub fn run_id_from_path(path: &Path) -> Option<String> {
    path.ancestors()
        .nth(3)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
}

/// Recursively collects every `*.parquet` file under `root`, sorted for
/// deterministic processing order.
pub fn discover_parquet(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_parquet(root, &mut found)
        .with_context(|| format!("scanning {}", root.display()))?;
    found.sort();
    Ok(found)
}

fn collect_parquet(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_parquet(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == "parquet") {
            found.push(path);
        }
    }
    Ok(())
}

/// Reads one artifact into a named frame.
///
/// Artifacts are a single struct-typed column whose name is the table
/// name; rows unnest into a frame with the engine's `tick` column. Empty
/// files and empty tables yield `None`.
pub fn parquet_to_frame(path: &Path) -> Result<Option<(String, DataFrame)>> {
    if fs::metadata(path)?.len() == 0 {
        return Ok(None);
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let frame = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("reading parquet {}", path.display()))?;
    if frame.height() == 0 || frame.width() == 0 {
        return Ok(None);
    }
    let name = frame.get_columns()[0].name().to_string();
    let frame = if matches!(frame.column(&name)?.dtype(), DataType::Struct(_)) {
        frame.unnest([name.as_str()])?
    } else {
        frame
    };
    Ok(Some((name, frame)))
}

/// Writes one frame as `<output>/[run-id/]<name>.csv`.
pub fn frame_to_csv(
    name: &str,
    frame: &mut DataFrame,
    output_dir: &Path,
    run_id: Option<&str>,
) -> Result<PathBuf> {
    let mut dir = output_dir.to_path_buf();
    if let Some(id) = run_id {
        dir.push(id);
    }
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{name}.csv"));
    let mut file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    CsvWriter::new(&mut file)
        .finish(frame)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Converts every artifact under `input` into per-run CSVs under `output`,
/// feeding time-series tables through the aggregator. Returns the number
/// of tables written.
pub fn convert_directory(
    input: &Path,
    output: &Path,
    aggregator: &mut SeriesAggregator,
) -> Result<usize> {
    let mut written = 0;
    for path in discover_parquet(input)? {
        let Some((table, frame)) = parquet_to_frame(&path)? else {
            continue;
        };
        let label = parse_run_label(&path.to_string_lossy());
        let run_id = run_id_from_path(&path);
        aggregator.record(&table, &frame, label.scenario.as_deref())?;
        let full_name = match &label.scenario {
            Some(scenario) => format!("{table}_s_{scenario}"),
            None => table,
        };
        let mut frame = frame;
        frame_to_csv(&full_name, &mut frame, output, run_id.as_deref())?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::lazy::dsl::{as_struct, col};
    use tempfile::tempdir;

    fn sample_frame() -> DataFrame {
        df!(
            "tick" => &[0i64, 1, 2],
            "numInfected" => &[5i64, 8, 13],
            "runID" => &["r1", "r1", "r1"],
        )
        .unwrap()
    }

    fn pack_struct(frame: DataFrame, name: &str) -> DataFrame {
        frame
            .lazy()
            .select([as_struct(vec![col("tick"), col("numInfected"), col("runID")]).alias(name)])
            .collect()
            .unwrap()
    }

    #[test]
    fn labels_come_from_marker_segments() {
        let label = parse_run_label("out/TAU_batch_3_scenario_2_campus/part.parquet");
        assert_eq!(label.batch.as_deref(), Some("3"));
        assert_eq!(label.scenario.as_deref(), Some("2"));
        assert_eq!(parse_run_label("plain.parquet"), RunLabel::default());
    }

    #[test]
    fn run_id_is_three_levels_up() {
        let path = Path::new("data/run-42/runs/TimeSeriesOutputs/part-0.parquet");
        assert_eq!(run_id_from_path(path).as_deref(), Some("run-42"));
    }

    #[test]
    fn struct_column_round_trips_through_parquet() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("run-7/runs/output_scenario_1");
        fs::create_dir_all(&nested).unwrap();
        let path = nested.join("part-0.parquet");
        let mut packed = pack_struct(sample_frame(), "TimeSeriesOutputs");
        let file = File::create(&path).unwrap();
        ParquetWriter::new(file).finish(&mut packed).unwrap();

        let (name, frame) = parquet_to_frame(&path).unwrap().unwrap();
        assert_eq!(name, "TimeSeriesOutputs");
        assert_eq!(frame.height(), 3);
        assert!(frame.column("tick").is_ok());
        assert!(frame.column("numInfected").is_ok());
    }

    #[test]
    fn empty_files_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        fs::write(&path, b"").unwrap();
        assert!(parquet_to_frame(&path).unwrap().is_none());
    }

    #[test]
    fn conversion_writes_per_run_csvs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("input/run-7/runs/TAU_scenario_1_campus");
        fs::create_dir_all(&nested).unwrap();
        let mut packed = pack_struct(sample_frame(), "TimeSeriesOutputs");
        let file = File::create(nested.join("part-0.parquet")).unwrap();
        ParquetWriter::new(file).finish(&mut packed).unwrap();

        let output = dir.path().join("csv");
        let mut aggregator = SeriesAggregator::new();
        let written =
            convert_directory(&dir.path().join("input"), &output, &mut aggregator).unwrap();
        assert_eq!(written, 1);
        assert!(output.join("run-7/TimeSeriesOutputs_s_1.csv").exists());
    }
}
