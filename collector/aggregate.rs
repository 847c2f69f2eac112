use std::path::{Path, PathBuf};

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use polars::prelude::*;

use crate::convert::frame_to_csv;

/// Table whose rows feed the summary series.
pub const TIME_SERIES_TABLE: &str = "TimeSeriesOutputs";

/// Summary metric fed by the derived test-positivity series.
pub const POSITIVITY_METRIC: &str = "positiveRate";

/// Source column to summary metric name, in output order.
const TRACKED_METRICS: [(&str, &str); 8] = [
    ("extinfections", "externalInfections"),
    ("numInfected", "numInfected"),
    ("numInfectious", "numInfectious"),
    ("numNewInfections", "numNewInfected"),
    ("totaltestsgiven", "totTestsGiven"),
    ("totaltestsreturned", "totTestsReturned"),
    ("positivetestsgiven", "posTestsGiven"),
    ("positivetestsreturned", "posTestsReturned"),
];

/// Collects per-metric time series across many artifacts.
///
/// Constructed once per conversion run and discarded with it; series are
/// keyed by run id plus scenario label, deduplicated with a numeric
/// suffix when the same run contributes multiple artifacts.
#[derive(Debug)]
pub struct SeriesAggregator {
    series: IndexMap<String, IndexMap<String, Vec<f64>>>,
    seen_labels: IndexSet<String>,
}

impl Default for SeriesAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesAggregator {
    /// Creates an empty aggregator with every metric registered.
    #[must_use]
    pub fn new() -> Self {
        let mut series = IndexMap::new();
        series.insert(POSITIVITY_METRIC.to_string(), IndexMap::new());
        for (_, metric) in TRACKED_METRICS {
            series.insert(metric.to_string(), IndexMap::new());
        }
        Self {
            series,
            seen_labels: IndexSet::new(),
        }
    }

    /// Records the tracked columns of one time-series table.
    ///
    /// Tables other than [`TIME_SERIES_TABLE`], and tables without a
    /// `runID` column, are ignored.
    pub fn record(&mut self, table: &str, frame: &DataFrame, scenario: Option<&str>) -> Result<()> {
        if table != TIME_SERIES_TABLE {
            return Ok(());
        }
        let Ok(run_column) = frame.column("runID") else {
            return Ok(());
        };
        let base = text_value(&run_column.as_materialized_series().get(0)?);
        let extension = scenario.map(|s| format!("_s_{s}")).unwrap_or_default();
        let label = self.dedup_label(&format!("{base}{extension}"));

        if let (Ok(given), Ok(positive)) = (
            column_f64(frame, "totaltestsgiven"),
            column_f64(frame, "positivetestsreturned"),
        ) {
            let positivity: Vec<f64> = given
                .iter()
                .zip(&positive)
                .map(|(&g, &p)| if g == 0.0 || !g.is_finite() { 0.0 } else { p / g })
                .collect();
            if let Some(labels) = self.series.get_mut(POSITIVITY_METRIC) {
                labels.insert(label.clone(), positivity);
            }
        }
        for (column, metric) in TRACKED_METRICS {
            if let Ok(values) = column_f64(frame, column) {
                if let Some(labels) = self.series.get_mut(metric) {
                    labels.insert(label.clone(), values);
                }
            }
        }
        Ok(())
    }

    /// True when no artifact has contributed a series yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen_labels.is_empty()
    }

    /// Writes one summary CSV per metric with recorded series, columns
    /// padded to equal length. Returns the written paths.
    pub fn write_summaries(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (metric, labels) in &self.series {
            if labels.is_empty() {
                continue;
            }
            let longest = labels.values().map(Vec::len).max().unwrap_or(0);
            let columns: Vec<Column> = labels
                .iter()
                .map(|(label, values)| {
                    let mut padded = values.clone();
                    padded.resize(longest, f64::NAN);
                    Column::new(label.as_str().into(), padded)
                })
                .collect();
            let mut frame = DataFrame::new(columns)?;
            written.push(frame_to_csv(metric, &mut frame, output_dir, None)?);
        }
        Ok(written)
    }

    fn dedup_label(&mut self, base: &str) -> String {
        let mut suffix = 1;
        let mut label = format!("{base}_{suffix}");
        while self.seen_labels.contains(&label) {
            suffix += 1;
            label = format!("{base}_{suffix}");
        }
        self.seen_labels.insert(label.clone());
        label
    }
}

fn text_value(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::String(text) => (*text).to_string(),
        AnyValue::StringOwned(text) => text.to_string(),
        other => other.to_string(),
    }
}

fn column_f64(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = frame
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}
