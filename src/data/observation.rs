use super::connectors::{CsvConnector, DATETIME_COLUMN};
use crate::error::{CalibrationError, Result};
use crate::types::{Period, TimeSeries};
use std::collections::BTreeMap;
use std::path::Path;

/// Source of measured series at the watershed outlet
pub trait ObservationStore {
    /// Series of the requested variables restricted to `period`.
    /// Variables without any coverage in the period are absent from the result.
    fn read(&self, variables: &[String], period: &Period) -> Result<BTreeMap<String, TimeSeries>>;

    /// Like `read`, but every requested variable must have observations in
    /// `period`. A tracked variable without them cannot be scored, so this is
    /// a configuration error.
    fn read_required(
        &self,
        variables: &[String],
        period: &Period,
    ) -> Result<BTreeMap<String, TimeSeries>> {
        let series = self.read(variables, period)?;
        let missing: Vec<&str> = variables
            .iter()
            .filter(|v| !series.contains_key(*v))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CalibrationError::Configuration(format!(
                "no observations of {} between {} and {}",
                missing.join(", "),
                period.start,
                period.end
            )));
        }
        Ok(series)
    }
}

/// Observations loaded once from a `datetime,<var>,...` CSV file
pub struct CsvObservationStore {
    series: BTreeMap<String, TimeSeries>,
}

impl CsvObservationStore {
    pub fn open<P: AsRef<Path>>(path: P, variables: &[String]) -> Result<Self> {
        let df = CsvConnector::load(&path)?;
        let series = CsvConnector::extract_series(&df, DATETIME_COLUMN, variables)?;
        log::info!(
            "Loaded observations of {:?} from {}",
            series.keys().collect::<Vec<_>>(),
            path.as_ref().display()
        );
        Ok(Self { series })
    }
}

impl ObservationStore for CsvObservationStore {
    fn read(&self, variables: &[String], period: &Period) -> Result<BTreeMap<String, TimeSeries>> {
        Ok(select(&self.series, variables, period))
    }
}

/// In-memory store, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryObservationStore {
    series: BTreeMap<String, TimeSeries>,
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, variable: impl Into<String>, series: TimeSeries) -> Self {
        self.series.insert(variable.into(), series);
        self
    }
}

impl ObservationStore for MemoryObservationStore {
    fn read(&self, variables: &[String], period: &Period) -> Result<BTreeMap<String, TimeSeries>> {
        Ok(select(&self.series, variables, period))
    }
}

fn select(
    all: &BTreeMap<String, TimeSeries>,
    variables: &[String],
    period: &Period,
) -> BTreeMap<String, TimeSeries> {
    variables
        .iter()
        .filter_map(|name| {
            let sub = all.get(name)?.within(period);
            if sub.is_empty() {
                None
            } else {
                Some((name.clone(), sub))
            }
        })
        .collect()
}
