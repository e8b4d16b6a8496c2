use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value used by observation and simulator files for missing records
pub const NODATA_VALUE: f64 = -9999.0;

/// Identity of an individual: the generation that created it and its index
/// within that generation's evaluation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub generation: usize,
    pub index: usize,
}

impl Provenance {
    pub fn new(generation: usize, index: usize) -> Self {
        Self { generation, index }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.index)
    }
}

/// A calibrated model parameter and its admissible range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub low: f64,
    pub up: f64,
    #[serde(default)]
    pub default: Option<f64>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, low: f64, up: f64) -> Self {
        Self {
            name: name.into(),
            low,
            up,
            default: None,
        }
    }
}

/// Closed time interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Period {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: &NaiveDateTime) -> bool {
        *time >= self.start && *time <= self.end
    }
}

/// Time-indexed series, kept sorted by timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    points: Vec<(NaiveDateTime, f64)>,
}

impl TimeSeries {
    pub fn from_points(mut points: Vec<(NaiveDateTime, f64)>) -> Self {
        points.sort_by(|a, b| a.0.cmp(&b.0));
        points.dedup_by(|later, earlier| later.0 == earlier.0);
        Self { points }
    }

    pub fn get(&self, time: &NaiveDateTime) -> Option<f64> {
        self.points
            .binary_search_by(|(t, _)| t.cmp(time))
            .ok()
            .map(|pos| self.points[pos].1)
    }

    /// Sub-series restricted to `period`
    pub fn within(&self, period: &Period) -> TimeSeries {
        TimeSeries {
            points: self
                .points
                .iter()
                .filter(|(t, _)| period.contains(t))
                .copied()
                .collect(),
        }
    }

    pub fn points(&self) -> &[(NaiveDateTime, f64)] {
        &self.points
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Timing breakdown reported by one model run, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTiming {
    pub io_time: f64,
    pub comp_time: f64,
    pub simu_time: f64,
    pub runtime: f64,
}

impl ExecutionTiming {
    pub fn as_array(&self) -> [f64; 4] {
        [self.io_time, self.comp_time, self.simu_time, self.runtime]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 1, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = TimeSeries::from_points(vec![(day(3), 3.0), (day(1), 1.0), (day(3), 4.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].0, day(1));
        assert_eq!(series.get(&day(3)), Some(3.0));
    }

    #[test]
    fn test_series_within_period() {
        let series = TimeSeries::from_points((1..=10).map(|d| (day(d), d as f64)).collect());
        let sub = series.within(&Period::new(day(3), day(5)));
        assert_eq!(sub.values().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_provenance_display() {
        assert_eq!(Provenance::new(3, 12).to_string(), "3-12");
    }
}
