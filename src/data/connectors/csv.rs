use crate::error::{CalibrationError, Result};
use crate::types::TimeSeries;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Accepted timestamp layouts, tried in order
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Default name of the timestamp column
pub const DATETIME_COLUMN: &str = "datetime";

pub struct CsvConnector;

impl CsvConnector {
    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .map_err(|e| {
                CalibrationError::Observation(format!(
                    "Failed to read CSV {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?;

        Ok(df)
    }

    /// Extract one series per requested column, keyed by column name.
    /// Columns absent from the frame are skipped, null cells are dropped.
    pub fn extract_series(
        df: &DataFrame,
        datetime_column: &str,
        variables: &[String],
    ) -> Result<BTreeMap<String, TimeSeries>> {
        let times = Self::parse_datetime_column(df, datetime_column)?;
        let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

        let mut result = BTreeMap::new();
        for variable in variables {
            if !columns.iter().any(|c| c == variable) {
                log::debug!("Column {} not present, skipping", variable);
                continue;
            }

            let column = df.column(variable.as_str())?.cast(&DataType::Float64)?;
            let values = column.f64()?;

            let mut points = Vec::with_capacity(times.len());
            for (i, time) in times.iter().enumerate() {
                if let (Some(time), Some(value)) = (time, values.get(i)) {
                    points.push((*time, value));
                }
            }
            result.insert(variable.clone(), TimeSeries::from_points(points));
        }

        Ok(result)
    }

    fn parse_datetime_column(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
        let column = df.column(name).map_err(|_| {
            CalibrationError::Observation(format!("CSV has no '{}' column", name))
        })?;
        let column = column.cast(&DataType::String)?;
        let strings = column.str()?;

        let mut times = Vec::with_capacity(df.height());
        let mut unparsable = 0usize;
        for i in 0..df.height() {
            let parsed = strings.get(i).and_then(parse_datetime);
            if parsed.is_none() {
                unparsable += 1;
            }
            times.push(parsed);
        }

        if unparsable > 0 {
            log::warn!("{} rows with unparsable '{}' values ignored", unparsable, name);
        }
        Ok(times)
    }
}

/// Parse a timestamp in any of the supported layouts
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_datetime_layouts() {
        assert!(parse_datetime("2014-01-02 12:00:00").is_some());
        assert!(parse_datetime("2014-01-02").is_some());
        assert!(parse_datetime("2014/01/02").is_some());
        assert!(parse_datetime("02.01.2014").is_none());
    }

    #[test]
    fn test_extract_series_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "datetime,Q,SED").unwrap();
        writeln!(file, "2014-01-01,1.5,10").unwrap();
        writeln!(file, "2014-01-02,2.5,").unwrap();
        writeln!(file, "2014-01-03,3.5,30").unwrap();
        file.flush().unwrap();

        let df = CsvConnector::load(file.path()).unwrap();
        let series = CsvConnector::extract_series(
            &df,
            DATETIME_COLUMN,
            &["Q".to_string(), "SED".to_string(), "CH_TN".to_string()],
        )
        .unwrap();

        assert_eq!(series["Q"].len(), 3);
        assert_eq!(series["SED"].len(), 2);
        assert!(!series.contains_key("CH_TN"));
    }
}
