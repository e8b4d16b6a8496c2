// src/engines/metrics/statistics.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column-wise summary of the fitness matrix of a population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessStatistics {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub avg: Vec<f64>,
    pub std: Vec<f64>,
}

impl FitnessStatistics {
    /// Population (not sample) standard deviation is used.
    pub fn compile(fitness: &[Vec<f64>]) -> Option<Self> {
        let first = fitness.first()?;
        let nobj = first.len();
        let n = fitness.len() as f64;

        let mut min = vec![f64::INFINITY; nobj];
        let mut max = vec![f64::NEG_INFINITY; nobj];
        let mut sum = vec![0.0; nobj];

        for row in fitness {
            for (i, &v) in row.iter().enumerate().take(nobj) {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
                sum[i] += v;
            }
        }

        let avg: Vec<f64> = sum.iter().map(|s| s / n).collect();
        let std = (0..nobj)
            .map(|i| {
                let variance = fitness
                    .iter()
                    .map(|row| (row[i] - avg[i]).powi(2))
                    .sum::<f64>()
                    / n;
                variance.sqrt()
            })
            .collect();

        Some(Self { min, max, avg, std })
    }
}

/// One line of the logbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogbookRecord {
    pub gen: usize,
    pub evals: usize,
    pub stats: FitnessStatistics,
}

/// Chronological per-generation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Logbook {
    records: Vec<LogbookRecord>,
}

impl Logbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, gen: usize, evals: usize, stats: FitnessStatistics) {
        self.records.push(LogbookRecord { gen, evals, stats });
    }

    pub fn records(&self) -> &[LogbookRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&LogbookRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Single-line rendering of one record, used for streaming to the log
    pub fn stream(record: &LogbookRecord) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.gen,
            record.evals,
            format_row(&record.stats.min),
            format_row(&record.stats.max),
            format_row(&record.stats.avg),
            format_row(&record.stats.std),
        )
    }
}

fn format_row(values: &[f64]) -> String {
    let cells: Vec<String> = values.iter().map(|v| format!("{:.4}", v)).collect();
    format!("[{}]", cells.join(", "))
}

impl fmt::Display for Logbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "gen\tevals\tmin\tmax\tavg\tstd")?;
        for record in &self.records {
            writeln!(f, "{}", Logbook::stream(record))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_columns() {
        let stats = FitnessStatistics::compile(&[vec![1.0, 10.0], vec![3.0, 10.0]]).unwrap();
        assert_eq!(stats.min, vec![1.0, 10.0]);
        assert_eq!(stats.max, vec![3.0, 10.0]);
        assert_eq!(stats.avg, vec![2.0, 10.0]);
        assert_eq!(stats.std, vec![1.0, 0.0]);
    }

    #[test]
    fn test_compile_empty() {
        assert!(FitnessStatistics::compile(&[]).is_none());
    }

    #[test]
    fn test_logbook_display_has_header() {
        let mut logbook = Logbook::new();
        logbook.record(0, 4, FitnessStatistics::compile(&[vec![0.5]]).unwrap());
        let text = logbook.to_string();
        assert!(text.starts_with("gen\tevals"));
        assert!(text.contains("0\t4\t[0.5000]"));
    }
}
