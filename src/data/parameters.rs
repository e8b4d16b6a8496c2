use crate::error::{CalibrationError, Result};
use crate::types::{ParameterDef, Provenance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One sampled parameter vector as persisted for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub generation: usize,
    pub index: usize,
    pub values: BTreeMap<String, f64>,
}

/// Append-only record of every sampled parameter vector, keyed by provenance.
/// Never read back by the optimizer.
pub trait ParameterStore {
    fn write(
        &mut self,
        generation: usize,
        definitions: &[ParameterDef],
        rows: &[(Provenance, Vec<f64>)],
    ) -> Result<()>;
}

fn to_records(
    definitions: &[ParameterDef],
    rows: &[(Provenance, Vec<f64>)],
) -> Result<Vec<ParameterRecord>> {
    rows.iter()
        .map(|(provenance, values)| {
            if values.len() != definitions.len() {
                return Err(CalibrationError::Persistence(format!(
                    "individual {} has {} values for {} parameters",
                    provenance,
                    values.len(),
                    definitions.len()
                )));
            }
            Ok(ParameterRecord {
                generation: provenance.generation,
                index: provenance.index,
                values: definitions
                    .iter()
                    .zip(values)
                    .map(|(def, v)| (def.name.clone(), *v))
                    .collect(),
            })
        })
        .collect()
}

/// JSON-lines file, one record per line
pub struct JsonlParameterStore {
    path: PathBuf,
}

impl JsonlParameterStore {
    /// Creates (or truncates) the file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        File::create(&path)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParameterStore for JsonlParameterStore {
    fn write(
        &mut self,
        generation: usize,
        definitions: &[ParameterDef],
        rows: &[(Provenance, Vec<f64>)],
    ) -> Result<()> {
        let records = to_records(definitions, rows)?;
        let file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        log::debug!("Persisted {} parameter vectors of generation {}", records.len(), generation);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryParameterStore {
    pub records: Vec<ParameterRecord>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterStore for MemoryParameterStore {
    fn write(
        &mut self,
        _generation: usize,
        definitions: &[ParameterDef],
        rows: &[(Provenance, Vec<f64>)],
    ) -> Result<()> {
        self.records.extend(to_records(definitions, rows)?);
        Ok(())
    }
}
