//! Model persistence.
//!
//! A model is stored as a plain JSON object with the fields `M`, `labels`,
//! `Km`, `bin_peaks`, `bin_obs`, `K`, `N`, `O`, `P0`, `A` and `B`. A model file
//! holds a list of such objects, one per cross-validation fold. Loading checks
//! every dimension against the metadata, so a decoder never sees an
//! inconsistent model.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sshmm_sparse::{CompressedMatrix, CompressedVector, MatrixRecord, VectorRecord};
use tracing::info;

use super::{layout, Parameters, SuperStateHmm};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::logging::event_names;
use crate::quantization::ApplianceQuantization;

/// Owned plain-data form of a [`SuperStateHmm`].
#[derive(Debug, Clone, Deserialize)]
pub struct ModelRecord {
    #[serde(rename = "M")]
    pub m: usize,
    pub labels: Vec<String>,
    #[serde(rename = "Km")]
    pub km: Vec<usize>,
    pub bin_peaks: Vec<Vec<usize>>,
    pub bin_obs: Vec<Vec<usize>>,
    #[serde(rename = "K")]
    pub k: usize,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "O")]
    pub o: Vec<f64>,
    // `deserialize_with` makes the keys mandatory; `null` marks an untrained model.
    // Structures stay plain records until their dimensions are checked.
    #[serde(rename = "P0", deserialize_with = "Option::deserialize")]
    pub p0: Option<VectorRecord>,
    #[serde(rename = "A", deserialize_with = "Option::deserialize")]
    pub a: Option<MatrixRecord>,
    #[serde(rename = "B", deserialize_with = "Option::deserialize")]
    pub b: Option<MatrixRecord>,
}

#[derive(Serialize)]
struct ModelRecordRef<'a> {
    #[serde(rename = "M")]
    m: usize,
    labels: Vec<&'a str>,
    #[serde(rename = "Km")]
    km: &'a [usize],
    bin_peaks: Vec<&'a [usize]>,
    bin_obs: Vec<&'a [usize]>,
    #[serde(rename = "K")]
    k: usize,
    #[serde(rename = "N")]
    n: usize,
    #[serde(rename = "O")]
    o: &'a [f64],
    #[serde(rename = "P0")]
    p0: Option<&'a CompressedVector>,
    #[serde(rename = "A")]
    a: Option<&'a CompressedMatrix>,
    #[serde(rename = "B")]
    b: Option<&'a CompressedMatrix>,
}

impl<'a> From<&'a SuperStateHmm> for ModelRecordRef<'a> {
    fn from(model: &'a SuperStateHmm) -> Self {
        Self {
            m: model.appliances.len(),
            labels: model.labels().collect(),
            km: &model.state_counts,
            bin_peaks: model.appliances.iter().map(|a| a.bin_peaks.as_slice()).collect(),
            bin_obs: model.appliances.iter().map(|a| a.bin_obs.as_slice()).collect(),
            k: model.super_states,
            n: model.observation_count(),
            o: &model.observation_labels,
            p0: model.p0(),
            a: model.a(),
            b: model.b(),
        }
    }
}

impl Serialize for SuperStateHmm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ModelRecordRef::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SuperStateHmm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = ModelRecord::deserialize(deserializer)?;
        SuperStateHmm::try_from(record).map_err(serde::de::Error::custom)
    }
}

fn invalid(reason: impl Into<String>) -> ModelError {
    ModelError::InvalidRecord(reason.into())
}

impl TryFrom<ModelRecord> for SuperStateHmm {
    type Error = ModelError;

    fn try_from(record: ModelRecord) -> Result<Self> {
        let m = record.m;
        if m == 0 {
            return Err(invalid("M must be at least 1"));
        }
        for (field, len) in [
            ("labels", record.labels.len()),
            ("Km", record.km.len()),
            ("bin_peaks", record.bin_peaks.len()),
            ("bin_obs", record.bin_obs.len()),
        ] {
            if len != m {
                return Err(invalid(format!("{} has {} entries for M = {}", field, len, m)));
            }
        }

        let appliances: Vec<ApplianceQuantization> = record
            .labels
            .into_iter()
            .zip(record.km.iter().copied())
            .zip(record.bin_peaks.into_iter().zip(record.bin_obs))
            .map(|((label, bin_count), (bin_peaks, bin_obs))| ApplianceQuantization {
                label,
                bin_count,
                bin_peaks,
                bin_obs,
            })
            .collect();
        for (i, appliance) in appliances.iter().enumerate() {
            appliance
                .validate(i)
                .map_err(|e| invalid(e.to_string()))?;
        }

        let (super_states, strides) = layout(&record.km).map_err(|e| invalid(e.to_string()))?;
        if super_states != record.k {
            return Err(invalid(format!(
                "K = {} but Km {:?} gives {}",
                record.k, record.km, super_states
            )));
        }
        if record.o.len() != record.n {
            return Err(invalid(format!(
                "N = {} but O has {} labels",
                record.n,
                record.o.len()
            )));
        }

        let parameters = match (record.p0, record.a, record.b) {
            (Some(p0), Some(a), Some(b)) => {
                let k = super_states;
                if p0.length != k {
                    return Err(invalid(format!("P0 length {} for K = {}", p0.length, k)));
                }
                if a.rows != k || a.cols != k {
                    return Err(invalid(format!("A is {}x{} for K = {}", a.rows, a.cols, k)));
                }
                if b.rows != k || b.cols != record.n {
                    return Err(invalid(format!(
                        "B is {}x{} for K = {}, N = {}",
                        b.rows, b.cols, k, record.n
                    )));
                }
                Some(Parameters {
                    p0: CompressedVector::try_from(p0)?,
                    a: CompressedMatrix::try_from(a)?,
                    b: CompressedMatrix::try_from(b)?,
                })
            }
            (None, None, None) => None,
            _ => return Err(invalid("P0, A and B must be present together")),
        };

        Ok(SuperStateHmm {
            appliances,
            state_counts: record.km,
            strides,
            super_states,
            observation_labels: record.o,
            parameters,
            config: ModelConfig::default(),
        })
    }
}

impl SuperStateHmm {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to a JSON value tree.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a model from its JSON form without retraining.
    pub fn from_json(text: &str) -> Result<Self> {
        let record: ModelRecord = serde_json::from_str(text)?;
        Self::try_from(record)
    }

    /// Rebuild a model from a JSON value tree.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let record: ModelRecord = serde_json::from_value(value)?;
        Self::try_from(record)
    }
}

/// Write a list of models (one per fold) to a JSON file.
pub fn save_models(path: &Path, models: &[SuperStateHmm]) -> Result<()> {
    let file = File::create(path).map_err(|e| ModelError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, models)?;
    writer.flush().map_err(|e| ModelError::io(path, e))?;
    info!(
        event = event_names::MODEL_SAVED,
        path = %path.display(),
        models = models.len(),
        "models saved"
    );
    Ok(())
}

/// Read a list of models written by [`save_models`].
pub fn load_models(path: &Path) -> Result<Vec<SuperStateHmm>> {
    let file = File::open(path).map_err(|e| ModelError::io(path, e))?;
    let records: Vec<ModelRecord> = serde_json::from_reader(BufReader::new(file))?;
    let models = records
        .into_iter()
        .map(SuperStateHmm::try_from)
        .collect::<Result<Vec<_>>>()?;
    info!(
        event = event_names::MODEL_LOADED,
        path = %path.display(),
        models = models.len(),
        "models loaded"
    );
    Ok(models)
}
