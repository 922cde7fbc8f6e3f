//! Per-appliance quantization metadata.
//!
//! An external quantizer reduces each appliance's readings to a small number
//! of discrete states. The model consumes its output verbatim: the state
//! count, a representative reading per state, and a reading-to-state map.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Quantization of one appliance's readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceQuantization {
    /// Appliance label.
    pub label: String,
    /// Number of discrete states.
    pub bin_count: usize,
    /// Representative reading of each state.
    pub bin_peaks: Vec<usize>,
    /// State of every raw reading `0..bin_obs.len()`.
    pub bin_obs: Vec<usize>,
}

impl ApplianceQuantization {
    /// Build from state peaks and a reading-to-state map.
    pub fn new(label: impl Into<String>, bin_peaks: Vec<usize>, bin_obs: Vec<usize>) -> Self {
        Self {
            label: label.into(),
            bin_count: bin_peaks.len(),
            bin_peaks,
            bin_obs,
        }
    }

    /// Check that the peaks and the reading map agree with the state count.
    ///
    /// `appliance` is the position used in error reports.
    pub fn validate(&self, appliance: usize) -> Result<()> {
        let invalid = |reason: String| ModelError::InvalidQuantization { appliance, reason };
        if self.bin_count == 0 {
            return Err(invalid("no states".to_string()));
        }
        if self.bin_peaks.len() != self.bin_count {
            return Err(invalid(format!(
                "{} peaks for {} states",
                self.bin_peaks.len(),
                self.bin_count
            )));
        }
        if self.bin_obs.is_empty() {
            return Err(invalid("empty reading map".to_string()));
        }
        if let Some((reading, state)) = self
            .bin_obs
            .iter()
            .enumerate()
            .find(|(_, &s)| s >= self.bin_count)
        {
            return Err(invalid(format!(
                "reading {} maps to state {} of {}",
                reading, state, self.bin_count
            )));
        }
        Ok(())
    }

    /// State of a raw reading; readings past the map take the last mapped state.
    pub fn state_for(&self, reading: usize) -> usize {
        self.bin_obs
            .get(reading)
            .or_else(|| self.bin_obs.last())
            .copied()
            .unwrap_or(0)
    }

    /// Representative reading of a state.
    pub fn peak(&self, state: usize) -> Option<usize> {
        self.bin_peaks.get(state).copied()
    }
}

/// Largest observation alphabet `observation_labels` will build.
pub const MAX_OBSERVATIONS: usize = 1 << 24;

/// Physical value of every observation index, `0, 1/precision, ..., max_obs`.
///
/// The number of labels is the size `N` of the observation alphabet, at most
/// [`MAX_OBSERVATIONS`].
pub fn observation_labels(max_obs: f64, precision: f64) -> Result<Vec<f64>> {
    if !(precision.is_finite() && precision > 0.0) {
        return Err(ModelError::Config(format!(
            "precision must be positive, got {}",
            precision
        )));
    }
    if !(max_obs.is_finite() && max_obs >= 0.0) {
        return Err(ModelError::Config(format!(
            "max observation must be non-negative, got {}",
            max_obs
        )));
    }
    let scaled = (max_obs * precision).round();
    if scaled >= MAX_OBSERVATIONS as f64 {
        return Err(ModelError::Config(format!(
            "{} / {} gives more than {} observation labels",
            max_obs,
            1.0 / precision,
            MAX_OBSERVATIONS
        )));
    }
    let steps = scaled as usize;
    Ok((0..=steps).map(|i| i as f64 / precision).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kettle() -> ApplianceQuantization {
        // Readings 0..4 off, 5..9 on.
        ApplianceQuantization::new(
            "kettle",
            vec![0, 7],
            vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1],
        )
    }

    #[test]
    fn readings_map_to_states() {
        let q = kettle();
        assert!(q.validate(0).is_ok());
        assert_eq!(q.state_for(2), 0);
        assert_eq!(q.state_for(5), 1);
        assert_eq!(q.state_for(9), 1);
    }

    #[test]
    fn readings_past_the_map_clamp_to_last_state() {
        assert_eq!(kettle().state_for(10), 1);
        assert_eq!(kettle().state_for(10_000), 1);
    }

    #[test]
    fn peaks_by_state() {
        let q = kettle();
        assert_eq!(q.peak(1), Some(7));
        assert_eq!(q.peak(2), None);
    }

    #[test]
    fn validate_reports_inconsistencies() {
        let mut q = kettle();
        q.bin_count = 3;
        assert!(matches!(
            q.validate(4),
            Err(ModelError::InvalidQuantization { appliance: 4, .. })
        ));

        let q = ApplianceQuantization::new("x", vec![0, 1], vec![0, 2]);
        assert!(q.validate(0).is_err());

        let q = ApplianceQuantization::new("x", vec![0], vec![]);
        assert!(q.validate(0).is_err());

        let q = ApplianceQuantization::new("x", vec![], vec![0]);
        assert!(q.validate(0).is_err());
    }

    #[test]
    fn observation_labels_cover_the_range() {
        let labels = observation_labels(2.0, 10.0).unwrap();
        assert_eq!(labels.len(), 21);
        assert_eq!(labels[0], 0.0);
        assert_eq!(labels[3], 0.3);
        assert_eq!(labels[20], 2.0);

        let whole = observation_labels(15.0, 1.0).unwrap();
        assert_eq!(whole.len(), 16);
        assert_eq!(whole[15], 15.0);
    }

    #[test]
    fn observation_labels_reject_bad_parameters() {
        assert!(observation_labels(10.0, 0.0).is_err());
        assert!(observation_labels(-1.0, 1.0).is_err());
        assert!(observation_labels(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn observation_labels_are_bounded() {
        assert!(matches!(
            observation_labels(1e300, 1e10),
            Err(ModelError::Config(_))
        ));
        assert!(observation_labels(f64::MAX, 1.0).is_err());
        assert!(observation_labels(MAX_OBSERVATIONS as f64, 1.0).is_err());
    }
}
