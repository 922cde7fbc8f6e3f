//! Super-state hidden Markov model.
//!
//! The joint state of `M` appliances is a single super-state index in
//! `[0, K)`, `K = Km[0] * ... * Km[M-1]`, in mixed radix with the first
//! appliance most significant. The model holds three sparse structures over
//! that space:
//!
//! - `P0` (length `K`): how often each super-state was seen
//! - `A` (`K x K`): transitions between consecutive super-states
//! - `B` (`K x N`): observed aggregate reading per super-state
//!
//! Training counts one pass over labelled history and then normalizes; the
//! model is read-only afterwards and may be shared by reference across
//! decoding threads.

mod persist;

pub use persist::{load_models, save_models, ModelRecord};

use serde::Serialize;
use sshmm_sparse::{CompressedMatrix, CompressedVector};
use tracing::{info, instrument};

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::logging::event_names;
use crate::quantization::ApplianceQuantization;

/// Trained probability structures.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Initial distribution over super-states.
    pub p0: CompressedVector,
    /// Row-stochastic transition matrix, keyed by successor column.
    pub a: CompressedMatrix,
    /// Row-stochastic emission matrix, keyed by observation column.
    pub b: CompressedMatrix,
}

/// A super-state HMM over a fixed set of quantized appliances.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperStateHmm {
    appliances: Vec<ApplianceQuantization>,
    state_counts: Vec<usize>,
    /// Place value of each appliance's state within a super-state index.
    strides: Vec<usize>,
    super_states: usize,
    observation_labels: Vec<f64>,
    parameters: Option<Parameters>,
    config: ModelConfig,
}

/// Reading estimate for a super-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Estimate {
    pub super_state: usize,
    /// Per-appliance states.
    pub states: Vec<usize>,
    /// Per-appliance representative readings.
    pub readings: Vec<usize>,
    /// Sum of `readings`.
    pub total: usize,
}

/// Size and density of one stored structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureStats {
    pub size: u64,
    pub nonzero: usize,
    pub sparsity: f64,
    pub bytes: usize,
}

impl StructureStats {
    fn of_vector(v: &CompressedVector) -> Self {
        Self {
            size: v.size() as u64,
            nonzero: v.nonzero(),
            sparsity: v.sparsity(),
            bytes: v.heap_bytes(),
        }
    }

    fn of_matrix(m: &CompressedMatrix) -> Self {
        Self {
            size: m.size(),
            nonzero: m.nonzero(),
            sparsity: m.sparsity(),
            bytes: m.heap_bytes(),
        }
    }
}

/// Dimensions and storage footprint of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStats {
    pub appliances: usize,
    pub super_states: usize,
    pub observations: usize,
    pub state_counts: Vec<usize>,
    pub p0: Option<StructureStats>,
    pub a: Option<StructureStats>,
    pub b: Option<StructureStats>,
}

impl ModelStats {
    /// Bytes held by P0, A and B together.
    pub fn total_bytes(&self) -> usize {
        [&self.p0, &self.a, &self.b]
            .into_iter()
            .flatten()
            .map(|s| s.bytes)
            .sum()
    }
}

/// Super-state count and per-appliance strides for a radix vector.
pub(crate) fn layout(state_counts: &[usize]) -> Result<(usize, Vec<usize>)> {
    let mut strides = vec![1; state_counts.len()];
    let mut count: usize = 1;
    for (m, &km) in state_counts.iter().enumerate().rev() {
        strides[m] = count;
        count = count
            .checked_mul(km)
            .ok_or_else(|| ModelError::StateSpaceOverflow {
                state_counts: state_counts.to_vec(),
            })?;
    }
    Ok((count, strides))
}

impl SuperStateHmm {
    /// Create an untrained model with the default configuration.
    pub fn new(
        appliances: Vec<ApplianceQuantization>,
        observation_labels: Vec<f64>,
    ) -> Result<Self> {
        Self::with_config(appliances, observation_labels, ModelConfig::default())
    }

    /// Create an untrained model.
    ///
    /// `observation_labels` gives the physical value of each observation index
    /// and fixes `N`; see [`crate::quantization::observation_labels`].
    pub fn with_config(
        appliances: Vec<ApplianceQuantization>,
        observation_labels: Vec<f64>,
        config: ModelConfig,
    ) -> Result<Self> {
        config.validate()?;
        if appliances.is_empty() {
            return Err(ModelError::InvalidQuantization {
                appliance: 0,
                reason: "no appliances".to_string(),
            });
        }
        for (m, appliance) in appliances.iter().enumerate() {
            appliance.validate(m)?;
        }
        let state_counts: Vec<usize> = appliances.iter().map(|a| a.bin_count).collect();
        let (super_states, strides) = layout(&state_counts)?;

        Ok(Self {
            appliances,
            state_counts,
            strides,
            super_states,
            observation_labels,
            parameters: None,
            config,
        })
    }

    /// Number of appliances `M`.
    pub fn appliance_count(&self) -> usize {
        self.appliances.len()
    }

    pub fn appliances(&self) -> &[ApplianceQuantization] {
        &self.appliances
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.appliances.iter().map(|a| a.label.as_str())
    }

    /// States per appliance, `Km`.
    pub fn state_counts(&self) -> &[usize] {
        &self.state_counts
    }

    /// Number of super-states `K`.
    pub fn super_state_count(&self) -> usize {
        self.super_states
    }

    /// Size `N` of the observation alphabet.
    pub fn observation_count(&self) -> usize {
        self.observation_labels.len()
    }

    pub fn observation_labels(&self) -> &[f64] {
        &self.observation_labels
    }

    /// Physical value of observation index `y`.
    pub fn observation_label(&self, y: usize) -> Option<f64> {
        self.observation_labels.get(y).copied()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.parameters.is_some()
    }

    /// Trained structures, or [`ModelError::NotTrained`].
    pub fn parameters(&self) -> Result<&Parameters> {
        self.parameters.as_ref().ok_or(ModelError::NotTrained)
    }

    pub fn p0(&self) -> Option<&CompressedVector> {
        self.parameters.as_ref().map(|p| &p.p0)
    }

    pub fn a(&self) -> Option<&CompressedMatrix> {
        self.parameters.as_ref().map(|p| &p.a)
    }

    pub fn b(&self) -> Option<&CompressedMatrix> {
        self.parameters.as_ref().map(|p| &p.b)
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.appliances.len() {
            return Err(ModelError::LengthMismatch {
                expected: self.appliances.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Fail unless `y` is a valid observation index.
    pub fn check_observation(&self, y: usize) -> Result<()> {
        if y >= self.observation_count() {
            return Err(ModelError::ObservationOutOfRange {
                observation: y,
                count: self.observation_count(),
            });
        }
        Ok(())
    }

    /// Super-state index of a per-appliance state vector.
    pub fn encode(&self, states: &[usize]) -> Result<usize> {
        self.check_len(states.len())?;
        let mut k = 0;
        for (m, (&state, &count)) in states.iter().zip(&self.state_counts).enumerate() {
            if state >= count {
                return Err(ModelError::StateOutOfRange {
                    appliance: m,
                    state,
                    count,
                });
            }
            k += state * self.strides[m];
        }
        Ok(k)
    }

    /// Per-appliance state vector of a super-state index.
    pub fn decode(&self, k: usize) -> Result<Vec<usize>> {
        if k >= self.super_states {
            return Err(ModelError::SuperStateOutOfRange {
                state: k,
                count: self.super_states,
            });
        }
        Ok(self
            .strides
            .iter()
            .zip(&self.state_counts)
            .map(|(&stride, &count)| (k / stride) % count)
            .collect())
    }

    /// Per-appliance states of per-appliance raw readings.
    pub fn obs_to_bins(&self, readings: &[usize]) -> Result<Vec<usize>> {
        self.check_len(readings.len())?;
        Ok(self
            .appliances
            .iter()
            .zip(readings)
            .map(|(a, &r)| a.state_for(r))
            .collect())
    }

    /// Super-state index of per-appliance raw readings.
    pub fn encode_readings(&self, readings: &[usize]) -> Result<usize> {
        self.encode(&self.obs_to_bins(readings)?)
    }

    /// Count P0, A and B over labelled history, then normalize.
    ///
    /// `observations[t]` is the aggregate reading index at step `t` and
    /// `hidden[t]` the per-appliance state vector. Step 0 is its own
    /// predecessor, so every step contributes one transition. On error the
    /// model stays untrained.
    #[instrument(skip_all, fields(steps = observations.len(), super_states = self.super_states))]
    pub fn train<S: AsRef<[usize]>>(&mut self, observations: &[usize], hidden: &[S]) -> Result<()> {
        if self.parameters.is_some() {
            return Err(ModelError::AlreadyTrained);
        }
        if observations.len() != hidden.len() {
            return Err(ModelError::LengthMismatch {
                expected: observations.len(),
                actual: hidden.len(),
            });
        }
        let first = hidden.first().ok_or(ModelError::NoObservations)?;

        info!(
            event = event_names::TRAIN_STARTED,
            steps = observations.len(),
            super_states = self.super_states,
            observations = self.observation_count(),
            "counting hidden state events"
        );

        let config = &self.config;
        let k = self.super_states;
        let mut p0 = CompressedVector::new("P0", k, config.p0_indexing).with_budget(config.mph);
        let mut a = CompressedMatrix::new("A", k, k, config.a_indexing)
            .with_column_indexing(config.column_indexing)
            .with_budget(config.mph);
        let mut b = CompressedMatrix::new("B", k, self.observation_count(), config.b_indexing)
            .with_column_indexing(config.column_indexing)
            .with_budget(config.mph);

        let mut previous = self.encode(first.as_ref())?;
        for (&y, states) in observations.iter().zip(hidden) {
            let current = self.encode(states.as_ref())?;
            self.check_observation(y)?;
            p0.increment(current)?;
            a.increment(previous, current)?;
            b.increment(current, y)?;
            previous = current;
        }

        p0.normalize();
        a.normalize(config.keep_row_totals)?;
        b.normalize(config.keep_row_totals)?;
        self.parameters = Some(Parameters { p0, a, b });

        let stats = self.stats();
        if let (Some(p0), Some(a), Some(b)) = (&stats.p0, &stats.a, &stats.b) {
            info!(
                event = event_names::MODEL_STATS,
                p0_sparsity = p0.sparsity,
                p0_nonzero = p0.nonzero,
                a_sparsity = a.sparsity,
                a_nonzero = a.nonzero,
                b_sparsity = b.sparsity,
                b_nonzero = b.nonzero,
                total_bytes = stats.total_bytes(),
                "model storage"
            );
        }
        info!(event = event_names::TRAIN_FINISHED, "model trained");
        Ok(())
    }

    /// Train from per-appliance raw readings instead of states.
    pub fn train_readings<S: AsRef<[usize]>>(
        &mut self,
        observations: &[usize],
        readings: &[S],
    ) -> Result<()> {
        let hidden = readings
            .iter()
            .map(|r| self.obs_to_bins(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.train(observations, &hidden)
    }

    /// Representative reading of each appliance in the given states.
    pub fn estimate_breakdown(&self, states: &[usize]) -> Result<Vec<usize>> {
        self.check_len(states.len())?;
        self.appliances
            .iter()
            .zip(states)
            .enumerate()
            .map(|(m, (a, &state))| {
                a.peak(state).ok_or(ModelError::StateOutOfRange {
                    appliance: m,
                    state,
                    count: a.bin_count,
                })
            })
            .collect()
    }

    /// Aggregate reading expected for the given states.
    pub fn estimate_observation(&self, states: &[usize]) -> Result<usize> {
        Ok(self.estimate_breakdown(states)?.iter().sum())
    }

    /// States and readings behind a super-state.
    pub fn estimate(&self, super_state: usize) -> Result<Estimate> {
        let states = self.decode(super_state)?;
        let readings = self.estimate_breakdown(&states)?;
        let total = readings.iter().sum();
        Ok(Estimate {
            super_state,
            states,
            readings,
            total,
        })
    }

    pub fn stats(&self) -> ModelStats {
        let params = self.parameters.as_ref();
        ModelStats {
            appliances: self.appliances.len(),
            super_states: self.super_states,
            observations: self.observation_count(),
            state_counts: self.state_counts.clone(),
            p0: params.map(|p| StructureStats::of_vector(&p.p0)),
            a: params.map(|p| StructureStats::of_matrix(&p.a)),
            b: params.map(|p| StructureStats::of_matrix(&p.b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sshmm_sparse::Indexing;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn two_by_three() -> SuperStateHmm {
        SuperStateHmm::new(
            vec![
                ApplianceQuantization::new("fridge", vec![0, 3], vec![0, 0, 1, 1]),
                ApplianceQuantization::new("dryer", vec![0, 5, 9], vec![0, 0, 1, 1, 1, 2]),
            ],
            (0..16).map(f64::from).collect(),
        )
        .unwrap()
    }

    #[test]
    fn dimensions_follow_state_counts() {
        let model = two_by_three();
        assert_eq!(model.appliance_count(), 2);
        assert_eq!(model.state_counts(), &[2, 3]);
        assert_eq!(model.super_state_count(), 6);
        assert_eq!(model.observation_count(), 16);
        assert_eq!(model.labels().collect::<Vec<_>>(), vec!["fridge", "dryer"]);
        assert!(!model.is_trained());
        assert!(matches!(model.parameters(), Err(ModelError::NotTrained)));
    }

    #[test]
    fn first_appliance_is_most_significant() {
        let model = two_by_three();
        assert_eq!(model.encode(&[0, 0]).unwrap(), 0);
        assert_eq!(model.encode(&[0, 2]).unwrap(), 2);
        assert_eq!(model.encode(&[1, 0]).unwrap(), 3);
        assert_eq!(model.encode(&[1, 2]).unwrap(), 5);
        for k in 0..6 {
            assert_eq!(model.encode(&model.decode(k).unwrap()).unwrap(), k);
        }
    }

    #[test]
    fn codec_rejects_invalid_input() {
        let model = two_by_three();
        assert!(matches!(
            model.encode(&[2, 0]),
            Err(ModelError::StateOutOfRange {
                appliance: 0,
                state: 2,
                count: 2
            })
        ));
        assert!(matches!(
            model.encode(&[0]),
            Err(ModelError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            model.decode(6),
            Err(ModelError::SuperStateOutOfRange { state: 6, count: 6 })
        ));
    }

    #[test]
    fn state_space_overflow_is_reported() {
        let huge = ApplianceQuantization::new("big", vec![0; 1 << 16], vec![0]);
        let result = SuperStateHmm::new(vec![huge; 5], vec![0.0]);
        assert!(matches!(result, Err(ModelError::StateSpaceOverflow { .. })));
    }

    #[test]
    fn empty_appliance_list_is_rejected() {
        assert!(matches!(
            SuperStateHmm::new(vec![], vec![0.0]),
            Err(ModelError::InvalidQuantization { .. })
        ));
    }

    #[test]
    fn readings_bin_through_quantization() {
        let model = two_by_three();
        assert_eq!(model.obs_to_bins(&[3, 4]).unwrap(), vec![1, 1]);
        assert_eq!(model.obs_to_bins(&[0, 99]).unwrap(), vec![0, 2]);
        assert_eq!(model.encode_readings(&[2, 5]).unwrap(), 5);
    }

    #[test]
    fn estimates_sum_bin_peaks() {
        let model = two_by_three();
        assert_eq!(model.estimate_breakdown(&[1, 2]).unwrap(), vec![3, 9]);
        assert_eq!(model.estimate_observation(&[1, 2]).unwrap(), 12);
        let estimate = model.estimate(4).unwrap();
        assert_eq!(estimate.states, vec![1, 1]);
        assert_eq!(estimate.readings, vec![3, 5]);
        assert_eq!(estimate.total, 8);
        assert!(model.estimate_breakdown(&[0, 3]).is_err());
    }

    #[test]
    fn training_normalizes_every_structure() {
        let mut model = two_by_three();
        let hidden = [[0, 0], [0, 1], [1, 1], [1, 2], [0, 0], [0, 1]];
        let observations = [0, 5, 8, 12, 0, 5];
        model.train(&observations, &hidden).unwrap();

        let params = model.parameters().unwrap();
        assert!(approx_eq(params.p0.sum(), 1.0, 1e-12));
        // Super-state 0 appears twice out of six steps.
        assert!(approx_eq(params.p0.get(0), 2.0 / 6.0, 1e-12));

        // Row 0 of A: self-transition at t=0, then 0->1 twice.
        assert!(approx_eq(params.a.get(0, 0), 1.0 / 3.0, 1e-12));
        assert!(approx_eq(params.a.get(0, 1), 2.0 / 3.0, 1e-12));
        for row in 0..6 {
            let sum: f64 = (0..6).map(|col| params.a.get(row, col)).sum();
            assert!(sum == 0.0 || approx_eq(sum, 1.0, 1e-12), "row {row}: {sum}");
        }

        assert!(approx_eq(params.b.get(1, 5), 1.0, 1e-12));
        assert_eq!(params.b.get(1, 0), 0.0);
        assert!(params.a.row_totals().is_none());
    }

    #[test]
    fn training_respects_configured_strategies() {
        let config = ModelConfig::default()
            .with_indexing(Indexing::Full, Indexing::None, Indexing::Hashing)
            .with_column_indexing(Indexing::Hashing)
            .with_keep_row_totals(true);
        let mut model = SuperStateHmm::with_config(
            two_by_three().appliances().to_vec(),
            (0..16).map(f64::from).collect(),
            config,
        )
        .unwrap();
        model.train(&[0, 5], &[[0, 0], [0, 1]]).unwrap();

        let params = model.parameters().unwrap();
        assert_eq!(params.p0.indexing(), Indexing::Full);
        assert_eq!(params.a.indexing(), Indexing::None);
        assert_eq!(params.b.indexing(), Indexing::Hashing);
        assert_eq!(params.b.column_indexing(), Indexing::Hashing);
        assert_eq!(params.a.row_total(0), Some(2.0));
    }

    #[test]
    fn training_input_errors_leave_model_untrained() {
        let mut model = two_by_three();
        assert!(matches!(
            model.train::<[usize; 2]>(&[], &[]),
            Err(ModelError::NoObservations)
        ));
        assert!(matches!(
            model.train(&[0, 1], &[[0, 0]]),
            Err(ModelError::LengthMismatch { .. })
        ));
        assert!(matches!(
            model.train(&[0, 16], &[[0, 0], [0, 1]]),
            Err(ModelError::ObservationOutOfRange {
                observation: 16,
                count: 16
            })
        ));
        assert!(matches!(
            model.train(&[0, 1], &[[0, 0], [2, 1]]),
            Err(ModelError::StateOutOfRange { .. })
        ));
        assert!(!model.is_trained());
    }

    #[test]
    fn models_train_once() {
        let mut model = two_by_three();
        model.train(&[0], &[[0, 0]]).unwrap();
        assert!(matches!(
            model.train(&[0], &[[0, 0]]),
            Err(ModelError::AlreadyTrained)
        ));
    }

    #[test]
    fn training_from_readings_matches_training_from_states() {
        let readings = [[0, 0], [1, 3], [3, 3], [3, 5]];
        let observations = [0, 5, 8, 12];

        let mut by_readings = two_by_three();
        by_readings.train_readings(&observations, &readings).unwrap();

        let mut by_states = two_by_three();
        let states: Vec<Vec<usize>> = readings
            .iter()
            .map(|r| by_states.obs_to_bins(r).unwrap())
            .collect();
        by_states.train(&observations, &states).unwrap();

        assert_eq!(by_readings.parameters().unwrap(), by_states.parameters().unwrap());
    }

    #[test]
    fn stats_report_structures_after_training() {
        let mut model = two_by_three();
        assert!(model.stats().p0.is_none());
        model.train(&[0, 5, 5], &[[0, 0], [0, 1], [0, 1]]).unwrap();

        let stats = model.stats();
        let p0 = stats.p0.as_ref().unwrap();
        assert_eq!(p0.size, 6);
        assert_eq!(p0.nonzero, 2);
        assert!(approx_eq(p0.sparsity, 4.0 / 6.0, 1e-12));
        assert_eq!(stats.a.as_ref().unwrap().size, 36);
        assert_eq!(stats.b.as_ref().unwrap().size, 96);
        assert!(stats.total_bytes() > 0);
    }

    #[test]
    fn observation_labels_are_exposed() {
        let model = two_by_three();
        assert_eq!(model.observation_label(15), Some(15.0));
        assert_eq!(model.observation_label(16), None);
    }
}
