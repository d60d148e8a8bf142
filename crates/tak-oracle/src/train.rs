// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tak_utils::error::CoreResult;

use crate::local::PolicyValueModel;

/// Per-minibatch loss breakdown the trainer logs and feeds to hooks.
/// Neural-network internals are out of scope; what the trainer needs is
/// just these three numbers coming back from whatever is behind the
/// [`TrainableModel`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LossMetrics {
    pub loss: f32,
    pub value_loss: f32,
    pub policy_loss: f32,
}

/// One training minibatch, already encoded and densified by
/// `tak_selfplay::encode_games` and sliced by the trainer's minibatch
/// iterator.
pub struct TrainingBatch<'a> {
    pub encoded: &'a [Vec<u8>],
    pub mask: &'a [Vec<bool>],
    pub move_probs: &'a [Vec<f32>],
    pub values: &'a [f32],
}

/// The training-side extension of [`PolicyValueModel`]: forward, compute
/// loss under the Oracle's loss contract, backward, optimizer step. A
/// real network's architecture, autodiff, and optimizer state are all
/// out of scope — this is the seam the trainer calls through, nothing
/// more.
pub trait TrainableModel: PolicyValueModel {
    fn train_on_batch(&mut self, batch: &TrainingBatch) -> LossMetrics;

    fn set_learning_rate(&mut self, lr: f32);

    /// Opaque parameter payload for snapshotting (the on-disk
    /// `model.*`/`opt.*` files). The snapshot layer adds its own
    /// magic-header/version framing around whatever bytes come back
    /// here; this trait just needs to be able to round-trip them.
    fn snapshot(&self) -> Vec<u8>;

    fn restore(&mut self, bytes: &[u8]) -> CoreResult<()>;
}

/// `mse(value) + cross_entropy(policy)` against the training targets.
/// Shared by the trainer's minibatch step and by a no-grad evaluation
/// pass (the test-loss hook), since both just need model predictions
/// plus targets.
pub fn compute_loss(predictions: &[(Vec<f32>, f32)], target_probs: &[Vec<f32>], target_values: &[f32]) -> LossMetrics {
    let n = (predictions.len().max(1)) as f32;
    let mut value_loss = 0.0f32;
    let mut policy_loss = 0.0f32;

    for (i, (probs, value)) in predictions.iter().enumerate() {
        let diff = value - target_values[i];
        value_loss += diff * diff;

        for (p, t) in probs.iter().zip(&target_probs[i]) {
            if *t > 0.0 {
                policy_loss -= t * p.max(1e-9).ln();
            }
        }
    }

    value_loss /= n;
    policy_loss /= n;
    LossMetrics { loss: value_loss + policy_loss, value_loss, policy_loss }
}

/// A stand-in for the (out of scope) neural network: uniform policy,
/// zero value, zero loss. Exercises every control path — the inference
/// server's batching, the trainer's loop, hook scheduling, snapshotting
/// — without claiming to learn anything.
pub struct NullModel {
    policy_width: usize,
}

impl NullModel {
    pub fn new(policy_width: usize) -> Self {
        Self { policy_width }
    }
}

impl PolicyValueModel for NullModel {
    fn evaluate(&self, _encoded_position: &[u8]) -> (Vec<f32>, f32) {
        (vec![0.0; self.policy_width], 0.0)
    }
}

impl TrainableModel for NullModel {
    fn train_on_batch(&mut self, _batch: &TrainingBatch) -> LossMetrics {
        LossMetrics::default()
    }

    fn set_learning_rate(&mut self, _lr: f32) {}

    fn snapshot(&self) -> Vec<u8> {
        self.policy_width.to_le_bytes().to_vec()
    }

    fn restore(&mut self, bytes: &[u8]) -> CoreResult<()> {
        let width = bytes
            .try_into()
            .map(usize::from_le_bytes)
            .map_err(|_| tak_utils::error::CoreError::InvariantFailure("bad NullModel snapshot".into()))?;
        self.policy_width = width;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_model_reports_zero_loss_and_uniform_policy() {
        let mut model = NullModel::new(4);
        let batch = TrainingBatch { encoded: &[], mask: &[], move_probs: &[], values: &[] };
        assert_eq!(model.train_on_batch(&batch), LossMetrics::default());
        assert_eq!(model.evaluate(&[]).0.len(), 4);
    }

    #[test]
    fn compute_loss_is_zero_for_a_perfect_prediction() {
        let predictions = vec![(vec![1.0, 0.0], 0.5)];
        let target_probs = vec![vec![1.0, 0.0]];
        let target_values = vec![0.5];
        let loss = compute_loss(&predictions, &target_probs, &target_values);
        assert!(loss.value_loss < 1e-6);
        assert!(loss.policy_loss < 1e-6);
    }

    #[test]
    fn null_model_snapshot_round_trips() {
        let model = NullModel::new(7);
        let mut restored = NullModel::new(1);
        restored.restore(&model.snapshot()).unwrap();
        assert_eq!(restored.evaluate(&[]).0.len(), 7);
    }
}
