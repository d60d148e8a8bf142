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

use tak_core::Position;
use tak_utils::error::CoreResult;

use crate::{Evaluation, Oracle};

/// The field contract for the (out of scope) neural network: given the
/// token-encoded position, return the raw per-move-id probabilities and
/// a scalar value, both un-normalized and unmasked — normalization and
/// legal-move filtering are the MCTS expansion step's job, not the
/// model's.
pub trait PolicyValueModel: Send + Sync {
    fn evaluate(&self, encoded_position: &[u8]) -> (Vec<f32>, f32);

    /// Evaluates a whole batch at once. The default just loops; a real
    /// network overrides this to run one batched forward pass, which is
    /// the entire point of the inference server's batching loop.
    fn evaluate_batch(&self, encoded: &[Vec<u8>]) -> Vec<(Vec<f32>, f32)> {
        encoded.iter().map(|e| self.evaluate(e)).collect()
    }
}

/// Normalizes raw model logits into a probability distribution in place.
/// [`PolicyValueModel::evaluate`] returns un-normalized logits; this is
/// the one place both [`Local`] and the inference server turn them into
/// the "non-negative, sums to 1" probabilities the [`crate::Oracle`]
/// contract promises.
pub fn softmax(logits: &mut [f32]) {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in logits.iter_mut() {
            *v /= sum;
        }
    }
}

/// An in-process Oracle: encodes the position and calls straight into a
/// [`PolicyValueModel`], no IPC involved. Used by single-process tests
/// and benchmarks; the training loop's rollout workers use [`crate::remote::Remote`]
/// instead so that inference stays pinned to the server process.
pub struct Local<M> {
    model: M,
}

impl<M: PolicyValueModel> Local<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl<M: PolicyValueModel> Oracle for Local<M> {
    fn evaluate(&self, pos: &Position) -> CoreResult<Evaluation> {
        let encoded = tak_encoding::encode(pos);
        let (mut move_probs, value) = self.model.evaluate(&encoded);
        softmax(&mut move_probs);
        Ok(Evaluation { move_probs, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tak_core::new_position;

    struct Uniform {
        n: usize,
    }

    impl PolicyValueModel for Uniform {
        fn evaluate(&self, _encoded_position: &[u8]) -> (Vec<f32>, f32) {
            (vec![1.0 / self.n as f32; self.n], 0.0)
        }
    }

    #[test]
    fn local_oracle_forwards_model_output() {
        let oracle = Local::new(Uniform { n: tak_encoding::max_move_id(5) });
        let pos = new_position(5).unwrap();
        let eval = oracle.evaluate(&pos).unwrap();
        assert_eq!(eval.move_probs.len(), tak_encoding::max_move_id(5));
        assert_eq!(eval.value, 0.0);
    }
}
