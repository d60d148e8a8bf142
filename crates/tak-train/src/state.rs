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

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tak_oracle::{LossMetrics, TrainableModel};
use tak_selfplay::EncodedBatch;

/// The model lives behind an `Arc<Mutex<_>>` because it is shared with
/// the inference server in the same process — one materialization of
/// the parameters behind a mode flag that gates who may touch it.
pub type SharedModel = Arc<Mutex<Box<dyn TrainableModel>>>;

/// `(step, epoch, positions)`, persisted in `elapsed.yaml`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ElapsedCounters {
    pub step: usize,
    pub epoch: usize,
    pub positions: usize,
}

/// Per-step stats dictionary, reset at the start of every step and
/// logged at the end of it. `extra`
/// is where hooks (eval win rate, Elo, test loss) stash their own
/// numbers without the Trainer needing to know about them.
#[derive(Clone, Debug, Default)]
pub struct StepStats {
    pub rollout_plies: usize,
    pub rollout_unique_plies: usize,
    pub replay_buffer_plies: usize,
    pub rollout_time: Duration,
    pub train_time: Duration,
    pub step_time: Duration,
    pub loss: LossMetrics,
    pub extra: HashMap<String, f32>,
}

/// Process-wide mutable aggregate the Trainer owns: the model (standing
/// in for parameters + optimizer, since both are out of scope), the
/// replay buffer, elapsed counters, and the current step's stats.
pub struct TrainState {
    pub model: SharedModel,
    pub replay_buffer: VecDeque<EncodedBatch>,
    pub elapsed: ElapsedCounters,
    pub stats: StepStats,
}

impl TrainState {
    pub fn new(model: SharedModel) -> Self {
        Self { model, replay_buffer: VecDeque::new(), elapsed: ElapsedCounters::default(), stats: StepStats::default() }
    }

    pub fn replay_buffer_len(&self) -> usize {
        self.replay_buffer.iter().map(|b| b.len()).sum()
    }
}

/// Merges rows that share an identical encoded `(position, mask)` into a
/// single row whose `move_probs`/`value`/`result` targets are the
/// arithmetic mean (spec.md §4.7 step 3 — an addition beyond the
/// original, which only counted duplicates). Returns the deduped batch
/// and the number of distinct rows it kept.
pub fn dedup_batch(batch: EncodedBatch) -> (EncodedBatch, usize) {
    struct Accum {
        position: tak_core::Position,
        encoded: Vec<u8>,
        mask: Vec<bool>,
        move_probs: Vec<f32>,
        value: f32,
        result: f32,
        count: f32,
    }

    let mut order: Vec<(Vec<u8>, Vec<bool>)> = Vec::new();
    let mut rows: HashMap<(Vec<u8>, Vec<bool>), Accum> = HashMap::new();

    for i in 0..batch.len() {
        let key = (batch.encoded[i].clone(), batch.mask[i].clone());
        match rows.get_mut(&key) {
            Some(acc) => {
                for (dst, src) in acc.move_probs.iter_mut().zip(&batch.move_probs[i]) {
                    *dst += *src;
                }
                acc.value += batch.values[i];
                acc.result += batch.results[i];
                acc.count += 1.0;
            }
            None => {
                order.push(key.clone());
                rows.insert(
                    key,
                    Accum {
                        position: batch.positions[i].clone(),
                        encoded: batch.encoded[i].clone(),
                        mask: batch.mask[i].clone(),
                        move_probs: batch.move_probs[i].clone(),
                        value: batch.values[i],
                        result: batch.results[i],
                        count: 1.0,
                    },
                );
            }
        }
    }

    let mut out = EncodedBatch {
        positions: Vec::with_capacity(order.len()),
        encoded: Vec::with_capacity(order.len()),
        mask: Vec::with_capacity(order.len()),
        move_probs: Vec::with_capacity(order.len()),
        values: Vec::with_capacity(order.len()),
        results: Vec::with_capacity(order.len()),
    };

    for key in &order {
        let acc = rows.remove(key).expect("key was just inserted");
        let mean_probs: Vec<f32> = acc.move_probs.iter().map(|p| p / acc.count).collect();
        out.positions.push(acc.position);
        out.encoded.push(acc.encoded);
        out.mask.push(acc.mask);
        out.move_probs.push(mean_probs);
        out.values.push(acc.value / acc.count);
        out.results.push(acc.result / acc.count);
    }

    let unique = out.len();
    (out, unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tak_core::new_position;

    fn batch_of(size: usize, rows: usize) -> EncodedBatch {
        let position = new_position(size).unwrap();
        EncodedBatch {
            positions: vec![position.clone(); rows],
            encoded: vec![vec![1, 2, 3]; rows],
            mask: vec![vec![true, true, true]; rows],
            move_probs: vec![vec![1.0, 0.0]; rows],
            values: vec![0.5; rows],
            results: vec![1.0; rows],
        }
    }

    #[test]
    fn dedup_merges_identical_rows_by_averaging() {
        let mut batch = batch_of(3, 2);
        batch.values[1] = -0.5;
        batch.move_probs[1] = vec![0.0, 1.0];

        let (deduped, unique) = dedup_batch(batch);
        assert_eq!(unique, 1);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped.values[0], 0.0);
        assert_eq!(deduped.move_probs[0], vec![0.5, 0.5]);
    }

    #[test]
    fn dedup_keeps_distinct_rows_separate() {
        let mut batch = batch_of(3, 2);
        batch.encoded[1] = vec![9, 9, 9];

        let (deduped, unique) = dedup_batch(batch);
        assert_eq!(unique, 2);
        assert_eq!(deduped.len(), 2);
    }
}
