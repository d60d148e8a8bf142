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

//! The Trainer main loop (spec.md §4.7): rollout, dedup, replay buffer
//! maintenance, a shuffled-minibatch training pass, and the hook calls
//! bracketing each phase.

use std::collections::VecDeque;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use tak_oracle::{LossMetrics, TrainingBatch};
use tak_selfplay::{encode_games, EncodedBatch, MultiprocessSelfPlayEngine};
use tak_server::ServerHandle;
use tak_utils::config::TrainConfig;
use tak_utils::error::CoreResult;

use crate::hooks::Hook;
use crate::state::{dedup_batch, StepStats, TrainState};

fn flat_indices(buffer: &VecDeque<EncodedBatch>) -> Vec<(usize, usize)> {
    let mut idx = Vec::new();
    for (b, batch) in buffer.iter().enumerate() {
        for r in 0..batch.len() {
            idx.push((b, r));
        }
    }
    idx
}

fn gather_minibatch(
    buffer: &VecDeque<EncodedBatch>,
    idxs: &[(usize, usize)],
) -> (Vec<Vec<u8>>, Vec<Vec<bool>>, Vec<Vec<f32>>, Vec<f32>) {
    let mut encoded = Vec::with_capacity(idxs.len());
    let mut mask = Vec::with_capacity(idxs.len());
    let mut move_probs = Vec::with_capacity(idxs.len());
    let mut values = Vec::with_capacity(idxs.len());

    for &(b, r) in idxs {
        let batch = &buffer[b];
        encoded.push(batch.encoded[r].clone());
        mask.push(batch.mask[r].clone());
        move_probs.push(batch.move_probs[r].clone());
        values.push(batch.values[r]);
    }

    (encoded, mask, move_probs, values)
}

/// Owns the [`TrainState`], the self-play orchestrator, and the
/// inference server's mode switch. Knows nothing about disk layout —
/// that's the [`crate::hooks::SavingHook`]'s job (spec.md §4.7
/// "Snapshotting is performed by a hook").
pub struct Trainer {
    pub state: TrainState,
    pub hooks: Vec<Box<dyn Hook>>,
    orchestrator: MultiprocessSelfPlayEngine,
    server: ServerHandle,
    rng: SmallRng,
}

impl Trainer {
    pub fn new(
        state: TrainState,
        orchestrator: MultiprocessSelfPlayEngine,
        server: ServerHandle,
        hooks: Vec<Box<dyn Hook>>,
    ) -> Self {
        Self { state, hooks, orchestrator, server, rng: SmallRng::from_entropy() }
    }

    /// Stops the self-play worker pool, joining every child process. The
    /// [`ServerHandle`] needs no explicit teardown; the `InferenceServer`
    /// it was cloned from is shut down separately by whoever started it.
    pub fn stop_orchestrator(self) {
        self.orchestrator.stop();
    }

    pub fn run(&mut self, config: &TrainConfig) -> CoreResult<()> {
        for hook in &mut self.hooks {
            hook.before_run(&mut self.state);
        }

        while self.state.elapsed.step < config.steps {
            self.run_one_step(config)?;
        }

        for hook in &mut self.hooks {
            hook.after_run(&mut self.state);
        }
        Ok(())
    }

    fn run_one_step(&mut self, config: &TrainConfig) -> CoreResult<()> {
        let step_start = Instant::now();
        self.state.stats = StepStats::default();

        for hook in &mut self.hooks {
            hook.before_rollout(&mut self.state);
        }

        let transcripts = self.orchestrator.play_many(config.rollouts_per_step)?;
        let raw_batch = encode_games(&transcripts);
        self.state.stats.rollout_plies = raw_batch.len();

        for hook in &mut self.hooks {
            hook.before_train(&mut self.state);
        }

        let (deduped, unique) = dedup_batch(raw_batch);
        self.state.stats.rollout_unique_plies = unique;

        self.state.replay_buffer.push_back(deduped);
        while self.state.replay_buffer.len() > config.replay_buffer_steps.max(1) {
            self.state.replay_buffer.pop_front();
        }
        self.state.stats.replay_buffer_plies = self.state.replay_buffer_len();

        self.server.train_mode();
        self.state.stats.loss = self.train_minibatches(config);
        self.server.serve_mode();

        self.state.elapsed.step += 1;
        self.state.elapsed.positions += self.state.stats.rollout_plies;
        self.state.elapsed.epoch = self.state.elapsed.positions / config.train_positions.max(1);
        self.state.stats.step_time = step_start.elapsed();

        for hook in &mut self.hooks {
            hook.after_step(&mut self.state);
        }
        for hook in &mut self.hooks {
            hook.finalize(&mut self.state);
        }

        log::info!(
            "step {} rollout_plies={} unique={} replay_plies={} loss={:.4} step_time={:?}",
            self.state.elapsed.step,
            self.state.stats.rollout_plies,
            self.state.stats.rollout_unique_plies,
            self.state.stats.replay_buffer_plies,
            self.state.stats.loss.loss,
            self.state.stats.step_time,
        );

        Ok(())
    }

    /// Step 5 of spec.md §4.7: shuffle the entire replay buffer as a
    /// flat dataset, run `ceil(train_positions / batch)` minibatches,
    /// wrapping the shuffled order as needed; the learning rate is set
    /// once, before the first minibatch.
    fn train_minibatches(&mut self, config: &TrainConfig) -> LossMetrics {
        let idxs = flat_indices(&self.state.replay_buffer);
        if idxs.is_empty() {
            return LossMetrics::default();
        }

        self.state.model.lock().expect("model mutex poisoned").set_learning_rate(config.lr);

        let mut order: Vec<usize> = (0..idxs.len()).collect();
        order.shuffle(&mut self.rng);

        let batch_size = config.batch.max(1);
        let minibatches = (config.train_positions + batch_size - 1) / batch_size;

        let mut loss = LossMetrics::default();
        let mut cursor = 0usize;
        for _ in 0..minibatches {
            let mut chosen = Vec::with_capacity(batch_size);
            for _ in 0..batch_size {
                chosen.push(idxs[order[cursor % order.len()]]);
                cursor += 1;
            }

            let (encoded, mask, move_probs, values) = gather_minibatch(&self.state.replay_buffer, &chosen);
            let batch = TrainingBatch { encoded: &encoded, mask: &mask, move_probs: &move_probs, values: &values };
            loss = self.state.model.lock().expect("model mutex poisoned").train_on_batch(&batch);
        }

        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_indices_enumerates_every_row_in_buffer_order() {
        let mut buffer = VecDeque::new();
        buffer.push_back(EncodedBatch {
            positions: vec![],
            encoded: vec![vec![1], vec![2]],
            mask: vec![vec![true], vec![true]],
            move_probs: vec![vec![1.0], vec![1.0]],
            values: vec![0.0, 0.0],
            results: vec![0.0, 0.0],
        });

        let idxs = flat_indices(&buffer);
        assert_eq!(idxs, vec![(0, 0), (0, 1)]);
    }
}
