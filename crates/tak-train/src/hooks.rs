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

//! The Hook pipeline (spec.md §4.8): a trait with default no-op methods,
//! invoked in registration order at each point in the Trainer's loop,
//! plus the five standard hooks.

use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

use serde::Deserialize;

use tak_oracle::compute_loss;
use tak_selfplay::EncodedBatch;

use crate::snapshot::{save_now_requested, save_snapshot};
use crate::state::{ElapsedCounters, StepStats, TrainState};

/// A polymorphic observer of the Trainer's loop. Every method is a
/// no-op by default so a hook only needs to implement what it cares
/// about (spec.md §4.8: "exposing any subset").
pub trait Hook: Send {
    fn before_run(&mut self, _state: &mut TrainState) {}
    fn before_rollout(&mut self, _state: &mut TrainState) {}
    fn before_train(&mut self, _state: &mut TrainState) {}
    fn after_step(&mut self, _state: &mut TrainState) {}
    fn after_run(&mut self, _state: &mut TrainState) {}
    fn finalize(&mut self, _state: &mut TrainState) {}
}

/// Records wall-clock time for the rollout and train phases into
/// `step_stats` (spec.md §4.8 Timing).
#[derive(Default)]
pub struct TimingHook {
    rollout_start: Option<Instant>,
    train_start: Option<Instant>,
}

impl Hook for TimingHook {
    fn before_rollout(&mut self, _state: &mut TrainState) {
        self.rollout_start = Some(Instant::now());
    }

    fn before_train(&mut self, state: &mut TrainState) {
        if let Some(start) = self.rollout_start.take() {
            state.stats.rollout_time = start.elapsed();
        }
        self.train_start = Some(Instant::now());
    }

    fn after_step(&mut self, state: &mut TrainState) {
        if let Some(start) = self.train_start.take() {
            state.stats.train_time = start.elapsed();
        }
    }
}

/// Writes a snapshot every `save_freq` steps, or immediately when
/// `<run_dir>/SAVE_NOW` is present, and once more at run end (spec.md
/// §4.8 Save).
pub struct SavingHook {
    pub run_dir: PathBuf,
    pub save_freq: usize,
    pub compress_replay_buffer: bool,
}

impl SavingHook {
    fn save(&self, state: &TrainState) {
        if let Err(e) = save_snapshot(&self.run_dir, state, self.compress_replay_buffer) {
            log::error!("snapshot write at step {} failed: {}", state.elapsed.step, e);
        }
    }
}

impl Hook for SavingHook {
    fn after_step(&mut self, state: &mut TrainState) {
        let due = self.save_freq > 0 && state.elapsed.step % self.save_freq == 0;
        let forced = save_now_requested(&self.run_dir);
        if due || forced {
            self.save(state);
        }
    }

    fn after_run(&mut self, state: &mut TrainState) {
        self.save(state);
    }
}

/// Runs the model over a fixed held-out dataset under no-grad every
/// `test_freq` steps and records mean loss into `step_stats.extra`
/// (spec.md §4.8 TestLoss).
pub struct TestLossHook {
    pub test_freq: usize,
    pub test_data: EncodedBatch,
}

impl Hook for TestLossHook {
    fn after_step(&mut self, state: &mut TrainState) {
        if self.test_freq == 0 || state.elapsed.step % self.test_freq != 0 {
            return;
        }

        let predictions = state.model.lock().expect("model mutex poisoned").evaluate_batch(&self.test_data.encoded);
        let loss = compute_loss(&predictions, &self.test_data.move_probs, &self.test_data.values);

        state.stats.extra.insert("test_loss".to_string(), loss.loss);
        state.stats.extra.insert("test_value_loss".to_string(), loss.value_loss);
        state.stats.extra.insert("test_policy_loss".to_string(), loss.policy_loss);
    }
}

#[derive(Deserialize)]
struct EvalPlayer {
    #[serde(rename = "Wins")]
    wins: f32,
}

#[derive(Deserialize)]
struct EvalStats {
    #[serde(rename = "Players")]
    players: Vec<EvalPlayer>,
    #[serde(rename = "Ties")]
    ties: f32,
    #[serde(rename = "Cutoff")]
    cutoff: f32,
    #[allow(dead_code)]
    #[serde(rename = "White")]
    white: f32,
    #[allow(dead_code)]
    #[serde(rename = "Black")]
    black: f32,
}

#[derive(Deserialize)]
struct EvalSummary {
    #[serde(rename = "Stats")]
    stats: EvalStats,
}

fn elo_from_score(score: f32) -> f32 {
    if score <= 0.0 {
        f32::NEG_INFINITY
    } else if score >= 1.0 {
        f32::INFINITY
    } else {
        -400.0 * (1.0 / score - 1.0).log10()
    }
}

/// Spawns an external opponent driver for a single game every
/// `eval_freq` steps and scores the result as win-rate + Elo (spec.md
/// §4.8 Eval, §6.3).
pub struct EvalHook {
    pub eval_freq: usize,
    pub driver_cmd: PathBuf,
    pub size: usize,
    pub summary_path: PathBuf,
    pub openings: Option<PathBuf>,
    pub p1: String,
    pub p2: String,
}

impl Hook for EvalHook {
    fn after_step(&mut self, state: &mut TrainState) {
        if self.eval_freq == 0 || state.elapsed.step % self.eval_freq != 0 {
            return;
        }

        let mut command = Command::new(&self.driver_cmd);
        command
            .arg(format!("-size={}", self.size))
            .arg("-games=1")
            .arg(format!("-summary={}", self.summary_path.display()));
        if let Some(openings) = &self.openings {
            command.arg(format!("-openings={}", openings.display()));
        }
        command.arg(format!("-p1={}", self.p1)).arg(format!("-p2={}", self.p2));

        match command.status() {
            Ok(status) if status.success() => self.score(state),
            Ok(status) => log::warn!("eval driver exited with {}", status),
            Err(e) => log::warn!("could not spawn eval driver: {}", e),
        }
    }
}

impl EvalHook {
    fn score(&self, state: &mut TrainState) {
        let text = match std::fs::read_to_string(&self.summary_path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("could not read eval summary {}: {}", self.summary_path.display(), e);
                return;
            }
        };

        let summary: EvalSummary = match serde_json::from_str(&text) {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("could not parse eval summary {}: {}", self.summary_path.display(), e);
                return;
            }
        };

        let [p1_wins, p2_wins] = match summary.stats.players.as_slice() {
            [a, b] => [a.wins, b.wins],
            _ => {
                log::warn!("eval summary did not have exactly two players");
                return;
            }
        };

        let decided = p1_wins + p2_wins + summary.stats.ties - summary.stats.cutoff;
        let score = if decided > 0.0 { (p1_wins + 0.5 * summary.stats.ties) / decided } else { 0.5 };

        state.stats.extra.insert("eval_win_rate".to_string(), score);
        state.stats.extra.insert("eval_elo".to_string(), elo_from_score(score));
    }
}

/// Forwards `step_stats`/elapsed counters to an external telemetry
/// backend. The real backend is out of scope (§1 Non-goals); this is
/// the seam, with a logging sink wired in by default.
pub trait MetricsSink: Send {
    fn emit(&mut self, elapsed: &ElapsedCounters, stats: &StepStats);
}

pub struct LoggingSink;

impl MetricsSink for LoggingSink {
    fn emit(&mut self, elapsed: &ElapsedCounters, stats: &StepStats) {
        log::info!(
            "step {} positions {} loss {:.4} rollout {:?} train {:?}",
            elapsed.step,
            elapsed.positions,
            stats.loss.loss,
            stats.rollout_time,
            stats.train_time,
        );
    }
}

pub struct MetricsSinkHook {
    pub sink: Box<dyn MetricsSink>,
}

impl Hook for MetricsSinkHook {
    fn after_step(&mut self, state: &mut TrainState) {
        self.sink.emit(&state.elapsed, &state.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elo_formula_matches_the_spec_constant() {
        assert_eq!(elo_from_score(0.5), 0.0);
        assert_eq!(elo_from_score(0.0), f32::NEG_INFINITY);
        assert_eq!(elo_from_score(1.0), f32::INFINITY);
        assert!(elo_from_score(0.75) > 0.0);
    }

    #[test]
    fn timing_hook_records_rollout_and_train_durations() {
        let mut hook = TimingHook::default();
        let mut state = TrainState::new(std::sync::Arc::new(std::sync::Mutex::new(Box::new(tak_oracle::NullModel::new(1)))));

        hook.before_rollout(&mut state);
        hook.before_train(&mut state);
        hook.after_step(&mut state);

        // both phases are non-negative durations recorded without panicking
        assert!(state.stats.rollout_time.as_nanos() < u128::MAX);
        assert!(state.stats.train_time.as_nanos() < u128::MAX);
    }
}
