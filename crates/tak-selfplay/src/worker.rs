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

//! The per-worker game loop: everything a self-play worker process does
//! between "I was just spawned" and "I have a transcript to report".

use std::io::{BufRead, Write};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use tak_core::new_position;
use tak_mcts::{Config as MctsConfig, Mcts, Node};
use tak_oracle::remote::Remote;
use tak_utils::error::{CoreError, CoreResult};

use crate::transcript::{GameResult, Transcript};

/// Everything a freshly-`exec`'d worker process needs to reconstruct its
/// Oracle client and MCTS engine from scratch (design note §9: "pass
/// serialized config + connection details through spawn arguments, have
/// the child construct all state from scratch").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub host: String,
    pub port: u16,
    pub size: usize,
    pub simulations: u32,
    pub c: f32,
    pub cutoff_prob: f32,
    pub noise_alpha: Option<f32>,
    pub noise_weight: f32,
    pub resignation_threshold: f32,
    pub ply_limit: u32,
}

impl WorkerSpec {
    fn mcts_config(&self) -> MctsConfig {
        MctsConfig {
            time_limit: None,
            simulation_limit: Some(self.simulations),
            c: self.c,
            cutoff_prob: self.cutoff_prob,
            root_noise_alpha: self.noise_alpha,
            root_noise_mix: self.noise_weight,
        }
    }

    pub fn build_engine(&self) -> CoreResult<Mcts> {
        let oracle = Arc::new(Remote::connect(&self.host, self.port)?);
        Ok(Mcts::new(oracle, self.mcts_config()))
    }
}

/// One line of the worker IPC protocol: a command carries the next game
/// id to play, or `None` as the shutdown sentinel.
pub type WorkerCmd = Option<u64>;

/// Plays one game to completion against `engine`, recording the
/// regularized-policy training distribution at each ply. Pinned to
/// `original_source/python/tak/self_play.py::play_one_game`: the
/// resignation check happens against the *just-populated* root before
/// the ordinary terminal check, and the next root is sampled from
/// `tree_probs`, not argmax.
pub fn play_one_game(
    engine: &Mcts,
    size: usize,
    resignation_threshold: f32,
    ply_limit: u32,
    rng: &mut SmallRng,
) -> CoreResult<Transcript> {
    let mut transcript = Transcript::new();
    let mut tree = Node::root(new_position(size)?);

    loop {
        tree = engine.analyze_tree(tree, rng)?;

        if tree.v_zero.abs() >= resignation_threshold {
            let winner = if tree.v_zero >= resignation_threshold {
                tree.position.to_move()
            } else {
                tree.position.to_move().flip()
            };
            transcript.result = GameResult::of_winner(Some(winner));
            break;
        }

        let (winner, reason) = tree.position.terminal();
        if reason.is_some() {
            transcript.result = GameResult::of_winner(winner);
            break;
        }

        if tree.position.ply >= ply_limit {
            transcript.result = GameResult::Draw;
            break;
        }

        let probs = engine.tree_probs(&tree)?;
        let children = tree.children.as_ref().expect("root is always expanded here");
        let candidate_moves: Vec<_> = children.iter().map(|c| c.mv.clone().unwrap()).collect();
        let value = if tree.simulations > 0 { tree.value / tree.simulations as f32 } else { tree.v_zero };

        transcript.positions.push(tree.position.clone());
        transcript.candidate_moves.push(candidate_moves);
        transcript.probs.push(probs.clone());
        transcript.values.push(value);

        let idx = sample_weighted(&probs, rng);
        let mut children = tree.children.take().expect("root is always expanded here");
        let chosen = children.swap_remove(idx);
        tree = engine.graft_root(chosen, rng)?;
    }

    Ok(transcript)
}

fn sample_weighted(probs: &[f32], rng: &mut SmallRng) -> usize {
    use rand::distributions::{Distribution, WeightedIndex};

    let weights: Vec<f32> = probs.iter().map(|&p| p.max(0.0)).collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0,
    }
}

/// The body of the hidden `selfplay-worker` subcommand: build the Oracle
/// client and engine from `spec`, then repeatedly read a
/// [`WorkerCmd`] line from `input`, play a game (or exit on the `None`
/// sentinel), and write the resulting [`Transcript`] back as one JSON
/// line on `output`.
pub fn run_worker_loop<R: BufRead, W: Write>(spec: &WorkerSpec, mut input: R, mut output: W) -> CoreResult<()> {
    let engine = spec.build_engine()?;
    let mut rng = SmallRng::from_entropy();

    let mut line = String::new();
    loop {
        line.clear();
        let n = input
            .read_line(&mut line)
            .map_err(|e| CoreError::InvariantFailure(format!("worker stdin read failed: {}", e)))?;
        if n == 0 {
            return Ok(());
        }

        let cmd: WorkerCmd = serde_json::from_str(line.trim())
            .map_err(|e| CoreError::InvariantFailure(format!("bad worker command: {}", e)))?;
        let Some(_game_id) = cmd else {
            return Ok(());
        };

        let transcript = play_one_game(&engine, spec.size, spec.resignation_threshold, spec.ply_limit, &mut rng)?;
        let json = serde_json::to_string(&transcript)
            .map_err(|e| CoreError::InvariantFailure(format!("transcript serialize failed: {}", e)))?;
        output
            .write_all(json.as_bytes())
            .and_then(|_| output.write_all(b"\n"))
            .and_then(|_| output.flush())
            .map_err(|e| CoreError::InvariantFailure(format!("worker stdout write failed: {}", e)))?;
    }
}

