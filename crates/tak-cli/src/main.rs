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

//! `tak0`: the `self-play` and `train` entry points, plus a hidden
//! `selfplay-worker` subcommand that is never invoked by a human — it's
//! how the orchestrator (`tak_selfplay`) respawns this same binary as a
//! fresh OS process per rollout worker.

mod selfplay_cmd;
mod train_cmd;
mod worker_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// The default cutoff below which a candidate move's prior is dropped
/// during MCTS expansion (`cutoff_prob`). Neither CLI surface exposes
/// this as a flag, so every rollout worker uses this constant.
pub(crate) const DEFAULT_CUTOFF_PROB: f32 = 1e-6;

#[derive(Parser)]
#[command(name = "tak0", author, version, about = "AlphaZero-style self-play engine for Tak", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plays games against a running inference server and writes the
    /// encoded transcripts to a file.
    SelfPlay(selfplay_cmd::SelfPlayArgs),

    /// Runs the AlphaZero training loop.
    Train(train_cmd::TrainArgs),

    /// Hidden worker entry point, respawned by the orchestrator; not
    /// meant to be invoked directly.
    #[command(hide = true)]
    SelfplayWorker { spec_json: String },
}

fn main() -> anyhow::Result<()> {
    tak_utils::logging::init();

    let cli = Cli::parse();
    match cli.command {
        Command::SelfPlay(args) => selfplay_cmd::run(args),
        Command::Train(args) => train_cmd::run(args),
        Command::SelfplayWorker { spec_json } => worker_cmd::run(&spec_json),
    }
}

pub(crate) fn current_exe() -> anyhow::Result<PathBuf> {
    std::env::current_exe().map_err(|e| anyhow::anyhow!("could not resolve current executable: {}", e))
}
