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

use std::path::PathBuf;

use clap::Args;

use tak_selfplay::{encode_games, MultiprocessSelfPlayEngine, SelfPlayConfig};

use crate::{current_exe, DEFAULT_CUTOFF_PROB};

/// `tak0 self-play`: plays games against an already-running inference
/// server and writes the resulting encoded batch to disk.
#[derive(Args)]
pub struct SelfPlayArgs {
    #[arg(long, default_value_t = 800)]
    simulations: u32,

    #[arg(long, default_value_t = 5)]
    size: usize,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long)]
    port: u16,

    #[arg(long, default_value_t = 1)]
    games: usize,

    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long = "resign-threshold", default_value_t = 0.95)]
    resign_threshold: f32,

    #[arg(long = "noise-alpha")]
    noise_alpha: Option<f32>,

    #[arg(long = "noise-weight", default_value_t = 0.25)]
    noise_weight: f32,

    #[arg(short = 'C', default_value_t = 4.0)]
    c: f32,

    #[arg(long = "write-games")]
    write_games: PathBuf,
}

pub fn run(args: SelfPlayArgs) -> anyhow::Result<()> {
    let worker_spec = tak_selfplay::WorkerSpec {
        host: args.host,
        port: args.port,
        size: args.size,
        simulations: args.simulations,
        c: args.c,
        cutoff_prob: DEFAULT_CUTOFF_PROB,
        noise_alpha: args.noise_alpha,
        noise_weight: args.noise_weight,
        resignation_threshold: args.resign_threshold,
        ply_limit: u32::MAX,
    };
    let worker_spec_json = serde_json::to_string(&worker_spec)?;

    let config = SelfPlayConfig {
        workers: args.threads.max(1),
        worker_exe: current_exe()?,
        worker_args: vec!["selfplay-worker".to_string()],
        worker_spec_json,
    };

    let mut engine = MultiprocessSelfPlayEngine::start(&config)?;
    let transcripts = engine.play_many(args.games)?;
    engine.stop();

    let batch = encode_games(&transcripts);
    let bytes = bincode::serialize(&batch)?;
    std::fs::write(&args.write_games, bytes)?;

    log::info!(
        "self-play: {} games, {} positions written to {}",
        transcripts.len(),
        batch.len(),
        args.write_games.display(),
    );
    Ok(())
}
