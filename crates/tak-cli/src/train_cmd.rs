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
use std::sync::{Arc, Mutex};

use clap::Args;

use tak_oracle::{NullModel, TrainableModel};
use tak_selfplay::{MultiprocessSelfPlayEngine, SelfPlayConfig, WorkerSpec};
use tak_server::{InferenceServer, ModelBackend};
use tak_train::{has_resumable_snapshot, load_model_file, load_snapshot, Hook, TrainState, Trainer};
use tak_utils::config::{load_or_init_train_config, Device, TrainConfig};

use crate::{current_exe, DEFAULT_CUTOFF_PROB};

/// `tak0 train`: the AlphaZero loop.
#[derive(Args)]
pub struct TrainArgs {
    #[arg(long = "run-dir")]
    run_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    size: usize,

    #[arg(long, default_value_t = 6)]
    layers: usize,

    #[arg(long = "d_model", default_value_t = 256)]
    d_model: usize,

    #[arg(long = "d_head", default_value_t = 32)]
    d_head: usize,

    #[arg(long = "n_ctx", default_value_t = 256)]
    n_ctx: usize,

    #[arg(long, default_value_t = 512)]
    batch: usize,

    #[arg(long, default_value_t = 1e-3)]
    lr: f32,

    #[arg(long, default_value_t = 1000)]
    steps: usize,

    #[arg(long = "rollouts-per-step", default_value_t = 32)]
    rollouts_per_step: usize,

    #[arg(long = "replay-buffer-steps", default_value_t = 20)]
    replay_buffer_steps: usize,

    #[arg(long = "train-positions", default_value_t = 4096)]
    train_positions: usize,

    #[arg(long = "rollout-workers", default_value_t = 4)]
    rollout_workers: usize,

    #[arg(long = "rollout-simulations", default_value_t = 800)]
    rollout_simulations: usize,

    #[arg(long = "rollout-ply-limit", default_value_t = 300)]
    rollout_ply_limit: usize,

    #[arg(long = "rollout-resignation-threshold", default_value_t = 0.95)]
    rollout_resignation_threshold: f32,

    #[arg(long = "noise-alpha")]
    noise_alpha: Option<f32>,

    #[arg(long = "noise-weight", default_value_t = 0.25)]
    noise_weight: f32,

    #[arg(short = 'C', default_value_t = 4.0)]
    c: f32,

    #[arg(long = "save-freq", default_value_t = 0)]
    save_freq: usize,

    #[arg(long = "test-data")]
    test_data: Option<PathBuf>,

    #[arg(long = "test-freq", default_value_t = 0)]
    test_freq: usize,

    #[arg(long = "eval-freq", default_value_t = 0)]
    eval_freq: usize,

    #[arg(long = "job-name")]
    job_name: Option<String>,

    #[arg(long = "load-model")]
    load_model: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "cpu")]
    device: DeviceArg,

    #[arg(long = "server-port", default_value_t = 5001)]
    server_port: u16,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum DeviceArg {
    Cpu,
    Cuda,
}

impl From<DeviceArg> for Device {
    fn from(value: DeviceArg) -> Self {
        match value {
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Cuda => Device::Cuda,
        }
    }
}

impl TrainArgs {
    fn into_config(self) -> TrainConfig {
        TrainConfig {
            run_dir: self.run_dir,
            size: self.size,
            layers: self.layers,
            d_model: self.d_model,
            d_head: self.d_head,
            n_ctx: self.n_ctx,
            batch: self.batch,
            lr: self.lr,
            steps: self.steps,
            rollouts_per_step: self.rollouts_per_step,
            replay_buffer_steps: self.replay_buffer_steps,
            train_positions: self.train_positions,
            rollout_workers: self.rollout_workers,
            rollout_simulations: self.rollout_simulations,
            rollout_ply_limit: self.rollout_ply_limit,
            rollout_resignation_threshold: self.rollout_resignation_threshold,
            noise_alpha: self.noise_alpha,
            noise_weight: self.noise_weight,
            c: self.c,
            save_freq: self.save_freq,
            test_data: self.test_data,
            test_freq: self.test_freq,
            eval_freq: self.eval_freq,
            job_name: self.job_name,
            load_model: self.load_model,
            device: self.device.into(),
            server_port: self.server_port,
        }
    }
}

pub fn run(args: TrainArgs) -> anyhow::Result<()> {
    // Resumption: `<run-dir>/run.yaml`, if present, is loaded verbatim
    // and the CLI flags above are ignored entirely.
    let config = load_or_init_train_config(args.into_config())?;

    let policy_width = tak_encoding::global_max_move_id();
    let model: Arc<Mutex<Box<dyn TrainableModel>>> = Arc::new(Mutex::new(Box::new(NullModel::new(policy_width))));

    let mut state = TrainState::new(model.clone());

    if let Some(run_dir) = &config.run_dir {
        if has_resumable_snapshot(run_dir) {
            log::info!("resuming training state from {}/latest", run_dir.display());
            load_snapshot(run_dir, &mut state, false)?;
        } else if let Some(load_model) = &config.load_model {
            let bytes = load_model_file(load_model)?;
            model.lock().expect("model mutex poisoned").restore(&bytes)?;
        }
    } else if let Some(load_model) = &config.load_model {
        let bytes = load_model_file(load_model)?;
        model.lock().expect("model mutex poisoned").restore(&bytes)?;
    }

    let bind_addr = format!("127.0.0.1:{}", config.server_port);
    let backend = Arc::new(ModelBackend::new(model.clone()));
    let (server, handle) = InferenceServer::start(&bind_addr, backend)?;

    let worker_spec = WorkerSpec {
        host: "127.0.0.1".to_string(),
        port: server.local_addr().port(),
        size: config.size,
        simulations: config.rollout_simulations as u32,
        c: config.c,
        cutoff_prob: DEFAULT_CUTOFF_PROB,
        noise_alpha: config.noise_alpha,
        noise_weight: config.noise_weight,
        resignation_threshold: config.rollout_resignation_threshold,
        ply_limit: config.rollout_ply_limit as u32,
    };
    let selfplay_config = SelfPlayConfig {
        workers: config.rollout_workers.max(1),
        worker_exe: current_exe()?,
        worker_args: vec!["selfplay-worker".to_string()],
        worker_spec_json: serde_json::to_string(&worker_spec)?,
    };
    let orchestrator = MultiprocessSelfPlayEngine::start(&selfplay_config)?;

    let mut hooks: Vec<Box<dyn Hook>> = vec![Box::new(tak_train::hooks::TimingHook::default())];

    if let Some(run_dir) = config.run_dir.clone() {
        hooks.push(Box::new(tak_train::hooks::SavingHook { run_dir, save_freq: config.save_freq, compress_replay_buffer: false }));
    }

    if let (Some(test_data_path), true) = (&config.test_data, config.test_freq > 0) {
        let bytes = std::fs::read(test_data_path)?;
        let test_data = bincode::deserialize(&bytes)?;
        hooks.push(Box::new(tak_train::hooks::TestLossHook { test_freq: config.test_freq, test_data }));
    }

    // The Eval hook needs an opponent driver command and player
    // identifiers that this flag list does not expose; it is available
    // to callers that build a `Trainer` directly but is not wired up
    // from this CLI surface.
    let _ = config.eval_freq;

    hooks.push(Box::new(tak_train::hooks::MetricsSinkHook { sink: Box::new(tak_train::hooks::LoggingSink) }));

    let mut trainer = Trainer::new(state, orchestrator, handle, hooks);
    let result = trainer.run(&config);

    trainer_shutdown(trainer, server);
    result?;
    Ok(())
}

fn trainer_shutdown(trainer: Trainer, server: InferenceServer) {
    trainer.stop_orchestrator();
    server.shutdown();
}
