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
//
// Explicit, typed configuration structs replace the dozens-of-optional-
// fields config objects of the source this was ported from (design note
// in the specification): unknown fields in YAML are load errors, and the
// resume path goes through `load_or_init_train_config` rather than
// in-place mutation of a partially-built config.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

/// Configuration for a single `self_play` CLI invocation (spec.md §6.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfPlayCliConfig {
    pub simulations: usize,
    pub size: usize,
    pub host: String,
    pub port: u16,
    pub games: usize,
    pub threads: usize,
    pub resign_threshold: f32,
    pub noise_alpha: Option<f32>,
    pub noise_weight: f32,
    pub c: f32,
    pub write_games: Option<PathBuf>,
}

/// Configuration for the `train` CLI invocation (spec.md §6.1). This is
/// the struct persisted verbatim to `<run-dir>/run.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    pub run_dir: Option<PathBuf>,
    pub size: usize,

    // Model shape fields: these are read by the (out-of-scope) network
    // constructor, but the core still owns parsing/persisting them since
    // they live in config.yaml / run.yaml (spec.md §6.4).
    pub layers: usize,
    pub d_model: usize,
    pub d_head: usize,
    pub n_ctx: usize,

    pub batch: usize,
    pub lr: f32,
    pub steps: usize,

    pub rollouts_per_step: usize,
    pub replay_buffer_steps: usize,
    pub train_positions: usize,

    pub rollout_workers: usize,
    pub rollout_simulations: usize,
    pub rollout_ply_limit: usize,
    pub rollout_resignation_threshold: f32,

    pub noise_alpha: Option<f32>,
    pub noise_weight: f32,
    pub c: f32,

    pub save_freq: usize,
    pub test_data: Option<PathBuf>,
    pub test_freq: usize,
    pub eval_freq: usize,

    pub job_name: Option<String>,
    pub load_model: Option<PathBuf>,
    pub device: Device,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_server_port() -> u16 {
    5001
}

impl TrainConfig {
    pub fn run_yaml_path(&self) -> Option<PathBuf> {
        self.run_dir.as_ref().map(|d| d.join("run.yaml"))
    }

    pub fn latest_snapshot_dir(&self) -> Option<PathBuf> {
        self.run_dir.as_ref().map(|d| d.join("latest"))
    }
}

/// Loads `<run-dir>/run.yaml` if it exists, otherwise persists `cli` there
/// (when a run dir was given) and returns it unchanged. This is the merge
/// function referenced by the resume design note: on resume the whole
/// config comes from disk, not from re-applying CLI flags onto a mutable
/// struct.
pub fn load_or_init_train_config(cli: TrainConfig) -> Result<TrainConfig, CoreError> {
    let Some(run_dir) = cli.run_dir.clone() else {
        return Ok(cli);
    };

    let run_yaml = run_dir.join("run.yaml");
    if run_yaml.exists() {
        load_yaml_strict(&run_yaml)
    } else {
        fs::create_dir_all(&run_dir)
            .map_err(|e| CoreError::ConfigError(format!("could not create run dir: {}", e)))?;
        save_yaml(&run_yaml, &cli)?;
        Ok(cli)
    }
}

pub fn load_yaml_strict<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CoreError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CoreError::ConfigError(format!("reading {}: {}", path.display(), e)))?;
    serde_yaml::from_str(&text)
        .map_err(|e| CoreError::ConfigError(format!("parsing {}: {}", path.display(), e)))
}

pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let text = serde_yaml::to_string(value)
        .map_err(|e| CoreError::ConfigError(format!("serializing {}: {}", path.display(), e)))?;
    fs::write(path, text)
        .map_err(|e| CoreError::ConfigError(format!("writing {}: {}", path.display(), e)))
}

/// Per-size default reserve allotments, `(flats, capstones)`, taken
/// verbatim from the canonical reference implementation (see SPEC_FULL.md
/// §3 — this resolves the "Reserve/capstone allotments" open question by
/// reading the original rather than guessing).
pub const DEFAULT_RESERVES: [(u32, u32); 9] = [
    (0, 0),
    (0, 0),
    (0, 0),
    (10, 0),
    (15, 0),
    (21, 1),
    (30, 1),
    (40, 1),
    (50, 2),
];

pub fn default_reserves_for_size(size: usize) -> Result<(u32, u32), CoreError> {
    DEFAULT_RESERVES
        .get(size)
        .copied()
        .ok_or_else(|| CoreError::ConfigError(format!("unsupported board size {}", size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_table_matches_canonical_sizes() {
        assert_eq!(default_reserves_for_size(3).unwrap(), (10, 0));
        assert_eq!(default_reserves_for_size(5).unwrap(), (21, 1));
        assert_eq!(default_reserves_for_size(8).unwrap(), (50, 2));
    }

    #[test]
    fn unsupported_size_is_config_error() {
        assert!(default_reserves_for_size(20).is_err());
    }
}
