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

//! The `<run-dir>/step_NNNNNN/` persisted state layout (spec.md §6.4):
//! `model.bin`, `opt.bin`, `replay_buffer.bin[.zst]`, `elapsed.yaml`, and
//! the atomically-retargeted `latest` symlink.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tak_selfplay::EncodedBatch;
use tak_utils::error::{CoreError, CoreResult};

use crate::state::{ElapsedCounters, TrainState};

const MAGIC: [u8; 4] = *b"TAK0";
const BLOB_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct VersionedBlob {
    magic: [u8; 4],
    version: u16,
    payload: Vec<u8>,
}

fn write_blob(path: &Path, payload: Vec<u8>) -> CoreResult<()> {
    let blob = VersionedBlob { magic: MAGIC, version: BLOB_VERSION, payload };
    let bytes = bincode::serialize(&blob)
        .map_err(|e| CoreError::InvariantFailure(format!("serializing {}: {}", path.display(), e)))?;
    fs::write(path, bytes).map_err(CoreError::IoError)
}

fn read_blob(path: &Path) -> CoreResult<Vec<u8>> {
    let bytes = fs::read(path).map_err(CoreError::IoError)?;
    let blob: VersionedBlob = bincode::deserialize(&bytes)
        .map_err(|e| CoreError::InvariantFailure(format!("deserializing {}: {}", path.display(), e)))?;
    if blob.magic != MAGIC {
        return Err(CoreError::InvariantFailure(format!("{}: bad magic header", path.display())));
    }
    Ok(blob.payload)
}

/// `replay_buffer.bin`, or `replay_buffer.bin.zst` when `compress` is
/// set — the `.zst` variant spec.md §6.4 calls "acceptable".
fn replay_buffer_path(dir: &Path, compress: bool) -> PathBuf {
    if compress {
        dir.join("replay_buffer.bin.zst")
    } else {
        dir.join("replay_buffer.bin")
    }
}

fn write_replay_buffer(dir: &Path, buffer: &VecDeque<EncodedBatch>, compress: bool) -> CoreResult<()> {
    let batches: Vec<&EncodedBatch> = buffer.iter().collect();
    let bytes = bincode::serialize(&batches)
        .map_err(|e| CoreError::InvariantFailure(format!("serializing replay buffer: {}", e)))?;

    let path = replay_buffer_path(dir, compress);
    if compress {
        let compressed =
            zstd::stream::encode_all(&bytes[..], 0).map_err(CoreError::IoError)?;
        fs::write(path, compressed).map_err(CoreError::IoError)
    } else {
        fs::write(path, bytes).map_err(CoreError::IoError)
    }
}

fn read_replay_buffer(dir: &Path, compress: bool) -> CoreResult<VecDeque<EncodedBatch>> {
    let path = replay_buffer_path(dir, compress);
    let bytes = fs::read(&path).map_err(CoreError::IoError)?;
    let raw = if compress {
        zstd::stream::decode_all(&bytes[..]).map_err(CoreError::IoError)?
    } else {
        bytes
    };
    let batches: Vec<EncodedBatch> = bincode::deserialize(&raw)
        .map_err(|e| CoreError::InvariantFailure(format!("deserializing {}: {}", path.display(), e)))?;
    Ok(batches.into_iter().collect())
}

/// Reads a standalone `model.bin`-shaped blob (e.g. the `--load-model`
/// CLI flag pointing at a previous run's `step_NNNNNN/model.bin`) and
/// returns its payload, ready for [`tak_oracle::TrainableModel::restore`].
pub fn load_model_file(path: &Path) -> CoreResult<Vec<u8>> {
    read_blob(path)
}

/// Writes one full snapshot of `state` to `<run_dir>/step_NNNNNN/` and
/// retargets `<run_dir>/latest` to point at it, but only after every
/// file in the snapshot wrote successfully (spec.md §7: the `latest`
/// link is updated only on a fully successful write).
pub fn save_snapshot(run_dir: &Path, state: &TrainState, compress_replay_buffer: bool) -> CoreResult<PathBuf> {
    let step_dir = run_dir.join(format!("step_{:06}", state.elapsed.step));
    fs::create_dir_all(&step_dir).map_err(CoreError::IoError)?;

    write_blob(&step_dir.join("model.bin"), state.model.lock().expect("model mutex poisoned").snapshot())?;
    write_replay_buffer(&step_dir, &state.replay_buffer, compress_replay_buffer)?;

    let elapsed_yaml = serde_yaml::to_string(&state.elapsed)
        .map_err(|e| CoreError::InvariantFailure(format!("serializing elapsed.yaml: {}", e)))?;
    fs::write(step_dir.join("elapsed.yaml"), elapsed_yaml).map_err(CoreError::IoError)?;

    retarget_latest(run_dir, &step_dir)?;
    Ok(step_dir)
}

fn retarget_latest(run_dir: &Path, step_dir: &Path) -> CoreResult<()> {
    let latest = run_dir.join("latest");
    let tmp = run_dir.join("latest.tmp");

    let _ = fs::remove_file(&tmp);
    #[cfg(unix)]
    std::os::unix::fs::symlink(step_dir, &tmp).map_err(CoreError::IoError)?;
    #[cfg(not(unix))]
    fs::write(&tmp, step_dir.to_string_lossy().as_bytes()).map_err(CoreError::IoError)?;

    fs::rename(&tmp, &latest).map_err(CoreError::IoError)
}

/// Restores `state.replay_buffer`/`elapsed` from `<run_dir>/latest`, and
/// the model's own parameter blob via [`TrainableModel::restore`].
pub fn load_snapshot(run_dir: &Path, state: &mut TrainState, compress_replay_buffer: bool) -> CoreResult<()> {
    let latest = fs::canonicalize(run_dir.join("latest")).map_err(CoreError::IoError)?;

    let model_bytes = read_blob(&latest.join("model.bin"))?;
    state.model.lock().expect("model mutex poisoned").restore(&model_bytes)?;

    state.replay_buffer = read_replay_buffer(&latest, compress_replay_buffer)?;

    let elapsed_yaml = fs::read_to_string(latest.join("elapsed.yaml")).map_err(CoreError::IoError)?;
    state.elapsed = serde_yaml::from_str::<ElapsedCounters>(&elapsed_yaml)
        .map_err(|e| CoreError::InvariantFailure(format!("parsing elapsed.yaml: {}", e)))?;

    Ok(())
}

pub fn has_resumable_snapshot(run_dir: &Path) -> bool {
    run_dir.join("latest").exists()
}

/// `<run_dir>/SAVE_NOW`: if present, a save is due at the next step
/// boundary regardless of `save_freq`, and the sentinel is then deleted
/// (spec.md §4.8/§6.4).
pub fn save_now_requested(run_dir: &Path) -> bool {
    let path = run_dir.join("SAVE_NOW");
    if path.exists() {
        let _ = fs::remove_file(&path);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tak_oracle::NullModel;

    #[test]
    fn snapshot_round_trips_model_and_elapsed_counters() {
        use std::sync::{Arc, Mutex};

        let dir = tempdir("snapshot-round-trip");
        let mut state = TrainState::new(Arc::new(Mutex::new(Box::new(NullModel::new(6)))));
        state.elapsed.step = 3;
        state.elapsed.positions = 42;

        let step_dir = save_snapshot(&dir, &state, false).unwrap();
        assert!(step_dir.ends_with("step_000003"));
        assert!(dir.join("latest").exists());

        let mut restored = TrainState::new(Arc::new(Mutex::new(Box::new(NullModel::new(1)))));
        load_snapshot(&dir, &mut restored, false).unwrap();
        assert_eq!(restored.elapsed.step, 3);
        assert_eq!(restored.elapsed.positions, 42);
        assert_eq!(restored.model.lock().unwrap().evaluate(&[]).0.len(), 6);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_now_sentinel_is_consumed_once() {
        let dir = tempdir("save-now-sentinel");
        fs::write(dir.join("SAVE_NOW"), b"").unwrap();
        assert!(save_now_requested(&dir));
        assert!(!save_now_requested(&dir));
        fs::remove_dir_all(&dir).ok();
    }

    fn tempdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tak-train-test-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
