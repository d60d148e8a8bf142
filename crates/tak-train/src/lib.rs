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

//! The AlphaZero training loop (spec.md §4.7/§4.8): `TrainState`, the
//! replay buffer and its dedup step, the `Trainer` itself, the `Hook`
//! pipeline, and on-disk snapshotting.

pub mod hooks;
pub mod snapshot;
pub mod state;
pub mod trainer;

pub use hooks::Hook;
pub use snapshot::{has_resumable_snapshot, load_model_file, load_snapshot, save_now_requested, save_snapshot};
pub use state::{dedup_batch, ElapsedCounters, StepStats, TrainState};
pub use trainer::Trainer;
