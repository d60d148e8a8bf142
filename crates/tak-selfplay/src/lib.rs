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

//! Self-play: the per-worker game loop, the multiprocess orchestrator
//! that runs many of them concurrently, and the batch encoder the
//! trainer consumes.

pub mod batch;
pub mod orchestrator;
pub mod transcript;
pub mod worker;

pub use batch::{encode_games, EncodedBatch};
pub use orchestrator::{MultiprocessSelfPlayEngine, SelfPlayConfig};
pub use transcript::{GameResult, Transcript};
pub use worker::{play_one_game, run_worker_loop, WorkerCmd, WorkerSpec};
