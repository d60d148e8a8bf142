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

//! The policy/value Oracle boundary: a position in, a move-probability
//! vector and a scalar value out. `Local` answers in-process; `Remote`
//! talks to the inference server over the wire contract in [`wire`].

pub mod local;
pub mod remote;
pub mod train;
pub mod wire;

pub use local::{softmax, Local, PolicyValueModel};
pub use remote::Remote;
pub use train::{compute_loss, LossMetrics, NullModel, TrainableModel, TrainingBatch};

use tak_core::Position;
use tak_utils::error::CoreResult;

#[derive(Clone, Debug)]
pub struct Evaluation {
    pub move_probs: Vec<f32>,
    pub value: f32,
}

pub trait Oracle: Send + Sync {
    fn evaluate(&self, pos: &Position) -> CoreResult<Evaluation>;
}
