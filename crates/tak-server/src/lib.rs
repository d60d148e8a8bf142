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

//! The single-process inference server: one TCP listener, one
//! cooperative batching loop, and a `train`/`serve` mode switch the
//! trainer flips between steps.

mod backend;
mod server;

pub use backend::{InferenceBackend, ModelBackend};
pub use server::{InferenceServer, Mode, ServerHandle};
