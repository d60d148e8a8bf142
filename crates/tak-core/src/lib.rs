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

//! Tak board, move, and rules engine: the pure game-logic core shared by
//! search, self-play, and training.

pub mod moves;
pub mod piece;
pub mod position;
pub mod symmetry;

pub use moves::{slide_partitions, all_moves_for_size, Direction, Move};
pub use piece::{Color, Kind, Piece};
pub use position::{new_position, Config, Position, Reserves, WinReason};
pub use symmetry::{distinct_symmetries, transform_move, transform_position, NUM_SYMMETRIES};
