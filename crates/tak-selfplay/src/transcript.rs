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

use serde::{Deserialize, Serialize};

use tak_core::{Color, Move, Position};

/// The outcome of a finished game, from no particular player's
/// perspective — `Transcript::result_for` converts it to a per-position
/// +1/-1/0 training target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Undecided,
}

impl GameResult {
    pub fn of_winner(winner: Option<Color>) -> GameResult {
        match winner {
            Some(Color::White) => GameResult::WhiteWins,
            Some(Color::Black) => GameResult::BlackWins,
            None => GameResult::Draw,
        }
    }

    fn winner(self) -> Option<Color> {
        match self {
            GameResult::WhiteWins => Some(Color::White),
            GameResult::BlackWins => Some(Color::Black),
            GameResult::Draw | GameResult::Undecided => None,
        }
    }
}

/// Per-game training record: every position visited, the candidate
/// moves considered there with their visit-derived probabilities, the
/// running value estimate, and the final result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transcript {
    pub positions: Vec<Position>,
    pub candidate_moves: Vec<Vec<Move>>,
    pub probs: Vec<Vec<f32>>,
    pub values: Vec<f32>,
    pub result: GameResult,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            candidate_moves: Vec::new(),
            probs: Vec::new(),
            values: Vec::new(),
            result: GameResult::Undecided,
        }
    }

    /// The bootstrapped value target for each recorded position: +1 if
    /// the result favors whoever was to move there, -1 if it favors the
    /// opponent, 0 for a draw or an unresolved (resigned mid-buffer,
    /// which shouldn't happen) game.
    pub fn results(&self) -> Vec<f32> {
        let winner = self.result.winner();
        self.positions
            .iter()
            .map(|p| match winner {
                Some(w) if p.to_move() == w => 1.0,
                Some(_) => -1.0,
                None => 0.0,
            })
            .collect()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
