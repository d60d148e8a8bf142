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

use tak_core::Position;

use crate::transcript::Transcript;

/// One step's worth of encoded training rows: `encoded`/`mask` from
/// [`tak_encoding::encode_batch`], `move_probs` densified to
/// [`tak_encoding::global_max_move_id`] width.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncodedBatch {
    pub positions: Vec<Position>,
    pub encoded: Vec<Vec<u8>>,
    pub mask: Vec<Vec<bool>>,
    pub move_probs: Vec<Vec<f32>>,
    pub values: Vec<f32>,
    pub results: Vec<f32>,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Flattens every transcript's positions, per-position move-visit
/// probabilities, running values, and bootstrapped results into one
/// dense batch, ready for the trainer's dedup + minibatch step.
pub fn encode_games(transcripts: &[Transcript]) -> EncodedBatch {
    let width = tak_encoding::global_max_move_id();

    let mut positions = Vec::new();
    let mut move_probs = Vec::new();
    let mut values = Vec::new();
    let mut results = Vec::new();

    for transcript in transcripts {
        let transcript_results = transcript.results();
        for i in 0..transcript.positions.len() {
            let position = &transcript.positions[i];
            let mut dense = vec![0.0f32; width];
            for (mv, &p) in transcript.candidate_moves[i].iter().zip(&transcript.probs[i]) {
                if let Some(id) = tak_encoding::move_id(position.size, mv) {
                    dense[id as usize] = p;
                }
            }

            positions.push(position.clone());
            move_probs.push(dense);
            values.push(transcript.values[i]);
            results.push(transcript_results[i]);
        }
    }

    let (encoded, mask) = tak_encoding::encode_batch(&positions);

    EncodedBatch { positions, encoded, mask, move_probs, values, results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::GameResult;
    use tak_core::{new_position, Kind};

    #[test]
    fn encode_games_produces_one_row_per_recorded_position() {
        let p0 = new_position(3).unwrap();
        let m = tak_core::Move::Place { x: 0, y: 0, kind: Kind::Flat };

        let mut t = Transcript::new();
        t.positions.push(p0.clone());
        t.candidate_moves.push(vec![m.clone()]);
        t.probs.push(vec![1.0]);
        t.values.push(0.0);
        t.result = GameResult::WhiteWins;

        let batch = encode_games(&[t]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.move_probs[0].len(), tak_encoding::global_max_move_id());
        assert!(batch.move_probs[0][tak_encoding::move_id(3, &m).unwrap() as usize] > 0.0);
    }
}
